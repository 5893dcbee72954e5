use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const REMOTE_URL_ENV: &str = "HABITLOG_REMOTE_URL";
pub const REMOTE_KEY_ENV: &str = "HABITLOG_REMOTE_KEY";

pub struct Config {
    pub db_path: PathBuf,
    pub remote_db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Connection details for the remote row store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
}

impl RemoteConfig {
    /// API key with everything but the edges hidden.
    pub fn masked_key(&self) -> String {
        let key = &self.api_key;
        if key.chars().count() <= 8 {
            return "****".to_string();
        }
        let head: String = key.chars().take(4).collect();
        let tail: String = key.chars().skip(key.chars().count() - 4).collect();
        format!("{head}...{tail}")
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "habitlog").context("Could not determine home directory")?;
        Self::in_dir(proj_dirs.data_dir())
    }

    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("habitlog.db"),
            remote_db_path: data_dir.join("remote.db"),
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn remote_path(&self) -> PathBuf {
        self.data_dir.join("remote.json")
    }

    /// Remote settings from `remote.json`, with environment overrides applied.
    pub fn remote(&self) -> Result<Option<RemoteConfig>> {
        let stored = self.stored_remote()?;
        Ok(resolve_remote(
            stored,
            env_var(REMOTE_URL_ENV),
            env_var(REMOTE_KEY_ENV),
        ))
    }

    fn stored_remote(&self) -> Result<Option<RemoteConfig>> {
        let path = self.remote_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).context("Failed to read remote.json")?;
        let remote = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed remote config: {}", path.display()))?;
        Ok(Some(remote))
    }

    pub fn save_remote(&self, remote: &RemoteConfig) -> Result<()> {
        let path = self.remote_path();
        let json = serde_json::to_string_pretty(remote)?;
        std::fs::write(&path, json).context("Failed to write remote.json")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set remote.json permissions")?;
        }
        Ok(())
    }

    /// Forget stored remote credentials. Returns whether any were stored.
    pub fn clear_remote(&self) -> Result<bool> {
        let path = self.remote_path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to remove remote.json")?;
        Ok(true)
    }

    /// Load the server API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        Ok((key, true))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Each environment value overrides the matching stored field.
fn resolve_remote(
    stored: Option<RemoteConfig>,
    url_env: Option<String>,
    key_env: Option<String>,
) -> Option<RemoteConfig> {
    let (stored_url, stored_key) = stored.map(|r| (r.url, r.api_key)).unzip();
    let url = url_env.or(stored_url)?;
    let api_key = key_env.or(stored_key)?;
    Some(RemoteConfig { url, api_key })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(url: &str, key: &str) -> RemoteConfig {
        RemoteConfig {
            url: url.to_string(),
            api_key: key.to_string(),
        }
    }

    #[test]
    fn test_in_dir_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(&dir.path().join("nested")).unwrap();
        assert!(config.data_dir.is_dir());
        assert_eq!(config.db_path.file_name().unwrap(), "habitlog.db");
        assert_eq!(config.remote_db_path.file_name().unwrap(), "remote.db");
    }

    #[test]
    fn test_remote_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        assert!(config.stored_remote().unwrap().is_none());

        let r = remote("http://localhost:8080", "secret-key-123");
        config.save_remote(&r).unwrap();
        assert_eq!(config.stored_remote().unwrap(), Some(r));

        assert!(config.clear_remote().unwrap());
        assert!(!config.clear_remote().unwrap());
        assert!(config.stored_remote().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_remote_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        config.save_remote(&remote("http://x", "k")).unwrap();
        let mode = std::fs::metadata(config.remote_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_malformed_remote_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        std::fs::write(config.remote_path(), "{").unwrap();
        assert!(config.stored_remote().is_err());
    }

    #[test]
    fn test_resolve_remote_env_overrides() {
        let stored = Some(remote("http://file", "file-key"));
        assert_eq!(
            resolve_remote(stored.clone(), Some("http://env".into()), None),
            Some(remote("http://env", "file-key"))
        );
        assert_eq!(
            resolve_remote(stored, None, Some("env-key".into())),
            Some(remote("http://file", "env-key"))
        );
        assert_eq!(
            resolve_remote(None, Some("http://env".into()), Some("k".into())),
            Some(remote("http://env", "k"))
        );
    }

    #[test]
    fn test_resolve_remote_incomplete() {
        assert!(resolve_remote(None, None, None).is_none());
        assert!(resolve_remote(None, Some("http://env".into()), None).is_none());
    }

    #[test]
    fn test_api_key_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        let (key, created) = config.load_or_create_api_key().unwrap();
        assert!(created);
        assert_eq!(key.len(), 64);
        let (again, created) = config.load_or_create_api_key().unwrap();
        assert!(!created);
        assert_eq!(again, key);
    }

    #[test]
    fn test_masked_key() {
        assert_eq!(remote("u", "abcdefghijkl").masked_key(), "abcd...ijkl");
        assert_eq!(remote("u", "short").masked_key(), "****");
    }
}
