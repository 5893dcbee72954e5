use anyhow::{Result, bail};
use chrono::Utc;

use crate::config::{Config, REMOTE_KEY_ENV, REMOTE_URL_ENV, RemoteConfig};
use crate::remote::RemoteClient;
use habitlog_core::models::RemoteStatus;
use habitlog_core::service::LogService;
use habitlog_core::sync::RemoteStore;

pub(crate) async fn cmd_remote_login(
    config: &Config,
    url: &str,
    key: &str,
    json: bool,
) -> Result<()> {
    let url = url.trim().to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("Remote URL must start with http:// or https://");
    }
    let api_key = key.trim().to_string();
    if api_key.is_empty() {
        bail!("API key must not be empty");
    }

    let remote = RemoteConfig { url, api_key };
    config.save_remote(&remote)?;

    // Kept even when the server cannot be reached.
    let identity = match RemoteClient::new(&remote)?.identity().await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "remote identity check failed");
            None
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "url": remote.url,
                "key": remote.masked_key(),
                "identity": identity,
            }))?
        );
    } else {
        println!("Remote saved: {}", remote.url);
        match identity {
            Some(id) => println!("Authenticated as {}", id.id),
            None => eprintln!("Could not verify the key yet. Run `habitlog remote status` to check"),
        }
    }
    Ok(())
}

pub(crate) fn cmd_remote_logout(config: &Config, json: bool) -> Result<()> {
    let removed = config.clear_remote()?;
    let env_configured =
        std::env::var_os(REMOTE_URL_ENV).is_some() || std::env::var_os(REMOTE_KEY_ENV).is_some();

    if json {
        println!(
            "{}",
            serde_json::json!({ "removed": removed, "env_configured": env_configured })
        );
    } else {
        if removed {
            println!("Remote credentials removed");
        } else {
            println!("No stored remote credentials");
        }
        if env_configured {
            eprintln!("Note: {REMOTE_URL_ENV}/{REMOTE_KEY_ENV} are still set in the environment");
        }
    }
    Ok(())
}

pub(crate) async fn cmd_remote_status(config: &Config, json: bool) -> Result<()> {
    let Some(remote) = config.remote()? else {
        if json {
            println!("{}", serde_json::json!({ "configured": false }));
        } else {
            println!("Remote sync not configured. Use `habitlog remote login --url URL --key KEY`");
        }
        return Ok(());
    };

    let client = RemoteClient::new(&remote)?;
    let (identity, error) = match client.identity().await {
        Ok(identity) => (identity, None),
        Err(e) => (None, Some(format!("{e:#}"))),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "configured": true,
                "url": remote.url,
                "key": remote.masked_key(),
                "identity": identity,
                "error": error,
            }))?
        );
    } else {
        println!("URL: {}", remote.url);
        println!("Key: {}", remote.masked_key());
        match (identity, error) {
            (Some(id), _) => println!("Authenticated as {}", id.id),
            (None, Some(e)) => println!("Unreachable: {e}"),
            (None, None) => println!("Not authenticated (key rejected)"),
        }
    }
    Ok(())
}

pub(crate) async fn cmd_sync(
    svc: &mut LogService,
    remote: Option<&RemoteClient>,
    json: bool,
) -> Result<()> {
    let status = svc.sync(remote, Utc::now()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    match status {
        RemoteStatus::Failed { error } => bail!("Sync failed: {error}"),
        RemoteStatus::NotConfigured if !json => {
            println!("{status}");
            eprintln!("Use `habitlog remote login --url URL --key KEY` to set up sync");
        }
        _ if !json => println!("{status}"),
        _ => {}
    }
    Ok(())
}
