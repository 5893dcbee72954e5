mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    EntryField, EntryFields, cmd_chart, cmd_delete, cmd_export, cmd_history, cmd_import, cmd_log,
    cmd_remote_login, cmd_remote_logout, cmd_remote_status, cmd_settings_reset, cmd_settings_set,
    cmd_settings_show, cmd_show, cmd_status, cmd_sync, cmd_wipe,
};
use crate::config::Config;
use crate::remote::RemoteClient;
use habitlog_core::db::Database;
use habitlog_core::service::LogService;

#[derive(Parser)]
#[command(
    name = "habitlog",
    version,
    about = "A simple, local-first weight and habit log",
    long_about = "Log weight, steps, workouts, sleep and extras per day, track the pace \
                  towards a goal weight, and optionally sync with a self-hosted row store."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record or update the entry for a day
    Log {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Body weight in kg
        #[arg(short, long)]
        weight: Option<f64>,
        /// Step count
        #[arg(short, long)]
        steps: Option<u64>,
        /// Workout: none, strengthA, strengthB, walk, run, bike, mobility, other
        #[arg(long)]
        workout: Option<String>,
        /// Workout duration in minutes
        #[arg(long)]
        workout_min: Option<f64>,
        /// Workout effort (RPE 0-10)
        #[arg(long)]
        rpe: Option<f64>,
        /// Extras counter (snacks, drinks, whatever you track)
        #[arg(long)]
        extras: Option<f64>,
        /// Hours of sleep
        #[arg(long)]
        sleep: Option<f64>,
        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
        /// Reset fields to empty before applying the values above (repeatable)
        #[arg(long, value_enum, value_delimiter = ',', value_name = "FIELD")]
        clear: Vec<EntryField>,
        /// Start from a blank entry instead of the one already recorded
        #[arg(long)]
        replace: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the entry for a day (defaults to today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show logged days, newest first
    History {
        /// Number of days to show (default: all)
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the entry for a day, locally and on the remote
    Delete {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show progress towards the goal
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a weight or steps series with its 7-day moving average
    Chart {
        /// Series: weight or steps
        #[arg(default_value = "weight")]
        kind: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage goal settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Export the log to a file
    Export {
        /// Format: json or csv
        #[arg(default_value = "json")]
        format: String,
        /// Output path ("-" for stdout, default: dated file in the current directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace the log with a JSON backup, then sync
    Import {
        /// Path to a JSON backup created by `habitlog export json`
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all local entries and settings
    Wipe {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure the remote row store
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Pull, merge and push against the remote row store
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the remote row store server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings
    Set {
        /// Goal weight in kg
        #[arg(long)]
        goal_weight: Option<f64>,
        /// Goal date (YYYY-MM-DD)
        #[arg(long)]
        goal_date: Option<String>,
        /// Starting weight in kg
        #[arg(long)]
        start_weight: Option<f64>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore default settings
    Reset {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Save the remote URL and API key
    Login {
        /// Base URL of a `habitlog serve` instance
        #[arg(long)]
        url: String,
        /// API key printed by the server on first start
        #[arg(long)]
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget stored remote credentials
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the configured remote and who it authenticates as
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Open the local log and, if configured, the remote client. A broken remote
/// configuration only disables sync; local commands keep working.
fn open_local(config: &Config) -> Result<(LogService, Option<RemoteClient>)> {
    let svc = LogService::open(&config.db_path, commands::today())?;
    let resolved = config
        .remote()
        .and_then(|r| r.map(|r| RemoteClient::new(&r)).transpose());
    let remote = match resolved {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "remote disabled: invalid remote configuration");
            None
        }
    };
    Ok((svc, remote))
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    // Commands that do not touch the local log.
    match &cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let db = Database::open(&config.remote_db_path)?;
            let api_key = if *no_auth {
                None
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                if new {
                    eprintln!("Generated new API key: {key}");
                    eprintln!("Include in requests: Authorization: Bearer {key}");
                }
                Some(key)
            };
            return server::start_server(db, *port, bind, api_key).await;
        }
        Commands::Remote { command } => {
            return match command {
                RemoteCommands::Login { url, key, json } => {
                    cmd_remote_login(&config, url, key, *json).await
                }
                RemoteCommands::Logout { json } => cmd_remote_logout(&config, *json),
                RemoteCommands::Status { json } => cmd_remote_status(&config, *json).await,
            };
        }
        _ => {}
    }

    let (mut svc, remote) = open_local(&config)?;
    let remote = remote.as_ref();

    match cli.command {
        Commands::Log {
            date,
            weight,
            steps,
            workout,
            workout_min,
            rpe,
            extras,
            sleep,
            notes,
            clear,
            replace,
            json,
        } => {
            let fields = EntryFields {
                replace,
                clear,
                date,
                weight,
                steps,
                workout,
                workout_min,
                rpe,
                extras,
                sleep,
                notes,
            };
            cmd_log(&mut svc, remote, fields, json).await
        }
        Commands::Show { date, json } => cmd_show(&svc, date, json),
        Commands::History { days, json } => cmd_history(&svc, days, json),
        Commands::Delete { date, json } => cmd_delete(&mut svc, remote, &date, json).await,
        Commands::Status { json } => cmd_status(&svc, json),
        Commands::Chart { kind, json } => cmd_chart(&svc, &kind, json),
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => cmd_settings_show(&svc, json),
            SettingsCommands::Set {
                goal_weight,
                goal_date,
                start_weight,
                start_date,
                json,
            } => cmd_settings_set(
                &mut svc,
                goal_weight,
                goal_date,
                start_weight,
                start_date,
                json,
            ),
            SettingsCommands::Reset { json } => cmd_settings_reset(&mut svc, json),
        },
        Commands::Export { format, output } => cmd_export(&svc, &format, output),
        Commands::Import { file, json } => cmd_import(&mut svc, remote, &file, json).await,
        Commands::Wipe { yes, json } => cmd_wipe(&mut svc, yes, json),
        Commands::Sync { json } => cmd_sync(&mut svc, remote, json).await,
        Commands::Serve { .. } | Commands::Remote { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitlog_core::models::RemoteStatus;

    #[tokio::test]
    async fn test_malformed_remote_config_keeps_local_commands_working() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        std::fs::write(dir.path().join("remote.json"), "{").unwrap();
        assert!(config.remote().is_err());

        let (mut svc, remote) = open_local(&config).unwrap();
        assert!(remote.is_none());

        let fields = EntryFields {
            weight: Some(98.0),
            ..EntryFields::default()
        };
        cmd_log(&mut svc, remote.as_ref(), fields, true).await.unwrap();
        cmd_status(&svc, true).unwrap();
        cmd_history(&svc, None, true).unwrap();
        assert_eq!(svc.entries().len(), 1);

        let status = svc.sync(remote.as_ref(), chrono::Utc::now()).await;
        assert_eq!(status, RemoteStatus::NotConfigured);
    }

    #[test]
    fn test_valid_remote_config_builds_client() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path()).unwrap();
        config
            .save_remote(&config::RemoteConfig {
                url: "http://127.0.0.1:9".into(),
                api_key: "k".into(),
            })
            .unwrap();
        let (_, remote) = open_local(&config).unwrap();
        assert!(remote.is_some());
    }
}
