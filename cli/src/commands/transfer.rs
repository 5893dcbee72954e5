use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::remote::RemoteClient;
use habitlog_core::export::{csv_filename, json_filename};
use habitlog_core::service::LogService;

use super::helpers::{report_remote, today};

pub(crate) fn cmd_export(svc: &LogService, format: &str, output: Option<PathBuf>) -> Result<()> {
    let (content, default_name) = match format {
        "json" => (svc.export_json(Utc::now())?, json_filename(today())),
        "csv" => (svc.export_csv()?, csv_filename(today())),
        _ => bail!("Unknown export format '{format}'. Use json or csv"),
    };

    let path = output.unwrap_or_else(|| PathBuf::from(default_name));
    if path.as_os_str() == "-" {
        print!("{content}");
        return Ok(());
    }

    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!(
        "Exported {} entries to {}",
        svc.entries().len(),
        path.display()
    );
    Ok(())
}

pub(crate) async fn cmd_import(
    svc: &mut LogService,
    remote: Option<&RemoteClient>,
    file: &Path,
    json: bool,
) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let summary = svc.import(&bytes, today())?;

    let status = svc.sync(remote, Utc::now()).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "imported": summary,
                "remote": status,
            }))?
        );
    } else {
        println!(
            "Imported {} entries{}",
            summary.entries_imported,
            if summary.settings_imported {
                " and settings"
            } else {
                ""
            }
        );
        report_remote(&status);
    }
    Ok(())
}

pub(crate) fn cmd_wipe(svc: &mut LogService, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("This deletes every local entry and the settings. Re-run with --yes to confirm");
    }

    let count = svc.entries().len();
    svc.wipe(today())?;

    if json {
        println!("{}", serde_json::json!({ "wiped": count }));
    } else {
        println!("Deleted {count} entries and reset settings");
    }
    Ok(())
}
