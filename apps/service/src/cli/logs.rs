//! `upwatch logs` subcommands

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::audit::{AuditLog, AuditLogError};
use crate::orchestrator::Storage;

#[derive(Subcommand)]
pub enum LogCommands {
    /// List rotated archives
    List,

    /// Print the records of an archive, or of a check's active log
    Show {
        /// Archive name as printed by `logs list`, or a check id
        name: String,
    },
}

pub async fn run(storage: &Storage, command: LogCommands) -> Result<()> {
    match command {
        LogCommands::List => list(storage).await,
        LogCommands::Show { name } => show(storage, &name).await,
    }
}

async fn list(storage: &Storage) -> Result<()> {
    let archives = storage.audit.archives().await.context("listing archives")?;
    if archives.is_empty() {
        println!("No archived logs.");
    }
    for archive in archives {
        println!("{archive}");
    }
    Ok(())
}

/// One pretty-printed block per JSON line; lines that are not JSON are kept
/// as they are.
pub fn render_records(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|value| serde_json::to_string_pretty(&value).ok())
                .unwrap_or_else(|| line.to_string())
        })
        .collect()
}

/// Archives take precedence; a name with no archive is read as an active log.
async fn load_text(audit: &AuditLog, name: &str) -> Result<String, AuditLogError> {
    match audit.decompress(name).await {
        Err(AuditLogError::NotFound(_)) => audit.read(name).await,
        other => other,
    }
}

async fn show(storage: &Storage, name: &str) -> Result<()> {
    let text = load_text(&storage.audit, name).await.with_context(|| format!("reading log {name}"))?;
    for record in render_records(&text) {
        println!("{record}\n");
    }
    Ok(())
}
