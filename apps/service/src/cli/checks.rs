//! `upwatch checks` subcommands

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use tracing::warn;

use super::truncate;
use crate::config::Config;
use crate::database::{CheckRecord, Collection, RecordStore, RecordStoreExt, Versioned};
use crate::monitoring::CheckState;
use crate::monitoring::validation;
use crate::orchestrator::Storage;
use crate::registry::{CheckRegistry, NewCheck};

const COL_ID: usize = 20;
const COL_STATE: usize = 5;
const COL_METHOD: usize = 6;
const COL_TARGET: usize = 48;

#[derive(Subcommand)]
pub enum CheckCommands {
    /// List checks
    List(ListArgs),

    /// Show one check as stored
    Show {
        /// Check id
        id: String,
    },

    /// Register a check for an existing user
    Add(AddArgs),

    /// Delete a check and drop it from its owner's list
    Remove {
        /// Check id
        id: String,
    },
}

#[derive(Args)]
pub struct ListArgs {
    /// Only checks in this state (up or down); a missing state counts as down
    #[arg(long)]
    pub state: Option<String>,
}

#[derive(Args)]
pub struct AddArgs {
    /// Owner's 10-character phone number
    #[arg(long)]
    pub phone: String,

    /// http or https
    #[arg(long)]
    pub protocol: String,

    /// Host and path, without the scheme
    #[arg(long)]
    pub url: String,

    /// get, post, put or delete
    #[arg(long, default_value = "get")]
    pub method: String,

    /// Comma separated status codes that count as up
    #[arg(long, value_delimiter = ',', default_value = "200")]
    pub success_codes: Vec<u16>,

    /// Seconds, 1 to 5
    #[arg(long, default_value_t = 3)]
    pub timeout: u64,
}

pub async fn run(config: &Config, storage: &Storage, command: CheckCommands) -> Result<()> {
    match command {
        CheckCommands::List(args) => list(storage, args).await,
        CheckCommands::Show { id } => show(storage, &id).await,
        CheckCommands::Add(args) => add(config, storage, args).await,
        CheckCommands::Remove { id } => remove(config, storage, &id).await,
    }
}

fn parse_state(raw: &str) -> Result<CheckState> {
    match CheckState::parse(&raw.to_ascii_lowercase()) {
        Some(state) => Ok(state),
        None => bail!("unknown state {raw:?}, expected up or down"),
    }
}

/// Every readable check, optionally only those in `state`. Unreadable records
/// are reported and left out.
pub async fn load_checks(store: &dyn RecordStore, state: Option<CheckState>) -> Result<Vec<CheckRecord>> {
    let ids = store.list(Collection::Checks).await.context("listing checks")?;
    let mut checks = Vec::with_capacity(ids.len());

    for id in ids {
        let check: Versioned<CheckRecord> = match store.fetch(&id).await {
            Ok(check) => check,
            Err(e) => {
                warn!(check_id = %id, error = %e, "Skipping unreadable check");
                continue;
            }
        };
        let current = validation::state(check.record.state.as_deref());
        if state.is_none_or(|wanted| wanted == current) {
            checks.push(check.record);
        }
    }

    Ok(checks)
}

fn target(check: &CheckRecord) -> String {
    format!(
        "{}://{}",
        check.protocol.as_deref().unwrap_or("?"),
        check.url.as_deref().unwrap_or("?")
    )
}

async fn list(storage: &Storage, args: ListArgs) -> Result<()> {
    let state = args.state.as_deref().map(parse_state).transpose()?;
    let checks = load_checks(storage.store.as_ref(), state).await?;

    if checks.is_empty() {
        println!("No checks found.");
        return Ok(());
    }

    println!(
        "{:<COL_ID$} {:<COL_STATE$} {:<COL_METHOD$} {:<COL_TARGET$} OWNER",
        "ID", "STATE", "METHOD", "TARGET"
    );
    println!("{}", "-".repeat(COL_ID + COL_STATE + COL_METHOD + COL_TARGET + 14));
    for check in &checks {
        println!(
            "{:<COL_ID$} {:<COL_STATE$} {:<COL_METHOD$} {:<COL_TARGET$} {}",
            check.id.as_deref().unwrap_or("?"),
            validation::state(check.state.as_deref()).as_str(),
            check.method.as_deref().unwrap_or("?").to_uppercase(),
            truncate(&target(check), COL_TARGET),
            check.user_phone.as_deref().unwrap_or("?"),
        );
    }
    println!("\n{} check(s)", checks.len());
    Ok(())
}

async fn show(storage: &Storage, id: &str) -> Result<()> {
    let check: Versioned<CheckRecord> =
        storage.store.fetch(id).await.with_context(|| format!("reading check {id}"))?;
    println!("{}", serde_json::to_string_pretty(&check.record)?);
    println!("version: {}", check.version);
    Ok(())
}

async fn add(config: &Config, storage: &Storage, args: AddArgs) -> Result<()> {
    let registry = CheckRegistry::new(storage.store.clone(), config.checks.max_per_user);
    let record = registry
        .register(NewCheck {
            phone: args.phone,
            protocol: args.protocol.to_ascii_lowercase(),
            url: args.url,
            method: args.method.to_ascii_lowercase(),
            success_codes: args.success_codes,
            timeout_seconds: args.timeout,
        })
        .await?;

    println!("Registered check {}", record.id.as_deref().unwrap_or("?"));
    Ok(())
}

async fn remove(config: &Config, storage: &Storage, id: &str) -> Result<()> {
    let registry = CheckRegistry::new(storage.store.clone(), config.checks.max_per_user);
    let removed = registry.remove(id).await?;
    println!("Removed check {id} ({})", target(&removed));
    Ok(())
}
