//! `upwatch users` subcommands

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::warn;

use super::truncate;
use crate::database::{Collection, RecordStore, RecordStoreExt, UserRecord, Versioned};
use crate::orchestrator::Storage;

const COL_NAME: usize = 30;
const COL_PHONE: usize = 12;

#[derive(Subcommand)]
pub enum UserCommands {
    /// List users with their number of checks
    List,

    /// Show one user, without secret fields
    Show {
        /// The user's phone number
        phone: String,
    },
}

pub async fn run(storage: &Storage, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::List => list(storage).await,
        UserCommands::Show { phone } => show(storage, &phone).await,
    }
}

async fn load_users(store: &dyn RecordStore) -> Result<Vec<UserRecord>> {
    let phones = store.list(Collection::Users).await.context("listing users")?;
    let mut users = Vec::with_capacity(phones.len());
    for phone in phones {
        match store.fetch::<UserRecord>(&phone).await {
            Ok(user) => users.push(user.record),
            Err(e) => warn!(phone = %phone, error = %e, "Skipping unreadable user"),
        }
    }
    Ok(users)
}

fn full_name(user: &UserRecord) -> String {
    format!("{} {}", user.first_name, user.last_name).trim().to_string()
}

async fn list(storage: &Storage) -> Result<()> {
    let users = load_users(storage.store.as_ref()).await?;
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!("{:<COL_NAME$} {:<COL_PHONE$} CHECKS", "NAME", "PHONE");
    println!("{}", "-".repeat(COL_NAME + COL_PHONE + 8));
    for user in &users {
        println!(
            "{:<COL_NAME$} {:<COL_PHONE$} {}",
            truncate(&full_name(user), COL_NAME),
            user.phone,
            user.checks.len()
        );
    }
    Ok(())
}

/// Pretty JSON for a user, secret fields removed.
pub fn render_user(user: &UserRecord) -> Result<String> {
    Ok(serde_json::to_string_pretty(&user.without_secrets())?)
}

async fn show(storage: &Storage, phone: &str) -> Result<()> {
    let user: Versioned<UserRecord> =
        storage.store.fetch(phone).await.with_context(|| format!("reading user {phone}"))?;
    println!("{}", render_user(&user.record)?);
    Ok(())
}
