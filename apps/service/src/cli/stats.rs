//! `upwatch stats`

use std::fmt;

use anyhow::{Context, Result};

use super::checks::load_checks;
use crate::audit::AuditLog;
use crate::database::{Collection, RecordStore};
use crate::monitoring::CheckState;
use crate::monitoring::validation;
use crate::orchestrator::Storage;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub checks_up: usize,
    pub checks_down: usize,
    pub users: usize,
    pub tokens: usize,
    pub active_logs: usize,
    pub archives: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Checks (up)     {}", self.checks_up)?;
        writeln!(f, "Checks (down)   {}", self.checks_down)?;
        writeln!(f, "Users           {}", self.users)?;
        writeln!(f, "Tokens          {}", self.tokens)?;
        writeln!(f, "Active logs     {}", self.active_logs)?;
        writeln!(f, "Archived logs   {}", self.archives)
    }
}

pub async fn collect(store: &dyn RecordStore, audit: &AuditLog) -> Result<Stats> {
    let checks = load_checks(store, None).await?;
    let checks_up =
        checks.iter().filter(|c| validation::state(c.state.as_deref()) == CheckState::Up).count();

    Ok(Stats {
        checks_up,
        checks_down: checks.len() - checks_up,
        users: store.list(Collection::Users).await.context("listing users")?.len(),
        tokens: store.list(Collection::Tokens).await.context("listing tokens")?.len(),
        active_logs: audit.list(false).await.context("listing logs")?.len(),
        archives: audit.archives().await.context("listing archives")?.len(),
    })
}

pub async fn run(storage: &Storage) -> Result<()> {
    let stats = collect(storage.store.as_ref(), &storage.audit).await?;
    print!("{stats}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::{RecordStoreExt, TokenRecord, UserRecord};
    use crate::test_support::check_record;

    #[tokio::test]
    async fn counts_every_collection() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("aaaaaaaaaaaaaaaaaaaa.log"), "{}\n").unwrap();
        audit.rotate("aaaaaaaaaaaaaaaaaaaa", 1).await.unwrap();

        let store = MemoryStore::new();
        let mut up = check_record("aaaaaaaaaaaaaaaaaaaa", "a.example");
        up.state = Some("up".into());
        store.insert("aaaaaaaaaaaaaaaaaaaa", &up).await.unwrap();
        store.insert("bbbbbbbbbbbbbbbbbbbb", &check_record("bbbbbbbbbbbbbbbbbbbb", "b.example")).await.unwrap();
        store.insert("5551234567", &UserRecord { phone: "5551234567".into(), ..Default::default() }).await.unwrap();
        let token = TokenRecord { id: "t".into(), phone: "5551234567".into(), expires: 1, extra: Default::default() };
        store.insert("t", &token).await.unwrap();

        let stats = collect(&store, &audit).await.unwrap();

        assert_eq!(
            stats,
            Stats { checks_up: 1, checks_down: 1, users: 1, tokens: 1, active_logs: 1, archives: 1 }
        );
        assert!(stats.to_string().contains("Archived logs   1"));
    }
}
