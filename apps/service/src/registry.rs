//! Check registration and removal, keeping each owner's check list in step.

use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::{CheckRecord, RecordStore, RecordStoreExt, StoreError, UserRecord, Versioned};
use crate::monitoring::validation::{self, CHECK_ID_LEN, ValidationError};

/// Ids are random, so a collision is retried this many times.
const ID_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("no user with phone {0}")]
    UnknownUser(String),

    #[error("user {phone} already has the maximum of {max} checks")]
    LimitReached { phone: String, max: usize },

    #[error("could not allocate a free check id")]
    IdExhausted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A check as submitted by its owner, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewCheck {
    pub phone: String,
    pub protocol: String,
    pub url: String,
    pub method: String,
    pub success_codes: Vec<u16>,
    pub timeout_seconds: u64,
}

/// A fresh check id of [`CHECK_ID_LEN`] alphanumeric characters.
pub fn random_check_id() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(CHECK_ID_LEN).map(char::from).collect()
}

pub struct CheckRegistry {
    store: Arc<dyn RecordStore>,
    max_per_user: usize,
}

impl CheckRegistry {
    /// Create a new registry allowing `max_per_user` checks per owner.
    pub fn new(store: Arc<dyn RecordStore>, max_per_user: usize) -> Self {
        Self { store, max_per_user }
    }

    /// Validate, store the check and append it to the owner's list.
    pub async fn register(&self, new: NewCheck) -> Result<CheckRecord, RegistryError> {
        let phone = validation::phone(Some(new.phone.as_str()))?;
        let mut record = CheckRecord {
            id: None,
            user_phone: Some(phone.clone()),
            protocol: Some(validation::protocol(Some(new.protocol.as_str()))?.as_str().to_string()),
            url: Some(validation::url(Some(new.url.as_str()))?),
            method: Some(validation::method(Some(new.method.as_str()))?.as_str().to_string()),
            success_codes: Some(validation::success_codes(Some(new.success_codes.as_slice()))?),
            timeout_seconds: Some(validation::timeout_seconds(Some(new.timeout_seconds))?),
            ..Default::default()
        };

        let mut owner: Versioned<UserRecord> = self.store.fetch(&phone).await.map_err(|e| {
            if e.is_not_found() { RegistryError::UnknownUser(phone.clone()) } else { e.into() }
        })?;
        if owner.record.checks.len() >= self.max_per_user {
            return Err(RegistryError::LimitReached { phone, max: self.max_per_user });
        }

        let id = self.insert_with_fresh_id(&mut record).await?;

        owner.record.checks.push(id.clone());
        if let Err(e) = self.store.save(&phone, &owner).await {
            // Leave no check behind that its owner does not list.
            if let Err(cleanup) = self.store.remove::<CheckRecord>(&id).await {
                warn!(check_id = %id, error = %cleanup, "Failed to roll back check after owner update failed");
            }
            return Err(e.into());
        }

        info!(check_id = %id, phone = %phone, "Check registered");
        Ok(record)
    }

    async fn insert_with_fresh_id(&self, record: &mut CheckRecord) -> Result<String, RegistryError> {
        for _ in 0..ID_ATTEMPTS {
            let id = random_check_id();
            record.id = Some(id.clone());
            match self.store.insert(&id, &*record).await {
                Ok(()) => return Ok(id),
                Err(StoreError::AlreadyExists { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RegistryError::IdExhausted)
    }

    /// Delete a check and drop it from its owner's list.
    ///
    /// A missing owner is logged; the check is deleted regardless.
    pub async fn remove(&self, id: &str) -> Result<CheckRecord, RegistryError> {
        let check: Versioned<CheckRecord> = self.store.fetch(id).await?;
        self.store.remove::<CheckRecord>(id).await?;

        let Some(phone) = check.record.user_phone.as_deref() else {
            warn!(check_id = id, "Removed check had no owner");
            return Ok(check.record);
        };

        match self.store.fetch::<UserRecord>(phone).await {
            Ok(mut owner) => {
                owner.record.checks.retain(|listed| listed != id);
                self.store.save(phone, &owner).await?;
            }
            Err(e) if e.is_not_found() => warn!(check_id = id, phone, "Owner of removed check not found"),
            Err(e) => return Err(e.into()),
        }

        info!(check_id = id, "Check removed");
        Ok(check.record)
    }
}
