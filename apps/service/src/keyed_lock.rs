use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutual exclusion scoped to a string key.
///
/// Callers holding guards for different keys never contend; two callers on the
/// same key are serialized in arrival order.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for as long as the key is locked.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop slots nobody is holding or waiting on.
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        KeyGuard { _guard: slot.lock_owned().await }
    }
}
