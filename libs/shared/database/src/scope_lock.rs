use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Per-key async mutexes: the transactional read-modify-write primitive the
/// scheduling core serializes on.
///
/// A key names a serialization scope (for the token queue: `{doctor_id}:{date}`).
/// Operations holding the same scope's guard are mutually exclusive; distinct
/// scopes share nothing and proceed concurrently. Guards are owned so a caller
/// can carry one across await points until its write has committed.
#[derive(Clone, Default)]
pub struct ScopeLockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ScopeLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let scope = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        debug!("Acquiring scope lock for {}", key);
        scope.lock_owned().await
    }
}
