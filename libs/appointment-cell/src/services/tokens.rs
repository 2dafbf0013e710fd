// libs/appointment-cell/src/services/tokens.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use shared_database::ScopeLockRegistry;

use crate::models::AppointmentError;
use crate::store::{scope_key, AppointmentStore};

/// A token reserved but not yet committed. Holding the reservation keeps the
/// (doctor, date) scope locked, so the caller's insert and the max+1 read
/// form one indivisible step; dropping it on an error path releases the slot
/// without ever committing the number.
pub struct TokenReservation {
    pub token: u32,
    _guard: OwnedMutexGuard<()>,
}

/// Computes the next queue position for a (doctor, date) scope.
pub struct TokenAllocator {
    store: Arc<dyn AppointmentStore>,
    locks: ScopeLockRegistry,
}

impl TokenAllocator {
    pub fn new(store: Arc<dyn AppointmentStore>, locks: ScopeLockRegistry) -> Self {
        Self { store, locks }
    }

    /// Reserve the next token in the scope: lock, read the high-water mark,
    /// hand back max+1 together with the held lock. Concurrent reservations
    /// for the same scope serialize here; distinct scopes never contend.
    pub async fn reserve(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<TokenReservation, AppointmentError> {
        let guard = self.locks.acquire(&scope_key(&doctor_id, date)).await;
        let max = self.store.max_issued_token(doctor_id, date).await?;
        let token = max + 1;

        debug!("Reserved token {} for doctor {} on {}", token, doctor_id, date);
        Ok(TokenReservation { token, _guard: guard })
    }
}
