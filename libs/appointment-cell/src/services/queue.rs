// libs/appointment-cell/src/services/queue.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::ScopeLockRegistry;

use crate::models::{AppointmentError, QueueEntry, QueueSnapshot};
use crate::store::{scope_key, AppointmentStore};

/// Owner of the per-(doctor, date) "current token" pointer.
///
/// The pointer is store-backed, implicitly created at 0, and mutated only
/// through `advance` and `reset`. Both are atomic per scope relative to each
/// other and to token allocation.
pub struct QueueStateTracker {
    store: Arc<dyn AppointmentStore>,
    locks: ScopeLockRegistry,
}

impl QueueStateTracker {
    pub fn new(store: Arc<dyn AppointmentStore>, locks: ScopeLockRegistry) -> Self {
        Self { store, locks }
    }

    /// 0 means no patient has been called yet today.
    pub async fn current_token(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError> {
        self.store.current_token(doctor_id, date).await
    }

    /// Call the next token. Fails with `AtEndOfQueue` once the pointer has
    /// reached the highest issued token; the pointer stops at every integer
    /// in between, including slots retired by cancellation.
    pub async fn advance(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError> {
        let _guard = self.locks.acquire(&scope_key(&doctor_id, date)).await;

        let current = self.store.current_token(doctor_id, date).await?;
        let max_token = self.store.max_issued_token(doctor_id, date).await?;
        if current >= max_token {
            debug!(
                "Advance refused for doctor {} on {}: current {} already at max {}",
                doctor_id, date, current, max_token
            );
            return Err(AppointmentError::AtEndOfQueue { max_token });
        }

        let next = current + 1;
        self.store.set_current_token(doctor_id, date, next).await?;
        info!("Queue for doctor {} on {} advanced to token {}", doctor_id, date, next);
        Ok(next)
    }

    /// Unconditionally rewind to 0 (new day, or operator correction).
    /// Authorization (doctor/staff/admin) is enforced at the handler.
    pub async fn reset(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, AppointmentError> {
        let _guard = self.locks.acquire(&scope_key(&doctor_id, date)).await;

        self.store.set_current_token(doctor_id, date, 0).await?;
        info!("Queue for doctor {} on {} reset", doctor_id, date);
        Ok(0)
    }

    /// Authoritative queue view: live appointments in token order plus the
    /// current pointer.
    pub async fn snapshot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<QueueSnapshot, AppointmentError> {
        let current_token = self.store.current_token(doctor_id, date).await?;
        let appointments = self.store.appointments_for(doctor_id, date).await?;

        let mut queue = Vec::new();
        for appointment in appointments.iter().filter(|apt| apt.is_live()) {
            let patient_name = self.store.patient_name(appointment.patient_id).await?;
            queue.push(QueueEntry {
                appointment_id: appointment.id,
                patient_id: appointment.patient_id,
                patient_name,
                token_number: appointment.token_number,
                status: appointment.status,
                appointment_time: appointment.appointment_time,
            });
        }

        Ok(QueueSnapshot {
            doctor_id,
            date,
            current_token,
            total_appointments: queue.len(),
            queue,
        })
    }
}
