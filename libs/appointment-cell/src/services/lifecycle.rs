// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{
    AppointmentSnapshot, DeliveryChannel, NotificationDispatcher, QueueEventKind,
};
use shared_config::AppConfig;
use shared_database::ScopeLockRegistry;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingPolicy,
    QueueSnapshot, RescheduleAppointmentRequest,
};
use crate::services::queue::QueueStateTracker;
use crate::services::tokens::TokenAllocator;
use crate::store::AppointmentStore;

/// Orchestrates every appointment state transition and queue mutation. Sole
/// writer of appointment rows and queue pointers; everything else reads.
///
/// Each operation either fully applies or fully fails: a reserved token is
/// only committed together with its row (the reservation's scope lock spans
/// both), and notifications go out strictly after the write lands.
pub struct AppointmentLifecycleService {
    store: Arc<dyn AppointmentStore>,
    allocator: TokenAllocator,
    queue: QueueStateTracker,
    dispatcher: NotificationDispatcher,
    policy: BookingPolicy,
}

impl AppointmentLifecycleService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        locks: ScopeLockRegistry,
        delivery: Arc<dyn DeliveryChannel>,
        config: &AppConfig,
    ) -> Self {
        Self {
            allocator: TokenAllocator::new(Arc::clone(&store), locks.clone()),
            queue: QueueStateTracker::new(Arc::clone(&store), locks),
            dispatcher: NotificationDispatcher::new(delivery, config.queue_lookahead),
            policy: BookingPolicy {
                open: config.clinic_open,
                close: config.clinic_close,
            },
            store,
        }
    }

    // ==============================================================================
    // LIFECYCLE OPERATIONS
    // ==============================================================================

    /// Book a new appointment: validate, reserve the next token for the
    /// doctor's day, persist as booked, then notify both parties.
    pub async fn book(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.validate_slot(request.appointment_date, request.appointment_time)?;
        self.store.patient_name(request.patient_id).await?;
        self.store.doctor_name(request.doctor_id).await?;

        let reservation = self
            .allocator
            .reserve(request.doctor_id, request.appointment_date)
            .await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            department_id: request.department_id,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            token_number: reservation.token,
            status: AppointmentStatus::Booked,
            reason: request.reason,
            created_at: now,
            updated_at: now,
        };

        let appointment = self.store.insert_appointment(appointment).await?;
        drop(reservation);

        info!(
            "Appointment {} booked with doctor {} for {} (token {})",
            appointment.id, appointment.doctor_id, appointment.appointment_date,
            appointment.token_number
        );

        let snapshot = self.snapshot_of(&appointment).await;
        self.dispatcher
            .dispatch(QueueEventKind::AppointmentCreated, snapshot)
            .await;

        Ok(appointment)
    }

    /// Booked -> Confirmed.
    pub async fn confirm(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .transition(appointment_id, AppointmentStatus::Confirmed)
            .await?;

        let snapshot = self.snapshot_of(&appointment).await;
        self.dispatcher
            .dispatch(QueueEventKind::QueueUpdated, snapshot)
            .await;

        Ok(appointment)
    }

    /// Move an appointment to a new date/time. The doctor is immutable here.
    /// A date change draws a fresh token from the destination day's sequence
    /// and retires the old slot (the gap it leaves is intentional); a
    /// time-only change keeps the token.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.store.fetch_appointment(appointment_id).await?;
        if appointment.status.is_terminal() {
            warn!(
                "Reschedule refused for appointment {} in status {}",
                appointment_id, appointment.status
            );
            return Err(AppointmentError::InvalidTransition(appointment.status));
        }

        self.validate_slot(request.new_date, request.new_time)?;

        if request.new_date != appointment.appointment_date {
            let reservation = self
                .allocator
                .reserve(appointment.doctor_id, request.new_date)
                .await?;

            debug!(
                "Appointment {} re-tokenized: {} on {} -> {} on {}",
                appointment_id, appointment.token_number, appointment.appointment_date,
                reservation.token, request.new_date
            );

            appointment.appointment_date = request.new_date;
            appointment.token_number = reservation.token;
            appointment.appointment_time = request.new_time;
            appointment.status = AppointmentStatus::Booked;
            if let Some(reason) = request.reason {
                appointment.reason = reason;
            }
            appointment.updated_at = Utc::now();

            appointment = self.store.update_appointment(appointment).await?;
            drop(reservation);
        } else {
            appointment.appointment_time = request.new_time;
            appointment.status = AppointmentStatus::Booked;
            if let Some(reason) = request.reason {
                appointment.reason = reason;
            }
            appointment.updated_at = Utc::now();

            appointment = self.store.update_appointment(appointment).await?;
        }

        info!("Appointment {} rescheduled to {}", appointment_id, appointment.appointment_date);

        let snapshot = self.snapshot_of(&appointment).await;
        self.dispatcher
            .dispatch(QueueEventKind::QueueUpdated, snapshot)
            .await;

        Ok(appointment)
    }

    /// Cancel an appointment. Idempotent on an already-cancelled row;
    /// refused once completed. Surviving tokens keep their numbers and the
    /// queue pointer stays where it is.
    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.store.fetch_appointment(appointment_id).await?;

        match appointment.status {
            AppointmentStatus::Cancelled => {
                debug!("Appointment {} already cancelled", appointment_id);
                return Ok(appointment);
            }
            AppointmentStatus::Completed => {
                return Err(AppointmentError::InvalidTransition(appointment.status));
            }
            _ => {}
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = Utc::now();
        let appointment = self.store.update_appointment(appointment).await?;

        info!(
            "Appointment {} cancelled, token {} retired",
            appointment_id, appointment.token_number
        );

        let snapshot = self.snapshot_of(&appointment).await;
        self.dispatcher
            .dispatch(QueueEventKind::AppointmentCancelled, snapshot)
            .await;

        Ok(appointment)
    }

    /// Mark a consultation done. Deliberately does NOT advance the queue
    /// pointer: calling the next patient is its own explicit operation, so a
    /// doctor can finish one patient and call the queue forward in either
    /// order.
    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .transition(appointment_id, AppointmentStatus::Completed)
            .await?;

        let snapshot = self.snapshot_of(&appointment).await;
        self.dispatcher
            .dispatch(QueueEventKind::AppointmentCompleted, snapshot)
            .await;

        Ok(appointment)
    }

    /// Hard delete. Live and completed history is retained for audit; only
    /// cancelled rows may be purged.
    pub async fn delete(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let appointment = self.store.fetch_appointment(appointment_id).await?;
        if appointment.status != AppointmentStatus::Cancelled {
            return Err(AppointmentError::NotCancelled(appointment.status));
        }

        self.store.delete_appointment(appointment_id).await?;
        info!("Cancelled appointment {} deleted", appointment_id);
        Ok(())
    }

    // ==============================================================================
    // QUEUE OPERATIONS
    // ==============================================================================

    /// Call the next token for a doctor's day, then notify: queue_updated to
    /// the doctor, your_turn to the patient owning the new current token (if
    /// that slot is still live), turn_approaching to patients inside the
    /// lookahead window.
    pub async fn advance_queue(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError> {
        self.store.doctor_name(doctor_id).await?;

        let current = self.queue.advance(doctor_id, date).await?;
        let live = self.live_snapshots(doctor_id, date).await;
        self.dispatcher
            .dispatch_queue_update(doctor_id, current, &live)
            .await;

        Ok(current)
    }

    /// Rewind a doctor's queue to 0.
    pub async fn reset_queue(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError> {
        self.store.doctor_name(doctor_id).await?;

        let current = self.queue.reset(doctor_id, date).await?;
        let live = self.live_snapshots(doctor_id, date).await;
        self.dispatcher
            .dispatch_queue_update(doctor_id, current, &live)
            .await;

        Ok(current)
    }

    pub async fn queue_snapshot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<QueueSnapshot, AppointmentError> {
        self.store.doctor_name(doctor_id).await?;
        self.queue.snapshot(doctor_id, date).await
    }

    // ==============================================================================
    // READ SURFACE
    // ==============================================================================

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store.fetch_appointment(appointment_id).await
    }

    pub async fn patient_appointments(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.patient_name(patient_id).await?;
        self.store.patient_appointments(patient_id).await
    }

    pub async fn doctor_day(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.doctor_name(doctor_id).await?;
        self.store.appointments_for(doctor_id, date).await
    }

    pub async fn register_doctor(&self, name: String) -> Result<Uuid, AppointmentError> {
        self.store.register_doctor(name).await
    }

    pub async fn register_patient(&self, name: String) -> Result<Uuid, AppointmentError> {
        self.store.register_patient(name).await
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    /// Valid next statuses per the appointment state machine.
    fn valid_transitions(status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match status {
            AppointmentStatus::Booked => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.store.fetch_appointment(appointment_id).await?;

        if !Self::valid_transitions(appointment.status).contains(&next) {
            warn!(
                "Invalid status transition attempted on {}: {} -> {}",
                appointment_id, appointment.status, next
            );
            return Err(AppointmentError::InvalidTransition(appointment.status));
        }

        appointment.status = next;
        appointment.updated_at = Utc::now();
        let appointment = self.store.update_appointment(appointment).await?;

        info!("Appointment {} moved to status {}", appointment_id, appointment.status);
        Ok(appointment)
    }

    fn validate_slot(&self, date: NaiveDate, time: NaiveTime) -> Result<(), AppointmentError> {
        if date < Utc::now().date_naive() {
            return Err(AppointmentError::InvalidTime(
                "Appointment date cannot be in the past".to_string(),
            ));
        }

        if time < self.policy.open || time > self.policy.close {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointments must fall within operating hours ({} - {})",
                self.policy.open, self.policy.close
            )));
        }

        Ok(())
    }

    /// Display snapshot for the dispatcher. Name lookups are best-effort by
    /// this point (the write already committed), so failures fall back to
    /// raw ids rather than erroring the operation.
    async fn snapshot_of(&self, appointment: &Appointment) -> AppointmentSnapshot {
        let patient_name = self
            .store
            .patient_name(appointment.patient_id)
            .await
            .unwrap_or_else(|_| appointment.patient_id.to_string());
        let doctor_name = self
            .store
            .doctor_name(appointment.doctor_id)
            .await
            .unwrap_or_else(|_| appointment.doctor_id.to_string());

        AppointmentSnapshot {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            patient_name,
            doctor_name,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            token_number: appointment.token_number,
            status: appointment.status.to_string(),
        }
    }

    async fn live_snapshots(&self, doctor_id: Uuid, date: NaiveDate) -> Vec<AppointmentSnapshot> {
        let appointments = match self.store.appointments_for(doctor_id, date).await {
            Ok(appointments) => appointments,
            Err(e) => {
                warn!("Could not load queue for notification fan-out: {}", e);
                return Vec::new();
            }
        };

        let mut snapshots = Vec::new();
        for appointment in appointments.iter().filter(|apt| apt.is_live()) {
            snapshots.push(self.snapshot_of(appointment).await);
        }
        snapshots
    }
}
