use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AppointmentSnapshot, QueueEvent, QueueEventKind};
use crate::services::channel::DeliveryChannel;

/// Resolves which parties care about a lifecycle event and publishes to their
/// channels. Strictly a side effect: it reads snapshots, never core state,
/// and a failed publish never propagates to the operation that triggered it.
pub struct NotificationDispatcher {
    delivery: Arc<dyn DeliveryChannel>,
    lookahead: u32,
}

impl NotificationDispatcher {
    pub fn new(delivery: Arc<dyn DeliveryChannel>, lookahead: u32) -> Self {
        Self { delivery, lookahead }
    }

    pub fn patient_channel(patient_id: &Uuid) -> String {
        format!("user_{}", patient_id)
    }

    pub fn doctor_channel(doctor_id: &Uuid) -> String {
        format!("doctor_{}", doctor_id)
    }

    /// Publish an appointment-scoped event to the patient's and the doctor's
    /// channels.
    pub async fn dispatch(&self, kind: QueueEventKind, snapshot: AppointmentSnapshot) {
        let patient_channel = Self::patient_channel(&snapshot.patient_id);
        let doctor_channel = Self::doctor_channel(&snapshot.doctor_id);
        let event = QueueEvent::for_appointment(kind, snapshot);

        self.publish_best_effort(&patient_channel, &event).await;
        self.publish_best_effort(&doctor_channel, &event).await;
    }

    /// Fan out a queue-position change after an advance or reset.
    ///
    /// The doctor's channel always gets a queue_updated event. Each live
    /// appointment's patient gets, by position relative to the new current
    /// token: your_turn on an exact match, turn_approaching within the
    /// lookahead window, queue_updated with their computed position while
    /// still further back, and nothing once the pointer has passed them.
    pub async fn dispatch_queue_update(
        &self,
        doctor_id: Uuid,
        current_token: u32,
        live: &[AppointmentSnapshot],
    ) {
        let doctor_event =
            QueueEvent::for_queue(QueueEventKind::QueueUpdated, doctor_id, current_token);
        self.publish_best_effort(&Self::doctor_channel(&doctor_id), &doctor_event)
            .await;

        for snapshot in live {
            let channel = Self::patient_channel(&snapshot.patient_id);
            let token = snapshot.token_number;

            let event = if token == current_token {
                QueueEvent::for_appointment(QueueEventKind::YourTurn, snapshot.clone())
                    .at_position(current_token, 0)
            } else if token > current_token && token - current_token <= self.lookahead {
                QueueEvent::for_appointment(QueueEventKind::TurnApproaching, snapshot.clone())
                    .at_position(current_token, token - current_token)
            } else if token > current_token {
                QueueEvent::for_appointment(QueueEventKind::QueueUpdated, snapshot.clone())
                    .at_position(current_token, token - current_token)
            } else {
                // Pointer already past this token; nothing left to announce.
                continue;
            };

            self.publish_best_effort(&channel, &event).await;
        }
    }

    async fn publish_best_effort(&self, channel: &str, event: &QueueEvent) {
        match self.delivery.publish(channel, event).await {
            Ok(()) => debug!("Dispatched {} to {}", event.kind, channel),
            // At-most-once: the lifecycle write already committed, so a
            // delivery failure is logged and dropped here.
            Err(e) => warn!("Dropping {} notification for {}: {}", event.kind, channel, e),
        }
    }
}
