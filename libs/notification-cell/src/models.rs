use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Queue lifecycle events pushed to connected clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    AppointmentCreated,
    QueueUpdated,
    TurnApproaching,
    YourTurn,
    AppointmentCompleted,
    AppointmentCancelled,
}

impl QueueEventKind {
    pub fn priority(&self) -> EventPriority {
        match self {
            QueueEventKind::YourTurn => EventPriority::High,
            QueueEventKind::TurnApproaching => EventPriority::Medium,
            _ => EventPriority::Normal,
        }
    }
}

impl fmt::Display for QueueEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueEventKind::AppointmentCreated => "appointment_created",
            QueueEventKind::QueueUpdated => "queue_updated",
            QueueEventKind::TurnApproaching => "turn_approaching",
            QueueEventKind::YourTurn => "your_turn",
            QueueEventKind::AppointmentCompleted => "appointment_completed",
            QueueEventKind::AppointmentCancelled => "appointment_cancelled",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Normal,
    Medium,
    High,
}

/// Read-only view of an appointment, carrying exactly the fields clients need
/// to render a queue entry. The dispatcher never sees core state itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub token_number: u32,
    pub status: String,
}

/// Envelope published to a delivery channel. `appointment` is absent for
/// queue-level events that are not about one specific appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub kind: QueueEventKind,
    pub priority: EventPriority,
    pub doctor_id: Uuid,
    pub appointment: Option<AppointmentSnapshot>,
    pub current_token: Option<u32>,
    pub queue_position: Option<u32>,
    pub emitted_at: DateTime<Utc>,
}

impl QueueEvent {
    pub fn for_appointment(kind: QueueEventKind, snapshot: AppointmentSnapshot) -> Self {
        Self {
            kind,
            priority: kind.priority(),
            doctor_id: snapshot.doctor_id,
            appointment: Some(snapshot),
            current_token: None,
            queue_position: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn for_queue(kind: QueueEventKind, doctor_id: Uuid, current_token: u32) -> Self {
        Self {
            kind,
            priority: kind.priority(),
            doctor_id,
            appointment: None,
            current_token: Some(current_token),
            queue_position: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn at_position(mut self, current_token: u32, queue_position: u32) -> Self {
        self.current_token = Some(current_token);
        self.queue_position = Some(queue_position);
        self
    }
}
