// libs/appointment-cell/src/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError};

/// Serialization scope for one doctor's queue on one day. Token allocation
/// and pointer mutation for the same key go through the same scope lock.
pub fn scope_key(doctor_id: &Uuid, date: NaiveDate) -> String {
    format!("{}:{}", doctor_id, date)
}

/// Persistence collaborator interface for the token-queue core.
///
/// Callers are responsible for serialization: methods here are plain reads
/// and writes, and the lifecycle services wrap them in per-scope locks. A
/// SQL-backed implementation slots behind the same trait.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert_appointment(&self, appointment: Appointment)
        -> Result<Appointment, AppointmentError>;

    async fn fetch_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError>;

    async fn update_appointment(&self, appointment: Appointment)
        -> Result<Appointment, AppointmentError>;

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError>;

    /// All appointments in a (doctor, date) scope, any status.
    async fn appointments_for(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn patient_appointments(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Highest token ever issued in the scope (0 if none). Monotonic: slots
    /// retired by cancellation or date-changing reschedule stay counted, so
    /// a retired number is never handed out again.
    async fn max_issued_token(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError>;

    async fn current_token(&self, doctor_id: Uuid, date: NaiveDate)
        -> Result<u32, AppointmentError>;

    async fn set_current_token(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        token: u32,
    ) -> Result<(), AppointmentError>;

    // Directory lookups. Registration itself belongs to the patient/doctor
    // CRUD surface; the queue core only needs existence and display names.
    async fn doctor_name(&self, doctor_id: Uuid) -> Result<String, AppointmentError>;

    async fn patient_name(&self, patient_id: Uuid) -> Result<String, AppointmentError>;

    async fn register_doctor(&self, name: String) -> Result<Uuid, AppointmentError>;

    async fn register_patient(&self, name: String) -> Result<Uuid, AppointmentError>;
}

/// In-memory reference implementation backing the API binary and the tests.
pub struct MemoryStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    issued: RwLock<HashMap<String, u32>>,
    pointers: RwLock<HashMap<String, u32>>,
    doctors: RwLock<HashMap<Uuid, String>>,
    patients: RwLock<HashMap<Uuid, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            appointments: RwLock::new(HashMap::new()),
            issued: RwLock::new(HashMap::new()),
            pointers: RwLock::new(HashMap::new()),
            doctors: RwLock::new(HashMap::new()),
            patients: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn insert_appointment(
        &self,
        appointment: Appointment,
    ) -> Result<Appointment, AppointmentError> {
        let key = scope_key(&appointment.doctor_id, appointment.appointment_date);
        {
            let mut issued = self.issued.write().await;
            let high_water = issued.entry(key).or_insert(0);
            if appointment.token_number > *high_water {
                *high_water = appointment.token_number;
            }
        }

        let mut appointments = self.appointments.write().await;
        appointments.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {} with token {}", appointment.id, appointment.token_number);
        Ok(appointment)
    }

    async fn fetch_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointments = self.appointments.read().await;
        appointments.get(&id).cloned().ok_or(AppointmentError::NotFound)
    }

    async fn update_appointment(
        &self,
        appointment: Appointment,
    ) -> Result<Appointment, AppointmentError> {
        {
            let appointments = self.appointments.read().await;
            if !appointments.contains_key(&appointment.id) {
                return Err(AppointmentError::NotFound);
            }
        }

        // A date-changing reschedule moves the row into a new scope; its new
        // token must raise that scope's high-water mark as well.
        let key = scope_key(&appointment.doctor_id, appointment.appointment_date);
        {
            let mut issued = self.issued.write().await;
            let high_water = issued.entry(key).or_insert(0);
            if appointment.token_number > *high_water {
                *high_water = appointment.token_number;
            }
        }

        let mut appointments = self.appointments.write().await;
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        let mut appointments = self.appointments.write().await;
        appointments.remove(&id).map(|_| ()).ok_or(AppointmentError::NotFound)
    }

    async fn appointments_for(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        let mut scoped: Vec<Appointment> = appointments
            .values()
            .filter(|apt| apt.doctor_id == doctor_id && apt.appointment_date == date)
            .cloned()
            .collect();
        scoped.sort_by_key(|apt| apt.token_number);
        Ok(scoped)
    }

    async fn patient_appointments(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        let mut owned: Vec<Appointment> = appointments
            .values()
            .filter(|apt| apt.patient_id == patient_id)
            .cloned()
            .collect();
        owned.sort_by_key(|apt| (apt.appointment_date, apt.token_number));
        Ok(owned)
    }

    async fn max_issued_token(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError> {
        let issued = self.issued.read().await;
        Ok(issued.get(&scope_key(&doctor_id, date)).copied().unwrap_or(0))
    }

    async fn current_token(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<u32, AppointmentError> {
        let pointers = self.pointers.read().await;
        Ok(pointers.get(&scope_key(&doctor_id, date)).copied().unwrap_or(0))
    }

    async fn set_current_token(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        token: u32,
    ) -> Result<(), AppointmentError> {
        let mut pointers = self.pointers.write().await;
        pointers.insert(scope_key(&doctor_id, date), token);
        Ok(())
    }

    async fn doctor_name(&self, doctor_id: Uuid) -> Result<String, AppointmentError> {
        let doctors = self.doctors.read().await;
        doctors.get(&doctor_id).cloned().ok_or(AppointmentError::DoctorNotFound)
    }

    async fn patient_name(&self, patient_id: Uuid) -> Result<String, AppointmentError> {
        let patients = self.patients.read().await;
        patients.get(&patient_id).cloned().ok_or(AppointmentError::PatientNotFound)
    }

    async fn register_doctor(&self, name: String) -> Result<Uuid, AppointmentError> {
        let id = Uuid::new_v4();
        let mut doctors = self.doctors.write().await;
        doctors.insert(id, name);
        Ok(id)
    }

    async fn register_patient(&self, name: String) -> Result<Uuid, AppointmentError> {
        let id = Uuid::new_v4();
        let mut patients = self.patients.write().await;
        patients.insert(id, name);
        Ok(id)
    }
}
