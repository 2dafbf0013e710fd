#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::{AppointmentStore, BookAppointmentRequest, MemoryStore};
use notification_cell::{BroadcastDelivery, DeliveryChannel};
use shared_config::AppConfig;
use shared_database::ScopeLockRegistry;

pub struct TestContext {
    pub lifecycle: Arc<AppointmentLifecycleService>,
    pub store: Arc<MemoryStore>,
    pub delivery: Arc<BroadcastDelivery>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
        clinic_open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        clinic_close: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        queue_lookahead: 1,
        port: 0,
    }
}

pub async fn setup() -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let delivery = Arc::new(BroadcastDelivery::new(64));
    let lifecycle = Arc::new(AppointmentLifecycleService::new(
        Arc::clone(&store) as Arc<dyn AppointmentStore>,
        ScopeLockRegistry::new(),
        Arc::clone(&delivery) as Arc<dyn DeliveryChannel>,
        &test_config(),
    ));

    TestContext {
        lifecycle,
        store,
        delivery,
    }
}

impl TestContext {
    pub async fn register_doctor(&self, name: &str) -> Uuid {
        self.store
            .register_doctor(name.to_string())
            .await
            .expect("doctor registration should succeed")
    }

    pub async fn register_patient(&self, name: &str) -> Uuid {
        self.store
            .register_patient(name.to_string())
            .await
            .expect("patient registration should succeed")
    }

    pub fn booking(&self, patient_id: Uuid, doctor_id: Uuid, date: NaiveDate) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id,
            doctor_id,
            department_id: None,
            appointment_date: date,
            appointment_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            reason: "Routine consultation".to_string(),
        }
    }
}

/// A week out: safely in the future and inside operating-hours validation.
pub fn clinic_day() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(7)
}

pub fn next_clinic_day() -> NaiveDate {
    clinic_day() + Duration::days(1)
}
