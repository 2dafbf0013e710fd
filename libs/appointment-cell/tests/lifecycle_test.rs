mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::timeout;

use appointment_cell::{AppointmentError, AppointmentStatus};
use common::{clinic_day, next_clinic_day, setup};
use notification_cell::NotificationDispatcher;

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<String>) -> Value {
    let message = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event should arrive promptly")
        .expect("channel should stay open");
    serde_json::from_str(&message).expect("event should be valid JSON")
}

#[tokio::test]
async fn walkthrough_cancelled_token_is_still_called_but_silently() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient_a = ctx.register_patient("Asha Rao").await;
    let patient_b = ctx.register_patient("Vikram Shah").await;
    let patient_c = ctx.register_patient("Meera Nair").await;
    let date = clinic_day();

    let first = ctx
        .lifecycle
        .book(ctx.booking(patient_a, doctor, date))
        .await
        .expect("booking should succeed");
    let second = ctx
        .lifecycle
        .book(ctx.booking(patient_b, doctor, date))
        .await
        .expect("booking should succeed");
    let third = ctx
        .lifecycle
        .book(ctx.booking(patient_c, doctor, date))
        .await
        .expect("booking should succeed");

    assert_eq!(
        (first.token_number, second.token_number, third.token_number),
        (1, 2, 3)
    );

    ctx.lifecycle
        .cancel(second.id)
        .await
        .expect("cancel should succeed");

    // Subscribe after the setup traffic so only advance fan-out arrives.
    let mut rx_a = ctx
        .delivery
        .subscribe(&NotificationDispatcher::patient_channel(&patient_a))
        .await;
    let mut rx_b = ctx
        .delivery
        .subscribe(&NotificationDispatcher::patient_channel(&patient_b))
        .await;
    let mut rx_c = ctx
        .delivery
        .subscribe(&NotificationDispatcher::patient_channel(&patient_c))
        .await;
    let mut rx_doctor = ctx
        .delivery
        .subscribe(&NotificationDispatcher::doctor_channel(&doctor))
        .await;

    // 1st advance: A's turn.
    assert_eq!(ctx.lifecycle.advance_queue(doctor, date).await.unwrap(), 1);
    let event = next_event(&mut rx_a).await;
    assert_eq!(event["kind"], "your_turn");
    assert_eq!(event["appointment"]["token_number"], 1);
    assert_eq!(next_event(&mut rx_doctor).await["current_token"], 1);

    // 2nd advance: token 2 was cancelled, so nobody is called; the queue
    // still moves and the doctor still hears about it.
    assert_eq!(ctx.lifecycle.advance_queue(doctor, date).await.unwrap(), 2);
    assert_matches!(rx_b.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(next_event(&mut rx_doctor).await["current_token"], 2);

    // C heard their turn approaching while the gap was being called.
    let event = next_event(&mut rx_c).await;
    assert_eq!(event["kind"], "queue_updated");
    let event = next_event(&mut rx_c).await;
    assert_eq!(event["kind"], "turn_approaching");
    assert_eq!(event["queue_position"], 1);

    // 3rd advance: C's turn.
    assert_eq!(ctx.lifecycle.advance_queue(doctor, date).await.unwrap(), 3);
    let event = next_event(&mut rx_c).await;
    assert_eq!(event["kind"], "your_turn");

    // 4th advance: past the last issued token.
    let result = ctx.lifecycle.advance_queue(doctor, date).await;
    assert_matches!(result, Err(AppointmentError::AtEndOfQueue { max_token: 3 }));
}

#[tokio::test]
async fn cancellation_preserves_surviving_tokens_and_pointer() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;
    let date = clinic_day();

    let mut booked = Vec::new();
    for _ in 0..5 {
        booked.push(
            ctx.lifecycle
                .book(ctx.booking(patient, doctor, date))
                .await
                .expect("booking should succeed"),
        );
    }

    ctx.lifecycle.advance_queue(doctor, date).await.unwrap();
    ctx.lifecycle
        .cancel(booked[2].id)
        .await
        .expect("cancel should succeed");

    let remaining = ctx
        .lifecycle
        .doctor_day(doctor, date)
        .await
        .expect("listing should succeed");
    let live_tokens: Vec<u32> = remaining
        .iter()
        .filter(|apt| apt.is_live())
        .map(|apt| apt.token_number)
        .collect();
    assert_eq!(live_tokens, vec![1, 2, 4, 5]);

    let snapshot = ctx
        .lifecycle
        .queue_snapshot(doctor, date)
        .await
        .expect("snapshot should succeed");
    assert_eq!(snapshot.current_token, 1, "cancellation never moves the pointer");
}

#[tokio::test]
async fn reschedule_to_new_date_draws_from_destination_sequence() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;
    let date = clinic_day();
    let destination = next_clinic_day();

    ctx.lifecycle
        .book(ctx.booking(patient, doctor, date))
        .await
        .expect("booking should succeed");
    let moved = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, date))
        .await
        .expect("booking should succeed");

    // Destination day already has one appointment.
    ctx.lifecycle
        .book(ctx.booking(patient, doctor, destination))
        .await
        .expect("booking should succeed");

    let rescheduled = ctx
        .lifecycle
        .reschedule(
            moved.id,
            appointment_cell::RescheduleAppointmentRequest {
                new_date: destination,
                new_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                reason: Some("Patient request".to_string()),
            },
        )
        .await
        .expect("reschedule should succeed");

    assert_eq!(rescheduled.appointment_date, destination);
    assert_eq!(rescheduled.token_number, 2, "fresh token from the destination day");
    assert_eq!(rescheduled.status, AppointmentStatus::Booked);

    // The vacated slot on the original day stays retired.
    let next_on_origin = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, date))
        .await
        .expect("booking should succeed");
    assert_eq!(next_on_origin.token_number, 3);
}

#[tokio::test]
async fn reschedule_same_date_keeps_token() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;
    let date = clinic_day();

    let appointment = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, date))
        .await
        .expect("booking should succeed");
    ctx.lifecycle
        .confirm(appointment.id)
        .await
        .expect("confirm should succeed");

    let rescheduled = ctx
        .lifecycle
        .reschedule(
            appointment.id,
            appointment_cell::RescheduleAppointmentRequest {
                new_date: date,
                new_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                reason: None,
            },
        )
        .await
        .expect("reschedule should succeed");

    assert_eq!(rescheduled.token_number, appointment.token_number);
    assert_eq!(rescheduled.appointment_time, NaiveTime::from_hms_opt(15, 0, 0).unwrap());
    assert_eq!(rescheduled.status, AppointmentStatus::Booked, "back to booked after reschedule");
}

#[tokio::test]
async fn terminal_states_are_immutable() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;
    let date = clinic_day();

    let completed = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, date))
        .await
        .expect("booking should succeed");
    ctx.lifecycle
        .complete(completed.id)
        .await
        .expect("complete should succeed");

    let reschedule_request = appointment_cell::RescheduleAppointmentRequest {
        new_date: next_clinic_day(),
        new_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        reason: None,
    };

    assert_matches!(
        ctx.lifecycle.cancel(completed.id).await,
        Err(AppointmentError::InvalidTransition(AppointmentStatus::Completed))
    );
    assert_matches!(
        ctx.lifecycle.complete(completed.id).await,
        Err(AppointmentError::InvalidTransition(AppointmentStatus::Completed))
    );
    assert_matches!(
        ctx.lifecycle
            .reschedule(completed.id, reschedule_request.clone())
            .await,
        Err(AppointmentError::InvalidTransition(AppointmentStatus::Completed))
    );

    let cancelled = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, date))
        .await
        .expect("booking should succeed");
    ctx.lifecycle
        .cancel(cancelled.id)
        .await
        .expect("cancel should succeed");

    assert_matches!(
        ctx.lifecycle.complete(cancelled.id).await,
        Err(AppointmentError::InvalidTransition(AppointmentStatus::Cancelled))
    );
    assert_matches!(
        ctx.lifecycle.reschedule(cancelled.id, reschedule_request).await,
        Err(AppointmentError::InvalidTransition(AppointmentStatus::Cancelled))
    );

    // Re-cancel is the one idempotent exception.
    let recancelled = ctx
        .lifecycle
        .cancel(cancelled.id)
        .await
        .expect("re-cancel should succeed");
    assert_eq!(recancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn confirm_only_from_booked() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;

    let appointment = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, clinic_day()))
        .await
        .expect("booking should succeed");

    let confirmed = ctx
        .lifecycle
        .confirm(appointment.id)
        .await
        .expect("confirm should succeed");
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

    assert_matches!(
        ctx.lifecycle.confirm(appointment.id).await,
        Err(AppointmentError::InvalidTransition(AppointmentStatus::Confirmed))
    );
}

#[tokio::test]
async fn delete_requires_prior_cancellation() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;

    let appointment = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, clinic_day()))
        .await
        .expect("booking should succeed");

    assert_matches!(
        ctx.lifecycle.delete(appointment.id).await,
        Err(AppointmentError::NotCancelled(AppointmentStatus::Booked))
    );
    assert!(
        ctx.lifecycle.get(appointment.id).await.is_ok(),
        "refused delete must leave the row in place"
    );

    let completed = ctx
        .lifecycle
        .book(ctx.booking(patient, doctor, clinic_day()))
        .await
        .expect("booking should succeed");
    ctx.lifecycle
        .complete(completed.id)
        .await
        .expect("complete should succeed");
    assert_matches!(
        ctx.lifecycle.delete(completed.id).await,
        Err(AppointmentError::NotCancelled(AppointmentStatus::Completed))
    );

    ctx.lifecycle
        .cancel(appointment.id)
        .await
        .expect("cancel should succeed");
    ctx.lifecycle
        .delete(appointment.id)
        .await
        .expect("delete of a cancelled appointment should succeed");

    assert_matches!(
        ctx.lifecycle.get(appointment.id).await,
        Err(AppointmentError::NotFound)
    );
}

#[tokio::test]
async fn booking_validation_rejects_bad_input() {
    let ctx = setup().await;
    let doctor = ctx.register_doctor("Dr. Mehta").await;
    let patient = ctx.register_patient("Asha Rao").await;

    // Past date.
    let mut past = ctx.booking(patient, doctor, Utc::now().date_naive() - ChronoDuration::days(1));
    past.appointment_time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    assert_matches!(
        ctx.lifecycle.book(past).await,
        Err(AppointmentError::InvalidTime(_))
    );

    // Before opening.
    let mut early = ctx.booking(patient, doctor, clinic_day());
    early.appointment_time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    assert_matches!(
        ctx.lifecycle.book(early).await,
        Err(AppointmentError::InvalidTime(_))
    );

    // After closing.
    let mut late = ctx.booking(patient, doctor, clinic_day());
    late.appointment_time = NaiveTime::from_hms_opt(18, 30, 0).unwrap();
    assert_matches!(
        ctx.lifecycle.book(late).await,
        Err(AppointmentError::InvalidTime(_))
    );

    // Unknown parties are not-found, distinct from validation failures.
    assert_matches!(
        ctx.lifecycle
            .book(ctx.booking(patient, uuid::Uuid::new_v4(), clinic_day()))
            .await,
        Err(AppointmentError::DoctorNotFound)
    );
    assert_matches!(
        ctx.lifecycle
            .book(ctx.booking(uuid::Uuid::new_v4(), doctor, clinic_day()))
            .await,
        Err(AppointmentError::PatientNotFound)
    );

    // No tokens were committed by any rejected booking.
    let snapshot = ctx
        .lifecycle
        .queue_snapshot(doctor, clinic_day())
        .await
        .expect("snapshot should succeed");
    assert_eq!(snapshot.total_appointments, 0);
}
