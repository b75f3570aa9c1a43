use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::models::{Doctor, Patient};
use appointment_cell::services::{AppointmentBookingService, AvailabilityService};
use appointment_cell::{AppointmentError, AppointmentState, CreateAppointmentRequest, InMemoryStore, ScheduleSlot};
use shared_utils::test_utils::{test_clock, TestConfig};

#[derive(Clone, Copy)]
struct Parties {
    department_id: Uuid,
    doctor_id: Uuid,
    patient_id: Uuid,
}

fn request(parties: Parties) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        department_id: parties.department_id,
        doctor_id: parties.doctor_id,
        patient_id: parties.patient_id,
        appointment_time: Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap(),
        service_type: "consult".to_string(),
    }
}

/// One doctor and one patient; `capacity` publishes the 09:00 slot on 2025-06-10.
async fn clinic(capacity: Option<u32>) -> (AppointmentState, Parties) {
    let store = Arc::new(InMemoryStore::new());
    let parties = Parties {
        department_id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
    };

    store
        .upsert_doctor(Doctor {
            id: parties.doctor_id,
            department_id: Some(parties.department_id),
            name: "Dr. Lin".to_string(),
            is_active: true,
        })
        .await;
    store
        .upsert_patient(Patient {
            id: parties.patient_id,
            name: "Chen Mei".to_string(),
            phone: None,
        })
        .await;

    if let Some(capacity) = capacity {
        store
            .seed_slots(vec![ScheduleSlot {
                id: Uuid::new_v4(),
                doctor_id: parties.doctor_id,
                department_id: Some(parties.department_id),
                slot_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
                slot_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                capacity,
            }])
            .await;
    }

    let state = AppointmentState::new(TestConfig::default().to_arc(), store, test_clock()).unwrap();
    (state, parties)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_exceed_capacity() {
    let (state, parties) = clinic(Some(2)).await;

    let attempts = (0..3).map(|_| {
        let state = state.clone();
        tokio::spawn(async move {
            AppointmentBookingService::new(&state)
                .create_appointment(request(parties))
                .await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 2);
    for failure in results.iter().filter(|r| r.is_err()) {
        assert_matches!(failure, Err(AppointmentError::SlotTaken));
    }

    // Availability agrees with what the store admitted.
    let slots = AvailabilityService::new(&state)
        .available_slots(parties.doctor_id, "2025-06-10")
        .await
        .unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].count, 2);
    assert_eq!(slots[0].capacity, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_storm_fills_slot_exactly() {
    let (state, parties) = clinic(Some(5)).await;

    let attempts = (0..50).map(|_| {
        let state = state.clone();
        tokio::spawn(async move {
            AppointmentBookingService::new(&state)
                .create_appointment(request(parties))
                .await
        })
    });

    let successes = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(successes, 5);

    let booked = AppointmentBookingService::new(&state)
        .appointments_for_doctor(parties.doctor_id)
        .await
        .unwrap();
    assert_eq!(booked.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_grid_mode_admits_single_booking() {
    let (state, parties) = clinic(None).await;

    let attempts = (0..10).map(|_| {
        let state = state.clone();
        tokio::spawn(async move {
            AppointmentBookingService::new(&state)
                .create_appointment(request(parties))
                .await
        })
    });

    let successes = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(successes, 1);

    let slots = AvailabilityService::new(&state)
        .available_slots(parties.doctor_id, "2025-06-10")
        .await
        .unwrap();
    let nine = slots
        .iter()
        .find(|s| s.slot == Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap())
        .unwrap();
    assert_eq!((nine.count, nine.capacity), (1, 1));
}
