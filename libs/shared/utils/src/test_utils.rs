use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, SlotPolicy};

use crate::clock::FixedClock;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub slot_policy: SlotPolicy,
    pub clinic_utc_offset_minutes: i32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            slot_policy: SlotPolicy::Fallback,
            clinic_utc_offset_minutes: 0,
        }
    }
}

impl TestConfig {
    /// Config pointing at a mock PostgREST server.
    pub fn with_supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn strict() -> Self {
        Self {
            slot_policy: SlotPolicy::Strict,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            slot_policy: self.slot_policy,
            clinic_utc_offset_minutes: self.clinic_utc_offset_minutes,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// 2025-06-10 08:00:00 UTC, an hour before the morning session.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("fixture instant is unambiguous"))
}

pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(test_now()))
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(id: Uuid, doctor_id: Uuid, patient_id: Uuid, time: &str, status: &str) -> Value {
        json!({
            "id": id,
            "department_id": Uuid::nil(),
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "appointment_time": time,
            "status": status,
            "service_type": "consult",
            "check_in_time": null,
            "reminder_sent_at": null,
            "created_at": "2025-06-01T00:00:00Z",
            "updated_at": "2025-06-01T00:00:00Z"
        })
    }

    pub fn slot_row(doctor_id: Uuid, date: &str, time: &str, capacity: u32) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "department_id": null,
            "slot_date": date,
            "slot_time": time,
            "capacity": capacity
        })
    }

    pub fn doctor_row(id: Uuid, name: &str) -> Value {
        json!({
            "id": id,
            "department_id": Uuid::nil(),
            "name": name,
            "is_active": true
        })
    }

    pub fn patient_row(id: Uuid, phone: &str) -> Value {
        json!({
            "id": id,
            "name": "Test Patient",
            "phone": phone
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
