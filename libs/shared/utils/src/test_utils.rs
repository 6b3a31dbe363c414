//! Shared fixtures for cell integration tests: JWT minting against the test
//! secret and canned Postgrest row payloads.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            action_token_secret: self.jwt_secret.clone(),
            notification_webhook_url: None,
            public_base_url: "http://localhost:3000".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }
}

/// Canned Postgrest row payloads matching the table shapes the cells expect.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(doctor_id: &str, full_name: &str, specialty: &str) -> Value {
        json!({
            "id": doctor_id,
            "full_name": full_name,
            "specialty": specialty,
            "is_available": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn availability_response(
        doctor_id: &str,
        day_of_week: i32,
        slots: Value,
    ) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "is_available": true,
            "time_slots": slots,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn appointment_response(
        doctor_id: &str,
        patient_id: &str,
        date: &str,
        queue_number: i32,
        estimated_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "date": date,
            "queue_number": queue_number,
            "estimated_time": estimated_time,
            "status": status,
            "consultation_duration": 30,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn medicine_response(
        medicine_id: &str,
        name: &str,
        stock: i32,
        reorder_level: i32,
    ) -> Value {
        json!({
            "id": medicine_id,
            "name": name,
            "stock": stock,
            "reorder_level": reorder_level,
            "reorder_quantity": 50,
            "supplier_price": 2.5,
            "restock_history": [],
            "last_restocked": null,
            "last_reorder_request": null,
            "notification_status": "pending",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn reorder_response(
        request_id: &str,
        medicine_id: &str,
        quantity: i32,
        urgency: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": request_id,
            "medicine_id": medicine_id,
            "quantity": quantity,
            "urgency": urgency,
            "status": status,
            "expected_delivery": (Utc::now() + Duration::days(5)).to_rfc3339(),
            "history": [
                {
                    "status": "initiated",
                    "date": Utc::now().to_rfc3339(),
                    "updated_by": null,
                    "notes": null
                }
            ],
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }
}
