use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::LogNotifier;
use pharmacy_cell::router::pharmacy_routes;
use shared_utils::action_token::mint_action_token;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_app(config: &TestConfig) -> Router {
    pharmacy_routes(config.to_arc(), Arc::new(LogNotifier))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn restock_link_confirms_and_reports_new_stock() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let medicine_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/medicines"))
        .and(query_param("id", format!("eq.{}", medicine_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::medicine_response(
                &medicine_id.to_string(),
                "Ibuprofen",
                3,
                10
            )
        ])))
        .mount(&server)
        .await;

    let mut restocked = MockSupabaseResponses::medicine_response(
        &medicine_id.to_string(),
        "Ibuprofen",
        53,
        10,
    );
    restocked["notification_status"] = json!("restocked");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/medicines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([restocked])))
        .mount(&server)
        .await;

    let token = mint_action_token(medicine_id, "restock", &config.jwt_secret, Utc::now());
    let app = create_test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/medicines/{}/restock/{}", medicine_id, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("Restock confirmed"));
    assert!(html.contains("53"));
}

#[tokio::test]
async fn restock_link_with_garbage_token_renders_error() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let app = create_test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/medicines/{}/restock/not-a-real-token",
                    Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_string(response).await;
    assert!(html.contains("Restock failed"));
}

#[tokio::test]
async fn restock_link_for_wrong_medicine_renders_error() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let app = create_test_app(&config);

    // Valid signature, but the path names a different medicine.
    let token = mint_action_token(Uuid::new_v4(), "restock", &config.jwt_secret, Utc::now());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/medicines/{}/restock/{}", Uuid::new_v4(), token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_string(response).await;
    assert!(html.contains("Restock failed"));
}

#[tokio::test]
async fn low_stock_report_requires_admin() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let patient = TestUser::patient("patient@example.com");

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/medicines/low-stock")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn low_stock_report_classifies_urgency() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let admin = TestUser::admin("admin@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/medicines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::medicine_response(&Uuid::new_v4().to_string(), "Aspirin", 0, 10),
            MockSupabaseResponses::medicine_response(&Uuid::new_v4().to_string(), "Ibuprofen", 4, 10),
            MockSupabaseResponses::medicine_response(&Uuid::new_v4().to_string(), "Paracetamol", 80, 10),
        ])))
        .mount(&server)
        .await;

    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/medicines/low-stock")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).unwrap();
    let report = body["low_stock"].as_array().unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[0]["urgency"], "high");
    assert_eq!(report[1]["urgency"], "medium");
}

#[tokio::test]
async fn create_medicine_rejects_zero_reorder_level() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri());
    let admin = TestUser::admin("admin@example.com");

    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/medicines")
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "Aspirin",
                        "stock": 5,
                        "reorder_level": 0
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
