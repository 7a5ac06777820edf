//! Client behavior against a mocked prediction service

use lead_scoring_client::{ClientError, PredictionClient, ReadinessPolicy, ServiceStatus};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy(deadline_ms: u64) -> ReadinessPolicy {
    ReadinessPolicy::default()
        .with_deadline(Duration::from_millis(deadline_ms))
        .with_poll_interval(Duration::from_millis(10))
}

async fn ready_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ready", "model_version": "2025.03-rf"})),
        )
        .mount(&server)
        .await;
    server
}

fn scenario_record() -> serde_json::Value {
    json!({
        "first_interaction": "Website",
        "profile_completed": "High",
        "time_spent": 120,
        "website_visits": 5
    })
}

#[tokio::test]
async fn test_health_parses_unavailable_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"status": "starting"})))
        .mount(&server)
        .await;

    let report = PredictionClient::new(server.uri()).health().await.unwrap();
    assert_eq!(report.status, ServiceStatus::Starting);
}

#[tokio::test]
async fn test_wait_until_ready_polls_through_starting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"status": "starting"})))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ready"})))
        .mount(&server)
        .await;

    let ready = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(5_000))
        .await
        .unwrap();
    assert_eq!(ready.client().base_url(), server.uri());
}

#[tokio::test]
async fn test_wait_until_ready_gives_up_after_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"status": "starting"})))
        .mount(&server)
        .await;

    let err = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(100))
        .await
        .unwrap_err();
    match err {
        ClientError::NotReady { last_status, .. } => assert_eq!(last_status, "starting"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_wait_until_ready_fails_fast_when_unhealthy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"status": "unhealthy"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(5_000))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unavailable(_)));
}

#[tokio::test]
async fn test_wait_until_ready_unreachable_service() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = PredictionClient::new(uri)
        .with_timeout(Duration::from_millis(50))
        .wait_until_ready(fast_policy(100))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
    match err {
        ClientError::NotReady { last_status, .. } => {
            assert!(last_status.starts_with("Network error"), "{last_status}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_predict_success() {
    let server = ready_server().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_json(scenario_record()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"probability": 0.83, "label": 1})),
        )
        .mount(&server)
        .await;

    let client = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(1_000))
        .await
        .unwrap();
    let result = client.predict(&scenario_record()).await.unwrap();
    assert_eq!(result.probability, 0.83);
    assert_eq!(result.label, 1);
}

#[tokio::test]
async fn test_predict_bad_request_maps_to_invalid_input() {
    let server = ready_server().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Required field 'first_interaction' is missing",
            "field": "first_interaction",
            "kind": "missing"
        })))
        .mount(&server)
        .await;

    let client = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(1_000))
        .await
        .unwrap();
    let err = client.predict(&json!({"website_visits": 1})).await.unwrap_err();

    assert!(err.is_user_error());
    match err {
        ClientError::InvalidInput { field, index, .. } => {
            assert_eq!(field, "first_interaction");
            assert_eq!(index, None);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_predict_unavailable() {
    let server = ready_server().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"error": "Model not ready"})),
        )
        .mount(&server)
        .await;

    let client = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(1_000))
        .await
        .unwrap();
    let err = client.predict(&scenario_record()).await.unwrap_err();
    assert!(matches!(err, ClientError::Unavailable(ref msg) if msg == "Model not ready"));
    assert!(!err.is_user_error());
}

#[tokio::test]
async fn test_predict_batch_reports_index() {
    let server = ready_server().await;
    Mock::given(method("POST"))
        .and(path("/predict/batch"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Field 'referral' has value 'Maybe' which is not one of [No, Yes]",
            "field": "referral",
            "index": 1
        })))
        .mount(&server)
        .await;

    let client = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(1_000))
        .await
        .unwrap();
    let err = client
        .predict_batch(&[scenario_record(), json!({"referral": "Maybe"})])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::InvalidInput { ref field, index: Some(1), .. } if field == "referral"
    ));
}

#[tokio::test]
async fn test_predict_batch_success() {
    let server = ready_server().await;
    Mock::given(method("POST"))
        .and(path("/predict/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [
                {"probability": 0.2, "label": 0},
                {"probability": 0.9, "label": 1}
            ]
        })))
        .mount(&server)
        .await;

    let client = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(1_000))
        .await
        .unwrap();
    let results = client
        .predict_batch(&[scenario_record(), scenario_record()])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].label, 1);
}

#[tokio::test]
async fn test_server_error_is_not_user_error() {
    let server = ready_server().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "Internal error"})))
        .mount(&server)
        .await;

    let client = PredictionClient::new(server.uri())
        .wait_until_ready(fast_policy(1_000))
        .await
        .unwrap();
    let err = client.predict(&scenario_record()).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 500, .. }));
}
