//! Health Check API Tests

use axum::http::{Method, StatusCode};

use crate::common::TestApp;

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/health/live", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_health_reports_connections() {
    let app = TestApp::new();
    let (_a, _rx_a) = app.connect("A");
    let (_b1, _rx_b1) = app.connect("B");
    let (_b2, _rx_b2) = app.connect("B");

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["connections"]["online_users"], 2);
    assert_eq!(body["checks"]["connections"]["active_connections"], 3);
}

#[tokio::test]
async fn test_store_outage_degrades_health() {
    let app = TestApp::new();
    app.store.set_unavailable(true);

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let (_conn, _rx) = app.connect("A");

    let response = {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;
        app.router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap()
    };
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("marketplace_realtime_connections_active"));
}
