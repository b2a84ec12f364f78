use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use embedmongo::{EmbeddedMongo, MongodConfig, health};

#[tokio::test]
async fn test_health_reports_idle_instance() {
    let cache = tempfile::tempdir().unwrap();
    let mongo = Arc::new(EmbeddedMongo::new(MongodConfig::new().with_cache_dir(cache.path())));

    let response = health::router(mongo)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "unavailable");
    assert_eq!(json["instance"]["state"], "idle");
    assert!(json["connection_string"].is_null());
}
