//! HTTP validator behavior against a local stub authority.

use std::time::Duration;

use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;

use license_sentry::models::LicenseStatus;
use license_sentry::validator::{HttpValidator, LicenseValidator, ValidatorError};

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn validator_for(base: &str) -> HttpValidator {
    HttpValidator::new(&format!("{}/validate", base), Duration::from_secs(1))
        .expect("Failed to build validator")
}

#[tokio::test]
async fn successful_validation_parses_the_verdict() {
    let app = Router::new().route(
        "/validate",
        post(|Json(body): Json<serde_json::Value>| async move {
            assert_eq!(body["license_key"], "K1");
            assert_eq!(body["domain"], "assets.example.com");
            Json(serde_json::json!({
                "status": "active",
                "company": "Acme Corp",
                "valid_until": 4102444800i64,
                "features": { "reports": true },
                "msg": "ok"
            }))
        }),
    );
    let base = serve(app).await;

    let verdict = validator_for(&base)
        .validate("K1", "assets.example.com")
        .await
        .unwrap();

    assert_eq!(verdict.status, LicenseStatus::Active);
    assert_eq!(verdict.company.as_deref(), Some("Acme Corp"));
    assert_eq!(verdict.valid_until, Some(4102444800));
    assert!(verdict.has_feature("reports"));
}

#[tokio::test]
async fn non_2xx_response_is_a_rejection() {
    let app = Router::new().route(
        "/validate",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "unknown license key" })),
            )
                .into_response()
        }),
    );
    let base = serve(app).await;

    let err = validator_for(&base).validate("K1", "d").await.unwrap_err();

    match err {
        ValidatorError::Rejected(msg) => assert!(msg.contains("unknown license key")),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn ok_response_with_error_status_is_a_rejection() {
    let app = Router::new().route(
        "/validate",
        post(|| async {
            Json(serde_json::json!({ "status": "error", "msg": "key revoked" }))
        }),
    );
    let base = serve(app).await;

    let err = validator_for(&base).validate("K1", "d").await.unwrap_err();

    assert!(matches!(err, ValidatorError::Rejected(msg) if msg.contains("key revoked")));
}

#[tokio::test]
async fn unparseable_2xx_body_is_malformed() {
    let app = Router::new().route("/validate", post(|| async { "not json at all" }));
    let base = serve(app).await;

    let err = validator_for(&base).validate("K1", "d").await.unwrap_err();

    assert!(matches!(err, ValidatorError::Malformed(_)));
}

#[tokio::test]
async fn unreachable_authority_is_a_network_error() {
    // Nothing listens on this port.
    let validator =
        HttpValidator::new("http://127.0.0.1:9/validate", Duration::from_millis(500))
            .expect("Failed to build validator");

    let err = validator.validate("K1", "d").await.unwrap_err();

    assert!(matches!(err, ValidatorError::Network(_)));
}
