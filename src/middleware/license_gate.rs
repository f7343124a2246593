//! Request-path license enforcement.
//!
//! Inserted ahead of business routes. Every request resolves synchronously to
//! pass or reject; there is no pending state. Rejections never expose
//! internal error detail, only the license status and where to fix it.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;

use crate::db::queries;
use crate::models::LicenseStatus;
use crate::service::AppState;

use super::AuthContext;

/// Where rejected interactive callers are sent.
const MANAGE_URL: &str = "/license";

#[derive(Serialize)]
struct RejectBody {
    error: &'static str,
    license_status: LicenseStatus,
    manage_url: &'static str,
}

pub async fn license_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Privileged callers pass without a check.
    if let Some(auth) = request.extensions().get::<AuthContext>() {
        if auth.is_privileged() {
            return next.run(request).await;
        }
    }

    // Allow-listed paths (license admin, auth, health) pass so a lapsed
    // license can always be fixed.
    let path = request.uri().path().to_string();
    if is_exempt(&path, &state.exempt_paths) {
        return next.run(request).await;
    }

    let verdict = state.license.check_license().await;

    if verdict.is_valid(queries::now()) {
        // Downstream consumers (feature flags, display) read the verdict from
        // request extensions.
        request.extensions_mut().insert(verdict);
        return next.run(request).await;
    }

    tracing::debug!(
        status = %verdict.status,
        path = %path,
        "Request rejected by license gate"
    );

    if wants_json(&request, &path) {
        let body = RejectBody {
            error: "A valid license is required",
            license_status: verdict.status,
            manage_url: MANAGE_URL,
        };
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    } else {
        Redirect::to(MANAGE_URL).into_response()
    }
}

fn is_exempt(path: &str, exempt: &[String]) -> bool {
    exempt
        .iter()
        .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix)))
}

/// Machine-style callers get a structured rejection; everyone else gets a
/// redirect to the license admin surface.
fn wants_json(request: &Request, path: &str) -> bool {
    if path.starts_with("/api/") {
        return true;
    }
    request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}
