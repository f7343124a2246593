//! License administration endpoints.
//!
//! Consumed by the rest of the application (and operators) to install,
//! inspect, recheck, and remove the license. These paths sit on the gate's
//! allow-list: a lapsed license must not lock the operator out of fixing it.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::models::{LicenseStatusResponse, SetLicenseRequest};
use crate::service::AppState;

/// GET /license - current status + metadata for display.
pub async fn get_license_status(State(state): State<AppState>) -> Json<LicenseStatusResponse> {
    Json(state.license.current_status().await)
}

/// PUT /license - submit or replace the license key.
///
/// Validates immediately and persists. Storage failure surfaces as an error;
/// an authority rejection comes back as a 200 with `status: error` so the
/// operator can see what the authority said.
pub async fn set_license(
    State(state): State<AppState>,
    Json(req): Json<SetLicenseRequest>,
) -> Result<Json<LicenseStatusResponse>> {
    state.license.set_license(&req.license_key).await?;
    Ok(Json(state.license.current_status().await))
}

#[derive(Serialize)]
pub struct RemoveLicenseResponse {
    pub removed: usize,
}

/// DELETE /license - unregister the current license.
pub async fn remove_license(
    State(state): State<AppState>,
) -> Result<Json<RemoveLicenseResponse>> {
    let removed = state.license.remove_license()?;
    Ok(Json(RemoveLicenseResponse { removed }))
}

/// POST /license/recheck - out-of-band revalidation, ignoring the TTL.
pub async fn recheck_license(State(state): State<AppState>) -> Json<LicenseStatusResponse> {
    state.license.force_recheck().await;
    Json(state.license.current_status().await)
}
