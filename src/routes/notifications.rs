use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    middleware::tenant::TenantHost,
    models::{dispatch::DispatchRequest, mapping::EventType},
    services::dispatch::SubmissionSource,
    AppState,
};

pub(crate) fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg.into() })))
}

/// POST /notifications/{event_type}
///
/// An inline `submission` is used as-is; otherwise `submission_id` is loaded.
pub async fn dispatch_event(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    host: TenantHost,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let event_type: EventType = event_type
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let source = match (body.submission, body.submission_id) {
        (Some(domains), _) => SubmissionSource::Inline(domains),
        (None, Some(id)) => SubmissionSource::Stored(id),
        (None, None) => return Err(bad_request("Either submission or submission_id is required")),
    };

    let hint = host.into_hint(body.tenant_id).map_err(|e| e.into_rejection())?;

    let result = state
        .dispatcher
        .dispatch(&hint, &body.category, event_type, source)
        .await
        .map_err(|e| e.into_rejection())?;

    Ok(Json(json!(result)))
}
