use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    middleware::tenant::TenantHost,
    models::template::PreviewTemplateRequest,
    services::dispatch::SubmissionSource,
    AppState,
};

/// POST /templates/preview — render only, nothing is sent.
pub async fn preview_template(
    State(state): State<AppState>,
    host: TenantHost,
    Json(body): Json<PreviewTemplateRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let hint = host.into_hint(None).map_err(|e| e.into_rejection())?;

    let source = match (body.submission, body.submission_id) {
        (Some(domains), _) => Some(SubmissionSource::Inline(domains)),
        (None, Some(id)) => Some(SubmissionSource::Stored(id)),
        (None, None) => None,
    };

    let preview = state
        .dispatcher
        .preview(
            &hint,
            &body.category,
            body.event_type,
            body.recipient_role,
            &body.template,
            source,
        )
        .await
        .map_err(|e| e.into_rejection())?;

    Ok(Json(json!(preview)))
}
