use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::DispatchError,
    middleware::tenant::TenantHost,
    models::mapping::{EventScope, EventType, RecipientRole, ServiceCategory, UpsertMappingRuleRequest},
    routes::notifications::bad_request,
    services::{mapping_registry::MappingRegistry, tenant_resolver::TenantResolver},
    AppState,
};

type Rejection = (StatusCode, Json<Value>);

async fn scope_for(
    state: &AppState,
    host: TenantHost,
    (category, event_type, role): (String, String, String),
) -> Result<(EventScope, RecipientRole), Rejection> {
    let event_type: EventType = event_type
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;
    let role: RecipientRole = role
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let hint = host.into_hint(None).map_err(|e| e.into_rejection())?;
    let tenant = TenantResolver::require(state.store.as_ref(), &hint)
        .await
        .map_err(|e| e.into_rejection())?;

    Ok((EventScope::new(tenant.id, ServiceCategory::new(category), event_type), role))
}

/// GET /mappings/{category}/{event_type}/{role} — seeds defaults on first read.
pub async fn list_rules(
    State(state): State<AppState>,
    Path(params): Path<(String, String, String)>,
    host: TenantHost,
) -> Result<Json<Value>, Rejection> {
    let (scope, role) = scope_for(&state, host, params).await?;
    let store = state.store.as_ref();

    MappingRegistry::ensure_defaults(store, &scope)
        .await
        .map_err(|e| DispatchError::from(e).into_rejection())?;
    let rules = MappingRegistry::get_rules(store, &scope, role)
        .await
        .map_err(|e| DispatchError::from(e).into_rejection())?;

    Ok(Json(json!({ "rules": rules })))
}

/// PUT /mappings/{category}/{event_type}/{role} — create or replace one rule by target.
pub async fn upsert_rule(
    State(state): State<AppState>,
    Path(params): Path<(String, String, String)>,
    host: TenantHost,
    Json(body): Json<UpsertMappingRuleRequest>,
) -> Result<Json<Value>, Rejection> {
    MappingRegistry::validate(&body).map_err(|e| bad_request(e.to_string()))?;
    let (scope, role) = scope_for(&state, host, params).await?;
    let store = state.store.as_ref();

    // Seed first so an edit never suppresses the rest of the defaults.
    MappingRegistry::ensure_defaults(store, &scope)
        .await
        .map_err(|e| DispatchError::from(e).into_rejection())?;
    let rule = MappingRegistry::upsert_rule(store, &scope, role, &body)
        .await
        .map_err(|e| DispatchError::from(e).into_rejection())?;

    Ok(Json(json!({ "rule": rule })))
}
