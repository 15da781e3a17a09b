use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    middleware::tenant::TenantHost,
    models::tenant::TenantInfo,
    services::tenant_resolver::{TenantHint, TenantResolver},
    AppState,
};

/// Public branding lookup for the storefront. Local hosts get `"tenant": null`.
pub async fn get_tenant_info(
    State(state): State<AppState>,
    TenantHost(host): TenantHost,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(host) = host else {
        return Ok(Json(json!({ "tenant": null })));
    };

    let tenant = TenantResolver::resolve(state.store.as_ref(), &TenantHint::Host(host))
        .await
        .map_err(|e| e.into_rejection())?;

    Ok(Json(json!({ "tenant": tenant.as_ref().map(TenantInfo::from) })))
}
