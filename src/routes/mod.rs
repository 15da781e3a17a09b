pub mod health;
pub mod mappings;
pub mod metrics;
pub mod notifications;
pub mod templates;
pub mod tenant_info;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// All HTTP routes, without CORS or tracing layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/tenant/info", get(tenant_info::get_tenant_info))
        .route("/notifications/{event_type}", post(notifications::dispatch_event))
        .route(
            "/mappings/{category}/{event_type}/{role}",
            get(mappings::list_rules).put(mappings::upsert_rule),
        )
        .route("/templates/preview", post(templates::preview_template))
        .with_state(state)
}
