use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadflow_api::{
    config::Config,
    db::{self, PgStore},
    routes,
    services::{dispatch::Dispatcher, email::SmtpConnector, encryption::CredentialCipher},
    AppState,
};

/// Allows the app base domain, its subdomains and local development origins.
fn cors_layer(base_url: String) -> CorsLayer {
    let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        if o == base_url {
            return true;
        }
        if let Some(idx) = base_url.find("://") {
            let after_scheme = &base_url[idx + 3..];
            let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
            let domain_clean = domain.split(':').next().unwrap_or(domain);
            if o.ends_with(&format!(".{domain_clean}")) {
                return true;
            }
        }
        false
    });

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE, header::ACCEPT]))
        .allow_origin(origin)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let cipher = CredentialCipher::from_hex(&config.credentials_master_key)?;
    let store = Arc::new(PgStore::new(pool));
    let connector = Arc::new(SmtpConnector::new(config.smtp_timeout, config.default_smtp_port));

    let dispatcher = Dispatcher::new(store.clone(), cipher, connector)
        .with_admin_concurrency(config.admin_send_concurrency)
        .with_send_timeout(config.smtp_timeout);

    let state = AppState {
        store,
        dispatcher: Arc::new(dispatcher),
    };

    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.app_base_url.clone()))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024));

    let addr = format!("{}:{}", config.host, config.port);
    info!("leadflow API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
