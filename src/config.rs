use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Hex-encoded 32-byte key from which per-tenant credential keys are derived.
    pub credentials_master_key: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    /// Upper bound on concurrent admin sends within one dispatch.
    pub admin_send_concurrency: usize,
    pub smtp_timeout: Duration,
    /// Used when a tenant's relay settings omit the port.
    pub default_smtp_port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            credentials_master_key: required("CREDENTIALS_MASTER_KEY")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            admin_send_concurrency: env::var("ADMIN_SEND_CONCURRENCY")
                .unwrap_or_else(|_| "4".into())
                .parse::<usize>()?
                .max(1),
            smtp_timeout: Duration::from_secs(
                env::var("SMTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".into())
                    .parse()?,
            ),
            default_smtp_port: env::var("DEFAULT_SMTP_PORT")
                .unwrap_or_else(|_| "587".into())
                .parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
