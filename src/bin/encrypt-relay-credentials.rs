//! Seals a tenant's mail-relay settings and stores them in `tenants.relay_credentials`.
//!
//! Usage:
//!   encrypt-relay-credentials --tenant SLUG --settings relay.json [--dry-run]
//!
//! `relay.json` holds `{host, port, username, password, from_email, from_name}`.
//! Pass `--settings -` to read it from stdin.
//!
//! Environment variables:
//!   DATABASE_URL - PostgreSQL connection string
//!   CREDENTIALS_MASTER_KEY - 64-character hex master key

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use leadflow_api::db::{self, PgStore};
use leadflow_api::models::tenant::RelaySettings;
use leadflow_api::services::encryption::CredentialCipher;

#[derive(Parser)]
#[command(
    name = "encrypt-relay-credentials",
    about = "Encrypt a tenant's mail relay settings with its derived key"
)]
struct Args {
    /// Tenant slug
    #[arg(long)]
    tenant: String,

    /// Settings JSON file, or `-` for stdin
    #[arg(long)]
    settings: PathBuf,

    /// Print the sealed blob instead of writing it
    #[arg(long)]
    dry_run: bool,
}

fn read_settings(path: &PathBuf) -> Result<RelaySettings> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Settings file is not valid relay settings JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let master_key = std::env::var("CREDENTIALS_MASTER_KEY")
        .context("CREDENTIALS_MASTER_KEY environment variable required")?;
    let cipher = CredentialCipher::from_hex(&master_key)
        .context("Invalid CREDENTIALS_MASTER_KEY (must be 64-character hex)")?;

    let settings = read_settings(&args.settings)?;
    if !settings.is_complete() {
        anyhow::bail!("Relay settings need host, username, password and from_email");
    }

    let pool = db::create_pool(&database_url).await?;
    let tenant_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM tenants WHERE slug = $1")
        .bind(&args.tenant)
        .fetch_optional(&pool)
        .await?;
    let tenant_id = tenant_id.with_context(|| format!("Unknown tenant: {}", args.tenant))?;

    let blob = cipher.encrypt_settings(tenant_id, &settings)?;
    let stored = serde_json::to_value(&blob)?;

    // Never ship a blob we cannot open again.
    cipher
        .decrypt_settings(tenant_id, &stored)
        .context("Round-trip check of the sealed settings failed")?;

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&stored)?);
        return Ok(());
    }

    let updated = PgStore::new(pool).set_relay_credentials(tenant_id, &stored).await?;
    tracing::info!(
        tenant = %args.tenant,
        host = %settings.host,
        "Stored relay credentials ({} row updated)",
        updated
    );
    Ok(())
}
