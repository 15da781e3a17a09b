use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An installer business running its own storefront under a distinct hostname.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    /// Normalised hostname the storefront is served from (see `routing_key`).
    pub routing_key: String,
    /// Fallback admin recipient when an event has no explicit admin list.
    pub admin_email: Option<String>,
    /// Opaque encrypted relay settings; only the credential cipher interprets it.
    #[serde(skip_serializing)]
    pub relay_credentials: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// AES-256-GCM output, hex encoded, as persisted in `tenants.relay_credentials`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// Plain mail-relay settings, only ever held in memory after decryption.
#[derive(Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: Option<String>,
}

impl RelaySettings {
    /// Every field a relay connection needs is non-blank.
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
            && !self.from_email.trim().is_empty()
    }
}

impl std::fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantInfo {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
}

impl From<&TenantProfile> for TenantInfo {
    fn from(t: &TenantProfile) -> Self {
        Self {
            id: t.id,
            slug: t.slug.clone(),
            display_name: t.display_name.clone(),
        }
    }
}
