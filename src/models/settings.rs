use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mapping::{EventType, ServiceCategory};

/// Explicit per-event channel toggles saved by the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub tenant_id: Uuid,
    pub category: ServiceCategory,
    pub event_type: EventType,
    pub customer_enabled: bool,
    pub admin_enabled: bool,
    pub admin_emails: Vec<String>,
    pub crm_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerChannel {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminChannel {
    pub enabled: bool,
    pub emails: Vec<String>,
}

impl AdminChannel {
    /// Enabled and at least one address to send to.
    pub fn is_deliverable(&self) -> bool {
        self.enabled && !self.emails.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmChannel {
    pub enabled: bool,
}

/// Effective channel configuration for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedChannels {
    pub customer: CustomerChannel,
    pub admin: AdminChannel,
    #[serde(rename = "externalCrm")]
    pub external_crm: CrmChannel,
}
