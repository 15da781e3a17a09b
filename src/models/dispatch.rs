use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mapping::ServiceCategory;
use super::settings::ResolvedChannels;
use super::submission::SubmissionDomains;

/// Honest account of one dispatch, returned to the caller even on partial failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// At least one customer send succeeded.
    pub customer_email_sent: bool,
    /// At least one admin send succeeded.
    pub admin_email_sent: bool,
    /// The CRM channel is enabled; the actual lead creation happens elsewhere.
    pub ghl_integration_eligible: bool,
    pub errors: Vec<String>,
    pub channels: ResolvedChannels,
}

/// Body of `POST /notifications/{event_type}`.
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub category: ServiceCategory,
    pub tenant_id: Option<Uuid>,
    pub submission_id: Option<Uuid>,
    pub submission: Option<SubmissionDomains>,
}
