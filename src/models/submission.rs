use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Named partitions of a lead, each filled at a different funnel stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDomain {
    Quote,
    ProductSelection,
    AddonSelection,
    Checkout,
    Survey,
    Enquiry,
}

impl DataDomain {
    pub const ALL: [DataDomain; 6] = [
        DataDomain::Quote,
        DataDomain::ProductSelection,
        DataDomain::AddonSelection,
        DataDomain::Checkout,
        DataDomain::Survey,
        DataDomain::Enquiry,
    ];

    /// Root key a source path starts with to address this domain.
    pub fn key(&self) -> &'static str {
        match self {
            DataDomain::Quote => "quote_data",
            DataDomain::ProductSelection => "product_data",
            DataDomain::AddonSelection => "addon_data",
            DataDomain::Checkout => "checkout_data",
            DataDomain::Survey => "survey_data",
            DataDomain::Enquiry => "enquiry_data",
        }
    }
}

/// Loosely-typed domain payloads. Absent domains stay `None`; nothing is defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDomains {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enquiry_data: Option<Value>,
}

impl SubmissionDomains {
    pub fn get(&self, domain: DataDomain) -> Option<&Value> {
        match domain {
            DataDomain::Quote => self.quote_data.as_ref(),
            DataDomain::ProductSelection => self.product_data.as_ref(),
            DataDomain::AddonSelection => self.addon_data.as_ref(),
            DataDomain::Checkout => self.checkout_data.as_ref(),
            DataDomain::Survey => self.survey_data.as_ref(),
            DataDomain::Enquiry => self.enquiry_data.as_ref(),
        }
    }

    /// Single tree rooted at the domain keys, the shape source paths walk.
    pub fn as_tree(&self) -> Value {
        let mut root = Map::new();
        for domain in DataDomain::ALL {
            if let Some(v) = self.get(domain) {
                if !v.is_null() {
                    root.insert(domain.key().to_string(), v.clone());
                }
            }
        }
        Value::Object(root)
    }
}

/// Append/update-only lead document keyed by submission id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    #[serde(flatten)]
    pub domains: SubmissionDomains,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
