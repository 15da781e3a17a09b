use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named vertical ("boiler", "heat_pump", ...) scoping mappings, templates and settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ServiceCategory(String);

impl ServiceCategory {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceCategory {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ServiceCategory {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<ServiceCategory> for String {
    fn from(c: ServiceCategory) -> Self {
        c.0
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Funnel milestone that triggers a notification dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QuoteSubmitted,
    SurveySubmitted,
    CheckoutCompleted,
    CallbackRequested,
    EnquirySubmitted,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::QuoteSubmitted,
        EventType::SurveySubmitted,
        EventType::CheckoutCompleted,
        EventType::CallbackRequested,
        EventType::EnquirySubmitted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::QuoteSubmitted => "quote_submitted",
            EventType::SurveySubmitted => "survey_submitted",
            EventType::CheckoutCompleted => "checkout_completed",
            EventType::CallbackRequested => "callback_requested",
            EventType::EnquirySubmitted => "enquiry_submitted",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown event type: {s}"))
    }
}

/// The (tenant, category, event) tuple all per-event configuration hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventScope {
    pub tenant_id: Uuid,
    pub category: ServiceCategory,
    pub event_type: EventType,
}

impl EventScope {
    pub fn new(tenant_id: Uuid, category: ServiceCategory, event_type: EventType) -> Self {
        Self { tenant_id, category, event_type }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Customer,
    Admin,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientRole::Customer => "customer",
            RecipientRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecipientRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(RecipientRole::Customer),
            "admin" => Ok(RecipientRole::Admin),
            _ => Err(anyhow::anyhow!("Unknown recipient role: {s}")),
        }
    }
}

/// Fixed catalog of value transformations a tenant may attach to a rule.
///
/// Tenants pick from this list; they never supply transformation code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formatter {
    #[default]
    Raw,
    Address,
    Phone,
    QaList,
    Currency,
    /// Renders each selected product/addon record through `template`.
    ProductCard { template: String },
}

impl Formatter {
    pub fn tag(&self) -> &'static str {
        match self {
            Formatter::Raw => "raw",
            Formatter::Address => "address",
            Formatter::Phone => "phone",
            Formatter::QaList => "qa_list",
            Formatter::Currency => "currency",
            Formatter::ProductCard { .. } => "product_card",
        }
    }

    /// Card fragment carried by `ProductCard`, stored in its own column.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Formatter::ProductCard { template } => Some(template),
            _ => None,
        }
    }

    /// Rebuilds a formatter from its persisted `(tag, fragment)` columns.
    pub fn from_parts(tag: Option<&str>, fragment: Option<String>) -> anyhow::Result<Self> {
        match tag.unwrap_or("raw") {
            "raw" => Ok(Formatter::Raw),
            "address" => Ok(Formatter::Address),
            "phone" => Ok(Formatter::Phone),
            "qa_list" => Ok(Formatter::QaList),
            "currency" => Ok(Formatter::Currency),
            "product_card" => Ok(Formatter::ProductCard {
                template: fragment.unwrap_or_default(),
            }),
            other => Err(anyhow::anyhow!("Unknown formatter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub category: ServiceCategory,
    pub event_type: EventType,
    pub recipient_role: RecipientRole,
    pub position: i32,
    pub target_variable: String,
    pub source_path: String,
    pub formatter: Formatter,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rule before it is placed in a tenant namespace (system defaults, edits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub recipient_role: RecipientRole,
    pub position: i32,
    pub target_variable: String,
    pub source_path: String,
    #[serde(default)]
    pub formatter: Formatter,
}

#[derive(Debug, Deserialize)]
pub struct UpsertMappingRuleRequest {
    pub target_variable: String,
    pub source_path: String,
    #[serde(default)]
    pub formatter: Formatter,
    pub position: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatter_parts_round_trip_product_card() {
        let f = Formatter::ProductCard { template: "<b>{{name}}</b>".into() };
        let rebuilt = Formatter::from_parts(Some(f.tag()), f.fragment().map(str::to_string)).unwrap();
        assert_eq!(rebuilt, f);
    }

    #[test]
    fn unknown_formatter_tag_is_rejected() {
        assert!(Formatter::from_parts(Some("uppercase"), None).is_err());
        assert_eq!(Formatter::from_parts(None, None).unwrap(), Formatter::Raw);
    }

    #[test]
    fn formatter_deserializes_from_tagged_json() {
        let f: Formatter = serde_json::from_str(r#"{"kind":"phone"}"#).unwrap();
        assert_eq!(f, Formatter::Phone);
        let f: Formatter =
            serde_json::from_str(r#"{"kind":"product_card","template":"{{name}}"}"#).unwrap();
        assert_eq!(f.fragment(), Some("{{name}}"));
    }

    #[test]
    fn category_keys_are_case_insensitive() {
        let c: ServiceCategory = serde_json::from_str(r#""Heat_Pump""#).unwrap();
        assert_eq!(c, ServiceCategory::new("heat_pump"));
        assert_eq!(serde_json::to_string(&c).unwrap(), r#""heat_pump""#);
    }

    #[test]
    fn event_type_parses_its_own_name() {
        for e in EventType::ALL {
            assert_eq!(e.as_str().parse::<EventType>().unwrap(), e);
        }
        assert!("quote".parse::<EventType>().is_err());
    }
}
