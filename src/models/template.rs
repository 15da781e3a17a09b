use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mapping::{EventType, RecipientRole, ServiceCategory};
use super::submission::SubmissionDomains;

/// Tenant-authored subject/html/text sources for one (category, event, role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub category: ServiceCategory,
    pub event_type: EventType,
    pub recipient_role: RecipientRole,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The three source bodies, detached from storage metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSource {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl From<&EmailTemplate> for TemplateSource {
    fn from(t: &EmailTemplate) -> Self {
        Self {
            subject: t.subject.clone(),
            html: t.html.clone(),
            text: t.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub const DEFAULT_PRIMARY_COLOR: &str = "#2563eb";
pub const DEFAULT_FONT_FAMILY: &str = "Arial, sans-serif";
pub const DEFAULT_HEADER_BACKGROUND: &str = "#0f172a";
pub const DEFAULT_FOOTER_BACKGROUND: &str = "#f1f5f9";

/// Per-category styling overrides; unset fields fall back to the platform palette.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateTheme {
    pub primary_color: Option<String>,
    pub font_family: Option<String>,
    pub header_background: Option<String>,
    pub footer_background: Option<String>,
}

impl TemplateTheme {
    /// `(variable, value)` pairs substituted before any other template construct.
    pub fn resolved(&self) -> [(&'static str, String); 4] {
        fn pick(v: &Option<String>, fallback: &str) -> String {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        }

        [
            ("primary_color", pick(&self.primary_color, DEFAULT_PRIMARY_COLOR)),
            ("font_family", pick(&self.font_family, DEFAULT_FONT_FAMILY)),
            ("header_background", pick(&self.header_background, DEFAULT_HEADER_BACKGROUND)),
            ("footer_background", pick(&self.footer_background, DEFAULT_FOOTER_BACKGROUND)),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewTemplateRequest {
    pub category: ServiceCategory,
    pub event_type: EventType,
    pub recipient_role: RecipientRole,
    pub template: TemplateSource,
    pub submission_id: Option<Uuid>,
    pub submission: Option<SubmissionDomains>,
}
