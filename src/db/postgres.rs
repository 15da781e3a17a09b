use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::NotificationStore;
use crate::models::{
    mapping::{
        EventScope, Formatter, MappingRule, RecipientRole, RuleDraft, ServiceCategory,
        UpsertMappingRuleRequest,
    },
    settings::NotificationSettings,
    submission::{LeadSubmission, SubmissionDomains},
    template::{EmailTemplate, TemplateTheme},
    tenant::TenantProfile,
};

const RULE_COLUMNS: &str = "id, tenant_id, category, event_type, recipient_role, position, \
     target_variable, source_path, formatter, formatter_template, created_at, updated_at";

/// Datastore backed by the shared PostgreSQL schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stores an encrypted relay blob for a tenant (used by the credential tool).
    pub async fn set_relay_credentials(&self, tenant_id: Uuid, blob: &Value) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "UPDATE tenants SET relay_credentials = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(blob)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .context("Failed to store relay credentials")?;
        Ok(res.rows_affected())
    }
}

// ─── Row types ───────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct TenantRow {
    id: Uuid,
    slug: String,
    display_name: String,
    routing_key: String,
    admin_email: Option<String>,
    relay_credentials: Option<Value>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TenantRow> for TenantProfile {
    fn from(r: TenantRow) -> Self {
        Self {
            id: r.id,
            slug: r.slug,
            display_name: r.display_name,
            routing_key: r.routing_key,
            admin_email: r.admin_email,
            relay_credentials: r.relay_credentials,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Enum-like columns are fetched as TEXT and parsed here.
#[derive(FromRow)]
struct MappingRuleRow {
    id: Uuid,
    tenant_id: Uuid,
    category: String,
    event_type: String,
    recipient_role: String,
    position: i32,
    target_variable: String,
    source_path: String,
    formatter: String,
    formatter_template: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MappingRuleRow> for MappingRule {
    type Error = anyhow::Error;

    fn try_from(r: MappingRuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            category: ServiceCategory::new(r.category),
            event_type: r.event_type.parse()?,
            recipient_role: r.recipient_role.parse()?,
            position: r.position,
            target_variable: r.target_variable,
            source_path: r.source_path,
            formatter: Formatter::from_parts(Some(&r.formatter), r.formatter_template)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TemplateRow {
    id: Uuid,
    tenant_id: Uuid,
    category: String,
    event_type: String,
    recipient_role: String,
    subject: String,
    html: String,
    text: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for EmailTemplate {
    type Error = anyhow::Error;

    fn try_from(r: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            category: ServiceCategory::new(r.category),
            event_type: r.event_type.parse()?,
            recipient_role: r.recipient_role.parse()?,
            subject: r.subject,
            html: r.html,
            text: r.text,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SettingsRow {
    customer_enabled: bool,
    admin_enabled: bool,
    admin_emails: Vec<String>,
    crm_enabled: bool,
}

#[derive(FromRow)]
struct ThemeRow {
    primary_color: Option<String>,
    font_family: Option<String>,
    header_background: Option<String>,
    footer_background: Option<String>,
}

#[derive(FromRow)]
struct SubmissionRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    quote_data: Option<Value>,
    product_data: Option<Value>,
    addon_data: Option<Value>,
    checkout_data: Option<Value>,
    survey_data: Option<Value>,
    enquiry_data: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubmissionRow> for LeadSubmission {
    fn from(r: SubmissionRow) -> Self {
        Self {
            id: r.id,
            tenant_id: r.tenant_id,
            domains: SubmissionDomains {
                quote_data: r.quote_data,
                product_data: r.product_data,
                addon_data: r.addon_data,
                checkout_data: r.checkout_data,
                survey_data: r.survey_data,
                enquiry_data: r.enquiry_data,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// ─── Store implementation ────────────────────────────────────────────────────

#[async_trait]
impl NotificationStore for PgStore {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn tenant_by_routing_key(&self, routing_key: &str) -> anyhow::Result<Option<TenantProfile>> {
        let row: Option<TenantRow> = sqlx::query_as(
            "SELECT id, slug, display_name, routing_key, admin_email, relay_credentials,
                    is_active, created_at, updated_at
             FROM tenants
             WHERE routing_key = $1",
        )
        .bind(routing_key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up tenant by routing key")?;
        Ok(row.map(Into::into))
    }

    async fn tenant_by_id(&self, id: Uuid) -> anyhow::Result<Option<TenantProfile>> {
        let row: Option<TenantRow> = sqlx::query_as(
            "SELECT id, slug, display_name, routing_key, admin_email, relay_credentials,
                    is_active, created_at, updated_at
             FROM tenants
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up tenant by id")?;
        Ok(row.map(Into::into))
    }

    async fn category_theme(
        &self,
        tenant_id: Uuid,
        category: &ServiceCategory,
    ) -> anyhow::Result<Option<TemplateTheme>> {
        let row: Option<ThemeRow> = sqlx::query_as(
            "SELECT primary_color, font_family, header_background, footer_background
             FROM tenant_category_settings
             WHERE tenant_id = $1 AND category = $2",
        )
        .bind(tenant_id)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load category theme")?;

        Ok(row.map(|r| TemplateTheme {
            primary_color: r.primary_color,
            font_family: r.font_family,
            header_background: r.header_background,
            footer_background: r.footer_background,
        }))
    }

    async fn count_mapping_rules(&self, scope: &EventScope) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::BIGINT FROM mapping_rules
             WHERE tenant_id = $1 AND category = $2 AND event_type = $3",
        )
        .bind(scope.tenant_id)
        .bind(scope.category.as_str())
        .bind(scope.event_type.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count mapping rules")?;
        Ok(count)
    }

    async fn insert_mapping_rules_if_absent(
        &self,
        scope: &EventScope,
        rules: &[RuleDraft],
    ) -> anyhow::Result<u64> {
        if rules.is_empty() {
            return Ok(0);
        }

        let roles: Vec<String> = rules.iter().map(|r| r.recipient_role.to_string()).collect();
        let positions: Vec<i32> = rules.iter().map(|r| r.position).collect();
        let targets: Vec<String> = rules.iter().map(|r| r.target_variable.clone()).collect();
        let paths: Vec<String> = rules.iter().map(|r| r.source_path.clone()).collect();
        let formatters: Vec<String> = rules.iter().map(|r| r.formatter.tag().to_string()).collect();
        let fragments: Vec<Option<String>> = rules
            .iter()
            .map(|r| r.formatter.fragment().map(str::to_string))
            .collect();

        // One statement: concurrent first use either inserts or hits the unique constraint.
        let res = sqlx::query(
            "INSERT INTO mapping_rules
                (tenant_id, category, event_type, recipient_role, position,
                 target_variable, source_path, formatter, formatter_template)
             SELECT $1, $2, $3, r.role, r.position, r.target, r.path, r.formatter, r.fragment
             FROM UNNEST($4::TEXT[], $5::INT4[], $6::TEXT[], $7::TEXT[], $8::TEXT[], $9::TEXT[])
                  AS r(role, position, target, path, formatter, fragment)
             ON CONFLICT ON CONSTRAINT mapping_rules_target_unique DO NOTHING",
        )
        .bind(scope.tenant_id)
        .bind(scope.category.as_str())
        .bind(scope.event_type.as_str())
        .bind(&roles)
        .bind(&positions)
        .bind(&targets)
        .bind(&paths)
        .bind(&formatters)
        .bind(&fragments)
        .execute(&self.pool)
        .await
        .context("Failed to seed default mapping rules")?;

        Ok(res.rows_affected())
    }

    async fn mapping_rules(
        &self,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Vec<MappingRule>> {
        let rows: Vec<MappingRuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM mapping_rules
             WHERE tenant_id = $1 AND category = $2 AND event_type = $3 AND recipient_role = $4
             ORDER BY position, target_variable"
        ))
        .bind(scope.tenant_id)
        .bind(scope.category.as_str())
        .bind(scope.event_type.as_str())
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load mapping rules")?;

        rows.into_iter().map(MappingRule::try_from).collect()
    }

    async fn upsert_mapping_rule(
        &self,
        scope: &EventScope,
        role: RecipientRole,
        rule: &UpsertMappingRuleRequest,
    ) -> anyhow::Result<MappingRule> {
        let row: MappingRuleRow = sqlx::query_as(&format!(
            "INSERT INTO mapping_rules
                (tenant_id, category, event_type, recipient_role, position,
                 target_variable, source_path, formatter, formatter_template)
             VALUES ($1, $2, $3, $4,
                     COALESCE($5::INT4, (SELECT COALESCE(MAX(position), 0) + 1 FROM mapping_rules
                                         WHERE tenant_id = $1 AND category = $2
                                           AND event_type = $3 AND recipient_role = $4)),
                     $6, $7, $8, $9)
             ON CONFLICT ON CONSTRAINT mapping_rules_target_unique DO UPDATE
             SET source_path = EXCLUDED.source_path,
                 formatter = EXCLUDED.formatter,
                 formatter_template = EXCLUDED.formatter_template,
                 position = COALESCE($5::INT4, mapping_rules.position),
                 updated_at = NOW()
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(scope.tenant_id)
        .bind(scope.category.as_str())
        .bind(scope.event_type.as_str())
        .bind(role.as_str())
        .bind(rule.position)
        .bind(&rule.target_variable)
        .bind(&rule.source_path)
        .bind(rule.formatter.tag())
        .bind(rule.formatter.fragment())
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert mapping rule")?;

        row.try_into()
    }

    async fn active_template(
        &self,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Option<EmailTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT id, tenant_id, category, event_type, recipient_role, subject, html, text,
                    is_active, created_at, updated_at
             FROM email_templates
             WHERE tenant_id = $1 AND category = $2 AND event_type = $3
               AND recipient_role = $4 AND is_active = TRUE",
        )
        .bind(scope.tenant_id)
        .bind(scope.category.as_str())
        .bind(scope.event_type.as_str())
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load active template")?;

        row.map(EmailTemplate::try_from).transpose()
    }

    async fn notification_settings(
        &self,
        scope: &EventScope,
    ) -> anyhow::Result<Option<NotificationSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT customer_enabled, admin_enabled, admin_emails, crm_enabled
             FROM notification_settings
             WHERE tenant_id = $1 AND category = $2 AND event_type = $3",
        )
        .bind(scope.tenant_id)
        .bind(scope.category.as_str())
        .bind(scope.event_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load notification settings")?;

        Ok(row.map(|r| NotificationSettings {
            tenant_id: scope.tenant_id,
            category: scope.category.clone(),
            event_type: scope.event_type,
            customer_enabled: r.customer_enabled,
            admin_enabled: r.admin_enabled,
            admin_emails: r.admin_emails,
            crm_enabled: r.crm_enabled,
        }))
    }

    async fn lead_submission(&self, id: Uuid) -> anyhow::Result<Option<LeadSubmission>> {
        let row: Option<SubmissionRow> = sqlx::query_as(
            "SELECT id, tenant_id, quote_data, product_data, addon_data, checkout_data,
                    survey_data, enquiry_data, created_at, updated_at
             FROM lead_submissions
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load lead submission")?;

        Ok(row.map(Into::into))
    }
}
