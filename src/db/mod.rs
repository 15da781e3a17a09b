pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    mapping::{EventScope, MappingRule, RecipientRole, RuleDraft, ServiceCategory, UpsertMappingRuleRequest},
    settings::NotificationSettings,
    submission::LeadSubmission,
    template::{EmailTemplate, TemplateTheme},
    tenant::TenantProfile,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the schema migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Everything the notification core reads from, or seeds into, persistent storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;

    async fn tenant_by_routing_key(&self, routing_key: &str) -> anyhow::Result<Option<TenantProfile>>;

    async fn tenant_by_id(&self, id: Uuid) -> anyhow::Result<Option<TenantProfile>>;

    async fn category_theme(
        &self,
        tenant_id: Uuid,
        category: &ServiceCategory,
    ) -> anyhow::Result<Option<TemplateTheme>>;

    /// Number of rules (any role) already present for the scope.
    async fn count_mapping_rules(&self, scope: &EventScope) -> anyhow::Result<i64>;

    /// Bulk insert; rules whose target already exists for the scope and role are skipped.
    /// Returns how many rows were actually written.
    async fn insert_mapping_rules_if_absent(
        &self,
        scope: &EventScope,
        rules: &[RuleDraft],
    ) -> anyhow::Result<u64>;

    /// Rules for one role, ordered by position.
    async fn mapping_rules(
        &self,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Vec<MappingRule>>;

    async fn upsert_mapping_rule(
        &self,
        scope: &EventScope,
        role: RecipientRole,
        rule: &UpsertMappingRuleRequest,
    ) -> anyhow::Result<MappingRule>;

    async fn active_template(
        &self,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Option<EmailTemplate>>;

    async fn notification_settings(
        &self,
        scope: &EventScope,
    ) -> anyhow::Result<Option<NotificationSettings>>;

    async fn lead_submission(&self, id: Uuid) -> anyhow::Result<Option<LeadSubmission>>;
}
