use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::NotificationStore;
use crate::models::{
    mapping::{
        EventScope, MappingRule, RecipientRole, RuleDraft, ServiceCategory,
        UpsertMappingRuleRequest,
    },
    settings::NotificationSettings,
    submission::LeadSubmission,
    template::{EmailTemplate, TemplateTheme},
    tenant::TenantProfile,
};

/// In-process store with the same contract as `PgStore`.
///
/// Used by tests and local tooling; the uniqueness rules mirror the SQL constraints.
#[derive(Default)]
pub struct MemoryStore {
    tenants: RwLock<Vec<TenantProfile>>,
    themes: RwLock<HashMap<(Uuid, ServiceCategory), TemplateTheme>>,
    rules: RwLock<Vec<MappingRule>>,
    templates: RwLock<Vec<EmailTemplate>>,
    settings: RwLock<HashMap<EventScope, NotificationSettings>>,
    submissions: RwLock<HashMap<Uuid, LeadSubmission>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tenant(&self, tenant: TenantProfile) {
        self.tenants.write().await.push(tenant);
    }

    pub async fn set_theme(&self, tenant_id: Uuid, category: ServiceCategory, theme: TemplateTheme) {
        self.themes.write().await.insert((tenant_id, category), theme);
    }

    /// Activating a template deactivates any other for the same scope and role.
    pub async fn add_template(&self, template: EmailTemplate) {
        let mut templates = self.templates.write().await;
        if template.is_active {
            for t in templates.iter_mut().filter(|t| {
                t.tenant_id == template.tenant_id
                    && t.category == template.category
                    && t.event_type == template.event_type
                    && t.recipient_role == template.recipient_role
            }) {
                t.is_active = false;
            }
        }
        templates.push(template);
    }

    pub async fn set_notification_settings(&self, settings: NotificationSettings) {
        let scope = EventScope::new(settings.tenant_id, settings.category.clone(), settings.event_type);
        self.settings.write().await.insert(scope, settings);
    }

    pub async fn add_submission(&self, submission: LeadSubmission) {
        self.submissions.write().await.insert(submission.id, submission);
    }

    /// Makes every subsequent call fail as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> anyhow::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("datastore unavailable");
        }
        Ok(())
    }
}

fn in_scope(rule: &MappingRule, scope: &EventScope) -> bool {
    rule.tenant_id == scope.tenant_id
        && rule.category == scope.category
        && rule.event_type == scope.event_type
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn ping(&self) -> anyhow::Result<()> {
        self.check_online()
    }

    async fn tenant_by_routing_key(&self, routing_key: &str) -> anyhow::Result<Option<TenantProfile>> {
        self.check_online()?;
        let tenants = self.tenants.read().await;
        Ok(tenants.iter().find(|t| t.routing_key == routing_key).cloned())
    }

    async fn tenant_by_id(&self, id: Uuid) -> anyhow::Result<Option<TenantProfile>> {
        self.check_online()?;
        let tenants = self.tenants.read().await;
        Ok(tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn category_theme(
        &self,
        tenant_id: Uuid,
        category: &ServiceCategory,
    ) -> anyhow::Result<Option<TemplateTheme>> {
        self.check_online()?;
        let themes = self.themes.read().await;
        Ok(themes.get(&(tenant_id, category.clone())).cloned())
    }

    async fn count_mapping_rules(&self, scope: &EventScope) -> anyhow::Result<i64> {
        self.check_online()?;
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|r| in_scope(r, scope)).count() as i64)
    }

    async fn insert_mapping_rules_if_absent(
        &self,
        scope: &EventScope,
        drafts: &[RuleDraft],
    ) -> anyhow::Result<u64> {
        self.check_online()?;
        // Single write guard for the whole batch, like the one-statement SQL insert.
        let mut rules = self.rules.write().await;
        let now = Utc::now();
        let mut inserted = 0;
        for draft in drafts {
            let taken = rules.iter().any(|r| {
                in_scope(r, scope)
                    && r.recipient_role == draft.recipient_role
                    && r.target_variable == draft.target_variable
            });
            if taken {
                continue;
            }
            rules.push(MappingRule {
                id: Uuid::new_v4(),
                tenant_id: scope.tenant_id,
                category: scope.category.clone(),
                event_type: scope.event_type,
                recipient_role: draft.recipient_role,
                position: draft.position,
                target_variable: draft.target_variable.clone(),
                source_path: draft.source_path.clone(),
                formatter: draft.formatter.clone(),
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn mapping_rules(
        &self,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Vec<MappingRule>> {
        self.check_online()?;
        let rules = self.rules.read().await;
        let mut out: Vec<MappingRule> = rules
            .iter()
            .filter(|r| in_scope(r, scope) && r.recipient_role == role)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.target_variable.cmp(&b.target_variable))
        });
        Ok(out)
    }

    async fn upsert_mapping_rule(
        &self,
        scope: &EventScope,
        role: RecipientRole,
        req: &UpsertMappingRuleRequest,
    ) -> anyhow::Result<MappingRule> {
        self.check_online()?;
        let mut rules = self.rules.write().await;
        let now = Utc::now();

        if let Some(existing) = rules.iter_mut().find(|r| {
            in_scope(r, scope) && r.recipient_role == role && r.target_variable == req.target_variable
        }) {
            existing.source_path = req.source_path.clone();
            existing.formatter = req.formatter.clone();
            if let Some(pos) = req.position {
                existing.position = pos;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let next_position = rules
            .iter()
            .filter(|r| in_scope(r, scope) && r.recipient_role == role)
            .map(|r| r.position)
            .max()
            .unwrap_or(0)
            + 1;

        let rule = MappingRule {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            category: scope.category.clone(),
            event_type: scope.event_type,
            recipient_role: role,
            position: req.position.unwrap_or(next_position),
            target_variable: req.target_variable.clone(),
            source_path: req.source_path.clone(),
            formatter: req.formatter.clone(),
            created_at: now,
            updated_at: now,
        };
        rules.push(rule.clone());
        Ok(rule)
    }

    async fn active_template(
        &self,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Option<EmailTemplate>> {
        self.check_online()?;
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .find(|t| {
                t.is_active
                    && t.tenant_id == scope.tenant_id
                    && t.category == scope.category
                    && t.event_type == scope.event_type
                    && t.recipient_role == role
            })
            .cloned())
    }

    async fn notification_settings(
        &self,
        scope: &EventScope,
    ) -> anyhow::Result<Option<NotificationSettings>> {
        self.check_online()?;
        Ok(self.settings.read().await.get(scope).cloned())
    }

    async fn lead_submission(&self, id: Uuid) -> anyhow::Result<Option<LeadSubmission>> {
        self.check_online()?;
        Ok(self.submissions.read().await.get(&id).cloned())
    }
}
