use tracing::info;

use crate::db::NotificationStore;
use crate::models::mapping::{
    EventScope, EventType, Formatter, MappingRule, RecipientRole, RuleDraft,
    UpsertMappingRuleRequest,
};
use crate::services::{extraction::parse_path, metrics};

const PRODUCT_CARD: &str = r#"<div style="border:1px solid #e2e8f0;border-radius:8px;padding:12px;margin:8px 0"><strong>{{name}}</strong>{{#if price}} &middot; &pound;{{price}}{{/if}}{{#if description}}<br>{{description}}{{/if}}</div>"#;

const ADDON_CARD: &str = r#"<div style="padding:6px 0">+ {{name}}{{#if price}} (&pound;{{price}}){{/if}}</div>"#;

fn rule(role: RecipientRole, position: i32, target: &str, path: &str, formatter: Formatter) -> RuleDraft {
    RuleDraft {
        recipient_role: role,
        position,
        target_variable: target.to_string(),
        source_path: path.to_string(),
        formatter,
    }
}

/// Contact fields every event carries, for one role.
fn contact_rules(role: RecipientRole) -> Vec<RuleDraft> {
    vec![
        rule(role, 1, "first_name", "quote_data.contact_details.first_name", Formatter::Raw),
        rule(role, 2, "last_name", "quote_data.contact_details.last_name", Formatter::Raw),
        rule(role, 3, "customer_email", "quote_data.contact_details.email", Formatter::Raw),
        rule(role, 4, "phone", "quote_data.contact_details.phone", Formatter::Phone),
        rule(role, 5, "address", "quote_data.address", Formatter::Address),
        rule(role, 6, "postcode", "quote_data.address.postcode", Formatter::Raw),
    ]
}

fn event_rules(event: EventType, role: RecipientRole) -> Vec<RuleDraft> {
    let admin = role == RecipientRole::Admin;
    let mut rules = Vec::new();
    let mut push = |target: &str, path: &str, formatter: Formatter| {
        let position = 10 + rules.len() as i32;
        rules.push(rule(role, position, target, path, formatter));
    };

    match event {
        EventType::QuoteSubmitted => {
            push("quote_answers", "quote_data.answers", Formatter::QaList);
            push("products", "product_data.selected", Formatter::ProductCard { template: PRODUCT_CARD.into() });
            push("quote_total", "product_data.total", Formatter::Currency);
            if admin {
                push("quote_reference", "quote_data.reference", Formatter::Raw);
            }
        }
        EventType::SurveySubmitted => {
            push("survey_answers", "survey_data.answers", Formatter::QaList);
            push("survey_date", "survey_data.preferred_date", Formatter::Raw);
            if admin {
                push("survey_notes", "survey_data.notes", Formatter::Raw);
                push("quote_answers", "quote_data.answers", Formatter::QaList);
            }
        }
        EventType::CheckoutCompleted => {
            push("order_reference", "checkout_data.order_reference", Formatter::Raw);
            push("products", "product_data.selected", Formatter::ProductCard { template: PRODUCT_CARD.into() });
            push("addons", "addon_data.selected", Formatter::ProductCard { template: ADDON_CARD.into() });
            push("subtotal", "checkout_data.subtotal", Formatter::Currency);
            push("total", "checkout_data.total", Formatter::Currency);
            push("installation_date", "checkout_data.installation_date", Formatter::Raw);
            if admin {
                push("payment_method", "checkout_data.payment_method", Formatter::Raw);
                push("quote_answers", "quote_data.answers", Formatter::QaList);
            }
        }
        EventType::CallbackRequested => {
            push("preferred_time", "enquiry_data.preferred_time", Formatter::Raw);
            if admin {
                push("callback_reason", "enquiry_data.reason", Formatter::Raw);
            }
        }
        EventType::EnquirySubmitted => {
            push("enquiry_subject", "enquiry_data.subject", Formatter::Raw);
            push("enquiry_message", "enquiry_data.message", Formatter::Raw);
            if admin {
                push("enquiry_answers", "enquiry_data.answers", Formatter::QaList);
            }
        }
    }
    rules
}

/// System default rule set for an event type, both roles.
pub fn default_rules(event: EventType) -> Vec<RuleDraft> {
    [RecipientRole::Customer, RecipientRole::Admin]
        .into_iter()
        .flat_map(|role| {
            let mut rules = contact_rules(role);
            rules.extend(event_rules(event, role));
            rules
        })
        .collect()
}

pub struct MappingRegistry;

impl MappingRegistry {
    /// Copies the defaults into the tenant namespace unless any rule already exists.
    ///
    /// Safe under concurrent first use: the insert ignores targets that are already taken.
    pub async fn ensure_defaults(store: &dyn NotificationStore, scope: &EventScope) -> anyhow::Result<u64> {
        if store.count_mapping_rules(scope).await? > 0 {
            return Ok(0);
        }

        let inserted = store
            .insert_mapping_rules_if_absent(scope, &default_rules(scope.event_type))
            .await?;

        if inserted > 0 {
            info!(
                tenant_id = %scope.tenant_id,
                category = %scope.category,
                event_type = %scope.event_type,
                "Seeded {} default mapping rule(s)",
                inserted
            );
            metrics::record_seeded(scope.event_type.as_str(), inserted);
        }
        Ok(inserted)
    }

    pub async fn get_rules(
        store: &dyn NotificationStore,
        scope: &EventScope,
        role: RecipientRole,
    ) -> anyhow::Result<Vec<MappingRule>> {
        store.mapping_rules(scope, role).await
    }

    /// Rejects edits that could never extract anything.
    pub fn validate(req: &UpsertMappingRuleRequest) -> anyhow::Result<()> {
        let target = req.target_variable.trim();
        if target.is_empty() {
            anyhow::bail!("target_variable must not be empty");
        }
        if !target.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            anyhow::bail!("target_variable may only contain letters, digits and underscores");
        }
        parse_path(&req.source_path)
            .map_err(|e| anyhow::anyhow!("invalid source_path: {e}"))?;
        Ok(())
    }

    pub async fn upsert_rule(
        store: &dyn NotificationStore,
        scope: &EventScope,
        role: RecipientRole,
        req: &UpsertMappingRuleRequest,
    ) -> anyhow::Result<MappingRule> {
        Self::validate(req)?;
        store.upsert_mapping_rule(scope, role, req).await
    }
}
