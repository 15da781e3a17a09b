//! Orchestrates one notification dispatch: tenant, credentials, channels, render, send.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{
    stream::{self, StreamExt},
    FutureExt,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::NotificationStore;
use crate::error::{DispatchError, RelayError};
use crate::models::{
    dispatch::DispatchResult,
    mapping::{EventScope, EventType, RecipientRole, ServiceCategory},
    submission::SubmissionDomains,
    template::{RenderedEmail, TemplateSource, TemplateTheme},
    tenant::{RelaySettings, TenantProfile},
};
use crate::services::{
    channels::resolve_channels,
    email::{MailRelay, OutgoingEmail, RelayConnector},
    encryption::CredentialCipher,
    extraction::{extract, VariableBag},
    mapping_registry::MappingRegistry,
    metrics,
    template::render,
    tenant_resolver::{TenantHint, TenantResolver},
};

/// Bag variable holding the customer's address.
pub const CUSTOMER_EMAIL_VAR: &str = "customer_email";

pub const DEFAULT_ADMIN_CONCURRENCY: usize = 4;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the lead record comes from.
#[derive(Debug, Clone)]
pub enum SubmissionSource {
    Stored(Uuid),
    Inline(SubmissionDomains),
}

/// Rendered output of an ad-hoc template, plus the bag it was rendered with.
#[derive(Debug, Clone, Serialize)]
pub struct TemplatePreview {
    #[serde(flatten)]
    pub rendered: RenderedEmail,
    pub variables: VariableBag,
}

/// Sender identity and relay, only built once verification passed.
struct VerifiedRelay {
    relay: Box<dyn MailRelay>,
    from_email: String,
    from_name: Option<String>,
}

impl VerifiedRelay {
    fn outgoing(&self, to: &str, rendered: &RenderedEmail) -> OutgoingEmail {
        OutgoingEmail {
            from_name: self.from_name.clone(),
            from_email: self.from_email.clone(),
            to: to.to_string(),
            subject: rendered.subject.clone(),
            html: rendered.html.clone(),
            text: rendered.text.clone(),
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    cipher: CredentialCipher,
    connector: Arc<dyn RelayConnector>,
    admin_concurrency: usize,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        cipher: CredentialCipher,
        connector: Arc<dyn RelayConnector>,
    ) -> Self {
        Self {
            store,
            cipher,
            connector,
            admin_concurrency: DEFAULT_ADMIN_CONCURRENCY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_admin_concurrency(mut self, workers: usize) -> Self {
        self.admin_concurrency = workers.max(1);
        self
    }

    /// Bounds each verify and each send independently.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn store(&self) -> &dyn NotificationStore {
        self.store.as_ref()
    }

    /// Runs a dispatch. Only pre-send conditions are errors; per-recipient
    /// failures are reported inside the returned result.
    pub async fn dispatch(
        &self,
        hint: &TenantHint,
        category: &ServiceCategory,
        event_type: EventType,
        source: SubmissionSource,
    ) -> Result<DispatchResult, DispatchError> {
        let outcome = self.run(hint, category, event_type, source).await;
        match &outcome {
            Ok(_) => metrics::record_dispatch(event_type.as_str(), "ok"),
            Err(e) => {
                metrics::record_dispatch(event_type.as_str(), "fatal");
                warn!(
                    category = %category,
                    event_type = %event_type,
                    kind = e.kind(),
                    "Dispatch aborted before sending: {}",
                    e
                );
            }
        }
        outcome
    }

    async fn run(
        &self,
        hint: &TenantHint,
        category: &ServiceCategory,
        event_type: EventType,
        source: SubmissionSource,
    ) -> Result<DispatchResult, DispatchError> {
        let tenant = TenantResolver::require(self.store(), hint).await?;
        let scope = EventScope::new(tenant.id, category.clone(), event_type);
        let domains = self.load_submission(&tenant, source).await?;

        // Hard barrier: nothing below runs unless the relay verified.
        let relay = self.verified_relay(&tenant).await?;

        let settings = self.store.notification_settings(&scope).await?;
        let channels = resolve_channels(settings.as_ref(), tenant.admin_email.as_deref());

        MappingRegistry::ensure_defaults(self.store(), &scope).await?;
        let theme = self.theme(&scope).await?;
        let record = domains.as_tree();

        // Every datastore read happens before the first send, so a store
        // failure can only abort a dispatch that has not delivered anything.
        let customer = if channels.customer.enabled {
            match self.prepare(&scope, RecipientRole::Customer, &record, &theme).await? {
                None => {
                    debug!(tenant_id = %tenant.id, "No active customer template; skipping");
                    None
                }
                Some((rendered, bag)) => match bag.get_str(CUSTOMER_EMAIL_VAR) {
                    None => {
                        debug!(tenant_id = %tenant.id, "No customer address in submission; skipping");
                        None
                    }
                    Some(to) => Some(relay.outgoing(to, &rendered)),
                },
            }
        } else {
            debug!(tenant_id = %tenant.id, "Customer channel disabled");
            None
        };

        let admin = if channels.admin.is_deliverable() {
            let prepared = self.prepare(&scope, RecipientRole::Admin, &record, &theme).await?;
            if prepared.is_none() {
                debug!(tenant_id = %tenant.id, "No active admin template; skipping");
            }
            prepared.map(|(rendered, _)| rendered)
        } else {
            debug!(tenant_id = %tenant.id, "Admin channel disabled or has no recipients");
            None
        };

        let mut errors = Vec::new();
        let mut customer_email_sent = false;
        let mut admin_email_sent = false;

        if let Some(email) = customer {
            let result = self.send(relay.relay.as_ref(), &email).await;
            metrics::record_email(RecipientRole::Customer.as_str(), result.is_ok());
            match result {
                Ok(()) => customer_email_sent = true,
                Err(e) => {
                    warn!(tenant_id = %tenant.id, to = %email.to, "Customer email failed: {}", e);
                    errors.push(format!("customer {}: {e}", email.to));
                }
            }
        }

        if let Some(rendered) = admin {
            let outcomes = self.fan_out(&relay, &channels.admin.emails, &rendered).await;
            for (to, result) in outcomes {
                metrics::record_email(RecipientRole::Admin.as_str(), result.is_ok());
                match result {
                    Ok(()) => admin_email_sent = true,
                    Err(e) => {
                        warn!(tenant_id = %tenant.id, to = %to, "Admin email failed: {}", e);
                        errors.push(format!("admin {to}: {e}"));
                    }
                }
            }
        }

        let result = DispatchResult {
            customer_email_sent,
            admin_email_sent,
            ghl_integration_eligible: channels.external_crm.enabled,
            errors,
            channels,
        };

        info!(
            tenant_id = %tenant.id,
            category = %category,
            event_type = %event_type,
            customer = result.customer_email_sent,
            admin = result.admin_email_sent,
            errors = result.errors.len(),
            "Dispatch complete"
        );
        Ok(result)
    }

    /// Renders an ad-hoc template against a submission without sending anything.
    pub async fn preview(
        &self,
        hint: &TenantHint,
        scope_category: &ServiceCategory,
        event_type: EventType,
        role: RecipientRole,
        template: &TemplateSource,
        source: Option<SubmissionSource>,
    ) -> Result<TemplatePreview, DispatchError> {
        let tenant = TenantResolver::require(self.store(), hint).await?;
        let scope = EventScope::new(tenant.id, scope_category.clone(), event_type);
        let domains = match source {
            Some(source) => self.load_submission(&tenant, source).await?,
            None => SubmissionDomains::default(),
        };

        MappingRegistry::ensure_defaults(self.store(), &scope).await?;
        let rules = MappingRegistry::get_rules(self.store(), &scope, role).await?;
        let variables = extract(&domains.as_tree(), &rules);
        let theme = self.theme(&scope).await?;

        Ok(TemplatePreview {
            rendered: render(template, &variables, &theme),
            variables,
        })
    }

    async fn load_submission(
        &self,
        tenant: &TenantProfile,
        source: SubmissionSource,
    ) -> Result<SubmissionDomains, DispatchError> {
        match source {
            SubmissionSource::Inline(domains) => Ok(domains),
            SubmissionSource::Stored(id) => {
                let submission = self
                    .store
                    .lead_submission(id)
                    .await?
                    .ok_or(DispatchError::SubmissionNotFound(id))?;
                // A submission owned by another tenant does not exist for this one.
                if submission.tenant_id.is_some_and(|owner| owner != tenant.id) {
                    return Err(DispatchError::SubmissionNotFound(id));
                }
                Ok(submission.domains)
            }
        }
    }

    async fn verified_relay(&self, tenant: &TenantProfile) -> Result<VerifiedRelay, DispatchError> {
        let blob = tenant
            .relay_credentials
            .as_ref()
            .ok_or(DispatchError::CredentialsMissing)?;

        let settings: RelaySettings = self
            .cipher
            .decrypt_settings(tenant.id, blob)
            .map_err(|e| DispatchError::CredentialsUnusable(format!("{e:#}")))?;
        if !settings.is_complete() {
            return Err(DispatchError::CredentialsMissing);
        }

        let relay = self
            .connector
            .connect(&settings)
            .map_err(|e| DispatchError::CredentialsUnusable(e.to_string()))?;

        match tokio::time::timeout(self.send_timeout, relay.verify()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(DispatchError::VerificationFailed(e.to_string())),
            Err(_) => {
                return Err(DispatchError::VerificationFailed(
                    RelayError::Timeout(self.send_timeout).to_string(),
                ))
            }
        }

        Ok(VerifiedRelay {
            relay,
            from_email: settings.from_email,
            from_name: settings
                .from_name
                .filter(|n| !n.trim().is_empty())
                .or_else(|| Some(tenant.display_name.clone())),
        })
    }

    async fn theme(&self, scope: &EventScope) -> anyhow::Result<TemplateTheme> {
        Ok(self
            .store
            .category_theme(scope.tenant_id, &scope.category)
            .await?
            .unwrap_or_default())
    }

    /// Extracts and renders for one role. `None` when the role has no active template.
    async fn prepare(
        &self,
        scope: &EventScope,
        role: RecipientRole,
        record: &serde_json::Value,
        theme: &TemplateTheme,
    ) -> anyhow::Result<Option<(RenderedEmail, VariableBag)>> {
        let Some(template) = self.store.active_template(scope, role).await? else {
            return Ok(None);
        };
        let rules = MappingRegistry::get_rules(self.store(), scope, role).await?;
        let bag = extract(record, &rules);
        let rendered = render(&TemplateSource::from(&template), &bag, theme);
        Ok(Some((rendered, bag)))
    }

    async fn send(&self, relay: &dyn MailRelay, email: &OutgoingEmail) -> Result<(), RelayError> {
        send_with_timeout(relay, email, self.send_timeout).await
    }

    /// Independent sends, at most `admin_concurrency` in flight. Results come back
    /// in recipient order regardless of completion order.
    async fn fan_out(
        &self,
        relay: &VerifiedRelay,
        recipients: &[String],
        rendered: &RenderedEmail,
    ) -> Vec<(String, Result<(), RelayError>)> {
        let transport = relay.relay.as_ref();
        let timeout = self.send_timeout;
        let jobs: Vec<(usize, OutgoingEmail)> = recipients
            .iter()
            .map(|to| relay.outgoing(to, rendered))
            .enumerate()
            .collect();

        let mut outcomes: Vec<(usize, String, Result<(), RelayError>)> = stream::iter(jobs)
            .map(move |(idx, email)| {
                async move {
                    let result = send_with_timeout(transport, &email, timeout).await;
                    (idx, email.to, result)
                }
                .boxed()
            })
            .buffer_unordered(self.admin_concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(idx, _, _)| *idx);
        outcomes.into_iter().map(|(_, to, result)| (to, result)).collect()
    }
}

async fn send_with_timeout(
    relay: &dyn MailRelay,
    email: &OutgoingEmail,
    timeout: Duration,
) -> Result<(), RelayError> {
    match tokio::time::timeout(timeout, relay.send(email)).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::Timeout(timeout)),
    }
}
