#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use leadflow_api::db::MemoryStore;
use leadflow_api::error::RelayError;
use leadflow_api::models::mapping::{EventType, RecipientRole, ServiceCategory};
use leadflow_api::models::template::EmailTemplate;
use leadflow_api::models::tenant::{RelaySettings, TenantProfile};
use leadflow_api::services::dispatch::Dispatcher;
use leadflow_api::services::email::{MailRelay, OutgoingEmail, RelayConnector};
use leadflow_api::services::encryption::CredentialCipher;

pub const HOST: &str = "acme.example.com";
pub const MASTER_KEY: [u8; 32] = [9u8; 32];

/// Shared record of everything the fake relay was asked to do.
#[derive(Default)]
pub struct RelayLog {
    pub verifications: AtomicUsize,
    pub attempts: Mutex<Vec<String>>,
    pub delivered: Mutex<Vec<OutgoingEmail>>,
    pub failing: Mutex<HashSet<String>>,
    pub verify_error: Mutex<Option<RelayError>>,
}

impl RelayLog {
    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn fail_verification(&self, error: RelayError) {
        *self.verify_error.lock().unwrap() = Some(error);
    }

    pub fn attempts(&self) -> Vec<String> {
        let mut a = self.attempts.lock().unwrap().clone();
        a.sort();
        a
    }

    pub fn delivered(&self) -> Vec<OutgoingEmail> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

pub struct RecordingRelay(Arc<RelayLog>);

#[async_trait]
impl MailRelay for RecordingRelay {
    async fn verify(&self) -> Result<(), RelayError> {
        self.0.verifications.fetch_add(1, Ordering::SeqCst);
        match self.0.verify_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), RelayError> {
        self.0.attempts.lock().unwrap().push(email.to.clone());
        if self.0.failing.lock().unwrap().contains(&email.to) {
            return Err(RelayError::Transport("550 mailbox unavailable".into()));
        }
        self.0.delivered.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct RecordingConnector(pub Arc<RelayLog>);

impl RelayConnector for RecordingConnector {
    fn connect(&self, _settings: &RelaySettings) -> Result<Box<dyn MailRelay>, RelayError> {
        Ok(Box::new(RecordingRelay(self.0.clone())))
    }
}

pub fn relay_settings() -> RelaySettings {
    RelaySettings {
        host: "smtp.acme.example".into(),
        port: Some(587),
        username: "mailer".into(),
        password: "hunter2".into(),
        from_email: "quotes@acme.example".into(),
        from_name: Some("Acme Heating".into()),
    }
}

/// Active tenant on `HOST` with sealed relay settings and a fallback admin.
pub async fn seed_tenant(store: &MemoryStore) -> Uuid {
    let id = Uuid::new_v4();
    let cipher = CredentialCipher::new(MASTER_KEY);
    let blob = cipher.encrypt_settings(id, &relay_settings()).unwrap();
    store
        .add_tenant(TenantProfile {
            id,
            slug: "acme".into(),
            display_name: "Acme Heating".into(),
            routing_key: HOST.into(),
            admin_email: Some("owner@acme.example".into()),
            relay_credentials: Some(serde_json::to_value(blob).unwrap()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await;
    id
}

pub async fn seed_template(
    store: &MemoryStore,
    tenant_id: Uuid,
    event_type: EventType,
    role: RecipientRole,
    subject: &str,
    html: &str,
    text: &str,
) {
    store
        .add_template(EmailTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            category: ServiceCategory::new("boiler"),
            event_type,
            recipient_role: role,
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await;
}

pub fn dispatcher(store: Arc<MemoryStore>, log: Arc<RelayLog>) -> Dispatcher {
    Dispatcher::new(
        store,
        CredentialCipher::new(MASTER_KEY),
        Arc::new(RecordingConnector(log)),
    )
    .with_admin_concurrency(2)
}
