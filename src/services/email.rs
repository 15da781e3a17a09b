use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::tenant::RelaySettings;

/// One fully rendered message for a single recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub from_name: Option<String>,
    pub from_email: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// A connected, authenticated outbound mail relay.
#[async_trait]
pub trait MailRelay: Send + Sync {
    /// Checks that the relay accepts our credentials. Called once per dispatch.
    async fn verify(&self) -> Result<(), RelayError>;

    async fn send(&self, email: &OutgoingEmail) -> Result<(), RelayError>;
}

/// Builds a relay from a tenant's decrypted settings.
pub trait RelayConnector: Send + Sync {
    fn connect(&self, settings: &RelaySettings) -> Result<Box<dyn MailRelay>, RelayError>;
}

/// Lettre-backed connector; implicit TLS on 465, STARTTLS on every other port.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    timeout: Duration,
    default_port: u16,
}

impl SmtpConnector {
    pub fn new(timeout: Duration, default_port: u16) -> Self {
        Self { timeout, default_port }
    }
}

impl RelayConnector for SmtpConnector {
    fn connect(&self, settings: &RelaySettings) -> Result<Box<dyn MailRelay>, RelayError> {
        let port = settings.port.unwrap_or(self.default_port);
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());

        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| RelayError::Transport(e.to_string()))?;

        let transport = builder
            .port(port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build();

        Ok(Box::new(SmtpRelay { transport }))
    }
}

pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

fn parse_address(address: &str) -> Result<Address, RelayError> {
    address.trim().parse::<Address>().map_err(|e| RelayError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

fn new_message_id(from: &Address) -> String {
    format!("<{}@{}>", Uuid::new_v4(), from.domain())
}

/// Builds a multipart/alternative message (plain text first, HTML preferred).
pub fn build_message(email: &OutgoingEmail) -> Result<Message, RelayError> {
    let from_addr = parse_address(&email.from_email)?;
    let to_addr = parse_address(&email.to)?;
    let message_id = new_message_id(&from_addr);
    let from = Mailbox::new(email.from_name.clone().filter(|n| !n.trim().is_empty()), from_addr);

    Message::builder()
        .message_id(Some(message_id))
        .from(from)
        .to(Mailbox::new(None, to_addr))
        .subject(email.subject.as_str())
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html.clone()),
                ),
        )
        .map_err(|e| RelayError::Build(e.to_string()))
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn verify(&self) -> Result<(), RelayError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RelayError::Transport("relay refused the connection".into())),
            Err(e) => Err(RelayError::Transport(e.to_string())),
        }
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), RelayError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            from_name: Some("Acme Heating".into()),
            from_email: "quotes@acme.example".into(),
            to: to.into(),
            subject: "Your quote".into(),
            html: "<p>Hello</p>".into(),
            text: "Hello".into(),
        }
    }

    #[test]
    fn builds_multipart_message_with_message_id() {
        let message = build_message(&email("john@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Message-ID: <"));
        assert!(raw.contains("@acme.example>"));
        assert!(raw.contains("Subject: Your quote"));
    }

    #[test]
    fn invalid_recipient_is_an_address_error() {
        let err = build_message(&email("not-an-address")).unwrap_err();
        assert!(matches!(err, RelayError::Address { ref address, .. } if address == "not-an-address"));
    }
}
