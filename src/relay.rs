//! SMTP relay — outbound delivery via lettre.
//!
//! The `Relay` trait is the seam the dispatch pass sends through; the
//! production implementation performs a STARTTLS-upgraded authenticated
//! submission. Success/failure is the only signal consumed.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::RelayError;
use crate::model::SendingAccount;

/// How long one relay submission may take before it counts as failed.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// One outbound message, ready for submission.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Sends a single message through a sending account's relay.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn send(
        &self,
        account: &SendingAccount,
        password: &SecretString,
        email: &OutboundEmail,
    ) -> Result<(), RelayError>;
}

/// Production relay: lettre SMTP with STARTTLS.
pub struct SmtpRelay;

#[async_trait]
impl Relay for SmtpRelay {
    async fn send(
        &self,
        account: &SendingAccount,
        password: &SecretString,
        email: &OutboundEmail,
    ) -> Result<(), RelayError> {
        let message = build_message(account, email)?;

        let creds = Credentials::new(
            account.smtp_username.clone(),
            password.expose_secret().to_string(),
        );
        let host = account.smtp_host.clone();
        let port = account.smtp_port;

        // lettre's SmtpTransport is blocking; run the submission off the
        // async runtime like other blocking I/O in this crate.
        let host_for_err = host.clone();
        tokio::task::spawn_blocking(move || {
            let transport = SmtpTransport::starttls_relay(&host)
                .map_err(|e| RelayError::Transport {
                    host: host.clone(),
                    reason: format!("relay setup failed: {e}"),
                })?
                .port(port)
                .credentials(creds)
                .timeout(Some(SEND_TIMEOUT))
                .build();

            transport
                .send(&message)
                .map(|_| ())
                .map_err(|e| RelayError::Transport {
                    host: host.clone(),
                    reason: format!("send failed: {e}"),
                })
        })
        .await
        .map_err(|e| RelayError::Transport {
            host: host_for_err,
            reason: format!("send task panicked: {e}"),
        })?
    }
}

/// Assemble the MIME message: HTML body, display-name From header.
fn build_message(
    account: &SendingAccount,
    email: &OutboundEmail,
) -> Result<Message, RelayError> {
    let from = Mailbox::new(
        Some(account.display_name.clone()),
        account
            .email
            .parse()
            .map_err(|e| RelayError::InvalidAddress {
                address: account.email.clone(),
                reason: format!("{e}"),
            })?,
    );
    let to: Mailbox = email.to.parse().map_err(|e| RelayError::InvalidAddress {
        address: email.to.clone(),
        reason: format!("{e}"),
    })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(&email.subject)
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone())
        .map_err(|e| RelayError::Build(e.to_string()))
}
