//! SMTP gateway via lettre, plus a dry-run gateway for rehearsals.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::compose::DispatchRequest;
use crate::config::SmtpConfig;
use crate::dispatch::EmailGateway;
use crate::error::{ConfigError, DispatchError};

/// Split a `", "`-joined address list back into entries.
fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Outbound SMTP gateway.
pub struct SmtpGateway {
    config: SmtpConfig,
    password: SecretString,
}

impl SmtpGateway {
    pub fn new(config: SmtpConfig) -> Result<Self, ConfigError> {
        let password = config.resolved_password()?;
        Ok(Self { config, password })
    }

    fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, DispatchError> {
        let parsed: Address =
            address
                .trim()
                .parse()
                .map_err(|e: lettre::address::AddressError| DispatchError::InvalidAddress {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(Mailbox::new(name.map(str::to_string), parsed))
    }

    /// Compose the lettre message from a dispatch request. The sender
    /// falls back to the configured from address/name when the row's
    /// options carry no override.
    fn build_message(&self, request: &DispatchRequest, body: &str) -> Result<Message, DispatchError> {
        let from_email = request
            .options
            .from_email
            .as_deref()
            .unwrap_or(&self.config.from_address);
        let from_name = request
            .options
            .from_name
            .as_deref()
            .or(self.config.from_name.as_deref());

        let mut builder = Message::builder()
            .from(Self::mailbox(from_name, from_email)?)
            .subject(request.subject.clone());

        for to in split_list(&request.recipients) {
            builder = builder.to(Self::mailbox(None, to)?);
        }
        if let Some(cc) = &request.options.cc {
            for addr in split_list(cc) {
                builder = builder.cc(Self::mailbox(None, addr)?);
            }
        }
        if let Some(bcc) = &request.options.bcc {
            for addr in split_list(bcc) {
                builder = builder.bcc(Self::mailbox(None, addr)?);
            }
        }
        if let Some(reply_to) = &request.options.reply_to {
            for addr in split_list(reply_to) {
                builder = builder.reply_to(Self::mailbox(None, addr)?);
            }
        }

        builder
            .body(body.to_string())
            .map_err(|e| DispatchError::BuildFailed {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl EmailGateway for SmtpGateway {
    async fn send(&self, request: &DispatchRequest, body: &str) -> Result<(), DispatchError> {
        let message = self.build_message(request, body)?;

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| DispatchError::SendFailed {
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.password.expose_secret().to_string(),
            ))
            .build();

        transport.send(&message).map_err(|e| DispatchError::SendFailed {
            reason: format!("SMTP send failed: {e}"),
        })?;
        Ok(())
    }
}

/// Gateway that logs the composed message instead of sending it.
pub struct DryRunGateway;

#[async_trait]
impl EmailGateway for DryRunGateway {
    async fn send(&self, request: &DispatchRequest, body: &str) -> Result<(), DispatchError> {
        info!(
            row = request.row_number,
            to = %request.recipients,
            subject = %request.subject,
            "Dry run: message not sent"
        );
        debug!(body, "Dry run body");
        Ok(())
    }
}
