use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::Notifier;
use crate::changes::ChangeRecord;
use crate::config::SmtpConfig;

/// Sends one plain-text mail per change over STARTTLS.
pub struct EmailNotifier {
    sender: Mailbox,
    recipients: Vec<Mailbox>,
    transport: SmtpTransport,
}

impl EmailNotifier {
    pub fn from_config(smtp: &SmtpConfig) -> Result<Self> {
        let sender: Mailbox = smtp
            .sender
            .parse()
            .with_context(|| format!("invalid sender address {:?}", smtp.sender))?;
        let recipients = smtp
            .recipients
            .iter()
            .map(|r| {
                r.parse::<Mailbox>()
                    .with_context(|| format!("invalid recipient address {r:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        if recipients.is_empty() {
            anyhow::bail!("email notifier needs at least one recipient");
        }

        let mut builder = SmtpTransport::starttls_relay(&smtp.server)
            .with_context(|| format!("invalid SMTP relay {}", smtp.server))?
            .port(smtp.port);
        if let Some(password) = &smtp.password {
            builder = builder.credentials(Credentials::new(smtp.username.clone(), password.clone()));
        }

        Ok(Self {
            sender,
            recipients,
            transport: builder.build(),
        })
    }

    fn build_message(&self, record: &ChangeRecord) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(subject_for(record))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.recipients {
            builder = builder.to(to.clone());
        }
        builder
            .body(body_for(record))
            .context("failed to build notification mail")
    }
}

fn subject_for(record: &ChangeRecord) -> String {
    format!("File System Event: {}", record.kind)
}

fn body_for(record: &ChangeRecord) -> String {
    format!(
        "Event Type: {}\nFile Path: {}\nSource: {}\nTimestamp: {}\n",
        record.kind,
        record.subject,
        record.source,
        record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, record: &ChangeRecord) -> Result<()> {
        let message = self.build_message(record)?;
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .context("mail task panicked")?
            .context("SMTP send failed")?;
        tracing::debug!("notifier: mailed {} {}", record.kind, record.subject);
        Ok(())
    }
}
