// src/notify/outbox.rs

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{NotifyConfig, Record};
use crate::notify::{DigestRenderer, Notifier};

/// Writes each digest as a MIME message into an outbox directory.
///
/// A mail relay (or a human) picks the `.eml` files up from there.
pub struct OutboxNotifier {
    dir: PathBuf,
    sender: String,
    subject: String,
    renderer: DigestRenderer,
}

impl OutboxNotifier {
    pub fn new(
        dir: impl Into<PathBuf>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        renderer: DigestRenderer,
    ) -> Self {
        Self {
            dir: dir.into(),
            sender: sender.into(),
            subject: subject.into(),
            renderer,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        Ok(Self::new(
            &config.outbox_dir,
            &config.sender,
            &config.subject,
            DigestRenderer::from_config(config)?,
        ))
    }

    fn message(&self, recipient: &str, body: &str) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=\"UTF-8\"\r\n\r\n{}",
            self.sender,
            recipient,
            self.subject,
            Utc::now().to_rfc2822(),
            body
        )
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send_digest(&self, recipient: &str, records: &[Record]) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(AppError::notify("no recipient given"));
        }

        let body = self.renderer.render(records)?;
        let message = self.message(recipient, &body);

        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{}-digest.eml", Utc::now().format("%Y%m%dT%H%M%S%3f"));
        let path = self.dir.join(name);
        let tmp = path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(message.as_bytes()).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        log::info!(
            "Digest of {} jobs for {} written to {}",
            records.len(),
            recipient,
            path.display()
        );
        Ok(())
    }
}
