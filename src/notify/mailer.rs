use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::{MailConfig, MailProvider};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivers a single message. Returns the provider's message id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
}

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match config.provider {
        MailProvider::Console => Arc::new(ConsoleMailer::new(config)),
        MailProvider::Http => Arc::new(HttpMailer::new(config)?),
    };
    Ok(mailer)
}

/// SendGrid v3 compatible transactional mail API.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("mail.api_key is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn payload(&self, email: &OutgoingEmail) -> serde_json::Value {
        json!({
            "personalizations": [{
                "to": [{ "email": email.to }],
                "subject": email.subject
            }],
            "from": {
                "email": self.from_email,
                "name": self.from_name
            },
            "content": [{
                "type": "text/html",
                "value": email.html
            }]
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let delivery_error = |reason: String| AppError::Delivery {
            to: email.to.clone(),
            reason,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(delivery_error(format!("HTTP {status}: {error_text}")));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("accepted")
            .to_string();

        tracing::debug!(to = %email.to, message_id = %message_id, "email sent");
        Ok(message_id)
    }
}

/// Logs messages instead of sending them.
pub struct ConsoleMailer {
    from: String,
    counter: AtomicU64,
}

impl ConsoleMailer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            from: format!("\"{}\" <{}>", config.from_name, config.from_email),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            from = %self.from,
            to = %email.to,
            subject = %email.subject,
            bytes = email.html.len(),
            "email (console provider)"
        );
        Ok(format!("console-{n}"))
    }
}
