//! Critical alerts for scheduled runs that end in a fatal error.

use async_trait::async_trait;
use locus_core::hash::sha256_hex;
use locus_core::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct CriticalAlert {
    pub message: String,
    pub payload: Value,
}

impl CriticalAlert {
    pub fn new(message: impl Into<String>, payload: Value) -> Self {
        Self {
            message: message.into(),
            payload,
        }
    }

    pub fn body(&self) -> Value {
        json!({
            "level": "critical",
            "message": self.message,
            "payload": self.payload,
        })
    }

    /// Identical alerts share a key.
    pub fn key(&self) -> String {
        format!("critical:{}", sha256_hex(&self.body().to_string()))
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync + fmt::Debug {
    async fn send(&self, alert: &CriticalAlert) -> Result<()>;
}

/// Posts the alert body as JSON to a webhook.
pub struct WebhookAlertSink {
    client: Client,
    url: Url,
}

impl fmt::Debug for WebhookAlertSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookAlertSink")
            .field("host", &self.url.host_str())
            .finish()
    }
}

impl WebhookAlertSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alert: &CriticalAlert) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(&alert.body())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Sends each distinct alert once per process.
#[derive(Debug)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    sent: Mutex<HashSet<String>>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            sent: Mutex::new(HashSet::new()),
        }
    }

    fn already_sent(&self, key: &str) -> bool {
        self.sent.lock().map_or(false, |sent| sent.contains(key))
    }

    /// Returns whether the alert went out. Sink failures are logged and the
    /// alert stays eligible for the next call.
    pub async fn dispatch(&self, alert: &CriticalAlert) -> bool {
        let key = alert.key();
        if self.already_sent(&key) {
            tracing::info!(alert_key = %key, "critical alert deduplicated");
            return false;
        }

        match self.sink.send(alert).await {
            Ok(()) => {
                if let Ok(mut sent) = self.sent.lock() {
                    sent.insert(key.clone());
                }
                tracing::error!(alert_key = %key, message = %alert.message, payload = %alert.payload, "critical alert emitted");
                true
            }
            Err(e) => {
                tracing::warn!(alert_key = %key, error = %e, "failed to send critical alert");
                false
            }
        }
    }
}
