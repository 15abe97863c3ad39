/// Outbound push notifications.
///
/// The watchdog only needs "send this text, tell me if it worked"; the
/// LINE Messaging push API is the production implementation.
use crate::clock::{format_local, Clock};
use crate::config::{Credentials, NotifyConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one text message. Callers log failures; nothing retries.
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Errors from a single delivery attempt.
#[derive(Debug)]
pub enum NotifyError {
    /// Token or destination was not configured.
    MissingCredentials,
    /// Request could not be built, sent, or timed out.
    Transport { source: reqwest::Error },
    /// Gateway answered with a non-success status.
    Status { status: u16, body: String },
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::MissingCredentials => {
                write!(f, "push credentials are not configured")
            }
            NotifyError::Transport { source } => write!(f, "push request failed: {source}"),
            NotifyError::Status { status, body } => {
                write!(f, "push gateway returned status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotifyError::Transport { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// Push client for the LINE Messaging API.
///
/// Without credentials every send fails with `MissingCredentials`, so the
/// service still runs and logs what it would have sent.
pub struct LineNotifier {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<Credentials>,
}

impl LineNotifier {
    pub fn new(config: &NotifyConfig, credentials: Option<Credentials>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Transport { source: e })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credentials,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(NotifyError::MissingCredentials)?;

        let body = PushRequest {
            to: &creds.destination,
            messages: vec![TextMessage {
                kind: "text",
                text: message,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&creds.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport { source: e })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// `1200` -> `"20"`, `90` -> `"1.5"`.
fn format_minutes(secs: u64) -> String {
    if secs % 60 == 0 {
        (secs / 60).to_string()
    } else {
        format!("{:.1}", secs as f64 / 60.0)
    }
}

/// Text sent when the worker has not checked in for `threshold_secs`.
pub fn stall_message(job_name: &str, threshold_secs: u64, last_reset: DateTime<Utc>) -> String {
    format!(
        "{job_name}\nNo progress report for over {} minutes!\nLast check-in: {}",
        format_minutes(threshold_secs),
        format_local(last_reset)
    )
}

/// Text sent when an external actor reports a failed delivery.
#[cfg_attr(not(feature = "serve"), allow(dead_code))]
pub fn delivery_failure_message(job_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{job_name}\nPush notification delivery failed.\nReported at: {}",
        format_local(at)
    )
}

/// Push a "delivery failed" notice through `notifier`.
///
/// Independent of the watchdog timer. Returns whether the push was delivered.
#[cfg_attr(not(feature = "serve"), allow(dead_code))]
pub async fn report_delivery_failure(
    notifier: &dyn Notifier,
    clock: &dyn Clock,
    job_name: &str,
) -> bool {
    let message = delivery_failure_message(job_name, clock.wall_now());
    match notifier.send(&message).await {
        Ok(()) => {
            tracing::info!("delivery failure notice sent");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to send delivery failure notice");
            false
        }
    }
}

/// Notifier that records every message; optionally fails each send.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<String>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        let n = Self::default();
        n.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        n
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Status {
                status: 500,
                body: "simulated".to_string(),
            });
        }
        Ok(())
    }
}
