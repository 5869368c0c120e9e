//! Notification sinks.
//!
//! Delivery is best-effort: a failed send is reported to the caller, which
//! logs it and moves on. Nothing here retries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use vigil_core::NotifySettings;
use vigil_health::BoxFuture;

use crate::error::{NotifyError, NotifyResult};

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// A destination for alert text.
pub trait Notifier: Send + Sync {
    fn notify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, NotifyResult<()>>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

fn http_client() -> NotifyResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()
        .map_err(|e| NotifyError::Client(e.to_string()))
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: serde_json::Value,
) -> NotifyResult<reqwest::Response> {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        // The URL may carry a bot token.
        .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status(status.as_u16()));
    }
    Ok(response)
}

// ── Telegram ──────────────────────────────────────────────────────

pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> NotifyResult<Self> {
        Self::with_api_base(TELEGRAM_API, bot_token, chat_id)
    }

    pub fn with_api_base(
        api_base: &str,
        bot_token: &str,
        chat_id: impl Into<String>,
    ) -> NotifyResult<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.into(),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn notify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            let body = json!({ "chat_id": self.chat_id, "text": text });
            let response = post_json(&self.client, &self.endpoint, body).await?;

            // The Bot API reports some failures with a 200 and `ok: false`.
            let reply: serde_json::Value = response
                .json()
                .await
                .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;
            if reply.get("ok").and_then(|v| v.as_bool()) == Some(false) {
                let description = reply
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error");
                return Err(NotifyError::Rejected(description.to_string()));
            }
            debug!(chars = text.len(), "telegram message sent");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

// ── Webhook ───────────────────────────────────────────────────────

/// POSTs `{"text": ...}` to a URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> NotifyResult<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            post_json(&self.client, &self.url, json!({ "text": text })).await?;
            debug!(chars = text.len(), "webhook message sent");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

// ── Log / dry-run ─────────────────────────────────────────────────

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            info!(text = %text, "notification");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Logs what the wrapped sink would have received.
pub struct DryRunNotifier {
    inner: Arc<dyn Notifier>,
}

impl DryRunNotifier {
    pub fn new(inner: Arc<dyn Notifier>) -> Self {
        Self { inner }
    }
}

impl Notifier for DryRunNotifier {
    fn notify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            info!(sink = self.inner.name(), text = %text, "dry run, not delivered");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

// ── Recording ─────────────────────────────────────────────────────

/// Keeps every message in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records the attempt and then reports a failure.
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            match self.messages.lock() {
                Ok(mut guard) => guard.push(text.to_string()),
                Err(poisoned) => poisoned.into_inner().push(text.to_string()),
            }
            if self.failing {
                Err(NotifyError::Status(503))
            } else {
                Ok(())
            }
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Build the configured sink, wrapped for dry runs.
pub fn build_notifier(settings: &NotifySettings, dry_run: bool) -> NotifyResult<Arc<dyn Notifier>> {
    let sink: Arc<dyn Notifier> = match settings {
        NotifySettings::Telegram { bot_token, chat_id } => {
            Arc::new(TelegramNotifier::new(bot_token, chat_id.clone())?)
        }
        NotifySettings::Webhook { url } => Arc::new(WebhookNotifier::new(url.clone())?),
        NotifySettings::Log => Arc::new(LogNotifier),
    };

    if dry_run {
        Ok(Arc::new(DryRunNotifier::new(sink)))
    } else {
        Ok(sink)
    }
}
