// =============================================================================
// Telegram Bot API Notifier
// =============================================================================
//
// Posts signal messages with `sendMessage` and rewrites them in place with
// `editMessageText`.  Every channel gets its own message and therefore its
// own handle; a failure on one channel is logged and does not stop delivery
// to the others.
//
// SECURITY: the bot token is part of the request path and is never logged.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::SignalError;
use crate::ports::NotificationPort;
use crate::types::ChannelHandle;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API client.
pub struct TelegramNotifier {
    token: String,
    api_url: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            token: token.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Render an error chain with every occurrence of the token masked.
    fn describe(&self, e: &anyhow::Error) -> String {
        let text = format!("{e:#}");
        if self.token.is_empty() {
            text
        } else {
            text.replace(&self.token, "<redacted>")
        }
    }

    /// POST a Bot API method and return its `result` field.
    async fn call<T: Serialize + Sync>(&self, method: &str, payload: &T) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{method} request failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to parse {method} response"))?;

        if !status.is_success() || body["ok"].as_bool() != Some(true) {
            let description = body["description"].as_str().unwrap_or("no description");
            anyhow::bail!("Telegram {method} returned {status}: {description}");
        }
        Ok(body["result"].clone())
    }

    /// sendMessage to one chat; returns the new message id.
    #[instrument(skip(self, text), name = "telegram::send_message")]
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<i64> {
        let payload = SendMessage {
            chat_id,
            text,
            disable_web_page_preview: true,
        };
        let result = self.call("sendMessage", &payload).await?;
        let message_id = result["message_id"]
            .as_i64()
            .context("sendMessage result missing 'message_id'")?;
        debug!(chat_id, message_id, "message sent");
        Ok(message_id)
    }

    /// editMessageText on one existing message.
    #[instrument(skip(self, text), name = "telegram::edit_message")]
    pub async fn edit_message(&self, chat_id: &str, message_id: i64, text: &str) -> Result<()> {
        let payload = EditMessageText {
            chat_id,
            message_id,
            text,
            disable_web_page_preview: true,
        };
        match self.call("editMessageText", &payload).await {
            Ok(_) => {
                debug!(chat_id, message_id, "message edited");
                Ok(())
            }
            // Editing to identical text is rejected by Telegram; the message
            // already shows what we want.
            Err(e) if format!("{e:#}").contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl NotificationPort for TelegramNotifier {
    async fn create_message(
        &self,
        channel_ids: &[String],
        text: &str,
    ) -> Result<Vec<ChannelHandle>, SignalError> {
        let mut handles = Vec::with_capacity(channel_ids.len());
        let mut failures = Vec::new();

        for chat_id in channel_ids {
            match self.send_message(chat_id, text).await {
                Ok(message_id) => handles.push(ChannelHandle {
                    channel_id: chat_id.clone(),
                    message_id,
                }),
                Err(e) => {
                    let reason = self.describe(&e);
                    warn!(chat_id = %chat_id, error = %reason, "sendMessage failed");
                    failures.push(format!("{chat_id}: {reason}"));
                }
            }
        }

        if handles.is_empty() {
            return Err(SignalError::NotificationDelivery(if failures.is_empty() {
                "no channels configured".to_string()
            } else {
                failures.join("; ")
            }));
        }
        Ok(handles)
    }

    async fn update_message(&self, handles: &[ChannelHandle], text: &str) -> Result<(), SignalError> {
        let mut failures = Vec::new();

        for handle in handles {
            if let Err(e) = self
                .edit_message(&handle.channel_id, handle.message_id, text)
                .await
            {
                let reason = self.describe(&e);
                warn!(
                    chat_id = %handle.channel_id,
                    message_id = handle.message_id,
                    error = %reason,
                    "editMessageText failed"
                );
                failures.push(format!("{}: {reason}", handle.channel_id));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SignalError::NotificationDelivery(failures.join("; ")))
        }
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}
