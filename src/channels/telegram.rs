//! Telegram channel client — reads channel posts and publishes via the Bot API.
//!
//! The bot must be an administrator of both the source and the destination
//! channel: the Bot API only delivers `channel_post` updates for channels
//! the bot belongs to, and only allows it to post where it has rights.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channels::client::{ChannelClient, ChannelHandle};
use crate::error::{ChannelError, ConfigError};
use crate::pipeline::types::Message;

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Per-request timeout for Bot API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bot credentials and endpoint.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::from(bot_token.into()),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Read `TELEGRAM_BOT_TOKEN` (required) and `TELEGRAM_API_BASE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()))?;

        let config = Self::new(token.trim());
        Ok(match std::env::var("TELEGRAM_API_BASE") {
            Ok(base) if !base.trim().is_empty() => config.with_api_base(base.trim()),
            _ => config,
        })
    }
}

/// Telegram Bot API client.
pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
    connected: bool,
    /// Next `getUpdates` offset.
    offset: i64,
    resolved: HashMap<String, ChannelHandle>,
    /// Newest post seen per chat id.
    latest: HashMap<i64, Message>,
    /// Progress of the last send that failed after some chunks went out.
    partial_send: Option<PartialSend>,
}

/// Chunks already delivered for a split message whose send failed midway.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartialSend {
    chat_id: i64,
    text: String,
    delivered: usize,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            connected: false,
            offset: 0,
            resolved: HashMap::new(),
            latest: HashMap::new(),
            partial_send: None,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// POST a Bot API method and unwrap its `result`.
    async fn call(&self, method: &str, body: Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {e}")))?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| {
            ChannelError::Http(format!("{method}: unreadable response ({status}): {e}"))
        })?;

        check_response(method, data)
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    ///
    /// If a chunk fails after earlier ones went out, a retry of the same
    /// text to the same chat resumes at the failed chunk.
    async fn send_message(&mut self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let skip = self.resume_point(chat_id, text);
        if skip > 0 {
            info!(chat_id, skipped = skip, total = chunks.len(), "Resuming partially sent message");
        }

        for (index, chunk) in chunks.iter().enumerate().skip(skip) {
            if let Err(e) = self.send_message_chunk(chat_id, chunk).await {
                self.partial_send = (index > 0).then(|| PartialSend {
                    chat_id,
                    text: text.to_string(),
                    delivered: index,
                });
                return Err(e);
            }
        }

        self.partial_send = None;
        Ok(())
    }

    /// Chunks of `text` already delivered to `chat_id` by a failed send.
    fn resume_point(&self, chat_id: i64, text: &str) -> usize {
        self.partial_send
            .as_ref()
            .filter(|p| p.chat_id == chat_id && p.text == text)
            .map_or(0, |p| p.delivered)
    }

    /// Send a single chunk, Markdown-first with fallback.
    async fn send_message_chunk(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_err = match self.call("sendMessage", markdown_body).await {
            Ok(_) => return Ok(()),
            Err(e @ (ChannelError::AuthFailed { .. } | ChannelError::RateLimited { .. })) => {
                return Err(e);
            }
            Err(e) => e,
        };

        warn!(
            error = %markdown_err,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.call("sendMessage", plain_body)
            .await
            .map(|_| ())
            .map_err(|plain_err| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_err}, plain: {plain_err})"
                ),
            })
    }

    /// Fold a `getUpdates` result into the offset and the latest-post map.
    /// Returns how many posts replaced a chat's latest entry.
    fn ingest_updates(&mut self, updates: &Value) -> usize {
        let Some(results) = updates.as_array() else {
            return 0;
        };

        let mut ingested = 0;
        for update in results {
            if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                self.offset = self.offset.max(uid + 1);
            }

            let Some(post) = update.get("channel_post") else {
                continue;
            };
            let Some(chat_id) = post.pointer("/chat/id").and_then(Value::as_i64) else {
                continue;
            };
            // Media posts carry their text as a caption.
            let Some(text) = post
                .get("text")
                .or_else(|| post.get("caption"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(posted_at) = post
                .get("date")
                .and_then(Value::as_i64)
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
            else {
                continue;
            };

            let newer = self
                .latest
                .get(&chat_id)
                .is_none_or(|current| posted_at >= current.posted_at);
            if newer {
                self.latest.insert(chat_id, Message::new(posted_at, text));
                ingested += 1;
            }
        }
        ingested
    }
}

#[async_trait]
impl ChannelClient for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        let me = self
            .call("getMe", serde_json::json!({}))
            .await
            .map_err(|e| match e {
                ChannelError::AuthFailed { .. } => e,
                other => ChannelError::StartupFailed {
                    name: "telegram".into(),
                    reason: other.to_string(),
                },
            })?;

        let username = me.get("username").and_then(Value::as_str).unwrap_or("unknown");
        info!(bot = %username, "Telegram client connected");
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn resolve_channel(&mut self, identifier: &str) -> Result<ChannelHandle, ChannelError> {
        if let Some(handle) = self.resolved.get(identifier) {
            return Ok(handle.clone());
        }

        let chat_id = match parse_channel_ref(identifier)? {
            ChannelRef::Id(id) => id,
            ChannelRef::Username(name) => {
                let chat = self
                    .call("getChat", serde_json::json!({ "chat_id": format!("@{name}") }))
                    .await
                    .map_err(|e| ChannelError::ResolveFailed {
                        identifier: identifier.to_string(),
                        reason: e.to_string(),
                    })?;
                chat.get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ChannelError::ResolveFailed {
                        identifier: identifier.to_string(),
                        reason: "getChat returned no chat id".into(),
                    })?
            }
        };

        let handle = ChannelHandle {
            identifier: identifier.to_string(),
            chat_id,
        };
        debug!(identifier = %identifier, chat_id, "Resolved Telegram channel");
        self.resolved.insert(identifier.to_string(), handle.clone());
        Ok(handle)
    }

    async fn fetch_latest(
        &mut self,
        channel: &ChannelHandle,
    ) -> Result<Option<Message>, ChannelError> {
        let body = serde_json::json!({
            "offset": self.offset,
            "timeout": 0,
            "allowed_updates": ["channel_post"]
        });
        let updates = self
            .call("getUpdates", body)
            .await
            .map_err(|e| match e {
                ChannelError::Http(reason) => ChannelError::FetchFailed {
                    identifier: channel.identifier.clone(),
                    reason,
                },
                other => other,
            })?;

        let ingested = self.ingest_updates(&updates);
        if ingested > 0 {
            debug!(count = ingested, offset = self.offset, "Ingested Telegram channel posts");
        }

        Ok(self.latest.get(&channel.chat_id).cloned())
    }

    async fn send(&mut self, channel: &ChannelHandle, text: &str) -> Result<(), ChannelError> {
        self.send_message(channel.chat_id, text).await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// A channel reference after stripping links and `@`.
#[derive(Debug, PartialEq, Eq)]
enum ChannelRef {
    Id(i64),
    Username(String),
}

/// Accepts `@name`, `name`, `t.me/name`, `https://t.me/name` and numeric ids.
fn parse_channel_ref(identifier: &str) -> Result<ChannelRef, ChannelError> {
    let trimmed = identifier.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let path = ["t.me/", "telegram.me/"]
        .iter()
        .find_map(|host| without_scheme.strip_prefix(host))
        .unwrap_or(without_scheme);
    let name = path.trim_start_matches('@').trim_end_matches('/');

    if let Ok(id) = name.parse::<i64>() {
        return Ok(ChannelRef::Id(id));
    }

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ChannelError::ResolveFailed {
            identifier: identifier.to_string(),
            reason: "expected a public channel username, t.me link or numeric chat id".into(),
        });
    }

    Ok(ChannelRef::Username(name.to_string()))
}

/// Map a Bot API envelope to its `result` or a typed error.
fn check_response(method: &str, data: Value) -> Result<Value, ChannelError> {
    if data.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(data.get("result").cloned().unwrap_or(Value::Null));
    }

    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("no description")
        .to_string();

    match data.get("error_code").and_then(Value::as_i64) {
        Some(401) => Err(ChannelError::AuthFailed {
            name: "telegram".into(),
            reason: description,
        }),
        Some(429) => Err(ChannelError::RateLimited {
            name: "telegram".into(),
            retry_after: data
                .pointer("/parameters/retry_after")
                .and_then(Value::as_u64)
                .map(Duration::from_secs),
        }),
        code => Err(ChannelError::Http(format!(
            "{method} failed ({}): {description}",
            code.map_or_else(|| "no code".to_string(), |c| c.to_string())
        ))),
    }
}

/// Split text into chunks of at most `max_len` bytes, preferring newline
/// then space boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
