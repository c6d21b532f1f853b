//! Shared fixtures: an in-process fake Telegram Bot API and a stub LLM.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use news_relay::error::LlmError;
use news_relay::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use news_relay::pipeline::{PromptTemplate, PromptTemplates};

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Token the fake Bot API accepts.
pub const BOT_TOKEN: &str = "TEST-TOKEN";

// ── Fake Bot API ────────────────────────────────────────────────────

#[derive(Default)]
pub struct BotApiState {
    next_update_id: i64,
    updates: Vec<Value>,
    /// Every successful `sendMessage` body.
    pub sent: Vec<Value>,
    /// Public usernames (`@name`) to chat ids.
    pub chats: HashMap<String, i64>,
    /// Reject sends that carry `parse_mode`.
    pub reject_markdown: bool,
    /// Reject every send whose text starts with this prefix.
    pub reject_prefix: Option<String>,
    /// Number of `getChat` calls served.
    pub get_chat_calls: usize,
    /// Methods in call order.
    pub calls: Vec<String>,
}

#[derive(Clone)]
pub struct FakeBotApi {
    pub base_url: String,
    pub state: Arc<Mutex<BotApiState>>,
}

impl FakeBotApi {
    /// Start the fake server on a random port.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(BotApiState::default()));
        let app = Router::new()
            .route("/{token}/{method}", post(handle_method))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            state,
        }
    }

    pub fn add_channel(&self, username: &str, chat_id: i64) {
        self.state
            .lock()
            .unwrap()
            .chats
            .insert(username.to_string(), chat_id);
    }

    /// Queue a `channel_post` update.
    pub fn post(&self, chat_id: i64, date: i64, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_update_id += 1;
        let update = json!({
            "update_id": state.next_update_id,
            "channel_post": {
                "message_id": state.next_update_id,
                "chat": {"id": chat_id, "type": "channel"},
                "date": date,
                "text": text
            }
        });
        state.updates.push(update);
    }

    /// Texts sent to `chat_id`, in order.
    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|body| body["chat_id"].as_i64() == Some(chat_id))
            .filter_map(|body| body["text"].as_str().map(String::from))
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|m| *m == method)
            .count()
    }
}

async fn handle_method(
    State(state): State<Arc<Mutex<BotApiState>>>,
    Path((token, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if token != format!("bot{BOT_TOKEN}") {
        return Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"}));
    }

    let mut state = state.lock().unwrap();
    state.calls.push(method.clone());

    let reply = match method.as_str() {
        "getMe" => json!({"ok": true, "result": {"id": 1, "is_bot": true, "username": "relay_test_bot"}}),
        "getChat" => {
            state.get_chat_calls += 1;
            let key = body["chat_id"].as_str().unwrap_or_default().to_string();
            match state.chats.get(&key) {
                Some(id) => json!({"ok": true, "result": {"id": id, "type": "channel"}}),
                None => json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}),
            }
        }
        "getUpdates" => {
            let offset = body["offset"].as_i64().unwrap_or(0);
            // Confirmed updates are forgotten, as the real API does.
            state
                .updates
                .retain(|u| u["update_id"].as_i64().unwrap_or(0) >= offset);
            json!({"ok": true, "result": state.updates.clone()})
        }
        "sendMessage" => {
            let text = body["text"].as_str().unwrap_or_default();
            if state.reject_markdown && body.get("parse_mode").is_some() {
                json!({"ok": false, "error_code": 400, "description": "Bad Request: can't parse entities"})
            } else if state
                .reject_prefix
                .as_deref()
                .is_some_and(|prefix| text.starts_with(prefix))
            {
                json!({"ok": false, "error_code": 400, "description": "Bad Request: chat write forbidden"})
            } else {
                state.sent.push(body.clone());
                json!({"ok": true, "result": {"message_id": state.sent.len()}})
            }
        }
        _ => json!({"ok": false, "error_code": 404, "description": "Not Found"}),
    };
    Json(reply)
}

// ── Stub LLM ────────────────────────────────────────────────────────

/// Templates whose rendered prompts the stub can tell apart.
pub fn test_templates() -> PromptTemplates {
    PromptTemplates {
        classify: PromptTemplate::new("classify", "CLASSIFY for {audience_name}"),
        rewrite: PromptTemplate::new("rewrite", "REWRITE for {audience_name}"),
    }
}

/// Stub LLM provider for integration tests (no real API calls).
///
/// Classification answers with `classify_reply` (`None` fails the call);
/// rewrite echoes the prompt as `"For <audience>\n<text>"`.
pub struct StubLlm {
    pub classify_reply: Mutex<Option<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn new(classify_reply: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            classify_reply: Mutex::new(classify_reply.map(String::from)),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn classify_calls(&self) -> usize {
        self.prompts()
            .iter()
            .filter(|p| p.starts_with("CLASSIFY"))
            .count()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.messages[0].content.clone();
        self.prompts.lock().unwrap().push(prompt.clone());

        let reply = if prompt.starts_with("CLASSIFY") {
            self.classify_reply.lock().unwrap().clone()
        } else {
            Some(prompt.replacen("REWRITE for ", "For ", 1))
        };

        reply
            .map(|content| CompletionResponse { content })
            .ok_or_else(|| LlmError::RequestFailed {
                provider: "stub".into(),
                reason: "simulated outage".into(),
            })
    }
}

/// Poll `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
