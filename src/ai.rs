use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::env;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::AiError;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A single completion request. The schema is the OpenAI chat shape, which
/// every backend we care about (DeepSeek, Groq, OpenAI) speaks.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 256,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// AI backend boundary. Failures here are always soft: the decision engine
/// degrades to its heuristic chain, never the other way around.
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AiError>;
}

// --- OpenAI-chat-compatible HTTP backend ---

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct ChatBackend {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

impl ChatBackend {
    pub fn new(api_key: String, base_url: &str, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Build a backend from POUNCE_AI_API_KEY / POUNCE_AI_BASE_URL /
    /// POUNCE_AI_MODEL. Without a key the engine runs heuristic-only.
    pub fn from_env() -> Option<Self> {
        let api_key = match env::var("POUNCE_AI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!("POUNCE_AI_API_KEY not set; running in heuristic-only mode");
                return None;
            }
        };
        let base_url =
            env::var("POUNCE_AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("POUNCE_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, &base_url, model))
    }
}

#[async_trait]
impl AiBackend for ChatBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AiError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.timeout_secs)
                } else {
                    AiError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        let answer = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(AiError::Empty);
        }
        Ok(answer)
    }
}

// --- Sliding-window rate limiter ---

/// Call throttle shared by every AI caller in the process. Tracks call
/// instants in a window; when the window is full, `acquire` sleeps until the
/// oldest call ages out. The lock is never held across the sleep, so
/// concurrent tabs queue fairly and a cancelled caller leaves no residue.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// 50 calls per 60 seconds.
    pub fn default_window() -> Self {
        Self::new(50, Duration::from_secs(60))
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    calls.pop_front();
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                // Sleep until the oldest call exits the window, then re-check.
                self.window - now.duration_since(*calls.front().unwrap())
            };
            debug!("rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}
