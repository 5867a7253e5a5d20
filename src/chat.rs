//! Chat-model collaborator
//!
//! General chat streams its answer sentence by sentence so speech output can
//! begin before the model finishes (speak-as-you-stream). The HTTP client
//! speaks the OpenAI-compatible chat-completions contract with `stream:
//! true` and re-chunks deltas into sentences.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::breaker::{is_rate_limit, CircuitBreaker};
use crate::{Error, Result};

/// Capacity of the sentence channel handed to the router
const SENTENCE_CHANNEL_CAPACITY: usize = 16;

/// One prior conversation turn
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatTurn {
    /// "user" or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

/// Bounded in-memory conversation history
#[derive(Debug)]
pub struct ChatHistory {
    turns: VecDeque<ChatTurn>,
    max_turns: usize,
}

impl ChatHistory {
    /// Create a history holding at most `max_turns` messages
    #[must_use]
    pub const fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest past the cap
    pub fn push(&mut self, role: &str, content: &str) {
        self.turns.push_back(ChatTurn {
            role: role.to_string(),
            content: content.to_string(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// The retained turns, oldest first
    #[must_use]
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Number of retained turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Chat-model collaborator contract
///
/// The receiver yields completed sentences as they stream in; it closes when
/// the response is done or the stream fails.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streamed chat response
    async fn stream_chat(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<mpsc::Receiver<String>>;
}

/// Accumulates streamed text deltas and emits whole sentences
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    /// Create an empty splitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta, returning any sentences completed by it
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        for c in delta.chars() {
            self.buffer.push(c);
            if matches!(c, '.' | '!' | '?' | '\n') {
                let sentence = self.buffer.trim().to_string();
                self.buffer.clear();
                if sentence.chars().any(char::is_alphanumeric) {
                    sentences.push(sentence);
                }
            }
        }
        sentences
    }

    /// Drain any trailing text that never saw a terminator
    pub fn flush(&mut self) -> Option<String> {
        let rest = self.buffer.trim().to_string();
        self.buffer.clear();
        rest.chars().any(char::is_alphanumeric).then_some(rest)
    }
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    stream: bool,
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible streaming chat client
pub struct HttpChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    breaker: Arc<CircuitBreaker>,
}

impl HttpChatModel {
    /// Create a client for the given endpoint and model
    #[must_use]
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        system_prompt: String,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            system_prompt,
            breaker,
        }
    }

    fn build_messages(&self, prompt: &str, history: &[ChatTurn]) -> Vec<serde_json::Value> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.system_prompt,
        })];
        for turn in history {
            messages.push(serde_json::json!({
                "role": turn.role,
                "content": turn.content,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": prompt,
        }));
        messages
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn stream_chat(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<mpsc::Receiver<String>> {
        if self.breaker.is_open() {
            return Err(Error::Chat("chat model in cooldown".to_string()));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: self.build_messages(prompt, history),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_rate_limit(Some(status), &body) {
                self.breaker.trip();
            }
            return Err(Error::Chat(format!("chat API error {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(SENTENCE_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut splitter = SentenceSplitter::new();
            let mut stream = response.bytes_stream();
            let mut pending = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(error = %e, "chat stream interrupted");
                        break;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));

                // SSE framing: one `data: {...}` payload per line
                while let Some(newline) = pending.find('\n') {
                    let line = pending[..newline].trim().to_string();
                    pending.drain(..=newline);

                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload.is_empty() || payload == "[DONE]" {
                        continue;
                    }

                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) else {
                        tracing::trace!(payload, "unparseable stream chunk");
                        continue;
                    };

                    let Some(content) = parsed
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.as_deref())
                    else {
                        continue;
                    };

                    for sentence in splitter.push(content) {
                        if tx.send(sentence).await.is_err() {
                            return;
                        }
                    }
                }
            }

            if let Some(rest) = splitter.flush() {
                let _ = tx.send(rest).await;
            }
        });

        Ok(rx)
    }
}
