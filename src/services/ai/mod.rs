pub mod groq;
pub mod ollama;
pub mod understanding;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use understanding::{LlmUnderstanding, TextUnderstanding, UnderstandingRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// System prompt followed by the conversation, in the chat-completion shape
/// both providers accept.
pub(crate) fn chat_messages(system_prompt: &str, messages: &[Message]) -> Vec<serde_json::Value> {
    std::iter::once(serde_json::json!({ "role": "system", "content": system_prompt }))
        .chain(
            messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content })),
        )
        .collect()
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String>;
}
