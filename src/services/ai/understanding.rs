use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::BackendError;
use crate::models::{ConversationMessage, Field, QuestionTopic, Understanding, Workflow};
use crate::services::ai::{LlmProvider, Message};

/// Everything the understanding backend gets to see for one turn.
pub struct UnderstandingRequest<'a> {
    pub workflow: Option<&'a Workflow>,
    pub history: &'a [ConversationMessage],
    pub text: &'a str,
    /// Fields a proposal may target; anything else is discarded.
    pub schema: &'a [Field],
    pub today: NaiveDate,
}

impl UnderstandingRequest<'_> {
    pub fn context(&self) -> String {
        let mut lines = vec![format!("Today is {}.", self.today.format("%A %Y-%m-%d"))];
        match self.workflow {
            Some(wf) => {
                lines.push(format!(
                    "Active workflow: {} (stage: {}).",
                    wf.kind().as_str(),
                    wf.stage().as_str()
                ));
                lines.push(format!("Collected so far:\n{}", wf.draft().summary()));
            }
            None => lines.push("No workflow is active.".to_string()),
        }
        let fields: Vec<_> = self.schema.iter().map(|f| f.as_str()).collect();
        lines.push(format!(
            "Fields you may propose: {}.",
            if fields.is_empty() {
                "none".to_string()
            } else {
                fields.join(", ")
            }
        ));
        lines.join("\n")
    }
}

/// Best-effort natural language understanding. Output is never trusted: it
/// only proposes an intent and raw field values.
#[async_trait]
pub trait TextUnderstanding: Send + Sync {
    async fn understand(
        &self,
        request: &UnderstandingRequest<'_>,
    ) -> Result<Understanding, BackendError>;
}

const SYSTEM_PROMPT: &str = r#"You are the language understanding engine of a hotel booking assistant that chats with guests over Instagram direct messages. Analyze the guest's latest message in the context of the conversation.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "intent": "book|reschedule|question|cancel|confirm|decline|unknown",
  "topic": "amenities|check_in_out|location|cancellation_policy|pet_policy|parking or null",
  "field_updates": [{"field": "check_in", "value": "2025-06-10", "correction": false}],
  "confidence": 0.9
}

Intent rules:
- "book": guest wants a new room reservation
- "reschedule": guest wants to change the dates of an existing reservation
- "question": guest asks about the hotel (set "topic")
- "cancel": guest wants to stop or abandon the current request
- "confirm": guest says yes/correct/looks good to a summary
- "decline": guest says no/that's wrong to a summary
- "unknown": anything else

Field rules:
- Only propose fields listed as allowed in the context; never invent values.
- Dates are YYYY-MM-DD; resolve relative dates against today's date.
- room_type is one of: standard, deluxe, suite, presidential (or the guest's own words if it matches none).
- adults and children are whole numbers; guest_name, guest_email, guest_phone as written; booking_ref as written.
- Set "correction": true only when the guest explicitly changes something they said before.
- "confidence" is how sure you are about the intent, from 0 to 1.
"#;

/// Understanding backed by a chat-completion model.
pub struct LlmUnderstanding {
    llm: Box<dyn LlmProvider>,
}

impl LlmUnderstanding {
    pub fn new(llm: Box<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TextUnderstanding for LlmUnderstanding {
    async fn understand(
        &self,
        request: &UnderstandingRequest<'_>,
    ) -> Result<Understanding, BackendError> {
        let mut messages: Vec<Message> = request
            .history
            .iter()
            .map(|m| Message {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        messages.push(Message {
            role: "user".to_string(),
            content: request.text.to_string(),
        });

        let topics: Vec<_> = QuestionTopic::ALL.iter().map(|t| t.as_str()).collect();
        let system = format!(
            "{SYSTEM_PROMPT}\nQuestion topics: {}.\n\nContext:\n{}",
            topics.join(", "),
            request.context()
        );

        let response = self
            .llm
            .chat(&system, &messages)
            .await
            .map_err(|e| BackendError::unavailable("understanding", format!("{e:#}")))?;

        Ok(parse_understanding(&response))
    }
}

pub fn parse_understanding(response: &str) -> Understanding {
    if let Ok(parsed) = serde_json::from_str::<Understanding>(response) {
        return parsed;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(parsed) = serde_json::from_str::<Understanding>(cleaned) {
        return parsed;
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(parsed) = serde_json::from_str::<Understanding>(&cleaned[start..=end]) {
                return parsed;
            }
        }
    }

    tracing::warn!("failed to parse understanding response as JSON, treating as unknown");
    Understanding::default()
}
