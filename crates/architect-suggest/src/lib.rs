pub mod engine;
mod parse;
mod prompt;
pub mod session;

pub use engine::{AssistantTransport, LlmTransport, ReplyStream, TransportError};
pub use parse::{parse_suggestions, ParsedReply, StreamAccumulator};
pub use prompt::{outbound_message, response_schema, system_prompt, VARIATION_COUNT};
pub use session::{AssistantSession, Exchange, SendOutcome, SessionHandle, FAILURE_NOTICE};

use serde::{Deserialize, Serialize};

/// One assistant-proposed prompt variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub content: String,
    pub reasoning: String,
}

/// State of an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AssistantReply {
    /// Placeholder while the stream is open.
    Pending,
    Suggestions { suggestions: Vec<Suggestion> },
    /// Raw fallback text, or the failure notice.
    Text { text: String },
}

impl AssistantReply {
    pub fn is_pending(&self) -> bool {
        matches!(self, AssistantReply::Pending)
    }
}

/// One entry of the visible conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum ConversationTurn {
    User { text: String },
    Assistant { reply: AssistantReply },
}
