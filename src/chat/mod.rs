//! Conversation Controller
//!
//! A linear chat history with one query in flight at a time.
//!
//! ```text
//!   Empty ──begin_turn──▶ AwaitingResponse ──complete_turn──▶ Idle
//!     ▲                                                        │
//!     └────────────────────────── clear ───────────────────────┘
//! ```

pub mod session;

pub use session::SessionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::agents::{Report, ResearchMode, ResearchPipeline};
use crate::types::AppResult;

pub const WELCOME_MESSAGE: &str = "Thank you for using the drug discovery research agent. \
Ask about targets, compounds, clinical trials or literature and I will search the sources and write a short report.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Empty,
    AwaitingResponse,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyQuery,

    #[error("A response is still being prepared for this conversation")]
    Busy,
}

/// Strip quote characters and surrounding whitespace from user input.
pub fn sanitize_query(raw: &str) -> String {
    raw.replace(&['"', '\''][..], "").trim().to_string()
}

/// Ticket for the one turn in flight. Redeemed with
/// [`ConversationController::complete_turn`].
#[derive(Debug)]
pub struct PendingTurn {
    message: String,
    query: String,
    mode: ResearchMode,
    generation: u64,
}

impl PendingTurn {
    /// The user's message as typed.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The sanitized query handed to the pipeline.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> ResearchMode {
        self.mode
    }
}

#[derive(Debug)]
pub struct ConversationController {
    history: Vec<ChatMessage>,
    state: ConversationState,
    greeted: bool,
    /// Bumped by `clear`, so tickets issued before it are discarded.
    generation: u64,
}

impl Default for ConversationController {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationController {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            state: ConversationState::Empty,
            greeted: false,
            generation: 0,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_greeted(&self) -> bool {
        self.greeted
    }

    /// Append the welcome turn once per conversation. Returns whether it was added.
    pub fn ensure_greeting(&mut self) -> bool {
        if self.greeted {
            return false;
        }
        self.history.push(ChatMessage::assistant(WELCOME_MESSAGE, Vec::new()));
        self.greeted = true;
        if self.state == ConversationState::Empty {
            self.state = ConversationState::Idle;
        }
        true
    }

    pub fn begin_turn(&mut self, raw: &str, mode: ResearchMode) -> Result<PendingTurn, ChatError> {
        let query = sanitize_query(raw);
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }
        if self.state == ConversationState::AwaitingResponse {
            warn!("Rejected query while another is in flight");
            return Err(ChatError::Busy);
        }

        self.state = ConversationState::AwaitingResponse;
        info!(query = %query, mode = %mode, "Turn started");
        Ok(PendingTurn {
            message: raw.trim().to_string(),
            query,
            mode,
            generation: self.generation,
        })
    }

    /// Record the turn's outcome. A failed pipeline becomes an apology turn.
    /// Returns the assistant turn, or `None` when the ticket predates a `clear`.
    pub fn complete_turn(&mut self, turn: PendingTurn, result: AppResult<Report>) -> Option<&ChatMessage> {
        if turn.generation != self.generation {
            info!("Discarding response for a cleared conversation");
            return None;
        }

        let reply = match result {
            Ok(report) => ChatMessage::assistant(report.content, report.images),
            Err(e) => {
                warn!(error = %e, "Research turn failed");
                ChatMessage::assistant(
                    format!("Sorry, I could not complete the report for this question: {}", e),
                    Vec::new(),
                )
            }
        };

        self.history.push(ChatMessage::user(turn.message));
        self.history.push(reply);
        self.state = ConversationState::Idle;
        self.history.last()
    }

    /// Begin, run the pipeline, complete.
    pub async fn submit(
        &mut self,
        raw: &str,
        mode: ResearchMode,
        pipeline: &ResearchPipeline,
    ) -> Result<ChatMessage, ChatError> {
        let turn = self.begin_turn(raw, mode)?;
        let result = pipeline.run(turn.query(), turn.mode()).await;
        Ok(self
            .complete_turn(turn, result)
            .cloned()
            .unwrap_or_else(|| ChatMessage::assistant(String::new(), Vec::new())))
    }

    /// Discard history from any state; the welcome turn returns on next use.
    pub fn clear(&mut self) {
        self.history.clear();
        self.greeted = false;
        self.state = ConversationState::Empty;
        self.generation += 1;
        info!("Conversation cleared");
    }
}
