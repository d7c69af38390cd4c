use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::{ResearchMode, ResearchPipeline, SourceSummary};
use crate::chat::{ChatMessage, SessionStore};
use crate::config::{Config, SourceStatus};
use crate::search::{build_scholar, build_web_search, GoogleSearchAdapter, ScholarAdapter};
use crate::types::AppResult;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ResearchPipeline>,
    pub sessions: SessionStore,
    /// Standalone tools; `None` when the source is not configured.
    pub web: Option<Arc<GoogleSearchAdapter>>,
    pub scholar: Option<Arc<ScholarAdapter>>,
}

impl AppState {
    pub fn from_config(config: Config) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.search.http_timeout_secs);
        let pipeline = ResearchPipeline::from_config(&config)?;
        let web = build_web_search(&config.search, timeout)?.map(Arc::new);
        let scholar = build_scholar(&config.search).map(Arc::new);
        let sessions = SessionStore::with_idle_ttl(Duration::from_secs(config.server.session_idle_secs));

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            sessions,
            web,
            scholar,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub mode: ResearchMode,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    /// The assistant's reply, report or apology
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub mode: ResearchMode,
    /// Milliseconds
    pub response_time: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: ResearchMode,
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: ResearchMode,
    pub text: String,
    pub sources: Vec<SourceSummary>,
}

#[derive(Debug, Deserialize)]
pub struct NewsRequest {
    pub query: String,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorRequest {
    pub author: String,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CitationRequest {
    pub title: String,
}

/// Plain-text tool output.
#[derive(Debug, Serialize)]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceStatus>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub llm_configured: bool,
}
