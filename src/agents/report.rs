//! Report Synthesizer
//!
//! Turns a query and its aggregate search text into a short report using a
//! fixed prompt template. The model's text is returned verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::agents::aggregator::Reference;
use crate::config::ModeProfile;
use crate::llm::LLM;
use crate::search::SourceId;
use crate::types::{AppResult, LLMMessage, LLMRequest, LLMResponse, TokenUsage};

pub const SYSTEM_PROMPT: &str =
    "You are an expert at writing fast, concise scientific reports for drug discovery research.";

/// How much searching and writing a turn does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    #[default]
    Fast,
    Thorough,
}

impl ResearchMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "fast" => Some(ResearchMode::Fast),
            "thorough" | "deep" => Some(ResearchMode::Thorough),
            _ => None,
        }
    }
}

impl fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchMode::Fast => write!(f, "fast"),
            ResearchMode::Thorough => write!(f, "thorough"),
        }
    }
}

/// Result of one research turn: the report text plus the per-turn context
/// (references and images) gathered while producing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub query: String,
    pub mode: ResearchMode,
    pub content: String,
    pub sources: Vec<SourceId>,
    pub references: Vec<Reference>,
    pub images: Vec<String>,
    pub usage: TokenUsage,
}

pub struct ReportSynthesizer;

impl ReportSynthesizer {
    pub fn create_prompt(query: &str, search_results: &str, mode: ResearchMode) -> String {
        let length = match mode {
            ResearchMode::Fast => "a short, one-page report",
            ResearchMode::Thorough => "a detailed report",
        };

        format!(
            r#"Using the search results below, write {length}.

Question: {query}

Search results:
{search_results}

Structure the report as follows:

## Summary
3-5 sentences answering the question.

## Key Findings
3-5 bullet points. Cite the source label of each finding in brackets, for example [PubMed].

## References
3-5 entries taken from the search results, with URLs where available.

Keep it concise. Sources that reported an error or no results contribute nothing; never invent findings for them."#
        )
    }

    /// Submit the prompt. Model failures propagate to the caller.
    pub async fn synthesize(
        llm: &LLM,
        query: &str,
        search_results: &str,
        mode: ResearchMode,
        profile: &ModeProfile,
    ) -> AppResult<LLMResponse> {
        info!(
            query = %query,
            mode = %mode,
            context_len = search_results.len(),
            max_tokens = profile.max_tokens,
            "Generating report"
        );

        let request = LLMRequest {
            model: llm.model().to_string(),
            messages: vec![LLMMessage::user(Self::create_prompt(query, search_results, mode))],
            max_tokens: Some(profile.max_tokens),
            temperature: Some(profile.temperature),
            system_instruction: Some(SYSTEM_PROMPT.to_string()),
        };

        match llm.create_chat_completion(&request).await {
            Ok(response) => {
                info!(
                    response_len = response.content.len(),
                    total_tokens = response.usage.total_tokens,
                    "Report generated"
                );
                Ok(response)
            }
            Err(e) => {
                error!(error = %e, "Report generation failed");
                Err(e)
            }
        }
    }
}
