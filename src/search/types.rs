use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The external sources a research turn can consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Arxiv,
    Pubmed,
    Chembl,
    ClinicalTrials,
    GoogleScholar,
    GoogleSearch,
}

impl SourceId {
    /// Default configuration order.
    pub const ALL: [SourceId; 6] = [
        SourceId::Arxiv,
        SourceId::Pubmed,
        SourceId::Chembl,
        SourceId::ClinicalTrials,
        SourceId::GoogleScholar,
        SourceId::GoogleSearch,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SourceId::Arxiv => "arxiv",
            SourceId::Pubmed => "pubmed",
            SourceId::Chembl => "chembl",
            SourceId::ClinicalTrials => "clinical_trials",
            SourceId::GoogleScholar => "google_scholar",
            SourceId::GoogleSearch => "google_search",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceId::Arxiv => "arXiv",
            SourceId::Pubmed => "PubMed",
            SourceId::Chembl => "ChEMBL",
            SourceId::ClinicalTrials => "ClinicalTrials.gov",
            SourceId::GoogleScholar => "Google Scholar",
            SourceId::GoogleSearch => "Google Search",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SourceId::Arxiv => "Scientific preprints",
            SourceId::Pubmed => "Biomedical literature",
            SourceId::Chembl => "Bioactive molecules",
            SourceId::ClinicalTrials => "Clinical trials registry",
            SourceId::GoogleScholar => "Academic papers with citation counts",
            SourceId::GoogleSearch => "Web search (100 free queries per day)",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One record produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub source: SourceId,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    /// Journal, conference, registry phase, or similar.
    pub venue: Option<String>,
    pub citations: Option<u64>,
    /// Abstract or snippet.
    pub snippet: Option<String>,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Set when per-result detail enrichment failed and the coarse record was kept.
    #[serde(default)]
    pub detail_degraded: bool,
}

impl SearchResult {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            title: None,
            authors: None,
            year: None,
            venue: None,
            citations: None,
            snippet: None,
            url: None,
            image_url: None,
            detail_degraded: false,
        }
    }
}

/// Successful adapter outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    pub results: Vec<SearchResult>,
    /// The clamped result ceiling this call ran with.
    pub limit: usize,
}

impl SearchHits {
    pub fn new(results: Vec<SearchResult>, limit: usize) -> Self {
        Self { results, limit }
    }

    pub fn degraded(&self) -> usize {
        self.results.iter().filter(|r| r.detail_degraded).count()
    }
}

/// Coarse classification of why an adapter produced no results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    DependencyUnavailable,
    ExternalCallFailure,
    RateLimited,
    ZeroResults,
    MalformedDetail,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("Search query is empty.")]
    InvalidQuery,

    #[error("{} is not configured. Set {setting} to enable it.", .source_id.label())]
    NotConfigured { source_id: SourceId, setting: String },

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited by the search provider: {0}")]
    RateLimited(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),

    #[error("No results found.")]
    NoResults,

    #[error("Detail lookup failed: {0}")]
    DetailUnavailable(String),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::InvalidQuery => ErrorKind::InvalidQuery,
            SearchError::NotConfigured { .. } => ErrorKind::DependencyUnavailable,
            SearchError::RequestFailed(_) | SearchError::ParseError(_) => {
                ErrorKind::ExternalCallFailure
            }
            SearchError::RateLimited(_) => ErrorKind::RateLimited,
            SearchError::NoResults => ErrorKind::ZeroResults,
            SearchError::DetailUnavailable(_) => ErrorKind::MalformedDetail,
        }
    }
}

/// Tagged adapter result, rendered to text only at the outer boundary.
pub type SearchOutcome = Result<SearchHits, SearchError>;
