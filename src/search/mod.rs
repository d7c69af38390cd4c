//! Search Module
//!
//! Every external data source sits behind the [`SearchAdapter`] trait:
//! - arXiv - preprints (Atom feed)
//! - PubMed - biomedical literature (NCBI E-utilities)
//! - ChEMBL - bioactive molecules
//! - ClinicalTrials.gov - registered clinical studies
//! - Google Scholar - bibliographic search with citation enrichment (SerpAPI)
//! - Google Search - general web search (Custom Search JSON API)
//!
//! Adapters return a tagged [`SearchOutcome`] internally and plain text at the
//! outer boundary, so a failing source never aborts a research turn.

pub mod arxiv;
pub mod chembl;
pub mod clinical_trials;
pub mod format;
pub mod google;
pub mod pubmed;
pub mod serpapi;
pub mod types;

pub use arxiv::ArxivAdapter;
pub use chembl::ChemblAdapter;
pub use clinical_trials::ClinicalTrialsAdapter;
pub use google::GoogleSearchAdapter;
pub use pubmed::PubMedAdapter;
pub use serpapi::{ScholarAdapter, ScholarBackend, SerpApiScholar};
pub use types::{ErrorKind, SearchError, SearchHits, SearchOutcome, SearchResult, SourceId};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use crate::config::{Config, SearchConfig};
use crate::types::{AppError, AppResult};

/// Result count used when a caller gives no hint.
pub const DEFAULT_RESULT_HINT: usize = 5;

/// Settings named when a credentialed source is unavailable.
pub const SCHOLAR_SETTING: &str = "SERPAPI_API_KEY";
pub const WEB_SEARCH_SETTING: &str = "GOOGLE_API_KEY and GOOGLE_CSE_ID";

const USER_AGENT: &str = concat!("drug-discovery-agent/", env!("CARGO_PKG_VERSION"));

/// Uniform "query in, formatted text out" contract over one external source.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Absolute ceiling on results returned, regardless of the caller's hint.
    fn max_results(&self) -> usize;

    /// Perform the native call. `limit` is already clamped and the query is
    /// already trimmed and non-empty.
    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError>;

    async fn search(&self, query: &str, hint: Option<usize>) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery);
        }

        let limit = clamp_limit(hint, self.max_results());
        debug!(source = %self.source(), limit, "Running search adapter");

        let mut hits = self.fetch(query, limit).await?;
        hits.results.truncate(limit);
        hits.limit = limit;

        if hits.results.is_empty() {
            return Err(SearchError::NoResults);
        }
        Ok(hits)
    }

    /// Never fails: errors come back as human-readable text.
    async fn search_text(&self, query: &str, hint: Option<usize>) -> String {
        let outcome = self.search(query, hint).await;
        if let Err(e) = &outcome {
            warn!(source = %self.source(), kind = ?e.kind(), error = %e, "Search adapter returned no results");
        }
        format::render_outcome(self.source(), &outcome)
    }
}

/// Clamp a caller hint to `[1, max]`, defaulting when absent.
pub fn clamp_limit(hint: Option<usize>, max: usize) -> usize {
    hint.unwrap_or(DEFAULT_RESULT_HINT).clamp(1, max.max(1))
}

/// Stand-in for a source that is disabled or missing credentials.
pub struct UnconfiguredAdapter {
    source: SourceId,
    setting: String,
}

impl UnconfiguredAdapter {
    pub fn new(source: SourceId, setting: impl Into<String>) -> Self {
        Self {
            source,
            setting: setting.into(),
        }
    }

    fn error(&self) -> SearchError {
        SearchError::NotConfigured {
            source_id: self.source,
            setting: self.setting.clone(),
        }
    }
}

#[async_trait]
impl SearchAdapter for UnconfiguredAdapter {
    fn source(&self) -> SourceId {
        self.source
    }

    fn max_results(&self) -> usize {
        0
    }

    async fn fetch(&self, _query: &str, _limit: usize) -> Result<SearchHits, SearchError> {
        Err(self.error())
    }

    async fn search(&self, _query: &str, _hint: Option<usize>) -> SearchOutcome {
        Err(self.error())
    }
}

/// Build every adapter named by the configuration, keyed by source.
///
/// Sources that are disabled, or whose credentials are absent, get an
/// [`UnconfiguredAdapter`] so they still occupy their slot in an aggregate.
pub fn build_adapters(config: &Config) -> AppResult<Vec<Arc<dyn SearchAdapter>>> {
    let search = &config.search;
    let timeout = Duration::from_secs(search.http_timeout_secs);

    SourceId::ALL
        .iter()
        .map(|&source| build_adapter(source, search, timeout))
        .collect()
}

fn build_adapter(
    source: SourceId,
    search: &SearchConfig,
    timeout: Duration,
) -> AppResult<Arc<dyn SearchAdapter>> {
    let adapter: Arc<dyn SearchAdapter> = match source {
        SourceId::Arxiv if search.arxiv.enabled => {
            Arc::new(ArxivAdapter::new(&search.arxiv, timeout)?)
        }
        SourceId::Pubmed if search.pubmed.enabled => {
            Arc::new(PubMedAdapter::new(&search.pubmed, timeout)?)
        }
        SourceId::Chembl if search.chembl.enabled => {
            Arc::new(ChemblAdapter::new(&search.chembl, timeout)?)
        }
        SourceId::ClinicalTrials if search.clinical_trials.enabled => {
            Arc::new(ClinicalTrialsAdapter::new(&search.clinical_trials, timeout)?)
        }
        SourceId::GoogleScholar => match build_scholar(search) {
            Some(adapter) => Arc::new(adapter),
            None => Arc::new(UnconfiguredAdapter::new(source, SCHOLAR_SETTING)),
        },
        SourceId::GoogleSearch => match build_web_search(search, timeout)? {
            Some(adapter) => Arc::new(adapter),
            None => Arc::new(UnconfiguredAdapter::new(source, WEB_SEARCH_SETTING)),
        },
        _ => Arc::new(UnconfiguredAdapter::new(
            source,
            format!("search.{}.enabled = true", source.key()),
        )),
    };
    Ok(adapter)
}

/// Scholar adapter, when enabled and a SerpAPI key is present.
pub fn build_scholar(search: &SearchConfig) -> Option<ScholarAdapter> {
    let key = search.scholar.api_key().filter(|_| search.scholar.enabled)?;
    Some(ScholarAdapter::new(
        SerpApiScholar::new(key, &search.language),
        search.scholar.max_results,
    ))
}

/// Web search adapter, when enabled and both credentials are present.
pub fn build_web_search(search: &SearchConfig, timeout: Duration) -> AppResult<Option<GoogleSearchAdapter>> {
    match search.web.credentials() {
        Some((key, cx)) if search.web.enabled => Ok(Some(GoogleSearchAdapter::new(
            key,
            cx,
            &search.web,
            &search.language,
            timeout,
        )?)),
        _ => Ok(None),
    }
}

/// One client per adapter, each carrying its own timeout.
pub(crate) fn http_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Send a request and map transport and status failures onto [`SearchError`].
pub(crate) async fn send(request: RequestBuilder) -> Result<reqwest::Response, SearchError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SearchError::RequestFailed(format!("request timed out: {}", e))
        } else {
            SearchError::RequestFailed(e.to_string())
        }
    })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SearchError::RateLimited(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::RequestFailed(format!(
            "HTTP {}: {}",
            status,
            format::truncate_chars(body.trim(), 200)
        )));
    }
    Ok(response)
}

pub(crate) async fn send_json(request: RequestBuilder) -> Result<serde_json::Value, SearchError> {
    send(request)
        .await?
        .json()
        .await
        .map_err(|e| SearchError::ParseError(e.to_string()))
}
