//! Google Custom Search JSON API adapter (web and news).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use super::types::{SearchError, SearchHits, SearchOutcome, SearchResult, SourceId};
use super::{clamp_limit, format, SearchAdapter};
use crate::config::WebSearchConfig;
use crate::types::AppResult;

/// Terms appended to a query to bias results toward recent coverage.
const NEWS_SUFFIX: &str = "news OR latest";

pub struct GoogleSearchAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    cse_id: String,
    language: String,
    max_results: usize,
}

impl GoogleSearchAdapter {
    pub fn new(
        api_key: &str,
        cse_id: &str,
        config: &WebSearchConfig,
        language: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: config.base_url.clone(),
            api_key: api_key.to_string(),
            cse_id: cse_id.to_string(),
            language: language.to_string(),
            max_results: config.max_results,
        })
    }

    async fn query_api(
        &self,
        query: &str,
        limit: usize,
        by_date: bool,
    ) -> Result<SearchHits, SearchError> {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
            ])
            .query(&[("num", limit)]);
        if !self.language.is_empty() {
            request = request.query(&[("lr", format!("lang_{}", self.language))]);
        }
        if by_date {
            request = request.query(&[("sort", "date")]);
        }

        let json = super::send_json(request).await?;
        // No `items` key means zero matches, not a malformed response.
        let results: Vec<SearchResult> = json
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().map(parse_item).collect())
            .unwrap_or_default();

        info!(count = results.len(), by_date, "Google search completed");
        Ok(SearchHits::new(results, limit))
    }

    /// News-flavoured search, newest first.
    pub async fn news(&self, query: &str, hint: Option<usize>) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery);
        }
        let limit = clamp_limit(hint, self.max_results);
        let news_query = format!("{} {}", query, NEWS_SUFFIX);
        info!(query = %news_query, limit, "Searching Google news");

        let hits = self.query_api(&news_query, limit, true).await?;
        if hits.results.is_empty() {
            return Err(SearchError::NoResults);
        }
        Ok(hits)
    }

    pub async fn search_news(&self, query: &str, hint: Option<usize>) -> String {
        let outcome = self.news(query, hint).await;
        if let Err(e) = &outcome {
            warn!(kind = ?e.kind(), error = %e, "Google news search returned no results");
        }
        format::render_outcome(SourceId::GoogleSearch, &outcome)
    }
}

fn parse_item(item: &Value) -> SearchResult {
    let text = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut result = SearchResult::new(SourceId::GoogleSearch);
    result.title = text("title");
    result.url = text("link");
    result.snippet = text("snippet");
    result.venue = text("displayLink");
    result
}

#[async_trait]
impl SearchAdapter for GoogleSearchAdapter {
    fn source(&self) -> SourceId {
        SourceId::GoogleSearch
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
        info!(query = %query, limit, "Searching Google");
        self.query_api(query, limit, false).await
    }
}
