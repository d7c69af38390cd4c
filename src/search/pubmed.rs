//! PubMed adapter over NCBI E-utilities.
//!
//! Two calls per search: `esearch` for PMIDs, then one batched `esummary`
//! for the records. If the summary call fails the PMIDs are still returned
//! as degraded records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use super::types::{SearchError, SearchHits, SearchResult, SourceId};
use super::SearchAdapter;
use crate::config::SourceConfig;
use crate::types::AppResult;

pub const EUTILS_API_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const PUBMED_WEB: &str = "https://pubmed.ncbi.nlm.nih.gov";

pub struct PubMedAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
}

impl PubMedAdapter {
    pub fn new(config: &SourceConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: config.base_url(EUTILS_API_BASE).trim_end_matches('/').to_string(),
            api_key: config.api_key().map(str::to_string),
            max_results: config.max_results,
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("api_key", key.as_str())]),
            None => request,
        }
    }

    async fn search_ids(&self, query: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        let request = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&[("db", "pubmed"), ("term", query), ("retmode", "json"), ("sort", "relevance")])
            .query(&[("retmax", limit)]);
        let json = super::send_json(self.with_key(request)).await?;

        let ids = json
            .pointer("/esearchresult/idlist")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SearchError::ParseError("esearch response has no idlist".to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }

    async fn summaries(&self, ids: &[String]) -> Result<Value, SearchError> {
        let request = self
            .client
            .get(format!("{}/esummary.fcgi", self.base_url))
            .query(&[("db", "pubmed"), ("retmode", "json")])
            .query(&[("id", ids.join(",").as_str())]);
        let json = super::send_json(self.with_key(request)).await?;

        json.get("result")
            .cloned()
            .ok_or_else(|| SearchError::DetailUnavailable("esummary response has no result".to_string()))
    }
}

fn article_url(pmid: &str) -> String {
    format!("{}/{}/", PUBMED_WEB, pmid)
}

/// Build a result from one `esummary` record.
fn parse_summary(pmid: &str, record: &Value) -> SearchResult {
    let mut result = SearchResult::new(SourceId::Pubmed);
    result.url = Some(article_url(pmid));

    result.title = record
        .get("title")
        .and_then(|v| v.as_str())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let authors: Vec<&str> = record
        .get("authors")
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(|a| a.get("name").and_then(|n| n.as_str())).collect())
        .unwrap_or_default();
    if !authors.is_empty() {
        result.authors = Some(authors.join(", "));
    }

    result.year = record
        .get("pubdate")
        .and_then(|v| v.as_str())
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok());

    result.venue = ["fulljournalname", "source"]
        .iter()
        .filter_map(|k| record.get(*k).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string);

    // esummary carries no abstract; the DOI is the most useful short text.
    result.snippet = record
        .get("elocationid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    result
}

fn degraded(pmid: &str) -> SearchResult {
    let mut result = SearchResult::new(SourceId::Pubmed);
    result.title = Some(format!("PMID {}", pmid));
    result.url = Some(article_url(pmid));
    result.detail_degraded = true;
    result
}

#[async_trait]
impl SearchAdapter for PubMedAdapter {
    fn source(&self) -> SourceId {
        SourceId::Pubmed
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
        info!(query = %query, limit, "Searching PubMed");

        let ids = self.search_ids(query, limit).await?;
        if ids.is_empty() {
            return Ok(SearchHits::new(Vec::new(), limit));
        }

        let results = match self.summaries(&ids).await {
            Ok(summaries) => ids
                .iter()
                .map(|pmid| match summaries.get(pmid) {
                    Some(record) if record.get("error").is_none() => parse_summary(pmid, record),
                    _ => degraded(pmid),
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "PubMed summary lookup failed, returning PMIDs only");
                ids.iter().map(|pmid| degraded(pmid)).collect()
            }
        };

        Ok(SearchHits::new(results, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const ESEARCH: &str = r#"{"esearchresult":{"count":"2","idlist":["111","222"]}}"#;
    const ESUMMARY: &str = r#"{"result":{
        "uids":["111","222"],
        "111":{"uid":"111","title":"Sotorasib for KRAS G12C NSCLC.","pubdate":"2021 Jun 24",
               "fulljournalname":"The New England journal of medicine","source":"N Engl J Med",
               "authors":[{"name":"Skoulidis F"},{"name":"Li BT"}],"elocationid":"doi: 10.1056/NEJMoa2103695"},
        "222":{"uid":"222","error":"cannot get document summary"}
    }}"#;

    fn adapter(server: &mockito::Server, api_key: Option<&str>) -> PubMedAdapter {
        let config = SourceConfig {
            base_url: Some(server.url()),
            api_key: api_key.map(str::to_string),
            ..SourceConfig::default()
        };
        PubMedAdapter::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_search_then_summary() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("term".into(), "KRAS G12C".into()),
                Matcher::UrlEncoded("retmax".into(), "3".into()),
                Matcher::UrlEncoded("api_key".into(), "ncbi".into()),
            ]))
            .with_status(200)
            .with_body(ESEARCH)
            .create_async()
            .await;
        let summary = server
            .mock("GET", "/esummary.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "111,222".into()))
            .with_status(200)
            .with_body(ESUMMARY)
            .create_async()
            .await;

        let hits = adapter(&server, Some("ncbi")).search("KRAS G12C", Some(3)).await.unwrap();
        search.assert_async().await;
        summary.assert_async().await;

        assert_eq!(hits.results.len(), 2);
        let first = &hits.results[0];
        assert_eq!(first.title.as_deref(), Some("Sotorasib for KRAS G12C NSCLC."));
        assert_eq!(first.authors.as_deref(), Some("Skoulidis F, Li BT"));
        assert_eq!(first.year, Some(2021));
        assert_eq!(first.venue.as_deref(), Some("The New England journal of medicine"));
        assert_eq!(first.url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/111/"));
        assert!(!first.detail_degraded);

        // A per-record error keeps the PMID instead of dropping it.
        assert!(hits.results[1].detail_degraded);
        assert_eq!(hits.degraded(), 1);
    }

    #[tokio::test]
    async fn test_summary_failure_degrades_all() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ESEARCH)
            .create_async()
            .await;
        server
            .mock("GET", "/esummary.fcgi")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let hits = adapter(&server, None).search("aspirin", Some(5)).await.unwrap();
        assert_eq!(hits.results.len(), 2);
        assert_eq!(hits.degraded(), 2);
        assert_eq!(hits.results[0].title.as_deref(), Some("PMID 111"));
    }

    #[tokio::test]
    async fn test_empty_idlist_is_no_results() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"esearchresult":{"count":"0","idlist":[]}}"#)
            .create_async()
            .await;

        let outcome = adapter(&server, None).search("zzzz", None).await;
        assert_eq!(outcome, Err(SearchError::NoResults));
    }
}
