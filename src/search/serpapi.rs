//! Google Scholar via SerpAPI
//!
//! Search goes through two SerpAPI engines:
//! - `google_scholar`: the listing (title, summary line, snippet, cited-by count)
//! - `google_scholar_cite`: one call per listed paper, whose MLA citation
//!   fills in the venue and year the summary line often truncates
//!
//! A failed detail call keeps the listing record and marks it degraded.
//! Author profiles and citing-paper lookups use the same backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use tracing::{debug, info, warn};

use super::types::{SearchError, SearchHits, SearchResult, SourceId};
use super::{clamp_limit, format, SearchAdapter};

/// SerpAPI caps Scholar listings at 20 per page.
const LISTING_PAGE_MAX: usize = 20;
const AUTHOR_PUBLICATIONS_MAX: usize = 10;
const CITING_PAPERS_MAX: usize = 5;
/// Detail calls in flight at once during enrichment.
const DETAIL_CONCURRENCY: usize = 4;

/// Raw access to SerpAPI engines.
#[async_trait]
pub trait ScholarBackend: Send + Sync {
    /// Run one engine query and return its JSON body.
    async fn query(&self, engine: &str, params: HashMap<String, String>) -> Result<Value, SearchError>;
}

/// [`ScholarBackend`] over the SerpAPI HTTP service.
pub struct SerpApiScholar {
    api_key: String,
    language: String,
}

impl SerpApiScholar {
    pub fn new(api_key: &str, language: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl ScholarBackend for SerpApiScholar {
    async fn query(&self, engine: &str, mut params: HashMap<String, String>) -> Result<Value, SearchError> {
        params.insert("engine".to_string(), engine.to_string());
        params.insert("hl".to_string(), self.language.clone());

        let search = SerpApiSearch::new(engine.to_string(), params, self.api_key.clone());
        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;
        debug!(engine, "Raw SerpAPI response received");

        match results.get("error").and_then(|v| v.as_str()) {
            // Zero matches are reported as an error string; callers see an empty listing.
            Some(message) if message.contains("hasn't returned any results") => Ok(results),
            Some(message) if message.contains("run out of searches") => {
                Err(SearchError::RateLimited(message.to_string()))
            }
            Some(message) => Err(SearchError::RequestFailed(message.to_string())),
            None => Ok(results),
        }
    }
}

/// An author's profile and top publications.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorProfile {
    pub name: String,
    pub affiliation: Option<String>,
    pub cited_by: Option<u64>,
    pub h_index: Option<u64>,
    pub publications: Vec<SearchResult>,
}

/// A paper's record plus a few of the papers citing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationReport {
    pub paper: SearchResult,
    pub citing: Vec<SearchResult>,
}

pub struct ScholarAdapter {
    backend: Arc<dyn ScholarBackend>,
    max_results: usize,
}

/// A listing row and the id its detail call needs.
struct Listed {
    result: SearchResult,
    result_id: Option<String>,
    cites_id: Option<String>,
}

impl ScholarAdapter {
    pub fn new(backend: impl ScholarBackend + 'static, max_results: usize) -> Self {
        Self {
            backend: Arc::new(backend),
            max_results,
        }
    }

    async fn listing(&self, params: HashMap<String, String>) -> Result<Vec<Listed>, SearchError> {
        let json = self.backend.query("google_scholar", params).await?;
        let organic = match json.get("organic_results") {
            Some(v) => v
                .as_array()
                .ok_or_else(|| SearchError::ParseError("Expected array of results".to_string()))?,
            None => return Ok(Vec::new()),
        };
        Ok(organic.iter().map(parse_organic).collect())
    }

    /// Fill venue and year from the paper's MLA citation.
    async fn enrich(&self, listed: Listed) -> SearchResult {
        let mut result = listed.result;
        let Some(result_id) = listed.result_id else {
            return result;
        };

        let params = HashMap::from([("q".to_string(), result_id.clone())]);
        let detail = self
            .backend
            .query("google_scholar_cite", params)
            .await
            .and_then(|json| {
                mla_citation(&json).ok_or_else(|| {
                    SearchError::DetailUnavailable("no MLA citation in response".to_string())
                })
            });

        match detail {
            Ok(citation) => {
                let parsed = parse_mla(&citation);
                if parsed.venue.is_some() {
                    result.venue = parsed.venue;
                }
                if parsed.year.is_some() {
                    result.year = parsed.year;
                }
                if result.authors.is_none() {
                    result.authors = parsed.authors;
                }
            }
            Err(e) => {
                warn!(result_id = %result_id, error = %e, "Scholar detail lookup failed, keeping listing record");
                result.detail_degraded = true;
            }
        }
        result
    }

    async fn enrich_all(&self, listed: Vec<Listed>) -> Vec<SearchResult> {
        stream::iter(listed.into_iter().map(|l| self.enrich(l)))
            .buffered(DETAIL_CONCURRENCY)
            .collect()
            .await
    }

    /// First author profile matching `name`, with up to `hint` (max 10) publications.
    pub async fn author(&self, name: &str, hint: Option<usize>) -> Result<AuthorProfile, SearchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SearchError::InvalidQuery);
        }
        let limit = clamp_limit(hint, AUTHOR_PUBLICATIONS_MAX);
        info!(author = %name, limit, "Searching Google Scholar author");

        let profiles = self
            .backend
            .query(
                "google_scholar_profiles",
                HashMap::from([("mauthors".to_string(), name.to_string())]),
            )
            .await?;
        let author_id = profiles
            .pointer("/profiles/0/author_id")
            .and_then(|v| v.as_str())
            .ok_or(SearchError::NoResults)?;

        let json = self
            .backend
            .query(
                "google_scholar_author",
                HashMap::from([
                    ("author_id".to_string(), author_id.to_string()),
                    ("num".to_string(), limit.to_string()),
                ]),
            )
            .await?;

        let author = json
            .get("author")
            .ok_or_else(|| SearchError::ParseError("author response has no author".to_string()))?;
        let publications = json
            .get("articles")
            .and_then(|v| v.as_array())
            .map(|articles| articles.iter().take(limit).map(parse_article).collect())
            .unwrap_or_default();

        Ok(AuthorProfile {
            name: text(author, "name").unwrap_or_else(|| name.to_string()),
            affiliation: text(author, "affiliations"),
            cited_by: cited_by_table(&json, "citations"),
            h_index: cited_by_table(&json, "h_index"),
            publications,
        })
    }

    pub async fn search_author(&self, name: &str, hint: Option<usize>) -> String {
        match self.author(name, hint).await {
            Ok(profile) => render_author(&profile),
            Err(SearchError::NoResults) => format!("Author '{}' was not found.", name.trim()),
            Err(e) => {
                warn!(error = %e, "Google Scholar author search failed");
                format!("Google Scholar author search: {}", e)
            }
        }
    }

    /// The best match for `title` and up to five papers citing it.
    pub async fn citations(&self, title: &str) -> Result<CitationReport, SearchError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SearchError::InvalidQuery);
        }
        info!(title = %title, "Searching citation info");

        let mut listed = self
            .listing(HashMap::from([
                ("q".to_string(), title.to_string()),
                ("num".to_string(), "1".to_string()),
            ]))
            .await?;
        if listed.is_empty() {
            return Err(SearchError::NoResults);
        }
        let first = listed.remove(0);
        let cites_id = first.cites_id.clone();
        let paper = self.enrich(first).await;

        let citing = match cites_id {
            Some(cites) => {
                let params = HashMap::from([
                    ("cites".to_string(), cites),
                    ("num".to_string(), CITING_PAPERS_MAX.to_string()),
                ]);
                match self.listing(params).await {
                    Ok(rows) => rows.into_iter().take(CITING_PAPERS_MAX).map(|l| l.result).collect(),
                    Err(e) => {
                        warn!(error = %e, "Failed to fetch citing papers");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        Ok(CitationReport { paper, citing })
    }

    pub async fn search_citations(&self, title: &str) -> String {
        match self.citations(title).await {
            Ok(report) => render_citations(&report),
            Err(SearchError::NoResults) => format!("Paper '{}' was not found.", title.trim()),
            Err(e) => {
                warn!(error = %e, "Google Scholar citation search failed");
                format!("Google Scholar citation search: {}", e)
            }
        }
    }
}

#[async_trait]
impl SearchAdapter for ScholarAdapter {
    fn source(&self) -> SourceId {
        SourceId::GoogleScholar
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
        info!(query = %query, limit, "Searching Google Scholar via SerpAPI");

        let params = HashMap::from([
            ("q".to_string(), query.to_string()),
            ("num".to_string(), limit.min(LISTING_PAGE_MAX).to_string()),
        ]);
        let mut listed = self.listing(params).await?;
        listed.truncate(limit);

        let results = self.enrich_all(listed).await;
        let hits = SearchHits::new(results, limit);
        info!(count = hits.results.len(), degraded = hits.degraded(), "Google Scholar search completed");
        Ok(hits)
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_year(s: &str) -> bool {
    s.len() == 4
        && s.chars().all(|c| c.is_ascii_digit())
        && s.parse::<i32>().map(|y| (1900..=2100).contains(&y)).unwrap_or(false)
}

/// Parse a Scholar summary line, usually "Authors - Venue, Year - host".
fn parse_summary(summary: &str) -> (Option<String>, Option<String>, Option<i32>) {
    let parts: Vec<&str> = summary.split(" - ").map(str::trim).collect();
    let authors = parts.first().filter(|s| !s.is_empty()).map(|s| s.to_string());

    let year = summary
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| is_year(part))
        .and_then(|y| y.parse().ok());

    let venue = parts.get(1).and_then(|segment| {
        let venue = match segment.rsplit_once(", ") {
            Some((venue, tail)) if is_year(tail) => venue,
            _ => segment,
        };
        Some(venue.trim().to_string()).filter(|v| !v.is_empty() && !is_year(v))
    });

    (authors, venue, year)
}

fn parse_organic(row: &Value) -> Listed {
    let mut result = SearchResult::new(SourceId::GoogleScholar);
    result.title = text(row, "title");
    result.snippet = text(row, "snippet");
    result.url = text(row, "link");

    if let Some(summary) = row.pointer("/publication_info/summary").and_then(|v| v.as_str()) {
        let (authors, venue, year) = parse_summary(summary);
        result.authors = authors;
        result.venue = venue;
        result.year = year;
    }

    result.citations = row
        .pointer("/inline_links/cited_by/total")
        .and_then(|v| v.as_u64());

    Listed {
        result,
        result_id: text(row, "result_id"),
        cites_id: row
            .pointer("/inline_links/cited_by/cites_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

fn parse_article(article: &Value) -> SearchResult {
    let mut result = SearchResult::new(SourceId::GoogleScholar);
    result.title = text(article, "title");
    result.authors = text(article, "authors");
    result.venue = text(article, "publication");
    result.url = text(article, "link");
    result.year = text(article, "year").and_then(|y| y.parse().ok());
    result.citations = article.pointer("/cited_by/value").and_then(|v| v.as_u64());
    result
}

/// `cited_by.table` is a list of single-key objects such as
/// `{"h_index": {"all": 42, "since_2019": 30}}`.
fn cited_by_table(json: &Value, key: &str) -> Option<u64> {
    json.pointer("/cited_by/table")?
        .as_array()?
        .iter()
        .find_map(|row| row.get(key)?.get("all")?.as_u64())
}

fn mla_citation(json: &Value) -> Option<String> {
    json.get("citations")?
        .as_array()?
        .iter()
        .find(|c| c.get("title").and_then(|t| t.as_str()) == Some("MLA"))
        .and_then(|c| text(c, "snippet"))
}

#[derive(Debug, Default, PartialEq)]
struct MlaFields {
    authors: Option<String>,
    venue: Option<String>,
    year: Option<i32>,
}

/// Split an MLA citation: `Authors. "Title." Venue 12.3 (2020): 1-10.`
fn parse_mla(citation: &str) -> MlaFields {
    let mut fields = MlaFields::default();
    let Some((head, rest)) = citation.split_once('"') else {
        return fields;
    };
    let Some((_title, tail)) = rest.split_once('"') else {
        return fields;
    };

    fields.authors = Some(head.trim().trim_end_matches('.').trim().to_string()).filter(|a| !a.is_empty());

    let venue: Vec<&str> = tail
        .split_whitespace()
        .take_while(|word| !word.starts_with(|c: char| c.is_ascii_digit() || c == '('))
        .collect();
    fields.venue = Some(venue.join(" ").trim_end_matches(&['.', ','][..]).to_string()).filter(|v| !v.is_empty());

    fields.year = tail
        .match_indices('(')
        .filter_map(|(i, _)| tail.get(i + 1..i + 5))
        .find(|y| is_year(y))
        .and_then(|y| y.parse().ok());
    fields
}

fn or_missing<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| format::MISSING.to_string())
}

fn render_author(profile: &AuthorProfile) -> String {
    let mut lines = vec![
        format!("Author: {}", profile.name),
        format!("Affiliation: {}", or_missing(profile.affiliation.as_deref())),
        format!("Total citations: {}", or_missing(profile.cited_by)),
        format!("h-index: {}", or_missing(profile.h_index)),
        String::new(),
        "Publications:".to_string(),
    ];
    for (i, publication) in profile.publications.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({}) - citations: {}",
            i + 1,
            or_missing(publication.title.as_deref()),
            or_missing(publication.year),
            publication.citations.unwrap_or(0)
        ));
    }
    lines.join("\n")
}

fn render_citations(report: &CitationReport) -> String {
    let paper = &report.paper;
    let mut lines = vec![
        format!("Title: {}", or_missing(paper.title.as_deref())),
        format!("Authors: {}", or_missing(paper.authors.as_deref())),
        format!("Year: {}", or_missing(paper.year)),
        format!("Venue: {}", or_missing(paper.venue.as_deref())),
        format!("Total citations: {}", paper.citations.unwrap_or(0)),
    ];
    if let Some(url) = &paper.url {
        lines.push(format!("URL: {}", url));
    }
    if !report.citing.is_empty() {
        lines.push(String::new());
        lines.push("Recent citing papers:".to_string());
        for (i, citing) in report.citing.iter().enumerate() {
            lines.push(format!(
                "{}. {} ({})",
                i + 1,
                or_missing(citing.title.as_deref()),
                or_missing(citing.year)
            ));
        }
    }
    lines.join("\n")
}
