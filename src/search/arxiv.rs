//! arXiv adapter
//!
//! Queries the public Atom API; no credentials needed.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::info;

use super::types::{SearchError, SearchHits, SearchResult, SourceId};
use super::SearchAdapter;
use crate::config::SourceConfig;
use crate::types::AppResult;

pub const ARXIV_API_BASE: &str = "https://export.arxiv.org/api/query";

pub struct ArxivAdapter {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl ArxivAdapter {
    pub fn new(config: &SourceConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: config.base_url(ARXIV_API_BASE).to_string(),
            max_results: config.max_results,
        })
    }

    /// `all:` every term, ANDed together.
    fn build_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|t| format!("all:{}", t))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[async_trait]
impl SearchAdapter for ArxivAdapter {
    fn source(&self) -> SourceId {
        SourceId::Arxiv
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
        info!(query = %query, limit, "Searching arXiv");

        let search_query = Self::build_query(query);
        let request = self
            .client
            .get(&self.base_url)
            .header(ACCEPT, "application/atom+xml, application/xml;q=0.9")
            .query(&[("search_query", search_query.as_str())])
            .query(&[("start", 0), ("max_results", limit)])
            .query(&[("sortBy", "relevance"), ("sortOrder", "descending")]);

        let body = super::send(request)
            .await?
            .text()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        let results = parse_atom_feed(&body)?;
        info!(count = results.len(), "arXiv search completed");
        Ok(SearchHits::new(results, limit))
    }
}

#[derive(Clone, Copy)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn primary_category(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"term")
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Parse an Atom feed into search results.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<SearchResult>, SearchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut results = Vec::new();
    let mut current: Option<SearchResult> = None;
    let mut authors: Vec<String> = Vec::new();
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    current = Some(SearchResult::new(SourceId::Arxiv));
                    authors.clear();
                }
                b"id" if current.is_some() => field = Some(Field::Id),
                b"title" if current.is_some() => field = Some(Field::Title),
                b"summary" if current.is_some() => field = Some(Field::Summary),
                b"published" if current.is_some() => field = Some(Field::Published),
                b"name" if current.is_some() => field = Some(Field::AuthorName),
                b"primary_category" => {
                    if let Some(entry) = current.as_mut() {
                        entry.venue = primary_category(&e).map(|c| format!("arXiv {}", c));
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"primary_category" {
                    if let Some(entry) = current.as_mut() {
                        entry.venue = primary_category(&e).map(|c| format!("arXiv {}", c));
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    let text = t
                        .unescape()
                        .map_err(|e| SearchError::ParseError(e.to_string()))?;
                    let text = collapse_whitespace(&text);
                    match f {
                        Field::Id => entry.url = Some(text),
                        Field::Title => entry.title = Some(text),
                        Field::Summary => entry.snippet = Some(text),
                        Field::Published => entry.year = text.get(..4).and_then(|y| y.parse().ok()),
                        Field::AuthorName => authors.push(text),
                    }
                }
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.local_name().as_ref() == b"entry" {
                    if let Some(mut entry) = current.take() {
                        if !authors.is_empty() {
                            entry.authors = Some(authors.join(", "));
                        }
                        results.push(entry);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SearchError::ParseError(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(results)
}
