//! Search Aggregator
//!
//! Fans one query out to a fixed, ordered list of adapters and joins every
//! answer before returning. Blocks are ordered by configuration, never by
//! completion time, so the aggregate text is reproducible run to run.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::search::format::render_outcome;
use crate::search::{ErrorKind, SearchAdapter, SearchError, SearchOutcome, SourceId};

/// One adapter's answer within an aggregate.
#[derive(Debug, Clone)]
pub struct SourceBlock {
    pub source: SourceId,
    pub outcome: SearchOutcome,
}

impl SourceBlock {
    pub fn text(&self) -> String {
        render_outcome(self.source, &self.outcome)
    }
}

/// A citable record surfaced by a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub source: SourceId,
    pub title: String,
    pub url: String,
}

/// Per-source summary of an aggregate, for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: SourceId,
    pub name: String,
    pub results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone)]
pub struct AggregatedResults {
    pub query: String,
    pub per_source_limit: usize,
    pub blocks: Vec<SourceBlock>,
}

impl AggregatedResults {
    /// The labeled text handed to the report synthesizer.
    pub fn render(&self) -> String {
        let mut output = format!(
            "=== Search results for \"{}\" (up to {} per source) ===\n",
            self.query, self.per_source_limit
        );
        for block in &self.blocks {
            output.push_str(&format!("\n### [{}]\n{}\n", block.source.label(), block.text().trim_end()));
        }
        output
    }

    pub fn references(&self) -> Vec<Reference> {
        self.blocks
            .iter()
            .filter_map(|b| b.outcome.as_ref().ok())
            .flat_map(|hits| hits.results.iter())
            .filter_map(|r| {
                Some(Reference {
                    source: r.source,
                    title: r.title.clone()?,
                    url: r.url.clone()?,
                })
            })
            .collect()
    }

    /// Image URLs in block order, without duplicates.
    pub fn image_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let candidates = self
            .blocks
            .iter()
            .filter_map(|b| b.outcome.as_ref().ok())
            .flat_map(|hits| hits.results.iter())
            .filter_map(|r| r.image_url.as_ref());
        for url in candidates {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }

    pub fn summaries(&self) -> Vec<SourceSummary> {
        self.blocks
            .iter()
            .map(|b| SourceSummary {
                source: b.source,
                name: b.source.label().to_string(),
                results: b.outcome.as_ref().map(|h| h.results.len()).unwrap_or(0),
                error: b.outcome.as_ref().err().map(SearchError::kind),
            })
            .collect()
    }
}

pub struct SearchAggregator {
    adapters: Vec<Arc<dyn SearchAdapter>>,
}

impl SearchAggregator {
    pub fn new(adapters: Vec<Arc<dyn SearchAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    /// The per-source count actually served: at least one, and no more than
    /// the largest cap among the adapters.
    pub fn effective_limit(&self, per_source: usize) -> usize {
        match self.adapters.iter().map(|a| a.max_results()).max() {
            Some(cap) if cap > 0 => per_source.clamp(1, cap),
            _ => per_source.max(1),
        }
    }

    /// Run every adapter concurrently, one task each, and join them all.
    pub async fn search(&self, query: &str, per_source: usize) -> AggregatedResults {
        let per_source = self.effective_limit(per_source);
        info!(query = %query, per_source, adapters = self.adapters.len(), "Starting aggregate search");

        let handles = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let query = query.to_string();
            tokio::spawn(async move { adapter.search(&query, Some(per_source)).await })
        });
        let joined = join_all(handles).await;

        let blocks: Vec<SourceBlock> = self
            .adapters
            .iter()
            .zip(joined)
            .map(|(adapter, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(SearchError::RequestFailed(format!("search task failed: {}", e)))
                });
                if let Err(e) = &outcome {
                    warn!(source = %adapter.source(), kind = ?e.kind(), error = %e, "Source returned no results");
                }
                SourceBlock {
                    source: adapter.source(),
                    outcome,
                }
            })
            .collect();

        let found: usize = blocks
            .iter()
            .filter_map(|b| b.outcome.as_ref().ok())
            .map(|h| h.results.len())
            .sum();
        info!(results = found, "Aggregate search completed");

        AggregatedResults {
            query: query.to_string(),
            per_source_limit: per_source,
            blocks,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::search::{SearchHits, SearchResult, UnconfiguredAdapter};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Returns `count` canned results after `delay`.
    pub(crate) struct FakeAdapter {
        pub source: SourceId,
        pub count: usize,
        pub delay: Duration,
        pub fail: bool,
    }

    impl FakeAdapter {
        pub(crate) fn ok(source: SourceId, count: usize) -> Arc<dyn SearchAdapter> {
            Arc::new(Self {
                source,
                count,
                delay: Duration::ZERO,
                fail: false,
            })
        }

        pub(crate) fn failing(source: SourceId) -> Arc<dyn SearchAdapter> {
            Arc::new(Self {
                source,
                count: 0,
                delay: Duration::ZERO,
                fail: true,
            })
        }
    }

    #[async_trait]
    impl SearchAdapter for FakeAdapter {
        fn source(&self) -> SourceId {
            self.source
        }

        fn max_results(&self) -> usize {
            20
        }

        async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(SearchError::RequestFailed("HTTP 503: unavailable".into()));
            }
            let results = (0..self.count.min(limit))
                .map(|i| {
                    let mut r = SearchResult::new(self.source);
                    r.title = Some(format!("{} paper {} on {}", self.source.label(), i + 1, query));
                    r.url = Some(format!("https://example.org/{}/{}", self.source.key(), i + 1));
                    if self.source == SourceId::Chembl {
                        r.image_url = Some(format!("https://example.org/image/{}.svg", i + 1));
                    }
                    r
                })
                .collect();
            Ok(SearchHits::new(results, limit))
        }
    }

    struct Panicking;

    #[async_trait]
    impl SearchAdapter for Panicking {
        fn source(&self) -> SourceId {
            SourceId::Pubmed
        }

        fn max_results(&self) -> usize {
            5
        }

        async fn fetch(&self, _query: &str, _limit: usize) -> Result<SearchHits, SearchError> {
            panic!("adapter bug")
        }
    }

    #[tokio::test]
    async fn test_blocks_follow_configuration_order() {
        // The first adapter finishes last.
        let slow: Arc<dyn SearchAdapter> = Arc::new(FakeAdapter {
            source: SourceId::Arxiv,
            count: 2,
            delay: Duration::from_millis(50),
            fail: false,
        });
        let aggregator = SearchAggregator::new(vec![
            slow,
            FakeAdapter::ok(SourceId::Pubmed, 2),
            FakeAdapter::failing(SourceId::Chembl),
            FakeAdapter::ok(SourceId::ClinicalTrials, 1),
        ]);

        let results = aggregator.search("KRAS G12C", 3).await;
        let order: Vec<_> = results.blocks.iter().map(|b| b.source).collect();
        assert_eq!(
            order,
            vec![SourceId::Arxiv, SourceId::Pubmed, SourceId::Chembl, SourceId::ClinicalTrials]
        );

        let text = results.render();
        assert!(text.starts_with("=== Search results for \"KRAS G12C\" (up to 3 per source) ==="));
        let arxiv = text.find("### [arXiv]").unwrap();
        let pubmed = text.find("### [PubMed]").unwrap();
        let chembl = text.find("### [ChEMBL]").unwrap();
        let trials = text.find("### [ClinicalTrials.gov]").unwrap();
        assert!(arxiv < pubmed && pubmed < chembl && chembl < trials);

        // The failing source shows up as its error text.
        assert!(text.contains("ChEMBL search: Search request failed: HTTP 503"));
        assert_eq!(results.references().len(), 5);
    }

    #[tokio::test]
    async fn test_oversized_limit_is_clamped_to_largest_cap() {
        let aggregator = SearchAggregator::new(vec![
            FakeAdapter::ok(SourceId::Arxiv, 50),
            Arc::new(Panicking),
        ]);
        assert_eq!(aggregator.effective_limit(500), 20);
        assert_eq!(aggregator.effective_limit(0), 1);

        let aggregator = SearchAggregator::new(vec![
            FakeAdapter::ok(SourceId::Arxiv, 50),
            FakeAdapter::ok(SourceId::Pubmed, 50),
        ]);
        let results = aggregator.search("KRAS", 500).await;
        assert_eq!(results.per_source_limit, 20);
        assert!(results.render().starts_with("=== Search results for \"KRAS\" (up to 20 per source) ==="));
        assert!(results.summaries().iter().all(|s| s.results == 20));
    }

    #[tokio::test]
    async fn test_panicking_adapter_does_not_sink_aggregate() {
        let aggregator = SearchAggregator::new(vec![
            FakeAdapter::ok(SourceId::Arxiv, 1),
            Arc::new(Panicking),
        ]);

        let results = aggregator.search("aspirin", 2).await;
        assert_eq!(results.blocks.len(), 2);
        assert!(results.blocks[0].outcome.is_ok());
        match &results.blocks[1].outcome {
            Err(SearchError::RequestFailed(message)) => assert!(message.contains("search task failed")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_disabled_aggregate_is_not_empty() {
        let adapters: Vec<Arc<dyn SearchAdapter>> = SourceId::ALL
            .iter()
            .map(|&s| Arc::new(UnconfiguredAdapter::new(s, "a key")) as Arc<dyn SearchAdapter>)
            .collect();
        let aggregator = SearchAggregator::new(adapters);

        let results = aggregator.search("KRAS", 3).await;
        assert_eq!(results.blocks.len(), 6);
        let text = results.render();
        assert_eq!(text.matches("is not configured").count(), 6);
        assert!(results.references().is_empty());
        assert!(results
            .summaries()
            .iter()
            .all(|s| s.error == Some(ErrorKind::DependencyUnavailable)));
    }

    #[tokio::test]
    async fn test_image_urls_are_collected_in_order() {
        let aggregator = SearchAggregator::new(vec![
            FakeAdapter::ok(SourceId::Arxiv, 2),
            FakeAdapter::ok(SourceId::Chembl, 2),
        ]);
        let results = aggregator.search("sotorasib", 5).await;
        assert_eq!(
            results.image_urls(),
            vec![
                "https://example.org/image/1.svg".to_string(),
                "https://example.org/image/2.svg".to_string()
            ]
        );
    }
}
