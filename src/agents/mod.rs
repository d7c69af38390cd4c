//! Agent System
//!
//! The research pipeline behind every chat turn:
//!
//! - **Search Aggregator**: fans the query out to the mode's sources concurrently
//! - **Report Synthesizer**: turns the aggregate into a short report
//!
//! ## Pipeline Overview
//!
//! ```text
//! User Query
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Search    │  → One task per source, joined in configuration order
//! │ Aggregator  │
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Report    │  → Summary, key findings, references
//! │ Synthesizer │
//! └─────────────┘
//!      │
//!      ▼
//!    Report (+ references, images)
//! ```

pub mod aggregator;
pub mod report;

pub use aggregator::{AggregatedResults, Reference, SearchAggregator, SourceBlock, SourceSummary};
pub use report::{Report, ReportSynthesizer, ResearchMode};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, ModeProfile, ModesConfig};
use crate::llm::LLM;
use crate::search::{build_adapters, SearchAdapter, SourceId};
use crate::types::{AppError, AppResult};

pub struct ResearchPipeline {
    llm: Option<LLM>,
    adapters: Vec<Arc<dyn SearchAdapter>>,
    modes: ModesConfig,
}

impl ResearchPipeline {
    pub fn new(llm: Option<LLM>, adapters: Vec<Arc<dyn SearchAdapter>>, modes: ModesConfig) -> Self {
        Self { llm, adapters, modes }
    }

    /// Search works without a model; only `run` needs one.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let llm = match LLM::from_config(&config.llm) {
            Ok(llm) => Some(llm),
            Err(e) => {
                warn!(error = %e, "Language model unavailable, reports are disabled");
                None
            }
        };
        Ok(Self::new(llm, build_adapters(config)?, config.modes.clone()))
    }

    pub fn llm_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub fn profile(&self, mode: ResearchMode) -> &ModeProfile {
        match mode {
            ResearchMode::Fast => &self.modes.fast,
            ResearchMode::Thorough => &self.modes.thorough,
        }
    }

    pub fn adapter(&self, source: SourceId) -> Option<&Arc<dyn SearchAdapter>> {
        self.adapters.iter().find(|a| a.source() == source)
    }

    /// Aggregator over the mode's sources, in the profile's order.
    pub fn aggregator(&self, mode: ResearchMode) -> SearchAggregator {
        let adapters = self
            .profile(mode)
            .sources
            .iter()
            .filter_map(|&source| self.adapter(source).cloned())
            .collect();
        SearchAggregator::new(adapters)
    }

    /// Aggregate search only. `per_source` overrides the profile's count.
    pub async fn search(&self, query: &str, mode: ResearchMode, per_source: Option<usize>) -> AggregatedResults {
        let per_source = per_source.unwrap_or(self.profile(mode).results_per_source);
        self.aggregator(mode).search(query.trim(), per_source).await
    }

    /// Search, then synthesize the report.
    pub async fn run(&self, query: &str, mode: ResearchMode) -> AppResult<Report> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidRequest("Query is empty".to_string()));
        }
        let llm = self.llm.as_ref().ok_or_else(|| {
            AppError::Config("No language model is configured; set an API key for the LLM provider".to_string())
        })?;

        info!(query = %query, mode = %mode, "Starting research pipeline");
        let profile = self.profile(mode);
        let results = self.search(query, mode, None).await;

        let response = ReportSynthesizer::synthesize(llm, query, &results.render(), mode, profile).await?;

        info!(
            references = results.references().len(),
            images = results.image_urls().len(),
            "Research pipeline completed"
        );
        Ok(Report {
            query: query.to_string(),
            mode,
            content: response.content,
            sources: results.blocks.iter().map(|b| b.source).collect(),
            references: results.references(),
            images: results.image_urls(),
            usage: response.usage,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::aggregator::tests::FakeAdapter;
    use super::report::tests::{fake_llm, FakeModel};
    use super::*;
    use crate::search::UnconfiguredAdapter;

    pub(crate) fn all_sources() -> Vec<Arc<dyn SearchAdapter>> {
        SourceId::ALL.iter().map(|&s| FakeAdapter::ok(s, 20)).collect()
    }

    pub(crate) fn pipeline(model: Arc<FakeModel>) -> ResearchPipeline {
        ResearchPipeline::new(Some(fake_llm(model)), all_sources(), ModesConfig::default())
    }

    #[tokio::test]
    async fn test_fast_mode_report() {
        let model = FakeModel::new(false);
        let pipeline = pipeline(model.clone());

        let report = pipeline.run("What inhibits KRAS G12C?", ResearchMode::Fast).await.unwrap();
        assert!(report.content.contains("## Summary"));
        assert_eq!(
            report.sources,
            vec![SourceId::Arxiv, SourceId::Pubmed, SourceId::Chembl, SourceId::ClinicalTrials]
        );
        // Three results from each of the four fast sources.
        assert_eq!(report.references.len(), 12);
        assert_eq!(report.images.len(), 3);

        let requests = model.requests.lock().unwrap();
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("(up to 3 per source)"));
        assert!(!prompt.contains("### [Google Scholar]"));
        assert_eq!(requests[0].max_tokens, Some(2000));
    }

    #[tokio::test]
    async fn test_thorough_mode_uses_every_source() {
        let model = FakeModel::new(false);
        let pipeline = pipeline(model.clone());

        let report = pipeline.run("KRAS G12C resistance", ResearchMode::Thorough).await.unwrap();
        assert_eq!(report.sources, SourceId::ALL.to_vec());
        assert_eq!(report.references.len(), 60);

        let requests = model.requests.lock().unwrap();
        assert!(requests[0].messages[0].content.contains("### [Google Search]"));
        assert_eq!(requests[0].max_tokens, Some(4000));
    }

    #[tokio::test]
    async fn test_error_only_aggregate_still_synthesized() {
        let model = FakeModel::new(false);
        let adapters: Vec<Arc<dyn SearchAdapter>> = SourceId::ALL
            .iter()
            .map(|&s| Arc::new(UnconfiguredAdapter::new(s, "a key")) as Arc<dyn SearchAdapter>)
            .collect();
        let pipeline = ResearchPipeline::new(Some(fake_llm(model.clone())), adapters, ModesConfig::default());

        let report = pipeline.run("KRAS", ResearchMode::Fast).await.unwrap();
        assert!(report.references.is_empty());
        assert!(report.images.is_empty());
        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].content.matches("is not configured").count(), 4);
    }

    #[tokio::test]
    async fn test_one_configured_source_among_disabled_ones() {
        let model = FakeModel::new(false);
        let adapters: Vec<Arc<dyn SearchAdapter>> = vec![
            FakeAdapter::ok(SourceId::Arxiv, 2),
            Arc::new(UnconfiguredAdapter::new(SourceId::Pubmed, "NCBI_EMAIL")),
            Arc::new(UnconfiguredAdapter::new(SourceId::Chembl, "search.chembl.enabled")),
            Arc::new(UnconfiguredAdapter::new(SourceId::ClinicalTrials, "search.clinical_trials.enabled")),
        ];
        let pipeline = ResearchPipeline::new(Some(fake_llm(model.clone())), adapters, ModesConfig::default());

        let report = pipeline.run("KRAS G12C", ResearchMode::Fast).await.unwrap();
        assert!(report.content.contains("## Summary"));
        assert_eq!(report.references.len(), 2);
        assert!(report.references.iter().all(|r| r.source == SourceId::Arxiv));

        let requests = model.requests.lock().unwrap();
        let prompt = &requests[0].messages[0].content;
        assert_eq!(prompt.matches("\n### [").count(), 4);
        assert_eq!(prompt.matches("is not configured").count(), 3);
        assert!(prompt.contains("arXiv paper 1 on KRAS G12C"));
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let pipeline = pipeline(FakeModel::new(true));
        assert!(pipeline.run("KRAS", ResearchMode::Fast).await.is_err());
    }

    #[tokio::test]
    async fn test_search_without_model() {
        let pipeline = ResearchPipeline::new(None, all_sources(), ModesConfig::default());
        assert!(!pipeline.llm_configured());

        let results = pipeline.search("aspirin", ResearchMode::Fast, Some(1)).await;
        assert_eq!(results.blocks.len(), 4);
        assert_eq!(results.references().len(), 4);

        assert!(matches!(
            pipeline.run("aspirin", ResearchMode::Fast).await,
            Err(AppError::Config(_))
        ));
    }
}
