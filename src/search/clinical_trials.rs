//! ClinicalTrials.gov v2 study search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use super::types::{SearchError, SearchHits, SearchResult, SourceId};
use super::SearchAdapter;
use crate::config::SourceConfig;
use crate::types::AppResult;

pub const CLINICAL_TRIALS_API_BASE: &str = "https://clinicaltrials.gov/api/v2";
const STUDY_PAGE_BASE: &str = "https://clinicaltrials.gov/study";

pub struct ClinicalTrialsAdapter {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl ClinicalTrialsAdapter {
    pub fn new(config: &SourceConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: config
                .base_url(CLINICAL_TRIALS_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            max_results: config.max_results,
        })
    }
}

fn str_at<'a>(study: &'a Value, pointer: &str) -> Option<&'a str> {
    study.pointer(pointer).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn strings_at(study: &Value, pointer: &str) -> Vec<String> {
    study
        .pointer(pointer)
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// "PHASE2" -> "Phase 2", "EARLY_PHASE1" -> "Early Phase 1"
fn phase_label(phase: &str) -> String {
    match phase {
        "NA" => "N/A".to_string(),
        p => {
            let words: Vec<String> = p
                .split('_')
                .map(|w| {
                    let lower = w.to_lowercase();
                    let digits = lower.trim_start_matches(|c: char| c.is_alphabetic());
                    let letters = &lower[..lower.len() - digits.len()];
                    let mut word = String::new();
                    let mut chars = letters.chars();
                    if let Some(first) = chars.next() {
                        word.extend(first.to_uppercase());
                        word.push_str(chars.as_str());
                    }
                    if !digits.is_empty() {
                        word.push(' ');
                        word.push_str(digits);
                    }
                    word
                })
                .collect();
            words.join(" ")
        }
    }
}

fn parse_study(study: &Value) -> Option<SearchResult> {
    let nct_id = str_at(study, "/protocolSection/identificationModule/nctId")?;
    let mut result = SearchResult::new(SourceId::ClinicalTrials);

    result.title = str_at(study, "/protocolSection/identificationModule/briefTitle")
        .or_else(|| str_at(study, "/protocolSection/identificationModule/officialTitle"))
        .map(str::to_string);
    result.authors = str_at(study, "/protocolSection/sponsorCollaboratorsModule/leadSponsor/name")
        .map(str::to_string);
    result.year = str_at(study, "/protocolSection/statusModule/startDateStruct/date")
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok());

    let phases: Vec<String> = strings_at(study, "/protocolSection/designModule/phases")
        .iter()
        .map(|p| phase_label(p))
        .collect();
    let status = str_at(study, "/protocolSection/statusModule/overallStatus");
    result.venue = match (phases.is_empty(), status) {
        (false, Some(status)) => Some(format!("{} ({})", phases.join("/"), status)),
        (false, None) => Some(phases.join("/")),
        (true, Some(status)) => Some(status.to_string()),
        (true, None) => None,
    };

    let conditions = strings_at(study, "/protocolSection/conditionsModule/conditions");
    let summary = str_at(study, "/protocolSection/descriptionModule/briefSummary");
    result.snippet = match (conditions.is_empty(), summary) {
        (false, Some(summary)) => Some(format!("Conditions: {}. {}", conditions.join(", "), summary)),
        (false, None) => Some(format!("Conditions: {}", conditions.join(", "))),
        (true, summary) => summary.map(str::to_string),
    };

    result.url = Some(format!("{}/{}", STUDY_PAGE_BASE, nct_id));
    Some(result)
}

#[async_trait]
impl SearchAdapter for ClinicalTrialsAdapter {
    fn source(&self) -> SourceId {
        SourceId::ClinicalTrials
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
        info!(query = %query, limit, "Searching ClinicalTrials.gov");

        let request = self
            .client
            .get(format!("{}/studies", self.base_url))
            .query(&[("query.term", query), ("format", "json")])
            .query(&[("pageSize", limit)]);
        let json = super::send_json(request).await?;

        let studies = json
            .get("studies")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SearchError::ParseError("response has no studies".to_string()))?;

        let results: Vec<SearchResult> = studies.iter().filter_map(parse_study).collect();
        info!(count = results.len(), "ClinicalTrials.gov search completed");
        Ok(SearchHits::new(results, limit))
    }
}
