//! ChEMBL molecule search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use super::types::{SearchError, SearchHits, SearchResult, SourceId};
use super::SearchAdapter;
use crate::config::SourceConfig;
use crate::types::AppResult;

pub const CHEMBL_API_BASE: &str = "https://www.ebi.ac.uk/chembl/api/data";
const REPORT_CARD_BASE: &str = "https://www.ebi.ac.uk/chembl/compound_report_card";

pub struct ChemblAdapter {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl ChemblAdapter {
    pub fn new(config: &SourceConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: config.base_url(CHEMBL_API_BASE).trim_end_matches('/').to_string(),
            max_results: config.max_results,
        })
    }

    fn parse_molecule(&self, molecule: &Value) -> Option<SearchResult> {
        let chembl_id = molecule.get("molecule_chembl_id")?.as_str()?;
        let mut result = SearchResult::new(SourceId::Chembl);

        result.title = Some(
            molecule
                .get("pref_name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or(chembl_id)
                .to_string(),
        );
        result.year = molecule
            .get("first_approval")
            .and_then(|v| v.as_i64())
            .map(|y| y as i32);
        result.venue = max_phase(molecule).map(|p| format!("Max phase {}", p));

        let mut details = vec![chembl_id.to_string()];
        if let Some(kind) = molecule.get("molecule_type").and_then(|v| v.as_str()) {
            details.push(kind.to_string());
        }
        let properties = molecule.get("molecule_properties");
        if let Some(formula) = properties
            .and_then(|p| p.get("full_molformula"))
            .and_then(|v| v.as_str())
        {
            details.push(format!("formula {}", formula));
        }
        if let Some(weight) = properties.and_then(|p| p.get("full_mwt")).and_then(as_text) {
            details.push(format!("MW {}", weight));
        }
        result.snippet = Some(details.join("; "));

        result.url = Some(format!("{}/{}/", REPORT_CARD_BASE, chembl_id));
        result.image_url = Some(format!("{}/image/{}.svg", self.base_url, chembl_id));
        Some(result)
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `max_phase` arrives as a number in older API versions and as a decimal
/// string ("4.0") in newer ones.
fn max_phase(molecule: &Value) -> Option<String> {
    let raw = as_text(molecule.get("max_phase")?)?;
    let phase: f64 = raw.parse().ok()?;
    if phase.fract() == 0.0 {
        Some(format!("{}", phase as i64))
    } else {
        Some(raw)
    }
}

#[async_trait]
impl SearchAdapter for ChemblAdapter {
    fn source(&self) -> SourceId {
        SourceId::Chembl
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<SearchHits, SearchError> {
        info!(query = %query, limit, "Searching ChEMBL");

        let request = self
            .client
            .get(format!("{}/molecule/search.json", self.base_url))
            .query(&[("q", query)])
            .query(&[("limit", limit)]);
        let json = super::send_json(request).await?;

        let molecules = json
            .get("molecules")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SearchError::ParseError("response has no molecules".to_string()))?;

        let results: Vec<SearchResult> = molecules
            .iter()
            .filter_map(|m| self.parse_molecule(m))
            .collect();
        info!(count = results.len(), "ChEMBL search completed");
        Ok(SearchHits::new(results, limit))
    }
}
