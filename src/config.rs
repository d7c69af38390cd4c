use std::env;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::search::SourceId;
use crate::types::LLMProvider;
use crate::utils::retry::{RetryMode, RetryPolicy};

/// Path of the optional TOML file, overridable with `RESEARCH_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "research.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub modes: ModesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            session_idle_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override for OpenAI-compatible gateways.
    pub base_url: Option<String>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_mode: RetryMode,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            connect_timeout_secs: 300,
            read_timeout_secs: 300,
            max_attempts: 2,
            retry_mode: RetryMode::Adaptive,
        }
    }
}

impl LLMConfig {
    pub fn provider(&self) -> Option<LLMProvider> {
        LLMProvider::from_id(&self.provider)
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.api_key.as_deref())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_mode)
    }
}

/// Settings shared by the keyless public sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    /// Endpoint override; each adapter knows its public default.
    pub base_url: Option<String>,
    pub max_results: usize,
    /// Optional key for sources that grant higher quotas with one (PubMed).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            max_results: 20,
            api_key: None,
        }
    }
}

impl SourceConfig {
    pub fn base_url<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(self.base_url.as_deref()).unwrap_or(default)
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.api_key.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScholarConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub serpapi_key: Option<String>,
    pub max_results: usize,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            serpapi_key: None,
            max_results: 20,
        }
    }
}

impl ScholarConfig {
    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.serpapi_key.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub cse_id: Option<String>,
    pub base_url: String,
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            cse_id: None,
            base_url: "https://www.googleapis.com/customsearch/v1".to_string(),
            max_results: 10,
        }
    }
}

impl WebSearchConfig {
    /// Both halves of the credential pair, or nothing.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(self.api_key.as_deref())?,
            non_empty(self.cse_id.as_deref())?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub http_timeout_secs: u64,
    /// Result language passed to sources that accept one.
    pub language: String,
    pub arxiv: SourceConfig,
    pub pubmed: SourceConfig,
    pub chembl: SourceConfig,
    pub clinical_trials: SourceConfig,
    pub scholar: ScholarConfig,
    pub web: WebSearchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            language: "en".to_string(),
            arxiv: SourceConfig::default(),
            pubmed: SourceConfig::default(),
            chembl: SourceConfig::default(),
            clinical_trials: SourceConfig::default(),
            scholar: ScholarConfig::default(),
            web: WebSearchConfig::default(),
        }
    }
}

/// Availability of one source, as shown to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub id: SourceId,
    pub name: String,
    pub description: String,
    pub available: bool,
}

impl SearchConfig {
    pub fn is_available(&self, source: SourceId) -> bool {
        match source {
            SourceId::Arxiv => self.arxiv.enabled,
            SourceId::Pubmed => self.pubmed.enabled,
            SourceId::Chembl => self.chembl.enabled,
            SourceId::ClinicalTrials => self.clinical_trials.enabled,
            SourceId::GoogleScholar => self.scholar.enabled && self.scholar.api_key().is_some(),
            SourceId::GoogleSearch => self.web.enabled && self.web.credentials().is_some(),
        }
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        SourceId::ALL
            .iter()
            .map(|&id| SourceStatus {
                id,
                name: id.label().to_string(),
                description: id.description().to_string(),
                available: self.is_available(id),
            })
            .collect()
    }

    fn max_results(&self, source: SourceId) -> usize {
        match source {
            SourceId::Arxiv => self.arxiv.max_results,
            SourceId::Pubmed => self.pubmed.max_results,
            SourceId::Chembl => self.chembl.max_results,
            SourceId::ClinicalTrials => self.clinical_trials.max_results,
            SourceId::GoogleScholar => self.scholar.max_results,
            SourceId::GoogleSearch => self.web.max_results,
        }
    }
}

/// Source list and output budget of one research mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
    pub sources: Vec<SourceId>,
    pub results_per_source: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModeProfile {
    pub fn fast() -> Self {
        Self {
            sources: vec![
                SourceId::Arxiv,
                SourceId::Pubmed,
                SourceId::Chembl,
                SourceId::ClinicalTrials,
            ],
            results_per_source: 3,
            max_tokens: 2000,
            temperature: 0.3,
        }
    }

    pub fn thorough() -> Self {
        Self {
            sources: SourceId::ALL.to_vec(),
            results_per_source: 10,
            max_tokens: 4000,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    pub fast: ModeProfile,
    pub thorough: ModeProfile,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            fast: ModeProfile::fast(),
            thorough: ModeProfile::thorough(),
        }
    }
}

impl Config {
    /// Load `.env`, the optional TOML file, `RESEARCH__*` overrides and the
    /// conventional credential variables, then validate.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = env::var("RESEARCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_layered(config::File::with_name(&path).required(false))
    }

    /// Like [`Config::load`], but the TOML file at `path` must exist.
    pub fn load_with_file(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_layered(config::File::from(path).required(true))
            .with_context(|| format!("Failed to load {}", path.display()))
    }

    fn load_layered<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut config: Config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("RESEARCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file only, without consulting the environment.
    pub fn load_file(path: &Path) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read {}", path.display()))?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = env::var("PORT") {
            self.server.port = port.parse().context("PORT must be a port number")?;
        }
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(provider) = env::var("LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if self.llm.api_key().is_none() {
            let var = match self.llm.provider() {
                Some(LLMProvider::Anthropic) => "ANTHROPIC_API_KEY",
                Some(LLMProvider::OpenRouter) => "OPENROUTER_API_KEY",
                Some(LLMProvider::Groq) => "GROQ_API_KEY",
                _ => "OPENAI_API_KEY",
            };
            self.llm.api_key = env::var(var).ok();
        }

        if let Ok(key) = env::var("SERPAPI_API_KEY") {
            self.search.scholar.serpapi_key = Some(key);
        }
        if let Ok(key) = env::var("GOOGLE_API_KEY") {
            self.search.web.api_key = Some(key);
        }
        if let Ok(cx) = env::var("GOOGLE_CSE_ID") {
            self.search.web.cse_id = Some(cx);
        }
        if let Ok(key) = env::var("NCBI_API_KEY") {
            self.search.pubmed.api_key = Some(key);
        }
        Ok(())
    }

    /// Startup validation; nothing downstream re-checks these.
    pub fn validate(&self) -> Result<()> {
        if self.llm.provider().is_none() {
            bail!("Unsupported LLM provider: {}", self.llm.provider);
        }
        if self.llm.max_attempts == 0 {
            bail!("llm.max_attempts must be at least 1");
        }
        if self.search.http_timeout_secs == 0 {
            bail!("search.http_timeout_secs must be positive");
        }
        for source in SourceId::ALL {
            if self.search.max_results(source) == 0 {
                bail!("search.{}.max_results must be positive", source.key());
            }
        }
        for (name, profile) in [("fast", &self.modes.fast), ("thorough", &self.modes.thorough)] {
            if profile.sources.is_empty() {
                bail!("modes.{}.sources must name at least one source", name);
            }
            let mut seen = Vec::with_capacity(profile.sources.len());
            for source in &profile.sources {
                if seen.contains(source) {
                    bail!("modes.{}.sources lists {} twice", name, source.key());
                }
                seen.push(*source);
            }
            if profile.results_per_source == 0 || profile.max_tokens == 0 {
                bail!("modes.{} needs positive results_per_source and max_tokens", name);
            }
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.search.web.max_results, 10);
        assert_eq!(config.search.scholar.max_results, 20);
        assert_eq!(config.llm.max_attempts, 2);
        assert_eq!(config.modes.fast.sources.len(), 4);
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "anthropic"
model = "claude-3-5-haiku-latest"

[search.pubmed]
enabled = false

[modes.fast]
sources = ["pubmed", "google_search"]
results_per_source = 2
max_tokens = 1500
temperature = 0.2
"#
        )
        .unwrap();

        let config = Config::load_file(file.path()).unwrap();
        assert_eq!(config.llm.provider(), Some(LLMProvider::Anthropic));
        assert!(!config.search.pubmed.enabled);
        assert!(config.search.arxiv.enabled);
        assert_eq!(
            config.modes.fast.sources,
            vec![SourceId::Pubmed, SourceId::GoogleSearch]
        );
        assert_eq!(config.modes.fast.results_per_source, 2);
        assert_eq!(config.modes.fast.max_tokens, 1500);
        // An unspecified profile keeps its defaults.
        assert_eq!(config.modes.thorough, ModeProfile::thorough());
    }

    #[test]
    fn test_validate_rejects_duplicate_sources() {
        let mut config = Config::default();
        config.modes.thorough.sources = vec![SourceId::Arxiv, SourceId::Arxiv];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.provider = "bedrock".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_toggle_availability() {
        let mut search = SearchConfig::default();
        assert!(!search.is_available(SourceId::GoogleSearch));
        assert!(!search.is_available(SourceId::GoogleScholar));

        search.web.api_key = Some("key".to_string());
        search.web.cse_id = Some("  ".to_string());
        assert!(!search.is_available(SourceId::GoogleSearch));

        search.web.cse_id = Some("cx".to_string());
        search.scholar.serpapi_key = Some("serp".to_string());
        assert!(search.is_available(SourceId::GoogleSearch));
        assert!(search.is_available(SourceId::GoogleScholar));

        let statuses = search.statuses();
        assert_eq!(statuses.len(), 6);
        assert!(statuses.iter().all(|s| s.available));
    }
}
