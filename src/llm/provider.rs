use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse};
use crate::utils::retry::{with_retry, RetryPolicy};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Hosted model client: one provider adapter plus the retry policy.
#[derive(Clone)]
pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    provider_name: String,
    model: String,
    retry: RetryPolicy,
}

impl LLM {
    /// Build the client named by the configuration. Fails when the provider
    /// needs a key that is not set.
    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let provider = config
            .provider()
            .ok_or_else(|| AppError::Config(format!("Unsupported provider: {}", config.provider)))?;
        let api_key = config
            .api_key()
            .ok_or_else(|| AppError::Config(format!("No API key configured for {}", provider)))?;

        let client = http_client(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )?;

        let adapter: Arc<dyn LLMAdapter> = match provider {
            LLMProvider::OpenAI => Arc::new(super::openai::OpenAIAdapter::new(
                client,
                api_key,
                config.base_url.as_deref().unwrap_or(OPENAI_API_BASE),
            )),
            LLMProvider::OpenRouter => Arc::new(super::openai::OpenAIAdapter::new(
                client,
                api_key,
                config.base_url.as_deref().unwrap_or(OPENROUTER_API_BASE),
            )),
            LLMProvider::Groq => Arc::new(super::openai::OpenAIAdapter::new(
                client,
                api_key,
                config.base_url.as_deref().unwrap_or(GROQ_API_BASE),
            )),
            LLMProvider::Anthropic => Arc::new(super::anthropic::AnthropicAdapter::new(
                client,
                api_key,
                config.base_url.as_deref(),
            )),
        };

        info!(provider = %provider, model = %config.model, "LLM client ready");
        Ok(Self {
            adapter,
            provider_name: provider.to_string(),
            model: config.model.clone(),
            retry: config.retry_policy(),
        })
    }

    pub fn from_adapter(
        adapter: Arc<dyn LLMAdapter>,
        model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            adapter,
            provider_name: "custom".to_string(),
            model: model.into(),
            retry,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        with_retry(&self.retry, || self.adapter.create_chat_completion(request)).await
    }
}

// The read timeout bounds each wait on the socket, not the whole completion.
fn http_client(connect_timeout: Duration, read_timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LLMMessage, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LLMAdapter for Flaky {
        async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(AppError::RateLimited("429".into()));
            }
            Ok(LLMResponse {
                content: "ok".into(),
                finish_reason: "stop".into(),
                usage: TokenUsage::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_facade_retries_transient_errors() {
        let adapter = Arc::new(Flaky { calls: AtomicU32::new(0) });
        let llm = LLM::from_adapter(
            adapter.clone(),
            "test-model",
            RetryPolicy::default().with_base_delay(Duration::ZERO),
        );
        let request = LLMRequest {
            model: "test-model".into(),
            messages: vec![LLMMessage::user("hi")],
            max_tokens: Some(10),
            temperature: Some(0.3),
            system_instruction: None,
        };

        let response = llm.create_chat_completion(&request).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stalled_server_hits_read_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = http_client(Duration::from_secs(1), Duration::from_millis(200)).unwrap();
        let err = client.get(format!("http://{}/", addr)).send().await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Timeout(_)));
        server.abort();
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = LLMConfig::default();
        assert!(matches!(LLM::from_config(&config), Err(AppError::Config(_))));

        let config = LLMConfig {
            provider: "anthropic".into(),
            api_key: Some("sk-ant".into()),
            ..LLMConfig::default()
        };
        let llm = LLM::from_config(&config).unwrap();
        assert_eq!(llm.provider_name(), "anthropic");
    }
}
