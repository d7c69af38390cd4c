// OpenAI-compatible chat completions adapter
// Also serves OpenRouter and Groq, which expose the same API under other base URLs.

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

pub struct OpenAIAdapter {
    client: Client<OpenAIConfig>,
}

impl OpenAIAdapter {
    pub fn new(http_client: reqwest::Client, api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        // Retries belong to the LLM facade; the client gives up after one attempt.
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(std::time::Duration::ZERO))
            .build();

        let client = Client::with_config(config)
            .with_http_client(http_client)
            .with_backoff(no_retry);
        Self { client }
    }
}

fn to_request_message(role: &str, content: &str) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let message = match role {
        "system" => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        _ => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(message)
}

impl From<OpenAIError> for AppError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::Reqwest(e) => AppError::from(e),
            OpenAIError::ApiError(api) => {
                let code = api.code.as_deref().unwrap_or_default();
                let kind = api.r#type.as_deref().unwrap_or_default();
                if code == "rate_limit_exceeded" || kind == "insufficient_quota" {
                    AppError::RateLimited(api.message)
                } else if kind == "invalid_request_error" {
                    AppError::InvalidRequest(api.message)
                } else {
                    AppError::LLMApi(api.message)
                }
            }
            OpenAIError::InvalidArgument(message) => AppError::InvalidRequest(message),
            other => AppError::LLMApi(other.to_string()),
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(to_request_message("system", system)?);
        }
        for m in &request.messages {
            messages.push(to_request_message(&m.role, &m.content)?);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.as_str()).messages(messages);
        if let Some(max_tokens) = request.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            args.temperature(temperature);
        }
        let body = args.build()?;

        let response = self.client.chat().create(body).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("Model returned no choices".to_string()))?;

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let finish_reason = choice
            .finish_reason
            .and_then(|r| serde_json::to_value(r).ok())
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "stop".to_string());

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
            usage,
        })
    }
}
