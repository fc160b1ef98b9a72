use async_trait::async_trait;
use dbchat_core::{AppConfig, FunctionSchema, Message};
use reqwest::Client;

use crate::protocol::{ChatCompletionRequest, ChatCompletionResponse, FromProvider, ToProvider};
use crate::provider::{BackendReply, ChatBackend, LLMError, Result};

pub struct OpenAIBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAIBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            max_tokens: None,
        }
    }

    /// Build a backend from application config; an API key is required.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LLMError::Auth("no API key configured (set OPENAI_API_KEY)".to_string())
            })?;

        Ok(Self::new(api_key)
            .with_base_url(config.api_base.clone())
            .with_model(config.model.clone())
            .with_max_tokens(config.max_output_tokens))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
    ) -> Result<ChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(|message| message.to_provider())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            functions: functions.to_vec(),
            max_tokens: self.max_tokens,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAIBackend {
    async fn complete(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
    ) -> Result<BackendReply> {
        let body = self.build_request(messages, functions)?;
        log::debug!(
            "Requesting completion: model={}, messages={}, functions={}",
            self.model,
            body.messages.len(),
            body.functions.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(LLMError::Api(format!("HTTP {}: {}", status, text)));
        }

        let text = response.text().await?;
        let completion: ChatCompletionResponse = serde_json::from_str(&text)?;
        let reply = BackendReply::from_provider(completion)?;

        if let BackendReply::FunctionInvocation { name, .. } = &reply {
            log::debug!("Backend requested function '{}'", name);
        }
        Ok(reply)
    }
}
