use std::time::Duration;

use dbchat_core::config::DEFAULT_GREETING;
use dbchat_core::AppConfig;

pub const DEFAULT_NARRATION_INSTRUCTION: &str = "You are a data analyst. Explain what the results mean in clear, concise, personal terms tied to the user's original question, in a way the user can easily follow. If the results do not answer the question, answer it as helpfully as you can. Keep the response human and relevant to what the user asked.";

/// Configuration for conversation orchestration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token_budget: u32,
    pub reserve_buffer: u32,
    /// Cap on messages per backend request, independent of the token budget.
    pub max_messages_to_backend: usize,
    pub request_timeout: Duration,
    /// First message of a new conversation
    pub greeting: String,
    /// Pinned at index 0 of every conversation when set.
    pub system_prompt: Option<String>,
    /// Sent as a user message after a function result to ask for narration.
    pub narration_instruction: String,
    /// Function results longer than this are cut before narration. The result,
    /// the invocation, the scope note and the narration instruction are sent
    /// with the window but never charged against `token_budget`, so this cap
    /// plus `reserve_buffer` is the headroom the narration request needs.
    pub max_function_result_tokens: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_budget: 3000,
            reserve_buffer: 100,
            max_messages_to_backend: 5,
            request_timeout: Duration::from_secs(60),
            greeting: DEFAULT_GREETING.to_string(),
            system_prompt: None,
            narration_instruction: DEFAULT_NARRATION_INSTRUCTION.to_string(),
            max_function_result_tokens: 1000,
        }
    }
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            reserve_buffer: config.token_buffer,
            max_messages_to_backend: config.max_messages_to_backend,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            greeting: config.greeting.clone(),
            max_function_result_tokens: config.max_function_result_tokens,
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}
