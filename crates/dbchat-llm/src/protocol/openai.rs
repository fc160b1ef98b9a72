//! OpenAI chat-completions conversion (legacy `functions` / `function_call`).

use dbchat_core::{FunctionSchema, Message, Role};
use serde::{Deserialize, Serialize};

use crate::protocol::{FromProvider, ProtocolError, ProtocolResult, ToProvider};
use crate::provider::BackendReply;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    /// Serialized as `null` for assistant invocations.
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChoice {
    pub message: WireMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// ============================================================================
// Internal → OpenAI (ToProvider)
// ============================================================================

impl ToProvider<WireMessage> for Message {
    fn to_provider(&self) -> ProtocolResult<WireMessage> {
        let role = self.role().as_str().to_string();

        if self.is_function_invocation() {
            let name = self
                .function_name()
                .ok_or_else(|| ProtocolError::MissingField("function_call.name".to_string()))?;
            return Ok(WireMessage {
                role,
                content: None,
                name: None,
                function_call: Some(WireFunctionCall {
                    name: name.to_string(),
                    arguments: self.content().to_string(),
                }),
            });
        }

        let name = match self.role() {
            Role::Function => Some(
                self.function_name()
                    .ok_or_else(|| ProtocolError::MissingField("name".to_string()))?
                    .to_string(),
            ),
            _ => None,
        };

        Ok(WireMessage {
            role,
            content: Some(self.content().to_string()),
            name,
            function_call: None,
        })
    }
}

// ============================================================================
// OpenAI → Internal (FromProvider)
// ============================================================================

impl FromProvider<WireMessage> for BackendReply {
    fn from_provider(message: WireMessage) -> ProtocolResult<Self> {
        if let Some(call) = message.function_call {
            if call.name.trim().is_empty() {
                return Err(ProtocolError::InvalidFunctionCall(
                    "function_call without a name".to_string(),
                ));
            }
            return Ok(BackendReply::FunctionInvocation {
                name: call.name,
                arguments: call.arguments,
            });
        }

        let content = message
            .content
            .ok_or_else(|| ProtocolError::MissingField("content".to_string()))?;
        Ok(BackendReply::PlainMessage(Message::assistant(content)))
    }
}

impl FromProvider<ChatCompletionResponse> for BackendReply {
    fn from_provider(response: ChatCompletionResponse) -> ProtocolResult<Self> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::MissingField("choices".to_string()))?;

        if let Some(reason) = choice.finish_reason.as_deref() {
            log::debug!("Completion finished with reason '{}'", reason);
        }
        Self::from_provider(choice.message)
    }
}
