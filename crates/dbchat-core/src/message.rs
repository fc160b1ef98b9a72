use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// A single chat turn.
///
/// This is also the durable wire format: a transcript is stored as a JSON
/// array of `{role, content, function_name?}` objects.
///
/// An assistant message with `function_name` set is the backend asking for a
/// function; its `content` holds the raw argument JSON. Those only live inside
/// a function-call round trip and are never appended to a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that requested `name` with the given raw arguments.
    pub fn function_invocation(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: arguments.into(),
            function_name: Some(name.into()),
        }
    }

    /// Result of running `name`, fed back to the backend.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            function_name: Some(name.into()),
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            function_name: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn is_function_invocation(&self) -> bool {
        self.role == Role::Assistant && self.function_name.is_some()
    }
}

/// Encode a transcript into its persisted JSON form.
pub fn encode_transcript(messages: &[Message]) -> serde_json::Result<String> {
    serde_json::to_string(messages)
}

/// Decode a persisted transcript.
pub fn decode_transcript(raw: &str) -> serde_json::Result<Vec<Message>> {
    serde_json::from_str(raw)
}
