use std::sync::Arc;
use std::time::Duration;

use dbchat_core::{
    FunctionExecutionError, FunctionExecutor, FunctionSchema, Message, SelectedResources,
    SharedTokenCounter,
};
use dbchat_llm::{BackendReply, ChatBackend};

use crate::config::DEFAULT_NARRATION_INSTRUCTION;
use crate::error::BridgeError;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Runs the two-phase function-calling protocol.
///
/// Phase one sends the transcript with the offered functions. A plain reply
/// ends the round trip; an invocation is executed exactly once and the result
/// is sent back, without functions, for the backend to narrate.
pub struct FunctionCallBridge {
    backend: Arc<dyn ChatBackend>,
    executor: Arc<dyn FunctionExecutor>,
    timeout: Duration,
    narration_instruction: String,
    result_limit: Option<ResultLimit>,
}

struct ResultLimit {
    counter: SharedTokenCounter,
    max_tokens: u32,
}

impl FunctionCallBridge {
    pub fn new(backend: Arc<dyn ChatBackend>, executor: Arc<dyn FunctionExecutor>) -> Self {
        Self {
            backend,
            executor,
            timeout: Duration::from_secs(60),
            narration_instruction: DEFAULT_NARRATION_INSTRUCTION.to_string(),
            result_limit: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_narration_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.narration_instruction = instruction.into();
        self
    }

    /// Cut function results to `max_tokens` under `counter` before narration.
    pub fn with_result_limit(mut self, counter: SharedTokenCounter, max_tokens: u32) -> Self {
        self.result_limit = Some(ResultLimit {
            counter,
            max_tokens,
        });
        self
    }

    pub fn executor(&self) -> &Arc<dyn FunctionExecutor> {
        &self.executor
    }

    pub async fn complete(
        &self,
        transcript: &[Message],
        functions: &[FunctionSchema],
        resources: &SelectedResources,
    ) -> Result<Message> {
        let mut request = transcript.to_vec();
        request.push(Message::system(resources.describe()));

        let (name, arguments) = match self.send(&request, functions).await? {
            BackendReply::PlainMessage(message) => return Ok(message),
            BackendReply::FunctionInvocation { name, arguments } => (name, arguments),
        };

        let result = self.run_function(&name, &arguments, functions, resources).await;
        let result = self.cap_result(result);

        request.push(Message::function_invocation(name.clone(), arguments));
        request.push(Message::function_result(name, result));
        request.push(Message::user(self.narration_instruction.clone()));

        match self.send(&request, &[]).await? {
            BackendReply::PlainMessage(message) => Ok(message),
            BackendReply::FunctionInvocation { name, .. } => {
                log::warn!("Backend chained a second function call '{}'", name);
                Err(BridgeError::UnexpectedInvocation(name))
            }
        }
    }

    async fn send(&self, messages: &[Message], functions: &[FunctionSchema]) -> Result<BackendReply> {
        match tokio::time::timeout(self.timeout, self.backend.complete(messages, functions)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(error)) => {
                log::error!("Backend request failed: {}", error);
                Err(BridgeError::BackendUnavailable(error.to_string()))
            }
            Err(_) => {
                log::error!("Backend did not reply within {:?}", self.timeout);
                Err(BridgeError::BackendUnavailable(format!(
                    "no reply within {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Failures become the function result text; they never end the turn.
    async fn run_function(
        &self,
        name: &str,
        arguments: &str,
        functions: &[FunctionSchema],
        resources: &SelectedResources,
    ) -> String {
        let outcome = if functions.iter().any(|schema| schema.name == name) {
            self.executor.execute(name, arguments, resources).await
        } else {
            Err(FunctionExecutionError::UnknownFunction(name.to_string()))
        };

        match outcome {
            Ok(result) => {
                log::debug!("Function '{}' returned {} bytes", name, result.len());
                result
            }
            Err(error) => {
                log::warn!("Function '{}' failed: {}", name, error);
                error.to_string()
            }
        }
    }

    /// Keep the longest prefix that fits the limit, followed by a short note.
    fn cap_result(&self, result: String) -> String {
        let Some(limit) = &self.result_limit else {
            return result;
        };
        let tokens = limit.counter.count_text(&result);
        if tokens <= limit.max_tokens {
            return result;
        }

        let boundaries: Vec<usize> = result
            .char_indices()
            .map(|(index, _)| index)
            .chain(std::iter::once(result.len()))
            .collect();
        let (mut low, mut high) = (0, boundaries.len() - 1);
        while low < high {
            let mid = (low + high + 1) / 2;
            if limit.counter.count_text(&result[..boundaries[mid]]) <= limit.max_tokens {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        log::warn!(
            "Function result of {} tokens cut to {} tokens",
            tokens,
            limit.max_tokens
        );
        format!(
            "{}\n[result truncated: first {} of {} tokens shown]",
            &result[..boundaries[low]],
            limit.max_tokens,
            tokens
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dbchat_core::{FunctionExecutionError, FunctionExecutor, Message, Role};
    use dbchat_llm::BackendReply;

    use super::FunctionCallBridge;
    use crate::error::BridgeError;
    use crate::test_support::{sales_selection, word_counter, ScriptedBackend, StaticExecutor};

    fn invocation(query: &str) -> BackendReply {
        BackendReply::FunctionInvocation {
            name: "ask_database".to_string(),
            arguments: serde_json::json!({ "query": query }).to_string(),
        }
    }

    #[tokio::test]
    async fn plain_reply_is_returned_without_executing() {
        let backend = Arc::new(ScriptedBackend::replying("Hello!"));
        let executor = Arc::new(StaticExecutor::new(Ok("[]".to_string())));
        let bridge = FunctionCallBridge::new(backend.clone(), executor.clone());
        let schemas = executor.schemas(&sales_selection());

        let reply = bridge
            .complete(&[Message::user("hi")], &schemas, &sales_selection())
            .await
            .expect("reply");

        assert_eq!(reply, Message::assistant("Hello!"));
        assert_eq!(executor.calls(), 0);

        let seen = backend.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].function_names, vec!["ask_database"]);
        let scope = seen[0].messages.last().expect("scope note");
        assert_eq!(scope.role(), Role::System);
        assert_eq!(scope.content(), "Selected schema: main\nSelected tables: agents");
    }

    #[tokio::test]
    async fn invocation_runs_once_and_is_narrated_without_functions() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(invocation("SELECT COUNT(*) AS n FROM main.agents")),
            Ok(BackendReply::PlainMessage(Message::assistant(
                "There are three agents.",
            ))),
        ]));
        let executor = Arc::new(StaticExecutor::new(Ok(r#"[{"n":3}]"#.to_string())));
        let bridge = FunctionCallBridge::new(backend.clone(), executor.clone())
            .with_narration_instruction("Explain the result.");
        let schemas = executor.schemas(&sales_selection());

        let reply = bridge
            .complete(&[Message::user("How many agents?")], &schemas, &sales_selection())
            .await
            .expect("reply");

        assert_eq!(reply.content(), "There are three agents.");
        assert_eq!(executor.calls(), 1);

        let seen = backend.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].function_names.is_empty());
        let tail: Vec<(Role, &str)> = seen[1].messages[seen[1].messages.len() - 3..]
            .iter()
            .map(|m| (m.role(), m.content()))
            .collect();
        assert_eq!(
            tail,
            vec![
                (
                    Role::Assistant,
                    r#"{"query":"SELECT COUNT(*) AS n FROM main.agents"}"#
                ),
                (Role::Function, r#"[{"n":3}]"#),
                (Role::User, "Explain the result."),
            ]
        );
    }

    #[tokio::test]
    async fn function_failure_is_reported_to_the_backend() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(invocation("SELECT * FROM main.payroll")),
            Ok(BackendReply::PlainMessage(Message::assistant(
                "I can't look at payroll.",
            ))),
        ]));
        let executor = Arc::new(StaticExecutor::new(Err(
            FunctionExecutionError::ForbiddenTarget("main.payroll".to_string()),
        )));
        let bridge = FunctionCallBridge::new(backend.clone(), executor.clone());
        let schemas = executor.schemas(&sales_selection());

        let reply = bridge
            .complete(&[Message::user("Show salaries")], &schemas, &sales_selection())
            .await
            .expect("reply");

        assert_eq!(reply.content(), "I can't look at payroll.");
        let seen = backend.seen();
        let function_message = seen[1]
            .messages
            .iter()
            .find(|m| m.role() == Role::Function)
            .expect("function message");
        assert!(function_message.content().contains("main.payroll"));
    }

    #[tokio::test]
    async fn oversized_result_is_cut_before_narration() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(invocation("SELECT * FROM main.agents")),
            Ok(BackendReply::PlainMessage(Message::assistant("Many rows."))),
        ]));
        let executor = Arc::new(StaticExecutor::new(Ok("a b c d e f g h i j".to_string())));
        let bridge = FunctionCallBridge::new(backend.clone(), executor.clone())
            .with_result_limit(word_counter(), 5);
        let schemas = executor.schemas(&sales_selection());

        bridge
            .complete(&[Message::user("List agents")], &schemas, &sales_selection())
            .await
            .expect("reply");

        let function_message = backend.seen()[1]
            .messages
            .iter()
            .find(|m| m.role() == Role::Function)
            .cloned()
            .expect("function message");
        assert!(function_message.content().starts_with("a b c d e"));
        assert!(!function_message.content().contains("f g"));
        assert!(function_message
            .content()
            .ends_with("[result truncated: first 5 of 10 tokens shown]"));
    }

    #[tokio::test]
    async fn result_within_limit_is_untouched() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(invocation("SELECT COUNT(*) AS n FROM main.agents")),
            Ok(BackendReply::PlainMessage(Message::assistant("Three."))),
        ]));
        let executor = Arc::new(StaticExecutor::new(Ok(r#"[{"n":3}]"#.to_string())));
        let bridge = FunctionCallBridge::new(backend.clone(), executor.clone())
            .with_result_limit(word_counter(), 5);
        let schemas = executor.schemas(&sales_selection());

        bridge
            .complete(&[Message::user("How many?")], &schemas, &sales_selection())
            .await
            .expect("reply");

        let seen = backend.seen();
        assert!(seen[1]
            .messages
            .iter()
            .any(|m| m.role() == Role::Function && m.content() == r#"[{"n":3}]"#));
    }

    #[tokio::test]
    async fn undeclared_function_is_not_executed() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(BackendReply::FunctionInvocation {
                name: "drop_everything".to_string(),
                arguments: "{}".to_string(),
            }),
            Ok(BackendReply::PlainMessage(Message::assistant("Sorry."))),
        ]));
        let executor = Arc::new(StaticExecutor::new(Ok("[]".to_string())));
        let bridge = FunctionCallBridge::new(backend.clone(), executor.clone());
        let schemas = executor.schemas(&sales_selection());

        bridge
            .complete(&[Message::user("hi")], &schemas, &sales_selection())
            .await
            .expect("reply");

        assert_eq!(executor.calls(), 0);
        let function_message = backend.seen()[1]
            .messages
            .iter()
            .find(|m| m.role() == Role::Function)
            .cloned()
            .expect("function message");
        assert!(function_message.content().contains("drop_everything"));
    }

    #[tokio::test]
    async fn chained_invocation_is_a_protocol_violation() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(invocation("SELECT 1")),
            Ok(invocation("SELECT 2")),
        ]));
        let executor = Arc::new(StaticExecutor::new(Ok("[]".to_string())));
        let bridge = FunctionCallBridge::new(backend, executor.clone());
        let schemas = executor.schemas(&sales_selection());

        let error = bridge
            .complete(&[Message::user("hi")], &schemas, &sales_selection())
            .await
            .unwrap_err();

        assert!(matches!(error, BridgeError::UnexpectedInvocation(name) if name == "ask_database"));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn backend_error_is_unavailable() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err("HTTP 503".to_string())]));
        let executor = Arc::new(StaticExecutor::new(Ok("[]".to_string())));
        let bridge = FunctionCallBridge::new(backend, executor);

        let error = bridge
            .complete(&[Message::user("hi")], &[], &sales_selection())
            .await
            .unwrap_err();

        assert!(matches!(error, BridgeError::BackendUnavailable(reason) if reason.contains("503")));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(30)));
        let executor = Arc::new(StaticExecutor::new(Ok("[]".to_string())));
        let bridge =
            FunctionCallBridge::new(backend, executor).with_timeout(Duration::from_millis(20));

        let error = bridge
            .complete(&[Message::user("hi")], &[], &sales_selection())
            .await
            .unwrap_err();

        assert!(matches!(error, BridgeError::BackendUnavailable(_)));
    }
}
