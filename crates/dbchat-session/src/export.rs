use std::path::Path;

use chrono::{DateTime, Utc};
use dbchat_core::Role;
use tokio::fs;

use crate::conversation::Conversation;
use crate::error::SessionError;

/// Render the full history as Markdown, including turns evicted from the
/// window. The system prompt is omitted.
pub fn render_markdown(conversation: &Conversation, exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "# Conversation {}\n\n_Subject: {} | exported {}_\n",
        conversation.conversation_id(),
        conversation.subject_id(),
        exported_at.to_rfc3339()
    );

    for message in conversation.history() {
        let body = message.content().trim();
        match message.role() {
            Role::System => continue,
            Role::User => out.push_str(&format!("\n**User:**\n\n{body}\n")),
            Role::Assistant if message.is_function_invocation() => out.push_str(&format!(
                "\n**Assistant called `{}`:**\n\n```json\n{body}\n```\n",
                message.function_name().unwrap_or_default()
            )),
            Role::Assistant => out.push_str(&format!("\n**Assistant:**\n\n{body}\n")),
            Role::Function => out.push_str(&format!(
                "\n**Result of `{}`:**\n\n```json\n{body}\n```\n",
                message.function_name().unwrap_or_default()
            )),
        }
    }
    out
}

pub async fn export_markdown(conversation: &Conversation, path: &Path) -> Result<(), SessionError> {
    let content = render_markdown(conversation, Utc::now());
    fs::write(path, content)
        .await
        .map_err(|source| SessionError::Export {
            path: path.to_path_buf(),
            source,
        })?;
    log::info!(
        "{} Exported transcript to {}",
        conversation.log_prefix(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use dbchat_core::{ConversationWindow, Message};
    use tempfile::tempdir;

    use super::*;
    use crate::conversation::Durability;
    use crate::test_support::word_counter;

    fn conversation() -> Conversation {
        let window = ConversationWindow::with_messages(
            vec![
                Message::system("secret prompt"),
                Message::user("How many agents are senior?"),
                Message::assistant("Two agents are senior."),
            ],
            3000,
            100,
            word_counter(),
        );
        let history = vec![
            Message::assistant("Hello, what would you like to know?"),
            Message::user("Which region sells most?"),
            Message::assistant("The north region."),
            Message::user("How many agents are senior?"),
            Message::assistant("Two agents are senior."),
        ];
        Conversation::new("alice", "c1", window, history, Durability::Persisted)
    }

    #[test]
    fn renders_full_history_without_system_prompt() {
        let exported_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let markdown = render_markdown(&conversation(), exported_at);

        assert!(markdown.starts_with("# Conversation c1\n\n_Subject: alice | exported 2024-05-01T12:00:00+00:00_\n"));
        assert!(!markdown.contains("secret prompt"));
        assert!(markdown.contains("**User:**\n\nHow many agents are senior?\n"));
        assert!(markdown.contains("**User:**\n\nWhich region sells most?\n"));
        assert!(markdown.ends_with("**Assistant:**\n\nTwo agents are senior.\n"));
    }

    #[tokio::test]
    async fn writes_the_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("c1.md");

        export_markdown(&conversation(), &path).await.expect("export");

        let written = std::fs::read_to_string(&path).expect("read export");
        assert!(written.contains("Two agents are senior."));
    }

    #[tokio::test]
    async fn reports_unwritable_target() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("c1.md");

        let error = export_markdown(&conversation(), &path).await.unwrap_err();

        assert!(matches!(error, SessionError::Export { .. }));
    }
}
