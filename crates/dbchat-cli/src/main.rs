mod app;
mod logging;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dbchat_core::{AppConfig, Role, WindowUsage};
use dbchat_session::{export_markdown, Conversation, Durability, SessionError, TurnOutcome};

use crate::app::{App, Mode};

#[derive(Parser)]
#[command(name = "dbchat")]
#[command(about = "Ask questions about a SQLite database in plain language")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subject the conversations belong to
    #[arg(long, global = true, env = "DBCHAT_USER", default_value = "local")]
    user: String,

    /// Conversation to resume (a new one is started when omitted)
    #[arg(long, global = true)]
    conversation: Option<String>,

    /// Schema the selected tables live in
    #[arg(long, global = true, default_value = "main")]
    schema: String,

    /// Tables the assistant may query, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    tables: Vec<String>,

    /// Enable debug mode
    #[arg(long, short, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat
    Chat,
    /// Send a single message
    Send {
        /// Message content
        message: String,
    },
    /// View conversation history
    History,
    /// List stored conversations
    List,
    /// Delete a conversation and start over
    Clear,
    /// Export a conversation as Markdown
    Export {
        /// Output file (defaults to <conversation>.md)
        path: Option<PathBuf>,
    },
    /// Show schemas, tables and columns of the target database
    Tables,
}

impl Commands {
    fn mode(&self) -> Mode {
        match self {
            Commands::Chat | Commands::Send { .. } => Mode::Chat,
            _ => Mode::Maintenance,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    log::debug!(
        "Target database {}, history {}",
        config.target_db.display(),
        config.history_db.display()
    );

    let app = App::build(&config, &cli.schema, &cli.tables, cli.command.mode()).await?;

    match cli.command {
        Commands::Chat => {
            let conversation_id = conversation_or_new(cli.conversation);
            run_interactive_chat(&app, &cli.user, &conversation_id).await
        }
        Commands::Send { message } => {
            let conversation_id = conversation_or_new(cli.conversation);
            send_message(&app, &cli.user, &conversation_id, &message).await
        }
        Commands::History => {
            let conversation_id = required_conversation(cli.conversation)?;
            show_history(&app, &cli.user, &conversation_id).await
        }
        Commands::List => list_conversations(&app, &cli.user).await,
        Commands::Clear => {
            let conversation_id = required_conversation(cli.conversation)?;
            clear_conversation(&app, &cli.user, &conversation_id).await
        }
        Commands::Export { path } => {
            let conversation_id = required_conversation(cli.conversation)?;
            let path = path.unwrap_or_else(|| PathBuf::from(format!("{conversation_id}.md")));
            export_conversation(&app, &cli.user, &conversation_id, &path).await
        }
        Commands::Tables => {
            show_tables(&app);
            Ok(())
        }
    }
}

fn conversation_or_new(conversation: Option<String>) -> String {
    conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn required_conversation(conversation: Option<String>) -> anyhow::Result<String> {
    conversation.ok_or_else(|| anyhow!("--conversation is required for this command"))
}

async fn open(app: &App, user: &str, conversation_id: &str) -> anyhow::Result<Conversation> {
    let conversation = app
        .orchestrator
        .open(user, conversation_id)
        .await
        .map_err(report)?;
    if conversation.durability() == Durability::MemoryOnly {
        print_memory_only_warning();
    }
    Ok(conversation)
}

async fn run_interactive_chat(app: &App, user: &str, conversation_id: &str) -> anyhow::Result<()> {
    let mut conversation = open(app, user, conversation_id).await?;
    let functions = app.functions();

    println!(
        "{}",
        format!("💬 Conversation {} ({})", conversation_id, app.resources.describe()).cyan()
    );
    println!(
        "{}",
        "Type 'exit' to quit, '/clear' to start over, '/export <file>' to save, '/usage' for tokens"
            .dimmed()
    );
    println!("{}", "─".repeat(50).dimmed());
    print_transcript(&conversation);

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            println!();
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }
        if input == "/usage" {
            print_usage(&conversation.usage());
            continue;
        }
        if input == "/clear" {
            match app.orchestrator.clear(&mut conversation).await {
                Ok(()) => {
                    println!("{}", "🧹 Conversation cleared".yellow());
                    print_transcript(&conversation);
                }
                Err(error) => print_session_error(&error),
            }
            continue;
        }
        if let Some(path) = input.strip_prefix("/export") {
            let path = path.trim();
            let path = if path.is_empty() {
                PathBuf::from(format!("{conversation_id}.md"))
            } else {
                PathBuf::from(path)
            };
            match export_markdown(&conversation, &path).await {
                Ok(()) => println!("{}", format!("📄 Exported to {}", path.display()).green()),
                Err(error) => print_session_error(&error),
            }
            continue;
        }

        match app
            .orchestrator
            .submit(&mut conversation, input, &functions, &app.resources)
            .await
        {
            Ok(outcome) => print_outcome(&outcome),
            Err(error) => print_session_error(&error),
        }
    }

    Ok(())
}

async fn send_message(
    app: &App,
    user: &str,
    conversation_id: &str,
    message: &str,
) -> anyhow::Result<()> {
    let mut conversation = open(app, user, conversation_id).await?;
    let functions = app.functions();

    println!("{}", format!("🚀 Sending message: {}", message).cyan());
    let outcome = app
        .orchestrator
        .submit(&mut conversation, message, &functions, &app.resources)
        .await
        .map_err(report)?;
    print_outcome(&outcome);
    println!("{}", format!("Conversation: {}", conversation_id).dimmed());
    Ok(())
}

async fn show_history(app: &App, user: &str, conversation_id: &str) -> anyhow::Result<()> {
    let conversation = open(app, user, conversation_id).await?;
    println!("{}", format!("📜 Conversation {}", conversation_id).cyan());
    println!("{}", "─".repeat(50).dimmed());
    print_transcript(&conversation);
    let in_window = conversation.messages().iter().filter(|m| !m.is_system()).count();
    println!(
        "{}",
        format!(
            "{} of {} messages still in the context window",
            in_window,
            conversation.history().len()
        )
        .dimmed()
    );
    print_usage(&conversation.usage());
    Ok(())
}

async fn list_conversations(app: &App, user: &str) -> anyhow::Result<()> {
    let summaries = app.orchestrator.list(user).await.map_err(report)?;
    if summaries.is_empty() {
        println!("{}", format!("No conversations stored for {}", user).yellow());
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{}  {}  {}",
            summary.conversation_id.cyan(),
            format!("{} messages", summary.message_count).dimmed(),
            summary.updated_at.to_rfc3339().dimmed()
        );
    }
    Ok(())
}

async fn clear_conversation(app: &App, user: &str, conversation_id: &str) -> anyhow::Result<()> {
    let mut conversation = open(app, user, conversation_id).await?;
    app.orchestrator
        .clear(&mut conversation)
        .await
        .map_err(report)?;
    println!("{}", format!("🧹 Cleared {}", conversation_id).yellow());
    Ok(())
}

async fn export_conversation(
    app: &App,
    user: &str,
    conversation_id: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let conversation = open(app, user, conversation_id).await?;
    export_markdown(&conversation, path).await.map_err(report)?;
    println!("{}", format!("📄 Exported to {}", path.display()).green());
    Ok(())
}

fn show_tables(app: &App) {
    let mut any = false;
    for schema in app.catalog.schemas() {
        println!("{}", schema.cyan().bold());
        let Ok(tables) = app.catalog.tables(schema) else {
            continue;
        };
        for table in tables {
            any = true;
            let selected = app.resources.allows(&table.schema, &table.name);
            let marker = if selected { "*" } else { " " };
            println!("  {} {}", marker.green(), table.name.bold());
            for column in &table.columns {
                let key = if column.primary_key { " (pk)" } else { "" };
                println!(
                    "      {} {}{}",
                    column.name,
                    column.data_type.dimmed(),
                    key.dimmed()
                );
            }
        }
    }
    if !any {
        println!("{}", "No tables found in the target database".yellow());
    }
}

/// The full history, including turns no longer sent to the backend.
fn print_transcript(conversation: &Conversation) {
    for message in conversation.history() {
        match message.role() {
            Role::User => println!("{} {}", "You:".cyan().bold(), message.content()),
            Role::Assistant => println!("{} {}", "Assistant:".green().bold(), message.content().green()),
            Role::System | Role::Function => {}
        }
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!(
        "{} {}",
        "Assistant:".green().bold(),
        outcome.reply.content().green()
    );
    if outcome.evicted > 0 {
        println!(
            "{}",
            format!(
                "✂️  {} older message(s) dropped to stay within the token budget",
                outcome.evicted
            )
            .yellow()
        );
    }
    if outcome.durability == Durability::MemoryOnly {
        print_memory_only_warning();
    }
    print_usage(&outcome.usage);
}

fn print_usage(usage: &WindowUsage) {
    println!(
        "{}",
        format!(
            "Tokens used {}/{} ({:.1}%)",
            usage.total_tokens,
            usage.budget,
            usage.usage_percentage()
        )
        .dimmed()
    );
}

fn print_memory_only_warning() {
    println!(
        "{}",
        "⚠️  History store unavailable: this conversation is kept in memory only".yellow()
    );
}

fn print_session_error(error: &SessionError) {
    log::error!("{}", error);
    println!("{}", format!("❌ {}", error.user_message()).red());
}

/// Print the user-facing text and hand the detailed error to the caller.
fn report(error: SessionError) -> anyhow::Error {
    print_session_error(&error);
    anyhow::Error::new(error)
}
