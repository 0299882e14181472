//! Command-line interface for zapgasto.
//!
//! Provides commands for running the webhook server with the background
//! processor, draining one batch by hand, inspecting the message queue, and
//! exercising the heuristic parser during development.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{OpenAiTranscriber, WhatsAppClient};
use crate::config::{self, ResolvedConfig};
use crate::core::MessageProcessor;
use crate::domain::MessageStatus;
use crate::extract::{build_extractor, heuristic};
use crate::ingest::{server, AppContext, WebhookService};
use crate::store::{JsonExpenseStore, JsonUserDirectory, MessageStore};

/// zapgasto - WhatsApp expense ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "zapgasto")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook server and the background processor
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Drain one batch of pending messages and exit
    Process,

    /// Show queue counts and recent messages
    Status {
        /// Maximum number of recent messages to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Parse a message with the heuristic extractor (development tool)
    Parse {
        /// Message text, e.g. "Despesa: Almoço; Valor: 35,90; Pagamento: PIX"
        text: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { bind } => serve(bind).await,
            Commands::Process => process_once().await,
            Commands::Status { limit } => show_status(limit).await,
            Commands::Parse { text } => parse_text(&text).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Everything the commands need, wired from the resolved configuration.
struct Services {
    store: Arc<MessageStore>,
    webhook: Arc<WebhookService>,
    processor: Arc<MessageProcessor>,
}

/// Open the stores and construct the collaborators.
async fn build_services(cfg: &ResolvedConfig) -> Result<Services> {
    std::fs::create_dir_all(&cfg.home)
        .with_context(|| format!("Failed to create state directory: {}", cfg.home.display()))?;

    let store = Arc::new(MessageStore::open(cfg.message_log_path()).await?);
    let users = Arc::new(JsonUserDirectory::new(cfg.users_path()));
    let expenses = Arc::new(JsonExpenseStore::new(cfg.expenses_path()));

    let whatsapp = Arc::new(WhatsAppClient::new(cfg.whatsapp.clone(), cfg.http_timeout));
    let transcriber = Arc::new(OpenAiTranscriber::new(
        cfg.openai.clone(),
        cfg.locale.clone(),
        cfg.http_timeout,
    ));
    let extractor = build_extractor(cfg);

    let webhook = Arc::new(WebhookService::new(
        cfg.whatsapp.verify_token.clone(),
        cfg.locale.clone(),
        store.clone(),
        whatsapp.clone(),
        transcriber,
    ));

    let processor = Arc::new(MessageProcessor::new(
        store.clone(),
        users,
        expenses,
        extractor,
        whatsapp,
        cfg.locale.clone(),
        cfg.batch_size,
    ));

    Ok(Services {
        store,
        webhook,
        processor,
    })
}

/// Run the webhook server with the processor loop beside it.
async fn serve(bind_override: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let services = build_services(cfg).await?;

    let bind = bind_override.unwrap_or_else(|| cfg.bind.clone());
    let ctx = AppContext {
        webhook: services.webhook.clone(),
    };

    let processor = services.processor.clone();
    let period = cfg.processor_period;
    tokio::spawn(async move {
        processor.run_loop(period).await;
    });

    server::run(&bind, ctx).await
}

/// Drain one batch and print the result.
async fn process_once() -> Result<()> {
    let cfg = config::config()?;
    let services = build_services(cfg).await?;

    let report = services.processor.process_pending().await?;
    println!(
        "Claimed: {}  Processed: {}  Errored: {}",
        report.claimed, report.processed, report.errored
    );

    Ok(())
}

/// Show queue counts and the most recent messages.
async fn show_status(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let services = build_services(cfg).await?;

    let counts = services.store.counts().await?;
    println!("Pending:   {}", counts.pending);
    println!("Processed: {}", counts.processed);
    println!("Errored:   {}", counts.errored);

    let recent = services.store.recent(limit).await?;
    if recent.is_empty() {
        return Ok(());
    }

    println!();
    println!(
        "{:<38} {:<10} {:<9} {:<15} BODY",
        "MESSAGE ID", "STATUS", "ATTEMPTS", "FROM"
    );
    println!("{}", "-".repeat(100));

    for msg in recent {
        let status = match msg.status {
            MessageStatus::Pending => "pending",
            MessageStatus::Processed => "processed",
            MessageStatus::Error => "error",
        };
        let body: String = msg.body.chars().take(40).collect();
        println!(
            "{:<38} {:<10} {:<9} {:<15} {}",
            msg.id, status, msg.attempts, msg.from, body
        );
        if let Some(error) = &msg.error_message {
            println!("{:>38}  {}", "", error);
        }
    }

    Ok(())
}

/// Run the heuristic parser over a message and print what it found.
async fn parse_text(text: &str) -> Result<()> {
    let cfg = config::config()?;

    match heuristic::try_parse(text, "dev", &cfg.locale) {
        Some(expense) => {
            println!("Descricao: {}", expense.description);
            println!("Valor:     {}", expense.amount);
            println!("Pagamento: {}", expense.payment_method.wire_name());
            println!("Categoria: {}", expense.category.wire_name());
            Ok(())
        }
        None => {
            anyhow::bail!("Could not parse text: {}", text)
        }
    }
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("zapgasto configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Messages: {}", cfg.message_log_path().display());
    println!("  Expenses: {}", cfg.expenses_path().display());
    println!("  Users:    {}", cfg.users_path().display());
    println!();
    println!("Server:");
    println!("  Bind: {}", cfg.bind);
    println!();
    println!("Processor:");
    println!("  Period:     {}s", cfg.processor_period.as_secs());
    println!("  Batch size: {}", cfg.batch_size);
    println!();
    println!("Locale: {}", cfg.locale);
    println!("WhatsApp Graph base: {}", cfg.whatsapp.graph_base_url);
    println!("OpenAI model: {}", cfg.openai.model);
    println!(
        "OpenAI key: {}",
        if cfg.openai.is_fake_key() {
            "(fake - offline mode, heuristic extractor)"
        } else {
            "(configured)"
        }
    );

    Ok(())
}
