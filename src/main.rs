use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use support_desk::agents::{
    AgentRegistry, AgentSelector, ComposerConfig, ResponseComposer, SelectorConfig,
};
use support_desk::config::AppConfig;
use support_desk::knowledge::KnowledgeBase;
use support_desk::llm::create_provider;
use support_desk::mailbox::{ImapMailbox, TicketSource, UnconfiguredMailbox};
use support_desk::pipeline::SupportPipeline;
use support_desk::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GROQ_API_KEY=gsk_...");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(config.log_dir.as_deref());

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve(config).await,
        Some("check-mailbox") => check_mailbox(config).await,
        Some(other) => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: support-desk [serve | check-mailbox]");
            std::process::exit(2);
        }
    }
}

/// Console logging, plus daily rolling files when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "support-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.server.bind, config.server.port);

    eprintln!("📬 Support Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.llm.model, config.llm.backend.label());
    eprintln!("   Knowledge: {}", config.knowledge_dir.display());
    match &config.mailbox {
        Some(mailbox) => eprintln!("   Mailbox: {}@{}", mailbox.username, mailbox.host),
        None => eprintln!("   Mailbox: not configured"),
    }
    eprintln!("   API: http://{addr}/api\n");

    let llm = create_provider(&config.llm)?;
    let registry = Arc::new(AgentRegistry::support_defaults().await);
    let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge_dir).await);

    let pipeline = SupportPipeline::new(
        AgentSelector::new(
            llm.clone(),
            registry,
            SelectorConfig {
                timeout: config.llm.timeout,
                ..Default::default()
            },
        ),
        ResponseComposer::new(
            llm,
            ComposerConfig {
                timeout: config.llm.timeout,
                ..Default::default()
            },
        ),
        knowledge,
    );

    let mailbox: Arc<dyn TicketSource> = match config.mailbox {
        Some(mailbox) => Arc::new(ImapMailbox::new(mailbox)),
        None => Arc::new(UnconfiguredMailbox),
    };

    let state = AppState {
        pipeline: Arc::new(pipeline),
        mailbox,
    };
    let app = server::router(state, &config.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Support desk API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Support desk API stopped");
    Ok(())
}

/// Connection diagnostic: log in, list mailboxes, count inbox messages.
async fn check_mailbox(config: AppConfig) -> anyhow::Result<()> {
    let Some(mailbox_config) = config.mailbox else {
        anyhow::bail!("EMAIL_USER and EMAIL_PASSWORD must be set to check the mailbox");
    };

    eprintln!(
        "Connecting to {}:{} as {}...",
        mailbox_config.host, mailbox_config.port, mailbox_config.username
    );
    let report = ImapMailbox::new(mailbox_config)
        .check_connection()
        .await
        .context("mailbox check failed")?;

    println!("Login successful.");
    println!("Mailboxes:");
    for name in &report.mailboxes {
        println!("  {name}");
    }
    println!("INBOX messages: {}", report.inbox_messages);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
