//! Meeting-minutes synchronization and retrieval service - entry point

use anyhow::{Context, Result};
use clap::Parser;
use scribe_common::config::Config;
use scribe_common::db::init_database;
use scribe_svc::api;
use scribe_svc::gateway::{ModelGateway, OpenAiGateway};
use scribe_svc::qna::QueryPipeline;
use scribe_svc::queue::{Scheduler, WorkerDeps};
use scribe_svc::state::AppContext;
use scribe_svc::store::{ChatHistoryStore, TranscriptStore};
use scribe_svc::summary::Summarizer;
use scribe_svc::tracker::MinuteTracker;
use scribe_svc::vector::{ChromaIndex, VectorIndex};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scribe-svc")]
#[command(about = "Meeting-minutes synchronization and retrieval microservice")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe_svc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate().context("Invalid configuration")?;

    info!("Starting scribe-svc on port {}", config.port);

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let gateway: Arc<dyn ModelGateway> = Arc::new(
        OpenAiGateway::new(config.gateway.clone()).context("Failed to build model gateway")?,
    );

    let vector: Option<Arc<dyn VectorIndex>> = match &config.vector.url {
        Some(url) => {
            info!("Vector index at {}", url);
            Some(Arc::new(
                ChromaIndex::new(url, gateway.clone()).context("Failed to build vector index")?,
            ))
        }
        None => {
            warn!("No vector store configured; document queries will fail");
            None
        }
    };

    let transcript = TranscriptStore::new(pool.clone());
    let history = ChatHistoryStore::new(pool);
    let temperature = config.gateway.temperature;

    let qna = Arc::new(QueryPipeline::new(
        gateway.clone(),
        vector.clone(),
        history.clone(),
        temperature,
        config.retrieval.k,
    ));

    let scheduler = Scheduler::spawn(WorkerDeps {
        transcript: transcript.clone(),
        history: history.clone(),
        tracker: MinuteTracker::new(gateway.clone(), transcript.clone(), vector.clone(), temperature),
        qna: qna.clone(),
        summarizer: Summarizer::new(gateway, transcript.clone(), temperature),
    });

    let ctx = AppContext {
        scheduler: scheduler.clone(),
        transcript,
        history,
        qna,
        vector,
    };

    let app = api::build_router(ctx);
    api::run(config.port, app, shutdown_signal()).await?;

    // Fail anything still queued before the process exits
    scheduler.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
