use std::sync::Arc;

use anyhow::Context;

use interview_ingest::config::{AnalysisConfig, OauthConfig, PollerConfig};
use interview_ingest::credentials::GoogleTokenResolver;
use interview_ingest::dispatch::HttpDispatcher;
use interview_ingest::mailbox::GmailClient;
use interview_ingest::poller::{InterviewPoller, PollerDeps, spawn_poll_ticker};
use interview_ingest::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let poller_config = PollerConfig::from_env();
    let oauth_config = OauthConfig::from_env().context("OAuth configuration")?;
    let analysis_config = AnalysisConfig::from_env().context("Analysis configuration")?;

    let db_path =
        std::env::var("INGEST_DB_PATH").unwrap_or_else(|_| "./data/interview-ingest.db".to_string());

    eprintln!("📬 Interview Ingest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!("   Analysis endpoint: {}", analysis_config.endpoint_url);
    eprintln!(
        "   Polling every {}s (search cap {}, {} tick retries)\n",
        poller_config.poll_interval_secs, poller_config.search_cap, poller_config.tick_retries
    );

    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .context("Failed to open database")?,
    );

    let deps = PollerDeps {
        store: Arc::clone(&store),
        resolver: Arc::new(GoogleTokenResolver::new(Arc::clone(&store), oauth_config)),
        mailbox: Arc::new(GmailClient::new()),
        dispatcher: Arc::new(HttpDispatcher::new(Arc::clone(&store), analysis_config)),
    };

    let poller = Arc::new(InterviewPoller::new(deps, poller_config));
    let (handle, shutdown) = spawn_poll_ticker(poller);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    handle.abort();

    Ok(())
}
