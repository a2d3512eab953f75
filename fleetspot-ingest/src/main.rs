//! fleetspot-ingest - Vehicle sighting intake service
//!
//! Receives photo sightings over SMS/MMS, walks each sender through a short
//! conversation until plate and location are known, records the sighting,
//! and publishes confirmed sightings in batches.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetspot_common::config::{resolve_root_folder, ServiceConfig, TwilioCredentials};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetspot_ingest::db::init_database;
use fleetspot_ingest::services::{
    BatchAdmissionController, BatchPublisher, DryRunPoster, HttpMediaFetcher, LocalImageStore,
    NoopNotifier, Notifier, PlateValidator, TwilioNotifier,
};
use fleetspot_ingest::session::{Collaborators, ConversationEngine};
use fleetspot_ingest::{AppState, IngestError};

#[derive(Parser, Debug)]
#[command(name = "fleetspot-ingest")]
#[command(about = "Crowdsourced vehicle sighting intake service")]
#[command(version)]
struct Cli {
    /// Root folder holding the database, images and fleetspot.toml
    #[arg(short, long)]
    root: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Print batch queue statistics as JSON
    Stats,
    /// Publish queued sightings once, if the admission controller allows
    Publish,
    /// Search the registry; `*` matches any one character
    Search { pattern: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let root_folder = resolve_root_folder(cli.root.as_deref());
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    let config = ServiceConfig::load(&root_folder)?;

    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let db = init_database(&db_path).await?;

    let images = Arc::new(LocalImageStore::new(config.image_path(&root_folder)));
    let publisher = Arc::new(
        BatchPublisher::new(
            db.clone(),
            BatchAdmissionController::new(config.batch_size, config.batch_max_age_hours),
            Arc::new(DryRunPoster),
            images.clone(),
        )
        .with_progress_total(config.progress_total_override),
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&root_folder, &config, db, images, publisher).await,
        Command::Stats => {
            let stats = publisher.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Publish => {
            let posts = publisher.drain().await?;
            info!("Published {} batch post(s)", posts);
            Ok(())
        }
        Command::Search { pattern } => {
            let entries = PlateValidator::new(db).wildcard_search(&pattern).await?;
            if entries.is_empty() {
                return Err(IngestError::RegistryMiss(pattern).into());
            }
            for entry in &entries {
                println!(
                    "{}\t{}\t{}",
                    entry.plate,
                    entry.vehicle_id.as_deref().unwrap_or("-"),
                    entry.owner_name.as_deref().unwrap_or("-")
                );
            }
            info!("{} match(es) for {}", entries.len(), pattern);
            Ok(())
        }
    }
}

async fn serve(
    root_folder: &Path,
    config: &ServiceConfig,
    db: sqlx::SqlitePool,
    images: Arc<LocalImageStore>,
    publisher: Arc<BatchPublisher>,
) -> Result<()> {
    info!("Starting fleetspot-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", root_folder.display());
    info!("Images: {}", images.dir().display());

    // Media download needs credentials; fail before accepting traffic
    let credentials = TwilioCredentials::from_env().context("Messaging credentials")?;

    let notifier: Arc<dyn Notifier> = match &credentials.phone_number {
        Some(number) => Arc::new(TwilioNotifier::new(
            db.clone(),
            &credentials,
            number.clone(),
            config.admin_contributor_id,
        )?),
        None => {
            info!("TWILIO_PHONE_NUMBER not set, admin notifications disabled");
            Arc::new(NoopNotifier)
        }
    };

    let collaborators = Collaborators {
        fetcher: Arc::new(HttpMediaFetcher::new(&credentials)?),
        images,
        notifier,
        publisher: publisher.clone(),
    };
    let engine = Arc::new(ConversationEngine::new(db.clone(), collaborators, config));

    let app = fleetspot_ingest::build_router(AppState::new(db, engine.clone(), publisher));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Waiting for background work to finish");
    engine.wait_for_background().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
