//! SafeDB API - Guarded SQL Execution Layer
//!
//! Boots the HTTP service: statements submitted to `/api/runs` go through
//! the safety pipeline, snapshots can be listed and rolled back, and
//! recorded read-only runs can be replayed.
//!
//! `safe-db-layer exec "<sql>"` instead runs a single statement from the
//! terminal, prompting the operator before anything above LOW risk.

use safe_db_layer::config::Settings;
use safe_db_layer::db::PostgresDatabase;
use safe_db_layer::pipeline::ConsoleConfirmer;
use safe_db_layer::routes::create_router;
use safe_db_layer::state::AppState;
use safe_db_layer::storage::FileStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting SafeDB - Guarded SQL Execution Layer...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Database is required; the pipeline has nothing to guard without it
    let db = match PostgresDatabase::connect(&settings.database).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("❌ FATAL: Failed to initialize database pool: {}", e);
            error!("DATABASE_URL (or DB_*) must be set and the database must be accessible");
            return Err(e.into());
        }
    };

    let snapshot_storage = Arc::new(FileStorage::new(&settings.storage.snapshot_dir));
    let run_storage = Arc::new(FileStorage::new(&settings.storage.runs_dir));
    info!(
        "🗂  Snapshots in {}, runs in {}",
        snapshot_storage.root().display(),
        run_storage.root().display()
    );
    info!(
        "🛡  Row escalation threshold {}, snapshot sample cap {}, snapshot failure policy {:?}",
        settings.safety.row_escalation_threshold,
        settings.safety.snapshot_sample_cap,
        settings.safety.snapshot_failure_policy
    );

    let state = Arc::new(AppState::new(db, snapshot_storage, run_storage, &settings.safety));

    if let Some(sql) = exec_statement_arg() {
        let confirmer = ConsoleConfirmer::stdio();
        let (run_id, summary) = state.orchestrator.submit(&sql, &confirmer).await?;
        println!("{}", summary.summary);
        info!("Run {} recorded", run_id);
        return Ok(());
    }

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("📚 API Endpoints:");
    info!("   POST /api/runs                      - Submit a statement");
    info!("   GET  /api/runs                      - List runs");
    info!("   GET  /api/runs/{{id}}                 - Get a run with its audit steps");
    info!("   POST /api/runs/{{id}}/replay          - Replay a read-only run");
    info!("   POST /api/snapshots                 - Create a snapshot");
    info!("   GET  /api/snapshots                 - List snapshots");
    info!("   GET  /api/snapshots/{{id}}            - Get a snapshot");
    info!("   POST /api/snapshots/{{id}}/rollback   - Restore a snapshot");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Statement text following an `exec` subcommand
fn exec_statement_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("exec") => Some(args.collect::<Vec<_>>().join(" ")),
        _ => None,
    }
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,safe_db_layer=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
