//! leadscope-server - the engagement ingestion and lead report API
//!
//! Binds the HTTP interface over the core library: snapshots come in on
//! `POST /engagement` (normal client or beacon, same body), franchisors
//! read `GET /engagement?lead_id=`.

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use leadscope_core::insight::InsightGenerator;
use leadscope_core::store::Database;
use leadscope_core::{logging, Config};

#[derive(Debug, Parser)]
#[command(name = "leadscope-server", about = "FDD engagement ingestion and lead insight API")]
struct Args {
    /// Bind address (overrides config)
    #[arg(long, env = "LEADSCOPE_BIND")]
    bind: Option<String>,

    /// Database path (overrides config and the XDG default)
    #[arg(long, env = "LEADSCOPE_DB")]
    database: Option<PathBuf>,

    /// Config file path (defaults to the XDG config location)
    #[arg(long, env = "LEADSCOPE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load config")?,
        None => Config::load().context("failed to load config")?,
    };

    let _logging_guard = logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = args
        .database
        .or_else(|| config.server.database_path.clone())
        .unwrap_or_else(Config::database_path);
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run migrations")?;
    info!(db_path = %db_path.display(), "Database ready");

    let insights = InsightGenerator::from_config(config.llm.as_ref());

    let ctx = api::AppContext {
        db: Arc::new(db),
        insights: Arc::new(insights),
    };

    let bind_addr = args.bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", bind_addr))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Engagement API listening");

    axum::serve(listener, api::router(ctx))
        .await
        .context("server error")?;

    Ok(())
}
