//! jobwork server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and either serves the JSON API over HTTP or runs one
//! maintenance command against the store.
//!
//! ```text
//! jobwork                       # same as `jobwork serve`
//! jobwork export backup.json
//! jobwork import backup.json
//! jobwork rerun-status
//! ```

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use jobwork_core::store::{Backup, VoucherStore};
use jobwork_server::ServerConfig;
use jobwork_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Job-work voucher server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Write every voucher to a JSON backup file.
  Export { path: PathBuf },
  /// Load a JSON backup; vouchers already present are skipped.
  Import { path: PathBuf },
  /// Re-derive status and counters of every voucher from its event log.
  RerunStatus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store = server_cfg
    .open_store()
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(&server_cfg, store).await,
    Command::Export { path } => export(&store, path).await,
    Command::Import { path } => import(&store, path).await,
    Command::RerunStatus => rerun_status(&store).await,
  }
}

async fn serve(server_cfg: &ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let app     = jobwork_server::app(Arc::new(store));
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn export(store: &SqliteStore, path: PathBuf) -> anyhow::Result<()> {
  let backup = store.export_backup().await.context("failed to read vouchers")?;
  let json   = serde_json::to_vec_pretty(&backup).context("failed to encode backup")?;
  fs::write(&path, json).with_context(|| format!("failed to write {path:?}"))?;

  tracing::info!(vouchers = backup.vouchers.len(), "exported backup to {path:?}");
  Ok(())
}

async fn import(store: &SqliteStore, path: PathBuf) -> anyhow::Result<()> {
  let bytes = fs::read(&path).with_context(|| format!("failed to read {path:?}"))?;
  let backup: Backup =
    serde_json::from_slice(&bytes).with_context(|| format!("{path:?} is not a backup"))?;

  let report = store.import_backup(backup).await.context("import failed")?;
  tracing::info!(
    imported = report.imported,
    skipped = report.skipped,
    "imported backup from {path:?}"
  );
  Ok(())
}

async fn rerun_status(store: &SqliteStore) -> anyhow::Result<()> {
  let report = store.rerun_all_statuses().await.context("status rerun failed")?;
  for failure in &report.failed {
    tracing::warn!(voucher_id = %failure.voucher_id, "{}", failure.error);
  }
  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}
