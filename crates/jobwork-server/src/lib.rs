//! HTTP server wiring for the job-work voucher service.
//!
//! Loads [`ServerConfig`], opens the SQLite store, and mounts
//! [`jobwork_api::api_router`] under `/api` with request tracing.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use jobwork_core::store::VoucherStore;
use jobwork_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `JOBWORK_*` environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path:        PathBuf,
  /// First component of newly allocated voucher numbers.
  pub voucher_prefix:    String,
  pub max_write_retries: u32,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "127.0.0.1".to_owned(),
      port:              8080,
      store_path:        PathBuf::from("jobwork.db"),
      voucher_prefix:    "JW".to_owned(),
      max_write_retries: 5,
    }
  }
}

impl ServerConfig {
  /// Read `path` (missing is fine) layered under `JOBWORK_*` variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    Self::from_source(config::File::from(path).required(false))
  }

  fn from_source<T>(source: T) -> Result<Self, config::ConfigError>
  where
    T: config::Source + Send + Sync + 'static,
  {
    config::Config::builder()
      .add_source(source)
      .add_source(config::Environment::with_prefix("JOBWORK"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// Open the configured store with its numbering and retry settings.
  pub async fn open_store(&self) -> jobwork_store_sqlite::Result<SqliteStore> {
    let store = SqliteStore::open(expand_tilde(&self.store_path)).await?;
    Ok(
      store
        .with_voucher_prefix(self.voucher_prefix.clone())
        .with_max_write_retries(self.max_write_retries),
    )
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: the JSON API under `/api`, traced.
pub fn app<S>(store: Arc<S>) -> Router
where
  S: VoucherStore + 'static,
{
  Router::new()
    .nest("/api", jobwork_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
