//! Error type for `jobwork-store-sqlite`.

use jobwork_core::store::{ClassifyError, StoreErrorKind};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] jobwork_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown voucher status: {0:?}")]
  UnknownStatus(String),

  #[error("voucher not found: {0}")]
  VoucherNotFound(Uuid),

  #[error("voucher {voucher_id} is at revision {actual}, not {expected}")]
  RevisionMismatch {
    voucher_id: Uuid,
    expected:   u64,
    actual:     u64,
  },

  #[error("voucher {voucher_id} kept changing underneath us ({attempts} attempts)")]
  WriteConflict { voucher_id: Uuid, attempts: u32 },

  #[error("unsupported backup version {0}")]
  UnsupportedBackupVersion(u32),
}

impl ClassifyError for Error {
  fn kind(&self) -> StoreErrorKind {
    match self {
      Error::Core(e) if e.is_rejection() => StoreErrorKind::Rejected,
      Error::VoucherNotFound(_) => StoreErrorKind::NotFound,
      Error::RevisionMismatch { .. } => StoreErrorKind::PreconditionFailed,
      Error::WriteConflict { .. } => StoreErrorKind::Conflict,
      Error::UnsupportedBackupVersion(_) => StoreErrorKind::Rejected,
      _ => StoreErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
