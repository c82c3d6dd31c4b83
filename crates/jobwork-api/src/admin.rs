//! Handlers for `/admin` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/admin/rerun-status` | Re-derives every voucher; returns [`RerunReport`] |
//! | `GET`  | `/admin/backup` | Full JSON [`Backup`] |
//! | `POST` | `/admin/backup` | Body: [`Backup`]; returns [`ImportReport`] |

use std::sync::Arc;

use axum::{Json, extract::State};
use jobwork_core::store::{Backup, ImportReport, RerunReport, VoucherStore};

use crate::error::ApiError;

/// `POST /admin/rerun-status`
pub async fn rerun_status<S: VoucherStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<RerunReport>, ApiError> {
  let report = store.rerun_all_statuses().await.map_err(ApiError::from_store)?;
  Ok(Json(report))
}

/// `GET /admin/backup`
pub async fn export<S: VoucherStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Backup>, ApiError> {
  let backup = store.export_backup().await.map_err(ApiError::from_store)?;
  Ok(Json(backup))
}

/// `POST /admin/backup`. Vouchers whose id already exists are skipped.
pub async fn import<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Json(backup): Json<Backup>,
) -> Result<Json<ImportReport>, ApiError> {
  let report = store.import_backup(backup).await.map_err(ApiError::from_store)?;
  Ok(Json(report))
}
