//! The `VoucherStore` trait and supporting query and report types.
//!
//! The trait is implemented by storage backends (e.g. `jobwork-store-sqlite`).
//! Higher layers (`jobwork-api`, `jobwork-server`) depend on this
//! abstraction, not on any concrete backend.
//!
//! Every write is a read-modify-write of one voucher document: read it, run
//! [`crate::update::build_voucher_update`], write it back only if nobody else
//! wrote in between. Backends own that cycle, including retries.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  event::NewEvent,
  voucher::{NewVoucher, Voucher, VoucherStatus},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`VoucherStore::list_vouchers`].
#[derive(Debug, Clone, Default)]
pub struct VoucherQuery {
  pub status:     Option<VoucherStatus>,
  /// Restrict to vouchers created by this admin.
  pub created_by: Option<String>,
  /// Restrict to vouchers on which this party appears in any role.
  pub party:      Option<String>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What [`VoucherStore::repair_status`] did to one voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
  /// The voucher has no events; nothing to derive.
  NoEvents,
  /// Stored status and counters already matched the log.
  Consistent { status: VoucherStatus },
  /// Stored fields were rewritten.
  Repaired {
    from: VoucherStatus,
    to:   VoucherStatus,
  },
}

/// Summary of [`VoucherStore::rerun_all_statuses`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunReport {
  pub examined:   usize,
  pub repaired:   usize,
  pub consistent: usize,
  pub no_events:  usize,
  /// Vouchers whose repair failed, with the error message.
  pub failed:     Vec<RerunFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunFailure {
  pub voucher_id: Uuid,
  pub error:      String,
}

impl RerunReport {
  pub fn tally(&mut self, outcome: RepairOutcome) {
    self.examined += 1;
    match outcome {
      RepairOutcome::NoEvents => self.no_events += 1,
      RepairOutcome::Consistent { .. } => self.consistent += 1,
      RepairOutcome::Repaired { .. } => self.repaired += 1,
    }
  }

  pub fn fail(&mut self, voucher_id: Uuid, error: impl ToString) {
    self.examined += 1;
    self.failed.push(RerunFailure { voucher_id, error: error.to_string() });
  }
}

// ─── Backup ──────────────────────────────────────────────────────────────────

/// Current version of the [`Backup`] document layout.
pub const BACKUP_VERSION: u32 = 1;

/// A full JSON export of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
  pub version:     u32,
  pub exported_at: DateTime<Utc>,
  pub vouchers:    Vec<Voucher>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
  pub imported: usize,
  /// Vouchers whose id already existed in the store.
  pub skipped:  usize,
}

// ─── Error classification ────────────────────────────────────────────────────

/// Coarse classification of a store error, used by outer layers to pick a
/// response without knowing the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
  NotFound,
  /// The request was an invalid transition or malformed input.
  Rejected,
  /// Concurrent writers kept winning; the caller may retry.
  Conflict,
  /// The caller's expected revision is stale.
  PreconditionFailed,
  Internal,
}

pub trait ClassifyError {
  fn kind(&self) -> StoreErrorKind;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a voucher store backend.
///
/// Event logs are append-only; there is no operation that edits or removes
/// an event.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait VoucherStore: Send + Sync {
  type Error: std::error::Error + ClassifyError + Send + Sync + 'static;

  // ── Vouchers ──────────────────────────────────────────────────────────

  /// Allocate a voucher number and persist a new voucher with its initial
  /// dispatch event.
  fn create_voucher(
    &self,
    input: NewVoucher,
  ) -> impl Future<Output = Result<Voucher, Self::Error>> + Send + '_;

  /// Retrieve a voucher by id. Returns `None` if not found.
  fn get_voucher(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Voucher>, Self::Error>> + Send + '_;

  /// Retrieve a voucher by its human-readable number.
  fn get_voucher_by_no<'a>(
    &'a self,
    voucher_no: &'a str,
  ) -> impl Future<Output = Result<Option<Voucher>, Self::Error>> + Send + 'a;

  /// List vouchers matching `query`, newest first.
  fn list_vouchers<'a>(
    &'a self,
    query: &'a VoucherQuery,
  ) -> impl Future<Output = Result<Vec<Voucher>, Self::Error>> + Send + 'a;

  /// Current write revision of a voucher; bumps on every successful write.
  fn revision(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Append an event and persist the recomputed status and counters.
  ///
  /// With `expected_revision`, fails with a precondition error if the voucher
  /// has been written since the caller read it.
  fn append_event(
    &self,
    id: Uuid,
    input: NewEvent,
    expected_revision: Option<u64>,
  ) -> impl Future<Output = Result<Voucher, Self::Error>> + Send + '_;

  // ── Repair ────────────────────────────────────────────────────────────

  /// Re-derive status and counters of one voucher from its log.
  fn repair_status(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<RepairOutcome, Self::Error>> + Send + '_;

  /// Run [`Self::repair_status`] over every voucher, each in its own write
  /// cycle. Individual failures are reported, not propagated.
  fn rerun_all_statuses(
    &self,
  ) -> impl Future<Output = Result<RerunReport, Self::Error>> + Send + '_;

  // ── Backup ────────────────────────────────────────────────────────────

  fn export_backup(
    &self,
  ) -> impl Future<Output = Result<Backup, Self::Error>> + Send + '_;

  /// Insert every voucher of `backup` whose id is not already present.
  fn import_backup(
    &self,
    backup: Backup,
  ) -> impl Future<Output = Result<ImportReport, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rerun_report_counts_outcomes() {
    let mut report = RerunReport::default();
    report.tally(RepairOutcome::NoEvents);
    report.tally(RepairOutcome::Consistent { status: VoucherStatus::Received });
    report.tally(RepairOutcome::Repaired {
      from: VoucherStatus::Completed,
      to:   VoucherStatus::Received,
    });
    report.fail(Uuid::nil(), "boom");

    assert_eq!(report.examined, 4);
    assert_eq!((report.no_events, report.consistent, report.repaired), (1, 1, 1));
    assert_eq!(report.failed[0].error, "boom");
  }

  #[test]
  fn repair_outcome_is_tagged() {
    let json = serde_json::to_value(RepairOutcome::Repaired {
      from: VoucherStatus::Completed,
      to:   VoucherStatus::PartiallyForwarded,
    })
    .unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "outcome": "repaired", "from": "completed", "to": "partially_forwarded" })
    );
  }
}
