//! [`SqliteStore`], the SQLite implementation of [`VoucherStore`].

use std::path::Path;

use chrono::Utc;
use jobwork_core::{
  build_voucher_update,
  event::NewEvent,
  store::{
    BACKUP_VERSION, Backup, ImportReport, RepairOutcome, RerunReport, VoucherQuery,
    VoucherStore,
  },
  update::{UpdateOutcome, open_voucher},
  voucher::{NewVoucher, Voucher},
  voucher_no::{FinancialYear, VoucherNo},
};
use rusqlite::OptionalExtension as _;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    EncodedVoucher, RawVoucher, StoredVoucher, VOUCHER_COLUMNS, decode_count,
    decode_uuid, encode_count, encode_status, encode_uuid,
  },
  schema::{NEXT_SEQ, RAISE_SEQ, SCHEMA},
};

/// Prefix for voucher numbers unless configured otherwise.
pub const DEFAULT_VOUCHER_PREFIX: &str = "JW";

/// How many times a read-modify-write is attempted before giving up.
pub const DEFAULT_MAX_WRITE_RETRIES: u32 = 5;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A voucher store backed by a single SQLite file.
///
/// Clones share one connection thread.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:   tokio_rusqlite::Connection,
  voucher_prefix:    String,
  max_write_retries: u32,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      voucher_prefix: DEFAULT_VOUCHER_PREFIX.to_owned(),
      max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
    })
  }

  /// Use `prefix` for newly allocated voucher numbers.
  pub fn with_voucher_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.voucher_prefix = prefix.into();
    self
  }

  /// Attempt each read-modify-write at most `retries` times (minimum 1).
  pub fn with_max_write_retries(mut self, retries: u32) -> Self {
    self.max_write_retries = retries.max(1);
    self
  }

  /// Read one voucher with its revision.
  pub(crate) async fn load(&self, id: Uuid) -> Result<Option<StoredVoucher>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawVoucher> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE voucher_id = ?1"),
            rusqlite::params![id_str],
            RawVoucher::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawVoucher::into_stored).transpose()
  }

  /// Write `voucher` back if the row is still at `revision`.
  ///
  /// Returns `false` when another writer got there first; the caller should
  /// re-read and recompute.
  pub(crate) async fn write_if_current(
    &self,
    voucher: &Voucher,
    revision: u64,
  ) -> Result<bool> {
    let encoded  = EncodedVoucher::new(voucher)?;
    let expected = encode_count(revision);

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let [d, r, f, m, da, dw, a] = encoded.counters;
        let changed = tx.execute(
          "UPDATE vouchers SET
             voucher_status = ?2, events = ?3,
             total_dispatched = ?4, total_received = ?5, total_forwarded = ?6,
             total_missing_on_arrival = ?7, total_damaged_on_arrival = ?8,
             total_damaged_after_work = ?9, admin_received_quantity = ?10,
             updated_at = ?11, revision = revision + 1
           WHERE voucher_id = ?1 AND revision = ?12",
          rusqlite::params![
            encoded.voucher_id,
            encoded.voucher_status,
            encoded.events,
            d,
            r,
            f,
            m,
            da,
            dw,
            a,
            encoded.updated_at,
            expected,
          ],
        )?;
        if changed == 1 {
          insert_parties(&tx, &encoded.voucher_id, &encoded.parties)?;
        }
        tx.commit()?;
        Ok(changed == 1)
      })
      .await?;

    Ok(written)
  }

  async fn voucher_ids(&self) -> Result<Vec<Uuid>> {
    let raws: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT voucher_id FROM vouchers ORDER BY created_at, voucher_no")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    raws.iter().map(|s| decode_uuid(s)).collect()
  }

  /// Undecoded rows matching `query`, newest first.
  async fn query_rows(&self, query: &VoucherQuery) -> Result<Vec<RawVoucher>> {
    let status     = query.status.map(encode_status);
    let created_by = query.created_by.clone();
    let party      = query.party.clone();
    let limit_val  = query.limit.map(|l| l as i64).unwrap_or(-1);
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VOUCHER_COLUMNS}
           FROM vouchers v
           WHERE (?1 IS NULL OR v.voucher_status = ?1)
             AND (?2 IS NULL OR v.created_by_user_id = ?2)
             AND (?3 IS NULL OR EXISTS (
                   SELECT 1 FROM voucher_parties p
                   WHERE p.voucher_id = v.voucher_id AND p.party_id = ?3))
           ORDER BY v.created_at DESC, v.voucher_no DESC
           LIMIT ?4 OFFSET ?5"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![status, created_by, party, limit_val, offset_val],
            RawVoucher::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws)
  }

  fn attempts(&self) -> u32 { self.max_write_retries.max(1) }
}

// ─── Row helpers (run on the database thread) ────────────────────────────────

fn to_sql_failure(e: serde_json::Error) -> rusqlite::Error {
  rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

/// Insert a voucher row unless its id or number is already taken. Returns the
/// number of rows written.
fn insert_voucher(
  conn: &rusqlite::Connection,
  v: &EncodedVoucher,
  revision: i64,
) -> rusqlite::Result<usize> {
  let [d, r, f, m, da, dw, a] = v.counters;
  conn.execute(
    "INSERT OR IGNORE INTO vouchers (
       voucher_id, voucher_no, voucher_status, created_at, created_by_user_id,
       item_details, events,
       total_dispatched, total_received, total_forwarded,
       total_missing_on_arrival, total_damaged_on_arrival,
       total_damaged_after_work, admin_received_quantity,
       updated_at, revision
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    rusqlite::params![
      v.voucher_id,
      v.voucher_no,
      v.voucher_status,
      v.created_at,
      v.created_by_user_id,
      v.item_details,
      v.events,
      d,
      r,
      f,
      m,
      da,
      dw,
      a,
      v.updated_at,
      revision,
    ],
  )
}

fn insert_parties(
  conn: &rusqlite::Connection,
  voucher_id: &str,
  parties: &[String],
) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(
    "INSERT OR IGNORE INTO voucher_parties (voucher_id, party_id) VALUES (?1, ?2)",
  )?;
  for party in parties {
    stmt.execute(rusqlite::params![voucher_id, party])?;
  }
  Ok(())
}

// ─── VoucherStore impl ───────────────────────────────────────────────────────

impl VoucherStore for SqliteStore {
  type Error = Error;

  // ── Vouchers ──────────────────────────────────────────────────────────────

  async fn create_voucher(&self, input: NewVoucher) -> Result<Voucher> {
    let voucher_id = Uuid::new_v4();
    let now        = Utc::now();
    let year       = FinancialYear::containing(now.date_naive());
    let prefix     = self.voucher_prefix.clone();

    // Number allocation and insert share one transaction so a rejected
    // dispatch does not burn a sequence number.
    let created: Result<Voucher, jobwork_core::Error> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let seq: i64 = tx.query_row(
          NEXT_SEQ,
          rusqlite::params![prefix, year.to_string()],
          |row| row.get(0),
        )?;
        let voucher_no = VoucherNo::new(prefix, year, u32::try_from(seq).unwrap_or(u32::MAX));

        let voucher = match open_voucher(voucher_id, &voucher_no, input, now) {
          Ok(v) => v,
          Err(e) => return Ok(Err(e)),
        };
        let encoded = EncodedVoucher::new(&voucher).map_err(to_sql_failure)?;
        insert_voucher(&tx, &encoded, 0)?;
        insert_parties(&tx, &encoded.voucher_id, &encoded.parties)?;
        tx.commit()?;
        Ok(Ok(voucher))
      })
      .await?;

    let voucher = created?;
    info!(
      voucher_id = %voucher.voucher_id,
      voucher_no = %voucher.voucher_no,
      quantity = voucher.totals.total_dispatched,
      "voucher dispatched"
    );
    Ok(voucher)
  }

  async fn get_voucher(&self, id: Uuid) -> Result<Option<Voucher>> {
    Ok(self.load(id).await?.map(|s| s.voucher))
  }

  async fn get_voucher_by_no(&self, voucher_no: &str) -> Result<Option<Voucher>> {
    let no = voucher_no.to_owned();

    let raw: Option<RawVoucher> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE voucher_no = ?1"),
            rusqlite::params![no],
            RawVoucher::from_row,
          )
          .optional()?)
      })
      .await?;

    raw
      .map(RawVoucher::into_stored)
      .transpose()
      .map(|s| s.map(|s| s.voucher))
  }

  async fn list_vouchers(&self, query: &VoucherQuery) -> Result<Vec<Voucher>> {
    self
      .query_rows(query)
      .await?
      .into_iter()
      .map(|raw| raw.into_stored().map(|s| s.voucher))
      .collect()
  }

  async fn revision(&self, id: Uuid) -> Result<Option<u64>> {
    let id_str = encode_uuid(id);

    let rev: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT revision FROM vouchers WHERE voucher_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(rev.map(decode_count))
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn append_event(
    &self,
    id: Uuid,
    input: NewEvent,
    expected_revision: Option<u64>,
  ) -> Result<Voucher> {
    let attempts = self.attempts();

    for attempt in 1..=attempts {
      let stored = self.load(id).await?.ok_or(Error::VoucherNotFound(id))?;
      if let Some(expected) = expected_revision
        && expected != stored.revision
      {
        return Err(Error::RevisionMismatch {
          voucher_id: id,
          expected,
          actual: stored.revision,
        });
      }

      let now   = Utc::now();
      let event = input.clone().into_event(stored.voucher.next_event_id(), now);
      let event_type = event.event_type;
      let update = match build_voucher_update(&stored.voucher, Some(event), now)? {
        UpdateOutcome::Updated(update) => update,
        UpdateOutcome::Unchanged => return Ok(stored.voucher),
      };

      let from    = stored.voucher.voucher_status;
      let voucher = update.apply_to(stored.voucher);
      if self.write_if_current(&voucher, stored.revision).await? {
        info!(
          voucher_no = %voucher.voucher_no,
          event = %event_type,
          from = %from,
          to = %voucher.voucher_status,
          "event appended"
        );
        return Ok(voucher);
      }
      warn!(voucher_id = %id, attempt, "concurrent write on voucher; retrying");
    }

    Err(Error::WriteConflict { voucher_id: id, attempts })
  }

  // ── Repair ────────────────────────────────────────────────────────────────

  async fn repair_status(&self, id: Uuid) -> Result<RepairOutcome> {
    let attempts = self.attempts();

    for attempt in 1..=attempts {
      let stored = self.load(id).await?.ok_or(Error::VoucherNotFound(id))?;
      let update = match build_voucher_update(&stored.voucher, None, Utc::now())? {
        UpdateOutcome::Unchanged => return Ok(RepairOutcome::NoEvents),
        UpdateOutcome::Updated(update) => update,
      };

      let from = stored.voucher.voucher_status;
      if !update.changes(&stored.voucher) {
        debug!(voucher_no = %stored.voucher.voucher_no, "voucher already consistent");
        return Ok(RepairOutcome::Consistent { status: from });
      }

      let to      = update.voucher_status;
      let voucher = update.apply_to(stored.voucher);
      if self.write_if_current(&voucher, stored.revision).await? {
        info!(voucher_no = %voucher.voucher_no, from = %from, to = %to, "voucher repaired");
        return Ok(RepairOutcome::Repaired { from, to });
      }
      warn!(voucher_id = %id, attempt, "concurrent write during repair; retrying");
    }

    Err(Error::WriteConflict { voucher_id: id, attempts })
  }

  async fn rerun_all_statuses(&self) -> Result<RerunReport> {
    let mut report = RerunReport::default();

    for id in self.voucher_ids().await? {
      match self.repair_status(id).await {
        Ok(outcome) => report.tally(outcome),
        Err(e) => {
          warn!(voucher_id = %id, error = %e, "status rerun failed for voucher");
          report.fail(id, e);
        }
      }
    }

    info!(
      examined = report.examined,
      repaired = report.repaired,
      failed = report.failed.len(),
      "status rerun finished"
    );
    Ok(report)
  }

  // ── Backup ────────────────────────────────────────────────────────────────

  async fn export_backup(&self) -> Result<Backup> {
    let mut vouchers = Vec::new();
    for raw in self.query_rows(&VoucherQuery::default()).await? {
      let voucher_id = raw.voucher_id.clone();
      match raw.into_stored() {
        Ok(stored) => vouchers.push(stored.voucher),
        Err(e) => warn!(%voucher_id, error = %e, "skipping undecodable voucher in backup"),
      }
    }
    Ok(Backup {
      version: BACKUP_VERSION,
      exported_at: Utc::now(),
      vouchers,
    })
  }

  async fn import_backup(&self, backup: Backup) -> Result<ImportReport> {
    if backup.version != BACKUP_VERSION {
      return Err(Error::UnsupportedBackupVersion(backup.version));
    }

    let rows: Vec<(EncodedVoucher, Option<VoucherNo>)> = backup
      .vouchers
      .iter()
      .map(|v| Ok((EncodedVoucher::new(v)?, v.voucher_no.parse().ok())))
      .collect::<Result<_>>()?;
    let total = rows.len();

    let imported: usize = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut imported = 0;
        for (v, no) in &rows {
          if insert_voucher(&tx, v, 0)? == 0 {
            continue;
          }
          imported += 1;
          insert_parties(&tx, &v.voucher_id, &v.parties)?;
          // Keep future numbers clear of the imported ones.
          if let Some(no) = no {
            tx.execute(
              RAISE_SEQ,
              rusqlite::params![no.prefix, no.year.to_string(), no.seq],
            )?;
          }
        }
        tx.commit()?;
        Ok(imported)
      })
      .await?;

    let report = ImportReport { imported, skipped: total - imported };
    info!(imported = report.imported, skipped = report.skipped, "backup imported");
    Ok(report)
  }
}
