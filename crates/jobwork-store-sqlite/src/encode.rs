//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (nanosecond
//! precision, `Z` suffix) so that they sort lexically. Item details and the
//! event log are stored as compact JSON. UUIDs are hyphenated lowercase.

use chrono::{DateTime, SecondsFormat, Utc};
use jobwork_core::{
  event::VoucherEvent,
  totals::Totals,
  voucher::{ItemDetails, Voucher, VoucherStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── VoucherStatus ───────────────────────────────────────────────────────────

pub fn encode_status(s: VoucherStatus) -> String { s.to_string() }

/// Accepts legacy spellings as well as the canonical snake_case token.
pub fn decode_status(s: &str) -> Result<VoucherStatus> {
  VoucherStatus::parse_legacy(s).ok_or_else(|| Error::UnknownStatus(s.to_owned()))
}

// ─── Counts ──────────────────────────────────────────────────────────────────

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

/// Negative values can only come from hand-edited rows; treat them as zero.
pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawVoucher::from_row`].
pub const VOUCHER_COLUMNS: &str = "
  voucher_id, voucher_no, voucher_status, created_at, created_by_user_id,
  item_details, events,
  total_dispatched, total_received, total_forwarded,
  total_missing_on_arrival, total_damaged_on_arrival,
  total_damaged_after_work, admin_received_quantity,
  updated_at, revision";

/// A voucher together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct StoredVoucher {
  pub voucher:  Voucher,
  pub revision: u64,
}

/// Raw values read directly from a `vouchers` row.
pub struct RawVoucher {
  pub voucher_id:         String,
  pub voucher_no:         String,
  pub voucher_status:     String,
  pub created_at:         String,
  pub created_by_user_id: String,
  pub item_details:       String,
  pub events:             String,
  pub counters:           [i64; 7],
  pub updated_at:         String,
  pub revision:           i64,
}

impl RawVoucher {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      voucher_id:         row.get(0)?,
      voucher_no:         row.get(1)?,
      voucher_status:     row.get(2)?,
      created_at:         row.get(3)?,
      created_by_user_id: row.get(4)?,
      item_details:       row.get(5)?,
      events:             row.get(6)?,
      counters:           [
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
      ],
      updated_at:         row.get(14)?,
      revision:           row.get(15)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredVoucher> {
    let item_details: ItemDetails = serde_json::from_str(&self.item_details)?;
    let events: Vec<VoucherEvent> = serde_json::from_str(&self.events)?;
    let [d, r, f, m, da, dw, a] = self.counters.map(decode_count);

    let voucher = Voucher {
      voucher_id: decode_uuid(&self.voucher_id)?,
      voucher_no: self.voucher_no,
      voucher_status: decode_status(&self.voucher_status)?,
      created_at: decode_dt(&self.created_at)?,
      created_by_user_id: self.created_by_user_id,
      item_details,
      events,
      totals: Totals {
        total_dispatched:         d,
        total_received:           r,
        total_forwarded:          f,
        total_missing_on_arrival: m,
        total_damaged_on_arrival: da,
        total_damaged_after_work: dw,
        admin_received_quantity:  a,
      },
      updated_at: decode_dt(&self.updated_at)?,
    };

    Ok(StoredVoucher { voucher, revision: decode_count(self.revision) })
  }
}

/// Column values for writing a voucher, prepared outside the database thread.
pub struct EncodedVoucher {
  pub voucher_id:         String,
  pub voucher_no:         String,
  pub voucher_status:     String,
  pub created_at:         String,
  pub created_by_user_id: String,
  pub item_details:       String,
  pub events:             String,
  pub counters:           [i64; 7],
  pub updated_at:         String,
  pub parties:            Vec<String>,
}

impl EncodedVoucher {
  pub fn new(v: &Voucher) -> serde_json::Result<Self> {
    let t = &v.totals;
    Ok(Self {
      voucher_id:         encode_uuid(v.voucher_id),
      voucher_no:         v.voucher_no.clone(),
      voucher_status:     encode_status(v.voucher_status),
      created_at:         encode_dt(v.created_at),
      created_by_user_id: v.created_by_user_id.clone(),
      item_details:       serde_json::to_string(&v.item_details)?,
      events:             serde_json::to_string(&v.events)?,
      counters:           [
        t.total_dispatched,
        t.total_received,
        t.total_forwarded,
        t.total_missing_on_arrival,
        t.total_damaged_on_arrival,
        t.total_damaged_after_work,
        t.admin_received_quantity,
      ]
      .map(encode_count),
      updated_at:         encode_dt(v.updated_at),
      parties:            v.parties().into_iter().map(str::to_owned).collect(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_lossless() {
    let dt = DateTime::parse_from_rfc3339("2024-06-01T09:00:00.000000001Z")
      .unwrap()
      .with_timezone(&Utc);
    let s = encode_dt(dt);
    assert_eq!(s, "2024-06-01T09:00:00.000000001Z");
    assert_eq!(decode_dt(&s).unwrap(), dt);

    let whole = DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    assert_eq!(encode_dt(whole).len(), s.len());
  }

  #[test]
  fn status_decoding_is_lenient() {
    assert_eq!(decode_status("Received").unwrap(), VoucherStatus::Received);
    assert_eq!(
      decode_status(&encode_status(VoucherStatus::DispatchedToAdmin)).unwrap(),
      VoucherStatus::DispatchedToAdmin
    );
    assert!(matches!(decode_status("lost"), Err(Error::UnknownStatus(_))));
  }

  #[test]
  fn counts_clamp() {
    assert_eq!(decode_count(-5), 0);
    assert_eq!(encode_count(u64::MAX), i64::MAX);
  }
}
