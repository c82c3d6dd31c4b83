//! A voucher is one dispatched batch of goods and its event log.
//!
//! The voucher document owns its events outright. The aggregate counters
//! stored next to them are a cache: they can always be re-derived by folding
//! `events` with [`crate::totals::compute_totals`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  event::{EventDetails, EventId, VoucherEvent},
  totals::Totals,
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a voucher, computed from its latest event.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum VoucherStatus {
  #[default]
  Dispatched,
  Received,
  Forwarded,
  PartiallyForwarded,
  DispatchedToAdmin,
  Completed,
}

impl VoucherStatus {
  /// Closed vouchers are hidden from work queues. Nothing prevents further
  /// events on them.
  pub fn is_closed(&self) -> bool { matches!(self, Self::Completed) }

  /// Parse a status token written by older clients, e.g. `"Received"`,
  /// `"received"` or `"Partially Forwarded"`.
  pub fn parse_legacy(s: &str) -> Option<Self> {
    s.trim().replace([' ', '-'], "_").parse().ok()
  }
}

// ─── Item ────────────────────────────────────────────────────────────────────

/// What was sent out on the voucher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDetails {
  pub item_name:        String,
  /// Opaque references to item photos; uploads are handled elsewhere.
  pub images:           Vec<String>,
  pub initial_quantity: u64,
  pub supplier_name:    Option<String>,
  pub supplier_price:   Option<Decimal>,
}

// ─── Voucher ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
  pub voucher_id:         Uuid,
  /// Human-readable number, see [`crate::voucher_no::VoucherNo`]. Kept as a
  /// string so that imported legacy numbers survive unchanged.
  pub voucher_no:         String,
  pub voucher_status:     VoucherStatus,
  pub created_at:         DateTime<Utc>,
  pub created_by_user_id: String,
  pub item_details:       ItemDetails,
  /// Append-only; insertion order is causal order.
  #[serde(default)]
  pub events:             Vec<VoucherEvent>,
  #[serde(flatten)]
  pub totals:             Totals,
  pub updated_at:         DateTime<Utc>,
}

impl Voucher {
  /// An empty voucher with no history yet. Use
  /// [`crate::update::open_voucher`] to create one with its dispatch.
  pub fn blank(
    voucher_id: Uuid,
    voucher_no: impl Into<String>,
    created_by_user_id: impl Into<String>,
    item_details: ItemDetails,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      voucher_id,
      voucher_no: voucher_no.into(),
      voucher_status: VoucherStatus::default(),
      created_at: now,
      created_by_user_id: created_by_user_id.into(),
      item_details,
      events: Vec::new(),
      totals: Totals::default(),
      updated_at: now,
    }
  }

  /// The admin who owns the voucher: the sender of its dispatch, or the
  /// creator when the log has no dispatch.
  pub fn admin_id(&self) -> &str {
    crate::totals::originator(&self.events).unwrap_or(&self.created_by_user_id)
  }

  pub fn latest_event(&self) -> Option<&VoucherEvent> { self.events.last() }

  pub fn event(&self, id: &EventId) -> Option<&VoucherEvent> {
    self.events.iter().find(|e| &e.event_id == id)
  }

  /// The id the next appended event will receive.
  pub fn next_event_id(&self) -> EventId {
    EventId::derive(&self.voucher_no, self.events.len() + 1)
  }

  /// Every party named on the voucher, in order of first appearance.
  pub fn parties(&self) -> Vec<&str> {
    let mut parties: Vec<&str> = vec![self.created_by_user_id.as_str()];
    for event in &self.events {
      for party in [Some(event.user_id.as_str()), event.sender(), event.receiver()]
        .into_iter()
        .flatten()
      {
        if !parties.contains(&party) {
          parties.push(party);
        }
      }
    }
    parties
  }
}

// ─── NewVoucher ──────────────────────────────────────────────────────────────

/// Input for creating a voucher together with its initial dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVoucher {
  pub created_by_user_id: String,
  pub item_details:       ItemDetails,
  /// Payload of the initial dispatch event; `receiver_id` and
  /// `quantity_dispatched` are required.
  pub dispatch:           EventDetails,
  pub comment:            Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_tokens() {
    assert_eq!(VoucherStatus::PartiallyForwarded.to_string(), "partially_forwarded");
    assert_eq!(
      VoucherStatus::parse_legacy("Partially Forwarded"),
      Some(VoucherStatus::PartiallyForwarded)
    );
    assert_eq!(VoucherStatus::parse_legacy("Received"), Some(VoucherStatus::Received));
    assert_eq!(VoucherStatus::parse_legacy("received"), Some(VoucherStatus::Received));
    assert_eq!(
      VoucherStatus::parse_legacy("dispatched-to-admin"),
      Some(VoucherStatus::DispatchedToAdmin)
    );
    assert_eq!(VoucherStatus::parse_legacy("lost"), None);
  }

  #[test]
  fn only_completed_is_closed() {
    assert!(VoucherStatus::Completed.is_closed());
    assert!(!VoucherStatus::DispatchedToAdmin.is_closed());
  }

  #[test]
  fn next_event_id_counts_from_one() {
    let voucher = Voucher::blank(
      Uuid::nil(),
      "JW/2024-25/0001",
      "admin",
      ItemDetails::default(),
      Utc::now(),
    );
    assert_eq!(voucher.next_event_id().as_str(), "JW/2024-25/0001#1");
    assert_eq!(voucher.admin_id(), "admin");
    assert_eq!(voucher.parties(), vec!["admin"]);
  }
}
