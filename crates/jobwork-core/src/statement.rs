//! Vendor job-work statements.
//!
//! A vendor is paid per piece it sends onward, at the rate agreed on the
//! dispatch or forward that brought goods to it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  event::{EventType, VoucherEvent},
  ledger::Ledger,
  voucher::Voucher,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorStatement {
  pub vendor_id:          String,
  pub voucher_no:         String,
  pub pieces_received:    u64,
  pub missing_on_arrival: u64,
  pub damaged_on_arrival: u64,
  pub pieces_forwarded:   u64,
  pub damaged_after_work: u64,
  pub pieces_held:        u64,
  /// Rate from the latest priced inbound dispatch/forward, if any.
  pub price_per_piece:    Option<Decimal>,
  pub amount_payable:     Decimal,
}

/// Summarise what `vendor_id` did on `voucher`.
pub fn vendor_statement(voucher: &Voucher, vendor_id: &str) -> VendorStatement {
  let holding = Ledger::from_events(&voucher.events).holding(vendor_id);

  let receives = voucher.events.iter().filter(|e| {
    e.event_type == EventType::Receive && e.receiver() == Some(vendor_id)
  });
  let (missing_on_arrival, damaged_on_arrival) = receives
    .fold((0u64, 0u64), |(m, d), e| {
      (m.saturating_add(e.missing()), d.saturating_add(e.damaged_on_arrival()))
    });

  let price_per_piece = voucher
    .events
    .iter()
    .rev()
    .filter(|e| is_inbound_to(e, vendor_id))
    .find_map(|e| e.details.price_per_piece);

  let amount_payable = price_per_piece
    .map(|rate| rate.checked_mul(Decimal::from(holding.forwarded)).unwrap_or(Decimal::MAX))
    .unwrap_or_default();

  VendorStatement {
    vendor_id: vendor_id.to_owned(),
    voucher_no: voucher.voucher_no.clone(),
    pieces_received: holding.received,
    missing_on_arrival,
    damaged_on_arrival,
    pieces_forwarded: holding.forwarded,
    damaged_after_work: holding.damaged_after_work,
    pieces_held: holding.balance(),
    price_per_piece,
    amount_payable,
  }
}

fn is_inbound_to(event: &VoucherEvent, vendor_id: &str) -> bool {
  matches!(event.event_type, EventType::Dispatch | EventType::Forward)
    && event.receiver() == Some(vendor_id)
}
