//! Totals aggregator. Folds an event log into the voucher's counters.
//!
//! The fold is pure and single-pass. Folding events one at a time through a
//! [`Tally`] gives exactly the same result as [`compute_totals`] over the
//! whole slice, so stored counters can always be rebuilt from scratch.

use serde::{Deserialize, Serialize};

use crate::event::{EventType, VoucherEvent};

/// Aggregate piece counts for one voucher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Totals {
  pub total_dispatched:         u64,
  pub total_received:           u64,
  pub total_forwarded:          u64,
  pub total_missing_on_arrival: u64,
  pub total_damaged_on_arrival: u64,
  pub total_damaged_after_work: u64,
  /// Pieces received back by the admin who dispatched the voucher.
  pub admin_received_quantity:  u64,
}

/// The admin a log belongs to: the sender of its first dispatch.
pub fn originator(events: &[VoucherEvent]) -> Option<&str> {
  events
    .iter()
    .find(|e| e.event_type == EventType::Dispatch)
    .and_then(VoucherEvent::sender)
}

/// Recompute all counters from an event log.
pub fn compute_totals(events: &[VoucherEvent]) -> Totals {
  let mut tally = Tally::default();
  tally.extend(events);
  tally.totals()
}

/// Incremental form of [`compute_totals`].
///
/// Besides the public counters it remembers who the admin is and how many
/// pieces went missing on the way back to them, which the status resolver
/// needs to decide completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
  totals:        Totals,
  admin:         Option<String>,
  admin_missing: u64,
}

impl Tally {
  /// Fold one more event in.
  pub fn record(&mut self, event: &VoucherEvent) {
    if event.event_type == EventType::Dispatch && self.admin.is_none() {
      self.admin = event.sender().map(str::to_owned);
    }
    let by_admin = self.is_admin(event.receiver());

    // Counters saturate; a legacy log with absurd quantities must still fold.
    let t = &mut self.totals;
    match event.event_type {
      EventType::Dispatch => {
        t.total_dispatched = t.total_dispatched.saturating_add(event.quantity());
      }
      EventType::Forward => {
        t.total_forwarded = t.total_forwarded.saturating_add(event.quantity());
        t.total_damaged_after_work =
          t.total_damaged_after_work.saturating_add(event.damaged_after_work());
      }
      EventType::Receive => {
        t.total_received = t.total_received.saturating_add(event.quantity());
        t.total_missing_on_arrival =
          t.total_missing_on_arrival.saturating_add(event.missing());
        t.total_damaged_on_arrival =
          t.total_damaged_on_arrival.saturating_add(event.damaged_on_arrival());
        if by_admin {
          t.admin_received_quantity =
            t.admin_received_quantity.saturating_add(event.quantity());
          self.admin_missing = self.admin_missing.saturating_add(event.missing());
        }
      }
    }
  }

  pub fn totals(&self) -> Totals { self.totals }

  pub fn admin(&self) -> Option<&str> { self.admin.as_deref() }

  /// Pieces reported missing on receives by the admin.
  pub fn admin_missing(&self) -> u64 { self.admin_missing }

  /// Pieces the admin should eventually get back: everything dispatched,
  /// less what vendors lost on arrival or spoiled during work.
  pub fn expected_return(&self) -> u64 {
    let t = &self.totals;
    let vendor_missing = t.total_missing_on_arrival.saturating_sub(self.admin_missing);
    t.total_dispatched
      .saturating_sub(vendor_missing)
      .saturating_sub(t.total_damaged_after_work)
  }

  /// Pieces dispatched or forwarded that no receive has accounted for yet.
  pub fn in_transit(&self) -> u64 {
    let t = &self.totals;
    let sent = t.total_dispatched.saturating_add(t.total_forwarded);
    sent.saturating_sub(t.total_received.saturating_add(t.total_missing_on_arrival))
  }

  fn is_admin(&self, party: Option<&str>) -> bool {
    matches!((self.admin.as_deref(), party), (Some(a), Some(p)) if a == p)
  }
}

impl<'a> Extend<&'a VoucherEvent> for Tally {
  fn extend<I: IntoIterator<Item = &'a VoucherEvent>>(&mut self, events: I) {
    for event in events {
      self.record(event);
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::event::{Discrepancies, EventDetails, EventId, NewEvent};

  fn event(seq: usize, new: NewEvent) -> VoucherEvent {
    new.into_event(EventId::derive("V", seq), Utc::now())
  }

  fn sample_log() -> Vec<VoucherEvent> {
    vec![
      event(1, NewEvent::new(EventType::Dispatch, "admin", EventDetails {
        receiver_id: Some("vendor-a".into()),
        quantity_dispatched: Some(100),
        ..Default::default()
      })),
      event(2, NewEvent::new(EventType::Receive, "vendor-a", EventDetails {
        quantity_received: Some(90),
        discrepancies: Discrepancies {
          missing: Some(10),
          damaged_on_arrival: Some(3),
          ..Default::default()
        },
        ..Default::default()
      })),
      event(3, NewEvent::new(EventType::Forward, "vendor-a", EventDetails {
        receiver_id: Some("admin".into()),
        quantity_forwarded: Some(88),
        discrepancies: Discrepancies { damaged_after_work: Some(2), ..Default::default() },
        ..Default::default()
      })),
      event(4, NewEvent::new(EventType::Receive, "admin", EventDetails {
        quantity_received: Some(87),
        discrepancies: Discrepancies { missing: Some(1), ..Default::default() },
        ..Default::default()
      })),
    ]
  }

  #[test]
  fn empty_log_is_all_zero() {
    assert_eq!(compute_totals(&[]), Totals::default());
  }

  #[test]
  fn folds_every_counter() {
    let totals = compute_totals(&sample_log());
    assert_eq!(totals, Totals {
      total_dispatched:         100,
      total_received:           177,
      total_forwarded:          88,
      total_missing_on_arrival: 11,
      total_damaged_on_arrival: 3,
      total_damaged_after_work: 2,
      admin_received_quantity:  87,
    });
  }

  #[test]
  fn aggregation_is_idempotent() {
    let log = sample_log();
    assert_eq!(compute_totals(&log), compute_totals(&log));
  }

  #[test]
  fn incremental_matches_batch() {
    let log = sample_log();
    let mut tally = Tally::default();
    for (i, e) in log.iter().enumerate() {
      tally.record(e);
      assert_eq!(tally.totals(), compute_totals(&log[..=i]), "prefix {}", i + 1);
    }
  }

  #[test]
  fn expected_return_excludes_vendor_losses() {
    let mut tally = Tally::default();
    tally.extend(&sample_log());
    assert_eq!(tally.admin(), Some("admin"));
    assert_eq!(tally.admin_missing(), 1);
    // 100 dispatched - 10 lost on the way to vendor-a - 2 spoiled in work.
    assert_eq!(tally.expected_return(), 88);
    assert_eq!(tally.in_transit(), 0);
  }

  #[test]
  fn missing_quantity_contributes_zero() {
    let log = vec![
      event(1, NewEvent::new(EventType::Dispatch, "admin", EventDetails {
        quantity_dispatched: Some(40),
        ..Default::default()
      })),
      event(2, NewEvent::new(EventType::Receive, "vendor-a", EventDetails::default())),
    ];
    let totals = compute_totals(&log);
    assert_eq!(totals.total_dispatched, 40);
    assert_eq!(totals.total_received, 0);
    assert_eq!(totals.total_missing_on_arrival, 0);
  }

  #[test]
  fn oversized_legacy_quantities_saturate() {
    let huge = |seq, event_type, by: &str| {
      event(seq, NewEvent::new(event_type, by, EventDetails {
        receiver_id: Some("admin".into()),
        quantity_dispatched: Some(u64::MAX),
        quantity_forwarded: Some(u64::MAX),
        quantity_received: Some(u64::MAX),
        discrepancies: Discrepancies { missing: Some(u64::MAX), ..Default::default() },
        ..Default::default()
      }))
    };
    let log = vec![
      huge(1, EventType::Dispatch, "admin"),
      huge(2, EventType::Dispatch, "admin"),
      huge(3, EventType::Forward, "vendor-a"),
      huge(4, EventType::Receive, "admin"),
      huge(5, EventType::Receive, "admin"),
    ];

    let mut tally = Tally::default();
    tally.extend(&log);
    let totals = tally.totals();
    assert_eq!(totals.total_dispatched, u64::MAX);
    assert_eq!(totals.total_received, u64::MAX);
    assert_eq!(totals.total_missing_on_arrival, u64::MAX);
    assert_eq!(totals.admin_received_quantity, u64::MAX);
    assert_eq!(tally.admin_missing(), u64::MAX);
    assert_eq!(tally.in_transit(), 0);
    assert_eq!(totals, compute_totals(&log));
  }
}
