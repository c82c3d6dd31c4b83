//! Per-party holdings derived from an event log.
//!
//! Where [`crate::totals`] counts voucher-wide, the ledger answers "how many
//! pieces does this vendor hold right now" and "how much of this dispatch is
//! still unaccounted for". Both feed transition validation and the forward
//! status decision.

use std::collections::HashMap;

use crate::event::{EventId, EventType, VoucherEvent};

/// Pieces that passed through one party's hands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Holding {
  pub received:           u64,
  pub forwarded:          u64,
  pub damaged_after_work: u64,
}

impl Holding {
  /// Pieces still with the party.
  pub fn balance(&self) -> u64 {
    self
      .received
      .saturating_sub(self.forwarded.saturating_add(self.damaged_after_work))
  }
}

/// A dispatch or forward, with what no receive has accounted for yet.
#[derive(Debug, Clone, Copy)]
struct Shipment<'a> {
  event_id:  &'a EventId,
  to:        Option<&'a str>,
  remaining: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger<'a> {
  holdings:  HashMap<&'a str, Holding>,
  /// Every dispatch/forward in log order.
  shipments: Vec<Shipment<'a>>,
}

impl<'a> Ledger<'a> {
  pub fn from_events(events: &'a [VoucherEvent]) -> Self {
    let mut ledger = Self::default();
    for event in events {
      ledger.record(event);
    }
    ledger
  }

  fn record(&mut self, event: &'a VoucherEvent) {
    match event.event_type {
      EventType::Dispatch => self.ship(event),
      EventType::Forward => {
        self.ship(event);
        if let Some(sender) = event.sender() {
          let h = self.holdings.entry(sender).or_default();
          h.forwarded = h.forwarded.saturating_add(event.quantity());
          h.damaged_after_work = h.damaged_after_work.saturating_add(event.damaged_after_work());
        }
      }
      EventType::Receive => {
        let receiver = event.receiver();
        if let Some(receiver) = receiver {
          let h = self.holdings.entry(receiver).or_default();
          h.received = h.received.saturating_add(event.quantity());
        }
        let accounted = event.quantity().saturating_add(event.missing());
        match &event.parent_event_id {
          Some(parent) => {
            if let Some(s) = self.shipments.iter_mut().find(|s| s.event_id == parent) {
              s.remaining = s.remaining.saturating_sub(accounted);
            }
          }
          // Unlinked receives settle the oldest shipments addressed to the
          // receiver first.
          None => {
            let mut left = accounted;
            for s in self.shipments.iter_mut().filter(|s| s.to.is_some() && s.to == receiver) {
              if left == 0 {
                break;
              }
              let taken = left.min(s.remaining);
              s.remaining -= taken;
              left -= taken;
            }
          }
        }
      }
    }
  }

  fn ship(&mut self, event: &'a VoucherEvent) {
    self.shipments.push(Shipment {
      event_id:  &event.event_id,
      to:        event.receiver(),
      remaining: event.quantity(),
    });
  }

  pub fn holding(&self, party: &str) -> Holding {
    self.holdings.get(party).copied().unwrap_or_default()
  }

  /// Unaccounted quantity of a dispatch/forward event; `None` for unknown
  /// ids and for receives.
  pub fn outstanding(&self, event_id: &EventId) -> Option<u64> {
    self
      .shipments
      .iter()
      .find(|s| s.event_id == event_id)
      .map(|s| s.remaining)
  }

  /// Unaccounted quantity across every shipment addressed to `party`.
  pub fn outstanding_for(&self, party: &str) -> u64 {
    self
      .shipments
      .iter()
      .filter(|s| s.to == Some(party))
      .fold(0, |sum, s| sum.saturating_add(s.remaining))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::event::{Discrepancies, EventDetails, NewEvent};

  fn event(seq: usize, new: NewEvent) -> VoucherEvent {
    new.into_event(EventId::derive("V", seq), Utc::now())
  }

  #[test]
  fn tracks_balances_and_outstanding() {
    let log = vec![
      event(1, NewEvent::new(EventType::Dispatch, "admin", EventDetails {
        receiver_id: Some("vendor-a".into()),
        quantity_dispatched: Some(100),
        ..Default::default()
      })),
      event(
        2,
        NewEvent::new(EventType::Receive, "vendor-a", EventDetails {
          quantity_received: Some(90),
          discrepancies: Discrepancies { missing: Some(10), ..Default::default() },
          ..Default::default()
        })
        .with_parent(EventId::derive("V", 1)),
      ),
      event(3, NewEvent::new(EventType::Forward, "vendor-a", EventDetails {
        receiver_id: Some("vendor-b".into()),
        quantity_forwarded: Some(50),
        discrepancies: Discrepancies { damaged_after_work: Some(5), ..Default::default() },
        ..Default::default()
      })),
    ];
    let ledger = Ledger::from_events(&log);

    let a = ledger.holding("vendor-a");
    assert_eq!(a, Holding { received: 90, forwarded: 50, damaged_after_work: 5 });
    assert_eq!(a.balance(), 35);
    assert_eq!(ledger.holding("vendor-b").balance(), 0);

    assert_eq!(ledger.outstanding(&EventId::derive("V", 1)), Some(0));
    assert_eq!(ledger.outstanding(&EventId::derive("V", 3)), Some(50));
    assert_eq!(ledger.outstanding(&EventId::derive("V", 2)), None);
  }

  #[test]
  fn unlinked_receives_settle_oldest_shipment_to_receiver() {
    let log = vec![
      event(1, NewEvent::new(EventType::Dispatch, "admin", EventDetails {
        receiver_id: Some("vendor-a".into()),
        quantity_dispatched: Some(100),
        ..Default::default()
      })),
      event(2, NewEvent::new(EventType::Receive, "vendor-a", EventDetails {
        quantity_received: Some(100),
        ..Default::default()
      })),
      event(3, NewEvent::new(EventType::Forward, "vendor-a", EventDetails {
        receiver_id: Some("vendor-b".into()),
        quantity_forwarded: Some(30),
        ..Default::default()
      })),
      event(4, NewEvent::new(EventType::Forward, "vendor-a", EventDetails {
        receiver_id: Some("vendor-b".into()),
        quantity_forwarded: Some(30),
        ..Default::default()
      })),
      event(5, NewEvent::new(EventType::Forward, "vendor-a", EventDetails {
        receiver_id: Some("vendor-c".into()),
        quantity_forwarded: Some(40),
        ..Default::default()
      })),
      event(6, NewEvent::new(EventType::Receive, "vendor-b", EventDetails {
        quantity_received: Some(35),
        ..Default::default()
      })),
    ];
    let ledger = Ledger::from_events(&log);

    assert_eq!(ledger.outstanding(&EventId::derive("V", 1)), Some(0));
    assert_eq!(ledger.outstanding(&EventId::derive("V", 3)), Some(0));
    assert_eq!(ledger.outstanding(&EventId::derive("V", 4)), Some(25));
    assert_eq!(ledger.outstanding(&EventId::derive("V", 5)), Some(40));
    assert_eq!(ledger.outstanding_for("vendor-b"), 25);
    assert_eq!(ledger.outstanding_for("vendor-c"), 40);
    assert_eq!(ledger.outstanding_for("vendor-a"), 0);
    assert_eq!(ledger.outstanding_for("nobody"), 0);
  }
}
