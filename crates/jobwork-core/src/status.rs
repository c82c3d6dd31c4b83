//! Status resolver.
//!
//! A voucher's status follows from its latest event alone, read against
//! totals recomputed from the log up to and including that event. History is
//! never replayed event by event, so resolving after each append and resolving
//! once over a finished log give the same answer.

use crate::{
  Error, Result,
  event::{EventType, VoucherEvent},
  ledger::Ledger,
  totals::Tally,
  voucher::{Voucher, VoucherStatus},
};

/// Decide the status of `voucher` after `event`.
///
/// `voucher.events` is expected to contain the event already. Without an
/// explicit event, the latest event in the log is used. `event_type` must
/// match the event's type.
pub fn resolve_status(
  voucher: &Voucher,
  event_type: EventType,
  event: Option<&VoucherEvent>,
) -> Result<VoucherStatus> {
  let event = match event {
    Some(e) => e,
    None => voucher.latest_event().ok_or(Error::EmptyLog)?,
  };
  if event.event_type != event_type {
    return Err(Error::EventTypeMismatch {
      expected: event_type,
      found:    event.event_type,
    });
  }
  Ok(resolve_in_log(&voucher.events, &voucher.created_by_user_id, event))
}

/// Resolve against a bare log. `fallback_admin` is used when the log has no
/// dispatch to name the admin.
pub(crate) fn resolve_in_log(
  events: &[VoucherEvent],
  fallback_admin: &str,
  event: &VoucherEvent,
) -> VoucherStatus {
  let prior = events_before(events, event);

  match event.event_type {
    EventType::Dispatch => VoucherStatus::Dispatched,
    EventType::Receive => {
      let mut tally = Tally::default();
      tally.extend(prior);
      tally.record(event);

      let admin = tally.admin().unwrap_or(fallback_admin);
      let by_admin = event.receiver() == Some(admin);
      let accounted = tally
        .totals()
        .admin_received_quantity
        .saturating_add(tally.admin_missing());
      if by_admin && accounted >= tally.expected_return() {
        VoucherStatus::Completed
      } else {
        VoucherStatus::Received
      }
    }
    EventType::Forward => {
      let admin = crate::totals::originator(events).unwrap_or(fallback_admin);
      if event.receiver() == Some(admin) {
        return VoucherStatus::DispatchedToAdmin;
      }
      let balance = event
        .sender()
        .map(|s| Ledger::from_events(prior).holding(s).balance())
        .unwrap_or(0);
      if event.quantity().saturating_add(event.damaged_after_work()) >= balance {
        VoucherStatus::Forwarded
      } else {
        VoucherStatus::PartiallyForwarded
      }
    }
  }
}

/// The part of the log that precedes `event`; the whole log if the event is
/// not in it.
fn events_before<'a>(events: &'a [VoucherEvent], event: &VoucherEvent) -> &'a [VoucherEvent] {
  match events.iter().position(|e| e.event_id == event.event_id) {
    Some(idx) => &events[..idx],
    None => events,
  }
}
