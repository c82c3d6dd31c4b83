//! Voucher update assembler.
//!
//! Turns "this voucher plus this new event" (or "this voucher, re-derived")
//! into the partial update a store persists. Input vouchers are never
//! mutated; callers merge the returned [`VoucherUpdate`] themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{EventType, NewEvent, VoucherEvent},
  ledger::Ledger,
  status::resolve_in_log,
  totals::{Tally, Totals, compute_totals},
  voucher::{NewVoucher, Voucher, VoucherStatus},
  voucher_no::VoucherNo,
};

/// The fields of a voucher that change when its log changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherUpdate {
  pub events:         Vec<VoucherEvent>,
  pub voucher_status: VoucherStatus,
  pub totals:         Totals,
  pub updated_at:     DateTime<Utc>,
}

impl VoucherUpdate {
  /// Merge into `voucher`, returning the updated document.
  pub fn apply_to(self, mut voucher: Voucher) -> Voucher {
    voucher.events = self.events;
    voucher.voucher_status = self.voucher_status;
    voucher.totals = self.totals;
    voucher.updated_at = self.updated_at;
    voucher
  }

  /// `true` if persisting this update would change anything besides
  /// `updated_at`.
  pub fn changes(&self, voucher: &Voucher) -> bool {
    self.voucher_status != voucher.voucher_status
      || self.totals != voucher.totals
      || self.events != voucher.events
  }
}

/// Result of [`build_voucher_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
  /// The voucher has no events; nothing was computed.
  Unchanged,
  Updated(VoucherUpdate),
}

/// Assemble the update for `voucher`.
///
/// With `new_event`, the event is validated against the current log and
/// appended. Without it, status and totals are re-derived from the stored
/// log, which repairs vouchers whose cached fields drifted. `now` becomes the
/// update's `updated_at`.
pub fn build_voucher_update(
  voucher: &Voucher,
  new_event: Option<VoucherEvent>,
  now: DateTime<Utc>,
) -> Result<UpdateOutcome> {
  let events = match new_event {
    Some(event) => {
      validate_append(voucher, &event)?;
      let mut events = voucher.events.clone();
      events.push(event);
      events
    }
    None => voucher.events.clone(),
  };

  let Some(latest) = events.last() else {
    return Ok(UpdateOutcome::Unchanged);
  };

  let voucher_status = resolve_in_log(&events, &voucher.created_by_user_id, latest);
  let totals = compute_totals(&events);

  Ok(UpdateOutcome::Updated(VoucherUpdate {
    events,
    voucher_status,
    totals,
    updated_at: now,
  }))
}

/// Reject `event` if appending it to `voucher` would be an invalid
/// transition or break quantity conservation.
pub fn validate_append(voucher: &Voucher, event: &VoucherEvent) -> Result<()> {
  let events = &voucher.events;

  if voucher.event(&event.event_id).is_some() {
    return Err(Error::DuplicateEventId(event.event_id.clone()));
  }

  let has_dispatch = events.iter().any(|e| e.event_type == EventType::Dispatch);
  match event.event_type {
    EventType::Dispatch if !events.is_empty() => {
      return Err(Error::DuplicateDispatch);
    }
    EventType::Receive | EventType::Forward if !has_dispatch => {
      return Err(Error::NotDispatched(event.event_type));
    }
    _ => {}
  }

  if let Some(parent_id) = &event.parent_event_id {
    let parent = voucher
      .event(parent_id)
      .ok_or_else(|| Error::UnknownParent(parent_id.clone()))?;
    let compatible = match event.event_type {
      EventType::Dispatch => false,
      EventType::Receive => {
        matches!(parent.event_type, EventType::Dispatch | EventType::Forward)
      }
      EventType::Forward => parent.event_type == EventType::Receive,
    };
    if !compatible {
      return Err(Error::InvalidParent {
        child:  event.event_type,
        parent: parent.event_type,
      });
    }
  }

  match event.event_type {
    EventType::Dispatch => {
      if event.receiver().is_none() {
        return Err(Error::MissingReceiver(EventType::Dispatch));
      }
      if event.quantity() == 0 {
        return Err(Error::EmptyQuantity(EventType::Dispatch));
      }
    }
    EventType::Receive => {
      if event.quantity() == 0 && event.missing() == 0 {
        return Err(Error::EmptyQuantity(EventType::Receive));
      }
      if event.damaged_on_arrival() > event.quantity() {
        return Err(Error::DamageExceedsReceived {
          damaged:  event.damaged_on_arrival(),
          received: event.quantity(),
        });
      }
      let receiver  = event.receiver().unwrap_or_default();
      let ledger    = Ledger::from_events(events);
      let addressed = match &event.parent_event_id {
        Some(parent_id) => {
          if voucher.event(parent_id).and_then(VoucherEvent::receiver) != Some(receiver) {
            return Err(Error::NotAddressee {
              receiver: receiver.to_owned(),
              parent:   parent_id.clone(),
            });
          }
          ledger.outstanding(parent_id).unwrap_or(0)
        }
        None => ledger.outstanding_for(receiver),
      };
      let mut tally = Tally::default();
      tally.extend(events);
      let available = addressed.min(tally.in_transit());
      check_quantity(
        EventType::Receive,
        event.quantity().checked_add(event.missing()),
        available,
      )?;
    }
    EventType::Forward => {
      if event.receiver().is_none() {
        return Err(Error::MissingReceiver(EventType::Forward));
      }
      if event.quantity() == 0 {
        return Err(Error::EmptyQuantity(EventType::Forward));
      }
      let available = event
        .sender()
        .map(|s| Ledger::from_events(events).holding(s).balance())
        .unwrap_or(0);
      check_quantity(
        EventType::Forward,
        event.quantity().checked_add(event.damaged_after_work()),
        available,
      )?;
    }
  }

  Ok(())
}

/// `requested` is `None` when the event's own quantities overflow, which no
/// log can ever have available.
fn check_quantity(event_type: EventType, requested: Option<u64>, available: u64) -> Result<()> {
  match requested {
    Some(requested) if requested <= available => Ok(()),
    requested => Err(Error::QuantityExceeded {
      event_type,
      requested: requested.unwrap_or(u64::MAX),
      available,
    }),
  }
}

/// Build a brand-new voucher whose log holds the initial dispatch.
pub fn open_voucher(
  voucher_id: Uuid,
  voucher_no: &VoucherNo,
  input: NewVoucher,
  now: DateTime<Utc>,
) -> Result<Voucher> {
  let blank = Voucher::blank(
    voucher_id,
    voucher_no.to_string(),
    input.created_by_user_id.clone(),
    input.item_details,
    now,
  );

  let mut dispatch =
    NewEvent::new(EventType::Dispatch, input.created_by_user_id, input.dispatch);
  dispatch.comment = input.comment;
  let dispatch = dispatch.into_event(blank.next_event_id(), now);

  match build_voucher_update(&blank, Some(dispatch), now)? {
    UpdateOutcome::Updated(update) => Ok(update.apply_to(blank)),
    UpdateOutcome::Unchanged => Err(Error::EmptyLog),
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    event::{Discrepancies, EventDetails, EventId},
    voucher::ItemDetails,
    voucher_no::FinancialYear,
  };

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() }

  fn opened(qty: u64) -> Voucher {
    open_voucher(
      Uuid::new_v4(),
      &VoucherNo::new("JW", FinancialYear { start_year: 2024 }, 1),
      NewVoucher {
        created_by_user_id: "admin".into(),
        item_details:       ItemDetails {
          item_name: "Kurta".into(),
          initial_quantity: qty,
          ..Default::default()
        },
        dispatch:           EventDetails {
          receiver_id: Some("vendor-a".into()),
          quantity_dispatched: Some(qty),
          jobwork_type: Some("embroidery".into()),
          ..Default::default()
        },
        comment:            None,
      },
      now(),
    )
    .unwrap()
  }

  fn append(voucher: Voucher, new: NewEvent) -> Result<Voucher> {
    let event = new.into_event(voucher.next_event_id(), now());
    match build_voucher_update(&voucher, Some(event), now())? {
      UpdateOutcome::Updated(u) => Ok(u.apply_to(voucher)),
      UpdateOutcome::Unchanged => Err(Error::EmptyLog),
    }
  }

  fn receive(by: &str, qty: u64, missing: u64) -> NewEvent {
    NewEvent::new(EventType::Receive, by, EventDetails {
      quantity_received: Some(qty),
      discrepancies: Discrepancies { missing: Some(missing), ..Default::default() },
      ..Default::default()
    })
  }

  fn forward(from: &str, to: &str, qty: u64) -> NewEvent {
    NewEvent::new(EventType::Forward, from, EventDetails {
      receiver_id: Some(to.into()),
      quantity_forwarded: Some(qty),
      ..Default::default()
    })
  }

  fn assert_conserved(v: &Voucher) {
    let t = v.totals;
    assert!(t.total_forwarded <= t.total_received, "{t:?}");
    assert!(
      t.total_received + t.total_missing_on_arrival
        <= t.total_dispatched + t.total_forwarded,
      "{t:?}"
    );
    assert_eq!(t, compute_totals(&v.events), "cached totals drifted");
  }

  #[test]
  fn scenario_walkthrough() {
    // 1. Dispatch 100.
    let v = opened(100);
    assert_eq!(v.voucher_status, VoucherStatus::Dispatched);
    assert_eq!(v.totals.total_dispatched, 100);
    assert_eq!(v.totals.total_received, 0);
    assert_eq!(v.events[0].event_id.as_str(), "JW/2024-25/0001#1");

    // 2. Vendor receives 90, 10 missing.
    let dispatch_id = v.events[0].event_id.clone();
    let v = append(v, receive("vendor-a", 90, 10).with_parent(dispatch_id)).unwrap();
    assert_eq!(v.voucher_status, VoucherStatus::Received);
    assert_eq!(v.totals.total_received, 90);
    assert_eq!(v.totals.total_missing_on_arrival, 10);
    assert_conserved(&v);

    // 3. Forward all 90 back to the admin.
    let v = append(v, forward("vendor-a", "admin", 90)).unwrap();
    assert_eq!(v.voucher_status, VoucherStatus::DispatchedToAdmin);
    assert_conserved(&v);

    // 4. Admin receives the full forwarded balance.
    let forward_id = v.latest_event().unwrap().event_id.clone();
    let v = append(v, receive("admin", 90, 0).with_parent(forward_id)).unwrap();
    assert_eq!(v.voucher_status, VoucherStatus::Completed);
    assert_eq!(v.totals.admin_received_quantity, 90);
    assert_conserved(&v);
  }

  #[test]
  fn partial_and_full_forward_to_vendor() {
    let v = append(opened(100), receive("vendor-a", 90, 10)).unwrap();
    let partial = append(v.clone(), forward("vendor-a", "vendor-b", 50)).unwrap();
    assert_eq!(partial.voucher_status, VoucherStatus::PartiallyForwarded);
    let full = append(v, forward("vendor-a", "vendor-b", 90)).unwrap();
    assert_eq!(full.voucher_status, VoucherStatus::Forwarded);
    assert_conserved(&partial);
    assert_conserved(&full);
  }

  #[test]
  fn empty_log_repair_is_a_no_op() {
    let blank = Voucher::blank(Uuid::nil(), "JW/2024-25/0009", "admin", ItemDetails::default(), now());
    assert_eq!(
      build_voucher_update(&blank, None, now()).unwrap(),
      UpdateOutcome::Unchanged
    );
  }

  #[test]
  fn repair_rederives_drifted_fields_without_mutating_input() {
    let mut v = append(opened(100), receive("vendor-a", 100, 0)).unwrap();
    v.voucher_status = VoucherStatus::Completed;
    v.totals.total_received = 7;
    let before = v.clone();

    let later = now() + chrono::Duration::hours(1);
    let UpdateOutcome::Updated(update) = build_voucher_update(&v, None, later).unwrap() else {
      panic!("expected an update");
    };
    assert_eq!(v, before);
    assert!(update.changes(&v));
    assert_eq!(update.voucher_status, VoucherStatus::Received);
    assert_eq!(update.totals.total_received, 100);
    assert_eq!(update.updated_at, later);
    assert_eq!(update.events, v.events);
  }

  #[test]
  fn repair_matches_step_by_step_application() {
    let v = append(opened(60), receive("vendor-a", 60, 0)).unwrap();
    let v = append(v, forward("vendor-a", "vendor-b", 20)).unwrap();
    let v = append(v, receive("vendor-b", 18, 2)).unwrap();

    let UpdateOutcome::Updated(update) = build_voucher_update(&v, None, now()).unwrap() else {
      panic!("expected an update");
    };
    assert!(!update.changes(&v));
  }

  #[test]
  fn second_dispatch_is_rejected() {
    let v = opened(10);
    let err = append(v, NewEvent::new(EventType::Dispatch, "admin", EventDetails {
      receiver_id: Some("vendor-b".into()),
      quantity_dispatched: Some(5),
      ..Default::default()
    }))
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateDispatch));
    assert!(err.is_rejection());
  }

  #[test]
  fn events_before_dispatch_are_rejected() {
    let blank = Voucher::blank(Uuid::nil(), "V", "admin", ItemDetails::default(), now());
    let err = append(blank, receive("vendor-a", 1, 0)).unwrap_err();
    assert!(matches!(err, Error::NotDispatched(EventType::Receive)));
  }

  #[test]
  fn over_receiving_is_rejected() {
    let v = opened(100);
    let dispatch_id = v.events[0].event_id.clone();
    let err = append(v.clone(), receive("vendor-a", 95, 10).with_parent(dispatch_id.clone()))
      .unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { requested: 105, available: 100, .. }));

    let v = append(v, receive("vendor-a", 60, 0).with_parent(dispatch_id.clone())).unwrap();
    let err = append(v, receive("vendor-a", 41, 0).with_parent(dispatch_id)).unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { requested: 41, available: 40, .. }));
  }

  #[test]
  fn linked_and_unlinked_receives_share_one_balance() {
    let v = opened(100);
    let dispatch_id = v.events[0].event_id.clone();
    let v = append(v, receive("vendor-a", 60, 0)).unwrap();

    let err = append(v.clone(), receive("vendor-a", 60, 0).with_parent(dispatch_id.clone()))
      .unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { requested: 60, available: 40, .. }));

    let v = append(v, receive("vendor-a", 40, 0).with_parent(dispatch_id)).unwrap();
    assert_eq!(v.totals.total_received, 100);
    assert_conserved(&v);

    let err = append(v, receive("vendor-a", 1, 0)).unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { requested: 1, available: 0, .. }));
  }

  #[test]
  fn overflowing_quantities_are_rejected() {
    let v = opened(100);
    let err = append(v.clone(), receive("vendor-a", u64::MAX, 2)).unwrap_err();
    assert!(matches!(
      err,
      Error::QuantityExceeded { requested: u64::MAX, available: 100, .. }
    ));

    let v = append(v, receive("vendor-a", 100, 0)).unwrap();
    let mut spoiled = forward("vendor-a", "vendor-b", u64::MAX);
    spoiled.details.discrepancies.damaged_after_work = Some(1);
    assert!(matches!(
      append(v, spoiled).unwrap_err(),
      Error::QuantityExceeded { requested: u64::MAX, available: 100, .. }
    ));
  }

  #[test]
  fn only_the_addressee_can_receive() {
    let v = opened(100);
    let dispatch_id = v.events[0].event_id.clone();

    let err = append(v.clone(), receive("vendor-z", 10, 0).with_parent(dispatch_id)).unwrap_err();
    assert!(matches!(err, Error::NotAddressee { ref receiver, .. } if receiver == "vendor-z"));
    assert!(err.is_rejection());

    let err = append(v.clone(), receive("vendor-z", 10, 0)).unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { requested: 10, available: 0, .. }));

    // The admin only receives once something is forwarded to them.
    let v = append(v, receive("vendor-a", 100, 0)).unwrap();
    let v = append(v, forward("vendor-a", "vendor-b", 70)).unwrap();
    let err = append(v.clone(), receive("admin", 70, 0)).unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { available: 0, .. }));

    let v = append(v, receive("vendor-b", 70, 0)).unwrap();
    assert_conserved(&v);
  }

  #[test]
  fn over_forwarding_is_rejected() {
    let v = append(opened(100), receive("vendor-a", 90, 10)).unwrap();
    let err = append(v.clone(), forward("vendor-a", "vendor-b", 91)).unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { requested: 91, available: 90, .. }));

    let err = append(v, forward("vendor-z", "vendor-b", 1)).unwrap_err();
    assert!(matches!(err, Error::QuantityExceeded { available: 0, .. }));
  }

  #[test]
  fn malformed_appends_are_rejected() {
    let v = opened(10);

    let err = append(v.clone(), receive("vendor-a", 0, 0)).unwrap_err();
    assert!(matches!(err, Error::EmptyQuantity(EventType::Receive)));

    let mut damaged = receive("vendor-a", 2, 0);
    damaged.details.discrepancies.damaged_on_arrival = Some(3);
    assert!(matches!(
      append(v.clone(), damaged).unwrap_err(),
      Error::DamageExceedsReceived { damaged: 3, received: 2 }
    ));

    let ghost = receive("vendor-a", 1, 0).with_parent(EventId::from("nope"));
    assert!(matches!(append(v.clone(), ghost).unwrap_err(), Error::UnknownParent(_)));

    let mut nowhere = forward("vendor-a", "vendor-b", 1);
    nowhere.details.receiver_id = None;
    assert!(matches!(
      append(v.clone(), nowhere).unwrap_err(),
      Error::MissingReceiver(EventType::Forward)
    ));

    let dispatch_id = v.events[0].event_id.clone();
    let bad_parent = forward("vendor-a", "vendor-b", 1).with_parent(dispatch_id);
    assert!(matches!(
      append(v, bad_parent).unwrap_err(),
      Error::InvalidParent { child: EventType::Forward, parent: EventType::Dispatch }
    ));
  }

  #[test]
  fn duplicate_event_id_is_rejected() {
    let v = opened(10);
    let dup = receive("vendor-a", 1, 0).into_event(v.events[0].event_id.clone(), now());
    assert!(matches!(
      build_voucher_update(&v, Some(dup), now()),
      Err(Error::DuplicateEventId(_))
    ));
  }

  #[test]
  fn completed_voucher_still_accepts_events() {
    let v = append(opened(10), receive("vendor-a", 10, 0)).unwrap();
    let v = append(v, forward("vendor-a", "admin", 10)).unwrap();
    let v = append(v, receive("admin", 10, 0)).unwrap();
    assert!(v.voucher_status.is_closed());

    let v = append(v, forward("admin", "vendor-b", 4)).unwrap();
    assert_eq!(v.voucher_status, VoucherStatus::PartiallyForwarded);
  }
}
