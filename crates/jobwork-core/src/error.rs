//! Error types for `jobwork-core`.
//!
//! Malformed legacy quantities are never an error here; they decode to zero.
//! Everything below is a rejection the caller surfaces before any write.

use thiserror::Error;

use crate::event::{EventId, EventType};

#[derive(Debug, Error)]
pub enum Error {
  #[error("voucher already has a dispatch event; dispatch is only valid first")]
  DuplicateDispatch,

  #[error("cannot record a {0} event before the voucher is dispatched")]
  NotDispatched(EventType),

  #[error("event id {0} is already used in this voucher")]
  DuplicateEventId(EventId),

  #[error("parent event {0} does not exist in this voucher")]
  UnknownParent(EventId),

  #[error("a {child} event cannot respond to a {parent} event")]
  InvalidParent { child: EventType, parent: EventType },

  #[error("{receiver} cannot receive {parent}, which was sent to someone else")]
  NotAddressee { receiver: String, parent: EventId },

  #[error("a {0} event must name its receiver")]
  MissingReceiver(EventType),

  #[error("a {0} event must carry a non-zero quantity")]
  EmptyQuantity(EventType),

  #[error("{event_type} accounts for {requested} pieces but only {available} are available")]
  QuantityExceeded {
    event_type: EventType,
    requested:  u64,
    available:  u64,
  },

  #[error("{damaged} pieces reported damaged on arrival but only {received} received")]
  DamageExceedsReceived { damaged: u64, received: u64 },

  #[error("expected the latest event to be a {expected} event, found {found}")]
  EventTypeMismatch { expected: EventType, found: EventType },

  #[error("voucher has no events")]
  EmptyLog,

  #[error("invalid voucher number: {0:?}")]
  InvalidVoucherNo(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// `true` for errors that reject an event as an invalid transition, as
  /// opposed to malformed input or internal failures.
  pub fn is_rejection(&self) -> bool {
    !matches!(self, Self::InvalidVoucherNo(_) | Self::Serialization(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
