//! Voucher events: the append-only history of a voucher.
//!
//! An event is an immutable record of one action (dispatch, receive or
//! forward). Events live in a single flat array on their voucher; insertion
//! order is causal order, and `parent_event_id` links a response to the event
//! it answers, so the log also forms a tree.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::quantity;

// ─── Event type ──────────────────────────────────────────────────────────────

/// The kind of action an event records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventType {
  /// Admin sends goods to a vendor. Only valid as the first event.
  Dispatch,
  /// A party acknowledges goods, with any discrepancy.
  Receive,
  /// A vendor sends (some of) its received goods onward.
  Forward,
}

// ─── Event id ────────────────────────────────────────────────────────────────

/// Identifier of an event, unique within its voucher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
  /// Derive the id of the `seq`-th event (1-based) of a voucher.
  pub fn derive(voucher_no: &str, seq: usize) -> Self {
    Self(format!("{voucher_no}#{seq}"))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for EventId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

// ─── Details ─────────────────────────────────────────────────────────────────

/// How the goods travelled between two parties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportInfo {
  pub transporter: Option<String>,
  /// Lorry receipt number issued by the transporter.
  pub lr_number:   Option<String>,
  pub vehicle_no:  Option<String>,
  pub cost:        Option<Decimal>,
}

/// Difference between what was expected and what actually arrived or came
/// out of job work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Discrepancies {
  /// Pieces that never arrived. Reported on `receive`.
  #[serde(deserialize_with = "quantity::lenient")]
  pub missing:            Option<u64>,
  /// Pieces that arrived damaged; a subset of the received quantity.
  #[serde(deserialize_with = "quantity::lenient")]
  pub damaged_on_arrival: Option<u64>,
  /// Pieces the sender spoiled during its own work. Reported on `forward`.
  #[serde(deserialize_with = "quantity::lenient")]
  pub damaged_after_work: Option<u64>,
  pub damage_reason:      Option<String>,
}

/// Type-specific payload of an event. Which quantity field is meaningful
/// depends on the event type; the others are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDetails {
  pub sender_id:           Option<String>,
  pub receiver_id:         Option<String>,
  #[serde(deserialize_with = "quantity::lenient")]
  pub quantity_dispatched: Option<u64>,
  #[serde(deserialize_with = "quantity::lenient")]
  pub quantity_forwarded:  Option<u64>,
  #[serde(deserialize_with = "quantity::lenient")]
  pub quantity_received:   Option<u64>,
  /// Kind of job work requested from the receiver, e.g. "embroidery".
  pub jobwork_type:        Option<String>,
  /// Agreed rate paid to the receiver per finished piece.
  pub price_per_piece:     Option<Decimal>,
  pub transport:           Option<TransportInfo>,
  pub discrepancies:       Discrepancies,
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An immutable fact in a voucher's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherEvent {
  pub event_id:        EventId,
  pub parent_event_id: Option<EventId>,
  pub event_type:      EventType,
  pub timestamp:       DateTime<Utc>,
  /// The acting user.
  pub user_id:         String,
  pub comment:         Option<String>,
  #[serde(default)]
  pub details:         EventDetails,
}

impl VoucherEvent {
  /// The quantity this event moves: dispatched, forwarded or received,
  /// depending on its type. Absent values count as zero.
  pub fn quantity(&self) -> u64 {
    let d = &self.details;
    match self.event_type {
      EventType::Dispatch => d.quantity_dispatched,
      EventType::Forward => d.quantity_forwarded,
      EventType::Receive => d.quantity_received,
    }
    .unwrap_or(0)
  }

  pub fn missing(&self) -> u64 {
    self.details.discrepancies.missing.unwrap_or(0)
  }

  pub fn damaged_on_arrival(&self) -> u64 {
    self.details.discrepancies.damaged_on_arrival.unwrap_or(0)
  }

  pub fn damaged_after_work(&self) -> u64 {
    self.details.discrepancies.damaged_after_work.unwrap_or(0)
  }

  /// The party the goods leave. Senders of dispatches and forwards default to
  /// the acting user.
  pub fn sender(&self) -> Option<&str> {
    match self.event_type {
      EventType::Dispatch | EventType::Forward => {
        Some(self.details.sender_id.as_deref().unwrap_or(&self.user_id))
      }
      EventType::Receive => self.details.sender_id.as_deref(),
    }
  }

  /// The party the goods reach. A receive's receiver defaults to the acting
  /// user.
  pub fn receiver(&self) -> Option<&str> {
    match self.event_type {
      EventType::Receive => {
        Some(self.details.receiver_id.as_deref().unwrap_or(&self.user_id))
      }
      EventType::Dispatch | EventType::Forward => {
        self.details.receiver_id.as_deref()
      }
    }
  }
}

// ─── NewEvent ────────────────────────────────────────────────────────────────

/// Input for appending an event. The id and timestamp are assigned on append;
/// they are not accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
  pub parent_event_id: Option<EventId>,
  pub event_type:      EventType,
  pub user_id:         String,
  pub comment:         Option<String>,
  #[serde(default)]
  pub details:         EventDetails,
}

impl NewEvent {
  /// Convenience constructor with no parent and no comment.
  pub fn new(
    event_type: EventType,
    user_id: impl Into<String>,
    details: EventDetails,
  ) -> Self {
    Self {
      parent_event_id: None,
      event_type,
      user_id: user_id.into(),
      comment: None,
      details,
    }
  }

  pub fn with_parent(mut self, parent: EventId) -> Self {
    self.parent_event_id = Some(parent);
    self
  }

  /// Stamp the input with its id and time, producing the stored event.
  pub fn into_event(
    self,
    event_id: EventId,
    timestamp: DateTime<Utc>,
  ) -> VoucherEvent {
    VoucherEvent {
      event_id,
      parent_event_id: self.parent_event_id,
      event_type: self.event_type,
      timestamp,
      user_id: self.user_id,
      comment: self.comment,
      details: self.details,
    }
  }
}
