//! Command and Event types for the order book.
//!
//! Commands are the inputs accepted by [`dispatch`](crate::OrderBook::dispatch).
//! Events are what the book reports back through its [`EventSink`](crate::EventSink).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot index inside the order arena. Doubles as the order handle returned
/// to callers; it stays valid only until the order is filled or canceled.
pub type SlotId = u32;

/// Sentinel for "no slot" (empty queue ends, end of a FIFO chain).
pub const NULL_SLOT: SlotId = u32::MAX;

/// Best bid reported while the bid side is empty.
pub const NO_BID: i64 = -i64::MAX;

/// Best ask reported while the ask side is empty.
pub const NO_ASK: i64 = i64::MAX;

/// Kind tag carried by every event, error and dispatched command.
///
/// The discriminants are the wire codes used by replay files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum EventKind {
    /// Order rested in the book
    Place = 0x1001,
    /// Resting order removed by its owner (or by expiry)
    Cancel = 0x1002,
    /// Order fully filled
    Fill = 0x2001,
    /// Order partially filled, remainder still live
    #[serde(rename = "PARTFILL")]
    PartFill = 0x2002,
    /// Placement rejected
    Reject = 0x8001,
    /// Cancel target was not resting
    RejectCancel = 0x8002,
}

impl EventKind {
    /// Wire code for this kind
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Decode a wire code
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x1001 => Some(EventKind::Place),
            0x1002 => Some(EventKind::Cancel),
            0x2001 => Some(EventKind::Fill),
            0x2002 => Some(EventKind::PartFill),
            0x8001 => Some(EventKind::Reject),
            0x8002 => Some(EventKind::RejectCancel),
            _ => None,
        }
    }

    /// Upper-case name, as printed in logs and CSV output
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::Place => "PLACE",
            EventKind::Cancel => "CANCEL",
            EventKind::Fill => "FILL",
            EventKind::PartFill => "PARTFILL",
            EventKind::Reject => "REJECT",
            EventKind::RejectCancel => "REJECT_CANCEL",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expiration policy of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GoodTill {
    /// Rests until filled or canceled
    #[default]
    Cancelled,
    /// Never rests: whatever does not match immediately is discarded
    ImmediateOrCancel,
    /// Expires once `expire(now)` is called with `now` past this timestamp
    Until(i64),
}

impl GoodTill {
    /// Raw encoding of [`GoodTill::Cancelled`]
    pub const RAW_GTC: i64 = 0;
    /// Raw encoding of [`GoodTill::ImmediateOrCancel`]
    pub const RAW_IOC: i64 = -1;

    /// Encode as a single word for flat slot storage and replay files.
    #[inline]
    pub const fn to_raw(self) -> i64 {
        match self {
            GoodTill::Cancelled => Self::RAW_GTC,
            GoodTill::ImmediateOrCancel => Self::RAW_IOC,
            GoodTill::Until(t) => t,
        }
    }

    /// Decode a word written by [`GoodTill::to_raw`].
    ///
    /// `0` means good-till-cancelled and `-1` immediate-or-cancel; anything
    /// else is a timestamp.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        match raw {
            Self::RAW_GTC => GoodTill::Cancelled,
            Self::RAW_IOC => GoodTill::ImmediateOrCancel,
            t => GoodTill::Until(t),
        }
    }

    /// Collapse timestamps that can never expire into [`GoodTill::Cancelled`].
    ///
    /// Keeps the raw encoding lossless: `Until(0)` and `Until(-1)` would
    /// otherwise decode as the GTC and IOC sentinels.
    #[inline]
    pub const fn normalized(self) -> Self {
        match self {
            GoodTill::Until(t) if t <= 0 => GoodTill::Cancelled,
            other => other,
        }
    }

    /// True if an order with this policy should be dropped at time `now`.
    /// Only positive timestamps ever expire.
    #[inline]
    pub const fn is_expired(self, now: i64) -> bool {
        match self {
            GoodTill::Until(t) => t > 0 && t < now,
            _ => false,
        }
    }
}

impl Serialize for GoodTill {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_raw())
    }
}

impl<'de> Deserialize<'de> for GoodTill {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(GoodTill::from_raw)
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// A dispatchable intent. Only [`EventKind::Place`] and
/// [`EventKind::Cancel`] are valid kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: EventKind,
    /// Signed volume for places (positive buys, negative sells)
    #[serde(default)]
    pub volume: i64,
    /// Limit price for places
    #[serde(default)]
    pub price: i64,
    /// Target slot for cancels
    #[serde(default = "null_slot")]
    pub id: SlotId,
    pub cookie: u64,
    #[serde(default)]
    pub good_till: GoodTill,
}

fn null_slot() -> SlotId {
    NULL_SLOT
}

impl Command {
    /// A place intent
    pub const fn place(volume: i64, price: i64, cookie: u64, good_till: GoodTill) -> Self {
        Self {
            kind: EventKind::Place,
            volume,
            price,
            id: NULL_SLOT,
            cookie,
            good_till,
        }
    }

    /// A cancel intent
    pub const fn cancel(id: SlotId, cookie: u64) -> Self {
        Self {
            kind: EventKind::Cancel,
            volume: 0,
            price: 0,
            id,
            cookie,
            good_till: GoodTill::Cancelled,
        }
    }
}

// ============================================================================
// Output Events
// ============================================================================

/// Something happened to an order.
///
/// `filled` is the signed volume executed by this step (0 for PLACE and
/// CANCEL). `active` is the signed volume the order brought as aggressor:
/// the posted volume for PLACE, the original volume for CANCEL, the signed
/// fill for the aggressing side of a trade and 0 for the resting side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub filled: i64,
    pub active: i64,
    pub price: i64,
    pub id: SlotId,
    pub cookie: u64,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{active:{}, price:{}, filled:{}, id:{}, cookie:{}}}",
            self.kind, self.active, self.price, self.filled, self.id, self.cookie
        )
    }
}

/// An operation was refused. The book was not modified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reject {
    /// [`EventKind::Reject`] or [`EventKind::RejectCancel`]
    pub kind: EventKind,
    /// Cancel target, or [`NULL_SLOT`] for placements
    pub id: SlotId,
    pub cookie: u64,
}

/// Either stream of the sink, merged for recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputEvent {
    Event(Event),
    Rejected(Reject),
}

impl OutputEvent {
    /// Kind of the underlying event or reject
    #[inline]
    pub fn kind(&self) -> EventKind {
        match self {
            OutputEvent::Event(e) => e.kind,
            OutputEvent::Rejected(r) => r.kind,
        }
    }
}
