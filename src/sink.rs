//! Event sinks - where the book reports what it did.
//!
//! Every operation reports synchronously, on the caller's thread, before it
//! returns. Sinks receive values only and hold no reference to the book, so
//! they cannot re-enter it.

use crate::command::{Event, EventKind, OutputEvent, Reject, SlotId};

/// Receiver for the book's two notification streams.
pub trait EventSink {
    /// PLACE, FILL, PARTFILL and CANCEL
    fn on_event(&mut self, event: Event);

    /// REJECT and REJECT_CANCEL
    fn on_error(&mut self, reject: Reject);
}

/// Discards everything. Used by benchmarks.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    #[inline]
    fn on_event(&mut self, _event: Event) {}

    #[inline]
    fn on_error(&mut self, _reject: Reject) {}
}

/// Records both streams in arrival order.
impl EventSink for Vec<OutputEvent> {
    #[inline]
    fn on_event(&mut self, event: Event) {
        self.push(OutputEvent::Event(event));
    }

    #[inline]
    fn on_error(&mut self, reject: Reject) {
        self.push(OutputEvent::Rejected(reject));
    }
}

/// Adapts a pair of closures into a sink.
///
/// ```
/// use arena_lob::{Callbacks, OrderBook};
///
/// let mut fills = 0;
/// let sink = Callbacks::new(
///     |event: arena_lob::Event| {
///         if event.kind == arena_lob::EventKind::Fill {
///             fills += 1;
///         }
///     },
///     |_reject: arena_lob::Reject| {},
/// );
/// let mut book = OrderBook::builder().range(-100, 100).sink(sink).build().unwrap();
/// book.place_gtc(10, 50, 1).unwrap();
/// book.place_gtc(-10, 50, 2).unwrap();
/// drop(book);
/// assert_eq!(fills, 2);
/// ```
pub struct Callbacks<E, R> {
    on_event: E,
    on_error: R,
}

impl<E, R> Callbacks<E, R>
where
    E: FnMut(Event),
    R: FnMut(Reject),
{
    pub fn new(on_event: E, on_error: R) -> Self {
        Self { on_event, on_error }
    }
}

impl<E, R> EventSink for Callbacks<E, R>
where
    E: FnMut(Event),
    R: FnMut(Reject),
{
    #[inline]
    fn on_event(&mut self, event: Event) {
        (self.on_event)(event)
    }

    #[inline]
    fn on_error(&mut self, reject: Reject) {
        (self.on_error)(reject)
    }
}

/// Logs every notification through `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceSink;

impl EventSink for TraceSink {
    fn on_event(&mut self, event: Event) {
        tracing::debug!(%event, "book event");
    }

    fn on_error(&mut self, reject: Reject) {
        tracing::debug!(kind = %reject.kind, id = reject.id, cookie = reject.cookie, "book reject");
    }
}

/// Build a reject record.
#[inline]
pub(crate) fn reject(kind: EventKind, id: SlotId, cookie: u64) -> Reject {
    Reject { kind, id, cookie }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NULL_SLOT;

    fn sample_event() -> Event {
        Event {
            kind: EventKind::Place,
            filled: 0,
            active: 10,
            price: 100,
            id: 0,
            cookie: 555,
        }
    }

    #[test]
    fn test_vec_sink_records_in_order() {
        let mut sink: Vec<OutputEvent> = Vec::new();
        sink.on_event(sample_event());
        sink.on_error(reject(EventKind::Reject, NULL_SLOT, 7));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].kind(), EventKind::Place);
        assert_eq!(sink[1].kind(), EventKind::Reject);
    }

    #[test]
    fn test_callbacks_forward() {
        let mut events = Vec::new();
        let mut rejects = Vec::new();
        {
            let mut sink = Callbacks::new(|e: Event| events.push(e), |r: Reject| rejects.push(r));
            sink.on_event(sample_event());
            sink.on_error(reject(EventKind::RejectCancel, 4, 9));
        }
        assert_eq!(events, vec![sample_event()]);
        assert_eq!(rejects[0].id, 4);
    }
}
