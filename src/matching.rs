//! Matching Engine - placement, price-time matching, cancellation, expiry.
//!
//! # Matching Rules
//! - Price priority: the aggressor walks resting levels from the best price
//!   outward, never past its own limit
//! - Time priority: within a level the oldest order fills first
//! - Trades print at the resting order's price
//!
//! # Event Order
//! Each fill step reports the passive order first, then the aggressor.
//! A residual that rests reports PLACE after all of its fills.

use crate::arena::SlotStore;
use crate::command::{Command, Event, EventKind, GoodTill, SlotId, NO_ASK, NO_BID, NULL_SLOT};
use crate::error::BookError;
use crate::order_book::OrderBook;
use crate::price_level::LevelStore;
use crate::sink::{reject, EventSink};
use crate::storage::Storage;
use tracing::{trace, warn};

impl<S: Storage, K: EventSink> OrderBook<S, K> {
    // ========================================================================
    // Placement
    // ========================================================================

    /// Place a limit order.
    ///
    /// Positive volume buys, negative sells. The order first matches against
    /// the opposite side; any remainder rests at `price` unless `good_till`
    /// is [`GoodTill::ImmediateOrCancel`].
    ///
    /// Returns the slot reserved for the order. The id addresses a live
    /// order only if something rested; a fully filled or IOC order leaves
    /// the slot free again.
    ///
    /// # Errors
    /// - [`BookError::PriceOutOfRange`] if `price` is outside the index
    /// - [`BookError::ArenaFull`] if no slot is free
    ///
    /// Both also report a REJECT to the sink, and leave the book untouched.
    ///
    /// An `Until(t)` with `t <= 0` never expires and is stored as
    /// [`GoodTill::Cancelled`].
    pub fn place(
        &mut self,
        volume: i64,
        price: i64,
        cookie: u64,
        good_till: GoodTill,
    ) -> Result<SlotId, BookError> {
        if !self.levels.contains_price(price) {
            trace!(price, cookie, "place rejected: price out of range");
            self.sink.on_error(reject(EventKind::Reject, NULL_SLOT, cookie));
            return Err(BookError::PriceOutOfRange {
                price,
                min: self.levels.min_price(),
                max: self.levels.max_price(),
            });
        }

        let Some(id) = self.slots.allocate() else {
            warn!(capacity = self.slots.capacity(), cookie, "order arena full");
            self.sink.on_error(reject(EventKind::Reject, NULL_SLOT, cookie));
            return Err(BookError::ArenaFull {
                capacity: self.slots.capacity(),
            });
        };

        if volume == 0 {
            return Ok(id);
        }

        let good_till = good_till.normalized();

        let remaining = self.match_incoming(volume, price, id, cookie);
        if remaining == 0 || good_till == GoodTill::ImmediateOrCancel {
            return Ok(id);
        }

        self.rest(id, remaining, price, cookie, good_till);
        Ok(id)
    }

    /// Place a good-till-cancelled order.
    #[inline]
    pub fn place_gtc(&mut self, volume: i64, price: i64, cookie: u64) -> Result<SlotId, BookError> {
        self.place(volume, price, cookie, GoodTill::Cancelled)
    }

    /// Append an order to the tail of its level and update bounds and bests.
    fn rest(&mut self, id: SlotId, volume: i64, price: i64, cookie: u64, good_till: GoodTill) {
        let st = &mut self.state;
        st.low = st.low.min(price);
        st.high = st.high.max(price);

        self.slots.set_volume(id, volume);
        self.slots.set_price(id, price);
        self.slots.set_cookie(id, cookie);
        self.slots.set_good_till(id, good_till);
        self.slots.set_next(id, NULL_SLOT);

        if self.levels.is_empty(price) {
            self.levels.set_head(price, id);
        } else {
            let tail = self.levels.tail(price);
            self.slots.set_next(tail, id);
        }
        self.levels.set_tail(price, id);
        self.levels.set_volume(price, self.levels.volume(price) + volume);

        st.size += 1;
        if volume > 0 {
            st.best_bid = st.best_bid.max(price);
        } else {
            st.best_ask = st.best_ask.min(price);
        }

        trace!(id, volume, price, cookie, "order rested");
        self.sink.on_event(Event {
            kind: EventKind::Place,
            filled: 0,
            active: volume,
            price,
            id,
            cookie,
        });
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Match an aggressor against the opposite side of the book.
    ///
    /// Sweeps levels from the best opposite price toward `price` while
    /// volume remains, reporting every fill step. Returns the signed
    /// unfilled volume.
    ///
    /// When a side is swept empty its best price resets to the sentinel and
    /// the bounds collapse onto the other side.
    pub fn match_incoming(
        &mut self,
        active_volume: i64,
        price: i64,
        active_id: SlotId,
        active_cookie: u64,
    ) -> i64 {
        let mut active = active_volume;
        if active > 0 {
            loop {
                let ask = self.state.best_ask;
                if ask > self.state.high {
                    self.state.best_ask = NO_ASK;
                    self.state.high = self.state.best_bid;
                    if self.state.best_bid == NO_BID {
                        self.state.low = NO_ASK;
                    }
                    break;
                }
                if active != 0 && ask <= price && !self.levels.is_empty(ask) {
                    active = self.consume_level(ask, active, active_id, active_cookie);
                }
                if !self.levels.is_empty(ask) {
                    break;
                }
                self.state.best_ask += 1;
            }
        } else if active < 0 {
            loop {
                let bid = self.state.best_bid;
                if bid < self.state.low {
                    self.state.best_bid = NO_BID;
                    self.state.low = self.state.best_ask;
                    if self.state.best_ask == NO_ASK {
                        self.state.high = NO_BID;
                    }
                    break;
                }
                if active != 0 && bid >= price && !self.levels.is_empty(bid) {
                    active = self.consume_level(bid, active, active_id, active_cookie);
                }
                if !self.levels.is_empty(bid) {
                    break;
                }
                self.state.best_bid -= 1;
            }
        }
        active
    }

    /// Fill the aggressor against the queue at `price`, oldest first.
    fn consume_level(
        &mut self,
        price: i64,
        active_volume: i64,
        active_id: SlotId,
        active_cookie: u64,
    ) -> i64 {
        let active_dir = active_volume.signum();
        let mut active_left = active_volume.abs();
        let mut head = self.levels.head(price);

        while head != NULL_SLOT && active_left > 0 {
            let passive = self.slots.volume(head);
            let passive_dir = passive.signum();
            let mut passive_left = passive.abs();
            let passive_cookie = self.slots.cookie(head);

            let filled = active_left.min(passive_left);
            passive_left -= filled;
            active_left -= filled;

            self.levels
                .set_volume(price, self.levels.volume(price) - filled * passive_dir);

            let next = self.slots.next(head);
            if passive_left == 0 {
                self.levels.set_head(price, next);
                if next == NULL_SLOT {
                    self.levels.set_tail(price, NULL_SLOT);
                }
                self.slots.free(head);
                self.state.size -= 1;
            } else {
                self.slots.set_volume(head, passive_left * passive_dir);
            }

            trace!(passive = head, aggressor = active_id, filled, price, "fill");
            self.sink.on_event(Event {
                kind: if passive_left == 0 { EventKind::Fill } else { EventKind::PartFill },
                filled: filled * passive_dir,
                active: 0,
                price,
                id: head,
                cookie: passive_cookie,
            });
            self.sink.on_event(Event {
                kind: if active_left == 0 { EventKind::Fill } else { EventKind::PartFill },
                filled: filled * active_dir,
                active: filled * active_dir,
                price,
                id: active_id,
                cookie: active_cookie,
            });

            if passive_left != 0 {
                break;
            }
            head = next;
        }

        active_left * active_dir
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Cancel a resting order.
    ///
    /// Returns the aggregate volume left at the order's price.
    ///
    /// The per-price queue is singly linked, so removal always detaches the
    /// level's head. Cancelling an order that is not at the head of its
    /// level leaves the queue inconsistent (the orders ahead of it become
    /// unreachable); callers are expected to cancel head orders only.
    ///
    /// # Errors
    /// [`BookError::NotResting`] if `id` does not address a live order.
    /// A REJECT_CANCEL is reported to the sink and nothing changes.
    pub fn cancel(&mut self, id: SlotId, cookie: u64) -> Result<i64, BookError> {
        if id >= self.slots.capacity() || self.slots.is_free(id) {
            trace!(id, cookie, "cancel rejected: not resting");
            self.sink.on_error(reject(EventKind::RejectCancel, id, cookie));
            return Err(BookError::NotResting { id });
        }
        Ok(self.remove(id, NULL_SLOT))
    }

    /// Cancel every order whose expiry timestamp is before `now`.
    ///
    /// Scans `[low, high]` and reports a CANCEL for each expired order.
    /// Unlike [`cancel`](Self::cancel), expired orders are unlinked with
    /// their queue predecessor, so any position in a level is safe.
    pub fn expire(&mut self, now: i64) -> u32 {
        let mut expired = 0;
        let mut price = self.state.low;
        while price <= self.state.high {
            let mut prev = NULL_SLOT;
            let mut id = self.levels.head(price);
            while id != NULL_SLOT {
                let next = self.slots.next(id);
                if self.slots.good_till(id).is_expired(now) {
                    self.remove(id, prev);
                    expired += 1;
                } else {
                    prev = id;
                }
                id = next;
            }
            price += 1;
        }
        if expired > 0 {
            trace!(now, expired, "orders expired");
        }
        expired
    }

    /// Detach `id` from its level given its predecessor (or [`NULL_SLOT`]
    /// to treat it as the head), free it and report a CANCEL.
    fn remove(&mut self, id: SlotId, prev: SlotId) -> i64 {
        let volume = self.slots.volume(id);
        let price = self.slots.price(id);
        let cookie = self.slots.cookie(id);
        let next = self.slots.next(id);

        if prev == NULL_SLOT {
            self.levels.set_head(price, next);
        } else {
            self.slots.set_next(prev, next);
        }
        if next == NULL_SLOT {
            self.levels.set_tail(price, prev);
        }
        self.levels.set_volume(price, self.levels.volume(price) - volume);
        self.slots.free(id);
        self.state.size -= 1;

        let left = self.levels.volume(price);
        if self.levels.is_empty(price) {
            self.rebalance(price);
        }

        trace!(id, volume, price, cookie, "order canceled");
        self.sink.on_event(Event {
            kind: EventKind::Cancel,
            filled: 0,
            active: volume,
            price,
            id,
            cookie,
        });
        left
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route an intent by kind.
    ///
    /// Returns the placed order's slot, or the canceled id.
    ///
    /// # Panics
    /// Panics for any kind other than PLACE or CANCEL.
    pub fn dispatch(
        &mut self,
        kind: EventKind,
        volume: i64,
        price: i64,
        id: SlotId,
        cookie: u64,
        good_till: GoodTill,
    ) -> Result<SlotId, BookError> {
        match kind {
            EventKind::Place => self.place(volume, price, cookie, good_till),
            EventKind::Cancel => self.cancel(id, cookie).map(|_| id),
            other => panic!("cannot dispatch {other}: only PLACE and CANCEL are commands"),
        }
    }

    /// Route a [`Command`].
    #[inline]
    pub fn dispatch_command(&mut self, cmd: &Command) -> Result<SlotId, BookError> {
        self.dispatch(cmd.kind, cmd.volume, cmd.price, cmd.id, cmd.cookie, cmd.good_till)
    }
}
