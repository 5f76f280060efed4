//! Order Book - book state, read-only queries and level iteration.
//!
//! The book owns one arena and one price index (picked by the [`Storage`]
//! backend) and keeps the derived state that makes matching cheap:
//! best bid/ask and the lowest/highest price that may hold liquidity.
//! Placement, matching and cancellation live in [`crate::matching`].

use crate::arena::SlotStore;
use crate::command::{GoodTill, SlotId, NO_ASK, NO_BID, NULL_SLOT};
use crate::config::{BookConfig, Builder};
use crate::error::{ConfigError, InvariantError};
use crate::price_level::LevelStore;
use crate::sink::{EventSink, NullSink};
use crate::storage::{Heap, Storage};
use std::fmt;
use tracing::debug;

/// Derived book state, maintained incrementally by every operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BookState {
    /// Highest resting buy price, or [`NO_BID`]
    pub best_bid: i64,
    /// Lowest resting sell price, or [`NO_ASK`]
    pub best_ask: i64,
    /// Lowest price that may hold liquidity ([`NO_ASK`] when empty)
    pub low: i64,
    /// Highest price that may hold liquidity ([`NO_BID`] when empty)
    pub high: i64,
    /// Live order count
    pub size: u32,
}

impl BookState {
    /// State of a book with nothing resting
    pub const EMPTY: Self = Self {
        best_bid: NO_BID,
        best_ask: NO_ASK,
        low: NO_ASK,
        high: NO_BID,
        size: 0,
    };
}

/// Aggregate liquidity at one price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Level {
    pub price: i64,
    /// Signed total (positive bids, negative asks)
    pub volume: i64,
}

impl Level {
    pub const fn new(price: i64, volume: i64) -> Self {
        Self { price, volume }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.price, self.volume)
    }
}

/// Copy of a resting order's fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestingOrder {
    pub id: SlotId,
    /// Signed remaining volume
    pub volume: i64,
    pub price: i64,
    pub cookie: u64,
    pub good_till: GoodTill,
    /// Next order in the same queue, or [`NULL_SLOT`]
    pub next: SlotId,
}

/// A single-instrument limit order book over fixed, pre-allocated storage.
///
/// All mutation happens through `&mut self`; the book has no interior
/// locking and expects exactly one writer.
pub struct OrderBook<S: Storage = Heap, K = NullSink> {
    pub(crate) slots: S::Slots,
    pub(crate) levels: S::Levels,
    pub(crate) state: BookState,
    pub(crate) sink: K,
}

impl OrderBook<Heap, NullSink> {
    /// Start building a book.
    pub fn builder() -> Builder<NullSink> {
        Builder::new()
    }
}

impl<S: Storage, K: EventSink> OrderBook<S, K> {
    /// Create a book from a validated configuration.
    pub fn with_config(config: BookConfig, sink: K) -> Result<Self, ConfigError> {
        config.validate()?;
        let (slots, levels) = S::create(config.capacity, config.min_price, config.max_price);
        debug!(
            capacity = config.capacity,
            min_price = config.min_price,
            max_price = config.max_price,
            "order book created"
        );
        Ok(Self {
            slots,
            levels,
            state: BookState::EMPTY,
            sink,
        })
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Best bid price, or [`NO_BID`]
    #[inline]
    pub fn bid(&self) -> i64 {
        self.state.best_bid
    }

    /// Best ask price, or [`NO_ASK`]
    #[inline]
    pub fn ask(&self) -> i64 {
        self.state.best_ask
    }

    /// Aggregate volume at the best bid (0 if there are no bids)
    pub fn bid_volume(&self) -> i64 {
        if self.has_bids() {
            self.levels.volume(self.state.best_bid)
        } else {
            0
        }
    }

    /// Aggregate volume at the best ask (negative; 0 if there are no asks)
    pub fn ask_volume(&self) -> i64 {
        if self.has_asks() {
            self.levels.volume(self.state.best_ask)
        } else {
            0
        }
    }

    #[inline]
    pub fn has_bids(&self) -> bool {
        self.state.best_bid != NO_BID
    }

    #[inline]
    pub fn has_asks(&self) -> bool {
        self.state.best_ask != NO_ASK
    }

    /// Lowest price that may hold liquidity
    #[inline]
    pub fn low(&self) -> i64 {
        self.state.low
    }

    /// Highest price that may hold liquidity
    #[inline]
    pub fn high(&self) -> i64 {
        self.state.high
    }

    /// Number of live orders
    #[inline]
    pub fn size(&self) -> u32 {
        self.state.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.size == 0
    }

    #[inline]
    pub fn state(&self) -> BookState {
        self.state
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    #[inline]
    pub fn min_price(&self) -> i64 {
        self.levels.min_price()
    }

    #[inline]
    pub fn max_price(&self) -> i64 {
        self.levels.max_price()
    }

    // ========================================================================
    // Level and Order Access
    // ========================================================================

    /// Aggregate volume at `price` (0 outside the range)
    pub fn level_volume(&self, price: i64) -> i64 {
        if self.levels.contains_price(price) {
            self.levels.volume(price)
        } else {
            0
        }
    }

    /// True iff nothing rests at `price`
    pub fn is_level_empty(&self, price: i64) -> bool {
        !self.levels.contains_price(price) || self.levels.is_empty(price)
    }

    /// Oldest order at `price`, or [`NULL_SLOT`]
    pub fn head(&self, price: i64) -> SlotId {
        if self.levels.contains_price(price) {
            self.levels.head(price)
        } else {
            NULL_SLOT
        }
    }

    /// Order queued behind `id`, or [`NULL_SLOT`]
    pub fn next(&self, id: SlotId) -> SlotId {
        if id < self.capacity() {
            self.slots.next(id)
        } else {
            NULL_SLOT
        }
    }

    /// Snapshot of a resting order, `None` if the slot is free.
    pub fn order(&self, id: SlotId) -> Option<RestingOrder> {
        if id >= self.capacity() || self.slots.is_free(id) {
            return None;
        }
        Some(RestingOrder {
            id,
            volume: self.slots.volume(id),
            price: self.slots.price(id),
            cookie: self.slots.cookie(id),
            good_till: self.slots.good_till(id),
            next: self.slots.next(id),
        })
    }

    /// Occupied bid levels, best first.
    pub fn bids(&self) -> PriceWalk<'_, S::Levels> {
        if self.has_bids() {
            PriceWalk::descending(&self.levels, self.state.best_bid, self.state.low)
        } else {
            PriceWalk::exhausted(&self.levels)
        }
    }

    /// Occupied ask levels, best first.
    pub fn asks(&self) -> PriceWalk<'_, S::Levels> {
        if self.has_asks() {
            PriceWalk::ascending(&self.levels, self.state.best_ask, self.state.high)
        } else {
            PriceWalk::exhausted(&self.levels)
        }
    }

    /// Bids (best first) followed by asks (best first).
    pub fn levels(&self) -> impl Iterator<Item = Level> + '_ {
        self.bids().chain(self.asks())
    }

    /// Slot ids queued at `price`, oldest first.
    pub fn orders(&self, price: i64) -> QueueIter<'_, S::Slots> {
        QueueIter {
            slots: &self.slots,
            id: self.head(price),
        }
    }

    /// Occupied arena slots, counted by scanning the arena.
    pub fn arena_occupancy(&self) -> u32 {
        self.slots.occupied()
    }

    // ========================================================================
    // Sink Access
    // ========================================================================

    #[inline]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    /// Consume the book, returning its sink.
    pub fn into_sink(self) -> K {
        self.sink
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Pre-fault every arena page.
    pub fn warm_up(&mut self) {
        self.slots.warm_up();
    }

    /// Free every order queued at `price` and empty the level.
    ///
    /// Returns the number of orders dropped. No events are emitted. Best
    /// prices and bounds are re-derived if the level was one of them.
    pub fn clear_level(&mut self, price: i64) -> u32 {
        if self.is_level_empty(price) {
            return 0;
        }
        let mut dropped = 0;
        let mut id = self.levels.head(price);
        while id != NULL_SLOT {
            let next = self.slots.next(id);
            self.slots.free(id);
            self.state.size -= 1;
            dropped += 1;
            id = next;
        }
        self.levels.reset(price);
        self.rebalance(price);
        dropped
    }

    /// Drop every level more than `depth` ticks behind the best price on
    /// its side. Returns the number of orders dropped.
    pub fn keep(&mut self, depth: u32) -> u32 {
        let depth = depth as i64;
        let mut dropped = 0;
        if self.has_asks() {
            let edge = self.state.best_ask.saturating_add(depth);
            let mut price = edge.saturating_add(1);
            while price <= self.state.high {
                dropped += self.clear_level(price);
                price += 1;
            }
            self.state.high = self.state.high.min(edge);
        }
        if self.has_bids() {
            let edge = self.state.best_bid.saturating_sub(depth);
            let mut price = edge.saturating_sub(1);
            while price >= self.state.low {
                dropped += self.clear_level(price);
                price -= 1;
            }
            self.state.low = self.state.low.max(edge);
        }
        debug!(depth, dropped, size = self.state.size, "book pruned");
        dropped
    }

    /// Re-derive bounds and best prices after the level at `price` emptied.
    ///
    /// Boundaries and bests only ever move inward, skipping empty levels.
    pub(crate) fn rebalance(&mut self, price: i64) {
        let st = &mut self.state;
        let levels = &self.levels;

        if st.low == st.high {
            st.best_bid = NO_BID;
            st.best_ask = NO_ASK;
            st.low = NO_ASK;
            st.high = NO_BID;
            return;
        }

        if price == st.high {
            if price == st.best_ask {
                st.best_ask = NO_ASK;
            }
            let mut p = price;
            while p > st.low && levels.is_empty(p) {
                p -= 1;
            }
            st.high = p;
        } else if price == st.low {
            if price == st.best_bid {
                st.best_bid = NO_BID;
            }
            let mut p = price;
            while p < st.high && levels.is_empty(p) {
                p += 1;
            }
            st.low = p;
        }

        if price == st.best_bid {
            let mut p = price;
            while p >= st.low && levels.is_empty(p) {
                p -= 1;
            }
            st.best_bid = if p < st.low { NO_BID } else { p };
        } else if price == st.best_ask {
            let mut p = price;
            while p <= st.high && levels.is_empty(p) {
                p += 1;
            }
            st.best_ask = if p > st.high { NO_ASK } else { p };
        }
    }

    /// Verify the structural invariants by walking the whole index.
    ///
    /// Checks that every level's aggregate equals the sum of its queue,
    /// that queued orders match the live count, that best prices sit on
    /// occupied levels inside `[low, high]` and that the book is not crossed.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let mut queued = 0u32;
        for price in self.min_price()..=self.max_price() {
            let mut sum = 0i64;
            let mut id = self.levels.head(price);
            let mut last = NULL_SLOT;
            while id != NULL_SLOT {
                let volume = self.slots.volume(id);
                if volume == 0 {
                    return Err(InvariantError(format!("free slot {id} queued at {price}")));
                }
                if self.slots.price(id) != price {
                    return Err(InvariantError(format!(
                        "slot {id} queued at {price} but priced {}",
                        self.slots.price(id)
                    )));
                }
                sum += volume;
                queued += 1;
                last = id;
                id = self.slots.next(id);
            }
            if sum != self.levels.volume(price) {
                return Err(InvariantError(format!(
                    "level {price} aggregates {} but queue sums to {sum}",
                    self.levels.volume(price)
                )));
            }
            if last != self.levels.tail(price) {
                return Err(InvariantError(format!("level {price} tail is stale")));
            }
            if sum != 0 && (price < self.state.low || price > self.state.high) {
                return Err(InvariantError(format!(
                    "level {price} outside [{}, {}]",
                    self.state.low, self.state.high
                )));
            }
        }
        if queued != self.state.size {
            return Err(InvariantError(format!(
                "{queued} orders queued but size is {}",
                self.state.size
            )));
        }
        if self.has_bids() {
            let bid = self.state.best_bid;
            if bid < self.state.low || bid > self.state.high || self.levels.volume(bid) <= 0 {
                return Err(InvariantError(format!("best bid {bid} is not an occupied bid level")));
            }
        }
        if self.has_asks() {
            let ask = self.state.best_ask;
            if ask < self.state.low || ask > self.state.high || self.levels.volume(ask) >= 0 {
                return Err(InvariantError(format!("best ask {ask} is not an occupied ask level")));
            }
        }
        if self.has_bids() && self.has_asks() && self.state.best_bid >= self.state.best_ask {
            return Err(InvariantError(format!(
                "crossed book: bid {} >= ask {}",
                self.state.best_bid, self.state.best_ask
            )));
        }
        Ok(())
    }
}

impl<S: Storage, K: EventSink> fmt::Display for OrderBook<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "**** #:{}, l:{}, h:{}, bid:{} ask:{}",
            self.size(),
            self.low(),
            self.high(),
            self.bid(),
            self.ask()
        )?;
        for level in self.levels() {
            let side = if level.volume > 0 { "BID" } else { "ASK" };
            write!(f, "{} {} {} [", side, level.price, level.volume)?;
            for id in self.orders(level.price) {
                write!(f, "{{{} {}#{}}} ", self.slots.volume(id), self.slots.cookie(id), id)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

impl<S: Storage, K> fmt::Debug for OrderBook<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("state", &self.state)
            .field("capacity", &self.slots.capacity())
            .field("min_price", &self.levels.min_price())
            .field("max_price", &self.levels.max_price())
            .finish()
    }
}

/// Walks a contiguous price range in one direction, yielding the occupied
/// levels.
pub struct PriceWalk<'a, L> {
    levels: &'a L,
    price: i64,
    last: i64,
    step: i64,
}

impl<'a, L: LevelStore> PriceWalk<'a, L> {
    fn ascending(levels: &'a L, from: i64, to: i64) -> Self {
        Self {
            levels,
            price: from.max(levels.min_price()),
            last: to.min(levels.max_price()),
            step: 1,
        }
    }

    fn descending(levels: &'a L, from: i64, to: i64) -> Self {
        Self {
            levels,
            price: from.min(levels.max_price()),
            last: to.max(levels.min_price()),
            step: -1,
        }
    }

    fn exhausted(levels: &'a L) -> Self {
        Self {
            levels,
            price: 1,
            last: 0,
            step: 1,
        }
    }

    #[inline]
    fn in_range(&self) -> bool {
        if self.step > 0 {
            self.price <= self.last
        } else {
            self.price >= self.last
        }
    }
}

impl<L: LevelStore> Iterator for PriceWalk<'_, L> {
    type Item = Level;

    fn next(&mut self) -> Option<Level> {
        while self.in_range() {
            let price = self.price;
            self.price += self.step;
            if !self.levels.is_empty(price) {
                return Some(Level::new(price, self.levels.volume(price)));
            }
        }
        None
    }
}

/// Follows the FIFO links of one price level.
pub struct QueueIter<'a, A> {
    slots: &'a A,
    id: SlotId,
}

impl<A: SlotStore> Iterator for QueueIter<'_, A> {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        if self.id == NULL_SLOT {
            return None;
        }
        let id = self.id;
        self.id = self.slots.next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::OutputEvent;
    use crate::storage::Flat;

    fn book() -> OrderBook<Heap, Vec<OutputEvent>> {
        OrderBook::builder()
            .capacity(64)
            .range(-100, 300)
            .sink(Vec::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_book() {
        let book = book();
        assert!(book.is_empty());
        assert_eq!(book.bid(), NO_BID);
        assert_eq!(book.ask(), NO_ASK);
        assert_eq!(book.low(), NO_ASK);
        assert_eq!(book.high(), NO_BID);
        assert_eq!(book.bid_volume(), 0);
        assert_eq!(book.ask_volume(), 0);
        assert_eq!(book.levels().count(), 0);
        assert!(book.check_invariants().is_ok());
    }

    #[test]
    fn test_level_iteration_order() {
        let mut book = book();
        book.place_gtc(10, 100, 1).unwrap();
        book.place_gtc(5, 98, 2).unwrap();
        book.place_gtc(-7, 103, 3).unwrap();
        book.place_gtc(-4, 110, 4).unwrap();

        let levels: Vec<_> = book.levels().collect();
        assert_eq!(
            levels,
            vec![
                Level::new(100, 10),
                Level::new(98, 5),
                Level::new(103, -7),
                Level::new(110, -4),
            ]
        );
        assert_eq!(book.bids().count(), 2);
        assert_eq!(book.asks().count(), 2);
        assert_eq!(book.low(), 98);
        assert_eq!(book.high(), 110);
    }

    #[test]
    fn test_orders_at_price_fifo() {
        let mut book = book();
        let a = book.place_gtc(1, 100, 1).unwrap();
        let b = book.place_gtc(2, 100, 2).unwrap();
        let c = book.place_gtc(3, 100, 3).unwrap();

        let queue: Vec<_> = book.orders(100).collect();
        assert_eq!(queue, vec![a, b, c]);
        assert_eq!(book.head(100), a);
        assert_eq!(book.next(a), b);
        assert_eq!(book.level_volume(100), 6);
        assert!(book.orders(101).next().is_none());
        assert!(book.orders(10_000).next().is_none());
    }

    #[test]
    fn test_order_snapshot() {
        let mut book = book();
        let id = book.place(-5, 120, 77, GoodTill::Until(50)).unwrap();

        let order = book.order(id).unwrap();
        assert_eq!(order.volume, -5);
        assert_eq!(order.price, 120);
        assert_eq!(order.cookie, 77);
        assert_eq!(order.good_till, GoodTill::Until(50));
        assert_eq!(order.next, NULL_SLOT);

        assert!(book.order(id + 1).is_none());
        assert!(book.order(NULL_SLOT).is_none());
    }

    #[test]
    fn test_clear_level_frees_slots() {
        let mut book = book();
        book.place_gtc(10, 100, 1).unwrap();
        book.place_gtc(10, 100, 2).unwrap();
        book.place_gtc(10, 99, 3).unwrap();

        assert_eq!(book.clear_level(100), 2);
        assert_eq!(book.size(), 1);
        assert_eq!(book.arena_occupancy(), 1);
        assert_eq!(book.bid(), 99);
        assert_eq!(book.high(), 99);
        assert!(book.check_invariants().is_ok());

        assert_eq!(book.clear_level(100), 0);
    }

    #[test]
    fn test_keep_prunes_deep_levels() {
        let mut book = book();
        for offset in 0..10 {
            book.place_gtc(1, 100 - offset, offset as u64).unwrap();
            book.place_gtc(-1, 101 + offset, 100 + offset as u64).unwrap();
        }
        assert_eq!(book.size(), 20);

        let dropped = book.keep(2);
        assert_eq!(dropped, 14);
        assert_eq!(book.size(), 6);
        assert_eq!(book.low(), 98);
        assert_eq!(book.high(), 103);
        assert_eq!(book.bid(), 100);
        assert_eq!(book.ask(), 101);
        assert!(book.check_invariants().is_ok());
    }

    #[test]
    fn test_display_dump() {
        let mut book = book();
        book.place_gtc(10, 100, 555).unwrap();
        book.place_gtc(-10, 101, 666).unwrap();

        let dump = book.to_string();
        assert!(dump.starts_with("**** #:2, l:100, h:101, bid:100 ask:101"));
        assert!(dump.contains("BID 100 10 [{10 555#0} ]"));
        assert!(dump.contains("ASK 101 -10 [{-10 666#1} ]"));
    }

    #[test]
    fn test_flat_backend_queries() {
        let mut book = OrderBook::builder()
            .capacity(16)
            .range(0, 50)
            .build_flat()
            .unwrap();
        book.place_gtc(3, 10, 1).unwrap();
        book.place_gtc(-2, 12, 2).unwrap();
        assert_eq!(book.bid_volume(), 3);
        assert_eq!(book.ask_volume(), -2);
        assert_eq!(book.levels().collect::<Vec<_>>(), vec![Level::new(10, 3), Level::new(12, -2)]);

        let _: &OrderBook<Flat, NullSink> = &book;
    }
}
