//! Price Level Index - dense table of FIFO queues, one per tick.
//!
//! Every price in `[min_price, max_price]` owns a [`PriceLevel`]: the signed
//! aggregate of the volume resting there plus the head and tail slot of a
//! singly-linked queue threaded through the arena's `next` links.
//!
//! A level is empty iff its head is [`NULL_SLOT`].

use crate::arena::{decode_link, encode_link};
use crate::command::{SlotId, NULL_SLOT};
use std::fmt;

/// Per-price access over a bounded, dense price range.
///
/// Prices outside `[min_price(), max_price()]` panic on the slice index;
/// the book rejects them before they reach the index.
pub trait LevelStore {
    /// Allocate an empty level for every tick in `[min_price, max_price]`.
    fn with_range(min_price: i64, max_price: i64) -> Self
    where
        Self: Sized;

    fn min_price(&self) -> i64;
    fn max_price(&self) -> i64;

    /// Signed aggregate of all volume resting at `price`
    fn volume(&self, price: i64) -> i64;
    fn set_volume(&mut self, price: i64, volume: i64);

    /// Oldest order at `price`
    fn head(&self, price: i64) -> SlotId;
    fn set_head(&mut self, price: i64, id: SlotId);

    /// Newest order at `price`
    fn tail(&self, price: i64) -> SlotId;
    fn set_tail(&mut self, price: i64, id: SlotId);

    #[inline]
    fn contains_price(&self, price: i64) -> bool {
        price >= self.min_price() && price <= self.max_price()
    }

    /// True iff no order rests at `price`.
    #[inline]
    fn is_empty(&self, price: i64) -> bool {
        self.head(price) == NULL_SLOT
    }

    /// Detach the queue at `price` and zero its aggregate. The queued slots
    /// are left untouched; freeing them is the caller's job.
    #[inline]
    fn reset(&mut self, price: i64) {
        self.set_volume(price, 0);
        self.set_head(price, NULL_SLOT);
        self.set_tail(price, NULL_SLOT);
    }
}

/// The queue of orders at one price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    /// Signed total volume (positive bids, negative asks)
    pub volume: i64,
    /// Index of the oldest order (highest priority, first to match)
    pub head: SlotId,
    /// Index of the newest order (last to match)
    pub tail: SlotId,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new() -> Self {
        Self {
            volume: 0,
            head: NULL_SLOT,
            tail: NULL_SLOT,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head == NULL_SLOT
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// Vector-of-structs price index.
pub struct PriceIndex {
    levels: Vec<PriceLevel>,
    min_price: i64,
    max_price: i64,
}

impl PriceIndex {
    /// Create an index covering `[min_price, max_price]`.
    ///
    /// # Panics
    /// Panics if `min_price > max_price`.
    pub fn new(min_price: i64, max_price: i64) -> Self {
        assert!(min_price <= max_price, "Empty price range");
        let len = (max_price - min_price + 1) as usize;
        Self {
            levels: vec![PriceLevel::new(); len],
            min_price,
            max_price,
        }
    }

    #[inline]
    fn slot(&self, price: i64) -> usize {
        debug_assert!(self.contains_price(price), "Price out of range");
        (price - self.min_price) as usize
    }

    /// Borrow the level at `price`.
    #[inline]
    pub fn get(&self, price: i64) -> &PriceLevel {
        &self.levels[self.slot(price)]
    }

    #[inline]
    pub fn get_mut(&mut self, price: i64) -> &mut PriceLevel {
        let at = self.slot(price);
        &mut self.levels[at]
    }
}

impl LevelStore for PriceIndex {
    fn with_range(min_price: i64, max_price: i64) -> Self {
        Self::new(min_price, max_price)
    }

    #[inline]
    fn min_price(&self) -> i64 {
        self.min_price
    }

    #[inline]
    fn max_price(&self) -> i64 {
        self.max_price
    }

    #[inline]
    fn volume(&self, price: i64) -> i64 {
        self.get(price).volume
    }

    #[inline]
    fn set_volume(&mut self, price: i64, volume: i64) {
        self.get_mut(price).volume = volume;
    }

    #[inline]
    fn head(&self, price: i64) -> SlotId {
        self.get(price).head
    }

    #[inline]
    fn set_head(&mut self, price: i64, id: SlotId) {
        self.get_mut(price).head = id;
    }

    #[inline]
    fn tail(&self, price: i64) -> SlotId {
        self.get(price).tail
    }

    #[inline]
    fn set_tail(&mut self, price: i64, id: SlotId) {
        self.get_mut(price).tail = id;
    }

    #[inline]
    fn reset(&mut self, price: i64) {
        *self.get_mut(price) = PriceLevel::new();
    }
}

impl fmt::Debug for PriceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceIndex")
            .field("min_price", &self.min_price)
            .field("max_price", &self.max_price)
            .finish()
    }
}

const VOLUME: usize = 0;
const HEAD: usize = 1;
const TAIL: usize = 2;
const STRIDE: usize = 3;

/// Flat word-buffer price index. Head and tail links are stored biased by
/// one so a zeroed buffer is a table of empty levels.
pub struct FlatPriceIndex {
    words: Box<[i64]>,
    min_price: i64,
    max_price: i64,
}

impl FlatPriceIndex {
    /// Create a flat index covering `[min_price, max_price]`.
    ///
    /// # Panics
    /// Panics if `min_price > max_price`.
    pub fn new(min_price: i64, max_price: i64) -> Self {
        assert!(min_price <= max_price, "Empty price range");
        let len = (max_price - min_price + 1) as usize;
        Self {
            words: vec![0i64; len * STRIDE].into_boxed_slice(),
            min_price,
            max_price,
        }
    }

    #[inline]
    fn field(&self, price: i64, offset: usize) -> usize {
        debug_assert!(self.contains_price(price), "Price out of range");
        (price - self.min_price) as usize * STRIDE + offset
    }
}

impl LevelStore for FlatPriceIndex {
    fn with_range(min_price: i64, max_price: i64) -> Self {
        Self::new(min_price, max_price)
    }

    #[inline]
    fn min_price(&self) -> i64 {
        self.min_price
    }

    #[inline]
    fn max_price(&self) -> i64 {
        self.max_price
    }

    #[inline]
    fn volume(&self, price: i64) -> i64 {
        self.words[self.field(price, VOLUME)]
    }

    #[inline]
    fn set_volume(&mut self, price: i64, volume: i64) {
        let at = self.field(price, VOLUME);
        self.words[at] = volume;
    }

    #[inline]
    fn head(&self, price: i64) -> SlotId {
        decode_link(self.words[self.field(price, HEAD)])
    }

    #[inline]
    fn set_head(&mut self, price: i64, id: SlotId) {
        let at = self.field(price, HEAD);
        self.words[at] = encode_link(id);
    }

    #[inline]
    fn tail(&self, price: i64) -> SlotId {
        decode_link(self.words[self.field(price, TAIL)])
    }

    #[inline]
    fn set_tail(&mut self, price: i64, id: SlotId) {
        let at = self.field(price, TAIL);
        self.words[at] = encode_link(id);
    }
}

impl fmt::Debug for FlatPriceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatPriceIndex")
            .field("min_price", &self.min_price)
            .field("max_price", &self.max_price)
            .finish()
    }
}
