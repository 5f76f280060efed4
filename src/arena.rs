//! Order Arena - fixed-capacity slot store for resting orders.
//!
//! The arena pre-allocates every slot at construction; nothing grows in the
//! hot path. A slot is free iff its volume is zero. Allocation probes forward
//! from the last handed-out slot, wrapping around once over the capacity.
//!
//! Two layouts implement [`SlotStore`]:
//! - [`Arena`]: a vector of cache-line aligned [`OrderSlot`] structs
//! - [`FlatArena`]: one contiguous `i64` word buffer with a fixed stride

use crate::command::{GoodTill, SlotId, NULL_SLOT};
use std::fmt;

/// Field access and allocation over a fixed set of order slots.
///
/// Accessors take a slot id in `0..capacity()`. Ids are checked with
/// `debug_assert!` only; an out-of-range id panics on the slice index.
pub trait SlotStore {
    /// Allocate storage for `capacity` free slots.
    fn with_capacity(capacity: u32) -> Self
    where
        Self: Sized;

    /// Total number of slots
    fn capacity(&self) -> u32;

    fn volume(&self, id: SlotId) -> i64;
    fn set_volume(&mut self, id: SlotId, volume: i64);

    fn price(&self, id: SlotId) -> i64;
    fn set_price(&mut self, id: SlotId, price: i64);

    /// Next order at the same price, or [`NULL_SLOT`]
    fn next(&self, id: SlotId) -> SlotId;
    fn set_next(&mut self, id: SlotId, next: SlotId);

    fn cookie(&self, id: SlotId) -> u64;
    fn set_cookie(&mut self, id: SlotId, cookie: u64);

    fn good_till(&self, id: SlotId) -> GoodTill;
    fn set_good_till(&mut self, id: SlotId, good_till: GoodTill);

    /// Slot the next probe starts from
    fn cursor(&self) -> SlotId;
    fn set_cursor(&mut self, id: SlotId);

    /// Touch every slot so the OS maps all pages up front.
    fn warm_up(&mut self);

    /// A slot with zero volume holds no order.
    #[inline]
    fn is_free(&self, id: SlotId) -> bool {
        self.volume(id) == 0
    }

    /// Reserve a free slot.
    ///
    /// Probes forward from the cursor (inclusive), wrapping over the
    /// capacity. The slot is not marked used until a non-zero volume is
    /// written to it, so an order that never rests leaves it free.
    ///
    /// # Complexity
    /// O(1) while the arena is sparse, O(capacity) when nearly full.
    fn allocate(&mut self) -> Option<SlotId> {
        let capacity = self.capacity() as u64;
        let start = self.cursor() as u64;
        for step in 0..capacity {
            let id = ((start + step) % capacity) as SlotId;
            if self.is_free(id) {
                self.set_cursor(id);
                return Some(id);
            }
        }
        None
    }

    /// Zero every field of a slot, making it eligible for reuse.
    #[inline]
    fn free(&mut self, id: SlotId) {
        self.set_volume(id, 0);
        self.set_price(id, 0);
        self.set_next(id, NULL_SLOT);
        self.set_cookie(id, 0);
        self.set_good_till(id, GoodTill::Cancelled);
    }

    /// Number of occupied slots. Scans the whole arena.
    fn occupied(&self) -> u32 {
        (0..self.capacity()).filter(|&id| !self.is_free(id)).count() as u32
    }
}

/// A single resting order - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field      | Type     | Offset | Size |
/// |------------|----------|--------|------|
/// | volume     | i64      | 0      | 8    |
/// | price      | i64      | 8      | 8    |
/// | cookie     | u64      | 16     | 8    |
/// | good_till  | GoodTill | 24     | 16   |
/// | next       | u32      | 40     | 4    |
/// | (padding)  | -        | 44     | 20   |
/// | **Total**  |          |        | 64   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OrderSlot {
    /// Signed remaining volume; positive bids, negative asks, zero free
    pub volume: i64,
    /// Price level the order rests at
    pub price: i64,
    /// Caller correlation id echoed on every event
    pub cookie: u64,
    pub good_till: GoodTill,
    /// Next order at the same price
    pub next: SlotId,
}

const _: () = assert!(
    std::mem::size_of::<OrderSlot>() == 64,
    "OrderSlot must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<OrderSlot>() == 64,
    "OrderSlot must be 64-byte aligned"
);

impl OrderSlot {
    /// A free slot
    pub const EMPTY: Self = Self {
        volume: 0,
        price: 0,
        cookie: 0,
        good_till: GoodTill::Cancelled,
        next: NULL_SLOT,
    };
}

impl fmt::Debug for OrderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSlot")
            .field("volume", &self.volume)
            .field("price", &self.price)
            .field("cookie", &self.cookie)
            .field("good_till", &self.good_till)
            .field("next", &self.next)
            .finish()
    }
}

/// Vector-of-structs arena.
pub struct Arena {
    slots: Vec<OrderSlot>,
    cursor: SlotId,
}

impl Arena {
    /// Create an arena with `capacity` free slots.
    ///
    /// # Panics
    /// Panics if capacity is `u32::MAX` (reserved for [`NULL_SLOT`]).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_SLOT, "Capacity must be less than NULL_SLOT");
        Self {
            slots: vec![OrderSlot::EMPTY; capacity as usize],
            cursor: 0,
        }
    }

    /// Borrow a whole slot.
    #[inline]
    pub fn get(&self, id: SlotId) -> &OrderSlot {
        debug_assert!(id < self.capacity(), "Index out of bounds");
        &self.slots[id as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: SlotId) -> &mut OrderSlot {
        debug_assert!(id < self.capacity(), "Index out of bounds");
        &mut self.slots[id as usize]
    }
}

impl SlotStore for Arena {
    fn with_capacity(capacity: u32) -> Self {
        Self::new(capacity)
    }

    #[inline]
    fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    #[inline]
    fn volume(&self, id: SlotId) -> i64 {
        self.get(id).volume
    }

    #[inline]
    fn set_volume(&mut self, id: SlotId, volume: i64) {
        self.get_mut(id).volume = volume;
    }

    #[inline]
    fn price(&self, id: SlotId) -> i64 {
        self.get(id).price
    }

    #[inline]
    fn set_price(&mut self, id: SlotId, price: i64) {
        self.get_mut(id).price = price;
    }

    #[inline]
    fn next(&self, id: SlotId) -> SlotId {
        self.get(id).next
    }

    #[inline]
    fn set_next(&mut self, id: SlotId, next: SlotId) {
        self.get_mut(id).next = next;
    }

    #[inline]
    fn cookie(&self, id: SlotId) -> u64 {
        self.get(id).cookie
    }

    #[inline]
    fn set_cookie(&mut self, id: SlotId, cookie: u64) {
        self.get_mut(id).cookie = cookie;
    }

    #[inline]
    fn good_till(&self, id: SlotId) -> GoodTill {
        self.get(id).good_till
    }

    #[inline]
    fn set_good_till(&mut self, id: SlotId, good_till: GoodTill) {
        self.get_mut(id).good_till = good_till;
    }

    #[inline]
    fn cursor(&self) -> SlotId {
        self.cursor
    }

    #[inline]
    fn set_cursor(&mut self, id: SlotId) {
        self.cursor = id;
    }

    #[inline]
    fn free(&mut self, id: SlotId) {
        *self.get_mut(id) = OrderSlot::EMPTY;
    }

    fn warm_up(&mut self) {
        for slot in &mut self.slots {
            // Volatile write to prevent optimization
            let volume = slot.volume;
            unsafe {
                std::ptr::write_volatile(&mut slot.volume, volume);
            }
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Word offsets of each field inside a flat slot.
const VOLUME: usize = 0;
const PRICE: usize = 1;
const NEXT: usize = 2;
const COOKIE: usize = 3;
const GOOD_TILL: usize = 4;
const STRIDE: usize = 5;

/// Flat word-buffer arena.
///
/// Every slot is `STRIDE` consecutive `i64` words. Links are stored biased
/// by one so an all-zero slot decodes as free with no next link.
pub struct FlatArena {
    words: Box<[i64]>,
    capacity: u32,
    cursor: SlotId,
}

impl FlatArena {
    /// Create a flat arena with `capacity` free slots.
    ///
    /// # Panics
    /// Panics if capacity is `u32::MAX` (reserved for [`NULL_SLOT`]).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_SLOT, "Capacity must be less than NULL_SLOT");
        Self {
            words: vec![0i64; capacity as usize * STRIDE].into_boxed_slice(),
            capacity,
            cursor: 0,
        }
    }

    #[inline]
    fn field(&self, id: SlotId, offset: usize) -> usize {
        debug_assert!(id < self.capacity, "Index out of bounds");
        id as usize * STRIDE + offset
    }

    #[inline]
    fn word(&self, id: SlotId, offset: usize) -> i64 {
        self.words[self.field(id, offset)]
    }

    #[inline]
    fn set_word(&mut self, id: SlotId, offset: usize, value: i64) {
        let at = self.field(id, offset);
        self.words[at] = value;
    }
}

impl SlotStore for FlatArena {
    fn with_capacity(capacity: u32) -> Self {
        Self::new(capacity)
    }

    #[inline]
    fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    fn volume(&self, id: SlotId) -> i64 {
        self.word(id, VOLUME)
    }

    #[inline]
    fn set_volume(&mut self, id: SlotId, volume: i64) {
        self.set_word(id, VOLUME, volume);
    }

    #[inline]
    fn price(&self, id: SlotId) -> i64 {
        self.word(id, PRICE)
    }

    #[inline]
    fn set_price(&mut self, id: SlotId, price: i64) {
        self.set_word(id, PRICE, price);
    }

    #[inline]
    fn next(&self, id: SlotId) -> SlotId {
        decode_link(self.word(id, NEXT))
    }

    #[inline]
    fn set_next(&mut self, id: SlotId, next: SlotId) {
        self.set_word(id, NEXT, encode_link(next));
    }

    #[inline]
    fn cookie(&self, id: SlotId) -> u64 {
        self.word(id, COOKIE) as u64
    }

    #[inline]
    fn set_cookie(&mut self, id: SlotId, cookie: u64) {
        self.set_word(id, COOKIE, cookie as i64);
    }

    #[inline]
    fn good_till(&self, id: SlotId) -> GoodTill {
        GoodTill::from_raw(self.word(id, GOOD_TILL))
    }

    #[inline]
    fn set_good_till(&mut self, id: SlotId, good_till: GoodTill) {
        self.set_word(id, GOOD_TILL, good_till.to_raw());
    }

    #[inline]
    fn cursor(&self) -> SlotId {
        self.cursor
    }

    #[inline]
    fn set_cursor(&mut self, id: SlotId) {
        self.cursor = id;
    }

    #[inline]
    fn free(&mut self, id: SlotId) {
        let start = self.field(id, 0);
        self.words[start..start + STRIDE].fill(0);
    }

    fn warm_up(&mut self) {
        for word in self.words.iter_mut() {
            let value = *word;
            unsafe {
                std::ptr::write_volatile(word, value);
            }
        }
    }
}

impl fmt::Debug for FlatArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatArena")
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Store a link biased by one: 0 encodes [`NULL_SLOT`].
#[inline]
pub(crate) fn encode_link(id: SlotId) -> i64 {
    if id == NULL_SLOT {
        0
    } else {
        id as i64 + 1
    }
}

#[inline]
pub(crate) fn decode_link(word: i64) -> SlotId {
    if word == 0 {
        NULL_SLOT
    } else {
        (word - 1) as SlotId
    }
}
