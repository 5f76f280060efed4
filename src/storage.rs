//! Storage backends.
//!
//! The book is written once against [`SlotStore`] and [`LevelStore`]; a
//! [`Storage`] picks the concrete pair. [`Heap`] keeps slots and levels as
//! vectors of structs, [`Flat`] keeps both as flat `i64` word buffers.

use crate::arena::{Arena, FlatArena, SlotStore};
use crate::price_level::{FlatPriceIndex, LevelStore, PriceIndex};

/// A pairing of an order arena and a price index.
pub trait Storage {
    type Slots: SlotStore;
    type Levels: LevelStore;

    /// Build both halves for the given capacity and price range.
    fn create(capacity: u32, min_price: i64, max_price: i64) -> (Self::Slots, Self::Levels) {
        (
            Self::Slots::with_capacity(capacity),
            Self::Levels::with_range(min_price, max_price),
        )
    }
}

/// Vector-of-structs backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

impl Storage for Heap {
    type Slots = Arena;
    type Levels = PriceIndex;
}

/// Flat word-buffer backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct Flat;

impl Storage for Flat {
    type Slots = FlatArena;
    type Levels = FlatPriceIndex;
}
