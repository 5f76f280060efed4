//! Error types for the order book.

use crate::command::SlotId;
use thiserror::Error;

/// A rejected operation. The book is unchanged when one is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookError {
    /// No free slot left in the arena
    #[error("order arena is full ({capacity} slots)")]
    ArenaFull { capacity: u32 },

    /// Limit price outside the configured index range
    #[error("price {price} outside book range [{min}, {max}]")]
    PriceOutOfRange { price: i64, min: i64, max: i64 },

    /// Cancel target is free or unknown
    #[error("order {id} is not resting")]
    NotResting { id: SlotId },
}

/// Invalid construction parameters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("capacity must be between 1 and {max}, got {capacity}")]
    InvalidCapacity { capacity: u32, max: u32 },

    #[error("price range [{min}, {max}] is empty")]
    EmptyRange { min: i64, max: i64 },

    /// More ticks than the index can address, or touching the `NO_BID`/`NO_ASK` sentinels
    #[error("price range [{min}, {max}] is too wide")]
    RangeTooWide { min: i64, max: i64 },
}

/// A structural inconsistency found by
/// [`check_invariants`](crate::OrderBook::check_invariants).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("book invariant violated: {0}")]
pub struct InvariantError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BookError::ArenaFull { capacity: 8 }.to_string(),
            "order arena is full (8 slots)"
        );
        assert_eq!(
            BookError::PriceOutOfRange { price: 11, min: -10, max: 10 }.to_string(),
            "price 11 outside book range [-10, 10]"
        );
        assert_eq!(BookError::NotResting { id: 3 }.to_string(), "order 3 is not resting");
        assert_eq!(
            ConfigError::EmptyRange { min: 5, max: 1 }.to_string(),
            "price range [5, 1] is empty"
        );
    }
}
