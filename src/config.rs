//! Book configuration and builder.

use crate::command::{NO_ASK, NO_BID, NULL_SLOT};
use crate::error::ConfigError;
use crate::order_book::OrderBook;
use crate::sink::{EventSink, NullSink};
use crate::storage::{Flat, Heap, Storage};
use serde::{Deserialize, Serialize};

/// Widest price range the index will allocate, in ticks.
pub const MAX_PRICE_LEVELS: i64 = 1 << 28;

/// Construction parameters. Fixed for the lifetime of a book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Maximum number of simultaneously resting orders
    pub capacity: u32,
    /// Lowest addressable price (inclusive)
    pub min_price: i64,
    /// Highest addressable price (inclusive)
    pub max_price: i64,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            capacity: 65_536,
            min_price: -100_000,
            max_price: 100_000,
        }
    }
}

impl BookConfig {
    /// Check the parameters before any memory is reserved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 || self.capacity >= NULL_SLOT {
            return Err(ConfigError::InvalidCapacity {
                capacity: self.capacity,
                max: NULL_SLOT - 1,
            });
        }
        if self.min_price > self.max_price {
            return Err(ConfigError::EmptyRange {
                min: self.min_price,
                max: self.max_price,
            });
        }
        let too_wide = self.min_price <= NO_BID
            || self.max_price >= NO_ASK
            || self
                .max_price
                .checked_sub(self.min_price)
                .map_or(true, |width| width >= MAX_PRICE_LEVELS);
        if too_wide {
            return Err(ConfigError::RangeTooWide {
                min: self.min_price,
                max: self.max_price,
            });
        }
        Ok(())
    }

    /// Number of ticks in the range
    #[inline]
    pub fn levels(&self) -> i64 {
        self.max_price - self.min_price + 1
    }
}

/// Fluent construction of an [`OrderBook`].
///
/// ```
/// use arena_lob::{OrderBook, OutputEvent};
///
/// let book = OrderBook::builder()
///     .capacity(1024)
///     .range(-10_000, 10_000)
///     .sink(Vec::<OutputEvent>::new())
///     .build()
///     .unwrap();
/// assert_eq!(book.size(), 0);
/// ```
#[derive(Debug)]
pub struct Builder<K = NullSink> {
    config: BookConfig,
    sink: K,
}

impl Builder<NullSink> {
    pub fn new() -> Self {
        Self {
            config: BookConfig::default(),
            sink: NullSink,
        }
    }
}

impl Default for Builder<NullSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EventSink> Builder<K> {
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn range(mut self, min_price: i64, max_price: i64) -> Self {
        self.config.min_price = min_price;
        self.config.max_price = max_price;
        self
    }

    /// Replace all parameters at once
    pub fn config(mut self, config: BookConfig) -> Self {
        self.config = config;
        self
    }

    /// Route notifications to `sink`
    pub fn sink<T: EventSink>(self, sink: T) -> Builder<T> {
        Builder {
            config: self.config,
            sink,
        }
    }

    /// Build over the vector-of-structs backend.
    pub fn build(self) -> Result<OrderBook<Heap, K>, ConfigError> {
        self.build_in::<Heap>()
    }

    /// Build over the flat word-buffer backend.
    pub fn build_flat(self) -> Result<OrderBook<Flat, K>, ConfigError> {
        self.build_in::<Flat>()
    }

    /// Build over any backend.
    pub fn build_in<S: Storage>(self) -> Result<OrderBook<S, K>, ConfigError> {
        OrderBook::with_config(self.config, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.levels(), 200_001);
    }

    #[test]
    fn test_invalid_capacity() {
        let config = BookConfig {
            capacity: 0,
            ..BookConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCapacity { capacity: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_ranges() {
        let inverted = BookConfig {
            min_price: 10,
            max_price: -10,
            ..BookConfig::default()
        };
        assert!(matches!(inverted.validate(), Err(ConfigError::EmptyRange { .. })));

        let huge = BookConfig {
            min_price: i64::MIN,
            max_price: i64::MAX,
            ..BookConfig::default()
        };
        assert!(matches!(huge.validate(), Err(ConfigError::RangeTooWide { .. })));
    }

    #[test]
    fn test_builder_overrides() {
        let book = Builder::new().capacity(8).range(0, 10).build().unwrap();
        assert_eq!(book.capacity(), 8);
        assert_eq!(book.min_price(), 0);
        assert_eq!(book.max_price(), 10);
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        assert!(Builder::new().range(5, 4).build_flat().is_err());
    }
}
