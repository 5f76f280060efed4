//! # arena-lob
//!
//! A single-instrument limit order book over fixed, pre-allocated storage.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one owner mutates the book through `&mut self`
//! - **Dense Price Index**: every tick in the configured range owns a FIFO
//!   queue, so best-price moves are a short linear scan
//! - **Arena Allocation**: order slots are reserved up front and reused;
//!   nothing allocates in the hot path
//! - **Price-Time Priority**: best price first, oldest order first within a
//!   price, trades print at the resting price
//! - **Synchronous Reporting**: every state change is reported to an
//!   [`EventSink`] before the operation returns
//!
//! ## Architecture
//!
//! ```text
//! [Commands] --> [OrderBook<Storage, Sink>] --> [EventSink]
//!                    |                |
//!              [SlotStore]      [LevelStore]
//!              order arena      price index
//! ```
//!
//! ## Example
//!
//! ```
//! use arena_lob::{OrderBook, OutputEvent, EventKind};
//!
//! let mut book = OrderBook::builder()
//!     .range(-10_000, 10_000)
//!     .sink(Vec::<OutputEvent>::new())
//!     .build()
//!     .unwrap();
//!
//! book.place_gtc(10, 100, 555).unwrap();
//! book.place_gtc(-10, 101, 666).unwrap();
//! assert_eq!((book.bid(), book.ask()), (100, 101));
//!
//! book.place_gtc(-10, 100, 777).unwrap();
//! assert!(!book.has_bids());
//! assert_eq!(book.sink().last().map(|e| e.kind()), Some(EventKind::Fill));
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod sink;
pub mod storage;

// Re-exports for convenience
pub use arena::{Arena, FlatArena, OrderSlot, SlotStore};
pub use command::{
    Command, Event, EventKind, GoodTill, OutputEvent, Reject, SlotId, NO_ASK, NO_BID, NULL_SLOT,
};
pub use config::{BookConfig, Builder};
pub use engine::Engine;
pub use error::{BookError, ConfigError, InvariantError};
pub use flow::{FlowConfig, OrderFlow};
pub use order_book::{BookState, Level, OrderBook, RestingOrder};
pub use price_level::{FlatPriceIndex, LevelStore, PriceIndex, PriceLevel};
pub use sink::{Callbacks, EventSink, NullSink, TraceSink};
pub use storage::{Flat, Heap, Storage};
