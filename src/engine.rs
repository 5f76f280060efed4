//! Engine - command loop with CPU pinning and warm-up.
//!
//! Wraps an [`OrderBook`] that records into a `Vec<OutputEvent>` and hands
//! each command's events back to the caller. With the `runtime` feature the
//! engine can drain commands from an rtrb ring buffer on a pinned thread.

use crate::command::{Command, OutputEvent};
use crate::config::BookConfig;
use crate::error::ConfigError;
use crate::order_book::OrderBook;
use crate::storage::Heap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

/// Single-threaded owner of one book.
pub struct Engine {
    /// The underlying book; its sink buffers events between commands
    pub book: OrderBook<Heap, Vec<OutputEvent>>,
}

impl Engine {
    /// Create an engine over a freshly built book.
    pub fn new(config: BookConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            book: OrderBook::with_config(config, Vec::with_capacity(64))?,
        })
    }

    /// Run the engine event loop.
    ///
    /// # Arguments
    /// * `input` - Consumer end of the command ring buffer
    /// * `output` - Producer end of the output event ring buffer
    /// * `pin_to_core` - Whether to pin to the last available CPU core
    ///
    /// Runs until the producer side of `input` is dropped and drained.
    #[cfg(feature = "runtime")]
    pub fn run(
        &mut self,
        input: &mut rtrb::Consumer<Command>,
        output: &mut rtrb::Producer<OutputEvent>,
        pin_to_core: bool,
    ) {
        if pin_to_core {
            self.pin_to_core();
        }
        self.warm_up();

        let mut dropped = 0u64;
        loop {
            while let Ok(cmd) = input.pop() {
                for event in self.process_command(cmd) {
                    // Best effort - drop if full
                    if output.push(event).is_err() {
                        dropped += 1;
                    }
                }
            }
            if input.is_abandoned() && input.is_empty() {
                break;
            }
            std::hint::spin_loop();
        }
        if dropped > 0 {
            tracing::warn!(dropped, "output ring full, events dropped");
        }
        info!(size = self.book.size(), "engine loop stopped");
    }

    /// Process a single command and return the events it produced.
    ///
    /// Rejections are reported as [`OutputEvent::Rejected`]; the error
    /// value itself is not needed here.
    #[inline]
    pub fn process_command(&mut self, cmd: Command) -> Vec<OutputEvent> {
        let _ = self.book.dispatch_command(&cmd);
        std::mem::take(self.book.sink_mut())
    }

    /// Expire orders older than `now` and return the CANCEL events.
    pub fn expire(&mut self, now: i64) -> Vec<OutputEvent> {
        self.book.expire(now);
        std::mem::take(self.book.sink_mut())
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                let pinned = core_affinity::set_for_current(*last_core);
                debug!(core = last_core.id, pinned, "engine thread pinned");
            }
        }
    }

    /// Warm up the engine by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        self.book.warm_up();
    }

    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.book.has_bids().then(|| self.book.bid())
    }

    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.book.has_asks().then(|| self.book.ask())
    }

    /// Ask minus bid, if both sides are populated.
    #[inline]
    pub fn spread(&self) -> Option<i64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    #[inline]
    pub fn order_count(&self) -> u32 {
        self.book.size()
    }

    /// Hash of the book state and every occupied level, for determinism
    /// checks across runs.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.book.state().hash(&mut hasher);
        for level in self.book.levels() {
            level.hash(&mut hasher);
            for id in self.book.orders(level.price) {
                id.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            book: OrderBook::builder()
                .sink(Vec::with_capacity(64))
                .build()
                .unwrap_or_else(|e| unreachable!("default config is valid: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{EventKind, GoodTill};

    fn engine() -> Engine {
        Engine::new(BookConfig {
            capacity: 1000,
            min_price: 0,
            max_price: 20_000,
        })
        .unwrap()
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.order_count(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.spread(), None);
    }

    #[test]
    fn test_engine_rejects_bad_config() {
        let config = BookConfig {
            capacity: 0,
            ..BookConfig::default()
        };
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_engine_process_place() {
        let mut engine = engine();
        let events = engine.process_command(Command::place(100, 10_000, 1, GoodTill::Cancelled));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Place);
        assert_eq!(engine.order_count(), 1);
        assert_eq!(engine.best_bid(), Some(10_000));
    }

    #[test]
    fn test_engine_process_cancel() {
        let mut engine = engine();
        let events = engine.process_command(Command::place(100, 10_000, 1, GoodTill::Cancelled));
        let id = match events[0] {
            OutputEvent::Event(e) => e.id,
            OutputEvent::Rejected(_) => unreachable!(),
        };

        let events = engine.process_command(Command::cancel(id, 1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Cancel);
        assert_eq!(engine.order_count(), 0);

        let events = engine.process_command(Command::cancel(id, 1));
        assert_eq!(events[0].kind(), EventKind::RejectCancel);
    }

    #[test]
    fn test_engine_spread_and_expire() {
        let mut engine = engine();
        engine.process_command(Command::place(5, 100, 1, GoodTill::Until(10)));
        engine.process_command(Command::place(-5, 103, 2, GoodTill::Cancelled));
        assert_eq!(engine.spread(), Some(3));

        let events = engine.expire(11);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Cancel);
        assert_eq!(engine.best_bid(), None);
    }

    #[test]
    fn test_engine_state_hash_determinism() {
        let mut engine1 = engine();
        let mut engine2 = engine();

        for i in 0..100i64 {
            let volume = if i % 2 == 0 { 100 } else { -100 };
            let price = 10_000 + if i % 2 == 0 { -(i % 10) } else { 1 + i % 10 };
            let cmd = Command::place(volume, price, i as u64, GoodTill::Cancelled);
            engine1.process_command(cmd);
            engine2.process_command(cmd);
        }

        assert_eq!(engine1.state_hash(), engine2.state_hash());
        engine2.process_command(Command::place(1, 9_000, 999, GoodTill::Cancelled));
        assert_ne!(engine1.state_hash(), engine2.state_hash());
    }

    #[test]
    fn test_engine_warm_up() {
        let mut engine = engine();
        engine.warm_up();
        assert_eq!(engine.order_count(), 0);
    }

    #[cfg(feature = "runtime")]
    #[test]
    fn test_engine_run_drains_ring() {
        let (mut cmd_tx, mut cmd_rx) = rtrb::RingBuffer::<Command>::new(16);
        let (mut out_tx, mut out_rx) = rtrb::RingBuffer::<OutputEvent>::new(64);

        cmd_tx.push(Command::place(10, 100, 555, GoodTill::Cancelled)).unwrap();
        cmd_tx.push(Command::place(-10, 100, 666, GoodTill::Cancelled)).unwrap();
        drop(cmd_tx);

        let mut engine = engine();
        engine.run(&mut cmd_rx, &mut out_tx, false);

        let mut kinds = Vec::new();
        while let Ok(event) = out_rx.pop() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec![EventKind::Place, EventKind::Fill, EventKind::Fill]);
    }
}
