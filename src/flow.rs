//! Synthetic order flow - a seeded Poisson generator and a driver that
//! feeds it into a book.
//!
//! Every step draws, for each side, a Poisson number of aggressive orders,
//! cancels and passive limit orders. The generator tracks its own notion of
//! the touch: each side starts with `volume` lots at the quote, passive
//! orders add to it, aggression and cancels take from it, and once a side is
//! used up both quotes shift one tick and are replenished.
//!
//! The generator never looks at the book. [`apply_intent`] resolves a
//! cancel intent to the head order at the book's best price, which keeps
//! every cancel at the front of its queue.

use crate::command::{EventKind, GoodTill, SlotId, NULL_SLOT};
use crate::error::BookError;
use crate::order_book::OrderBook;
use crate::sink::EventSink;
use crate::storage::Storage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Generator and driver parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Mean aggressive orders per side per step
    pub market_intensity: f64,
    /// Mean passive limit orders per side per step
    pub limit_intensity: f64,
    /// Mean cancels per side per step
    pub cancel_intensity: f64,
    /// Initial bid quote (the ask starts one tick above)
    pub price: i64,
    /// Lots available at each quote after a replenish
    pub volume: i64,
    /// Orders expire this many ticks after they are emitted
    pub ttl: i64,
    /// Run an expiry sweep whenever the clock is a multiple of this
    pub expire_every: i64,
    pub seed: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            market_intensity: 1.0,
            limit_intensity: 2.0,
            cancel_intensity: 10.0,
            price: 100,
            volume: 1000,
            ttl: 10,
            expire_every: 10_000,
            seed: 42,
        }
    }
}

/// One generated action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intent {
    /// [`EventKind::Place`] or [`EventKind::Cancel`]
    pub kind: EventKind,
    /// Signed volume. For cancels, the sign picks the side whose best
    /// level's head is targeted.
    pub volume: i64,
    pub price: i64,
    /// Generator clock, also used as the order cookie
    pub time: i64,
}

/// What [`apply_intent`] did with an intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Passed to the book
    Dispatched(Result<SlotId, BookError>),
    /// Cancel with nothing to target on its side
    Skipped,
}

/// Counters collected by [`OrderFlow::drive`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowStats {
    pub intents: u64,
    pub dispatched: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub expired: u64,
}

/// Seeded Poisson order generator.
pub struct OrderFlow {
    config: FlowConfig,
    rng: ChaCha8Rng,
    time: i64,
    best_bid: i64,
    best_ask: i64,
    bid_volume: i64,
    ask_volume: i64,
}

impl OrderFlow {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            time: 0,
            best_bid: config.price,
            best_ask: config.price + 1,
            bid_volume: config.volume,
            ask_volume: config.volume,
        }
    }

    #[inline]
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Generator clock
    #[inline]
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Current (bid, ask) quotes of the generator
    #[inline]
    pub fn quotes(&self) -> (i64, i64) {
        (self.best_bid, self.best_ask)
    }

    /// Draw from Poisson(`lambda`) by multiplying uniforms (Knuth).
    pub fn poisson(&mut self, lambda: f64) -> u32 {
        let limit = (-lambda).exp();
        let mut k = 0;
        let mut p = 1.0;
        loop {
            p *= self.rng.gen::<f64>();
            if p <= limit {
                return k;
            }
            k += 1;
        }
    }

    /// Generate one step worth of intents into `out` (cleared first).
    pub fn step(&mut self, out: &mut Vec<Intent>) {
        out.clear();
        if self.time == 0 {
            self.replenish(0, out);
        }

        let market = self.config.market_intensity;
        let cancel = self.config.cancel_intensity;
        let limit = self.config.limit_intensity;

        for side in [1i64, -1] {
            let k = self.poisson(market) as i64;
            if k > 0 {
                self.emit(Action::Aggress, side * k, out);
            }
            let k = self.poisson(cancel) as i64;
            if k > 0 {
                self.emit(Action::Cancel, side * k, out);
            }
            let k = self.poisson(limit) as i64;
            if k > 0 {
                self.emit(Action::Rest, side * k, out);
            }
        }
    }

    fn emit(&mut self, action: Action, lots: i64, out: &mut Vec<Intent>) {
        let (kind, sign) = match action {
            Action::Aggress => (EventKind::Place, -1),
            Action::Cancel => (EventKind::Cancel, -1),
            Action::Rest => (EventKind::Place, 1),
        };

        self.time += 1;
        if lots > 0 {
            out.push(Intent {
                kind,
                volume: lots * sign,
                price: self.best_bid,
                time: self.time,
            });
            self.bid_volume += lots.abs() * sign;
            if self.bid_volume <= 0 {
                self.replenish(1, out);
            }
        } else {
            out.push(Intent {
                kind,
                volume: lots * sign,
                price: self.best_ask,
                time: self.time,
            });
            self.ask_volume += lots.abs() * sign;
            if self.ask_volume <= 0 {
                self.replenish(-1, out);
            }
        }
    }

    /// Shift both quotes by `delta` and post fresh volume on each side.
    fn replenish(&mut self, delta: i64, out: &mut Vec<Intent>) {
        self.best_bid += delta;
        self.best_ask += delta;
        self.bid_volume = self.config.volume;
        self.ask_volume = self.config.volume;

        self.time += 1;
        out.push(Intent {
            kind: EventKind::Place,
            volume: self.bid_volume,
            price: self.best_bid,
            time: self.time,
        });
        self.time += 1;
        out.push(Intent {
            kind: EventKind::Place,
            volume: -self.ask_volume,
            price: self.best_ask,
            time: self.time,
        });
        debug!(bid = self.best_bid, ask = self.best_ask, "flow quotes shifted");
    }

    /// Run `steps` generator steps against `book`.
    pub fn drive<S: Storage, K: EventSink>(
        &mut self,
        book: &mut OrderBook<S, K>,
        steps: u64,
    ) -> FlowStats {
        let mut stats = FlowStats::default();
        let mut intents = Vec::with_capacity(16);
        for _ in 0..steps {
            self.step(&mut intents);
            for intent in &intents {
                stats.intents += 1;
                match apply_intent(book, intent, &self.config) {
                    Applied::Dispatched(Ok(_)) => stats.dispatched += 1,
                    Applied::Dispatched(Err(_)) => {
                        stats.dispatched += 1;
                        stats.rejected += 1;
                    }
                    Applied::Skipped => stats.skipped += 1,
                }
                if is_expiry_tick(intent.time, &self.config) {
                    stats.expired += book.expire(intent.time) as u64;
                }
            }
        }
        stats
    }
}

#[derive(Clone, Copy)]
enum Action {
    /// Cross the spread (sell at the bid, buy at the ask)
    Aggress,
    Cancel,
    /// Join the quote
    Rest,
}

/// True when `time` falls on an expiry sweep.
#[inline]
pub fn is_expiry_tick(time: i64, config: &FlowConfig) -> bool {
    config.expire_every > 0 && time % config.expire_every == 0
}

/// Feed one intent into `book`.
///
/// Places are dispatched as-is with cookie `time` and an expiry `ttl`
/// ticks out. Cancels target the head order at the best bid (positive
/// volume) or best ask (negative volume) and are skipped if that side is
/// empty.
pub fn apply_intent<S: Storage, K: EventSink>(
    book: &mut OrderBook<S, K>,
    intent: &Intent,
    config: &FlowConfig,
) -> Applied {
    let good_till = GoodTill::Until(intent.time + config.ttl);
    match intent.kind {
        EventKind::Cancel => {
            let price = if intent.volume > 0 {
                if !book.has_bids() {
                    return Applied::Skipped;
                }
                book.bid()
            } else {
                if !book.has_asks() {
                    return Applied::Skipped;
                }
                book.ask()
            };
            let id = book.head(price);
            let Some(order) = book.order(id) else {
                return Applied::Skipped;
            };
            Applied::Dispatched(book.dispatch(
                EventKind::Cancel,
                intent.volume,
                price,
                id,
                order.cookie,
                good_till,
            ))
        }
        kind => Applied::Dispatched(book.dispatch(
            kind,
            intent.volume,
            intent.price,
            NULL_SLOT,
            intent.time as u64,
            good_till,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::OutputEvent;

    fn book() -> OrderBook<crate::storage::Heap, Vec<OutputEvent>> {
        OrderBook::builder()
            .capacity(4096)
            .range(-10_000, 10_000)
            .sink(Vec::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_step_posts_quotes() {
        let mut flow = OrderFlow::new(FlowConfig::default());
        let mut out = Vec::new();
        flow.step(&mut out);

        assert_eq!(
            out[0],
            Intent {
                kind: EventKind::Place,
                volume: 1000,
                price: 100,
                time: 1
            }
        );
        assert_eq!(
            out[1],
            Intent {
                kind: EventKind::Place,
                volume: -1000,
                price: 101,
                time: 2
            }
        );
        for pair in out.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
    }

    #[test]
    fn test_poisson_mean() {
        let mut flow = OrderFlow::new(FlowConfig::default());
        let n = 20_000;
        let total: u64 = (0..n).map(|_| flow.poisson(2.0) as u64).sum();
        let mean = total as f64 / n as f64;
        assert!((mean - 2.0).abs() < 0.1, "mean was {mean}");
    }

    #[test]
    fn test_same_seed_same_flow() {
        let mut a = OrderFlow::new(FlowConfig::default());
        let mut b = OrderFlow::new(FlowConfig::default());
        let (mut out_a, mut out_b) = (Vec::new(), Vec::new());
        for _ in 0..100 {
            a.step(&mut out_a);
            b.step(&mut out_b);
            assert_eq!(out_a, out_b);
        }
    }

    #[test]
    fn test_quotes_shift_when_side_depleted() {
        let config = FlowConfig {
            volume: 1,
            market_intensity: 0.0,
            limit_intensity: 0.0,
            ..FlowConfig::default()
        };
        let mut flow = OrderFlow::new(config);
        let mut out = Vec::new();
        flow.step(&mut out);

        // Opening quotes, then each side's cancel burst exhausts it and the
        // quotes are re-posted one tick up (bid side) and back down (ask side).
        let shape: Vec<_> = out.iter().map(|i| (i.kind, i.price)).collect();
        assert_eq!(
            shape,
            vec![
                (EventKind::Place, 100),
                (EventKind::Place, 101),
                (EventKind::Cancel, 100),
                (EventKind::Place, 101),
                (EventKind::Place, 102),
                (EventKind::Cancel, 102),
                (EventKind::Place, 100),
                (EventKind::Place, 101),
            ]
        );
        assert_eq!(flow.quotes(), (100, 101));
    }

    #[test]
    fn test_cancel_skipped_on_empty_side() {
        let mut book = book();
        let intent = Intent {
            kind: EventKind::Cancel,
            volume: 3,
            price: 100,
            time: 1,
        };
        assert_eq!(apply_intent(&mut book, &intent, &FlowConfig::default()), Applied::Skipped);
        assert!(book.sink().is_empty());
    }

    #[test]
    fn test_cancel_targets_head_of_best_level() {
        let mut book = book();
        let first = book.place_gtc(5, 100, 11).unwrap();
        book.place_gtc(5, 100, 12).unwrap();
        book.sink_mut().clear();

        let intent = Intent {
            kind: EventKind::Cancel,
            volume: 1,
            price: 0,
            time: 9,
        };
        let applied = apply_intent(&mut book, &intent, &FlowConfig::default());
        assert_eq!(applied, Applied::Dispatched(Ok(first)));
        match book.sink()[0] {
            OutputEvent::Event(e) => {
                assert_eq!(e.kind, EventKind::Cancel);
                assert_eq!(e.cookie, 11);
            }
            OutputEvent::Rejected(r) => panic!("unexpected reject {r:?}"),
        }
    }

    #[test]
    fn test_drive_keeps_book_consistent() {
        let mut book = book();
        let mut flow = OrderFlow::new(FlowConfig {
            expire_every: 100,
            ..FlowConfig::default()
        });
        let stats = flow.drive(&mut book, 2_000);

        assert!(stats.intents > 0);
        assert_eq!(stats.intents, stats.dispatched + stats.skipped);
        assert!(stats.expired > 0);
        assert!(book.check_invariants().is_ok());
    }
}
