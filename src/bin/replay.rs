//! Replay a CSV command file through a book and write the resulting
//! events as CSV.
//!
//! Input columns: `kind,volume,price,id,cookie,good_till,time`. `kind` is
//! `PLACE` or `CANCEL`. A cancel without an `id` targets the live order
//! last placed with the same cookie. A non-empty `time` runs an expiry
//! sweep at that time before the row is applied.

use arena_lob::{
    BookConfig, Command, Event, EventKind, EventSink, GoodTill, OrderBook, OutputEvent, Reject,
    SlotId, TraceSink, NULL_SLOT,
};
use clap::Parser;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "replay")]
struct Args {
    /// Command file ("-" for stdin)
    input: PathBuf,

    /// Event file (stdout if omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 65_536)]
    capacity: u32,

    #[arg(long, default_value_t = -100_000, allow_hyphen_values = true)]
    min_price: i64,

    #[arg(long, default_value_t = 100_000)]
    max_price: i64,

    /// Print the final book to stderr
    #[arg(long)]
    dump: bool,
}

#[derive(Debug, Deserialize)]
struct CommandRow {
    kind: EventKind,
    volume: Option<i64>,
    price: Option<i64>,
    id: Option<SlotId>,
    cookie: u64,
    good_till: Option<i64>,
    time: Option<i64>,
}

#[derive(Debug, Serialize)]
struct EventRow {
    kind: EventKind,
    filled: Option<i64>,
    active: Option<i64>,
    price: Option<i64>,
    id: SlotId,
    cookie: u64,
}

impl From<OutputEvent> for EventRow {
    fn from(out: OutputEvent) -> Self {
        match out {
            OutputEvent::Event(e) => EventRow {
                kind: e.kind,
                filled: Some(e.filled),
                active: Some(e.active),
                price: Some(e.price),
                id: e.id,
                cookie: e.cookie,
            },
            OutputEvent::Rejected(r) => EventRow {
                kind: r.kind,
                filled: None,
                active: None,
                price: None,
                id: r.id,
                cookie: r.cookie,
            },
        }
    }
}

/// Records events and mirrors them to the trace log.
#[derive(Default)]
struct ReplaySink {
    events: Vec<OutputEvent>,
    trace: TraceSink,
}

impl EventSink for ReplaySink {
    fn on_event(&mut self, event: Event) {
        self.trace.on_event(event);
        self.events.on_event(event);
    }

    fn on_error(&mut self, reject: Reject) {
        self.trace.on_error(reject);
        self.events.on_error(reject);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let input: Box<dyn Read> = if args.input.as_os_str() == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(&args.input)?)
    };
    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };

    let mut book = OrderBook::builder()
        .config(BookConfig {
            capacity: args.capacity,
            min_price: args.min_price,
            max_price: args.max_price,
        })
        .sink(ReplaySink::default())
        .build()?;

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut writer = csv::Writer::from_writer(output);

    // Cookie of every live order, for cancels that omit the slot id
    let mut live: FxHashMap<u64, SlotId> = FxHashMap::default();
    let mut rows = 0u64;

    for record in reader.deserialize() {
        let row: CommandRow = record?;
        rows += 1;

        if let Some(time) = row.time {
            book.expire(time);
        }

        let cmd = match row.kind {
            EventKind::Place => Command::place(
                row.volume.unwrap_or(0),
                row.price.unwrap_or(0),
                row.cookie,
                GoodTill::from_raw(row.good_till.unwrap_or(GoodTill::RAW_GTC)),
            ),
            EventKind::Cancel => {
                let id = row
                    .id
                    .or_else(|| live.get(&row.cookie).copied())
                    .unwrap_or(NULL_SLOT);
                Command::cancel(id, row.cookie)
            }
            other => {
                warn!(row = rows, kind = %other, "skipping non-command row");
                continue;
            }
        };

        let _ = book.dispatch_command(&cmd);
        write_events(&mut writer, &mut live, &mut book.sink_mut().events)?;
    }
    write_events(&mut writer, &mut live, &mut book.sink_mut().events)?;
    writer.flush()?;

    info!(rows, resting = book.size(), bid = book.bid(), ask = book.ask(), "replay finished");
    if args.dump {
        eprint!("{book}");
    }
    Ok(())
}

fn write_events<W: Write>(
    writer: &mut csv::Writer<W>,
    live: &mut FxHashMap<u64, SlotId>,
    events: &mut Vec<OutputEvent>,
) -> Result<(), csv::Error> {
    for out in events.drain(..) {
        if let OutputEvent::Event(e) = out {
            match e.kind {
                EventKind::Place => {
                    live.insert(e.cookie, e.id);
                }
                EventKind::Cancel | EventKind::Fill => {
                    if live.get(&e.cookie) == Some(&e.id) {
                        live.remove(&e.cookie);
                    }
                }
                _ => {}
            }
        }
        writer.serialize(EventRow::from(out))?;
    }
    Ok(())
}
