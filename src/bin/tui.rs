use arena_lob::flow::{apply_intent, is_expiry_tick};
use arena_lob::{FlowConfig, Level, NullSink, OrderBook, OrderFlow};
use arrayvec::ArrayVec;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::{io, time::Duration};

const DEPTH: usize = 15;

/// Top levels of each side, shared with the UI thread
#[derive(Default, Clone)]
struct BookSnapshot {
    bids: ArrayVec<Level, DEPTH>,
    asks: ArrayVec<Level, DEPTH>,
}

struct SharedStats {
    ops_count: AtomicU64,
    avg_latency_ns: AtomicU64,
    resting: AtomicU64,
    capacity: AtomicU64,
    flow_time: AtomicI64,
    book_snapshot: RwLock<BookSnapshot>,
}

impl SharedStats {
    fn new(capacity: u64) -> Self {
        Self {
            ops_count: AtomicU64::new(0),
            avg_latency_ns: AtomicU64::new(0),
            resting: AtomicU64::new(0),
            capacity: AtomicU64::new(capacity),
            flow_time: AtomicI64::new(0),
            book_snapshot: RwLock::new(BookSnapshot::default()),
        }
    }
}

// Price | Bar | Volume
fn render_level_bars(levels: &[Level]) -> String {
    let mut out = String::new();
    let max_volume = levels.iter().map(|l| l.volume.abs()).max().unwrap_or(1).max(1) as f32;

    for level in levels {
        let volume = level.volume.abs();
        let bar_len = ((volume as f32 / max_volume) * 20.0) as usize;
        let bar = "█".repeat(bar_len);
        out.push_str(&format!("{:>8} {:<20} {:<6}\n", level.price, bar, volume));
    }
    out
}

fn run_engine(stats: Arc<SharedStats>, capacity: u32) {
    let build = || {
        OrderBook::builder()
            .capacity(capacity)
            .range(-100_000, 100_000)
            .sink(NullSink)
            .build()
    };
    let Ok(mut book) = build() else {
        return;
    };
    book.warm_up();

    let config = FlowConfig {
        expire_every: 1_000,
        ..FlowConfig::default()
    };
    let mut flow = OrderFlow::new(config);
    let mut intents = Vec::with_capacity(16);
    let mut loop_count = 0u64;

    loop {
        // Batch processing to reduce atomic contention overhead
        const BATCH_SIZE: u64 = 1000;
        let start_batch = std::time::Instant::now();
        let mut ops = 0u64;

        for _ in 0..BATCH_SIZE {
            flow.step(&mut intents);
            for intent in &intents {
                apply_intent(&mut book, intent, &config);
                if is_expiry_tick(intent.time, &config) {
                    book.expire(intent.time);
                }
                ops += 1;
            }
        }
        loop_count += 1;

        stats.ops_count.fetch_add(ops, Ordering::Relaxed);
        let elapsed = start_batch.elapsed();
        stats
            .avg_latency_ns
            .store(elapsed.as_nanos() as u64 / ops.max(1), Ordering::Relaxed);
        stats.resting.store(book.size() as u64, Ordering::Relaxed);
        stats.flow_time.store(flow.time(), Ordering::Relaxed);

        if loop_count % 50 == 0 {
            if let Ok(mut snapshot) = stats.book_snapshot.write() {
                snapshot.bids = book.bids().take(DEPTH).collect();
                snapshot.asks = book.asks().take(DEPTH).collect();
            }
        }

        // Keep the demo running past a full arena
        if book.size() > capacity / 10 * 9 {
            book.keep(DEPTH as u32);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let capacity = 1_000_000u32;
    let stats = Arc::new(SharedStats::new(capacity as u64));
    let engine_stats = stats.clone();
    thread::spawn(move || run_engine(engine_stats, capacity));

    let mut last_ops = 0;
    let mut last_time = std::time::Instant::now();
    let mut throughput = 0.0;

    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }

        let now = std::time::Instant::now();
        if now.duration_since(last_time).as_secs_f64() >= 1.0 {
            let current_ops = stats.ops_count.load(Ordering::Relaxed);
            throughput = (current_ops - last_ops) as f64;
            last_ops = current_ops;
            last_time = now;
        }

        let snapshot = stats
            .book_snapshot
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Min(10),
                        Constraint::Length(10),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Block::default()
                .borders(Borders::ALL)
                .title("ARENA-LOB Poisson Flow Demo");
            let title = Paragraph::new("Press 'q' to quit")
                .block(header)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Cyan));
            f.render_widget(title, chunks[0]);

            let book_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);

            let bids_widget = Paragraph::new(render_level_bars(&snapshot.bids)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("BIDS")
                    .style(Style::default().fg(Color::Green)),
            );
            let asks_widget = Paragraph::new(render_level_bars(&snapshot.asks)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("ASKS")
                    .style(Style::default().fg(Color::Red)),
            );
            f.render_widget(bids_widget, book_chunks[0]);
            f.render_widget(asks_widget, book_chunks[1]);

            let ops_fmt = if throughput > 1_000_000.0 {
                format!("{:.2} M", throughput / 1_000_000.0)
            } else {
                format!("{:.0} k", throughput / 1_000.0)
            };
            let resting = stats.resting.load(Ordering::Relaxed);
            let capacity = stats.capacity.load(Ordering::Relaxed);
            let usage = (resting as f64 / capacity as f64) * 100.0;

            let stats_text = format!(
                "Throughput: {} ops/sec\nLatency (Avg Batch): {} ns\nArena Usage: {} / {} ({:.1}%)\nFlow Clock: {}",
                ops_fmt,
                stats.avg_latency_ns.load(Ordering::Relaxed),
                resting,
                capacity,
                usage,
                stats.flow_time.load(Ordering::Relaxed),
            );
            let stats_block = Paragraph::new(stats_text)
                .block(Block::default().borders(Borders::ALL).title("Engine Telemetry"))
                .style(Style::default().fg(Color::Yellow));
            f.render_widget(stats_block, chunks[2]);
        })?;
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    Ok(())
}
