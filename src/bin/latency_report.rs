use arena_lob::flow::{apply_intent, is_expiry_tick, Applied};
use arena_lob::{BookConfig, FlowConfig, NullSink, OrderBook, OrderFlow};
use clap::Parser;
use hdrhistogram::Histogram;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Per-command latency of the book under synthetic Poisson order flow.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Args {
    /// Generator steps to run (each yields a handful of commands)
    #[arg(long, default_value_t = 1_000_000)]
    steps: u64,

    /// Order arena capacity
    #[arg(long, default_value_t = 65_536)]
    capacity: u32,

    /// Lowest addressable price
    #[arg(long, default_value_t = -100_000, allow_hyphen_values = true)]
    min_price: i64,

    /// Highest addressable price
    #[arg(long, default_value_t = 100_000)]
    max_price: i64,

    /// Seed for the order flow generator
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Pin the measuring thread to the last core
    #[arg(long)]
    pin: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    println!("Preparing Latency Benchmark...");

    if args.pin {
        if let Some(core) = core_affinity::get_core_ids().and_then(|ids| ids.last().copied()) {
            core_affinity::set_for_current(core);
        }
    }

    let mut book = OrderBook::builder()
        .config(BookConfig {
            capacity: args.capacity,
            min_price: args.min_price,
            max_price: args.max_price,
        })
        .sink(NullSink)
        .build()?;
    book.warm_up();

    let config = FlowConfig {
        seed: args.seed,
        ..FlowConfig::default()
    };
    let mut flow = OrderFlow::new(config);
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 1_000_000, 3)?;

    println!("Running {} generator steps...", args.steps);

    let mut intents = Vec::with_capacity(16);
    let mut ops = 0u64;
    let mut rejected = 0u64;
    let mut total_duration = Duration::ZERO;

    for _ in 0..args.steps {
        flow.step(&mut intents);
        for intent in &intents {
            // Critical measurement section
            let start = Instant::now();
            let applied = std::hint::black_box(apply_intent(&mut book, intent, &config));
            let elapsed = start.elapsed();

            if matches!(applied, Applied::Dispatched(Err(_))) {
                rejected += 1;
            }
            if !matches!(applied, Applied::Skipped) {
                ops += 1;
                // Saturate outliers instead of failing the run
                histogram.saturating_record(elapsed.as_nanos() as u64);
                total_duration += elapsed;
            }
            if is_expiry_tick(intent.time, &config) {
                book.expire(intent.time);
            }
        }
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", ops);
    println!("Rejected:   {}", rejected);
    println!("Resting:    {}", book.size());
    println!("Throughput: {:.2} ops/sec", ops as f64 / total_duration.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    let mut low = 0;
    for v in histogram.iter_log(16, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("{:6} ns - {:6} ns: {:10} count", low, v.value_iterated_to(), count);
        }
        low = v.value_iterated_to() + 1;
    }
    Ok(())
}
