//! Trading-engine simulation: publishes five securities and random-walks
//! their quotes until interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use memglass::{Config, Producer, Shared};
use trading_demo::{Quote, SESSION, SYMBOLS, Security, trading_schema};

#[derive(Parser, Debug)]
#[command(name = "trading-producer", about = "Demo memglass producer")]
struct Args {
    /// Session name to publish under
    #[arg(default_value = SESSION)]
    session: String,

    /// Update interval in milliseconds
    #[arg(short, long, default_value_t = 100)]
    interval: u64,
}

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn request_stop(_signal: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let handler = request_stop as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }

    let producer = match Producer::init(&args.session, Config::default(), trading_schema()) {
        Ok(producer) => producer,
        Err(e) => {
            eprintln!("failed to initialize session: {e}");
            std::process::exit(1);
        }
    };

    println!("trading engine started (pid {})", std::process::id());
    println!("press Ctrl+C to stop");

    let mut securities: Vec<Shared<Security>> = Vec::new();
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        let Some(mut sec) = producer.create::<Security>(symbol) else {
            eprintln!("failed to create security {symbol}");
            continue;
        };

        let base = 15_000 + i as i64 * 1_000;
        sec.quote.write(Quote {
            bid_price: base,
            ask_price: base + 5,
            bid_size: 100,
            ask_size: 100,
            timestamp_ns: 0,
        });
        sec.position.symbol_id = i as u32;

        println!("created {symbol}");
        securities.push(sec);
    }

    let mut rng = Xorshift::seeded();
    let interval = Duration::from_millis(args.interval);

    while RUNNING.load(Ordering::Relaxed) {
        let now = now_ns();

        for sec in &securities {
            let mut quote = sec.quote.read();
            quote.bid_price += rng.range(-10, 10);
            quote.ask_price = quote.bid_price + 5 + rng.range(0, 3);
            quote.bid_size = (quote.bid_size as i64 + rng.range(-20, 20)).max(10) as u32;
            quote.ask_size = (quote.ask_size as i64 + rng.range(-20, 20)).max(10) as u32;
            quote.timestamp_ns = now;
            sec.quote.write(quote);

            sec.position.quantity.fetch_add(rng.range(-5, 5), Ordering::Release);
        }

        std::thread::sleep(interval);
    }

    println!("\nshutting down");
    producer.shutdown();
}

/// Small deterministic PRNG; good enough for demo jitter.
struct Xorshift(u64);

impl Xorshift {
    fn seeded() -> Self {
        Self(now_ns() | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish value in `[lo, hi]`.
    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next() % (hi - lo + 1) as u64) as i64
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
