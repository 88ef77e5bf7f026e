//! Trading-engine monitor: attaches to the demo session and prints the
//! live book once a second.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use memglass::Observer;
use trading_demo::{Quote, SESSION};

#[derive(Parser, Debug)]
#[command(name = "trading-observer", about = "Demo memglass observer")]
struct Args {
    /// Session name to attach to
    #[arg(default_value = SESSION)]
    session: String,

    /// Refresh interval in milliseconds
    #[arg(short, long, default_value_t = 1000)]
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

    println!("connecting to session '{}'...", args.session);
    let mut observer = match Observer::connect(&args.session) {
        Ok(observer) => observer,
        Err(e) => {
            eprintln!("failed to connect: {e}. Is the producer running?");
            std::process::exit(1);
        }
    };
    println!("connected to producer pid {}", observer.producer_pid());

    println!("registered types:");
    for ty in observer.types() {
        println!("  {} ({} bytes)", ty.name, ty.size);
        for field in &ty.fields {
            println!("    {} @ offset {}", field.name(), field.offset);
        }
    }
    println!();

    let interval = Duration::from_millis(args.interval);
    while RUNNING.load(Ordering::Relaxed) {
        observer.refresh();

        println!("=== trading monitor (seq {}) ===", observer.sequence());
        println!(
            "{:<8} {:>10} {:>10} {:>8} {:>8} {:>8}",
            "symbol", "bid", "ask", "bsize", "asize", "qty"
        );

        for obj in observer.objects() {
            let Some(view) = observer.view(&obj) else {
                continue;
            };

            // Consistent quote via the seqlock; skip this symbol if the
            // writer is mid-update.
            let Some(quote) = view.field("quote").try_get::<Quote>() else {
                continue;
            };
            let qty: i64 = view.field("position.quantity").get();

            println!(
                "{:<8} {:>10} {:>10} {:>8} {:>8} {:>8}",
                obj.label, quote.bid_price, quote.ask_price, quote.bid_size, quote.ask_size, qty
            );
        }
        println!();

        std::thread::sleep(interval);
    }
}
