//! One worker adds 1, another subtracts 1, the same number of times.
//!
//! Run with: cargo run --bin counter_race -- [iterations]

use std::env;
use std::sync::Arc;

use colored::Colorize;
use threading_lab::counter::{race, AtomicCounter, LockedCounter, RacyCounter, SharedCounter};

fn report<C: SharedCounter + Default>(label: &str, iterations: u64) {
    match race(Arc::new(C::default()), iterations) {
        Ok(0) => println!("{:>8}: {}", label, "0".green()),
        Ok(value) => println!("{:>8}: {} (lost updates)", label, value.to_string().red()),
        Err(_) => log::error!("{label} counter worker panicked"),
    }
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let iterations = match env::args().nth(1).map(|arg| arg.parse::<u64>()) {
        Some(Ok(n)) => n,
        Some(Err(err)) => {
            log::warn!("ignoring iteration count: {err}");
            1_000_000
        }
        None => 1_000_000,
    };

    println!("=== Counter race: {iterations} increments vs {iterations} decrements ===\n");
    report::<RacyCounter>("racy", iterations);
    report::<AtomicCounter>("atomic", iterations);
    report::<LockedCounter>("locked", iterations);
}
