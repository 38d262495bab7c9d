//! Two workers transfer money between two accounts in opposite directions.
//!
//! Run with: cargo run --bin transfer_deadlock -- [a|b|c] [config.toml]
//!
//!   a  nested locks in call order (hangs, the monitor reports the stall)
//!   b  nested locks in id order
//!   c  try-lock with randomized backoff (default)

use std::env;
use std::path::Path;
use std::process::ExitCode;

use colored::Colorize;
use threading_lab::{run_variant, DemoConfig, DemoError, Interrupt, Outcome, Variant};

fn run() -> Result<Outcome, DemoError> {
    let mut args = env::args().skip(1);
    let variant: Variant = match args.next() {
        Some(arg) => arg.parse()?,
        None => Variant::TryLock,
    };
    let config = match args.next() {
        Some(path) => DemoConfig::from_file(Path::new(&path))?,
        None => DemoConfig::default(),
    };

    println!("=== Transfer demo: {} variant ===", variant.label().bold());
    println!(
        "2 accounts x {} funds, 2 workers x {} transfers of {}\n",
        config.initial_balance, config.iterations, config.transfer_amount
    );

    let report = run_variant(variant, &config, Interrupt::new())?;
    report.print();
    Ok(report.outcome)
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match run() {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        // Deadlocked workers are still blocked; returning ends the process.
        Ok(Outcome::Stalled) => ExitCode::from(2),
        Ok(Outcome::Interrupted) => ExitCode::from(3),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            if matches!(err, DemoError::UnknownVariant(_)) {
                let known: Vec<_> = Variant::ALL.iter().map(Variant::label).collect();
                eprintln!("known variants: {}", known.join(", "));
            }
            ExitCode::FAILURE
        }
    }
}
