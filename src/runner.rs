//! Two workers hammering two accounts in opposite directions, watched by a
//! monitor that prints progress and notices when progress stops.

use crate::account::{AccountId, OrderedAccount, TransferAccount, TryLockAccount, UnorderedAccount};
use crate::config::DemoConfig;
use crate::error::{DemoError, TransferError};
use crate::interrupt::Interrupt;
use colored::Colorize;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// =============================================================================
// Variant selection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Nested locks in call order. Deadlocks.
    Unordered,
    /// Nested locks in id order.
    Ordered,
    /// Non-blocking acquisition with backoff.
    TryLock,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Unordered, Variant::Ordered, Variant::TryLock];

    pub fn label(&self) -> &'static str {
        match self {
            Variant::Unordered => "unordered",
            Variant::Ordered => "ordered",
            Variant::TryLock => "try-lock",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Variant {
    type Err = DemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "naive" | "unordered" => Ok(Variant::Unordered),
            "b" | "ordered" | "fixed" => Ok(Variant::Ordered),
            "c" | "trylock" | "try-lock" | "lock" => Ok(Variant::TryLock),
            _ => Err(DemoError::UnknownVariant(s.to_string())),
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every worker ran all its iterations.
    Completed,
    /// Progress stopped while workers were still running.
    Stalled,
    /// At least one worker was told to stop before finishing.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub name: String,
    /// Iterations run, rejected transfers included.
    pub completed: u64,
    pub rejected: u64,
    /// The error that ended the loop early, if any.
    pub stopped_by: Option<TransferError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountReport {
    pub id: AccountId,
    /// `None` when the account was still locked at report time.
    pub balance: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DemoReport {
    pub variant: Variant,
    pub outcome: Outcome,
    pub workers: Vec<WorkerSummary>,
    pub balances: Vec<AccountReport>,
    pub initial_total: i128,
    pub total_retries: u64,
    pub elapsed: Duration,
}

impl DemoReport {
    pub fn balance_of(&self, id: AccountId) -> Option<i64> {
        self.balances
            .iter()
            .find(|report| report.id == id)
            .and_then(|report| report.balance)
    }

    /// True when every balance could be read and they add up to the
    /// starting total.
    pub fn is_conserved(&self) -> bool {
        let balances: Option<Vec<i64>> = self.balances.iter().map(|r| r.balance).collect();
        balances.is_some_and(|b| {
            b.iter().map(|&balance| i128::from(balance)).sum::<i128>() == self.initial_total
        })
    }

    pub fn print(&self) {
        let outcome = match self.outcome {
            Outcome::Completed => "completed".green().bold(),
            Outcome::Stalled => "stalled (deadlock suspected)".red().bold(),
            Outcome::Interrupted => "interrupted".yellow().bold(),
        };
        println!(
            "\n=== {} variant {} in {:.2?} ===",
            self.variant.label().bold(),
            outcome,
            self.elapsed
        );

        for worker in &self.workers {
            println!(
                "  worker {}: {} iterations, {} rejected",
                worker.name.bold(),
                worker.completed,
                worker.rejected
            );
        }
        for account in &self.balances {
            match account.balance {
                Some(balance) => println!("  account {} final balance: {}", account.id, balance),
                None => println!(
                    "  account {} final balance: {}",
                    account.id,
                    "<locked>".red()
                ),
            }
        }
        if self.variant == Variant::TryLock {
            println!("  contention retries: {}", self.total_retries);
        }

        let conservation = if self.is_conserved() {
            "conserved".green()
        } else {
            "NOT conserved".red()
        };
        println!("  total funds: {} (started at {})", conservation, self.initial_total);
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Runs the classic two-account scenario for `variant`.
pub fn run_variant(
    variant: Variant,
    config: &DemoConfig,
    interrupt: Interrupt,
) -> Result<DemoReport, DemoError> {
    config.validate()?;
    let (first, second) = (AccountId(1), AccountId(2));
    let balance = config.initial_balance;

    match variant {
        Variant::Unordered => run_pair(
            variant,
            UnorderedAccount::new(first, balance),
            UnorderedAccount::new(second, balance),
            config,
            interrupt,
        ),
        Variant::Ordered => run_pair(
            variant,
            OrderedAccount::new(first, balance),
            OrderedAccount::new(second, balance),
            config,
            interrupt,
        ),
        Variant::TryLock => run_pair(
            variant,
            TryLockAccount::with_backoff(first, balance, config.backoff),
            TryLockAccount::with_backoff(second, balance, config.backoff),
            config,
            interrupt,
        ),
    }
}

struct WorkerHandle {
    name: &'static str,
    progress: Arc<AtomicU64>,
    thread: JoinHandle<()>,
}

/// Spawns worker `a` (first → second) and worker `b` (second → first), then
/// monitors them on the calling thread until they finish or stall.
pub fn run_pair<A: TransferAccount>(
    variant: Variant,
    first: A,
    second: A,
    config: &DemoConfig,
    interrupt: Interrupt,
) -> Result<DemoReport, DemoError> {
    let first = Arc::new(first);
    let second = Arc::new(second);
    let initial_total = i128::from(first.balance()?) + i128::from(second.balance()?);

    log::info!(
        "starting {} run: {} iterations per worker, amount {}",
        variant,
        config.iterations,
        config.transfer_amount
    );

    let (done_tx, done_rx) = channel::unbounded();
    let workers = vec![
        spawn_worker(
            "a",
            Arc::clone(&first),
            Arc::clone(&second),
            config,
            &interrupt,
            done_tx.clone(),
        )?,
        spawn_worker("b", Arc::clone(&second), Arc::clone(&first), config, &interrupt, done_tx)?,
    ];

    let started = Instant::now();
    let mut summaries = Vec::with_capacity(workers.len());
    let mut next_report = started + config.report_interval();
    let mut last_total = 0;
    let mut idle_reports = 0;

    let stalled = loop {
        match done_rx.recv_deadline(next_report) {
            Ok(summary) => {
                summaries.push(summary);
                if summaries.len() == workers.len() {
                    break false;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break false,
            Err(RecvTimeoutError::Timeout) => {}
        }

        next_report += config.report_interval();
        print_progress(&workers);

        let total: u64 = workers.iter().map(|w| w.progress.load(Ordering::Relaxed)).sum();
        if total == last_total {
            idle_reports += 1;
        } else {
            idle_reports = 0;
            last_total = total;
        }
        if idle_reports >= config.stall_reports {
            log::warn!(
                "no progress for {} reports; workers look deadlocked",
                idle_reports
            );
            interrupt.trigger();
            break true;
        }
    };
    print_progress(&workers);

    let outcome = if stalled {
        // A worker may have finished between the last report and the stall.
        summaries.extend(done_rx.try_iter());
        // Blocked workers are left behind; they cannot be joined.
        for worker in &workers {
            if !summaries.iter().any(|s| s.name == worker.name) {
                summaries.push(WorkerSummary {
                    name: worker.name.to_string(),
                    completed: worker.progress.load(Ordering::Relaxed),
                    rejected: 0,
                    stopped_by: None,
                });
            }
        }
        Outcome::Stalled
    } else {
        for worker in workers {
            if worker.thread.join().is_err() {
                return Err(DemoError::WorkerPanicked {
                    name: worker.name.to_string(),
                });
            }
        }
        if summaries.iter().any(|s| s.stopped_by.is_some()) {
            Outcome::Interrupted
        } else {
            Outcome::Completed
        }
    };

    let balances = [first.as_ref(), second.as_ref()]
        .iter()
        .map(|account| AccountReport {
            id: account.id(),
            balance: match outcome {
                Outcome::Stalled => account.try_balance(),
                _ => account.balance().ok(),
            },
        })
        .collect();

    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(DemoReport {
        variant,
        outcome,
        workers: summaries,
        balances,
        initial_total,
        total_retries: first.contention_retries() + second.contention_retries(),
        elapsed: started.elapsed(),
    })
}

fn spawn_worker<A: TransferAccount>(
    name: &'static str,
    source: Arc<A>,
    target: Arc<A>,
    config: &DemoConfig,
    interrupt: &Interrupt,
    done_tx: Sender<WorkerSummary>,
) -> Result<WorkerHandle, DemoError> {
    let progress = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&progress);
    let interrupt = interrupt.clone();
    let (iterations, amount) = (config.iterations, config.transfer_amount);

    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let summary =
                run_worker(name, &*source, &*target, iterations, amount, &counter, &interrupt);
            let _ = done_tx.send(summary);
        })
        .map_err(|source| DemoError::Spawn {
            name: name.to_string(),
            source,
        })?;

    Ok(WorkerHandle {
        name,
        progress,
        thread,
    })
}

/// The worker loop: rejections are logged and skipped, anything else ends
/// the loop.
fn run_worker<A: TransferAccount>(
    name: &str,
    source: &A,
    target: &A,
    iterations: u64,
    amount: i64,
    progress: &AtomicU64,
    interrupt: &Interrupt,
) -> WorkerSummary {
    let mut summary = WorkerSummary {
        name: name.to_string(),
        completed: 0,
        rejected: 0,
        stopped_by: None,
    };

    for _ in 0..iterations {
        match source.transfer_to(amount, target, interrupt) {
            Ok(()) => {}
            Err(err) if err.is_rejection() => {
                log::warn!("worker {name}: {err}");
                summary.rejected += 1;
            }
            Err(err) => {
                log::error!("worker {name} stopping: {err}");
                summary.stopped_by = Some(err);
                break;
            }
        }
        summary.completed += 1;
        progress.fetch_add(1, Ordering::Relaxed);
    }

    log::debug!("worker {name} finished after {} iterations", summary.completed);
    summary
}

fn print_progress(workers: &[WorkerHandle]) {
    for worker in workers {
        println!(
            "Worker {} iterations: {}",
            worker.name.bold(),
            worker.progress.load(Ordering::Relaxed)
        );
    }
}
