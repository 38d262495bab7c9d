use super::{ensure_funds, settle, validate_amount, AccountId, BalanceCell, TransferAccount};
use crate::backoff::BackoffStrategy;
use crate::error::TransferError;
use crate::interrupt::Interrupt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::MutexGuard;

/// Observable states of one transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Start,
    TrySource,
    TryTarget,
    Commit,
    ReleaseSourceRetry,
    Retry,
    Done,
}

// The held guards travel with the state, so a state that holds a lock can
// only be left by committing or by dropping the guard.
enum Attempt<'a> {
    Start,
    TrySource,
    TryTarget(MutexGuard<'a, i64>),
    Commit(MutexGuard<'a, i64>, MutexGuard<'a, i64>),
    ReleaseSourceRetry(MutexGuard<'a, i64>),
    Retry,
}

impl Attempt<'_> {
    fn state(&self) -> AttemptState {
        match self {
            Attempt::Start => AttemptState::Start,
            Attempt::TrySource => AttemptState::TrySource,
            Attempt::TryTarget(_) => AttemptState::TryTarget,
            Attempt::Commit(..) => AttemptState::Commit,
            Attempt::ReleaseSourceRetry(_) => AttemptState::ReleaseSourceRetry,
            Attempt::Retry => AttemptState::Retry,
        }
    }
}

/// Never blocks on a lock: on a partial acquisition it lets go of everything,
/// backs off and starts over.
///
/// Cannot deadlock. Two workers backing off in lock-step can livelock, which
/// the randomized default backoff makes unlikely.
#[derive(Debug)]
pub struct TryLockAccount {
    cell: BalanceCell,
    backoff: BackoffStrategy,
    retries: AtomicU64,
}

impl TryLockAccount {
    pub fn with_backoff(id: AccountId, balance: i64, backoff: BackoffStrategy) -> Self {
        Self {
            cell: BalanceCell::new(id, balance),
            backoff,
            retries: AtomicU64::new(0),
        }
    }

    /// `transfer_to` with a callback invoked after each lock is taken.
    pub fn transfer_traced<F>(
        &self,
        amount: i64,
        target: &Self,
        interrupt: &Interrupt,
        on_acquire: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(AccountId),
    {
        self.transfer_observed(amount, target, interrupt, on_acquire, |_| {})
    }

    /// Runs the attempt loop, reporting every lock taken and every state
    /// entered.
    pub fn transfer_observed<F, S>(
        &self,
        amount: i64,
        target: &Self,
        interrupt: &Interrupt,
        mut on_acquire: F,
        mut on_state: S,
    ) -> Result<(), TransferError>
    where
        F: FnMut(AccountId),
        S: FnMut(AttemptState),
    {
        validate_amount(amount)?;

        let mut backoff = self.backoff.start();
        let mut attempt = Attempt::Start;
        loop {
            on_state(attempt.state());
            attempt = match attempt {
                Attempt::Start => {
                    interrupt.check(self.id())?;
                    Attempt::TrySource
                }
                Attempt::TrySource => match self.cell.try_lock()? {
                    Some(source) => {
                        on_acquire(self.id());
                        Attempt::TryTarget(source)
                    }
                    None => Attempt::Retry,
                },
                Attempt::TryTarget(source) => {
                    if self.id() == target.id() {
                        ensure_funds(self.id(), *source, amount)?;
                        on_state(AttemptState::Done);
                        return Ok(());
                    }
                    match target.cell.try_lock()? {
                        Some(dest) => {
                            on_acquire(target.id());
                            Attempt::Commit(source, dest)
                        }
                        None => Attempt::ReleaseSourceRetry(source),
                    }
                }
                Attempt::Commit(mut source, mut dest) => {
                    settle((self.id(), &mut source), (target.id(), &mut dest), amount)?;
                    drop(dest);
                    drop(source);
                    on_state(AttemptState::Done);
                    return Ok(());
                }
                Attempt::ReleaseSourceRetry(source) => {
                    drop(source);
                    Attempt::Retry
                }
                Attempt::Retry => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    backoff.pause();
                    Attempt::Start
                }
            };
        }
    }
}

impl TransferAccount for TryLockAccount {
    fn new(id: AccountId, balance: i64) -> Self {
        Self::with_backoff(id, balance, BackoffStrategy::default())
    }

    fn id(&self) -> AccountId {
        self.cell.id()
    }

    fn balance(&self) -> Result<i64, TransferError> {
        self.cell.lock().map(|guard| *guard)
    }

    fn try_balance(&self) -> Option<i64> {
        self.cell.peek()
    }

    fn transfer_to(
        &self,
        amount: i64,
        target: &Self,
        interrupt: &Interrupt,
    ) -> Result<(), TransferError> {
        self.transfer_traced(amount, target, interrupt, |_| {})
    }

    fn contention_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::AttemptState::*;

    #[test]
    fn test_uncontended_path() {
        let a = TryLockAccount::new(AccountId(1), 10);
        let b = TryLockAccount::new(AccountId(2), 0);
        let mut states = Vec::new();
        a.transfer_observed(4, &b, &Interrupt::new(), |_| {}, |s| states.push(s))
            .unwrap();

        assert_eq!(states, vec![Start, TrySource, TryTarget, Commit, Done]);
        assert_eq!(a.balance().unwrap(), 6);
        assert_eq!(b.balance().unwrap(), 4);
        assert_eq!(a.contention_retries(), 0);
    }

    #[test]
    fn test_releases_source_when_target_is_busy() {
        let a = Arc::new(TryLockAccount::with_backoff(AccountId(1), 10, BackoffStrategy::Yield));
        let b = Arc::new(TryLockAccount::new(AccountId(2), 0));

        // Hold b until a has failed on it once; a must not keep its own lock.
        let held = b.cell.lock().unwrap();
        let (state_tx, state_rx) = channel::unbounded();
        let worker = {
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                a.transfer_observed(3, &b, &Interrupt::new(), |_| {}, |s| {
                    let _ = state_tx.send(s);
                })
            })
        };

        loop {
            let state = state_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            if state == ReleaseSourceRetry {
                break;
            }
        }
        drop(held);

        worker.join().unwrap().unwrap();
        assert!(a.contention_retries() >= 1);
        assert_eq!(a.balance().unwrap(), 7);
        assert_eq!(b.balance().unwrap(), 3);

        let seen: Vec<_> = state_rx.try_iter().collect();
        assert_eq!(seen.last(), Some(&Done));
    }

    #[test]
    fn test_full_restart_after_partial_acquisition() {
        let a = Arc::new(TryLockAccount::with_backoff(AccountId(1), 10, BackoffStrategy::Yield));
        let b = Arc::new(TryLockAccount::new(AccountId(2), 0));

        let held = b.cell.lock().unwrap();
        let (acq_tx, acq_rx) = channel::unbounded();
        let worker = {
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                a.transfer_traced(1, &b, &Interrupt::new(), |id| {
                    let _ = acq_tx.send(id);
                })
            })
        };

        // Source is re-acquired on every pass, proving it was released.
        for _ in 0..3 {
            assert_eq!(acq_rx.recv_timeout(Duration::from_secs(5)).unwrap(), AccountId(1));
        }
        drop(held);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_interrupt_ends_retry_loop() {
        let a = Arc::new(TryLockAccount::new(AccountId(1), 10));
        let b = Arc::new(TryLockAccount::new(AccountId(2), 0));
        let interrupt = Interrupt::new();

        let held = b.cell.lock().unwrap();
        let worker = {
            let (a, b, interrupt) = (Arc::clone(&a), Arc::clone(&b), interrupt.clone());
            thread::spawn(move || a.transfer_to(1, &b, &interrupt))
        };
        thread::sleep(Duration::from_millis(20));
        interrupt.trigger();

        let result = worker.join().unwrap();
        drop(held);
        assert_eq!(result, Err(TransferError::InterruptedWait { account: AccountId(1) }));
        assert_eq!(a.balance().unwrap(), 10);
    }

    #[test]
    fn test_self_transfer() {
        let a = TryLockAccount::new(AccountId(3), 8);
        let mut acquired = Vec::new();
        a.transfer_traced(8, &a, &Interrupt::new(), |id| acquired.push(id)).unwrap();
        assert_eq!(acquired, vec![AccountId(3)]);
        assert_eq!(a.balance().unwrap(), 8);
    }

    #[test]
    fn test_insufficient_funds_releases_both() {
        let a = TryLockAccount::new(AccountId(1), 2);
        let b = TryLockAccount::new(AccountId(2), 0);
        assert!(matches!(
            a.transfer_to(3, &b, &Interrupt::new()),
            Err(TransferError::InsufficientFunds { available: 2, requested: 3, .. })
        ));
        assert_eq!(a.try_balance(), Some(2));
        assert_eq!(b.try_balance(), Some(0));
    }

    #[test]
    fn test_opposite_workers_finish() {
        for backoff in [BackoffStrategy::Yield, BackoffStrategy::default()] {
            let a = Arc::new(TryLockAccount::with_backoff(AccountId(1), 1000, backoff));
            let b = Arc::new(TryLockAccount::with_backoff(AccountId(2), 1000, backoff));
            let (done_tx, done_rx) = channel::unbounded();

            let pairs = [(Arc::clone(&a), Arc::clone(&b)), (Arc::clone(&b), Arc::clone(&a))];
            for (source, target) in pairs {
                let done_tx = done_tx.clone();
                thread::spawn(move || {
                    let interrupt = Interrupt::new();
                    for _ in 0..10_000 {
                        let _ = source.transfer_to(1, &target, &interrupt);
                    }
                    let _ = done_tx.send(());
                });
            }

            for _ in 0..2 {
                done_rx
                    .recv_timeout(Duration::from_secs(20))
                    .expect("try-lock transfers made no progress");
            }
            assert_eq!(a.balance().unwrap() + b.balance().unwrap(), 2000);
        }
    }
}
