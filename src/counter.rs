//! One worker increments, another decrements, the same number of times.
//! A correct counter ends where it started.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

pub trait SharedCounter: Send + Sync + 'static {
    fn increment(&self);
    fn decrement(&self);
    fn get(&self) -> i64;
}

/// Lock-free: every update is a single `fetch_add`/`fetch_sub`.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicI64,
}

impl SharedCounter for AtomicCounter {
    fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Every update holds the counter's mutex for the whole read-modify-write.
#[derive(Debug, Default)]
pub struct LockedCounter {
    value: Mutex<i64>,
}

impl LockedCounter {
    fn update(&self, delta: i64) {
        // An i64 cannot be left half-written, so a poisoned lock is still usable.
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *value += delta;
    }
}

impl SharedCounter for LockedCounter {
    fn increment(&self) {
        self.update(1);
    }

    fn decrement(&self) {
        self.update(-1);
    }

    fn get(&self) -> i64 {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Load and store are each atomic, the pair is not: two workers can read
/// the same value and one update is lost.
#[derive(Debug, Default)]
pub struct RacyCounter {
    value: AtomicI64,
}

impl SharedCounter for RacyCounter {
    fn increment(&self) {
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current + 1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current - 1, Ordering::Relaxed);
    }

    fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Runs the increment and decrement workers to completion and returns the
/// final value.
pub fn race<C: SharedCounter>(counter: Arc<C>, iterations: u64) -> thread::Result<i64> {
    let up = {
        let counter = Arc::clone(&counter);
        thread::spawn(move || {
            for _ in 0..iterations {
                counter.increment();
            }
        })
    };
    let down = {
        let counter = Arc::clone(&counter);
        thread::spawn(move || {
            for _ in 0..iterations {
                counter.decrement();
            }
        })
    };

    up.join()?;
    down.join()?;
    Ok(counter.get())
}
