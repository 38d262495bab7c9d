use crate::account::AccountId;
use crate::error::TransferError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop signal shared between the monitor and its workers.
///
/// Threads cannot be interrupted from the outside, so workers poll this flag
/// before every transfer, and the try-lock variant polls it on every retry.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fails with `InterruptedWait` once the flag is set.
    pub fn check(&self, account: AccountId) -> Result<(), TransferError> {
        if self.is_triggered() {
            Err(TransferError::InterruptedWait { account })
        } else {
            Ok(())
        }
    }
}
