//! Accounts that move money between each other under per-account locks.
//!
//! Three designs share the same shape and differ only in how they take the
//! two locks a transfer needs:
//!
//! - [`UnorderedAccount`]: locks `self`, then `target`. Two opposite
//!   transfers can each hold one lock and wait forever for the other.
//! - [`OrderedAccount`]: always locks the lower id first, so the wait-for
//!   graph can never contain a cycle.
//! - [`TryLockAccount`]: never blocks. A partial acquisition is fully
//!   released and retried after a backoff.

mod ordered;
mod try_lock;
mod unordered;

pub use ordered::OrderedAccount;
pub use try_lock::{AttemptState, TryLockAccount};
pub use unordered::UnorderedAccount;

use crate::error::TransferError;
use crate::interrupt::Interrupt;
use std::fmt;
use std::sync::{Mutex, MutexGuard, TryLockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Common surface of the three account designs, used by the driver.
pub trait TransferAccount: Send + Sync + 'static {
    /// Opens an account holding `balance`.
    fn new(id: AccountId, balance: i64) -> Self
    where
        Self: Sized;

    fn id(&self) -> AccountId;

    /// Reads the balance under the account's lock.
    fn balance(&self) -> Result<i64, TransferError>;

    /// Non-blocking read for progress reporting; `None` while another worker
    /// holds the lock.
    fn try_balance(&self) -> Option<i64>;

    /// Moves `amount` from `self` to `target`.
    fn transfer_to(
        &self,
        amount: i64,
        target: &Self,
        interrupt: &Interrupt,
    ) -> Result<(), TransferError>;

    /// Number of times a transfer out of this account had to back off.
    fn contention_retries(&self) -> u64 {
        0
    }
}

// =============================================================================
// Shared building blocks
// =============================================================================

/// A balance and the lock that guards it.
#[derive(Debug)]
pub(crate) struct BalanceCell {
    id: AccountId,
    balance: Mutex<i64>,
}

impl BalanceCell {
    pub(crate) fn new(id: AccountId, balance: i64) -> Self {
        Self {
            id,
            balance: Mutex::new(balance),
        }
    }

    pub(crate) fn id(&self) -> AccountId {
        self.id
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, i64>, TransferError> {
        self.balance
            .lock()
            .map_err(|_| TransferError::Poisoned { account: self.id })
    }

    /// `Ok(None)` when the lock is currently held elsewhere.
    pub(crate) fn try_lock(&self) -> Result<Option<MutexGuard<'_, i64>>, TransferError> {
        match self.balance.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => Err(TransferError::Poisoned { account: self.id }),
        }
    }

    pub(crate) fn peek(&self) -> Option<i64> {
        match self.balance.try_lock() {
            Ok(guard) => Some(*guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(*poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

pub(crate) fn validate_amount(amount: i64) -> Result<(), TransferError> {
    if amount <= 0 {
        return Err(TransferError::InvalidAmount { amount });
    }
    Ok(())
}

/// Debits `source` and credits `target` once the caller holds both locks.
/// Both balances are left untouched unless the whole move succeeds.
pub(crate) fn settle(
    (source_id, source): (AccountId, &mut i64),
    (target_id, target): (AccountId, &mut i64),
    amount: i64,
) -> Result<(), TransferError> {
    ensure_funds(source_id, *source, amount)?;
    let credited = target.checked_add(amount).ok_or(TransferError::Overflow {
        account: target_id,
        balance: *target,
        amount,
    })?;
    *source -= amount;
    *target = credited;
    Ok(())
}

pub(crate) fn ensure_funds(
    account: AccountId,
    available: i64,
    amount: i64,
) -> Result<(), TransferError> {
    if available < amount {
        return Err(TransferError::InsufficientFunds {
            account,
            available,
            requested: amount,
        });
    }
    Ok(())
}
