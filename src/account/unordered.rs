use super::{settle, validate_amount, AccountId, BalanceCell, TransferAccount};
use crate::error::TransferError;
use crate::interrupt::Interrupt;

/// Locks `self` and then `target` while still holding `self`.
///
/// The lock order depends on the call direction, so `a.transfer_to(b)` racing
/// with `b.transfer_to(a)` can deadlock. Kept deliberately broken.
#[derive(Debug)]
pub struct UnorderedAccount {
    cell: BalanceCell,
}

impl UnorderedAccount {
    /// `transfer_to` with a callback invoked after each lock is taken.
    pub fn transfer_traced<F>(
        &self,
        amount: i64,
        target: &Self,
        interrupt: &Interrupt,
        mut on_acquire: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(AccountId),
    {
        validate_amount(amount)?;
        interrupt.check(self.id())?;

        let mut source = self.cell.lock()?;
        on_acquire(self.id());

        if self.id() == target.id() {
            // std's Mutex is not reentrant: a second lock() here would hang.
            return super::ensure_funds(self.id(), *source, amount);
        }

        let mut dest = target.cell.lock()?;
        on_acquire(target.id());

        settle((self.id(), &mut source), (target.id(), &mut dest), amount)
    }
}

impl TransferAccount for UnorderedAccount {
    fn new(id: AccountId, balance: i64) -> Self {
        Self {
            cell: BalanceCell::new(id, balance),
        }
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
}
