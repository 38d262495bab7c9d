use super::{settle, validate_amount, AccountId, BalanceCell, TransferAccount};
use crate::error::TransferError;
use crate::interrupt::Interrupt;

/// Takes both locks lowest id first, whatever the transfer direction.
///
/// Every worker agrees on the same global order, so no worker can hold the
/// higher lock while waiting for the lower one.
#[derive(Debug)]
pub struct OrderedAccount {
    cell: BalanceCell,
}

impl OrderedAccount {
    /// The order in which a transfer between `self` and `target` takes locks.
    pub fn lock_order(&self, target: &Self) -> (AccountId, AccountId) {
        let (first, second) = self.ordered_pair(target);
        (first.id(), second.id())
    }

    fn ordered_pair<'a>(&'a self, target: &'a Self) -> (&'a Self, &'a Self) {
        if self.id() <= target.id() {
            (self, target)
        } else {
            (target, self)
        }
    }

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

        if self.id() == target.id() {
            let balance = self.cell.lock()?;
            on_acquire(self.id());
            return super::ensure_funds(self.id(), *balance, amount);
        }

        let (first, second) = self.ordered_pair(target);
        let mut first_guard = first.cell.lock()?;
        on_acquire(first.id());
        let mut second_guard = second.cell.lock()?;
        on_acquire(second.id());

        let first_side = (first.id(), &mut *first_guard);
        let second_side = (second.id(), &mut *second_guard);
        if std::ptr::eq(first, self) {
            settle(first_side, second_side, amount)
        } else {
            settle(second_side, first_side, amount)
        }
    }
}

impl TransferAccount for OrderedAccount {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquisition_order_ignores_direction() {
        let low = OrderedAccount::new(AccountId(1), 50);
        let high = OrderedAccount::new(AccountId(2), 50);
        let interrupt = Interrupt::new();

        let mut forward = Vec::new();
        low.transfer_traced(5, &high, &interrupt, |id| forward.push(id)).unwrap();
        let mut backward = Vec::new();
        high.transfer_traced(5, &low, &interrupt, |id| backward.push(id)).unwrap();

        assert_eq!(forward, vec![AccountId(1), AccountId(2)]);
        assert_eq!(backward, forward);
        assert_eq!(low.lock_order(&high), high.lock_order(&low));
    }

    #[test]
    fn test_debits_the_caller_when_it_is_locked_second() {
        let low = OrderedAccount::new(AccountId(1), 0);
        let high = OrderedAccount::new(AccountId(9), 40);
        high.transfer_to(15, &low, &Interrupt::new()).unwrap();
        assert_eq!(high.balance().unwrap(), 25);
        assert_eq!(low.balance().unwrap(), 15);
    }

    #[test]
    fn test_self_transfer_takes_one_lock() {
        let account = OrderedAccount::new(AccountId(4), 20);
        let mut acquired = Vec::new();
        account
            .transfer_traced(7, &account, &Interrupt::new(), |id| acquired.push(id))
            .unwrap();
        assert_eq!(acquired, vec![AccountId(4)]);
        assert_eq!(account.balance().unwrap(), 20);
    }

    #[test]
    fn test_self_transfer_still_validates() {
        let account = OrderedAccount::new(AccountId(4), 5);
        assert!(matches!(
            account.transfer_to(6, &account, &Interrupt::new()),
            Err(TransferError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            account.transfer_to(-1, &account, &Interrupt::new()),
            Err(TransferError::InvalidAmount { amount: -1 })
        ));
    }

    #[test]
    fn test_interrupted_before_locking() {
        let a = OrderedAccount::new(AccountId(1), 5);
        let b = OrderedAccount::new(AccountId(2), 5);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        assert_eq!(
            a.transfer_to(1, &b, &interrupt),
            Err(TransferError::InterruptedWait { account: AccountId(1) })
        );
        assert_eq!(a.balance().unwrap(), 5);
    }

    #[test]
    fn test_opposite_workers_finish() {
        let a = Arc::new(OrderedAccount::new(AccountId(1), 1000));
        let b = Arc::new(OrderedAccount::new(AccountId(2), 1000));
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
                .expect("ordered transfers deadlocked");
        }
        assert_eq!(a.balance().unwrap() + b.balance().unwrap(), 2000);
    }
}
