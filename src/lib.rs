// Threading lab: deadlock, lock ordering and race-condition demonstrations.

pub mod account;
pub mod backoff;
pub mod config;
pub mod counter;
pub mod error;
pub mod interrupt;
pub mod runner;

pub use account::{AccountId, OrderedAccount, TransferAccount, TryLockAccount, UnorderedAccount};
pub use backoff::BackoffStrategy;
pub use config::DemoConfig;
pub use error::{ConfigError, DemoError, TransferError};
pub use interrupt::Interrupt;
pub use runner::{run_pair, run_variant, DemoReport, Outcome, Variant, WorkerSummary};
