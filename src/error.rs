use crate::account::AccountId;
use thiserror::Error;

// =============================================================================
// Transfer errors
// =============================================================================

/// Why a single transfer did not happen.
///
/// `InsufficientFunds`, `InvalidAmount` and `Overflow` are rejections: the
/// transfer is a no-op and the worker moves on to its next iteration. The
/// remaining variants end the worker's loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error(
        "Insufficient funds in account {account}: available {available}, requested {requested}"
    )]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        requested: i64,
    },

    #[error("Transfer only valid for positive amounts (got {amount})")]
    InvalidAmount { amount: i64 },

    #[error("Crediting {amount} to account {account} would overflow its balance of {balance}")]
    Overflow {
        account: AccountId,
        balance: i64,
        amount: i64,
    },

    #[error("Interrupted while waiting for account {account}")]
    InterruptedWait { account: AccountId },

    #[error("Lock for account {account} was poisoned by a panicking worker")]
    Poisoned { account: AccountId },
}

impl TransferError {
    /// True for errors that skip one transfer without stopping the worker.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TransferError::InsufficientFunds { .. }
                | TransferError::InvalidAmount { .. }
                | TransferError::Overflow { .. }
        )
    }
}

// =============================================================================
// Configuration errors
// =============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Driver errors
// =============================================================================

#[derive(Error, Debug)]
pub enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read starting balances: {0}")]
    Transfer(#[from] TransferError),

    #[error("Failed to spawn worker '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker '{name}' panicked")]
    WorkerPanicked { name: String },

    #[error("Unknown variant '{0}' (expected a/naive, b/ordered or c/trylock)")]
    UnknownVariant(String),
}
