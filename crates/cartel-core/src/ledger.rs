//! Currency ledger interface: atomic transfers between a user and the
//! house, keyed by tenant. Consumed by the engine, implemented by the
//! persistence layer.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InsufficientUser,
    InsufficientHouse,
    Backend(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientUser => write!(f, "user balance cannot cover the transfer"),
            Self::InsufficientHouse => write!(f, "house balance cannot cover the transfer"),
            Self::Backend(detail) => write!(f, "ledger backend error: {detail}"),
        }
    }
}

impl std::error::Error for LedgerError {}

pub trait Ledger {
    /// Debits the user and credits the house. Fails with
    /// `LedgerError::InsufficientUser` without moving funds.
    fn transfer_user_to_house(
        &mut self,
        tenant: &str,
        user: &str,
        chips: u64,
        reason: &str,
    ) -> Result<(), LedgerError>;

    /// Debits the house and credits the user. Fails with
    /// `LedgerError::InsufficientHouse` without moving funds.
    fn transfer_house_to_user(
        &mut self,
        tenant: &str,
        user: &str,
        chips: u64,
        reason: &str,
    ) -> Result<(), LedgerError>;
}
