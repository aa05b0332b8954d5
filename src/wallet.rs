//! Wallet collaborator interface
//!
//! The match core never owns balances; it debits escrow at pairing and
//! credits payouts/refunds at settlement through this trait. Balance
//! mutations are atomic increments/decrements so admin operations can
//! race settlement without lost updates.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{CurrencyMode, UserId};

#[async_trait]
pub trait WalletService: Send + Sync {
    /// Withdraw `amount` from the user's balance in the given currency
    /// mode. Fails with `Error::InsufficientFunds` without mutating
    /// anything when the balance does not cover the amount.
    async fn debit(&self, user: UserId, amount: Decimal, mode: CurrencyMode) -> Result<()>;

    /// Deposit `amount` into the user's balance in the given currency
    /// mode.
    async fn credit(&self, user: UserId, amount: Decimal, mode: CurrencyMode) -> Result<()>;
}

/// In-memory wallet used by the standalone server and tests. Each
/// (user, mode) balance is mutated under its DashMap shard lock, which
/// makes debit/credit atomic read-modify-write operations.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: DashMap<(UserId, CurrencyMode), Decimal>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, user: UserId, amount: Decimal, mode: CurrencyMode) {
        *self.balances.entry((user, mode)).or_insert(Decimal::ZERO) += amount;
    }

    pub fn balance(&self, user: UserId, mode: CurrencyMode) -> Decimal {
        self.balances
            .get(&(user, mode))
            .map(|v| *v)
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn debit(&self, user: UserId, amount: Decimal, mode: CurrencyMode) -> Result<()> {
        let mut entry = self.balances.entry((user, mode)).or_insert(Decimal::ZERO);
        if *entry < amount {
            return Err(Error::InsufficientFunds(format!(
                "balance {} does not cover {}",
                *entry, amount
            )));
        }
        *entry -= amount;
        debug!(%user, %amount, ?mode, "wallet debit");
        Ok(())
    }

    async fn credit(&self, user: UserId, amount: Decimal, mode: CurrencyMode) -> Result<()> {
        *self.balances.entry((user, mode)).or_insert(Decimal::ZERO) += amount;
        debug!(%user, %amount, ?mode, "wallet credit");
        Ok(())
    }
}
