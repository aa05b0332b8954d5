//! Core protocol types for StakeDuel
//!
//! Shared identifiers and value types used across the match lifecycle:
//! player/match ids, seat assignment, currency modes, and stake amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Player identifier
pub type UserId = Uuid;

/// Match identifier
pub type MatchId = Uuid;

/// Seat at the table. Seat `P0` is the first mover ("X" / white).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    P0,
    P1,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::P0 => Seat::P1,
            Seat::P1 => Seat::P0,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Seat::P0 => 0,
            Seat::P1 => 1,
        }
    }
}

/// Which balance ledger a match's stake and payout apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyMode {
    Real,
    Virtual,
}

/// Per-player stake amount. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stake(Decimal);

impl Stake {
    pub fn new(amount: Decimal) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidStake(format!(
                "stake must be positive, got {}",
                amount
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Combined escrow held for the match (both players' stakes)
    pub fn escrow_total(&self) -> Decimal {
        self.0 * Decimal::TWO
    }
}

impl std::fmt::Display for Stake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
