//! Match lifecycle subsystem for StakeDuel
//!
//! This module owns everything between "two players want a game" and
//! "the escrow is released":
//!
//! ## Components
//! - Matchmaking queue pairing players by game, stake, and currency mode
//! - Authoritative match store with per-match single-writer locking
//! - Turn timers that forfeit unresponsive players
//! - Settlement engine releasing escrow with advisory anti-abuse checks
//! - Recovery sweeper refunding stuck matches

pub mod match_manager;
pub mod match_store;
pub mod matchmaker;
pub mod settlement;
pub mod sweeper;

pub use match_manager::{ManagerStatsSnapshot, MatchManager};
pub use match_store::{EndReason, MatchSession, MatchStatus, MatchStore, MatchSummary};
pub use matchmaker::{JoinOutcome, Matchmaker, QueueEntry};
pub use settlement::{
    Credit, Outcome, SettlementContext, SettlementDecision, SettlementEngine,
    SettlementStatsSnapshot,
};
pub use sweeper::RecoverySweeper;
