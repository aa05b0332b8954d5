//! StakeDuel - a real-time head-to-head wager match server
//!
//! Players queue by game type, stake, and currency mode; compatible
//! pairs are matched, both stakes are escrowed, and an authoritative
//! turn-based session runs until a win, draw, resignation, timeout, or
//! disconnect releases the escrow through the settlement engine.
//!
//! - protocol: shared identifiers and value types
//! - games: pure rule engines for every supported game variant
//! - gaming: matchmaking, match sessions, turn timers, settlement,
//!   recovery sweeping
//! - wallet / audit / identity: collaborator interfaces the core calls
//!   into but does not own
//! - transport: per-user WebSocket push channel and intent dispatch

pub mod audit;
pub mod config;
pub mod error;
pub mod games;
pub mod gaming;
pub mod identity;
pub mod protocol;
pub mod transport;
pub mod wallet;

// Re-export commonly used types for easy access
pub use audit::{AuditAction, AuditEntry, AuditLog, InMemoryAudit};
pub use config::Config;
pub use error::{Error, Result};
pub use games::{GameState, GameType, Move, MoveError, PlayerMove, Terminal};
pub use gaming::{
    EndReason, MatchManager, MatchStatus, MatchSummary, RecoverySweeper, SettlementDecision,
    SettlementEngine,
};
pub use identity::{IdentityService, InMemoryIdentity, UserProfile};
pub use protocol::{CurrencyMode, MatchId, Seat, Stake, UserId};
pub use transport::{ClientIntent, ConnectionRegistry, ServerEvent};
pub use wallet::{InMemoryWallet, WalletService};
