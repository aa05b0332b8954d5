//! Authoritative store for active match sessions.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, which is the
//! single-writer queue for that match: no two moves are ever validated
//! against the same state snapshot concurrently. The store is the only
//! owner of session lifecycles: creation and eviction, nothing in
//! between.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::games::{GameState, GameType};
use crate::protocol::{CurrencyMode, MatchId, Seat, Stake, UserId};

/// Lifecycle state of a match. `Waiting` players live in the
/// matchmaking queue and have no session yet; a session is born
/// `Active` and moves exactly once into one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Completed,
    Cancelled,
    Refunded,
}

impl MatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MatchStatus::Active)
    }
}

/// Why a match ended. Carried on the match-ended event and in audit
/// details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Win,
    Draw,
    Resignation,
    Timeout,
    Disconnect,
    Cancelled,
    StaleRefund,
}

/// Authoritative state for one live match
#[derive(Debug)]
pub struct MatchSession {
    pub match_id: MatchId,
    pub game_type: GameType,
    /// `players[0]` holds seat `P0`: first mover, "X", white
    pub players: [UserId; 2],
    pub stake: Stake,
    pub currency_mode: CurrencyMode,
    pub state: GameState,
    pub status: MatchStatus,
    pub winner: Option<UserId>,
    pub created_at: Instant,
    pub last_move_at: Instant,
    /// When the session reached a terminal state; drives grace-period
    /// eviction
    pub ended_at: Option<Instant>,
    /// Bumped every time a turn timer is armed or cancelled; a timer
    /// firing with a stale generation is a no-op
    pub timer_generation: u64,
    pub timer_handle: Option<JoinHandle<()>>,
}

impl MatchSession {
    pub fn new(
        match_id: MatchId,
        game_type: GameType,
        players: [UserId; 2],
        stake: Stake,
        currency_mode: CurrencyMode,
        state: GameState,
    ) -> Self {
        let now = Instant::now();
        Self {
            match_id,
            game_type,
            players,
            stake,
            currency_mode,
            state,
            status: MatchStatus::Active,
            winner: None,
            created_at: now,
            last_move_at: now,
            ended_at: None,
            timer_generation: 0,
            timer_handle: None,
        }
    }

    pub fn seat_of(&self, user: UserId) -> Option<Seat> {
        if self.players[0] == user {
            Some(Seat::P0)
        } else if self.players[1] == user {
            Some(Seat::P1)
        } else {
            None
        }
    }

    pub fn user_at(&self, seat: Seat) -> UserId {
        self.players[seat.index()]
    }

    pub fn opponent_of(&self, user: UserId) -> Option<UserId> {
        self.seat_of(user).map(|seat| self.user_at(seat.other()))
    }

    /// User allowed to move now; `None` once terminal
    pub fn current_turn(&self) -> Option<UserId> {
        if self.status.is_terminal() {
            return None;
        }
        self.state.to_move().map(|seat| self.user_at(seat))
    }

    /// Flip into a terminal state. Returns `false` when the session is
    /// already terminal; terminal states are sticky and this is the
    /// structural settle-at-most-once guard.
    pub fn transition(&mut self, status: MatchStatus, winner: Option<UserId>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.winner = winner;
        self.ended_at = Some(Instant::now());
        self.cancel_timer();
        true
    }

    /// Drop any armed timer and invalidate outstanding expirations
    pub fn cancel_timer(&mut self) {
        self.timer_generation += 1;
        if let Some(handle) = self.timer_handle.take() {
            handle.abort();
        }
    }
}

/// Read-only snapshot handed to status queries and the transport layer
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub game_type: GameType,
    pub players: [UserId; 2],
    pub stake: Stake,
    pub currency_mode: CurrencyMode,
    pub status: MatchStatus,
    pub winner: Option<UserId>,
    pub current_turn: Option<UserId>,
}

impl From<&MatchSession> for MatchSummary {
    fn from(session: &MatchSession) -> Self {
        Self {
            match_id: session.match_id,
            game_type: session.game_type,
            players: session.players,
            stake: session.stake,
            currency_mode: session.currency_mode,
            status: session.status,
            winner: session.winner,
            current_turn: session.current_turn(),
        }
    }
}

/// Keyed store of live sessions plus a user -> match index enforcing
/// the one-match-per-user rule
pub struct MatchStore {
    matches: DashMap<MatchId, Arc<Mutex<MatchSession>>>,
    by_user: DashMap<UserId, MatchId>,
}

impl Default for MatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchStore {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    pub fn insert(&self, session: MatchSession) -> Arc<Mutex<MatchSession>> {
        let match_id = session.match_id;
        let players = session.players;
        let handle = Arc::new(Mutex::new(session));
        self.matches.insert(match_id, handle.clone());
        for player in players {
            self.by_user.insert(player, match_id);
        }
        handle
    }

    pub fn get(&self, match_id: MatchId) -> Option<Arc<Mutex<MatchSession>>> {
        self.matches.get(&match_id).map(|e| e.value().clone())
    }

    pub fn match_of(&self, user: UserId) -> Option<MatchId> {
        self.by_user.get(&user).map(|e| *e.value())
    }

    /// Snapshot of all live match ids
    pub fn match_ids(&self) -> Vec<MatchId> {
        self.matches.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Remove a session and its user index entries
    pub fn evict(&self, match_id: MatchId) {
        if let Some((_, session)) = self.matches.remove(&match_id) {
            // Lock is uncontended by now; players may already be in a
            // newer match, so only drop index entries that still point
            // at this one.
            if let Ok(session) = session.try_lock() {
                for player in session.players {
                    self.by_user
                        .remove_if(&player, |_, mid| *mid == match_id);
                }
            }
        }
    }

    /// Release a user's index entry once their match is terminal, so
    /// they can queue again before the session is evicted
    pub fn release_user(&self, user: UserId, match_id: MatchId) {
        self.by_user.remove_if(&user, |_, mid| *mid == match_id);
    }
}
