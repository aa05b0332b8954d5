//! Real-time transport layer for StakeDuel
//!
//! This module implements the push channel between the match core and
//! connected clients:
//! - Per-user addressable event delivery (best effort: events for a
//!   disconnected user are dropped, reconnecting clients resync via the
//!   match status endpoint)
//! - WebSocket endpoint translating wire intents into match manager
//!   calls

pub mod ws;

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::games::{GameType, Move, PlayerMove};
use crate::gaming::match_store::{EndReason, MatchStatus};
use crate::protocol::{CurrencyMode, MatchId, Seat, Stake, UserId};

/// Events pushed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    QueueWaiting {
        game_type: GameType,
        position: usize,
        queue_size: usize,
    },
    MatchFound {
        match_id: MatchId,
        game_type: GameType,
        opponent: UserId,
        seat: Seat,
        your_turn: bool,
        stake: Stake,
        currency_mode: CurrencyMode,
    },
    MoveMade {
        match_id: MatchId,
        by: UserId,
        mv: Move,
        your_turn: bool,
    },
    YourTurn {
        match_id: MatchId,
        deadline_secs: u64,
    },
    MatchEnded {
        match_id: MatchId,
        status: MatchStatus,
        winner: Option<UserId>,
        reason: EndReason,
    },
    ChatMessage {
        match_id: MatchId,
        from: UserId,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Intents received from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum ClientIntent {
    JoinQueue {
        game_type: GameType,
        stake: Decimal,
        currency_mode: CurrencyMode,
    },
    CancelQueue,
    MakeMove {
        match_id: MatchId,
        mv: PlayerMove,
    },
    Resign {
        match_id: MatchId,
    },
    ChatMessage {
        match_id: MatchId,
        message: String,
    },
}

/// Outbound channel capacity per connection. A slow client that falls
/// this far behind starts losing events and must resync.
const OUTBOUND_BUFFER: usize = 64;

/// Identifies one socket, so a stale socket's teardown cannot tear
/// down the connection that replaced it
pub type ConnectionId = u64;

/// Per-user registry of connected clients. Delivery is best-effort:
/// sends to absent or saturated connections are dropped, never queued
/// for later.
pub struct ConnectionRegistry {
    senders: DashMap<UserId, (ConnectionId, mpsc::Sender<ServerEvent>)>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            senders: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection, returning its id and the receiving half
    /// for the socket writer. A newer connection for the same user
    /// replaces the old one.
    pub fn register(&self, user: UserId) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders.insert(user, (id, tx));
        (id, rx)
    }

    /// Remove a connection if it is still the user's current one.
    /// Returns whether an entry was removed; a stale id (the user
    /// already reconnected) removes nothing.
    pub fn unregister(&self, user: UserId, conn_id: ConnectionId) -> bool {
        self.senders
            .remove_if(&user, |_, (id, _)| *id == conn_id)
            .is_some()
    }

    pub fn is_connected(&self, user: UserId) -> bool {
        self.senders.contains_key(&user)
    }

    /// Deliver an event if the user is connected; drop it otherwise
    pub fn send(&self, user: UserId, event: ServerEvent) {
        if let Some(entry) = self.senders.get(&user) {
            if let Err(e) = entry.1.try_send(event) {
                debug!(%user, "dropping event for slow or closing connection: {}", e);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}
