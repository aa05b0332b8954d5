//! Match lifecycle manager
//!
//! Coordinates the queue, the match store, the rule engines, the turn
//! timers, and settlement: pairing debits escrow from both players,
//! moves are applied under the per-match session lock, and every
//! terminal transition routes through settlement exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::config::{Config, GameConfig};
use crate::error::{Error, Result};
use crate::games::{GameType, Move, MoveError, PlayerMove, Terminal};
use crate::identity::IdentityService;
use crate::protocol::{CurrencyMode, MatchId, Stake, UserId};
use crate::transport::{ConnectionRegistry, ServerEvent};
use crate::wallet::WalletService;

use super::match_store::{EndReason, MatchSession, MatchStatus, MatchStore, MatchSummary};
use super::matchmaker::{JoinOutcome, Matchmaker, QueueEntry};
use super::settlement::{
    Outcome, SettlementContext, SettlementDecision, SettlementEngine, SettlementStatsSnapshot,
};

#[derive(Debug, Default)]
struct ManagerStats {
    matches_created: AtomicU64,
    moves_applied: AtomicU64,
    moves_rejected: AtomicU64,
    timeouts: AtomicU64,
    resignations: AtomicU64,
    disconnect_forfeits: AtomicU64,
    cancellations: AtomicU64,
    stale_refunds: AtomicU64,
}

/// Point-in-time statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct ManagerStatsSnapshot {
    pub matches_created: u64,
    pub moves_applied: u64,
    pub moves_rejected: u64,
    pub timeouts: u64,
    pub resignations: u64,
    pub disconnect_forfeits: u64,
    pub cancellations: u64,
    pub stale_refunds: u64,
    pub active_matches: usize,
    pub queued_players: usize,
}

struct ManagerInner {
    store: MatchStore,
    matchmaker: Matchmaker,
    settlement: SettlementEngine,
    wallet: Arc<dyn WalletService>,
    identity: Arc<dyn IdentityService>,
    audit: Arc<dyn AuditLog>,
    registry: Arc<ConnectionRegistry>,
    game_config: GameConfig,
    stats: ManagerStats,
}

/// Cheaply cloneable handle to the match lifecycle coordinator
#[derive(Clone)]
pub struct MatchManager {
    inner: Arc<ManagerInner>,
}

impl MatchManager {
    pub fn new(
        wallet: Arc<dyn WalletService>,
        audit: Arc<dyn AuditLog>,
        identity: Arc<dyn IdentityService>,
        registry: Arc<ConnectionRegistry>,
        config: &Config,
    ) -> Self {
        let settlement =
            SettlementEngine::new(wallet.clone(), audit.clone(), config.settlement.clone());
        Self {
            inner: Arc::new(ManagerInner {
                store: MatchStore::new(),
                matchmaker: Matchmaker::new(),
                settlement,
                wallet,
                identity,
                audit,
                registry,
                game_config: config.game.clone(),
                stats: ManagerStats::default(),
            }),
        }
    }

    /// Join the matchmaking queue, pairing immediately when a
    /// compatible opponent is already waiting.
    pub async fn join_queue(
        &self,
        user: UserId,
        game_type: GameType,
        stake: rust_decimal::Decimal,
        currency_mode: CurrencyMode,
    ) -> Result<()> {
        let stake = Stake::new(stake)?;
        if stake.amount() < self.inner.game_config.min_stake
            || stake.amount() > self.inner.game_config.max_stake
        {
            return Err(Error::InvalidStake(format!(
                "stake must be between {} and {}",
                self.inner.game_config.min_stake, self.inner.game_config.max_stake
            )));
        }
        if self.inner.store.match_of(user).is_some() {
            return Err(Error::Queue(
                "you are already playing an active match".to_string(),
            ));
        }

        let entry = QueueEntry::new(user, game_type, stake, currency_mode);
        match self.inner.matchmaker.join(entry.clone()).await {
            JoinOutcome::Waiting {
                position,
                queue_size,
            } => {
                self.inner.registry.send(
                    user,
                    ServerEvent::QueueWaiting {
                        game_type,
                        position,
                        queue_size,
                    },
                );
                Ok(())
            }
            JoinOutcome::Paired { opponent } => self.create_match(entry, opponent).await,
        }
    }

    /// Leave the queue. Idempotent; disconnects funnel through here.
    pub async fn leave_queue(&self, user: UserId) -> bool {
        self.inner.matchmaker.leave(user).await
    }

    /// Pair two queue entries into a live match. Escrow is debited from
    /// both players before the session exists; a failed debit aborts
    /// the pairing with no session created and no partial escrow kept.
    async fn create_match(&self, joiner: QueueEntry, waiter: QueueEntry) -> Result<()> {
        let stake = joiner.stake;
        let mode = joiner.currency_mode;
        let game_type = joiner.game_type;

        if let Err(e) = self
            .inner
            .wallet
            .debit(joiner.user, stake.amount(), mode)
            .await
        {
            // The earlier waiter keeps their place in line and hears
            // that the pairing fell through
            let waiter_user = waiter.user;
            self.inner.matchmaker.restore_front(waiter).await;
            self.inner.registry.send(
                waiter_user,
                ServerEvent::QueueWaiting {
                    game_type,
                    position: 1,
                    queue_size: self.inner.matchmaker.len().await,
                },
            );
            return Err(e);
        }

        if let Err(e) = self
            .inner
            .wallet
            .debit(waiter.user, stake.amount(), mode)
            .await
        {
            // Compensate the half-collected escrow and put the joiner
            // back in the queue; the broke waiter is told why they left
            self.inner
                .wallet
                .credit(joiner.user, stake.amount(), mode)
                .await?;
            self.inner.registry.send(
                waiter.user,
                ServerEvent::Error {
                    code: "insufficient_funds".into(),
                    message: format!("pairing aborted: {}", e),
                },
            );
            let joiner_user = joiner.user;
            self.inner.matchmaker.restore_front(joiner).await;
            self.inner.registry.send(
                joiner_user,
                ServerEvent::QueueWaiting {
                    game_type,
                    position: 1,
                    queue_size: self.inner.matchmaker.len().await,
                },
            );
            return Ok(());
        }

        let match_id = Uuid::new_v4();
        for user in [joiner.user, waiter.user] {
            self.inner
                .audit
                .record(
                    AuditEntry::new(Some(user), AuditAction::EscrowDebit, format!("match:{}", match_id))
                        .with_details(json!({
                            "amount": stake.amount().to_string(),
                            "currency_mode": mode,
                        })),
                )
                .await;
        }

        // First mover picked uniformly at random; for chess the pick is
        // simply who plays white
        let (state, players) = {
            let mut rng = rand::thread_rng();
            let players = if rng.gen_bool(0.5) {
                [joiner.user, waiter.user]
            } else {
                [waiter.user, joiner.user]
            };
            (game_type.initial_state(&mut rng), players)
        };

        let session = MatchSession::new(match_id, game_type, players, stake, mode, state);
        let handle = self.inner.store.insert(session);
        self.inner.stats.matches_created.fetch_add(1, Ordering::Relaxed);

        self.inner
            .audit
            .record(
                AuditEntry::new(None, AuditAction::MatchCreated, format!("match:{}", match_id))
                    .with_details(json!({
                        "game_type": game_type,
                        "players": players,
                        "stake": stake.amount().to_string(),
                        "currency_mode": mode,
                    })),
            )
            .await;

        info!(%match_id, ?game_type, %stake, "match created");

        let mut session = handle.lock().await;
        for user in players {
            let seat = session.seat_of(user).expect("player is in the session");
            self.inner.registry.send(
                user,
                ServerEvent::MatchFound {
                    match_id,
                    game_type,
                    opponent: session.opponent_of(user).expect("two players"),
                    seat,
                    your_turn: session.current_turn() == Some(user),
                    stake,
                    currency_mode: mode,
                },
            );
        }
        self.arm_turn_timer(&mut session);
        if let Some(next) = session.current_turn() {
            self.inner.registry.send(
                next,
                ServerEvent::YourTurn {
                    match_id,
                    deadline_secs: self.inner.game_config.turn_timeout.as_secs(),
                },
            );
        }

        Ok(())
    }

    /// Fill in server-generated payloads (dice values) before the move
    /// reaches the pure engine.
    fn resolve_move(&self, mv: PlayerMove) -> Move {
        match mv {
            PlayerMove::Place { cell } => Move::Place { cell },
            PlayerMove::Drop { column } => Move::Drop { column },
            PlayerMove::Reveal { cell } => Move::Reveal { cell },
            PlayerMove::Chess { from, to, promotion } => Move::Chess { from, to, promotion },
            PlayerMove::Roll => {
                let mut rng = rand::thread_rng();
                Move::Roll {
                    die1: rng.gen_range(1..=6),
                    die2: rng.gen_range(1..=6),
                }
            }
        }
    }

    /// Apply a move for `user`. The session lock serializes concurrent
    /// submissions per match; a move from the non-current player is
    /// rejected, never queued.
    pub async fn make_move(&self, user: UserId, match_id: MatchId, mv: PlayerMove) -> Result<()> {
        let handle = self.inner.store.get(match_id).ok_or(Error::MatchNotFound)?;
        let mut session = handle.lock().await;
        let seat = session.seat_of(user).ok_or(Error::PlayerNotInMatch)?;

        if session.status.is_terminal() {
            self.inner.stats.moves_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(MoveError::GameOver.into());
        }

        let mv = self.resolve_move(mv);
        let outcome = match session.state.apply_move(&mv, seat) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.inner.stats.moves_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        session.state = outcome.state;
        session.last_move_at = Instant::now();
        self.inner.stats.moves_applied.fetch_add(1, Ordering::Relaxed);

        match outcome.terminal {
            Some(terminal) => {
                for player in session.players {
                    self.inner.registry.send(
                        player,
                        ServerEvent::MoveMade {
                            match_id,
                            by: user,
                            mv: mv.clone(),
                            your_turn: false,
                        },
                    );
                }
                let (winner, reason) = match terminal {
                    Terminal::Winner(seat) => (Some(session.user_at(seat)), EndReason::Win),
                    Terminal::Draw => (None, EndReason::Draw),
                };
                self.finish_locked(&mut session, MatchStatus::Completed, winner, reason, None)
                    .await?;
            }
            None => {
                self.arm_turn_timer(&mut session);
                let next = session.current_turn();
                for player in session.players {
                    self.inner.registry.send(
                        player,
                        ServerEvent::MoveMade {
                            match_id,
                            by: user,
                            mv: mv.clone(),
                            your_turn: next == Some(player),
                        },
                    );
                }
                if let Some(next) = next {
                    self.inner.registry.send(
                        next,
                        ServerEvent::YourTurn {
                            match_id,
                            deadline_secs: self.inner.game_config.turn_timeout.as_secs(),
                        },
                    );
                }
            }
        }

        Ok(())
    }

    /// Resign the match; the opponent wins and settlement runs.
    pub async fn resign(&self, user: UserId, match_id: MatchId) -> Result<()> {
        let handle = self.inner.store.get(match_id).ok_or(Error::MatchNotFound)?;
        let mut session = handle.lock().await;
        let winner = session.opponent_of(user).ok_or(Error::PlayerNotInMatch)?;

        if session.status.is_terminal() {
            return Err(MoveError::GameOver.into());
        }

        self.inner.stats.resignations.fetch_add(1, Ordering::Relaxed);
        self.finish_locked(
            &mut session,
            MatchStatus::Completed,
            Some(winner),
            EndReason::Resignation,
            None,
        )
        .await
    }

    /// Relay a chat line to both ends of the match
    pub async fn chat(&self, user: UserId, match_id: MatchId, message: String) -> Result<()> {
        let handle = self.inner.store.get(match_id).ok_or(Error::MatchNotFound)?;
        let session = handle.lock().await;
        if session.seat_of(user).is_none() {
            return Err(Error::PlayerNotInMatch);
        }
        for player in session.players {
            self.inner.registry.send(
                player,
                ServerEvent::ChatMessage {
                    match_id,
                    from: user,
                    message: message.clone(),
                },
            );
        }
        Ok(())
    }

    /// Transport-level disconnect: the user leaves any queue, and a
    /// live match forfeits to the still-connected opponent.
    pub async fn handle_disconnect(&self, user: UserId) {
        self.leave_queue(user).await;

        let Some(match_id) = self.inner.store.match_of(user) else {
            return;
        };
        let Some(handle) = self.inner.store.get(match_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.status.is_terminal() {
            return;
        }
        let Some(winner) = session.opponent_of(user) else {
            return;
        };

        self.inner
            .stats
            .disconnect_forfeits
            .fetch_add(1, Ordering::Relaxed);
        info!(%match_id, disconnected = %user, "mid-match disconnect forfeits to opponent");
        if let Err(e) = self
            .finish_locked(
                &mut session,
                MatchStatus::Completed,
                Some(winner),
                EndReason::Disconnect,
                None,
            )
            .await
        {
            warn!(%match_id, "settlement after disconnect failed: {}", e);
        }
    }

    /// Cancel an active match outright, refunding both stakes. Used by
    /// admin tooling and the invite cancel path; `cancelled_by` feeds
    /// the repeated-abort heuristic when a player triggered it.
    pub async fn cancel_match(&self, match_id: MatchId, cancelled_by: Option<UserId>) -> Result<()> {
        let handle = self.inner.store.get(match_id).ok_or(Error::MatchNotFound)?;
        let mut session = handle.lock().await;
        if session.status.is_terminal() {
            return Err(Error::InvalidState("match already ended".to_string()));
        }

        self.inner.stats.cancellations.fetch_add(1, Ordering::Relaxed);
        self.finish_locked(
            &mut session,
            MatchStatus::Cancelled,
            None,
            EndReason::Cancelled,
            cancelled_by,
        )
        .await
    }

    /// Read-only view of a match for status polling
    pub async fn match_summary(&self, match_id: MatchId) -> Option<MatchSummary> {
        let handle = self.inner.store.get(match_id)?;
        let session = handle.lock().await;
        Some(MatchSummary::from(&*session))
    }

    pub fn match_of(&self, user: UserId) -> Option<MatchId> {
        self.inner.store.match_of(user)
    }

    /// Force-refund active matches with no progress past the staleness
    /// threshold. Called by the recovery sweeper; returns how many
    /// matches were recovered.
    pub async fn recover_stale_matches(&self, stale_after: Duration) -> usize {
        let mut recovered = 0;
        for match_id in self.inner.store.match_ids() {
            let Some(handle) = self.inner.store.get(match_id) else {
                continue;
            };
            let mut session = handle.lock().await;
            if session.status.is_terminal() || session.last_move_at.elapsed() < stale_after {
                continue;
            }

            // The stake goes back to real users only
            let mut players_ok = true;
            for player in session.players {
                if self.inner.identity.get_user(player).await.is_none() {
                    warn!(%match_id, %player, "stale match references unknown player; skipping refund");
                    players_ok = false;
                }
            }
            if !players_ok {
                continue;
            }

            warn!(
                %match_id,
                idle_secs = session.last_move_at.elapsed().as_secs(),
                "force-refunding stuck match"
            );
            self.inner
                .audit
                .record(
                    AuditEntry::new(None, AuditAction::ForceRefund, format!("match:{}", match_id))
                        .with_details(json!({
                            "idle_secs": session.last_move_at.elapsed().as_secs(),
                        })),
                )
                .await;
            if let Err(e) = self
                .finish_locked(
                    &mut session,
                    MatchStatus::Refunded,
                    None,
                    EndReason::StaleRefund,
                    None,
                )
                .await
            {
                warn!(%match_id, "stale-match refund failed: {}", e);
                continue;
            }
            self.inner.stats.stale_refunds.fetch_add(1, Ordering::Relaxed);
            recovered += 1;
        }
        recovered
    }

    /// Evict settled sessions once the grace period has passed.
    /// Returns how many were dropped.
    pub async fn evict_finished(&self, grace: Duration) -> usize {
        let mut to_evict = Vec::new();
        for match_id in self.inner.store.match_ids() {
            let Some(handle) = self.inner.store.get(match_id) else {
                continue;
            };
            let session = handle.lock().await;
            if let Some(ended_at) = session.ended_at {
                if ended_at.elapsed() >= grace {
                    to_evict.push(match_id);
                }
            }
        }
        let evicted = to_evict.len();
        for match_id in to_evict {
            debug!(%match_id, "evicting settled match");
            self.inner.store.evict(match_id);
        }
        evicted
    }

    pub async fn stats(&self) -> ManagerStatsSnapshot {
        let s = &self.inner.stats;
        ManagerStatsSnapshot {
            matches_created: s.matches_created.load(Ordering::Relaxed),
            moves_applied: s.moves_applied.load(Ordering::Relaxed),
            moves_rejected: s.moves_rejected.load(Ordering::Relaxed),
            timeouts: s.timeouts.load(Ordering::Relaxed),
            resignations: s.resignations.load(Ordering::Relaxed),
            disconnect_forfeits: s.disconnect_forfeits.load(Ordering::Relaxed),
            cancellations: s.cancellations.load(Ordering::Relaxed),
            stale_refunds: s.stale_refunds.load(Ordering::Relaxed),
            active_matches: self.inner.store.len(),
            queued_players: self.inner.matchmaker.len().await,
        }
    }

    pub fn settlement_stats(&self) -> SettlementStatsSnapshot {
        self.inner.settlement.stats()
    }

    /// Arm the forfeit timer for the session's current player. Any
    /// previously armed timer is cancelled first; there is at most one
    /// live timer per match.
    fn arm_turn_timer(&self, session: &mut MatchSession) {
        session.cancel_timer();
        let Some(expected) = session.current_turn() else {
            return;
        };
        let generation = session.timer_generation;
        let match_id = session.match_id;
        let duration = self.inner.game_config.turn_timeout;
        let manager = self.clone();

        session.timer_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            manager
                .handle_turn_timeout(match_id, expected, generation)
                .await;
        }));
    }

    /// Expiry path for an armed turn timer. Stale firings (the match
    /// ended, the player moved, or the timer was re-armed) are no-ops.
    async fn handle_turn_timeout(&self, match_id: MatchId, expected: UserId, generation: u64) {
        let Some(handle) = self.inner.store.get(match_id) else {
            return;
        };
        let mut session = handle.lock().await;

        if session.status.is_terminal()
            || session.timer_generation != generation
            || session.current_turn() != Some(expected)
        {
            debug!(%match_id, "stale turn timer fired; ignoring");
            return;
        }

        let Some(winner) = session.opponent_of(expected) else {
            return;
        };
        self.inner.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        info!(%match_id, timed_out = %expected, "turn timer expired; forfeiting");
        if let Err(e) = self
            .finish_locked(
                &mut session,
                MatchStatus::Completed,
                Some(winner),
                EndReason::Timeout,
                None,
            )
            .await
        {
            warn!(%match_id, "settlement after timeout failed: {}", e);
        }
    }

    /// The single terminal transition: flips status (sticky, at most
    /// once), produces the settlement decision, executes it, and
    /// notifies both clients. Caller holds the session lock.
    async fn finish_locked(
        &self,
        session: &mut MatchSession,
        status: MatchStatus,
        winner: Option<UserId>,
        reason: EndReason,
        aborted_by: Option<UserId>,
    ) -> Result<()> {
        if !session.transition(status, winner) {
            // Already terminal; settlement ran when it happened
            debug!(match_id = %session.match_id, "ignoring duplicate terminal transition");
            return Ok(());
        }

        let outcome = match (status, winner) {
            (MatchStatus::Completed, Some(w)) => Outcome::Win(w),
            (MatchStatus::Completed, None) => Outcome::Draw,
            (MatchStatus::Cancelled, _) => Outcome::Cancelled,
            (MatchStatus::Refunded, _) => Outcome::Refunded,
            (MatchStatus::Active, _) => unreachable!("transition only accepts terminal states"),
        };

        let decision = SettlementDecision::for_outcome(
            session.match_id,
            session.players,
            session.stake,
            session.currency_mode,
            outcome,
            self.inner.settlement.fee_percent(),
        );
        let ctx = SettlementContext {
            players: session.players,
            match_duration: session.created_at.elapsed(),
            aborted_by,
        };
        let settled = self.inner.settlement.settle(&decision, ctx).await;

        // Players may queue again right away; the session itself stays
        // readable until the eviction grace passes
        for player in session.players {
            self.inner.store.release_user(player, session.match_id);
        }

        self.inner
            .audit
            .record(
                AuditEntry::new(None, AuditAction::MatchSettled, format!("match:{}", session.match_id))
                    .with_details(json!({
                        "reason": reason,
                        "status": status,
                        "winner": winner,
                    })),
            )
            .await;

        for player in session.players {
            self.inner.registry.send(
                player,
                ServerEvent::MatchEnded {
                    match_id: session.match_id,
                    status,
                    winner,
                    reason,
                },
            );
        }

        settled
    }
}
