//! Settlement engine: releases escrowed stakes when a match terminates.
//!
//! The money decision (who gets credited how much) is computed as a
//! pure value first and executed afterwards, so the arithmetic is
//! testable without a wallet and the execute step runs exactly once per
//! match: the caller only obtains a decision from the single
//! active-to-terminal transition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tracing::{error, info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::config::SettlementConfig;
use crate::error::{Error, Result};
use crate::protocol::{CurrencyMode, MatchId, Stake, UserId};
use crate::wallet::WalletService;

/// Terminal outcome of a match, as seen by the settlement engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win(UserId),
    Draw,
    Cancelled,
    Refunded,
}

/// One credit owed to a player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub user: UserId,
    pub amount: Decimal,
    pub action: AuditAction,
}

/// The pure money decision for a terminated match. Credits plus the
/// retained fee always sum to the escrowed `stake * 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementDecision {
    pub match_id: MatchId,
    pub currency_mode: CurrencyMode,
    pub credits: Vec<Credit>,
    pub fee_retained: Decimal,
}

impl SettlementDecision {
    pub fn for_outcome(
        match_id: MatchId,
        players: [UserId; 2],
        stake: Stake,
        currency_mode: CurrencyMode,
        outcome: Outcome,
        fee_percent: Decimal,
    ) -> Self {
        match outcome {
            Outcome::Win(winner) => {
                let escrow = stake.escrow_total();
                // Fee bookkeeping only applies to real-money matches
                let fee = match currency_mode {
                    CurrencyMode::Real => escrow * fee_percent / dec!(100),
                    CurrencyMode::Virtual => Decimal::ZERO,
                };
                Self {
                    match_id,
                    currency_mode,
                    credits: vec![Credit {
                        user: winner,
                        amount: escrow - fee,
                        action: AuditAction::Payout,
                    }],
                    fee_retained: fee,
                }
            }
            Outcome::Draw | Outcome::Cancelled | Outcome::Refunded => Self {
                match_id,
                currency_mode,
                credits: players
                    .iter()
                    .map(|&user| Credit {
                        user,
                        amount: stake.amount(),
                        action: AuditAction::Refund,
                    })
                    .collect(),
                fee_retained: Decimal::ZERO,
            },
        }
    }

    /// Total value leaving escrow, fee included
    pub fn total_released(&self) -> Decimal {
        self.credits.iter().map(|c| c.amount).sum::<Decimal>() + self.fee_retained
    }
}

/// Counters exposed for monitoring
#[derive(Debug, Default)]
pub struct SettlementStats {
    pub matches_settled: AtomicU64,
    pub payouts: AtomicU64,
    pub refunds: AtomicU64,
    pub settlement_failures: AtomicU64,
    pub fast_win_flags: AtomicU64,
    pub abort_flags: AtomicU64,
    pub collusion_flags: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct SettlementStatsSnapshot {
    pub matches_settled: u64,
    pub payouts: u64,
    pub refunds: u64,
    pub settlement_failures: u64,
    pub fast_win_flags: u64,
    pub abort_flags: u64,
    pub collusion_flags: u64,
}

/// Extra context for the advisory anti-abuse heuristics
#[derive(Debug, Clone, Copy)]
pub struct SettlementContext {
    pub players: [UserId; 2],
    pub match_duration: Duration,
    /// The player who cancelled/aborted the match, when one did
    pub aborted_by: Option<UserId>,
}

/// Executes settlement decisions against the wallet and audit
/// collaborators, and keeps the rolling anti-abuse windows.
pub struct SettlementEngine {
    wallet: Arc<dyn WalletService>,
    audit: Arc<dyn AuditLog>,
    config: SettlementConfig,
    stats: SettlementStats,
    abort_history: DashMap<UserId, Vec<Instant>>,
    pair_history: DashMap<(UserId, UserId), Vec<Instant>>,
}

impl SettlementEngine {
    pub fn new(
        wallet: Arc<dyn WalletService>,
        audit: Arc<dyn AuditLog>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            wallet,
            audit,
            config,
            stats: SettlementStats::default(),
            abort_history: DashMap::new(),
            pair_history: DashMap::new(),
        }
    }

    pub fn fee_percent(&self) -> Decimal {
        self.config.fee_percent
    }

    /// Execute a settlement decision: credit the wallet, write audit
    /// entries, and run the advisory heuristics. A failed credit is
    /// logged with full reconciliation context and surfaces as an
    /// error; it never silently succeeds.
    pub async fn settle(
        &self,
        decision: &SettlementDecision,
        ctx: SettlementContext,
    ) -> Result<()> {
        for credit in &decision.credits {
            if let Err(e) = self
                .wallet
                .credit(credit.user, credit.amount, decision.currency_mode)
                .await
            {
                self.stats.settlement_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    match_id = %decision.match_id,
                    user = %credit.user,
                    amount = %credit.amount,
                    mode = ?decision.currency_mode,
                    "settlement credit failed; flagged for reconciliation: {}",
                    e
                );
                return Err(Error::Settlement(format!(
                    "credit of {} to {} for match {} failed: {}",
                    credit.amount, credit.user, decision.match_id, e
                )));
            }

            self.audit
                .record(
                    AuditEntry::new(
                        Some(credit.user),
                        credit.action,
                        format!("match:{}", decision.match_id),
                    )
                    .with_details(json!({
                        "amount": credit.amount.to_string(),
                        "currency_mode": decision.currency_mode,
                    })),
                )
                .await;

            match credit.action {
                AuditAction::Payout => {
                    self.stats.payouts.fetch_add(1, Ordering::Relaxed);
                }
                AuditAction::Refund => {
                    self.stats.refunds.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        if decision.fee_retained > Decimal::ZERO {
            self.audit
                .record(
                    AuditEntry::new(
                        None,
                        AuditAction::PlatformFee,
                        format!("match:{}", decision.match_id),
                    )
                    .with_details(json!({
                        "amount": decision.fee_retained.to_string(),
                        "currency_mode": decision.currency_mode,
                    })),
                )
                .await;
        }

        self.stats.matches_settled.fetch_add(1, Ordering::Relaxed);

        if decision.currency_mode == CurrencyMode::Real {
            self.run_heuristics(decision, &ctx);
        }

        info!(
            match_id = %decision.match_id,
            released = %decision.total_released(),
            fee = %decision.fee_retained,
            "match settled"
        );
        Ok(())
    }

    /// Advisory anti-abuse checks. They log and count; they never block
    /// a settlement.
    fn run_heuristics(&self, decision: &SettlementDecision, ctx: &SettlementContext) {
        let is_win = decision
            .credits
            .iter()
            .any(|c| c.action == AuditAction::Payout);

        if is_win && ctx.match_duration < self.config.fast_win_threshold {
            self.stats.fast_win_flags.fetch_add(1, Ordering::Relaxed);
            warn!(
                match_id = %decision.match_id,
                duration_ms = ctx.match_duration.as_millis() as u64,
                "fast-win flag: match settled suspiciously quickly"
            );
        }

        if let Some(aborter) = ctx.aborted_by {
            let aborts = self.bump_window(&self.abort_history, aborter);
            if aborts > self.config.abort_flag_threshold {
                self.stats.abort_flags.fetch_add(1, Ordering::Relaxed);
                warn!(
                    user = %aborter,
                    aborts_in_window = aborts,
                    "repeated-abort flag"
                );
            }
        }

        let pair = ordered_pair(ctx.players[0], ctx.players[1]);
        let met = self.bump_window(&self.pair_history, pair);
        if met > self.config.collusion_flag_threshold {
            self.stats.collusion_flags.fetch_add(1, Ordering::Relaxed);
            warn!(
                player_a = %pair.0,
                player_b = %pair.1,
                matches_in_window = met,
                "collusion flag: same opponents matched repeatedly"
            );
        }
    }

    /// Record one event for `key` and return how many fall inside the
    /// rolling window
    fn bump_window<K: std::hash::Hash + Eq>(
        &self,
        history: &DashMap<K, Vec<Instant>>,
        key: K,
    ) -> u32 {
        let window = self.config.heuristics_window;
        let mut entry = history.entry(key).or_default();
        let now = Instant::now();
        entry.retain(|t| now.duration_since(*t) <= window);
        entry.push(now);
        entry.len() as u32
    }

    pub fn stats(&self) -> SettlementStatsSnapshot {
        SettlementStatsSnapshot {
            matches_settled: self.stats.matches_settled.load(Ordering::Relaxed),
            payouts: self.stats.payouts.load(Ordering::Relaxed),
            refunds: self.stats.refunds.load(Ordering::Relaxed),
            settlement_failures: self.stats.settlement_failures.load(Ordering::Relaxed),
            fast_win_flags: self.stats.fast_win_flags.load(Ordering::Relaxed),
            abort_flags: self.stats.abort_flags.load(Ordering::Relaxed),
            collusion_flags: self.stats.collusion_flags.load(Ordering::Relaxed),
        }
    }
}

fn ordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
