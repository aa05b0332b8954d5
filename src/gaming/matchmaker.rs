//! Matchmaking queue: pairs waiting players by game type, stake, and
//! currency mode, FIFO within compatible entries.
//!
//! The queue only manages entries; escrow and session creation are the
//! match manager's job, which also compensates and requeues entries
//! when a debit fails mid-pairing.

use std::time::Instant;

use tokio::sync::Mutex;
use tracing::debug;

use crate::games::GameType;
use crate::protocol::{CurrencyMode, Stake, UserId};

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user: UserId,
    pub game_type: GameType,
    pub stake: Stake,
    pub currency_mode: CurrencyMode,
    pub joined_at: Instant,
}

impl QueueEntry {
    pub fn new(user: UserId, game_type: GameType, stake: Stake, currency_mode: CurrencyMode) -> Self {
        Self {
            user,
            game_type,
            stake,
            currency_mode,
            joined_at: Instant::now(),
        }
    }

    fn compatible_with(&self, other: &QueueEntry) -> bool {
        self.user != other.user
            && self.game_type == other.game_type
            && self.stake == other.stake
            && self.currency_mode == other.currency_mode
    }
}

/// Result of a queue join
#[derive(Debug)]
pub enum JoinOutcome {
    /// No compatible opponent yet; the entry is stored
    Waiting { position: usize, queue_size: usize },
    /// Paired with the earliest compatible waiter, whose entry has been
    /// removed from the queue
    Paired { opponent: QueueEntry },
}

/// FIFO matchmaking queue. A user holds at most one entry; joining
/// again replaces the previous entry.
pub struct Matchmaker {
    entries: Mutex<Vec<QueueEntry>>,
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Join the queue, pairing immediately with the first compatible
    /// waiter if one exists.
    pub async fn join(&self, entry: QueueEntry) -> JoinOutcome {
        let mut entries = self.entries.lock().await;

        // A user waits in at most one queue
        entries.retain(|e| e.user != entry.user);

        if let Some(idx) = entries.iter().position(|e| e.compatible_with(&entry)) {
            let opponent = entries.remove(idx);
            debug!(user = %entry.user, opponent = %opponent.user, "queue pairing");
            return JoinOutcome::Paired { opponent };
        }

        entries.push(entry);
        JoinOutcome::Waiting {
            position: entries.len(),
            queue_size: entries.len(),
        }
    }

    /// Remove a user's entry if present. Idempotent.
    pub async fn leave(&self, user: UserId) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.user != user);
        before != entries.len()
    }

    /// Put an entry back at the head of the queue. Used when a pairing
    /// is aborted and the earlier waiter keeps their spot.
    pub async fn restore_front(&self, entry: QueueEntry) {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.user != entry.user);
        entries.insert(0, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, user: UserId) -> bool {
        self.entries.lock().await.iter().any(|e| e.user == user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn entry(user: UserId, game_type: GameType, stake: rust_decimal::Decimal) -> QueueEntry {
        QueueEntry::new(
            user,
            game_type,
            Stake::new(stake).unwrap(),
            CurrencyMode::Virtual,
        )
    }

    #[tokio::test]
    async fn test_compatible_players_pair() {
        let mm = Matchmaker::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(matches!(
            mm.join(entry(a, GameType::ConnectFour, dec!(5))).await,
            JoinOutcome::Waiting { position: 1, .. }
        ));
        match mm.join(entry(b, GameType::ConnectFour, dec!(5))).await {
            JoinOutcome::Paired { opponent } => assert_eq!(opponent.user, a),
            other => panic!("expected pairing, got {:?}", other),
        }
        assert!(mm.is_empty().await);
    }

    #[tokio::test]
    async fn test_earliest_compatible_wins() {
        let mm = Matchmaker::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        mm.join(entry(a, GameType::TicTacToe, dec!(5))).await;
        mm.join(entry(b, GameType::TicTacToe, dec!(10))).await;

        // Only b's stake is compatible with c; a keeps waiting
        let outcome = mm.join(entry(c, GameType::TicTacToe, dec!(10))).await;
        match outcome {
            JoinOutcome::Paired { opponent } => assert_eq!(opponent.user, b),
            other => panic!("expected pairing, got {:?}", other),
        }
        assert!(mm.contains(a).await);
    }

    #[tokio::test]
    async fn test_incompatible_entries_wait() {
        let mm = Matchmaker::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        mm.join(entry(a, GameType::TicTacToe, dec!(5))).await;
        // Different game type: no pairing
        let outcome = mm.join(entry(b, GameType::Chess, dec!(5))).await;
        assert!(matches!(outcome, JoinOutcome::Waiting { position: 2, .. }));
    }

    #[tokio::test]
    async fn test_rejoin_replaces_entry() {
        let mm = Matchmaker::new();
        let a = Uuid::new_v4();

        mm.join(entry(a, GameType::TicTacToe, dec!(5))).await;
        mm.join(entry(a, GameType::Chess, dec!(20))).await;

        assert_eq!(mm.len().await, 1);
        // The old 5-stake entry is gone: a compatible joiner for it waits
        let b = Uuid::new_v4();
        assert!(matches!(
            mm.join(entry(b, GameType::TicTacToe, dec!(5))).await,
            JoinOutcome::Waiting { .. }
        ));
    }

    #[tokio::test]
    async fn test_user_never_pairs_with_self() {
        let mm = Matchmaker::new();
        let a = Uuid::new_v4();

        mm.join(entry(a, GameType::DiceBattle, dec!(5))).await;
        let outcome = mm.join(entry(a, GameType::DiceBattle, dec!(5))).await;
        assert!(matches!(outcome, JoinOutcome::Waiting { position: 1, .. }));
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let mm = Matchmaker::new();
        let a = Uuid::new_v4();

        mm.join(entry(a, GameType::TicTacToe, dec!(5))).await;
        assert!(mm.leave(a).await);
        assert!(!mm.leave(a).await);
        assert!(mm.is_empty().await);
    }

    #[tokio::test]
    async fn test_restore_front_keeps_priority() {
        let mm = Matchmaker::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        mm.join(entry(b, GameType::TicTacToe, dec!(5))).await;
        mm.restore_front(entry(a, GameType::Chess, dec!(5))).await;

        // A compatible joiner for `a` pairs with it even though `b` was
        // queued first chronologically
        let c = Uuid::new_v4();
        match mm.join(entry(c, GameType::Chess, dec!(5))).await {
            JoinOutcome::Paired { opponent } => assert_eq!(opponent.user, a),
            other => panic!("expected pairing, got {:?}", other),
        }
    }
}
