//! End-to-end match lifecycle tests: queue pairing, escrow, moves,
//! settlement, timers, and recovery, driven through the public
//! `MatchManager` API with in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use stakeduel::audit::AuditAction;
use stakeduel::config::Config;
use stakeduel::gaming::{MatchManager, MatchStatus, RecoverySweeper};
use stakeduel::transport::{ConnectionRegistry, ServerEvent};
use stakeduel::{
    CurrencyMode, Error, GameType, InMemoryAudit, InMemoryIdentity, InMemoryWallet, MatchId,
    MoveError, PlayerMove, UserId,
};

struct Harness {
    wallet: Arc<InMemoryWallet>,
    audit: Arc<InMemoryAudit>,
    identity: Arc<InMemoryIdentity>,
    registry: Arc<ConnectionRegistry>,
    manager: MatchManager,
    config: Config,
}

fn harness() -> Harness {
    let config = Config::default();
    let wallet = Arc::new(InMemoryWallet::new());
    let audit = Arc::new(InMemoryAudit::new());
    let identity = Arc::new(InMemoryIdentity::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = MatchManager::new(
        wallet.clone(),
        audit.clone(),
        identity.clone(),
        registry.clone(),
        &config,
    );
    Harness {
        wallet,
        audit,
        identity,
        registry,
        manager,
        config,
    }
}

fn funded_user(h: &Harness, amount: Decimal, mode: CurrencyMode) -> UserId {
    let user = Uuid::new_v4();
    h.wallet.deposit(user, amount, mode);
    h.identity.register(user, format!("player-{}", &user.to_string()[..8]));
    user
}

/// Queue both players and return (match id, first mover, second mover)
async fn pair(
    h: &Harness,
    a: UserId,
    b: UserId,
    game_type: GameType,
    stake: Decimal,
    mode: CurrencyMode,
) -> (MatchId, UserId, UserId) {
    h.manager.join_queue(a, game_type, stake, mode).await.unwrap();
    h.manager.join_queue(b, game_type, stake, mode).await.unwrap();

    let match_id = h.manager.match_of(a).expect("match created");
    let summary = h.manager.match_summary(match_id).await.unwrap();
    let first = summary.current_turn.expect("active match has a turn");
    let second = if first == a { b } else { a };
    (match_id, first, second)
}

async fn place(h: &Harness, user: UserId, match_id: MatchId, cell: usize) {
    h.manager
        .make_move(user, match_id, PlayerMove::Place { cell })
        .await
        .unwrap();
}

#[tokio::test]
async fn tic_tac_toe_win_pays_the_winner() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(100), CurrencyMode::Virtual);

    let (match_id, x, o) =
        pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual).await;

    // Escrow is held while the match runs
    assert_eq!(h.wallet.balance(x, CurrencyMode::Virtual), dec!(90));
    assert_eq!(h.wallet.balance(o, CurrencyMode::Virtual), dec!(90));

    // X takes the top row
    place(&h, x, match_id, 0).await;
    place(&h, o, match_id, 3).await;
    place(&h, x, match_id, 1).await;
    place(&h, o, match_id, 4).await;
    place(&h, x, match_id, 2).await;

    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Completed);
    assert_eq!(summary.winner, Some(x));
    assert_eq!(summary.current_turn, None);

    // Virtual matches pay the full escrow, no fee
    assert_eq!(h.wallet.balance(x, CurrencyMode::Virtual), dec!(110));
    assert_eq!(h.wallet.balance(o, CurrencyMode::Virtual), dec!(90));
}

#[tokio::test]
async fn real_money_win_retains_platform_fee() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Real);
    let b = funded_user(&h, dec!(100), CurrencyMode::Real);

    let (match_id, x, o) =
        pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Real).await;

    place(&h, x, match_id, 0).await;
    place(&h, o, match_id, 3).await;
    place(&h, x, match_id, 1).await;
    place(&h, o, match_id, 4).await;
    place(&h, x, match_id, 2).await;

    // Default fee is 10% of the 20 escrow
    assert_eq!(h.wallet.balance(x, CurrencyMode::Real), dec!(108));
    assert_eq!(h.wallet.balance(o, CurrencyMode::Real), dec!(90));
    assert_eq!(h.audit.count_of(AuditAction::Payout).await, 1);
    assert_eq!(h.audit.count_of(AuditAction::PlatformFee).await, 1);

    // Escrow conservation: credited + fee equals what was escrowed
    let total_now = h.wallet.balance(x, CurrencyMode::Real) + h.wallet.balance(o, CurrencyMode::Real);
    assert_eq!(total_now, dec!(198)); // 200 in, 2 fee retained
}

#[tokio::test]
async fn move_from_non_current_player_is_rejected() {
    let h = harness();
    let a = funded_user(&h, dec!(50), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(50), CurrencyMode::Virtual);

    let (match_id, _first, second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(5), CurrencyMode::Virtual).await;

    let err = h
        .manager
        .make_move(second, match_id, PlayerMove::Place { cell: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Move(MoveError::NotYourTurn)));

    // Board untouched, match still live
    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Active);
}

#[tokio::test]
async fn settlement_runs_exactly_once() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Real);
    let b = funded_user(&h, dec!(100), CurrencyMode::Real);

    let (match_id, first, _second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Real).await;

    h.manager.resign(first, match_id).await.unwrap();
    let balance_after_first = h.wallet.balance(a, CurrencyMode::Real)
        + h.wallet.balance(b, CurrencyMode::Real);

    // Second terminal attempt is rejected and moves no money
    let err = h.manager.resign(first, match_id).await.unwrap_err();
    assert!(matches!(err, Error::Move(MoveError::GameOver)));
    let err = h.manager.cancel_match(match_id, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let balance_after_second = h.wallet.balance(a, CurrencyMode::Real)
        + h.wallet.balance(b, CurrencyMode::Real);
    assert_eq!(balance_after_first, balance_after_second);
    assert_eq!(h.manager.settlement_stats().matches_settled, 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_forfeits_to_the_opponent() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(100), CurrencyMode::Virtual);

    let (match_id, first, second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual).await;

    // Nobody moves; the armed timer fires after the turn timeout
    tokio::time::sleep(h.config.game.turn_timeout + Duration::from_secs(1)).await;

    // Let the expiry task finish its settlement
    let mut status = MatchStatus::Active;
    for _ in 0..50 {
        tokio::task::yield_now().await;
        status = h.manager.match_summary(match_id).await.unwrap().status;
        if status != MatchStatus::Active {
            break;
        }
    }

    assert_eq!(status, MatchStatus::Completed);
    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.winner, Some(second));

    // The timed-out player can no longer move
    let err = h
        .manager
        .make_move(first, match_id, PlayerMove::Place { cell: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Move(MoveError::GameOver)));

    // Forfeit pays like a win
    assert_eq!(h.wallet.balance(second, CurrencyMode::Virtual), dec!(110));
    assert_eq!(h.wallet.balance(first, CurrencyMode::Virtual), dec!(90));
}

#[tokio::test(start_paused = true)]
async fn accepted_move_cancels_the_pending_timer() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(100), CurrencyMode::Virtual);

    let (match_id, first, second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual).await;

    // First player moves just before their deadline
    tokio::time::sleep(h.config.game.turn_timeout - Duration::from_secs(1)).await;
    place(&h, first, match_id, 4).await;

    // Crossing the original deadline must not forfeit anyone; the
    // fresh timer now belongs to the second player
    tokio::time::sleep(Duration::from_secs(2)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Active);
    assert_eq!(summary.current_turn, Some(second));
}

#[tokio::test]
async fn insufficient_balance_aborts_pairing() {
    let h = harness();
    let rich = funded_user(&h, dec!(100), CurrencyMode::Real);
    let broke = funded_user(&h, dec!(5), CurrencyMode::Real);

    h.manager
        .join_queue(rich, GameType::TicTacToe, dec!(10), CurrencyMode::Real)
        .await
        .unwrap();

    // The joiner cannot cover the stake: pairing aborts before any
    // session exists, the waiter keeps their spot
    let err = h
        .manager
        .join_queue(broke, GameType::TicTacToe, dec!(10), CurrencyMode::Real)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));

    assert_eq!(h.manager.match_of(rich), None);
    assert_eq!(h.manager.match_of(broke), None);
    assert_eq!(h.wallet.balance(rich, CurrencyMode::Real), dec!(100));
    assert_eq!(h.wallet.balance(broke, CurrencyMode::Real), dec!(5));
    assert_eq!(h.manager.stats().await.queued_players, 1);
}

#[tokio::test]
async fn broke_waiter_is_compensated_and_joiner_requeued() {
    let h = harness();
    let broke = funded_user(&h, dec!(5), CurrencyMode::Real);
    let rich = funded_user(&h, dec!(100), CurrencyMode::Real);

    // The broke player queues first; their shortfall only surfaces at
    // pairing time
    h.manager
        .join_queue(broke, GameType::TicTacToe, dec!(10), CurrencyMode::Real)
        .await
        .unwrap();
    h.manager
        .join_queue(rich, GameType::TicTacToe, dec!(10), CurrencyMode::Real)
        .await
        .unwrap();

    // No match, the joiner's escrow was returned and they wait again
    assert_eq!(h.manager.match_of(rich), None);
    assert_eq!(h.wallet.balance(rich, CurrencyMode::Real), dec!(100));
    let stats = h.manager.stats().await;
    assert_eq!(stats.queued_players, 1);
    assert_eq!(stats.matches_created, 0);
}

#[tokio::test]
async fn diamond_hunt_ends_on_first_hit() {
    let h = harness();
    let a = funded_user(&h, dec!(40), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(40), CurrencyMode::Virtual);

    let (match_id, mut mover, mut waiter) =
        pair(&h, a, b, GameType::DiamondHunt, dec!(4), CurrencyMode::Virtual).await;

    // Reveal cells in order until the hidden diamond ends the match
    let mut revealed = 0;
    for cell in 0..25 {
        h.manager
            .make_move(mover, match_id, PlayerMove::Reveal { cell })
            .await
            .unwrap();
        revealed += 1;
        let summary = h.manager.match_summary(match_id).await.unwrap();
        if summary.status != MatchStatus::Active {
            // The revealer of the diamond wins immediately
            assert_eq!(summary.status, MatchStatus::Completed);
            assert_eq!(summary.winner, Some(mover));
            break;
        }
        std::mem::swap(&mut mover, &mut waiter);
    }
    assert!(revealed <= 25, "diamond must be found within the grid");

    // Winner takes the full escrow
    let total = h.wallet.balance(a, CurrencyMode::Virtual)
        + h.wallet.balance(b, CurrencyMode::Virtual);
    assert_eq!(total, dec!(80));
}

#[tokio::test]
async fn dice_battle_plays_to_completion() {
    let h = harness();
    let a = funded_user(&h, dec!(30), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(30), CurrencyMode::Virtual);

    let (match_id, _first, _second) =
        pair(&h, a, b, GameType::DiceBattle, dec!(3), CurrencyMode::Virtual).await;

    // Both sides roll whenever it is their turn; at most 10 rolls end a
    // best-of-five
    for _ in 0..10 {
        let summary = h.manager.match_summary(match_id).await.unwrap();
        let Some(turn) = summary.current_turn else {
            break;
        };
        h.manager
            .make_move(turn, match_id, PlayerMove::Roll)
            .await
            .unwrap();
    }

    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Completed);
    // Win or draw, escrow is fully released in virtual mode
    let total = h.wallet.balance(a, CurrencyMode::Virtual)
        + h.wallet.balance(b, CurrencyMode::Virtual);
    assert_eq!(total, dec!(60));
}

#[tokio::test]
async fn disconnect_forfeits_to_connected_player() {
    let h = harness();
    let a = funded_user(&h, dec!(50), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(50), CurrencyMode::Virtual);

    let (match_id, first, _second) =
        pair(&h, a, b, GameType::Chess, dec!(5), CurrencyMode::Virtual).await;

    let leaver = first;
    let stayer = if leaver == a { b } else { a };
    h.manager.handle_disconnect(leaver).await;

    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Completed);
    assert_eq!(summary.winner, Some(stayer));
    assert_eq!(h.wallet.balance(stayer, CurrencyMode::Virtual), dec!(55));
}

#[tokio::test]
async fn stuck_match_is_refunded_by_the_sweeper() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Real);
    let b = funded_user(&h, dec!(100), CurrencyMode::Real);

    let (match_id, _first, _second) =
        pair(&h, a, b, GameType::ConnectFour, dec!(10), CurrencyMode::Real).await;

    // Zero staleness threshold makes the fresh match immediately stale
    let recovered = h.manager.recover_stale_matches(Duration::ZERO).await;
    assert_eq!(recovered, 1);

    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Refunded);
    assert_eq!(summary.winner, None);
    assert_eq!(h.wallet.balance(a, CurrencyMode::Real), dec!(100));
    assert_eq!(h.wallet.balance(b, CurrencyMode::Real), dec!(100));
    assert_eq!(h.audit.count_of(AuditAction::ForceRefund).await, 1);
    assert_eq!(h.audit.count_of(AuditAction::Refund).await, 2);

    // Past the grace period the session is evicted entirely
    let evicted = h.manager.evict_finished(Duration::ZERO).await;
    assert_eq!(evicted, 1);
    assert!(h.manager.match_summary(match_id).await.is_none());
}

#[tokio::test]
async fn sweeper_skips_matches_with_unknown_players() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Real);
    let b = funded_user(&h, dec!(100), CurrencyMode::Real);

    let (match_id, _first, _second) =
        pair(&h, a, b, GameType::ConnectFour, dec!(10), CurrencyMode::Real).await;

    h.identity.remove(b);
    let recovered = h.manager.recover_stale_matches(Duration::ZERO).await;
    assert_eq!(recovered, 0);
    let summary = h.manager.match_summary(match_id).await.unwrap();
    assert_eq!(summary.status, MatchStatus::Active);
}

#[tokio::test]
async fn sweeper_runs_on_its_interval() {
    let h = harness();
    let a = funded_user(&h, dec!(20), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(20), CurrencyMode::Virtual);

    let (_match_id, _first, _second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(2), CurrencyMode::Virtual).await;

    let mut config = h.config.sweeper.clone();
    config.stale_after = Duration::ZERO;
    let sweeper = RecoverySweeper::new(h.manager.clone(), config, &h.config.game);
    let (recovered, _evicted) = sweeper.sweep_once().await;
    assert_eq!(recovered, 1);
}

#[tokio::test]
async fn players_can_requeue_after_settlement() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(100), CurrencyMode::Virtual);

    let (match_id, first, _second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual).await;
    h.manager.resign(first, match_id).await.unwrap();

    // The finished session still exists inside the grace window, but
    // both players are free to queue again
    h.manager
        .join_queue(a, GameType::Chess, dec!(10), CurrencyMode::Virtual)
        .await
        .unwrap();
    assert_eq!(h.manager.stats().await.queued_players, 1);
}

#[tokio::test]
async fn queued_player_cannot_hold_two_matches() {
    let h = harness();
    let a = funded_user(&h, dec!(100), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(100), CurrencyMode::Virtual);
    let c = funded_user(&h, dec!(100), CurrencyMode::Virtual);

    pair(&h, a, b, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual).await;

    let err = h
        .manager
        .join_queue(a, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Queue(_)));

    // An uninvolved player queues fine
    h.manager
        .join_queue(c, GameType::TicTacToe, dec!(10), CurrencyMode::Virtual)
        .await
        .unwrap();
}

#[tokio::test]
async fn transport_events_flow_to_both_players() {
    let h = harness();
    let a = funded_user(&h, dec!(50), CurrencyMode::Virtual);
    let b = funded_user(&h, dec!(50), CurrencyMode::Virtual);

    let (_, mut rx_a) = h.registry.register(a);
    let (_, mut rx_b) = h.registry.register(b);

    let (match_id, first, _second) =
        pair(&h, a, b, GameType::TicTacToe, dec!(5), CurrencyMode::Virtual).await;

    // Waiter notification for the first join, then a MatchFound each
    let waiting = rx_a.recv().await.unwrap();
    assert!(matches!(waiting, ServerEvent::QueueWaiting { .. }));
    let found_a = rx_a.recv().await.unwrap();
    assert!(matches!(found_a, ServerEvent::MatchFound { .. }));
    let found_b = rx_b.recv().await.unwrap();
    assert!(matches!(found_b, ServerEvent::MatchFound { .. }));

    // The first mover also gets the turn prompt
    let mut rx_first = if first == a { rx_a } else { rx_b };
    let turn = rx_first.recv().await.unwrap();
    assert!(
        matches!(turn, ServerEvent::YourTurn { .. }),
        "expected YourTurn, got {:?}",
        turn
    );

    h.manager.chat(first, match_id, "glhf".to_string()).await.unwrap();
    let chat = rx_first.recv().await.unwrap();
    assert!(matches!(chat, ServerEvent::ChatMessage { .. }));
}
