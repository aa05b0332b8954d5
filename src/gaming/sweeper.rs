//! Recovery sweeper: periodic job that force-refunds matches stuck in
//! an active state and evicts settled sessions past their grace period.
//!
//! Queue and match state are transient in-memory structures; this
//! sweeper is what makes abandoning them safe, because the escrowed
//! value always flows back to the persistent wallet ledger.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::{GameConfig, SweeperConfig};

use super::match_manager::MatchManager;

pub struct RecoverySweeper {
    manager: MatchManager,
    config: SweeperConfig,
    eviction_grace: Duration,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl RecoverySweeper {
    pub fn new(manager: MatchManager, config: SweeperConfig, game_config: &GameConfig) -> Self {
        Self {
            manager,
            config,
            eviction_grace: game_config.eviction_grace,
            shutdown_tx: None,
        }
    }

    /// Start the background sweep loop
    pub fn start(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let manager = self.manager.clone();
        let stale_after = self.config.stale_after;
        let grace = self.eviction_grace;
        let sweep_interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            // The first tick fires immediately; skip it so a fresh
            // server does not sweep an empty store
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::sweep(&manager, stale_after, grace).await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
            debug!("recovery sweeper stopped");
        });

        info!(
            interval_secs = sweep_interval.as_secs(),
            stale_secs = stale_after.as_secs(),
            "recovery sweeper started"
        );
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }

    /// One sweep pass. Exposed for tests and admin tooling.
    pub async fn sweep_once(&self) -> (usize, usize) {
        Self::sweep(&self.manager, self.config.stale_after, self.eviction_grace).await
    }

    async fn sweep(manager: &MatchManager, stale_after: Duration, grace: Duration) -> (usize, usize) {
        let recovered = manager.recover_stale_matches(stale_after).await;
        let evicted = manager.evict_finished(grace).await;
        if recovered > 0 || evicted > 0 {
            info!(recovered, evicted, "sweep pass finished");
        }
        (recovered, evicted)
    }
}

impl Drop for RecoverySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
