//! The batch sweeper - a restartable interval loop around
//! `run_settlement_sweep`.
//!
//! Injected and lifecycle-managed: no global scheduler state, no
//! import-time side effects. `start` spawns the loop, `stop` signals it
//! and waits; the pair can be called repeatedly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use ascend_common::config::SweepSettings;

use crate::engine::SettlementEngine;

pub struct Sweeper {
    engine: Arc<SettlementEngine>,
    config: SweepSettings,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn new(engine: Arc<SettlementEngine>, config: SweepSettings) -> Self {
        Self {
            engine,
            config,
            shutdown: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the sweep loop. The first sweep runs immediately - it is
    /// idempotent, so catching up after a restart costs nothing.
    pub fn start(&mut self) {
        if !self.config.enabled {
            info!("Sweeper disabled in configuration");
            return;
        }
        if self.handle.is_some() {
            warn!("Sweeper already running, ignoring start");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let period = Duration::from_secs(self.config.interval_minutes.max(1) * 60);

        info!(
            "Starting sweeper (every {} min)",
            self.config.interval_minutes.max(1)
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.run_settlement_sweep().await {
                            warn!("Settlement sweep failed: {e:#}");
                        }
                    }
                    _ = rx.changed() => {
                        info!("Sweeper stopping");
                        break;
                    }
                }
            }
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
    }

    /// Signal the loop and wait for it to exit. Safe to call when not
    /// running.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
