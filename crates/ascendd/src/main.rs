//! Ascend daemon - turns logged life activity into XP and levels.
//!
//! Hosts the persistence layer and the periodic settlement sweep; the
//! ingestion surfaces call into the engine through the library crate.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn, Level};

use ascend_common::{Config, Db, DbLocation};
use ascendd::advisor::{AdvisoryScorer, OllamaAdvisor};
use ascendd::engine::SettlementEngine;
use ascendd::ollama;
use ascendd::sweeper::Sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Ascend daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default();
    let db = Db::open(DbLocation::Custom(config.db_path())).await?;

    let advisor: Option<Arc<dyn AdvisoryScorer>> = if config.advisor.enabled {
        if ollama::is_running(&config.advisor.base_url).await {
            info!("Advisory scorer available (model: {})", config.advisor.model);
            Some(Arc::new(OllamaAdvisor::new(&config.advisor)))
        } else {
            warn!("Ollama not reachable, deterministic scoring only");
            None
        }
    } else {
        info!("Advisory scorer disabled in configuration");
        None
    };

    let engine = Arc::new(SettlementEngine::new(db, config.clone(), advisor));
    let mut sweeper = Sweeper::new(Arc::clone(&engine), config.sweep.clone());
    sweeper.start();

    info!("Ascend daemon ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");
    sweeper.stop().await;

    Ok(())
}
