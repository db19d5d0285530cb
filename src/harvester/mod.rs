//! Harvest engine
//!
//! This module contains the pieces the orchestrator composes:
//! - Field extraction from card text
//! - Page classification (normal, end of results, blocked, redirected)
//! - Pagination, backoff scheduling and recovery
//! - The [`Harvester`] state machine itself

pub mod classifier;
mod coordinator;
pub mod extractor;
pub mod jitter;
pub mod pacing;
pub mod pagination;
pub mod recovery;
pub mod scheduler;

pub use classifier::{PageClassifier, PageSnapshot};
pub use coordinator::{HarvestOutcome, HarvestReport, Harvester, InterruptFlag};
pub use extractor::FieldExtractor;
pub use jitter::{FixedJitter, Jitter, RandomJitter};
pub use pagination::{NavOutcome, Paginator};
pub use recovery::RecoveryStrategy;
pub use scheduler::BackoffScheduler;

use crate::browser::{PageDriver, SnapshotDriver, WebDriverSession};
use crate::config::{Config, DriverKind};
use crate::{storage, ConfigError, Result};
use std::path::Path;
use tracing::info;

/// Runs a harvest with the driver and checkpoint backend named in the config
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Hash of the configuration file, stored with checkpoints
/// * `fresh` - Clear any checkpoint instead of resuming from it
/// * `interrupt` - Flag that stops the harvest at the next transition
///
/// # Returns
///
/// * `Ok(HarvestReport)` - The session reached a terminal state
/// * `Err(HarvestError)` - The driver or store could not be set up, or the
///   dataset could not be written
pub async fn run_harvest(
    config: Config,
    config_hash: Option<String>,
    fresh: bool,
    interrupt: InterruptFlag,
) -> Result<HarvestReport> {
    let driver: Box<dyn PageDriver> = match config.browser.kind {
        DriverKind::Webdriver => {
            info!("Connecting to WebDriver at {}", config.browser.webdriver_url);
            Box::new(WebDriverSession::connect(&config.browser).await?)
        }
        DriverKind::Snapshot => {
            let dir = config.browser.snapshot_dir.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "snapshot_dir is required for the snapshot driver".to_string(),
                )
            })?;
            info!("Replaying saved pages from {}", dir);
            Box::new(SnapshotDriver::from_dir(
                Path::new(dir),
                &config.site.search_url,
            )?)
        }
    };

    let store = storage::open_store(&config.output)?;

    Harvester::new(config, driver, store)?
        .with_config_hash(config_hash)
        .fresh(fresh)
        .with_interrupt(interrupt)
        .run()
        .await
}
