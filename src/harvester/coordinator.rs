//! Harvest orchestration
//!
//! The [`Harvester`] owns the driver, the checkpoint store and the session
//! state, and walks the explicit phase machine:
//!
//! ```text
//! Starting → Searching → [Paging] → Extracting ⇄ Advancing → Done
//!                 ↘           ↘          ↘          ↘
//!                          Recovering (bounded) → Aborted
//! ```
//!
//! Every wait is bounded, every failure is routed through classification and
//! recovery, and every exit path keeps the records gathered so far.

use crate::browser::{DriverError, DriverResult, Locator, PageDriver};
use crate::config::Config;
use crate::harvester::classifier::PageClassifier;
use crate::harvester::extractor::FieldExtractor;
use crate::harvester::jitter::{Jitter, RandomJitter};
use crate::harvester::pacing;
use crate::harvester::pagination::{NavOutcome, Paginator};
use crate::harvester::recovery::RecoveryStrategy;
use crate::harvester::scheduler::BackoffScheduler;
use crate::output::{CsvExporter, ExportKind};
use crate::record::Record;
use crate::state::{AbortReason, DoneReason, HarvestPhase, PageState, RegionSession, Resume};
use crate::storage::{resume_point, Checkpoint, CheckpointStore};
use crate::Result;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cooperative stop request shared between the CLI and the harvester
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the harvest to stop at the next phase transition
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a region session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    Completed(DoneReason),
    Aborted(AbortReason),
}

impl HarvestOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl fmt::Display for HarvestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(DoneReason::EndOfResults) => f.write_str("completed (end of results)"),
            Self::Completed(DoneReason::PageLimit) => f.write_str("completed (page limit)"),
            Self::Aborted(AbortReason::RecoveryExhausted) => {
                f.write_str("aborted (recovery attempts exhausted)")
            }
            Self::Aborted(AbortReason::LikelyBlocked) => {
                f.write_str("aborted (repeated empty pages, probable block)")
            }
            Self::Aborted(AbortReason::Interrupted) => f.write_str("aborted (interrupted)"),
        }
    }
}

/// Summary of a finished region session
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub region: String,
    pub outcome: HarvestOutcome,
    pub records: Vec<Record>,
    pub last_completed_page: u32,
    pub pages_visited: u32,
    pub recoveries: u32,
    /// CSV written for the session, if it had records
    pub output_path: Option<PathBuf>,
}

/// Drives one region session from search to a terminal state
pub struct Harvester {
    config: Config,
    driver: Box<dyn PageDriver>,
    store: Box<dyn CheckpointStore>,
    jitter: Box<dyn Jitter>,
    interrupt: InterruptFlag,
    extractor: FieldExtractor,
    classifier: PageClassifier,
    paginator: Paginator,
    scheduler: BackoffScheduler,
    recovery: RecoveryStrategy,
    exporter: CsvExporter,
    config_hash: Option<String>,
    fresh: bool,
}

impl Harvester {
    /// Builds a harvester for the configured region
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `driver` - Browser session to drive
    /// * `store` - Checkpoint backend
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to run
    /// * `Err(HarvestError)` - An extraction pattern failed to compile
    pub fn new(
        config: Config,
        driver: Box<dyn PageDriver>,
        store: Box<dyn CheckpointStore>,
    ) -> Result<Self> {
        let extractor = FieldExtractor::from_config(&config.extraction, &config.site.end_marker)?;
        let classifier = PageClassifier::new(&config.site);
        let paginator = Paginator::new(&config.site, &config.timeouts, &config.pacing);
        let scheduler = BackoffScheduler::new(config.backoff.clone());
        let recovery =
            RecoveryStrategy::new(&config.recovery, &config.pacing, config.timeouts.reload_ms);
        let exporter = CsvExporter::new(
            Path::new(&config.output.csv_dir),
            &config.output.file_prefix,
            config.output.utf8_bom,
        );

        Ok(Self {
            config,
            driver,
            store,
            jitter: Box::new(RandomJitter::new()),
            interrupt: InterruptFlag::new(),
            extractor,
            classifier,
            paginator,
            scheduler,
            recovery,
            exporter,
            config_hash: None,
            fresh: false,
        })
    }

    /// Replaces the source of randomized delays and pointer positions
    pub fn with_jitter(mut self, jitter: Box<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Hash stored with checkpoints and compared on resume
    pub fn with_config_hash(mut self, hash: Option<String>) -> Self {
        self.config_hash = hash;
        self
    }

    /// Ignore and clear any checkpoint instead of resuming from it
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Handle that stops the harvest when raised
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Runs the session to a terminal state
    ///
    /// Aborts are reported through [`HarvestOutcome`], not as errors. An error
    /// is returned only when the final dataset cannot be written; the
    /// checkpoint is saved first in that case.
    pub async fn run(mut self) -> Result<HarvestReport> {
        let region = self.config.harvest.region.clone();
        info!("Starting harvest for region {}", region);

        let mut session = RegionSession::new(&region);
        let mut phase = HarvestPhase::Starting;

        let outcome = loop {
            if phase != HarvestPhase::Starting && self.interrupt.is_raised() {
                warn!("Interrupt received while {}", phase);
                break HarvestOutcome::Aborted(AbortReason::Interrupted);
            }

            debug!("Phase: {}", phase);
            phase = match phase {
                HarvestPhase::Starting => self.start(&mut session),
                HarvestPhase::Searching => self.search(&mut session).await,
                HarvestPhase::Paging => self.page_forward(&mut session).await,
                HarvestPhase::Extracting => self.extract(&mut session).await,
                HarvestPhase::Advancing => self.advance(&mut session).await,
                HarvestPhase::Recovering { resume } => self.recover(&mut session, resume).await,
                terminal @ (HarvestPhase::Done(_) | HarvestPhase::Aborted(_)) => terminal,
            };

            match phase {
                HarvestPhase::Done(reason) => break HarvestOutcome::Completed(reason),
                HarvestPhase::Aborted(reason) => break HarvestOutcome::Aborted(reason),
                _ => {}
            }
        };

        let result = self.finish(&session, outcome);

        if let Err(e) = self.driver.close().await {
            warn!("Closing the browser failed: {}", e);
        }

        let output_path = result?;
        info!(
            "Harvest for {} {}: {} records, last completed page {}",
            region,
            outcome,
            session.records.len(),
            session.last_completed_page
        );

        Ok(HarvestReport {
            region,
            outcome,
            records: session.records,
            last_completed_page: session.last_completed_page,
            pages_visited: session.pages_visited,
            recoveries: session.recoveries,
            output_path,
        })
    }

    fn start(&mut self, session: &mut RegionSession) -> HarvestPhase {
        let region = session.region.clone();

        if self.fresh {
            if let Err(e) = self.store.clear(&region) {
                warn!("Could not clear checkpoint for {}: {}", region, e);
            }
            info!("Fresh start for {}", region);
        } else {
            match resume_point(self.store.as_ref(), &region) {
                Ok((records, next_page)) if next_page > 1 => {
                    self.check_config_hash(&region);
                    info!(
                        "Resuming {} at page {} with {} records",
                        region,
                        next_page,
                        records.len()
                    );
                    *session = RegionSession::resumed(&region, records, next_page - 1);
                }
                Ok(_) => info!("No checkpoint for {}; starting at page 1", region),
                Err(e) => warn!(
                    "Could not load checkpoint for {}: {}; starting at page 1",
                    region, e
                ),
            }
        }

        if self.page_limit_reached(session) {
            info!("Page limit already reached for {}", region);
            return HarvestPhase::Done(DoneReason::PageLimit);
        }

        HarvestPhase::Searching
    }

    /// Warns when the stored checkpoint came from a different configuration
    fn check_config_hash(&self, region: &str) {
        let Some(current) = &self.config_hash else {
            return;
        };
        if let Ok(Some(checkpoint)) = self.store.load(region) {
            if checkpoint
                .config_hash
                .as_ref()
                .is_some_and(|saved| saved != current)
            {
                warn!(
                    "Checkpoint for {} was written with a different configuration",
                    region
                );
            }
        }
    }

    async fn search(&mut self, session: &mut RegionSession) -> HarvestPhase {
        match self.perform_search().await {
            Ok(()) => {
                session.enter_page(1);
                info!("Search results loaded for {}", session.region);
                if session.needs_paging() {
                    info!("Paging forward to page {}", session.start_page);
                    HarvestPhase::Paging
                } else {
                    HarvestPhase::Extracting
                }
            }
            Err(e) => {
                warn!("Search for {} failed: {}", session.region, e);
                self.navigation_failed(session, Resume::Search)
            }
        }
    }

    /// Opens the search page, picks the region and submits
    async fn perform_search(&mut self) -> DriverResult<()> {
        let site = &self.config.site;
        let timeouts = &self.config.timeouts;
        let pace = &self.config.pacing;
        let driver = self.driver.as_mut();
        let jitter = self.jitter.as_mut();

        driver
            .navigate(&site.search_url, ms(timeouts.navigation_ms))
            .await?;
        pacing::pause(jitter, pace.think_min_ms, pace.think_max_ms).await;
        if pace.mouse_moves {
            pacing::wiggle(driver, jitter).await;
        }

        let select = Locator::css(&site.region_select_selector);
        driver.wait_for(&select, ms(timeouts.navigation_ms)).await?;
        if let Err(e) = driver.hover(&select).await {
            debug!("Hover on {} failed: {}", select, e);
        }
        pacing::pause(jitter, pace.hover_min_ms, pace.hover_max_ms).await;
        driver
            .select_option(&select, &self.config.harvest.region)
            .await?;
        pacing::pause(jitter, pace.think_min_ms, pace.think_max_ms).await;

        let button = Locator::css(&site.search_button_selector);
        if let Err(e) = driver.hover(&button).await {
            debug!("Hover on {} failed: {}", button, e);
        }
        pacing::pause(jitter, pace.hover_min_ms, pace.hover_max_ms).await;
        driver.click(&button).await?;

        wait_for_results(
            driver,
            &Locator::css(&site.results_selector),
            &Locator::css(&site.result_area_selector),
            &site.end_marker,
            ms(timeouts.search_results_ms),
            ms(timeouts.poll_interval_ms.max(1)),
        )
        .await
    }

    /// Steps from page 1 to the resume page
    async fn page_forward(&mut self, session: &mut RegionSession) -> HarvestPhase {
        if !session.needs_paging() {
            info!("Reached resume page {}", session.current_page);
            return HarvestPhase::Extracting;
        }

        let current = session.current_page;
        let outcome = self
            .paginator
            .go_to_page(
                self.driver.as_mut(),
                self.jitter.as_mut(),
                &self.classifier,
                current,
            )
            .await;

        match outcome {
            NavOutcome::Advanced => {
                session.enter_page(current + 1);
                self.backoff(session).await;
                HarvestPhase::Paging
            }
            NavOutcome::NoControl => match self.classifier.classify(self.driver.as_mut()).await {
                PageState::EndOfResults | PageState::Normal => {
                    info!(
                        "Results end at page {}, before resume page {}",
                        current, session.start_page
                    );
                    HarvestPhase::Done(DoneReason::EndOfResults)
                }
                _ => self.navigation_failed(session, Resume::Paging),
            },
            NavOutcome::Failed { landed, reason } => {
                warn!("Paging past page {} failed: {}", current, reason);
                if landed {
                    session.enter_page(current + 1);
                    session.record_failure();
                    HarvestPhase::Recovering {
                        resume: Resume::Paging,
                    }
                } else {
                    self.navigation_failed(session, Resume::Paging)
                }
            }
        }
    }

    async fn extract(&mut self, session: &mut RegionSession) -> HarvestPhase {
        let page = session.current_page;
        let state = self.classifier.classify(self.driver.as_mut()).await;
        if state.is_blocking() {
            session.record_failure();
            return HarvestPhase::Recovering {
                resume: Resume::Extract,
            };
        }

        let cards = match self.collect_cards().await {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Could not read cards on page {}: {}", page, e);
                let failures = session.record_extraction_failure();
                if failures > self.config.harvest.max_recovery_attempts {
                    error!(
                        "Reading cards on page {} failed {} times; giving up",
                        page, failures
                    );
                    return HarvestPhase::Aborted(AbortReason::RecoveryExhausted);
                }
                return HarvestPhase::Recovering {
                    resume: Resume::Extract,
                };
            }
        };

        let records = self.extractor.extract_cards(&cards);
        if !records.is_empty() {
            let added = session.complete_page(records);
            info!(
                "Page {}: {} records ({} total)",
                page,
                added,
                session.records.len()
            );

            let interval = self.config.harvest.checkpoint_interval;
            if interval > 0 && page % interval == 0 {
                self.save_checkpoint(session);
            }

            if self.page_limit_reached(session) {
                info!("Page limit of {} reached", page);
                return HarvestPhase::Done(DoneReason::PageLimit);
            }
            return HarvestPhase::Advancing;
        }

        if state.is_end() {
            info!("End of results on page {}", page);
            return HarvestPhase::Done(DoneReason::EndOfResults);
        }

        let empty = session.record_empty_page();
        warn!("Page {} returned no records ({} in a row)", page, empty);
        if empty >= self.config.harvest.empty_page_threshold {
            error!(
                "{} consecutive empty pages without a block indicator; assuming a block",
                empty
            );
            return HarvestPhase::Aborted(AbortReason::LikelyBlocked);
        }

        self.backoff(session).await;
        HarvestPhase::Extracting
    }

    /// Card texts, read by selector or by the configured script
    async fn collect_cards(&mut self) -> DriverResult<Vec<String>> {
        let site = &self.config.site;
        match &site.card_script {
            Some(script) => {
                let value = self
                    .driver
                    .evaluate(script, vec![Value::String(site.results_selector.clone())])
                    .await?;
                cards_from_value(value)
            }
            None => {
                self.driver
                    .text_contents(&Locator::css(&site.results_selector))
                    .await
            }
        }
    }

    async fn advance(&mut self, session: &mut RegionSession) -> HarvestPhase {
        let current = session.current_page;
        let outcome = self
            .paginator
            .go_to_page(
                self.driver.as_mut(),
                self.jitter.as_mut(),
                &self.classifier,
                current,
            )
            .await;

        match outcome {
            NavOutcome::Advanced => {
                session.enter_page(current + 1);
                self.backoff(session).await;
                HarvestPhase::Extracting
            }
            NavOutcome::NoControl => match self.classifier.classify(self.driver.as_mut()).await {
                PageState::EndOfResults => HarvestPhase::Done(DoneReason::EndOfResults),
                PageState::Normal => {
                    info!("No control past page {}; treating it as the last page", current);
                    HarvestPhase::Done(DoneReason::EndOfResults)
                }
                _ => self.navigation_failed(session, Resume::Advance),
            },
            NavOutcome::Failed { landed, reason } => {
                warn!("Moving past page {} failed: {}", current, reason);
                if landed {
                    session.enter_page(current + 1);
                }

                if self.classifier.classify(self.driver.as_mut()).await.is_end() {
                    return HarvestPhase::Done(DoneReason::EndOfResults);
                }

                if landed {
                    session.record_failure();
                    HarvestPhase::Recovering {
                        resume: Resume::Extract,
                    }
                } else {
                    self.navigation_failed(session, Resume::Advance)
                }
            }
        }
    }

    async fn recover(&mut self, session: &mut RegionSession, resume: Resume) -> HarvestPhase {
        let attempt = session.recovery_attempts + 1;
        let recovered = self
            .recovery
            .attempt(
                self.driver.as_mut(),
                self.jitter.as_mut(),
                &self.classifier,
                attempt,
            )
            .await;

        if recovered {
            session.record_recovery();
            return resume.phase();
        }

        let failed = session.record_failed_recovery();
        if failed > self.config.harvest.max_recovery_attempts {
            error!(
                "Giving up on {} after {} failed recovery attempts",
                session.region, failed
            );
            return HarvestPhase::Aborted(AbortReason::RecoveryExhausted);
        }

        HarvestPhase::Recovering { resume }
    }

    /// Counts a search or page move that never reached a new page
    fn navigation_failed(&self, session: &mut RegionSession, resume: Resume) -> HarvestPhase {
        let failures = session.record_navigation_failure();
        if failures > self.config.harvest.max_recovery_attempts {
            error!(
                "Navigation failed {} times in a row on page {}",
                failures, session.current_page
            );
            return HarvestPhase::Aborted(AbortReason::RecoveryExhausted);
        }
        HarvestPhase::Recovering { resume }
    }

    /// Sleeps for the jittered backoff delay of the current page
    async fn backoff(&mut self, session: &RegionSession) {
        let page = session.current_page;
        let delay = self
            .scheduler
            .pause_for(page, session.consecutive_failures);
        let delay = self.scheduler.sample(delay, self.jitter.as_mut());

        if self.scheduler.is_rest_page(page) {
            info!("Resting {:?} after page {}", delay, page);
        } else {
            debug!("Backing off {:?} after page {}", delay, page);
        }
        tokio::time::sleep(delay).await;
    }

    fn page_limit_reached(&self, session: &RegionSession) -> bool {
        self.config
            .harvest
            .max_pages
            .is_some_and(|max| session.last_completed_page >= max)
    }

    fn save_checkpoint(&mut self, session: &RegionSession) {
        let checkpoint = Checkpoint::new(
            &session.region,
            session.last_completed_page,
            session.records.clone(),
        )
        .with_config_hash(self.config_hash.clone());

        if let Err(e) = self.store.save(&checkpoint) {
            warn!("Could not save checkpoint for {}: {}", session.region, e);
        }
    }

    fn clear_checkpoint(&mut self, region: &str) {
        if let Err(e) = self.store.clear(region) {
            warn!("Could not clear checkpoint for {}: {}", region, e);
        }
    }

    fn export(&self, session: &RegionSession, kind: ExportKind) -> Result<Option<PathBuf>> {
        if session.records.is_empty() {
            info!("No records for {}; nothing to write", session.region);
            return Ok(None);
        }
        Ok(Some(self.exporter.write(
            &session.region,
            &session.records,
            kind,
        )?))
    }

    /// Persists the outcome: dataset, and checkpoint saved or cleared
    fn finish(&mut self, session: &RegionSession, outcome: HarvestOutcome) -> Result<Option<PathBuf>> {
        match outcome {
            HarvestOutcome::Completed(DoneReason::EndOfResults) => {
                match self.export(session, ExportKind::Final) {
                    Ok(path) => {
                        self.clear_checkpoint(&session.region);
                        Ok(path)
                    }
                    Err(e) => {
                        error!("Writing the final dataset failed: {}", e);
                        self.save_checkpoint(session);
                        Err(e)
                    }
                }
            }
            HarvestOutcome::Completed(DoneReason::PageLimit) => {
                self.save_checkpoint(session);
                self.export(session, ExportKind::Final)
            }
            HarvestOutcome::Aborted(reason) => {
                error!(
                    "Harvest for {} aborted ({:?}) after page {}",
                    session.region, reason, session.last_completed_page
                );
                self.save_checkpoint(session);
                self.export(session, ExportKind::Partial)
            }
        }
    }
}

/// Polls until result cards or the end marker appear
async fn wait_for_results(
    driver: &mut dyn PageDriver,
    results: &Locator,
    area: &Locator,
    end_marker: &str,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if driver.count(results).await? > 0 {
            return Ok(());
        }
        if driver
            .text_contents(area)
            .await?
            .iter()
            .any(|text| text.contains(end_marker))
        {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(DriverError::Timeout(format!(
                "no results within {:?}",
                timeout
            )));
        }
        tokio::time::sleep(poll).await;
    }
}

/// Card texts from a script result: an array of strings
fn cards_from_value(value: Value) -> DriverResult<Vec<String>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(DriverError::Protocol {
            error: "unexpected script result".to_string(),
            message: other.to_string(),
        }),
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
