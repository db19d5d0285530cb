//! Integration tests for the harvester
//!
//! These tests replay saved result pages through the snapshot driver and run
//! the full state machine end-to-end with deterministic jitter and
//! millisecond timings.

use registry_harvester::browser::{SnapshotDriver, SnapshotView};
use registry_harvester::config::{
    BackoffConfig, Config, PacingConfig, RecoveryConfig, TimeoutConfig,
};
use registry_harvester::harvester::{FixedJitter, HarvestOutcome, Harvester, InterruptFlag};
use registry_harvester::state::{AbortReason, DoneReason};
use registry_harvester::storage::{
    Checkpoint, CheckpointStore, FileCheckpointStore, SqliteCheckpointStore, StorageError,
    StorageResult,
};
use registry_harvester::Record;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const SEARCH_URL: &str = "https://portal.example.org/busca-medicos";
const END_MARKER: &str = "Nenhum resultado a mostrar";

/// Creates a test configuration with millisecond timings
fn create_test_config(dir: &Path) -> Config {
    let mut config = Config::new("RR", SEARCH_URL);

    config.harvest.max_recovery_attempts = 2;
    config.timeouts = TimeoutConfig {
        navigation_ms: 200,
        search_results_ms: 200,
        page_refresh_ms: 100,
        reload_ms: 100,
        poll_interval_ms: 5,
    };
    config.backoff = BackoffConfig {
        base_delay_ms: 1,
        floor_ms: 1,
        spread: 1.0,
        ..BackoffConfig::default()
    };
    config.recovery = RecoveryConfig {
        min_wait_ms: 1,
        max_wait_ms: 2,
        settle_min_ms: 0,
        settle_max_ms: 0,
    };
    config.pacing = PacingConfig {
        hover_min_ms: 0,
        hover_max_ms: 0,
        think_min_ms: 0,
        think_max_ms: 0,
        mouse_moves: false,
    };
    config.output.csv_dir = dir.join("csv").to_string_lossy().into_owned();
    config.output.checkpoint_dir = dir.join("checkpoints").to_string_lossy().into_owned();

    config
}

/// A result page with the search form, `cards` doctors and links to `links`
fn results_page(page: u32, cards: u32, links: &[u32]) -> String {
    let cards: String = (1..=cards)
        .map(|i| {
            format!(
                "<div class=\"resultado-item\">\nDOCTOR {page}-{i} CRM: {page}{i}-RR\nSituação: Regular\n</div>\n"
            )
        })
        .collect();
    let links: String = links
        .iter()
        .map(|n| format!("<a href=\"javascript:void(0)\">{}</a>", n))
        .collect();

    format!(
        r#"<html><body>
<form>
<select name="uf"><option value="AM">AM</option><option value="RR">RR</option></select>
<button class="btn-buscar" type="button">Buscar</button>
</form>
<div class="busca-resultado">
{cards}</div>
<div id="paginacao">{links}</div>
</body></html>"#
    )
}

fn end_page() -> String {
    format!(
        r#"<html><body>
<div class="busca-resultado"><div class="resultado-item">{}</div></div>
</body></html>"#,
        END_MARKER
    )
}

fn throttled_page() -> String {
    "<html><body><h1>Erro 429</h1><p>Too many requests, try again later.</p></body></html>"
        .to_string()
}

/// Three pages of two cards each, then the end marker on page 4
fn three_page_driver() -> SnapshotDriver {
    SnapshotDriver::new(SEARCH_URL)
        .with_page(1, results_page(1, 2, &[2, 3]))
        .with_page(2, results_page(2, 2, &[1, 3]))
        .with_page(3, results_page(3, 2, &[1, 2, 4]))
        .with_page(4, end_page())
}

fn file_store(dir: &Path) -> FileCheckpointStore {
    FileCheckpointStore::new(&dir.join("checkpoints")).expect("Failed to open checkpoint store")
}

fn harvester(config: Config, driver: SnapshotDriver, dir: &Path) -> Harvester {
    Harvester::new(config, Box::new(driver), Box::new(file_store(dir)))
        .expect("Failed to build harvester")
        .with_jitter(Box::new(FixedJitter))
}

/// Store that journals saves and clears, optionally failing every write
#[derive(Clone, Default)]
struct JournalStore {
    saved_pages: Arc<Mutex<Vec<u32>>>,
    clears: Arc<Mutex<u32>>,
    failing: bool,
}

impl JournalStore {
    fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn write_error() -> StorageError {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only checkpoint dir",
        ))
    }
}

impl CheckpointStore for JournalStore {
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.saved_pages.lock().unwrap().push(checkpoint.page_index);
        if self.failing {
            return Err(Self::write_error());
        }
        Ok(())
    }

    fn load(&self, _region: &str) -> StorageResult<Option<Checkpoint>> {
        Ok(None)
    }

    fn clear(&mut self, _region: &str) -> StorageResult<()> {
        *self.clears.lock().unwrap() += 1;
        if self.failing {
            return Err(Self::write_error());
        }
        Ok(())
    }
}

fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.registration_id.clone())
        .collect()
}

#[tokio::test]
async fn test_full_harvest_until_end_marker() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let report = harvester(config, three_page_driver(), dir.path())
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Completed(DoneReason::EndOfResults)
    );
    assert_eq!(
        ids(&report.records),
        vec!["11-RR", "12-RR", "21-RR", "22-RR", "31-RR", "32-RR"]
    );
    assert_eq!(report.records[0].name.as_deref(), Some("DOCTOR 1-1"));
    assert_eq!(report.records[0].status.as_deref(), Some("Regular"));
    assert_eq!(report.last_completed_page, 3);
    assert_eq!(report.recoveries, 0);

    // Final dataset written, checkpoint cleared
    let output = report.output_path.expect("No output written");
    assert!(output.to_string_lossy().ends_with("_final.csv"));
    let bytes = std::fs::read(&output).unwrap();
    let mut reader =
        csv::Reader::from_reader(&bytes[registry_harvester::output::UTF8_BOM.len()..]);
    assert_eq!(reader.records().count(), 6);

    assert!(file_store(dir.path()).load("RR").unwrap().is_none());
}

#[tokio::test]
async fn test_block_once_then_recover_retries_same_page() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let driver = SnapshotDriver::new(SEARCH_URL)
        .with_page(1, results_page(1, 2, &[2]))
        .with_versions(
            2,
            vec![
                SnapshotView::html(throttled_page()),
                SnapshotView::html(results_page(2, 2, &[1, 3])),
            ],
        )
        .with_page(3, end_page());
    let log = driver.action_log();

    let report = harvester(config, driver, dir.path())
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Completed(DoneReason::EndOfResults)
    );
    assert_eq!(ids(&report.records), vec!["11-RR", "12-RR", "21-RR", "22-RR"]);
    assert_eq!(report.recoveries, 1);

    let log = log.lock().unwrap();
    assert!(log.iter().any(|action| action == "reload"));
}

#[tokio::test]
async fn test_persistent_block_aborts_and_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let driver = SnapshotDriver::new(SEARCH_URL)
        .with_page(1, results_page(1, 2, &[2]))
        .with_page(2, throttled_page());
    let log = driver.action_log();

    let report = harvester(config, driver, dir.path())
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Aborted(AbortReason::RecoveryExhausted)
    );

    // cap + 1 failed attempts, each with one reload
    let reloads = log
        .lock()
        .unwrap()
        .iter()
        .filter(|action| *action == "reload")
        .count();
    assert_eq!(reloads, 3);

    let checkpoint = file_store(dir.path())
        .load("RR")
        .unwrap()
        .expect("Checkpoint missing after abort");
    assert_eq!(checkpoint.page_index, 1);
    assert_eq!(ids(&checkpoint.records), vec!["11-RR", "12-RR"]);

    let output = report.output_path.expect("No partial output written");
    assert!(output.to_string_lossy().ends_with("_partial.csv"));
}

#[tokio::test]
async fn test_repeated_runs_yield_identical_records() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();

    let first = harvester(
        create_test_config(first_dir.path()),
        three_page_driver(),
        first_dir.path(),
    )
    .run()
    .await
    .unwrap();
    let second = harvester(
        create_test_config(second_dir.path()),
        three_page_driver(),
        second_dir.path(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(first.records, second.records);
}

#[tokio::test]
async fn test_resume_pages_forward_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let earlier = Record {
        name: Some("EARLIER DOCTOR".to_string()),
        registration_id: Some("99-RR".to_string()),
        ..Record::default()
    };
    file_store(dir.path())
        .save(&Checkpoint::new("RR", 2, vec![earlier]))
        .unwrap();

    let driver = three_page_driver();
    let log = driver.action_log();

    let report = harvester(config, driver, dir.path())
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Completed(DoneReason::EndOfResults)
    );
    // Pages 1 and 2 are walked through but not extracted again
    assert_eq!(ids(&report.records), vec!["99-RR", "31-RR", "32-RR"]);
    assert_eq!(report.last_completed_page, 3);

    let log = log.lock().unwrap();
    let loads: Vec<&String> = log.iter().filter(|a| a.starts_with("load:")).collect();
    assert_eq!(loads, vec!["load:1", "load:2", "load:3", "load:4"]);
}

#[tokio::test]
async fn test_interrupt_aborts_with_checkpoint_intact() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let saved = vec![Record {
        name: Some("ANA".to_string()),
        ..Record::default()
    }];
    file_store(dir.path())
        .save(&Checkpoint::new("RR", 5, saved.clone()))
        .unwrap();

    let driver = three_page_driver();
    let log = driver.action_log();

    let interrupt = InterruptFlag::new();
    interrupt.raise();

    let report = harvester(config, driver, dir.path())
        .with_interrupt(interrupt)
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Aborted(AbortReason::Interrupted)
    );

    let checkpoint = file_store(dir.path()).load("RR").unwrap().unwrap();
    assert_eq!(checkpoint.page_index, 5);
    assert_eq!(checkpoint.records, saved);

    let log = log.lock().unwrap();
    assert!(!log.iter().any(|a| a.starts_with("navigate:")));
    assert_eq!(log.last().map(String::as_str), Some("close"));
}

#[tokio::test]
async fn test_empty_pages_abort_as_likely_blocked() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    // Cards are attached but carry no record
    let hollow = results_page(2, 0, &[1, 3]).replace(
        "<div class=\"busca-resultado\">\n",
        "<div class=\"busca-resultado\">\n<div class=\"resultado-item\">Carregando...</div>\n",
    );
    let driver = SnapshotDriver::new(SEARCH_URL)
        .with_page(1, results_page(1, 2, &[2]))
        .with_page(2, hollow);

    let report = harvester(config, driver, dir.path())
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Aborted(AbortReason::LikelyBlocked)
    );
    assert_eq!(report.last_completed_page, 1);

    let checkpoint = file_store(dir.path()).load("RR").unwrap().unwrap();
    assert_eq!(checkpoint.page_index, 1);
    assert_eq!(checkpoint.records.len(), 2);
}

#[tokio::test]
async fn test_page_limit_keeps_checkpoint_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.harvest.max_pages = Some(2);

    let db_path = dir.path().join("checkpoints.db");
    let store = SqliteCheckpointStore::new(&db_path).unwrap();

    let report = Harvester::new(config, Box::new(three_page_driver()), Box::new(store))
        .unwrap()
        .with_jitter(Box::new(FixedJitter))
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(report.outcome, HarvestOutcome::Completed(DoneReason::PageLimit));
    assert_eq!(ids(&report.records), vec!["11-RR", "12-RR", "21-RR", "22-RR"]);

    let checkpoint = SqliteCheckpointStore::new(&db_path)
        .unwrap()
        .load("RR")
        .unwrap()
        .expect("Checkpoint missing after page limit");
    assert_eq!(checkpoint.page_index, 2);
    assert_eq!(checkpoint.records.len(), 4);
}

#[tokio::test]
async fn test_search_failure_aborts_without_output() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    // No region selector on the landing page
    let driver = SnapshotDriver::new(SEARCH_URL)
        .with_page(1, "<html><body><p>Manutenção</p></body></html>");

    let report = harvester(config, driver, dir.path())
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Aborted(AbortReason::RecoveryExhausted)
    );
    assert!(report.records.is_empty());
    assert!(report.output_path.is_none());
}

#[tokio::test]
async fn test_persistent_card_read_failure_aborts() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    // Saved pages cannot run scripts, so every card read fails
    config.site.card_script = Some("return [];".to_string());

    let driver = SnapshotDriver::new(SEARCH_URL).with_page(1, results_page(1, 2, &[]));
    let log = driver.action_log();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        harvester(config, driver, dir.path()).run(),
    )
    .await
    .expect("Harvest did not terminate")
    .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Aborted(AbortReason::RecoveryExhausted)
    );
    assert!(report.records.is_empty());

    // One recovery per failed read up to the cap, then the abort
    let reloads = log
        .lock()
        .unwrap()
        .iter()
        .filter(|action| *action == "reload")
        .count();
    assert_eq!(reloads, 2);
}

#[tokio::test]
async fn test_checkpoint_saved_every_interval() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.harvest.checkpoint_interval = 2;

    let store = JournalStore::default();
    let report = Harvester::new(config, Box::new(three_page_driver()), Box::new(store.clone()))
        .unwrap()
        .with_jitter(Box::new(FixedJitter))
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Completed(DoneReason::EndOfResults)
    );
    assert_eq!(*store.saved_pages.lock().unwrap(), vec![2]);
    assert_eq!(*store.clears.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_checkpoint_write_failures_do_not_stop_harvest() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.harvest.checkpoint_interval = 1;

    let store = JournalStore::failing();
    let report = Harvester::new(config, Box::new(three_page_driver()), Box::new(store.clone()))
        .unwrap()
        .with_jitter(Box::new(FixedJitter))
        .run()
        .await
        .expect("Harvest failed");

    assert_eq!(
        report.outcome,
        HarvestOutcome::Completed(DoneReason::EndOfResults)
    );
    assert_eq!(
        ids(&report.records),
        vec!["11-RR", "12-RR", "21-RR", "22-RR", "31-RR", "32-RR"]
    );
    assert_eq!(*store.saved_pages.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(*store.clears.lock().unwrap(), 1);
    assert!(report.output_path.is_some());
}
