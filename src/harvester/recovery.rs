//! Recovery from blocks, redirects and stalled pages

use crate::browser::PageDriver;
use crate::config::{PacingConfig, RecoveryConfig};
use crate::harvester::classifier::PageClassifier;
use crate::harvester::jitter::Jitter;
use crate::harvester::pacing;
use std::time::Duration;
use tracing::{info, warn};

/// Waits out a block and reloads the page
#[derive(Debug, Clone)]
pub struct RecoveryStrategy {
    wait: (Duration, Duration),
    settle_ms: (u64, u64),
    think_ms: (u64, u64),
    mouse_moves: bool,
    reload_timeout: Duration,
}

impl RecoveryStrategy {
    pub fn new(recovery: &RecoveryConfig, pacing: &PacingConfig, reload_ms: u64) -> Self {
        Self {
            wait: (
                Duration::from_millis(recovery.min_wait_ms),
                Duration::from_millis(recovery.max_wait_ms),
            ),
            settle_ms: (recovery.settle_min_ms, recovery.settle_max_ms),
            think_ms: (pacing.think_min_ms, pacing.think_max_ms),
            mouse_moves: pacing.mouse_moves,
            reload_timeout: Duration::from_millis(reload_ms),
        }
    }

    /// Runs one recovery attempt
    ///
    /// Returns true when the reloaded page is no longer blocked or redirected.
    /// A failed reload is not fatal; the classification decides.
    pub async fn attempt(
        &self,
        driver: &mut dyn PageDriver,
        jitter: &mut dyn Jitter,
        classifier: &PageClassifier,
        attempt: u32,
    ) -> bool {
        let wait = jitter.between(self.wait.0, self.wait.1);
        warn!("Recovery attempt {}: waiting {:?} before reloading", attempt, wait);
        tokio::time::sleep(wait).await;

        if self.mouse_moves {
            pacing::wiggle(driver, jitter).await;
        }
        pacing::pause(jitter, self.think_ms.0, self.think_ms.1).await;

        if let Err(e) = driver.reload(self.reload_timeout).await {
            warn!("Reload failed during recovery: {}", e);
        }
        pacing::pause(jitter, self.settle_ms.0, self.settle_ms.1).await;

        let state = classifier.classify(driver).await;
        if state.is_blocking() {
            warn!("Recovery attempt {} failed: page is {}", attempt, state);
            false
        } else {
            info!("Recovered on attempt {} (page is {})", attempt, state);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{SnapshotDriver, SnapshotView};
    use crate::config::SiteConfig;
    use crate::harvester::jitter::FixedJitter;

    const BASE: &str = "https://portal.example.org/busca-medicos";

    fn strategy() -> RecoveryStrategy {
        let recovery = RecoveryConfig {
            min_wait_ms: 1,
            max_wait_ms: 2,
            settle_min_ms: 0,
            settle_max_ms: 0,
        };
        let pacing = PacingConfig {
            hover_min_ms: 0,
            hover_max_ms: 0,
            think_min_ms: 0,
            think_max_ms: 0,
            mouse_moves: true,
        };
        RecoveryStrategy::new(&recovery, &pacing, 100)
    }

    #[tokio::test]
    async fn test_recovers_when_reload_clears_block() {
        let mut driver = SnapshotDriver::new(BASE).with_versions(
            1,
            vec![
                SnapshotView::html("<p>Erro 429</p>"),
                SnapshotView::html(r#"<div class="busca-resultado">ANA CRM: 1</div>"#),
            ],
        );
        driver.navigate(BASE, Duration::from_millis(10)).await.unwrap();
        let log = driver.action_log();

        let classifier = PageClassifier::new(&SiteConfig::with_search_url(BASE));
        assert!(
            strategy()
                .attempt(&mut driver, &mut FixedJitter, &classifier, 1)
                .await
        );

        let log = log.lock().unwrap();
        assert!(log.iter().any(|a| a == "reload"));
        assert!(log.iter().any(|a| a.starts_with("mouse:")));
    }

    #[tokio::test]
    async fn test_persistent_block_fails() {
        let mut driver = SnapshotDriver::new(BASE).with_page(1, "<p>CAPTCHA</p>");
        driver.navigate(BASE, Duration::from_millis(10)).await.unwrap();

        let classifier = PageClassifier::new(&SiteConfig::with_search_url(BASE));
        assert!(
            !strategy()
                .attempt(&mut driver, &mut FixedJitter, &classifier, 1)
                .await
        );
    }

    #[tokio::test]
    async fn test_end_of_results_counts_as_recovered() {
        let mut driver = SnapshotDriver::new(BASE).with_page(
            1,
            r#"<div class="busca-resultado">Nenhum resultado a mostrar</div>"#,
        );
        driver.navigate(BASE, Duration::from_millis(10)).await.unwrap();

        let classifier = PageClassifier::new(&SiteConfig::with_search_url(BASE));
        assert!(
            strategy()
                .attempt(&mut driver, &mut FixedJitter, &classifier, 1)
                .await
        );
    }
}
