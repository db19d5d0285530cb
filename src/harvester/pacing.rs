//! Humanlike pauses and pointer movement

use crate::browser::PageDriver;
use crate::harvester::jitter::Jitter;
use std::time::Duration;
use tracing::debug;

/// Pause between individual pointer moves
const MOVE_PAUSE: (Duration, Duration) = (Duration::from_millis(100), Duration::from_millis(300));

/// Sleeps for a jittered duration in `[lo_ms, hi_ms]`
pub async fn pause(jitter: &mut dyn Jitter, lo_ms: u64, hi_ms: u64) {
    let duration = jitter.between(Duration::from_millis(lo_ms), Duration::from_millis(hi_ms));
    debug!("Pausing {:?}", duration);
    tokio::time::sleep(duration).await;
}

/// Moves the pointer to a few random positions
///
/// Movement failures are logged and ignored; they never affect the harvest.
pub async fn wiggle(driver: &mut dyn PageDriver, jitter: &mut dyn Jitter) {
    let moves = jitter.count(2, 5);
    for _ in 0..moves {
        let (x, y) = jitter.point();
        if let Err(e) = driver.move_mouse(x, y).await {
            debug!("Pointer move failed: {}", e);
            return;
        }
        tokio::time::sleep(jitter.between(MOVE_PAUSE.0, MOVE_PAUSE.1)).await;
    }
}
