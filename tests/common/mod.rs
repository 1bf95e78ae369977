#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use lease::test_utils::ScriptedClaimer;
use lease::{Claimer, Clock, SystemClock};
use leadership::{Tracker, TrackerConfig};
use tracing_subscriber::EnvFilter;

/// Claim duration used throughout the tests.
pub const D: Duration = Duration::from_secs(30);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(unit: &str) -> TrackerConfig {
    TrackerConfig::new(unit.parse().unwrap()).with_claim_duration(D)
}

pub fn start_with(unit: &str, claimer: Arc<dyn Claimer>, clock: Arc<dyn Clock>) -> Tracker {
    init_tracing();
    Tracker::new(config(unit), claimer, clock).unwrap()
}

/// `mysql/0` tracker on the tokio clock.
pub fn start(claimer: &Arc<ScriptedClaimer>) -> Tracker {
    start_with("mysql/0", claimer.clone(), Arc::new(SystemClock))
}

/// Let the tracker loop catch up with everything already sent to it.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
