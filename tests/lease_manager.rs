mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{start_with, D};
use lease::{Clock, LeaseManager, SystemClock};
use tokio::time::{sleep, timeout, Instant};

fn manager() -> Arc<LeaseManager> {
    Arc::new(LeaseManager::new(Arc::new(SystemClock)))
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[tokio::test(start_paused = true)]
async fn test_one_leader_per_application() {
    let manager = manager();
    let first = start_with("mysql/0", manager.clone(), clock());
    assert!(first.claim_leader().await.wait().await);

    let second = start_with("mysql/1", manager.clone(), clock());
    assert!(!second.claim_leader().await.wait().await);
    assert_eq!(manager.holder("mysql").as_deref(), Some("mysql/0"));

    // Renewals keep the lease with the first unit.
    sleep(D * 4).await;
    assert!(first.claim_leader().await.wait().await);
    assert!(!second.claim_leader().await.wait().await);

    first.kill();
    second.kill();
    first.wait().await.unwrap();
    second.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failover_after_leader_stops() {
    let manager = manager();
    let first = start_with("mysql/0", manager.clone(), clock());
    assert!(first.claim_leader().await.wait().await);

    let second = start_with("mysql/1", manager.clone(), clock());
    let promoted = second.wait_leader().await;
    assert!(!promoted.is_ready());

    let started = Instant::now();
    sleep(Duration::from_secs(40)).await;
    first.kill();
    first.wait().await.unwrap();

    // The last renewal at 30s holds the lease until 90s.
    assert!(timeout(D * 4, promoted.wait()).await.unwrap());
    let elapsed = started.elapsed();
    assert!(elapsed >= D * 3 - Duration::from_secs(1), "{elapsed:?}");
    assert_eq!(manager.holder("mysql").as_deref(), Some("mysql/1"));

    second.kill();
    second.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_applications_do_not_interfere() {
    let manager = manager();
    let mysql = start_with("mysql/0", manager.clone(), clock());
    let wordpress = start_with("wordpress/2", manager.clone(), clock());

    assert!(mysql.claim_leader().await.wait().await);
    assert!(wordpress.claim_leader().await.wait().await);
    assert_eq!(manager.holder("wordpress").as_deref(), Some("wordpress/2"));

    mysql.kill();
    wordpress.kill();
    mysql.wait().await.unwrap();
    wordpress.wait().await.unwrap();
}
