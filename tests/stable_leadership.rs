mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use common::{settle, start, D};
use lease::test_utils::ScriptedClaimer;
use leadership::{Context, TrackerError};
use parking_lot::Mutex;
use tokio::time::{sleep, timeout, Instant};

/// Work that sleeps for `duration` unless its context is cancelled first.
async fn sleep_or_cancel(ctx: Context, duration: Duration) -> leadership::Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(TrackerError::Cancelled),
        () = sleep(duration) => Ok(()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_work_completes_while_leader() {
    let claimer = Arc::new(ScriptedClaimer::granting());
    let tracker = start(&claimer);

    let result = tracker
        .with_stable_leadership(&Context::new(), |_ctx| async {
            Ok::<_, TrackerError>(42)
        })
        .await;
    assert_eq!(result.unwrap(), 42);

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_leadership_loss_aborts_work() {
    let claimer = Arc::new(ScriptedClaimer::denying());
    claimer.push_response(Ok(()));
    let tracker = start(&claimer);
    assert!(tracker.claim_leader().await.wait().await);

    let seen = Arc::new(Mutex::new(None));
    let started = Instant::now();
    let result = tracker
        .with_stable_leadership(&Context::new(), {
            let seen = seen.clone();
            move |ctx| async move {
                let result = sleep_or_cancel(ctx.clone(), D * 10).await;
                *seen.lock() = ctx.cause();
                result
            }
        })
        .await;

    assert!(matches!(result, Err(TrackerError::LeadershipChanged)));
    assert!(matches!(*seen.lock(), Some(TrackerError::LeadershipChanged)));
    // Cancelled at the denied renewal, not when the work would have ended.
    assert!(started.elapsed() < D + Duration::from_secs(1));

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancel_cause_wins() {
    let claimer = Arc::new(ScriptedClaimer::granting());
    let tracker = start(&claimer);
    assert!(tracker.claim_leader().await.wait().await);

    let parent = Context::new();
    let canceller = {
        let parent = parent.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            parent.cancel_with_cause(anyhow!("operator stop").into());
        })
    };

    let seen = Arc::new(Mutex::new(None));
    let result: leadership::Result<()> = tracker
        .with_stable_leadership(&parent, {
            let seen = seen.clone();
            move |ctx| async move {
                ctx.cancelled().await;
                *seen.lock() = ctx.cause();
                Err(TrackerError::Cancelled)
            }
        })
        .await;
    canceller.await.unwrap();

    match result {
        Err(TrackerError::Failed(err)) => assert_eq!(err.to_string(), "operator stop"),
        other => panic!("expected the parent's cause, got {other:?}"),
    }
    assert!(matches!(*seen.lock(), Some(TrackerError::Failed(_))));

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_minion_work_aborted_by_promotion() {
    let claimer = Arc::new(ScriptedClaimer::granting());
    claimer.push_response(Err(lease::Error::ClaimDenied));
    let tracker = start(&claimer);
    assert!(!tracker.claim_leader().await.wait().await);

    let releaser = {
        let claimer = claimer.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            claimer.release();
        })
    };

    let result = tracker
        .with_stable_leadership(&Context::new(), |ctx| sleep_or_cancel(ctx, D * 10))
        .await;
    releaser.await.unwrap();

    assert!(matches!(result, Err(TrackerError::LeadershipChanged)));
    assert!(tracker.claim_leader().await.wait().await);

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_work() {
    let claimer = Arc::new(ScriptedClaimer::granting());
    let tracker = start(&claimer);

    let killer = {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            tracker.kill();
        })
    };

    let result = tracker
        .with_stable_leadership(&Context::new(), |ctx| sleep_or_cancel(ctx, D * 10))
        .await;
    killer.await.unwrap();

    assert!(matches!(result, Err(TrackerError::ShuttingDown)));
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_work_errors_pass_through() {
    let claimer = Arc::new(ScriptedClaimer::granting());
    let tracker = start(&claimer);

    let result: leadership::Result<()> = tracker
        .with_stable_leadership(&Context::new(), |_ctx| async {
            Err(TrackerError::from(anyhow!("migration failed")))
        })
        .await;

    match result {
        Err(TrackerError::Failed(err)) => assert_eq!(err.to_string(), "migration failed"),
        other => panic!("expected the work's own error, got {other:?}"),
    }

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stops_with_work() {
    let claimer = Arc::new(ScriptedClaimer::denying());
    claimer.push_response(Ok(()));
    let tracker = start(&claimer);

    let kept = Arc::new(Mutex::new(None));
    tracker
        .with_stable_leadership(&Context::new(), {
            let kept = kept.clone();
            move |ctx| async move {
                *kept.lock() = Some(ctx);
                Ok::<_, TrackerError>(())
            }
        })
        .await
        .unwrap();

    // Lose leadership after the work is done: nothing may cancel its context.
    sleep(D + Duration::from_secs(1)).await;
    assert!(tracker.wait_minion().await.wait().await);
    settle().await;

    let ctx = kept.lock().take().unwrap();
    assert!(!ctx.is_cancelled());

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_call_stops_supervisor() {
    let claimer = Arc::new(ScriptedClaimer::denying());
    claimer.push_response(Ok(()));
    let tracker = start(&claimer);
    assert!(tracker.claim_leader().await.wait().await);

    let kept = Arc::new(Mutex::new(None));
    let parent = Context::new();
    let call = tracker.with_stable_leadership(&parent, {
        let kept = kept.clone();
        move |ctx| async move {
            *kept.lock() = Some(ctx);
            std::future::pending::<leadership::Result<()>>().await
        }
    });
    assert!(timeout(Duration::from_secs(1), call).await.is_err());
    settle().await;

    // Lose leadership once the call is gone.
    sleep(D).await;
    assert!(tracker.wait_minion().await.wait().await);
    settle().await;

    let ctx = kept.lock().take().unwrap();
    assert!(!ctx.is_cancelled());
    assert!(ctx.cause().is_none());

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stopped_tracker_aborts_work_at_once() {
    let claimer = Arc::new(ScriptedClaimer::granting());
    let tracker = start(&claimer);
    tracker.kill();
    tracker.wait().await.unwrap();

    let result = tracker
        .with_stable_leadership(&Context::new(), |ctx| sleep_or_cancel(ctx, D))
        .await;
    assert!(matches!(result, Err(TrackerError::ShuttingDown)));
}
