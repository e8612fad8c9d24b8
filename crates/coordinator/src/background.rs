//! Cooperative background loops

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Run `tick` every `period` until `shutdown` is set
///
/// The flag is checked once per tick. Each tick runs on its own task, so a
/// panic in one pass is logged and the loop carries on.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: Arc<AtomicBool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(task = name, period_ms = period.as_millis() as u64, "Background loop started");

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            if let Err(e) = tokio::spawn(tick()).await {
                error!(task = name, error = ?e, "Background tick panicked");
            }
        }

        info!(task = name, "Background loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_stops_on_flag_and_survives_panics() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ticks);
        let handle = spawn_periodic(
            "test",
            Duration::from_millis(5),
            Arc::clone(&shutdown),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                        panic!("second tick fails");
                    }
                }
            },
        );

        // a panicking tick can take a while to unwind
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 {
            assert!(tokio::time::Instant::now() < deadline, "loop stalled after a panic");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.store(true, Ordering::Release);
        handle.await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }
}
