use std::time::Duration;
use tokio::sync::watch;

/// Timer used by the recurring tasks. Injected so tests can observe the
/// requested delays without waiting for them.
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Real timer backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait::async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Sleep for `delay` unless shutdown is signalled first.
/// Returns false when the caller should stop.
pub async fn wait_or_shutdown(
    scheduler: &dyn Scheduler,
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = scheduler.sleep(delay) => !*shutdown.borrow(),
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow(),
            // Sender dropped: nobody can ask us to stop any more, keep running.
            Err(_) => {
                scheduler.sleep(delay).await;
                true
            }
        },
    }
}
