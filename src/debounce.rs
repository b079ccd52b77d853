use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Last-call-wins scheduling.
///
/// Every call bumps a generation counter and schedules its action after
/// `delay`. When the timer fires the action only runs if no newer call has
/// arrived in the meantime, so a burst collapses into the final call.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn call<F, Fut>(&self, action: F) -> JoinHandle<bool>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.generation);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !is_latest(latest.load(Ordering::SeqCst), ticket) {
                return false;
            }
            action().await;
            true
        })
    }
}

fn is_latest(current: u64, ticket: u64) -> bool {
    current == ticket
}
