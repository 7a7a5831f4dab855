use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Identifies one scheduled job; stops being current once newer input
/// arrives or the debouncer is cancelled.
#[derive(Debug, Clone)]
pub struct Ticket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl Ticket {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Runs only the most recent job, after a quiet period.
///
/// Scheduling a job aborts the previous one, whether it is still waiting out
/// the delay or already awaiting its request. Jobs also receive a [`Ticket`]
/// to check before applying a result, which covers the window where a job
/// has finished its last await but not yet published.
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule<F, Fut>(&self, job: F) -> Ticket
    where
        F: FnOnce(Ticket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.advance();
        let delay = self.delay;
        let task_ticket = ticket.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if task_ticket.is_current() {
                job(task_ticket).await;
            }
        });
        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
        ticket
    }

    pub fn cancel(&self) {
        self.advance();
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }

    fn advance(&self) -> Ticket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            generation,
            current: self.generation.clone(),
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn only_last_input_runs() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));

        for value in 1..=3 {
            let runs = runs.clone();
            let last = last.clone();
            debouncer.schedule(move |_| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                *last.lock() = Some(value);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(*last.lock(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_invalidates_outstanding_ticket() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let ticket = debouncer.schedule(|_| async {});
        assert!(ticket.is_current());
        debouncer.cancel();
        assert!(!ticket.is_current());
    }
}
