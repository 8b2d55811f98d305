use crate::Callback;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Restartable single-shot timer.
///
/// A firing is delivered through a callback tagged with the generation it was
/// scheduled under. The owner hands the tag back to [`Timer::acknowledge`],
/// which only accepts the most recent schedule, so a firing that was already
/// queued when the timer was cancelled or rescheduled is ignored.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl Timer {
    pub fn schedule<T, F>(&mut self, delay: Duration, callback: &Callback<T>, make: F) -> u64
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let callback = callback.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(make(generation));
        }));
        generation
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Scheduled and not yet acknowledged.
    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    pub fn acknowledge(&mut self, generation: u64) -> bool {
        if self.handle.is_none() || generation != self.generation {
            return false;
        }
        self.handle = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn channel() -> (Callback<u64>, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: Callback<u64> = Arc::new(move |generation| {
            let _ = tx.send(generation);
        });
        (callback, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_invalidates_queued_firings() {
        let (callback, mut rx) = channel();
        let mut timer = Timer::default();

        timer.schedule(Duration::from_millis(100), &callback, |g| g);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let stale = rx.try_recv().unwrap();

        // The firing is queued but the owner reschedules before reading it.
        let fresh = timer.schedule(Duration::from_millis(100), &callback, |g| g);
        assert!(!timer.acknowledge(stale));
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rx.try_recv().unwrap(), fresh);
        assert!(timer.acknowledge(fresh));
        assert!(!timer.is_pending());
        assert!(!timer.acknowledge(fresh), "a firing is accepted once");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_sleep() {
        let (callback, mut rx) = channel();
        let mut timer = Timer::default();

        timer.schedule(Duration::from_millis(100), &callback, |g| g);
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(rx.try_recv().is_err());
        assert!(!timer.is_pending());
    }
}
