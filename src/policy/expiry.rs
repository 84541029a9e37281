use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::GateError;
use crate::target::Target;

struct PendingExpiry {
    generation: u64,
    task: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<Target, PendingExpiry>>>;

/// Cancellable delayed tasks, at most one per target
///
/// Scheduling for a target that already has a pending task aborts the old one.
/// A generation counter guards the window where an aborted task has already
/// woken up, so a replaced expiry can never fire.
pub struct ExpiryScheduler {
    handle: Handle,
    pending: PendingMap,
    next_generation: AtomicU64,
}

impl ExpiryScheduler {
    /// Bind to the tokio runtime of the caller
    pub fn from_current() -> Result<Self, GateError> {
        let handle = Handle::try_current()
            .map_err(|e| GateError::SchedulerUnavailable(e.to_string()))?;
        Ok(Self::new(handle))
    }

    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Run `commit`, then `on_expire` after `delay` unless cancelled or replaced first
    ///
    /// `commit` runs under the same lock an expiring task holds while it runs
    /// `on_expire`, so a write made by `commit` is never overwritten by an
    /// expiry that was already due. Nothing is scheduled if `commit` fails.
    pub fn schedule<T, E, C, F>(
        &self,
        target: Target,
        delay: Duration,
        commit: C,
        on_expire: F,
    ) -> Result<T, E>
    where
        C: FnOnce() -> Result<T, E>,
        F: FnOnce() + Send + 'static,
    {
        let mut map = lock(&self.pending);
        let committed = commit()?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();
        let key = target.clone();

        // Spawned under the map lock so the task cannot look itself up early
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;

            let mut map = lock(&pending);
            match map.get(&key) {
                Some(entry) if entry.generation == generation => {
                    map.remove(&key);
                    on_expire();
                }
                _ => debug!("Expiry for {} was superseded", key),
            }
        });

        if let Some(previous) = map.insert(target.clone(), PendingExpiry { generation, task }) {
            debug!("Replacing pending expiry for {}", target);
            previous.task.abort();
        }

        Ok(committed)
    }

    /// Returns true if a pending task was cancelled
    pub fn cancel(&self, target: &Target) -> bool {
        let mut map = lock(&self.pending);
        cancel_locked(&mut map, target)
    }

    /// Cancel any pending task for `target` and run `commit` before an expiry can interleave
    pub fn cancel_with<T, E>(
        &self,
        target: &Target,
        commit: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut map = lock(&self.pending);
        cancel_locked(&mut map, target);
        commit()
    }

    pub fn is_pending(&self, target: &Target) -> bool {
        lock(&self.pending).contains_key(target)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn cancel_locked(map: &mut HashMap<Target, PendingExpiry>, target: &Target) -> bool {
    match map.remove(target) {
        Some(previous) => {
            previous.task.abort();
            debug!("Cancelled pending expiry for {}", target);
            true
        }
        None => false,
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<Target, PendingExpiry>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn nothing() -> Result<(), ()> {
        Ok(())
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = count.clone();
        let make = move || {
            let c = shared.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = ExpiryScheduler::from_current().unwrap();
        let (count, make) = counter();
        let target = Target::app("com.example.social");

        scheduler.schedule(target.clone(), Duration::from_secs(10), nothing, make()).unwrap();
        assert!(scheduler.is_pending(&target));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&target));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let scheduler = ExpiryScheduler::from_current().unwrap();
        let (count, make) = counter();
        let target = Target::app("com.example.social");

        scheduler.schedule(target.clone(), Duration::from_secs(10), nothing, make()).unwrap();
        assert!(scheduler.cancel(&target));
        assert!(!scheduler.cancel(&target));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_task() {
        let scheduler = ExpiryScheduler::from_current().unwrap();
        let (count, make) = counter();
        let target = Target::domain("facebook.com");

        scheduler.schedule(target.clone(), Duration::from_secs(10), nothing, make()).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        scheduler.schedule(target.clone(), Duration::from_secs(10), nothing, make()).unwrap();
        assert_eq!(scheduler.pending_count(), 1);

        // The first deadline passes without a fire
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn targets_are_independent() {
        let scheduler = ExpiryScheduler::from_current().unwrap();
        let (count, make) = counter();

        scheduler.schedule(Target::app("a"), Duration::from_secs(5), nothing, make()).unwrap();
        scheduler.schedule(Target::app("b"), Duration::from_secs(5), nothing, make()).unwrap();
        scheduler.cancel(&Target::app("a"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_schedules_nothing() {
        let scheduler = ExpiryScheduler::from_current().unwrap();
        let (count, make) = counter();
        let target = Target::app("com.example.social");

        let result = scheduler.schedule(
            target.clone(),
            Duration::from_secs(1),
            || Err::<(), _>("disk full"),
            make(),
        );
        assert_eq!(result, Err("disk full"));
        assert!(!scheduler.is_pending(&target));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_with_commits_and_stops_pending_expiry() {
        let scheduler = ExpiryScheduler::from_current().unwrap();
        let (count, make) = counter();
        let target = Target::app("com.example.social");

        scheduler.schedule(target.clone(), Duration::from_secs(1), nothing, make()).unwrap();
        assert_eq!(scheduler.cancel_with(&target, || Ok::<_, ()>(7)), Ok(7));
        assert!(!scheduler.is_pending(&target));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn requires_a_runtime() {
        assert!(matches!(
            ExpiryScheduler::from_current(),
            Err(GateError::SchedulerUnavailable(_))
        ));
    }
}
