// Latest-request-wins coordination for dashboard views
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// A newer request for the same view arrived while this one was waiting or fetching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request for view '{view}' was superseded by a newer one")]
pub struct Superseded {
    pub view: String,
}

/// Hands out monotonically increasing request identities per view. Only the
/// holder of the newest identity may run its computation; anything older is
/// discarded after its debounce or its fetch.
pub struct RequestTracker {
    debounce: Duration,
    next_generation: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

impl RequestTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            next_generation: AtomicU64::new(1),
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `fetch` then `compute` unless superseded.
    ///
    /// Without a view the request runs immediately. With a view it first waits
    /// out the debounce delay, and the generation is checked again once the
    /// fetch resolves, so a stale fetch never reaches `compute`.
    pub async fn run_latest<D, T, F, C>(&self, view: Option<&str>, fetch: F, compute: C) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<D>>,
        C: FnOnce(D) -> anyhow::Result<T>,
    {
        let Some(view) = view else {
            return compute(fetch.await?);
        };

        let ticket = self.begin(view);
        tokio::time::sleep(self.debounce).await;
        self.ensure_current(view, ticket.generation)?;

        let fetched = fetch.await;
        self.ensure_current(view, ticket.generation)?;
        drop(ticket);

        compute(fetched?)
    }

    fn begin<'a>(&'a self, view: &'a str) -> Ticket<'a> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(view.to_string(), generation);
        Ticket {
            tracker: self,
            view,
            generation,
        }
    }

    fn ensure_current(&self, view: &str, generation: u64) -> Result<(), Superseded> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if latest.get(view) == Some(&generation) {
            Ok(())
        } else {
            tracing::debug!("Discarding superseded request {} for view {}", generation, view);
            Err(Superseded {
                view: view.to_string(),
            })
        }
    }

    fn finish(&self, view: &str, generation: u64) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if latest.get(view) == Some(&generation) {
            latest.remove(view);
        }
    }

    #[cfg(test)]
    fn tracked_views(&self) -> usize {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Releases the view entry when a request ends, including when its future is
/// dropped mid-debounce or mid-fetch.
struct Ticket<'a> {
    tracker: &'a RequestTracker,
    view: &'a str,
    generation: u64,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.tracker.finish(self.view, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_superseded<T: std::fmt::Debug>(result: &anyhow::Result<T>) -> bool {
        matches!(result, Err(e) if e.downcast_ref::<Superseded>().is_some())
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_older_during_debounce() {
        let tracker = RequestTracker::new(Duration::from_millis(20));

        let (first, second) = tokio::join!(
            tracker.run_latest(Some("chart"), async { Ok(1) }, |v| Ok(v * 10)),
            tracker.run_latest(Some("chart"), async { Ok(2) }, |v| Ok(v * 10)),
        );

        assert!(is_superseded(&first));
        assert_eq!(second.unwrap(), 20);
        assert_eq!(tracker.tracked_views(), 0);
    }

    #[tokio::test]
    async fn test_stale_fetch_never_reaches_compute() {
        let tracker = RequestTracker::new(Duration::from_millis(10));
        let computed = std::sync::atomic::AtomicUsize::new(0);

        let slow = tracker.run_latest(
            Some("chart"),
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(1)
            },
            |v| {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(v)
            },
        );
        let fast = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tracker.run_latest(Some("chart"), async { Ok(2) }, |v| Ok(v)).await
        };

        let (slow, fast) = tokio::join!(slow, fast);
        assert!(is_superseded(&slow));
        assert_eq!(fast.unwrap(), 2);
        assert_eq!(computed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_views_are_independent() {
        let tracker = RequestTracker::new(Duration::from_millis(10));

        let (a, b, untracked) = tokio::join!(
            tracker.run_latest(Some("main"), async { Ok("a") }, Ok),
            tracker.run_latest(Some("compare"), async { Ok("b") }, Ok),
            tracker.run_latest(None, async { Ok("c") }, Ok),
        );

        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
        assert_eq!(untracked.unwrap(), "c");
    }

    #[tokio::test]
    async fn test_abandoned_request_releases_its_view() {
        let tracker = RequestTracker::new(Duration::from_millis(10));

        let during_debounce = tokio::time::timeout(
            Duration::from_millis(1),
            tracker.run_latest(Some("gone-early"), async { Ok(1) }, |v: i32| Ok(v)),
        )
        .await;
        assert!(during_debounce.is_err());
        assert_eq!(tracker.tracked_views(), 0);

        let during_fetch = tokio::time::timeout(
            Duration::from_millis(50),
            tracker.run_latest(Some("gone-late"), std::future::pending::<anyhow::Result<i32>>(), |v| Ok(v)),
        )
        .await;
        assert!(during_fetch.is_err());
        assert_eq!(tracker.tracked_views(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_is_propagated_for_current_request() {
        let tracker = RequestTracker::new(Duration::from_millis(10));
        let result: anyhow::Result<i32> = tracker
            .run_latest(Some("chart"), async { Err(anyhow::anyhow!("backend down")) }, |v: i32| Ok(v))
            .await;

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<Superseded>().is_none());
        assert_eq!(tracker.tracked_views(), 0);
    }
}
