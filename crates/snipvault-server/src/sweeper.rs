//! Background expiration sweep.
//!
//! Expired snippets are also rejected (and deleted) at read time, so a
//! skipped or failed sweep only delays reclaiming space.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::store::Store;

/// Default period between sweeps: 5 minutes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Run one sweep on a blocking thread. Returns the number of snippets
/// removed, or `None` if the sweep failed (the failure is logged).
pub async fn sweep_once(store: &Store, now: i64) -> Option<usize> {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.delete_expired(now)).await {
        Ok(Ok(count)) => {
            if count > 0 {
                info!(count, "sweep removed expired snippets");
            } else {
                debug!("sweep found no expired snippets");
            }
            Some(count)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "sweep failed; retrying next cycle");
            None
        }
        Err(e) => {
            error!(error = %e, "sweep task join error");
            None
        }
    }
}

/// Owns the running sweep task. Dropping the handle also stops the task,
/// but [`SweeperHandle::shutdown`] waits for an in-flight sweep to finish.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "sweeper task ended abnormally");
        }
    }
}

/// Spawn a Tokio task that deletes expired snippets every `interval`.
/// The first sweep runs one full interval after startup.
pub fn spawn_sweeper(store: Store, clock: Arc<dyn Clock>, interval: Duration) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // skip first immediate tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }
            sweep_once(&store, clock.now()).await;
        }
        debug!("sweeper stopped");
    });

    info!(interval_secs = interval.as_secs(), "started expiration sweeper");
    SweeperHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SnippetRecord;
    use tempfile::tempdir;

    fn record(expires_at: i64) -> SnippetRecord {
        SnippetRecord {
            ciphertext: vec![1, 2, 3],
            created_at: 0,
            expires_at,
        }
    }

    async fn wait_until_len(store: &Store, len: u64) -> bool {
        for _ in 0..100 {
            if store.len().unwrap() == len {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn sweep_once_reports_count_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        store.insert("a", &record(10)).unwrap();
        store.insert("b", &record(10)).unwrap();
        store.insert("c", &record(1_000)).unwrap();

        assert_eq!(sweep_once(&store, 10).await, Some(2));
        assert_eq!(sweep_once(&store, 10).await, Some(0));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_once_clears_undecodable_rows_without_counting_them() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        store.put_raw("bad", &[0x7f, 0x01]).unwrap();
        store.insert("a", &record(10)).unwrap();

        assert_eq!(sweep_once(&store, 10).await, Some(1));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_sweeper_removes_expired_until_shut_down() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        let clock = Arc::new(ManualClock::new(100));
        store.insert("expired", &record(50)).unwrap();
        store.insert("live", &record(500)).unwrap();

        let handle = spawn_sweeper(store.clone(), clock.clone(), Duration::from_millis(20));
        assert!(wait_until_len(&store, 1).await);
        assert!(store.lookup("live").unwrap().is_some());

        handle.shutdown().await;

        // Nothing sweeps once the handle has been shut down.
        clock.set(1_000);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len().unwrap(), 1);
    }
}
