use futures::prelude::*;
use namespace_archivist_k8s_api::watcher;
use std::time::Duration;
use tokio::{sync::watch, time};

/// Reports whether a watch has completed its initial list.
#[derive(Clone, Debug)]
pub struct Synced {
    name: &'static str,
    rx: watch::Receiver<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("timed out after {timeout:?} waiting for caches to sync: {pending:?}")]
    Timeout {
        timeout: Duration,
        pending: Vec<&'static str>,
    },

    #[error("{0} watch ended before its cache synced")]
    Closed(&'static str),
}

/// Wraps a watch stream so that the returned [`Synced`] flips once the initial list has been
/// delivered.
pub fn track<T, S>(name: &'static str, events: S) -> (impl Stream<Item = watcher::Event<T>>, Synced)
where
    S: Stream<Item = watcher::Event<T>>,
{
    let (tx, rx) = watch::channel(false);
    let events = events.inspect(move |event| {
        if let watcher::Event::Restarted(_) = event {
            let _ = tx.send_if_modified(|synced| !std::mem::replace(synced, true));
        }
    });
    (events, Synced { name, rx })
}

/// Waits until every watch has synced, failing if `timeout` elapses first.
pub async fn wait_all(synced: Vec<Synced>, timeout: Duration) -> Result<(), SyncError> {
    let pending = synced.clone();
    let all = future::try_join_all(synced.into_iter().map(Synced::wait));
    match time::timeout(timeout, all).await {
        Ok(res) => res.map(|_| ()),
        Err(_) => Err(SyncError::Timeout {
            timeout,
            pending: pending
                .iter()
                .filter(|s| !s.is_synced())
                .map(|s| s.name)
                .collect(),
        }),
    }
}

// === impl Synced ===

impl Synced {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_synced(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(mut self) -> Result<(), SyncError> {
        let name = self.name;
        self.rx
            .wait_for(|synced| *synced)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::Closed(name))
    }
}
