use crate::{ArchiveExecutor, BackupService, NamespaceService};
use ahash::AHashSet as HashSet;
use futures::prelude::*;
use namespace_archivist_k8s_api::{watcher, Backup, ResourceExt, ARCHIVED_NAMESPACE_LABEL};
use namespace_archivist_k8s_transfer::ResourceCatalog;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives the executor from backup record updates.
///
/// Each completed backup is handled once. Backups that had already completed when the watch
/// started are history and are ignored, so a restart never deletes namespaces a second time.
pub struct Completions<C, B, N> {
    executor: Arc<ArchiveExecutor<C, B, N>>,
    handled: HashSet<String>,
    initialized: bool,
}

// === impl Completions ===

impl<C, B, N> Completions<C, B, N>
where
    C: ResourceCatalog,
    B: BackupService,
    N: NamespaceService,
{
    pub fn new(executor: Arc<ArchiveExecutor<C, B, N>>) -> Self {
        Self {
            executor,
            handled: HashSet::new(),
            initialized: false,
        }
    }

    /// Processes backup events until the stream ends.
    pub async fn run(mut self, events: impl Stream<Item = watcher::Event<Backup>>) {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                watcher::Event::Restarted(backups) if !self.initialized => {
                    self.initialized = true;
                    let completed = backups
                        .iter()
                        .filter(|b| b.is_completed())
                        .map(|b| b.name_any());
                    self.handled.extend(completed);
                    info!(backups = backups.len(), "Backup history loaded");
                }
                watcher::Event::Restarted(backups) => {
                    for backup in backups {
                        self.apply(backup).await;
                    }
                }
                watcher::Event::Applied(backup) => self.apply(backup).await,
                watcher::Event::Deleted(backup) => {
                    self.handled.remove(&backup.name_any());
                }
            }
        }
        debug!("Backup watch ended");
    }

    async fn apply(&mut self, backup: Backup) {
        if !backup.is_completed() {
            debug!(backup = %backup.name_any(), phase = ?backup.phase(), "Backup not completed");
            return;
        }
        let Some(namespace) = backup.labels().get(ARCHIVED_NAMESPACE_LABEL).cloned() else {
            return;
        };
        let name = backup.name_any();
        if !self.handled.insert(name.clone()) {
            return;
        }

        if let Err(error) = self.executor.completed(&namespace, &name).await {
            warn!(%namespace, backup = %name, %error, "Failed to finish archiving namespace");
        }
    }
}
