use crate::{ArchiveMetrics, BackupService, Error, NamespaceService, EXCLUDED_RESOURCES};
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use namespace_archivist_core::{CapacityPolicy, Namespace};
use namespace_archivist_k8s_api::{
    Backup, BackupSpec, K8sDuration, ARCHIVED_NAMESPACE_LABEL, REQUESTER_ANNOTATION,
};
use namespace_archivist_k8s_transfer::{ExportDocument, Exporter, ResourceCatalog};
use parking_lot::Mutex;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Archives namespaces and deletes them once their backups complete.
pub struct ArchiveExecutor<C, B, N> {
    policy: Arc<CapacityPolicy>,
    exporter: Exporter<C>,
    backups: B,
    namespaces: N,
    export_directory: Option<PathBuf>,
    states: Mutex<HashMap<String, ArchiveState>>,
    metrics: ArchiveMetrics,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArchiveState {
    /// Archival has started.
    Planned,

    /// Dry-run mode is enabled; nothing was changed.
    DryRunSkipped,

    /// A backup has been requested and has not completed yet.
    BackupRequested,

    BackupCompleted,

    Deleted,

    /// The backup completed, but namespace deletion is disabled.
    DeletionSkipped,

    Failed,
}

// === impl ArchiveExecutor ===

impl<C, B, N> ArchiveExecutor<C, B, N>
where
    C: ResourceCatalog,
    B: BackupService,
    N: NamespaceService,
{
    pub fn new(
        policy: Arc<CapacityPolicy>,
        exporter: Exporter<C>,
        backups: B,
        namespaces: N,
        metrics: ArchiveMetrics,
    ) -> Self {
        Self {
            policy,
            exporter,
            backups,
            namespaces,
            export_directory: None,
            states: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Writes each export document to `<backup name>.yaml` in `dir`.
    pub fn with_export_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_directory = Some(dir.into());
        self
    }

    /// Returns the archive state of a namespace. Deleted namespaces are no longer tracked.
    pub fn state(&self, namespace: &str) -> Option<ArchiveState> {
        self.states.lock().get(namespace).copied()
    }

    /// Begins archiving a namespace.
    ///
    /// Returns once the backup has been requested; deletion happens when the backup completes. A
    /// namespace that is already being archived is not archived again until its backup completes.
    pub async fn archive(
        &self,
        namespace: &Namespace,
        now: DateTime<Utc>,
    ) -> Result<ArchiveState, Error> {
        let name = namespace.name.as_str();
        {
            let mut states = self.states.lock();
            let in_progress = states.get(name).copied().filter(|state| {
                matches!(state, ArchiveState::Planned | ArchiveState::BackupRequested)
            });
            if let Some(state) = in_progress {
                debug!(namespace = %name, ?state, "Archive already in progress");
                return Ok(state);
            }
            states.insert(name.to_string(), ArchiveState::Planned);
        }

        match self.request_backup(namespace, now).await {
            Ok(state) => {
                self.transition(name, state);
                Ok(state)
            }
            Err(error) => {
                self.metrics.failed(error.reason());
                self.transition(name, ArchiveState::Failed);
                Err(error)
            }
        }
    }

    async fn request_backup(
        &self,
        namespace: &Namespace,
        now: DateTime<Utc>,
    ) -> Result<ArchiveState, Error> {
        let name = namespace.name.as_str();
        if self.policy.dry_run {
            info!(namespace = %name, "Dry run enabled; not archiving namespace");
            self.metrics.dry_run();
            return Ok(ArchiveState::DryRunSkipped);
        }

        let requester = namespace
            .requester
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::MissingAttribution(name.to_string()))?;

        info!(namespace = %name, %requester, "Archiving namespace");
        let document = self
            .exporter
            .export(name)
            .await
            .map_err(|source| Error::Export {
                namespace: name.to_string(),
                source,
            })?;

        let backup = backup_record(name, requester, now, self.policy.archive_ttl);
        let backup_name = backup.metadata.name.clone().unwrap_or_default();
        self.write_export(&backup_name, &document).await;

        self.backups
            .create(&backup)
            .await
            .map_err(|source| Error::Backup {
                backup: backup_name.clone(),
                source,
            })?;
        info!(namespace = %name, backup = %backup_name, "Backup requested");
        self.metrics.backup_requested();
        Ok(ArchiveState::BackupRequested)
    }

    /// Handles the completion of a namespace's backup, deleting the namespace if enabled.
    pub async fn completed(&self, namespace: &str, backup: &str) -> Result<ArchiveState, Error> {
        info!(%namespace, %backup, "Backup completed");
        self.metrics.backup_completed();
        self.transition(namespace, ArchiveState::BackupCompleted);

        if self.policy.dry_run {
            info!(%namespace, "Dry run enabled; not deleting archived namespace");
            self.transition(namespace, ArchiveState::DeletionSkipped);
            return Ok(ArchiveState::DeletionSkipped);
        }
        if !self.policy.delete_archived_namespaces {
            info!(%namespace, "Namespace deletion disabled; keeping archived namespace");
            self.transition(namespace, ArchiveState::DeletionSkipped);
            return Ok(ArchiveState::DeletionSkipped);
        }

        if let Err(source) = self.namespaces.delete(namespace).await {
            let error = Error::Delete {
                namespace: namespace.to_string(),
                source,
            };
            self.metrics.failed(error.reason());
            self.transition(namespace, ArchiveState::Failed);
            return Err(error);
        }
        info!(%namespace, "Deleted archived namespace");
        self.metrics.namespace_deleted();
        debug!(%namespace, state = ?ArchiveState::Deleted, "Archive state changed");
        // The namespace is gone, so there is nothing left to track.
        self.states.lock().remove(namespace);
        Ok(ArchiveState::Deleted)
    }

    fn transition(&self, namespace: &str, state: ArchiveState) {
        debug!(%namespace, ?state, "Archive state changed");
        self.states.lock().insert(namespace.to_string(), state);
    }

    /// Export documents are only kept for inspection, so failing to write one does not fail the
    /// archive.
    async fn write_export(&self, backup: &str, document: &ExportDocument) {
        let Some(dir) = self.export_directory.as_ref() else {
            return;
        };
        let path = dir.join(format!("{backup}.yaml"));
        let yaml = match document.to_yaml() {
            Ok(yaml) => yaml,
            Err(error) => {
                warn!(%backup, %error, "Failed to serialize export");
                return;
            }
        };
        match tokio::fs::write(&path, yaml).await {
            Ok(()) => debug!(path = %path.display(), "Wrote export"),
            Err(error) => warn!(path = %path.display(), %error, "Failed to write export"),
        }
    }
}

/// Builds the backup request for a namespace.
///
/// The backup is named after the namespace and the request time, labeled with the namespace name
/// so that its completion can be correlated, and annotated with the namespace's requester.
pub fn backup_record(
    namespace: &str,
    requester: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Backup {
    let name = format!("{namespace}-{}", now.format("%Y%m%d%H%M%S"));
    let mut backup = Backup::new(
        &name,
        BackupSpec {
            included_namespaces: vec![namespace.to_string()],
            excluded_resources: EXCLUDED_RESOURCES.iter().map(|r| r.to_string()).collect(),
            snapshot_volumes: Some(true),
            ttl: Some(K8sDuration::from(ttl)),
        },
    );
    backup.metadata.labels = Some(
        [(ARCHIVED_NAMESPACE_LABEL.to_string(), namespace.to_string())]
            .into_iter()
            .collect(),
    );
    backup.metadata.annotations = Some(
        [(REQUESTER_ANNOTATION.to_string(), requester.to_string())]
            .into_iter()
            .collect(),
    );
    backup
}
