//! Namespace archival
//!
//! Archiving a namespace exports its resources, asks Ark to back the namespace up, and, once Ark
//! reports the backup as completed, deletes the namespace. Each namespace moves through the
//! following states:
//!
//! ```text
//! Planned -> DryRunSkipped
//!         -> BackupRequested -> BackupCompleted -> Deleted
//!                                               -> DeletionSkipped
//!         -> Failed
//! ```
//!
//! Backup completion is observed by the [`Completions`] controller, which watches backup records
//! labeled with the name of the namespace they archive.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod completion;
mod executor;
pub mod metrics;
mod service;

#[cfg(test)]
mod tests;

pub use self::{
    completion::Completions,
    executor::{backup_record, ArchiveExecutor, ArchiveState},
    metrics::ArchiveMetrics,
    service::{BackupService, KubeBackups, KubeNamespaces, NamespaceService},
};

/// The namespace Ark reads backup requests from.
pub const DEFAULT_BACKUP_NAMESPACE: &str = "heptio-ark";

/// Resources that Ark cannot back up.
pub const EXCLUDED_RESOURCES: [&str; 1] = ["projectrequests.project.openshift.io"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("namespace {0} has no requester annotation")]
    MissingAttribution(String),

    #[error("failed to export namespace {namespace}: {source}")]
    Export {
        namespace: String,
        #[source]
        source: namespace_archivist_k8s_transfer::Error,
    },

    #[error("failed to request backup {backup}: {source}")]
    Backup {
        backup: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to delete namespace {namespace}: {source}")]
    Delete {
        namespace: String,
        #[source]
        source: kube::Error,
    },
}

// === impl Error ===

impl Error {
    /// A short label describing the failure, used in metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingAttribution(_) => "missing_attribution",
            Self::Export { .. } => "export",
            Self::Backup { .. } => "backup",
            Self::Delete { .. } => "delete",
        }
    }
}
