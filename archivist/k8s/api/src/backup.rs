use crate::{K8sDuration, Time};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// An Ark backup request.
///
/// Ark performs the backup against live cluster state and reports progress through the status
/// phase.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "ark.heptio.com",
    version = "v1",
    kind = "Backup",
    status = "BackupStatus",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_volumes: Option<bool>,

    /// How long the backup is retained before it is garbage collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<K8sDuration>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BackupPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Time>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum BackupPhase {
    New,
    FailedValidation,
    InProgress,
    Completed,
    Failed,
    Deleting,
    #[serde(other)]
    Unknown,
}

impl Backup {
    pub fn phase(&self) -> Option<BackupPhase> {
        self.status.as_ref()?.phase
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == Some(BackupPhase::Completed)
    }
}
