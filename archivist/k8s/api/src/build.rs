use crate::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// An OpenShift build. Only the fields used to track namespace activity are modeled.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "Build",
    status = "BuildStatus",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Unset until the build has been scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<Time>,
}

impl Build {
    pub fn start_timestamp(&self) -> Option<&Time> {
        self.status.as_ref()?.start_timestamp.as_ref()
    }
}
