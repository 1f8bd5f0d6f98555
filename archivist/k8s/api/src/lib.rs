#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod backup;
pub mod build;
pub mod duration;

pub use self::{
    backup::{Backup, BackupPhase, BackupSpec, BackupStatus},
    build::{Build, BuildSpec, BuildStatus},
    duration::K8sDuration,
};
pub use k8s_openapi::{
    api::core::v1::{
        LocalObjectReference, Namespace, ReplicationController, Secret, Service, ServiceAccount,
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, ObjectMeta, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};

/// Label set on every backup record; its value is the name of the archived namespace.
pub const ARCHIVED_NAMESPACE_LABEL: &str = "archived-namespace";

/// Namespace annotation carrying the identity of the user that requested the namespace.
pub const REQUESTER_ANNOTATION: &str = "openshift.io/requester";

/// Secret annotation linking a token or dockercfg secret to the service account that owns it.
pub const SERVICE_ACCOUNT_UID_ANNOTATION: &str = "kubernetes.io/service-account.uid";

pub const SECRET_TYPE_SERVICE_ACCOUNT_TOKEN: &str = "kubernetes.io/service-account-token";
pub const SECRET_TYPE_DOCKERCFG: &str = "kubernetes.io/dockercfg";

/// Returns the requester annotation of a namespace, ignoring empty values.
pub fn requester(ns: &Namespace) -> Option<&str> {
    ns.metadata
        .annotations
        .as_ref()?
        .get(REQUESTER_ANNOTATION)
        .map(String::as_str)
        .filter(|r| !r.is_empty())
}
