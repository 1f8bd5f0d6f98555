//! Namespace activity index
//!
//! The index tracks when each namespace was last active. It watches the following cluster
//! resources, each through its own kubert index task:
//!
//! - A `Namespace` provides the set of known namespaces, their creation time and the identity of
//!   their requester.
//! - A `Build` contributes its start time. Builds that have not started yet are ignored.
//! - A `ReplicationController` contributes its creation time.
//!
//! ```text
//! [ Namespace ] <- [ Build ]*
//!               <- [ ReplicationController ]*
//! ```
//!
//! A namespace's last activity is the latest of its build and replication controller times, or its
//! own creation time when it has neither. Lookups take short read locks on each per-kind index, so
//! watch tasks never wait on the planner for long.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod metrics;
mod namespace;
mod samples;
mod sync;

#[cfg(test)]
mod tests;

pub use self::{
    namespace::NamespaceIndex,
    samples::{ActivityTime, Samples},
    sync::{track, wait_all, SyncError, Synced},
};
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use namespace_archivist_core::{ActivityError, ActivitySource, Namespace};
use namespace_archivist_k8s_api::{Build, ReplicationController};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedNamespaces = Arc<RwLock<NamespaceIndex>>;
pub type SharedSamples<T> = Arc<RwLock<Samples<T>>>;

/// Resolves namespace activity from the per-kind indexes.
#[derive(Clone, Debug, Default)]
pub struct ActivityIndex {
    namespaces: SharedNamespaces,
    builds: SharedSamples<Build>,
    replication_controllers: SharedSamples<ReplicationController>,
}

/// A point-in-time copy of the activity index.
///
/// Planning runs against a snapshot so that all namespaces are evaluated against the same state,
/// and repeated planning over an unchanged snapshot yields the same result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    namespaces: HashMap<String, Namespace>,
    builds: HashMap<String, DateTime<Utc>>,
    replication_controllers: HashMap<String, DateTime<Utc>>,
}

// === impl ActivityIndex ===

impl ActivityIndex {
    pub fn namespaces(&self) -> &SharedNamespaces {
        &self.namespaces
    }

    pub fn builds(&self) -> &SharedSamples<Build> {
        &self.builds
    }

    pub fn replication_controllers(&self) -> &SharedSamples<ReplicationController> {
        &self.replication_controllers
    }

    /// Resolves the last activity time of a namespace.
    ///
    /// Fails if the namespace has not been observed. Returns `None` when the namespace has neither
    /// activity samples nor a creation time.
    pub fn last_activity(&self, namespace: &str) -> Result<Option<DateTime<Utc>>, ActivityError> {
        let created = self
            .namespaces
            .read()
            .get(namespace)
            .ok_or_else(|| ActivityError::NotFound(namespace.to_string()))?
            .created;
        let builds = self.builds.read().latest(namespace);
        let rcs = self.replication_controllers.read().latest(namespace);
        Ok(resolve(builds, rcs, created))
    }

    pub fn snapshot(&self) -> Snapshot {
        let namespaces = self
            .namespaces
            .read()
            .iter()
            .map(|ns| (ns.name.clone(), ns.clone()))
            .collect();
        let builds = self.builds.read().latest_by_namespace();
        let replication_controllers = self.replication_controllers.read().latest_by_namespace();
        Snapshot {
            namespaces,
            builds,
            replication_controllers,
        }
    }
}

impl ActivitySource for ActivityIndex {
    fn namespaces(&self) -> Vec<Namespace> {
        self.namespaces.read().iter().cloned().collect()
    }

    fn last_activity(&self, namespace: &str) -> Result<Option<DateTime<Utc>>, ActivityError> {
        ActivityIndex::last_activity(self, namespace)
    }
}

// === impl Snapshot ===

impl Snapshot {
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn get(&self, namespace: &str) -> Option<&Namespace> {
        self.namespaces.get(namespace)
    }
}

impl ActivitySource for Snapshot {
    fn namespaces(&self) -> Vec<Namespace> {
        self.namespaces.values().cloned().collect()
    }

    fn last_activity(&self, namespace: &str) -> Result<Option<DateTime<Utc>>, ActivityError> {
        let ns = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| ActivityError::NotFound(namespace.to_string()))?;
        Ok(resolve(
            self.builds.get(namespace).copied(),
            self.replication_controllers.get(namespace).copied(),
            ns.created,
        ))
    }
}

fn resolve(
    builds: Option<DateTime<Utc>>,
    rcs: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    builds.max(rcs).or(created)
}
