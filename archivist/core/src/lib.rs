//! Namespace archivist core
//!
//! Types shared by the activity index, the eviction planner and the archive executor. Nothing in
//! this crate knows about the Kubernetes API: namespaces are described by name, creation time and
//! requester, and activity is read through the [`ActivitySource`] trait.
//!
//! ```text
//! [ ActivitySource ] -> [ CapacityPolicy::plan ] -> [ EvictionCandidate ]*
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod activity;
pub mod plan;
pub mod retry;

pub use self::{
    activity::{ActivityError, ActivitySource},
    plan::{CapacityPolicy, EvictionCandidate, Plan, Tier},
};
pub use chrono::{DateTime, Utc};

/// A tenant namespace as seen by the planner.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub name: String,

    /// The namespace's creation time, if the API server reported one.
    pub created: Option<DateTime<Utc>>,

    /// The identity of the user that requested the namespace. Archival is refused without it,
    /// since the backup could not be attributed to anyone.
    pub requester: Option<String>,
}

// === impl Namespace ===

impl Namespace {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            created: None,
            requester: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_requester(mut self, requester: impl ToString) -> Self {
        self.requester = Some(requester.to_string());
        self
    }
}
