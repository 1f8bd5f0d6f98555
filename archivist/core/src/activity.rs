use crate::Namespace;
use chrono::{DateTime, Utc};

/// Provides last-activity lookups for the namespaces known to a cluster.
pub trait ActivitySource {
    /// Lists every known namespace, including protected ones.
    fn namespaces(&self) -> Vec<Namespace>;

    /// Resolves the last time a namespace was active.
    ///
    /// Returns `Ok(None)` when the namespace exists but no activity time could be determined.
    /// Such namespaces are never evicted.
    fn last_activity(&self, namespace: &str) -> Result<Option<DateTime<Utc>>, ActivityError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ActivityError {
    #[error("namespace does not exist in cache: {0}")]
    NotFound(String),
}

impl<S: ActivitySource + ?Sized> ActivitySource for &S {
    fn namespaces(&self) -> Vec<Namespace> {
        (**self).namespaces()
    }

    fn last_activity(&self, namespace: &str) -> Result<Option<DateTime<Utc>>, ActivityError> {
        (**self).last_activity(namespace)
    }
}
