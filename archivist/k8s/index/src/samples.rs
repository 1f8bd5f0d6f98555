use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use namespace_archivist_k8s_api::{Build, ReplicationController, ResourceExt};
use std::marker::PhantomData;

/// A resource whose existence signals that its namespace is in use.
pub trait ActivityTime {
    /// The time the resource last indicated activity, if known.
    fn activity_time(&self) -> Option<DateTime<Utc>>;
}

/// Activity samples of one resource kind, grouped by namespace.
///
/// Samples without a time are retained so that the index reflects every watched resource, but they
/// never contribute to a namespace's activity.
#[derive(Debug)]
pub struct Samples<T> {
    by_ns: HashMap<String, HashMap<String, Option<DateTime<Utc>>>>,
    _kind: PhantomData<fn(T)>,
}

// === impl Samples ===

impl<T> Default for Samples<T> {
    fn default() -> Self {
        Self {
            by_ns: HashMap::default(),
            _kind: PhantomData,
        }
    }
}

impl<T> Samples<T> {
    /// The latest known activity time in a namespace.
    pub fn latest(&self, namespace: &str) -> Option<DateTime<Utc>> {
        self.by_ns.get(namespace)?.values().flatten().max().copied()
    }

    pub fn latest_by_namespace(&self) -> HashMap<String, DateTime<Utc>> {
        self.by_ns
            .iter()
            .filter_map(|(ns, samples)| {
                let latest = samples.values().flatten().max()?;
                Some((ns.clone(), *latest))
            })
            .collect()
    }

    /// The number of resources indexed across all namespaces.
    pub fn len(&self) -> usize {
        self.by_ns.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ns.is_empty()
    }
}

impl<T> kubert::index::IndexNamespacedResource<T> for Samples<T>
where
    T: ActivityTime + ResourceExt,
{
    fn apply(&mut self, resource: T) {
        let namespace = match resource.namespace() {
            Some(ns) => ns,
            None => return,
        };
        let name = resource.name_unchecked();
        let time = resource.activity_time();
        tracing::trace!(%namespace, %name, ?time, "Indexing activity sample");
        self.by_ns.entry(namespace).or_default().insert(name, time);
    }

    fn delete(&mut self, namespace: String, name: String) {
        if let Some(samples) = self.by_ns.get_mut(&namespace) {
            samples.remove(&name);
            if samples.is_empty() {
                self.by_ns.remove(&namespace);
            }
        }
    }
}

impl ActivityTime for Build {
    fn activity_time(&self) -> Option<DateTime<Utc>> {
        self.start_timestamp().map(|t| t.0)
    }
}

impl ActivityTime for ReplicationController {
    fn activity_time(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .filter(|t| t.timestamp() > 0)
    }
}
