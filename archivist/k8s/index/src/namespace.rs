use ahash::AHashMap as HashMap;
use namespace_archivist_core::Namespace;
use namespace_archivist_k8s_api::{self as k8s, ResourceExt};
use tracing::debug;

/// Holds every namespace known to the cluster.
#[derive(Debug, Default)]
pub struct NamespaceIndex {
    by_name: HashMap<String, Namespace>,
}

impl NamespaceIndex {
    pub fn get(&self, name: &str) -> Option<&Namespace> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Namespace> + '_ {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl kubert::index::IndexClusterResource<k8s::Namespace> for NamespaceIndex {
    fn apply(&mut self, ns: k8s::Namespace) {
        let name = ns.name_unchecked();
        let mut namespace = Namespace::new(&name);
        namespace.created = ns.metadata.creation_timestamp.as_ref().map(|t| t.0);
        namespace.requester = k8s::requester(&ns).map(str::to_string);
        debug!(%name, "Indexing namespace");
        self.by_name.insert(name, namespace);
    }

    fn delete(&mut self, name: String) {
        debug!(%name, "Removing namespace");
        self.by_name.remove(&name);
    }
}
