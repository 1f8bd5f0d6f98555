//! An in-memory [`ResourceCatalog`] that behaves like a minimal API server: it assigns resource
//! versions, rejects duplicate names and stale replacements, and records every mutating call.

use crate::{Error, ResourceCatalog};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use namespace_archivist_k8s_api::{ApiResource, DynamicObject, ResourceExt};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog(Arc<Mutex<State>>);

/// A mutating call observed by the catalog.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateNamespace(String),
    Create {
        namespace: String,
        kind: String,
        obj: DynamicObject,
    },
    Replace {
        namespace: String,
        kind: String,
        obj: DynamicObject,
    },
}

#[derive(Debug, Default)]
struct State {
    namespaces: HashSet<String>,
    objects: HashMap<Key, BTreeMap<String, DynamicObject>>,
    unsupported: HashSet<(String, String)>,
    replace_conflicts: usize,
    next_version: u64,
    calls: Vec<Call>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Key {
    namespace: String,
    group: String,
    kind: String,
}

impl Key {
    fn new(resource: &ApiResource, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            group: resource.group.clone(),
            kind: resource.kind.clone(),
        }
    }
}

// === impl MemoryCatalog ===

impl MemoryCatalog {
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.0.lock().namespaces.insert(namespace.to_string());
        self
    }

    /// Stores an object without recording a call.
    pub fn insert(&self, resource: &ApiResource, namespace: &str, mut obj: DynamicObject) {
        let mut state = self.0.lock();
        state.namespaces.insert(namespace.to_string());
        obj.metadata.namespace = Some(namespace.to_string());
        obj.metadata.resource_version = Some(state.bump().to_string());
        let name = obj.name_any();
        state
            .objects
            .entry(Key::new(resource, namespace))
            .or_default()
            .insert(name, obj);
    }

    /// Makes the catalog report that the cluster does not serve a kind.
    pub fn unsupported(self, resource: &ApiResource) -> Self {
        self.0
            .lock()
            .unsupported
            .insert((resource.group.clone(), resource.kind.clone()));
        self
    }

    /// Fails the next `n` replacements with a conflict.
    pub fn fail_replaces(&self, n: usize) {
        self.0.lock().replace_conflicts = n;
    }

    pub fn objects(&self, resource: &ApiResource, namespace: &str) -> Vec<DynamicObject> {
        self.0
            .lock()
            .objects
            .get(&Key::new(resource, namespace))
            .map(|objs| objs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Option<DynamicObject> {
        self.0
            .lock()
            .objects
            .get(&Key::new(resource, namespace))?
            .get(name)
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().calls.clone()
    }
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn check_supported(&self, resource: &ApiResource) -> Result<(), Error> {
        if self
            .unsupported
            .contains(&(resource.group.clone(), resource.kind.clone()))
        {
            return Err(Error::UnsupportedKind {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
        Ok(())
    }

    fn check_namespace(&self, namespace: &str) -> Result<(), Error> {
        if !self.namespaces.contains(namespace) {
            return Err(Error::NamespaceNotFound(namespace.to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceCatalog for MemoryCatalog {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, Error> {
        Ok(self.0.lock().namespaces.contains(namespace))
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<bool, Error> {
        let mut state = self.0.lock();
        if !state.namespaces.insert(namespace.to_string()) {
            return Ok(false);
        }
        state.calls.push(Call::CreateNamespace(namespace.to_string()));
        Ok(true)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        self.0.lock().check_supported(resource)?;
        Ok(self.objects(resource, namespace))
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        self.0.lock().check_supported(resource)?;
        Ok(self.object(resource, namespace, name))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let mut state = self.0.lock();
        state.check_supported(resource)?;
        state.check_namespace(namespace)?;
        state.calls.push(Call::Create {
            namespace: namespace.to_string(),
            kind: resource.kind.clone(),
            obj: obj.clone(),
        });

        let mut obj = obj.clone();
        let name = match (&obj.metadata.name, &obj.metadata.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{prefix}{}", state.next_version + 1),
            (None, None) => return Err(Error::Unnamed(resource.kind.clone())),
        };
        let key = Key::new(resource, namespace);
        if state
            .objects
            .get(&key)
            .map_or(false, |objs| objs.contains_key(&name))
        {
            return Err(Error::AlreadyExists {
                kind: resource.kind.clone(),
                name,
            });
        }

        obj.metadata.name = Some(name.clone());
        obj.metadata.namespace = Some(namespace.to_string());
        obj.metadata.resource_version = Some(state.bump().to_string());
        state
            .objects
            .entry(key)
            .or_default()
            .insert(name, obj.clone());
        Ok(obj)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let mut state = self.0.lock();
        state.check_supported(resource)?;
        state.calls.push(Call::Replace {
            namespace: namespace.to_string(),
            kind: resource.kind.clone(),
            obj: obj.clone(),
        });

        let name = obj.name_any();
        let conflict = || Error::Conflict {
            kind: resource.kind.clone(),
            name: name.clone(),
        };
        if state.replace_conflicts > 0 {
            state.replace_conflicts -= 1;
            return Err(conflict());
        }

        let key = Key::new(resource, namespace);
        let current = state
            .objects
            .get(&key)
            .and_then(|objs| objs.get(&name))
            .and_then(|o| o.metadata.resource_version.clone());
        match current {
            None => return Err(Error::NamespaceNotFound(namespace.to_string())),
            Some(version) if obj.metadata.resource_version.as_ref() != Some(&version) => {
                return Err(conflict())
            }
            Some(_) => {}
        }

        let mut obj = obj.clone();
        obj.metadata.namespace = Some(namespace.to_string());
        obj.metadata.resource_version = Some(state.bump().to_string());
        state
            .objects
            .entry(key)
            .or_default()
            .insert(name, obj.clone());
        Ok(obj)
    }
}
