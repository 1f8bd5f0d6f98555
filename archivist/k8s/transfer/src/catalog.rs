use crate::Error;
use namespace_archivist_k8s_api::{ApiResource, DynamicObject};
use std::sync::Arc;

/// Generic, namespace-scoped access to cluster resources.
#[async_trait::async_trait]
pub trait ResourceCatalog: Send + Sync {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, Error>;

    /// Creates the namespace if it does not exist. Returns true if it was created.
    async fn ensure_namespace(&self, namespace: &str) -> Result<bool, Error>;

    /// Lists all objects of a kind. Fails with [`Error::UnsupportedKind`] when the cluster does
    /// not serve the kind.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error>;

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Fails with [`Error::AlreadyExists`] if an object of the same name exists.
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Fails with [`Error::Conflict`] if the object was modified since it was read.
    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;
}

#[async_trait::async_trait]
impl<C: ResourceCatalog + ?Sized> ResourceCatalog for Arc<C> {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, Error> {
        (**self).namespace_exists(namespace).await
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<bool, Error> {
        (**self).ensure_namespace(namespace).await
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        (**self).list(resource, namespace).await
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        (**self).get(resource, namespace, name).await
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        (**self).create(resource, namespace, obj).await
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        (**self).replace(resource, namespace, obj).await
    }
}
