use crate::{Error, ResourceCatalog};
use kube::api::{ListParams, PostParams};
use namespace_archivist_k8s_api::{
    self as k8s, Api, ApiResource, Client, DynamicObject, ObjectMeta, ResourceExt,
};
use tracing::debug;

/// A [`ResourceCatalog`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct ClusterCatalog {
    client: Client,
}

impl ClusterCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

#[async_trait::async_trait]
impl ResourceCatalog for ClusterCatalog {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, Error> {
        let api = Api::<k8s::Namespace>::all(self.client.clone());
        Ok(api.get_opt(namespace).await?.is_some())
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<bool, Error> {
        if self.namespace_exists(namespace).await? {
            return Ok(false);
        }

        let api = Api::<k8s::Namespace>::all(self.client.clone());
        let ns = k8s::Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                debug!(%namespace, "Created namespace");
                Ok(true)
            }
            Err(error) => match api_error("Namespace", namespace, error) {
                Error::AlreadyExists { .. } => Ok(false),
                error => Err(error),
            },
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        match self
            .api(resource, namespace)
            .list(&ListParams::default())
            .await
        {
            Ok(list) => Ok(list.items),
            Err(kube::Error::Api(rsp)) if rsp.code == 404 => Err(Error::UnsupportedKind {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self.api(resource, namespace).get_opt(name).await?)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        self.api(resource, namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|error| api_error(&resource.kind, &obj.name_any(), error))
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = obj.name_any();
        self.api(resource, namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|error| api_error(&resource.kind, &name, error))
    }
}

/// Distinguishes name collisions from optimistic-concurrency failures; both are reported with a
/// 409 status.
fn api_error(kind: &str, name: &str, error: kube::Error) -> Error {
    match error {
        kube::Error::Api(rsp) if rsp.code == 409 && rsp.reason == "AlreadyExists" => {
            Error::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(rsp) if rsp.code == 409 => Error::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        error => Error::Api(error),
    }
}
