use kube::api::{DeleteParams, PostParams};
use namespace_archivist_k8s_api::{self as k8s, Api, Backup, Client};
use tracing::debug;

/// Submits backup requests.
#[async_trait::async_trait]
pub trait BackupService: Send + Sync {
    async fn create(&self, backup: &Backup) -> Result<Backup, kube::Error>;
}

/// Deletes archived namespaces.
#[async_trait::async_trait]
pub trait NamespaceService: Send + Sync {
    /// Deletes a namespace. Deleting a namespace that no longer exists succeeds.
    async fn delete(&self, namespace: &str) -> Result<(), kube::Error>;
}

/// Creates Ark backup records in the backup namespace.
#[derive(Clone)]
pub struct KubeBackups {
    api: Api<Backup>,
}

#[derive(Clone)]
pub struct KubeNamespaces {
    api: Api<k8s::Namespace>,
}

// === impl KubeBackups ===

impl KubeBackups {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait::async_trait]
impl BackupService for KubeBackups {
    async fn create(&self, backup: &Backup) -> Result<Backup, kube::Error> {
        self.api.create(&PostParams::default(), backup).await
    }
}

// === impl KubeNamespaces ===

impl KubeNamespaces {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl NamespaceService for KubeNamespaces {
    async fn delete(&self, namespace: &str) -> Result<(), kube::Error> {
        match self.api.delete(namespace, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(rsp)) if rsp.code == 404 => {
                debug!(%namespace, "Namespace already deleted");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}
