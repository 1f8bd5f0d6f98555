use crate::{
    is_transient, Error, ExportDocument, ExportedResource, KindRegistry, NamespaceLocks,
    ResourceCatalog,
};
use ahash::AHashSet as HashSet;
use namespace_archivist_k8s_api::{
    ApiResource, Secret, ServiceAccount, SECRET_TYPE_DOCKERCFG, SECRET_TYPE_SERVICE_ACCOUNT_TOKEN,
    SERVICE_ACCOUNT_UID_ANNOTATION,
};
use tracing::{debug, info};

/// Produces export documents from live namespaces.
#[derive(Clone, Debug)]
pub struct Exporter<C> {
    catalog: C,
    registry: KindRegistry,
    locks: NamespaceLocks,
}

impl<C: ResourceCatalog> Exporter<C> {
    pub fn new(catalog: C, registry: KindRegistry, locks: NamespaceLocks) -> Self {
        Self {
            catalog,
            registry,
            locks,
        }
    }

    /// Exports every user-authored resource in `namespace`.
    ///
    /// Any failure aborts the export; partial documents are never returned.
    pub async fn export(&self, namespace: &str) -> Result<ExportDocument, Error> {
        let _lock = self.locks.lock(namespace).await;
        info!(%namespace, "Beginning export");

        if !self.catalog.namespace_exists(namespace).await? {
            return Err(Error::NamespaceNotFound(namespace.to_string()));
        }

        let mut items = Vec::new();
        for resource in self.registry.iter() {
            // Secrets and service accounts are filtered below.
            if is_transient(&resource.kind) || is_secret(resource) || is_service_account(resource)
            {
                continue;
            }
            let objects = match self.catalog.list(resource, namespace).await {
                Ok(objects) => objects,
                Err(Error::UnsupportedKind { api_version, kind }) => {
                    debug!(%namespace, %api_version, %kind, "Kind not served by the cluster, skipping");
                    continue;
                }
                Err(error) => return Err(error),
            };
            for obj in objects {
                let mut item = ExportedResource::from_object(resource, obj);
                item.strip_identity();
                debug!(%namespace, kind = %item.kind, name = %item.name(), "Exporting");
                items.push(item);
            }
        }

        let excluded = self.export_secrets(namespace, &mut items).await?;
        self.export_service_accounts(namespace, &excluded, &mut items)
            .await?;

        info!(%namespace, resources = items.len(), "Export completed");
        Ok(ExportDocument::new(items))
    }

    /// Exports secrets, except those the platform generates for service accounts. Returns the
    /// names of the secrets that were left out.
    async fn export_secrets(
        &self,
        namespace: &str,
        items: &mut Vec<ExportedResource>,
    ) -> Result<HashSet<String>, Error> {
        let resource = ApiResource::erase::<Secret>(&());
        let mut excluded = HashSet::new();
        for obj in self.catalog.list(&resource, namespace).await? {
            let mut item = ExportedResource::from_object(&resource, obj);
            let secret = item.to_typed::<Secret>().map_err(|source| Error::Decode {
                kind: item.kind.clone(),
                name: item.name().to_string(),
                source,
            })?;
            if is_generated_secret(&secret) {
                debug!(%namespace, name = %item.name(), "Skipping service account secret");
                excluded.insert(item.name().to_string());
                continue;
            }
            item.strip_identity();
            debug!(%namespace, kind = %item.kind, name = %item.name(), "Exporting");
            items.push(item);
        }
        Ok(excluded)
    }

    /// Exports every service account, dropping references to excluded secrets.
    async fn export_service_accounts(
        &self,
        namespace: &str,
        excluded: &HashSet<String>,
        items: &mut Vec<ExportedResource>,
    ) -> Result<(), Error> {
        let resource = ApiResource::erase::<ServiceAccount>(&());
        for obj in self.catalog.list(&resource, namespace).await? {
            let item = ExportedResource::from_object(&resource, obj);
            let decode = |source| Error::Decode {
                kind: item.kind.clone(),
                name: item.name().to_string(),
                source,
            };
            let mut sa = item.to_typed::<ServiceAccount>().map_err(decode)?;
            if let Some(secrets) = sa.secrets.as_mut() {
                secrets.retain(|r| r.name.as_deref().map_or(true, |n| !excluded.contains(n)));
            }
            if let Some(pull_secrets) = sa.image_pull_secrets.as_mut() {
                pull_secrets.retain(|r| r.name.as_deref().map_or(true, |n| !excluded.contains(n)));
            }
            let mut item = ExportedResource::from_typed(&sa).map_err(decode)?;
            item.strip_identity();
            debug!(%namespace, kind = %item.kind, name = %item.name(), "Exporting");
            items.push(item);
        }
        Ok(())
    }
}

fn is_secret(resource: &ApiResource) -> bool {
    resource.group.is_empty() && resource.kind == "Secret"
}

fn is_service_account(resource: &ApiResource) -> bool {
    resource.group.is_empty() && resource.kind == "ServiceAccount"
}

/// Token secrets, and dockercfg secrets linked to a service account, are recreated by the platform
/// whenever a service account is created.
pub(crate) fn is_generated_secret(secret: &Secret) -> bool {
    match secret.type_.as_deref() {
        Some(SECRET_TYPE_SERVICE_ACCOUNT_TOKEN) => true,
        Some(SECRET_TYPE_DOCKERCFG) => secret
            .metadata
            .annotations
            .as_ref()
            .map_or(false, |a| a.contains_key(SERVICE_ACCOUNT_UID_ANNOTATION)),
        _ => false,
    }
}
