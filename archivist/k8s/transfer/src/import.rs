use crate::{
    export::is_generated_secret, is_transient, Error, ExportDocument, ExportedResource,
    KindRegistry, NamespaceLocks, ResourceCatalog,
};
use namespace_archivist_core::retry;
use namespace_archivist_k8s_api::{
    ApiResource, LocalObjectReference, Secret, ServiceAccount, SECRET_TYPE_SERVICE_ACCOUNT_TOKEN,
};
use ahash::AHashSet as HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Replays export documents into a namespace.
#[derive(Clone, Debug)]
pub struct Importer<C> {
    catalog: C,
    registry: KindRegistry,
    locks: NamespaceLocks,
    attempts: usize,
    delay: Duration,
}

/// The result of importing each entry of a document, in processing order.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub entries: Vec<EntryReport>,
}

#[derive(Debug)]
pub struct EntryReport {
    pub kind: String,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub enum Outcome {
    Created,

    /// Pull secrets were merged into an existing service account.
    Merged,

    Skipped(SkipReason),

    Failed(Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Transient,
    ServiceAccountToken,
    LinkedDockercfg,
    NamespaceExists,
}

// === impl Importer ===

impl<C: ResourceCatalog> Importer<C> {
    pub fn new(catalog: C, registry: KindRegistry, locks: NamespaceLocks) -> Self {
        Self {
            catalog,
            registry,
            locks,
            attempts: retry::DEFAULT_ATTEMPTS,
            delay: retry::DEFAULT_DELAY,
        }
    }

    /// Sets how service account merges are retried.
    pub fn with_retry(mut self, attempts: usize, delay: Duration) -> Self {
        self.attempts = attempts;
        self.delay = delay;
        self
    }

    /// Imports every entry of `document` into `namespace`.
    ///
    /// Entries are processed one at a time and failures do not stop the import; nothing is rolled
    /// back. Namespace entries are processed first so that the namespace exists before anything is
    /// created in it.
    pub async fn import(&self, document: &ExportDocument, namespace: &str) -> ImportReport {
        let _lock = self.locks.lock(namespace).await;
        info!(%namespace, entries = document.len(), "Beginning import");

        let mut entries = document.items.iter().collect::<Vec<_>>();
        entries.sort_by_key(|entry| !is_namespace_entry(entry));

        let carried = carried_secrets(document);
        let mut report = ImportReport::default();
        for entry in entries {
            let outcome = match self.import_entry(entry, namespace, &carried).await {
                Ok(outcome) => outcome,
                Err(error) => Outcome::Failed(error),
            };
            match &outcome {
                Outcome::Failed(error) => {
                    warn!(%namespace, kind = %entry.kind, name = %entry.name(), %error, "Failed to import")
                }
                outcome => {
                    debug!(%namespace, kind = %entry.kind, name = %entry.name(), ?outcome, "Imported")
                }
            }
            report.entries.push(EntryReport {
                kind: entry.kind.clone(),
                name: entry.name().to_string(),
                outcome,
            });
        }

        info!(
            %namespace,
            created = report.count(|o| matches!(o, Outcome::Created)),
            merged = report.count(|o| matches!(o, Outcome::Merged)),
            skipped = report.count(|o| matches!(o, Outcome::Skipped(_))),
            failed = report.count(|o| matches!(o, Outcome::Failed(_))),
            "Import completed"
        );
        report
    }

    async fn import_entry(
        &self,
        entry: &ExportedResource,
        namespace: &str,
        carried: &HashSet<String>,
    ) -> Result<Outcome, Error> {
        if is_namespace_entry(entry) {
            let created = self.catalog.ensure_namespace(namespace).await?;
            return Ok(if created {
                Outcome::Created
            } else {
                Outcome::Skipped(SkipReason::NamespaceExists)
            });
        }

        if is_transient(&entry.kind) {
            return Ok(Outcome::Skipped(SkipReason::Transient));
        }

        let resource = self
            .registry
            .lookup(&entry.api_version, &entry.kind)
            .ok_or_else(|| Error::UnsupportedKind {
                api_version: entry.api_version.clone(),
                kind: entry.kind.clone(),
            })?;

        let mut entry = entry.clone();
        entry.strip_identity();
        if entry.metadata.name.is_none() && entry.metadata.generate_name.is_none() {
            return Err(Error::Unnamed(entry.kind));
        }
        // Legacy un-grouped entries are created under the registered group.
        entry.api_version = resource.api_version.clone();

        match (resource.group.as_str(), resource.kind.as_str()) {
            ("", "Secret") => {
                let secret = decode::<Secret>(&entry)?;
                if is_generated_secret(&secret) {
                    let reason = if secret.type_.as_deref() == Some(SECRET_TYPE_SERVICE_ACCOUNT_TOKEN) {
                        SkipReason::ServiceAccountToken
                    } else {
                        SkipReason::LinkedDockercfg
                    };
                    return Ok(Outcome::Skipped(reason));
                }
            }
            ("", "Service") => entry.clear_cluster_ip(),
            ("", "ServiceAccount") => {
                return self
                    .import_service_account(resource, entry, namespace, carried)
                    .await;
            }
            _ => {}
        }

        self.catalog
            .create(resource, namespace, &entry.into_object())
            .await?;
        Ok(Outcome::Created)
    }

    /// Creates a service account, or merges its pull secrets into an existing account of the same
    /// name. Merges are retried to absorb concurrent updates, for example by the token controller.
    async fn import_service_account(
        &self,
        resource: &ApiResource,
        entry: ExportedResource,
        namespace: &str,
        carried: &HashSet<String>,
    ) -> Result<Outcome, Error> {
        let mut imported = decode::<ServiceAccount>(&entry)?;
        // Token and dockercfg secrets are regenerated for the new account.
        if let Some(secrets) = imported.secrets.as_mut() {
            secrets.retain(|r| r.name.as_deref().map_or(false, |n| carried.contains(n)));
        }
        let name = entry.name();
        let pull_secrets = imported.image_pull_secrets.as_deref().unwrap_or_default();

        let merged = retry::retry(self.attempts, self.delay, move || {
            self.merge_pull_secrets(resource, namespace, name, pull_secrets)
        })
        .await
        .map_err(|retry::Exhausted { error, .. }| error)?;

        if merged {
            return Ok(Outcome::Merged);
        }

        debug!(%namespace, sa = %name, "Service account does not exist, creating");
        let created = ExportedResource::from_typed(&imported).map_err(|source| Error::Decode {
            kind: entry.kind.clone(),
            name: name.to_string(),
            source,
        })?;
        self.catalog
            .create(resource, namespace, &created.into_object())
            .await?;
        Ok(Outcome::Created)
    }

    /// Appends pull secrets to an existing service account. Returns false if the account does not
    /// exist.
    async fn merge_pull_secrets(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        pull_secrets: &[LocalObjectReference],
    ) -> Result<bool, Error> {
        // Re-read on every attempt so that conflicting updates are merged with, not overwritten.
        let existing = match self.catalog.get(resource, namespace, name).await? {
            Some(existing) => ExportedResource::from_object(resource, existing),
            None => return Ok(false),
        };
        let mut sa = decode::<ServiceAccount>(&existing)?;
        let current = sa.image_pull_secrets.get_or_insert_with(Vec::new);
        for secret in pull_secrets {
            if !current.iter().any(|s| s.name == secret.name) {
                debug!(%namespace, sa = %name, secret = ?secret.name, "Adding image pull secret to service account");
                current.push(secret.clone());
            }
        }

        let updated = ExportedResource::from_typed(&sa).map_err(|source| Error::Decode {
            kind: existing.kind.clone(),
            name: name.to_string(),
            source,
        })?;
        self.catalog
            .replace(resource, namespace, &updated.into_object())
            .await?;
        Ok(true)
    }
}

/// Names of the secrets a document recreates.
fn carried_secrets(document: &ExportDocument) -> HashSet<String> {
    document
        .items
        .iter()
        .filter(|entry| entry.kind == "Secret" && entry.group().is_empty())
        .filter(|entry| {
            entry
                .to_typed::<Secret>()
                .map_or(false, |secret| !is_generated_secret(&secret))
        })
        .map(|entry| entry.name().to_string())
        .collect()
}

fn is_namespace_entry(entry: &ExportedResource) -> bool {
    match entry.kind.as_str() {
        "Namespace" => entry.group().is_empty(),
        "Project" => entry.group().is_empty() || entry.group() == "project.openshift.io",
        _ => false,
    }
}

fn decode<K: serde::de::DeserializeOwned>(entry: &ExportedResource) -> Result<K, Error> {
    entry.to_typed().map_err(|source| Error::Decode {
        kind: entry.kind.clone(),
        name: entry.name().to_string(),
        source,
    })
}

// === impl ImportReport ===

impl ImportReport {
    /// True if no entry failed.
    pub fn is_success(&self) -> bool {
        !self
            .entries
            .iter()
            .any(|e| matches!(e.outcome, Outcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntryReport, &Error)> + '_ {
        self.entries.iter().filter_map(|e| match &e.outcome {
            Outcome::Failed(error) => Some((e, error)),
            _ => None,
        })
    }

    pub fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| f(&e.outcome)).count()
    }

    pub fn outcome(&self, kind: &str, name: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .map(|e| &e.outcome)
    }
}
