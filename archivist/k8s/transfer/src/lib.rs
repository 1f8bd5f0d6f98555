//! Namespace export and import
//!
//! An export captures the user-authored resources of a namespace as a [`ExportDocument`], a `v1`
//! `List` that can be written to disk and imported later, possibly into another cluster. Cluster
//! identity (UIDs, resource versions, timestamps) is stripped so that the document can be replayed
//! as fresh creations.
//!
//! Resources are accessed through the [`ResourceCatalog`] trait over a registry of known kinds.
//! Transient kinds (pods, replication controllers and builds) are never exported or imported, and
//! secrets that the platform generates for service accounts are filtered on both sides.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod catalog;
mod cluster;
mod document;
mod export;
mod import;
mod locks;
pub mod memory;
mod registry;


pub use self::{
    catalog::ResourceCatalog,
    cluster::ClusterCatalog,
    document::{ExportDocument, ExportedResource},
    export::Exporter,
    import::{EntryReport, ImportReport, Importer, Outcome, SkipReason},
    locks::NamespaceLocks,
    registry::{is_transient, KindRegistry, TRANSIENT_KINDS},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("namespace {0} not found")]
    NamespaceNotFound(String),

    #[error("unsupported resource kind {kind} ({api_version})")]
    UnsupportedKind { api_version: String, kind: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: String, name: String },

    #[error("{0} resource has no name")]
    Unnamed(String),

    #[error("failed to convert {kind} {name}: {source}")]
    Decode {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Api(#[from] kube::Error),
}
