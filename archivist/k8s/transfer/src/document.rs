use kube::core::TypeMeta;
use namespace_archivist_k8s_api::{ApiResource, DynamicObject, ObjectMeta};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

const LIST_API_VERSION: &str = "v1";
const LIST_KIND: &str = "List";

/// A portable snapshot of a namespace's resources.
///
/// Serialized as a `v1` `List`, so documents can also be inspected and applied with standard
/// tooling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub items: Vec<ExportedResource>,
}

/// A single resource in an [`ExportDocument`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedResource {
    pub api_version: String,
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Everything else: `spec`, `data`, `type`, etc.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

// === impl ExportDocument ===

impl Default for ExportDocument {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ExportDocument {
    pub fn new(items: Vec<ExportedResource>) -> Self {
        Self {
            api_version: LIST_API_VERSION.to_string(),
            kind: LIST_KIND.to_string(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parses a YAML (or JSON) document.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }
}

// === impl ExportedResource ===

impl ExportedResource {
    /// Builds an entry from an object listed through `resource`. List items frequently omit their
    /// type, so it is taken from the resource description instead.
    pub fn from_object(resource: &ApiResource, obj: DynamicObject) -> Self {
        let data = match obj.data {
            Value::Object(data) => data,
            _ => Map::new(),
        };
        Self {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
            metadata: obj.metadata,
            data,
        }
    }

    pub fn into_object(self) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: self.api_version,
                kind: self.kind,
            }),
            metadata: self.metadata,
            data: Value::Object(self.data),
        }
    }

    pub fn from_typed<K: Serialize>(resource: &K) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(resource)?)
    }

    pub fn to_typed<K: DeserializeOwned>(&self) -> Result<K, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Returns the API group, which is empty for core resources.
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// Clears fields that tie the resource to the cluster it was read from.
    ///
    /// The name is cleared too when it was generated by the server, so that a new one is
    /// generated on creation.
    pub fn strip_identity(&mut self) {
        let meta = &mut self.metadata;
        meta.uid = None;
        meta.namespace = None;
        meta.creation_timestamp = None;
        meta.deletion_timestamp = None;
        meta.deletion_grace_period_seconds = None;
        meta.resource_version = None;
        meta.self_link = None;
        meta.generation = None;
        meta.managed_fields = None;
        // Owners are matched by UID; stale references would get the resource garbage collected.
        meta.owner_references = None;
        if meta.generate_name.is_some() {
            meta.name = None;
        }
    }

    /// Removes the cluster IPs of a service so that new ones are allocated. Headless services
    /// keep their `None` address.
    pub fn clear_cluster_ip(&mut self) {
        if let Some(Value::Object(spec)) = self.data.get_mut("spec") {
            if spec.get("clusterIP").and_then(Value::as_str) == Some("None") {
                return;
            }
            spec.remove("clusterIP");
            spec.remove("clusterIPs");
        }
    }
}
