use namespace_archivist_k8s_api::{ApiResource, GroupVersionKind};

/// Kinds that are recreated by their owners and are never transferred.
pub const TRANSIENT_KINDS: [&str; 3] = ["Pod", "ReplicationController", "Build"];

pub fn is_transient(kind: &str) -> bool {
    TRANSIENT_KINDS.contains(&kind)
}

/// The namespaced resource kinds that exports enumerate and imports know how to create.
#[derive(Clone, Debug)]
pub struct KindRegistry {
    kinds: Vec<ApiResource>,
}

impl KindRegistry {
    pub fn new(kinds: impl IntoIterator<Item = ApiResource>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// The kinds found in an OpenShift project.
    pub fn openshift() -> Self {
        let kinds = [
            ("", "v1", "ConfigMap", "configmaps"),
            ("", "v1", "Secret", "secrets"),
            ("", "v1", "ServiceAccount", "serviceaccounts"),
            ("", "v1", "Service", "services"),
            ("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
            ("", "v1", "LimitRange", "limitranges"),
            ("", "v1", "ResourceQuota", "resourcequotas"),
            ("", "v1", "Pod", "pods"),
            ("", "v1", "ReplicationController", "replicationcontrollers"),
            ("apps", "v1", "Deployment", "deployments"),
            ("apps", "v1", "StatefulSet", "statefulsets"),
            ("apps", "v1", "DaemonSet", "daemonsets"),
            ("batch", "v1", "Job", "jobs"),
            ("batch", "v1", "CronJob", "cronjobs"),
            ("autoscaling", "v1", "HorizontalPodAutoscaler", "horizontalpodautoscalers"),
            ("networking.k8s.io", "v1", "Ingress", "ingresses"),
            ("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies"),
            ("rbac.authorization.k8s.io", "v1", "Role", "roles"),
            ("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings"),
            ("apps.openshift.io", "v1", "DeploymentConfig", "deploymentconfigs"),
            ("build.openshift.io", "v1", "BuildConfig", "buildconfigs"),
            ("build.openshift.io", "v1", "Build", "builds"),
            ("image.openshift.io", "v1", "ImageStream", "imagestreams"),
            ("route.openshift.io", "v1", "Route", "routes"),
            ("template.openshift.io", "v1", "Template", "templates"),
        ];
        Self::new(kinds.into_iter().map(|(group, version, kind, plural)| {
            ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
        }))
    }

    pub fn with_kind(mut self, kind: ApiResource) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiResource> + '_ {
        self.kinds.iter()
    }

    /// Finds the registered kind for an entry.
    ///
    /// Entries written with the legacy un-grouped `v1` version (as older OpenShift releases did
    /// for their own kinds) match a `v1` kind of the same name in any group, as long as the name
    /// is unambiguous.
    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&ApiResource> {
        if let Some(exact) = self
            .kinds
            .iter()
            .find(|r| r.api_version == api_version && r.kind == kind)
        {
            return Some(exact);
        }

        if api_version == "v1" {
            let mut by_kind = self
                .kinds
                .iter()
                .filter(|r| r.version == "v1" && r.kind == kind);
            if let (Some(only), None) = (by_kind.next(), by_kind.next()) {
                return Some(only);
            }
        }

        None
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::openshift()
    }
}
