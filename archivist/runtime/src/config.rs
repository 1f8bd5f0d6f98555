use namespace_archivist_core::CapacityPolicy;
use namespace_archivist_k8s_api::K8sDuration;
use namespace_archivist_k8s_archive::DEFAULT_BACKUP_NAMESPACE;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CLUSTER_NAME: &str = "local cluster";
const DEFAULT_PROTECTED_NAMESPACES: [&str; 2] = ["default", "openshift-infra"];
const DEFAULT_MIN_INACTIVE: K8sDuration = K8sDuration::from_days(30);
const DEFAULT_MAX_INACTIVE: K8sDuration = K8sDuration::from_days(90);
const DEFAULT_ARCHIVE_TTL: K8sDuration = K8sDuration::from_days(60);
const DEFAULT_MONITOR_CHECK_INTERVAL: K8sDuration = K8sDuration::from_hours(24);

/// Process-wide archivist configuration.
///
/// Unset values are zero after parsing; [`Config::complete`] replaces them with defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// One of `debug`, `info`, `warn` or `error`.
    pub log_level: String,

    pub clusters: Vec<ClusterConfig>,

    /// Log archival decisions without changing anything.
    pub dry_run: bool,

    pub delete_archived_namespaces: bool,

    #[serde(rename = "archiveTTL")]
    pub archive_ttl: K8sDuration,

    pub monitor_check_interval: K8sDuration,

    /// The namespace backup requests are created in.
    pub backup_namespace: String,

    /// If set, each archived namespace's export is written here.
    pub export_directory: Option<PathBuf>,
}

/// Capacity settings for a single cluster.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    pub name: String,
    pub namespace_capacity: NamespaceCapacity,

    /// Namespaces inactive for longer than this *may* be archived if space must be reclaimed.
    pub min_inactive_duration: K8sDuration,

    /// Namespaces inactive for longer than this *will* be archived.
    pub max_inactive_duration: K8sDuration,

    pub protected_namespaces: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamespaceCapacity {
    pub high_watermark: usize,
    pub low_watermark: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("no clusters in config")]
    NoClusters,

    #[error("cluster must have a name")]
    UnnamedCluster,

    #[error("cluster {cluster}: maxInactiveDuration ({max}) must be greater than or equal to minInactiveDuration ({min})")]
    InactiveDurations {
        cluster: String,
        min: K8sDuration,
        max: K8sDuration,
    },

    #[error("cluster {0} is not configured")]
    UnknownCluster(String),
}

// === impl Config ===

impl Config {
    /// The configuration used when no file is given: a single cluster with default settings.
    pub fn local() -> Self {
        let mut config = Self {
            clusters: vec![ClusterConfig {
                name: DEFAULT_CLUSTER_NAME.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        config.complete();
        config
    }

    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::local());
        };
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&yaml)
    }

    /// Parses, completes and validates a configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = serde_yaml::from_str::<Self>(yaml)?;
        config.complete();
        config.validate()?;
        Ok(config)
    }

    /// Fills in defaults for unset values.
    pub fn complete(&mut self) {
        if self.log_level.is_empty() {
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        for cluster in &mut self.clusters {
            if cluster.protected_namespaces.is_empty() {
                cluster.protected_namespaces = DEFAULT_PROTECTED_NAMESPACES
                    .iter()
                    .map(|ns| ns.to_string())
                    .collect();
            }
            if cluster.max_inactive_duration == K8sDuration::default() {
                cluster.max_inactive_duration = DEFAULT_MAX_INACTIVE;
            }
            if cluster.min_inactive_duration == K8sDuration::default() {
                cluster.min_inactive_duration = DEFAULT_MIN_INACTIVE;
            }
        }
        if self.monitor_check_interval == K8sDuration::default() {
            self.monitor_check_interval = DEFAULT_MONITOR_CHECK_INTERVAL;
        }
        if self.archive_ttl == K8sDuration::default() {
            self.archive_ttl = DEFAULT_ARCHIVE_TTL;
        }
        if self.backup_namespace.is_empty() {
            self.backup_namespace = DEFAULT_BACKUP_NAMESPACE.to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clusters.is_empty() {
            return Err(ConfigError::NoClusters);
        }
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                return Err(ConfigError::UnnamedCluster);
            }
            if cluster.max_inactive_duration < cluster.min_inactive_duration {
                return Err(ConfigError::InactiveDurations {
                    cluster: cluster.name.clone(),
                    min: cluster.min_inactive_duration,
                    max: cluster.max_inactive_duration,
                });
            }
        }
        Ok(())
    }

    /// Selects the cluster this process manages: the named one, or else the first.
    pub fn cluster(&self, name: Option<&str>) -> Result<&ClusterConfig, ConfigError> {
        match name {
            Some(name) => self
                .clusters
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| ConfigError::UnknownCluster(name.to_string())),
            None => self.clusters.first().ok_or(ConfigError::NoClusters),
        }
    }

    pub fn capacity_policy(&self, cluster: &ClusterConfig) -> CapacityPolicy {
        CapacityPolicy {
            high_watermark: cluster.namespace_capacity.high_watermark,
            low_watermark: cluster.namespace_capacity.low_watermark,
            min_inactive: cluster.min_inactive_duration.into(),
            max_inactive: cluster.max_inactive_duration.into(),
            protected_namespaces: cluster.protected_namespaces.iter().cloned().collect(),
            dry_run: self.dry_run,
            delete_archived_namespaces: self.delete_archived_namespaces,
            archive_ttl: self.archive_ttl.into(),
        }
    }

    /// A log filter directive for the configured level.
    pub fn log_directive(&self) -> String {
        let level = match self.log_level.as_str() {
            "fatal" | "panic" => "error",
            level => level,
        };
        format!("namespace_archivist={level},warn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(
            r#"
logLevel: debug
clusters:
- name: test cluster
  namespaceCapacity:
    highWatermark: 500
    lowWatermark: 400
  minInactiveDuration: 30m
  maxInactiveDuration: 60m
  protectedNamespaces:
  - default
  - very-important
  - special
dryRun: false
deleteArchivedNamespaces: true
archiveTTL: 7d
monitorCheckInterval: 12h
backupNamespace: velero
exportDirectory: /var/lib/archivist
"#,
        )
        .expect("valid config");

        assert_eq!(
            config,
            Config {
                log_level: "debug".to_string(),
                clusters: vec![ClusterConfig {
                    name: "test cluster".to_string(),
                    namespace_capacity: NamespaceCapacity {
                        high_watermark: 500,
                        low_watermark: 400,
                    },
                    min_inactive_duration: "30m".parse().unwrap(),
                    max_inactive_duration: "60m".parse().unwrap(),
                    protected_namespaces: vec![
                        "default".to_string(),
                        "very-important".to_string(),
                        "special".to_string(),
                    ],
                }],
                dry_run: false,
                delete_archived_namespaces: true,
                archive_ttl: K8sDuration::from_days(7),
                monitor_check_interval: K8sDuration::from_hours(12),
                backup_namespace: "velero".to_string(),
                export_directory: Some(PathBuf::from("/var/lib/archivist")),
            }
        );
    }

    #[test]
    fn completes_defaults() {
        let config = Config::from_yaml("clusters:\n- name: test cluster\n").expect("valid config");

        assert_eq!(config.log_level, "info");
        assert_eq!(config.archive_ttl, K8sDuration::from_days(60));
        assert_eq!(config.monitor_check_interval, K8sDuration::from_hours(24));
        assert_eq!(config.backup_namespace, "heptio-ark");
        assert_eq!(config.export_directory, None);
        assert!(!config.dry_run);
        assert!(!config.delete_archived_namespaces);

        let cluster = &config.clusters[0];
        assert_eq!(cluster.namespace_capacity, NamespaceCapacity::default());
        assert_eq!(cluster.min_inactive_duration, K8sDuration::from_days(30));
        assert_eq!(cluster.max_inactive_duration, K8sDuration::from_days(90));
        assert_eq!(
            cluster.protected_namespaces,
            vec!["default".to_string(), "openshift-infra".to_string()]
        );
    }

    #[test]
    fn local_config() {
        let config = Config::local();
        assert!(config.validate().is_ok());
        assert_eq!(config.clusters.len(), 1);
        assert_eq!(config.clusters[0].name, "local cluster");
        assert_eq!(config.log_directive(), "namespace_archivist=info,warn");
    }

    #[test]
    fn rejects_invalid_configs() {
        assert!(matches!(
            Config::from_yaml("logLevel: info"),
            Err(ConfigError::NoClusters)
        ));
        assert!(matches!(
            Config::from_yaml("clusters:\n- namespaceCapacity:\n    highWatermark: 10\n"),
            Err(ConfigError::UnnamedCluster)
        ));
        assert!(matches!(
            Config::from_yaml(
                "clusters:\n- name: c\n  minInactiveDuration: 60d\n  maxInactiveDuration: 30d\n"
            ),
            Err(ConfigError::InactiveDurations { .. })
        ));
        assert!(matches!(
            Config::from_yaml("clusters:\n- name: c\n  minInactiveDuration: 30x\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn selects_cluster() {
        let config = Config::from_yaml(
            r#"
clusters:
- name: east
  namespaceCapacity: { highWatermark: 10, lowWatermark: 5 }
- name: west
  protectedNamespaces: [kube-system]
dryRun: true
"#,
        )
        .expect("valid config");

        assert_eq!(config.cluster(None).expect("default").name, "east");
        let west = config.cluster(Some("west")).expect("west");
        assert!(matches!(
            config.cluster(Some("north")),
            Err(ConfigError::UnknownCluster(_))
        ));

        let policy = config.capacity_policy(west);
        assert!(policy.dry_run);
        assert!(policy.is_protected("kube-system"));
        assert!(!policy.is_protected("default"));
        assert_eq!(policy.max_inactive, K8sDuration::from_days(90).as_duration());
        assert_eq!(policy.archive_ttl, K8sDuration::from_days(60).as_duration());
    }
}
