use crate::{
    archive::{ArchiveExecutor, ArchiveMetrics, Completions, KubeBackups, KubeNamespaces},
    config::Config,
    index::{self, ActivityIndex},
    k8s::{self, watcher, Client},
    monitor::{Monitor, MonitorMetrics},
    transfer::{ClusterCatalog, ExportDocument, Exporter, Importer, KindRegistry, NamespaceLocks},
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prometheus_client::registry::Registry;
use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, info_span, Instrument};

/// Watch caches that have not synced by then are considered broken.
const SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Parser)]
#[clap(name = "namespace-archivist", about = "Archives inactive namespaces")]
pub struct Args {
    /// Defaults to the configured `logLevel`.
    #[clap(long, env = "ARCHIVIST_LOG")]
    log_level: Option<kubert::LogFilter>,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Path to the archivist configuration file.
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Monitors cluster capacity and archives inactive namespaces.
    Monitor {
        #[clap(flatten)]
        admin: kubert::AdminArgs,

        /// The configured cluster to manage. Defaults to the first one.
        #[clap(long)]
        cluster_name: Option<String>,
    },

    /// Exports the resources of a namespace as YAML.
    Export {
        #[clap(long)]
        namespace: String,

        /// Writes to standard output if unset.
        #[clap(long)]
        output: Option<PathBuf>,
    },

    /// Imports an exported document into a namespace.
    Import {
        #[clap(long)]
        namespace: String,

        #[clap(long)]
        input: PathBuf,
    },
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            config,
            command,
        } = self;

        // Configuration errors are fatal before anything else starts.
        let config = Config::load(config.as_deref()).await?;
        let log_level = match log_level {
            Some(log_level) => log_level,
            None => config.log_directive().parse()?,
        };

        match command {
            Command::Monitor {
                admin,
                cluster_name,
            } => {
                monitor(
                    config,
                    cluster_name,
                    log_level,
                    log_format,
                    client,
                    admin,
                )
                .await
            }
            Command::Export { namespace, output } => {
                log_format.try_init(log_level)?;
                let client = client.try_client().await?;
                export(client, &namespace, output).await
            }
            Command::Import { namespace, input } => {
                log_format.try_init(log_level)?;
                let client = client.try_client().await?;
                import(client, &namespace, input).await
            }
        }
    }
}

async fn monitor(
    config: Config,
    cluster_name: Option<String>,
    log_level: kubert::LogFilter,
    log_format: kubert::LogFormat,
    client: kubert::ClientArgs,
    admin: kubert::AdminArgs,
) -> Result<()> {
    let cluster = config.cluster(cluster_name.as_deref())?;
    let policy = Arc::new(config.capacity_policy(cluster));

    let index = ActivityIndex::default();
    let mut prom = <Registry>::default();
    index::metrics::register(
        prom.sub_registry_with_prefix("activity_index"),
        index.clone(),
    );
    let archive_metrics = ArchiveMetrics::register(prom.sub_registry_with_prefix("archive"));
    let monitor_metrics = MonitorMetrics::register(prom.sub_registry_with_prefix("monitor"));

    let mut runtime = kubert::Runtime::builder()
        .with_log(log_level, log_format)
        .with_admin(admin.into_builder().with_prometheus(prom))
        .with_client(client)
        .build()
        .await?;
    info!(cluster = %cluster.name, dry_run = policy.dry_run, "Starting namespace archivist");

    // Spawn resource watches.

    let (namespaces, namespaces_synced) = index::track(
        "namespaces",
        runtime.watch_all::<k8s::Namespace>(watcher::Config::default()),
    );
    tokio::spawn(
        kubert::index::cluster(index.namespaces().clone(), namespaces)
            .instrument(info_span!("namespaces")),
    );

    let (builds, builds_synced) = index::track(
        "builds",
        runtime.watch_all::<k8s::Build>(watcher::Config::default()),
    );
    tokio::spawn(
        kubert::index::namespaced(index.builds().clone(), builds).instrument(info_span!("builds")),
    );

    let (rcs, rcs_synced) = index::track(
        "replicationcontrollers",
        runtime.watch_all::<k8s::ReplicationController>(watcher::Config::default()),
    );
    tokio::spawn(
        kubert::index::namespaced(index.replication_controllers().clone(), rcs)
            .instrument(info_span!("replicationcontrollers")),
    );

    let client = runtime.client();
    let exporter = Exporter::new(
        ClusterCatalog::new(client.clone()),
        KindRegistry::openshift(),
        NamespaceLocks::default(),
    );
    let mut executor = ArchiveExecutor::new(
        policy.clone(),
        exporter,
        KubeBackups::new(client.clone(), &config.backup_namespace),
        KubeNamespaces::new(client),
        archive_metrics,
    );
    if let Some(dir) = config.export_directory.clone() {
        executor = executor.with_export_directory(dir);
    }
    let executor = Arc::new(executor);

    let backups = runtime.watch::<k8s::Backup>(
        k8s::Api::namespaced(runtime.client(), &config.backup_namespace),
        watcher::Config::default().labels(k8s::ARCHIVED_NAMESPACE_LABEL),
    );
    tokio::spawn(
        Completions::new(executor.clone())
            .run(backups)
            .instrument(info_span!("backups")),
    );

    // Planning against partially-listed caches would see namespaces without their activity.
    let initialized = runtime.initialized_handle();
    info!("Waiting for caches to sync");
    index::wait_all(vec![namespaces_synced, builds_synced, rcs_synced], SYNC_TIMEOUT).await?;
    info!("Caches synced");
    drop(initialized);

    let monitor = Monitor::new(policy, index, executor, monitor_metrics);
    tokio::spawn(
        monitor
            .run(
                config.monitor_check_interval.as_duration(),
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("monitor")),
    );

    // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
    // complete before exiting.
    if runtime.run().await.is_err() {
        bail!("Aborted");
    }

    Ok(())
}

async fn export(client: Client, namespace: &str, output: Option<PathBuf>) -> Result<()> {
    let exporter = Exporter::new(
        ClusterCatalog::new(client),
        KindRegistry::openshift(),
        NamespaceLocks::default(),
    );
    let document = exporter.export(namespace).await?;
    let yaml = document.to_yaml()?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, yaml)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(%namespace, path = %path.display(), resources = document.len(), "Exported namespace");
        }
        None => std::io::stdout().write_all(yaml.as_bytes())?,
    }
    Ok(())
}

async fn import(client: Client, namespace: &str, input: PathBuf) -> Result<()> {
    let yaml = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let document = ExportDocument::from_yaml(&yaml)
        .with_context(|| format!("failed to parse {}", input.display()))?;

    let importer = Importer::new(
        ClusterCatalog::new(client),
        KindRegistry::openshift(),
        NamespaceLocks::default(),
    );
    let report = importer.import(&document, namespace).await;
    if !report.is_success() {
        for (entry, error) in report.failures() {
            error!(kind = %entry.kind, name = %entry.name, %error, "Failed to import resource");
        }
        bail!(
            "{} of {} resources failed to import into {namespace}",
            report.failures().count(),
            report.entries.len()
        );
    }
    Ok(())
}
