use chrono::{DateTime, Utc};
use namespace_archivist_core::{CapacityPolicy, Plan, Tier};
use namespace_archivist_k8s_archive::{ArchiveExecutor, BackupService, NamespaceService};
use namespace_archivist_k8s_index::ActivityIndex;
use namespace_archivist_k8s_transfer::ResourceCatalog;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, info_span, warn, Instrument};

/// Periodically plans evictions and archives the selected namespaces.
pub struct Monitor<C, B, N> {
    policy: Arc<CapacityPolicy>,
    index: ActivityIndex,
    executor: Arc<ArchiveExecutor<C, B, N>>,
    metrics: MonitorMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct MonitorMetrics {
    cycles: Counter,
    skipped_cycles: Counter,
    failed_cycles: Counter,
    candidates: Family<TierLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct TierLabels {
    tier: &'static str,
}

// === impl Monitor ===

impl<C, B, N> Monitor<C, B, N>
where
    C: ResourceCatalog + 'static,
    B: BackupService + 'static,
    N: NamespaceService + 'static,
{
    pub fn new(
        policy: Arc<CapacityPolicy>,
        index: ActivityIndex,
        executor: Arc<ArchiveExecutor<C, B, N>>,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            policy,
            index,
            executor,
            metrics,
        }
    }

    /// Checks capacity immediately and then every `interval` until shutdown.
    ///
    /// A check that is still running when the next one is due causes that one to be skipped. On
    /// shutdown, the running check (including its archive operations) is allowed to complete.
    pub async fn run(self, interval: Duration, shutdown: drain::Watch) {
        let this = Arc::new(self);
        let mut timer = time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut running: Option<JoinHandle<()>> = None;
        let signaled = shutdown.signaled();
        tokio::pin!(signaled);
        loop {
            tokio::select! {
                release = &mut signaled => {
                    info!("Stopping capacity checks");
                    if let Some(check) = running.take() {
                        let _ = release.release_after(check).await;
                    }
                    return;
                }
                _ = timer.tick() => {
                    if running.as_ref().map_or(false, |check| !check.is_finished()) {
                        info!("Previous capacity check still running, skipping");
                        this.metrics.skipped_cycles.inc();
                        continue;
                    }
                    let monitor = this.clone();
                    running = Some(tokio::spawn(
                        async move { monitor.check_capacity(Utc::now()).await }
                            .instrument(info_span!("check")),
                    ));
                }
            }
        }
    }

    /// Plans a cycle and archives every candidate, waiting for all archive requests to finish.
    pub async fn check_capacity(&self, now: DateTime<Utc>) {
        info!(%now, "Checking cluster capacity");
        self.metrics.cycles.inc();

        let snapshot = self.index.snapshot();
        let plan = match self.policy.plan(&snapshot, now) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(%error, "Failed to plan namespace archival");
                self.metrics.failed_cycles.inc();
                return;
            }
        };
        self.metrics.record(&plan);

        let archives = plan
            .candidates
            .into_iter()
            .map(|candidate| {
                let executor = self.executor.clone();
                let namespace = candidate.namespace;
                let span = info_span!("archive", namespace = %namespace.name);
                tokio::spawn(
                    async move {
                        match executor.archive(&namespace, now).await {
                            Ok(state) => debug!(?state, "Archive step finished"),
                            Err(error) => warn!(%error, "Failed to archive namespace"),
                        }
                    }
                    .instrument(span),
                )
            })
            .collect::<Vec<_>>();
        for archive in archives {
            if let Err(error) = archive.await {
                warn!(%error, "Archive task failed");
            }
        }
    }
}

// === impl MonitorMetrics ===

impl MonitorMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "cycles",
            "Total number of capacity checks",
            metrics.cycles.clone(),
        );
        reg.register(
            "skipped_cycles",
            "Total number of capacity checks skipped because the previous check was still running",
            metrics.skipped_cycles.clone(),
        );
        reg.register(
            "failed_cycles",
            "Total number of capacity checks abandoned because activity could not be resolved",
            metrics.failed_cycles.clone(),
        );
        reg.register(
            "candidates",
            "Total number of namespaces selected for archival",
            metrics.candidates.clone(),
        );
        metrics
    }

    fn record(&self, plan: &Plan) {
        for candidate in &plan.candidates {
            let tier = match candidate.tier {
                Tier::VeryInactive => "very_inactive",
                Tier::SomewhatInactive => "somewhat_inactive",
            };
            self.candidates.get_or_create(&TierLabels { tier }).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kubert::index::IndexClusterResource;
    use maplit::btreemap;
    use namespace_archivist_k8s_api::{self as k8s, Backup, ResourceExt, Time};
    use namespace_archivist_k8s_archive::{ArchiveMetrics, ArchiveState};
    use namespace_archivist_k8s_transfer::{
        memory::MemoryCatalog, Exporter, KindRegistry, NamespaceLocks,
    };
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Backups(Arc<Mutex<Vec<String>>>);

    #[derive(Clone, Default)]
    struct Namespaces;

    type TestMonitor = Monitor<MemoryCatalog, Backups, Namespaces>;

    #[async_trait::async_trait]
    impl BackupService for Backups {
        async fn create(&self, backup: &Backup) -> Result<Backup, kube::Error> {
            self.0.lock().expect("poisoned").push(backup.name_any());
            Ok(backup.clone())
        }
    }

    #[async_trait::async_trait]
    impl NamespaceService for Namespaces {
        async fn delete(&self, _: &str) -> Result<(), kube::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn archives_planned_namespaces() {
        let catalog = MemoryCatalog::default()
            .with_namespace("stale")
            .with_namespace("fresh")
            .with_namespace("default");
        let index = ActivityIndex::default();
        {
            let mut namespaces = index.namespaces().write();
            namespaces.apply(mk_namespace("stale", tm(2016, 1, 1)));
            namespaces.apply(mk_namespace("fresh", tm(2017, 5, 1)));
            namespaces.apply(mk_namespace("default", tm(2015, 1, 1)));
        }
        let (monitor, backups) = mk_monitor(catalog, index, false);

        monitor.check_capacity(tm(2017, 5, 29)).await;

        assert_eq!(
            *backups.0.lock().expect("poisoned"),
            vec!["stale-20170529000000".to_string()]
        );
        assert_eq!(
            monitor.executor.state("stale"),
            Some(ArchiveState::BackupRequested)
        );
        assert_eq!(monitor.executor.state("fresh"), None);
        assert_eq!(monitor.executor.state("default"), None);
        assert_eq!(monitor.metrics.cycles.get(), 1);
        assert_eq!(
            monitor
                .metrics
                .candidates
                .get_or_create(&TierLabels {
                    tier: "very_inactive"
                })
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn dry_run_requests_nothing() {
        let catalog = MemoryCatalog::default().with_namespace("stale");
        let index = ActivityIndex::default();
        index
            .namespaces()
            .write()
            .apply(mk_namespace("stale", tm(2016, 1, 1)));
        let (monitor, backups) = mk_monitor(catalog.clone(), index, true);

        monitor.check_capacity(tm(2017, 5, 29)).await;

        assert!(backups.0.lock().expect("poisoned").is_empty());
        assert!(catalog.calls().is_empty());
        assert_eq!(
            monitor.executor.state("stale"),
            Some(ArchiveState::DryRunSkipped)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_shutdown() {
        let (monitor, _) = mk_monitor(MemoryCatalog::default(), ActivityIndex::default(), false);
        let metrics = monitor.metrics.clone();
        let (signal, watch) = drain::channel();

        let task = tokio::spawn(monitor.run(Duration::from_secs(60), watch));
        time::sleep(Duration::from_secs(150)).await;
        signal.drain().await;
        task.await.expect("monitor must not panic");

        assert_eq!(metrics.cycles.get(), 3);
        assert_eq!(metrics.skipped_cycles.get(), 0);
    }

    fn mk_monitor(
        catalog: MemoryCatalog,
        index: ActivityIndex,
        dry_run: bool,
    ) -> (TestMonitor, Backups) {
        let policy = Arc::new(CapacityPolicy {
            high_watermark: 10,
            low_watermark: 5,
            min_inactive: Duration::from_secs(30 * 86_400),
            max_inactive: Duration::from_secs(90 * 86_400),
            protected_namespaces: ["default".to_string()].into_iter().collect(),
            dry_run,
            delete_archived_namespaces: true,
            archive_ttl: Duration::from_secs(60 * 86_400),
        });
        let backups = Backups::default();
        let executor = Arc::new(ArchiveExecutor::new(
            policy.clone(),
            Exporter::new(catalog, KindRegistry::openshift(), NamespaceLocks::default()),
            backups.clone(),
            Namespaces,
            ArchiveMetrics::default(),
        ));
        let monitor = Monitor::new(policy, index, executor, MonitorMetrics::default());
        (monitor, backups)
    }

    fn mk_namespace(name: &str, created: DateTime<Utc>) -> k8s::Namespace {
        k8s::Namespace {
            metadata: k8s::ObjectMeta {
                name: Some(name.to_string()),
                creation_timestamp: Some(Time(created)),
                annotations: Some(btreemap! {
                    k8s::REQUESTER_ANNOTATION.to_string() => "alice".to_string(),
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn tm(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .expect("valid time")
    }
}
