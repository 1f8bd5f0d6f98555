use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ArchiveMetrics {
    dry_runs: Counter,
    backups_requested: Counter,
    backups_completed: Counter,
    namespaces_deleted: Counter,
    failures: Family<FailureLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct FailureLabels {
    reason: &'static str,
}

// === impl ArchiveMetrics ===

impl ArchiveMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "dry_runs",
            "Total number of namespaces that would have been archived in dry-run mode",
            metrics.dry_runs.clone(),
        );
        reg.register(
            "backups_requested",
            "Total number of backups requested",
            metrics.backups_requested.clone(),
        );
        reg.register(
            "backups_completed",
            "Total number of backups reported as completed",
            metrics.backups_completed.clone(),
        );
        reg.register(
            "namespaces_deleted",
            "Total number of namespaces deleted after being archived",
            metrics.namespaces_deleted.clone(),
        );
        reg.register(
            "failures",
            "Total number of failed archive operations",
            metrics.failures.clone(),
        );
        metrics
    }

    pub(crate) fn dry_run(&self) {
        self.dry_runs.inc();
    }

    pub(crate) fn backup_requested(&self) {
        self.backups_requested.inc();
    }

    pub(crate) fn backup_completed(&self) {
        self.backups_completed.inc();
    }

    pub(crate) fn namespace_deleted(&self) {
        self.namespaces_deleted.inc();
    }

    pub(crate) fn failed(&self, reason: &'static str) {
        self.failures.get_or_create(&FailureLabels { reason }).inc();
    }

    pub fn backups_requested(&self) -> u64 {
        self.backups_requested.get()
    }

    pub fn namespaces_deleted(&self) -> u64 {
        self.namespaces_deleted.get()
    }

    pub fn failures(&self, reason: &'static str) -> u64 {
        self.failures.get_or_create(&FailureLabels { reason }).get()
    }
}
