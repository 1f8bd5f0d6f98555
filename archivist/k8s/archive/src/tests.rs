use crate::{
    backup_record, ArchiveExecutor, ArchiveMetrics, ArchiveState, BackupService, Completions,
    Error, NamespaceService,
};
use chrono::{DateTime, TimeZone, Utc};
use maplit::btreemap;
use namespace_archivist_core::{CapacityPolicy, Namespace};
use namespace_archivist_k8s_api::{
    watcher, Backup, BackupPhase, BackupStatus, K8sDuration, ResourceExt,
};
use namespace_archivist_k8s_transfer::{
    memory::MemoryCatalog, Exporter, KindRegistry, NamespaceLocks,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};

type Executor = ArchiveExecutor<MemoryCatalog, RecordingBackups, RecordingNamespaces>;

#[derive(Clone, Default)]
struct RecordingBackups {
    created: Arc<Mutex<Vec<Backup>>>,
    fail: Arc<Mutex<bool>>,
}

#[derive(Clone, Default)]
struct RecordingNamespaces {
    deleted: Arc<Mutex<Vec<String>>>,
}

struct Harness {
    catalog: MemoryCatalog,
    backups: RecordingBackups,
    namespaces: RecordingNamespaces,
    metrics: ArchiveMetrics,
    executor: Arc<Executor>,
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let h = Harness::new(CapacityPolicy {
        dry_run: true,
        ..policy()
    });

    let state = h
        .executor
        .archive(&Namespace::new("demo"), check_time())
        .await
        .expect("dry run must succeed");
    assert_eq!(state, ArchiveState::DryRunSkipped);
    assert_eq!(h.executor.state("demo"), Some(ArchiveState::DryRunSkipped));
    assert!(h.backups.created.lock().is_empty());
    assert!(h.namespaces.deleted.lock().is_empty());
    assert!(h.catalog.calls().is_empty());
}

#[tokio::test]
async fn requests_backup() {
    let h = Harness::new(policy());

    let state = h
        .executor
        .archive(&demo(), check_time())
        .await
        .expect("archive");
    assert_eq!(state, ArchiveState::BackupRequested);
    assert_eq!(h.metrics.backups_requested(), 1);

    let created = h.backups.created.lock().clone();
    assert_eq!(created.len(), 1);
    let backup = &created[0];
    assert_eq!(backup.name_any(), "demo-20170529093000");
    assert_eq!(
        backup.labels().clone(),
        btreemap! { "archived-namespace".to_string() => "demo".to_string() }
    );
    assert_eq!(
        backup.annotations().clone(),
        btreemap! { "openshift.io/requester".to_string() => "alice".to_string() }
    );
    assert!(h.namespaces.deleted.lock().is_empty());
}

#[tokio::test]
async fn pending_archives_are_not_resubmitted() {
    let h = Harness::new(policy());

    h.executor
        .archive(&demo(), check_time())
        .await
        .expect("archive");
    let later = check_time() + chrono::Duration::days(1);
    let state = h.executor.archive(&demo(), later).await.expect("archive");
    assert_eq!(state, ArchiveState::BackupRequested);
    assert_eq!(h.backups.created.lock().len(), 1);
}

#[tokio::test]
async fn requires_attribution() {
    let h = Harness::new(policy());

    let error = h
        .executor
        .archive(&Namespace::new("demo"), check_time())
        .await
        .expect_err("must fail");
    assert!(matches!(error, Error::MissingAttribution(ns) if ns == "demo"));
    assert_eq!(h.executor.state("demo"), Some(ArchiveState::Failed));
    assert_eq!(h.metrics.failures("missing_attribution"), 1);
    assert!(h.backups.created.lock().is_empty());
}

#[tokio::test]
async fn export_failure_aborts_archive() {
    let h = Harness::new(policy());

    let error = h
        .executor
        .archive(
            &Namespace::new("gone").with_requester("alice"),
            check_time(),
        )
        .await
        .expect_err("must fail");
    assert!(matches!(error, Error::Export { .. }));
    assert!(h.backups.created.lock().is_empty());
}

#[tokio::test]
async fn failed_backups_are_retried_next_cycle() {
    let h = Harness::new(policy());
    *h.backups.fail.lock() = true;

    let error = h
        .executor
        .archive(&demo(), check_time())
        .await
        .expect_err("must fail");
    assert!(matches!(error, Error::Backup { .. }));
    assert_eq!(h.executor.state("demo"), Some(ArchiveState::Failed));
    assert_eq!(h.metrics.failures("backup"), 1);

    *h.backups.fail.lock() = false;
    let state = h
        .executor
        .archive(&demo(), check_time())
        .await
        .expect("archive");
    assert_eq!(state, ArchiveState::BackupRequested);
    assert_eq!(h.backups.created.lock().len(), 1);
}

#[tokio::test]
async fn completion_deletes_namespace_once() {
    let h = Harness::new(policy());
    h.executor
        .archive(&demo(), check_time())
        .await
        .expect("archive");

    let events = vec![
        watcher::Event::Restarted(vec![
            mk_backup("old", "old-20170101000000", BackupPhase::Completed),
            mk_backup("demo", "demo-20170529093000", BackupPhase::New),
        ]),
        watcher::Event::Applied(mk_backup(
            "demo",
            "demo-20170529093000",
            BackupPhase::InProgress,
        )),
        watcher::Event::Applied(mk_backup(
            "demo",
            "demo-20170529093000",
            BackupPhase::Completed,
        )),
        watcher::Event::Applied(mk_backup(
            "demo",
            "demo-20170529093000",
            BackupPhase::Completed,
        )),
    ];
    Completions::new(h.executor.clone())
        .run(futures::stream::iter(events))
        .await;

    assert_eq!(*h.namespaces.deleted.lock(), vec!["demo".to_string()]);
    assert_eq!(h.executor.state("demo"), None);
    assert_eq!(h.metrics.namespaces_deleted(), 1);
}

#[tokio::test]
async fn dry_run_never_deletes_on_completion() {
    let h = Harness::new(CapacityPolicy {
        dry_run: true,
        ..policy()
    });

    let events = vec![
        watcher::Event::Restarted(vec![mk_backup(
            "demo",
            "demo-20170529093000",
            BackupPhase::InProgress,
        )]),
        watcher::Event::Applied(mk_backup(
            "demo",
            "demo-20170529093000",
            BackupPhase::Completed,
        )),
    ];
    Completions::new(h.executor.clone())
        .run(futures::stream::iter(events))
        .await;

    assert!(h.namespaces.deleted.lock().is_empty());
    assert_eq!(h.executor.state("demo"), Some(ArchiveState::DeletionSkipped));
    assert_eq!(h.metrics.namespaces_deleted(), 0);
}

#[tokio::test]
async fn deleted_namespaces_are_forgotten() {
    let h = Harness::new(policy());
    h.executor
        .archive(&demo(), check_time())
        .await
        .expect("archive");
    assert_eq!(h.executor.state("demo"), Some(ArchiveState::BackupRequested));

    let state = h
        .executor
        .completed("demo", "demo-20170529093000")
        .await
        .expect("completion");
    assert_eq!(state, ArchiveState::Deleted);
    assert_eq!(h.executor.state("demo"), None);

    // A namespace recreated under the same name is archived afresh.
    let later = check_time() + chrono::Duration::days(90);
    let state = h.executor.archive(&demo(), later).await.expect("archive");
    assert_eq!(state, ArchiveState::BackupRequested);
    assert_eq!(h.backups.created.lock().len(), 2);
}

#[tokio::test]
async fn completions_after_relist_are_handled() {
    let h = Harness::new(policy());

    let events = vec![
        watcher::Event::Restarted(vec![]),
        watcher::Event::Restarted(vec![mk_backup(
            "demo",
            "demo-20170529093000",
            BackupPhase::Completed,
        )]),
    ];
    Completions::new(h.executor.clone())
        .run(futures::stream::iter(events))
        .await;

    assert_eq!(*h.namespaces.deleted.lock(), vec!["demo".to_string()]);
}

#[tokio::test]
async fn deletion_can_be_disabled() {
    let h = Harness::new(CapacityPolicy {
        delete_archived_namespaces: false,
        ..policy()
    });

    let state = h
        .executor
        .completed("demo", "demo-20170529093000")
        .await
        .expect("completion");
    assert_eq!(state, ArchiveState::DeletionSkipped);
    assert!(h.namespaces.deleted.lock().is_empty());
}

#[tokio::test]
async fn writes_export_documents() {
    let dir = std::env::temp_dir().join(format!("archivist-export-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create export directory");

    let h = Harness::new(policy());
    let executor = Executor::new(
        Arc::new(policy()),
        Exporter::new(
            h.catalog.clone(),
            KindRegistry::openshift(),
            NamespaceLocks::default(),
        ),
        h.backups.clone(),
        h.namespaces.clone(),
        ArchiveMetrics::default(),
    )
    .with_export_directory(&dir);

    executor
        .archive(&demo(), check_time())
        .await
        .expect("archive");

    let path = dir.join("demo-20170529093000.yaml");
    let yaml = std::fs::read_to_string(&path).expect("export written");
    assert!(yaml.contains("kind: List"), "{yaml}");
    std::fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn backup_record_describes_namespace() {
    let backup = backup_record("demo", "alice", check_time(), Duration::from_secs(60 * 86_400));

    assert_eq!(backup.name_any(), "demo-20170529093000");
    assert_eq!(backup.spec.included_namespaces, vec!["demo".to_string()]);
    assert_eq!(
        backup.spec.excluded_resources,
        vec!["projectrequests.project.openshift.io".to_string()]
    );
    assert_eq!(backup.spec.snapshot_volumes, Some(true));
    assert_eq!(backup.spec.ttl, Some(K8sDuration::from_days(60)));
    assert_eq!(
        serde_json::to_value(&backup.spec).expect("serialize")["ttl"],
        "1440h0m0s"
    );
}

// === helpers ===

impl Harness {
    fn new(policy: CapacityPolicy) -> Self {
        let catalog = MemoryCatalog::default().with_namespace("demo");
        let backups = RecordingBackups::default();
        let namespaces = RecordingNamespaces::default();
        let metrics = ArchiveMetrics::default();
        let executor = Arc::new(ArchiveExecutor::new(
            Arc::new(policy),
            Exporter::new(
                catalog.clone(),
                KindRegistry::openshift(),
                NamespaceLocks::default(),
            ),
            backups.clone(),
            namespaces.clone(),
            metrics.clone(),
        ));
        Self {
            catalog,
            backups,
            namespaces,
            metrics,
            executor,
        }
    }
}

#[async_trait::async_trait]
impl BackupService for RecordingBackups {
    async fn create(&self, backup: &Backup) -> Result<Backup, kube::Error> {
        if *self.fail.lock() {
            return Err(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "backup service unavailable".to_string(),
                reason: "ServiceUnavailable".to_string(),
                code: 503,
            }));
        }
        self.created.lock().push(backup.clone());
        Ok(backup.clone())
    }
}

#[async_trait::async_trait]
impl NamespaceService for RecordingNamespaces {
    async fn delete(&self, namespace: &str) -> Result<(), kube::Error> {
        self.deleted.lock().push(namespace.to_string());
        Ok(())
    }
}

fn policy() -> CapacityPolicy {
    CapacityPolicy {
        delete_archived_namespaces: true,
        archive_ttl: Duration::from_secs(60 * 86_400),
        ..Default::default()
    }
}

fn check_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 5, 29, 9, 30, 0)
        .single()
        .expect("valid time")
}

fn demo() -> Namespace {
    Namespace::new("demo").with_requester("alice")
}

fn mk_backup(namespace: &str, name: &str, phase: BackupPhase) -> Backup {
    let mut backup = backup_record(namespace, "alice", check_time(), Duration::ZERO);
    backup.metadata.name = Some(name.to_string());
    backup.status = Some(BackupStatus {
        phase: Some(phase),
        ..Default::default()
    });
    backup
}
