use super::*;
use chrono::TimeZone;
use futures::prelude::*;
use kubert::index::{IndexClusterResource, IndexNamespacedResource};
use maplit::btreemap;
use namespace_archivist_k8s_api::{
    self as k8s, watcher, BuildSpec, BuildStatus, ObjectMeta, Time, REQUESTER_ANNOTATION,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn tm(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

fn mk_namespace(name: &str, created: DateTime<Utc>) -> k8s::Namespace {
    k8s::Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            creation_timestamp: Some(Time(created)),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn mk_build(ns: &str, name: &str, started: Option<DateTime<Utc>>) -> Build {
    let mut build = Build::new(name, BuildSpec::default());
    build.metadata.namespace = Some(ns.to_string());
    build.status = Some(BuildStatus {
        phase: Some("Complete".to_string()),
        start_timestamp: started.map(Time),
        completion_timestamp: None,
    });
    build
}

fn mk_rc(ns: &str, name: &str, created: Option<DateTime<Utc>>) -> ReplicationController {
    ReplicationController {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            creation_timestamp: created.map(Time),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn mk_index() -> ActivityIndex {
    let index = ActivityIndex::default();
    index
        .namespaces()
        .write()
        .apply(mk_namespace("ns", tm(2016, 1, 1)));
    index
}

#[test]
fn latest_build_or_rc_wins() {
    let index = mk_index();
    index
        .builds()
        .write()
        .apply(mk_build("ns", "b1", Some(tm(2016, 11, 1))));
    index
        .builds()
        .write()
        .apply(mk_build("ns", "b2", Some(tm(2017, 5, 19))));
    index
        .replication_controllers()
        .write()
        .apply(mk_rc("ns", "rc1", Some(tm(2017, 1, 1))));

    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2017, 5, 19)));
}

#[test]
fn rc_newer_than_builds() {
    let index = mk_index();
    index
        .builds()
        .write()
        .apply(mk_build("ns", "b1", Some(tm(2016, 11, 1))));
    index
        .replication_controllers()
        .write()
        .apply(mk_rc("ns", "rc1", Some(tm(2017, 11, 19))));

    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2017, 11, 19)));
}

#[test]
fn falls_back_to_namespace_creation() {
    let index = mk_index();
    // Samples in other namespaces have no bearing.
    index
        .builds()
        .write()
        .apply(mk_build("other", "b1", Some(tm(2017, 5, 19))));

    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2016, 1, 1)));
}

#[test]
fn unstarted_builds_and_unset_rc_times_are_ignored() {
    let index = mk_index();
    index.builds().write().apply(mk_build("ns", "pending", None));
    index
        .replication_controllers()
        .write()
        .apply(mk_rc("ns", "rc0", None));
    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2016, 1, 1)));

    index
        .replication_controllers()
        .write()
        .apply(mk_rc("ns", "rc1", Some(tm(2017, 2, 1))));
    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2017, 2, 1)));
    assert_eq!(index.builds().read().len(), 1);
}

#[test]
fn unknown_namespace() {
    let index = mk_index();
    assert_eq!(
        index.last_activity("missing"),
        Err(ActivityError::NotFound("missing".to_string()))
    );
}

#[test]
fn unknown_creation_time() {
    let index = ActivityIndex::default();
    let mut ns = mk_namespace("ns", tm(2016, 1, 1));
    ns.metadata.creation_timestamp = None;
    index.namespaces().write().apply(ns);

    assert_eq!(index.last_activity("ns").unwrap(), None);
}

#[test]
fn deletes_retract_samples() {
    let index = mk_index();
    index
        .builds()
        .write()
        .apply(mk_build("ns", "b1", Some(tm(2017, 5, 19))));
    index
        .builds()
        .write()
        .delete("ns".to_string(), "b1".to_string());
    assert!(index.builds().read().is_empty());
    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2016, 1, 1)));

    index.namespaces().write().delete("ns".to_string());
    assert!(index.last_activity("ns").is_err());
}

#[test]
fn namespace_requester() {
    let index = ActivityIndex::default();
    let mut ns = mk_namespace("ns", tm(2016, 1, 1));
    ns.metadata.annotations = Some(btreemap! {
        REQUESTER_ANNOTATION.to_string() => "alice".to_string(),
    });
    index.namespaces().write().apply(ns);
    index
        .namespaces()
        .write()
        .apply(mk_namespace("anonymous", tm(2016, 1, 1)));

    let namespaces = index.namespaces().read();
    assert_eq!(
        namespaces.get("ns").and_then(|ns| ns.requester.as_deref()),
        Some("alice")
    );
    assert_eq!(
        namespaces
            .get("anonymous")
            .and_then(|ns| ns.requester.as_deref()),
        None
    );
}

#[test]
fn snapshot_is_point_in_time() {
    let index = mk_index();
    index
        .namespaces()
        .write()
        .apply(mk_namespace("other", tm(2015, 6, 1)));
    index
        .builds()
        .write()
        .apply(mk_build("ns", "b1", Some(tm(2017, 5, 19))));

    let snapshot = index.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot.last_activity("ns").unwrap(),
        index.last_activity("ns").unwrap()
    );

    index
        .builds()
        .write()
        .apply(mk_build("ns", "b2", Some(tm(2017, 6, 1))));
    index.namespaces().write().delete("other".to_string());

    assert_eq!(snapshot.last_activity("ns").unwrap(), Some(tm(2017, 5, 19)));
    assert_eq!(snapshot.last_activity("other").unwrap(), Some(tm(2015, 6, 1)));
    assert_eq!(index.last_activity("ns").unwrap(), Some(tm(2017, 6, 1)));
    assert_eq!(index.snapshot(), index.snapshot());
}

#[test]
fn planning_against_snapshot_is_stable() {
    let index = ActivityIndex::default();
    for (name, created) in [
        ("a", tm(2017, 4, 20)),
        ("b", tm(2017, 4, 20)),
        ("c", tm(2017, 4, 20)),
        ("d", tm(2017, 5, 28)),
    ] {
        index
            .namespaces()
            .write()
            .apply(mk_namespace(name, created));
    }

    let policy = namespace_archivist_core::CapacityPolicy {
        high_watermark: 4,
        low_watermark: 2,
        min_inactive: Duration::from_secs(30 * 24 * 60 * 60),
        max_inactive: Duration::from_secs(60 * 24 * 60 * 60),
        ..Default::default()
    };
    let snapshot = index.snapshot();
    let first = policy.plan(&snapshot, tm(2017, 5, 29)).unwrap();
    let second = policy.plan(&snapshot, tm(2017, 5, 29)).unwrap();
    assert_eq!(first.names().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn tracks_initial_sync() {
    let events = stream::iter(vec![
        watcher::Event::Restarted(vec![mk_namespace("ns", tm(2016, 1, 1))]),
        watcher::Event::Applied(mk_namespace("other", tm(2016, 1, 1))),
    ]);
    let (events, synced) = track("namespaces", events);
    assert!(!synced.is_synced());

    let events = events.collect::<Vec<_>>().await;
    assert_eq!(events.len(), 2);
    assert!(synced.is_synced());
    wait_all(vec![synced], Duration::from_secs(1))
        .await
        .expect("must be synced");
}

#[tokio::test(start_paused = true)]
async fn sync_timeout_names_pending_watches() {
    let (_namespaces, namespaces_synced) = track(
        "namespaces",
        stream::pending::<watcher::Event<k8s::Namespace>>(),
    );
    let (builds, builds_synced) = track(
        "builds",
        stream::iter(vec![watcher::Event::<Build>::Restarted(vec![])]),
    );
    builds.for_each(|_| future::ready(())).await;

    let error = wait_all(
        vec![namespaces_synced, builds_synced],
        Duration::from_secs(5 * 60),
    )
    .await
    .expect_err("must time out");
    match error {
        SyncError::Timeout { pending, .. } => assert_eq!(pending, ["namespaces"]),
        error => panic!("unexpected error: {error}"),
    }
}

#[tokio::test]
async fn closed_watch_fails_sync() {
    let (events, synced) = track(
        "replicationcontrollers",
        stream::empty::<watcher::Event<ReplicationController>>(),
    );
    drop(events);

    let error = synced.wait().await.expect_err("must fail");
    assert!(matches!(error, SyncError::Closed("replicationcontrollers")));
}
