//! Session state machine and full reconfiguration flows against the
//! in-memory switch

use flexpipe_core::graph::{BASE_DEFAULT_NEXT, TRUE_NEXT};
use flexpipe_core::tagger::tag_merged;
use flexpipe_core::{
    FlexName, LoopbackSwitch, MountSlot, PipelineGraph, PipelineJson, ReconfigError, SessionSet,
    SessionState, SwitchSession,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn flex(s: &str) -> FlexName {
    FlexName::parse(s).unwrap()
}

/// Untagged compiled pipeline: A -> B -> sink
fn runtime_pipeline() -> serde_json::Value {
    json!({
        "pipelines": [{
            "name": "ingress",
            "init_table": "A",
            "tables": [
                {"name": "A", "base_default_next": "B", "next_tables": {}}
            ],
            "conditionals": [
                {"name": "B", "true_next": null, "false_next": null, "expression": null}
            ]
        }]
    })
}

/// Untagged compiled splice: a single table X
fn splice_pipeline() -> serde_json::Value {
    json!({
        "pipelines": [{
            "name": "ingress",
            "init_table": "X",
            "tables": [
                {"name": "X", "base_default_next": null, "next_tables": {}}
            ],
            "conditionals": []
        }]
    })
}

fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

fn write_p4info(dir: &Path) -> PathBuf {
    let path = dir.join("program.p4info.txt");
    std::fs::write(&path, b"pkg_info {}").unwrap();
    path
}

/// Tag a splice `new_*` the way the CLI does before install
fn tagged_splice(dir: &Path, name: &str) -> PathBuf {
    let raw = PipelineJson::from_value(splice_pipeline());
    let tagged = tag_merged(&raw).unwrap();
    let path = dir.join(name);
    tagged.save(&path).unwrap();
    path
}

async fn pipelined_session(dir: &Path, name: &str) -> SwitchSession {
    let mut session = SwitchSession::connect(
        name,
        "127.0.0.1:50051",
        0,
        Box::new(LoopbackSwitch::new()),
        &dir.join(name),
    )
    .await
    .unwrap();
    let p4info = write_p4info(dir);
    let bmv2 = write_json(dir, &format!("{name}_bmv2.json"), &runtime_pipeline());
    session
        .set_forwarding_pipeline_config(&p4info, &bmv2)
        .await
        .unwrap();
    session
}

/// Labelled edges between non-reconfiguration nodes, for isomorphism checks
fn stable_edges(graph: &PipelineGraph) -> Vec<(String, String, String)> {
    let mut edges: Vec<_> = graph
        .vertices()
        .flat_map(|v| graph.out_edges(v))
        .filter(|e| {
            let keep = |n: &FlexName| !n.as_str().starts_with("new_") && !n.is_flex_branch();
            keep(e.from) && keep(e.to)
        })
        .map(|e| {
            (
                e.from.as_str().to_string(),
                e.label.to_string(),
                e.to.as_str().to_string(),
            )
        })
        .collect();
    edges.sort();
    edges
}

#[tokio::test]
async fn primitives_are_gated_by_session_state() {
    let dir = TempDir::new().unwrap();
    let mut session = SwitchSession::connect(
        "s1",
        "127.0.0.1:50051",
        0,
        Box::new(LoopbackSwitch::new()),
        dir.path(),
    )
    .await
    .unwrap();
    assert_eq!(session.state(), SessionState::Connected);

    // CONNECTED: nothing is accepted
    let err = session
        .execute_primitive("insert tabl ingress new_X")
        .await
        .unwrap_err();
    assert!(matches!(err, ReconfigError::PreconditionUnmet(_)));

    let p4info = write_p4info(dir.path());
    let bmv2 = write_json(dir.path(), "bmv2.json", &runtime_pipeline());
    session
        .set_forwarding_pipeline_config(&p4info, &bmv2)
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Pipelined);

    // PIPELINED: only init_p4objects_new is accepted
    let err = session
        .execute_primitive("insert tabl ingress new_X")
        .await
        .unwrap_err();
    assert!(matches!(err, ReconfigError::PreconditionUnmet(_)));

    let splice = tagged_splice(dir.path(), "splice.json");
    session.init_staging(&splice).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn second_pipeline_upload_is_refused() {
    let dir = TempDir::new().unwrap();
    let mut session = pipelined_session(dir.path(), "s1").await;
    let p4info = write_p4info(dir.path());
    let bmv2 = write_json(dir.path(), "again.json", &runtime_pipeline());
    let err = session
        .set_forwarding_pipeline_config(&p4info, &bmv2)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconfigError::PreconditionUnmet(_)));
}

#[tokio::test]
async fn pipeline_upload_builds_the_initial_graph() {
    let dir = TempDir::new().unwrap();
    let session = pipelined_session(dir.path(), "s1").await;
    let graph = session.graphs().current().unwrap();
    assert!(graph.contains(&flex("old_tA")));
    assert!(graph.contains(&flex("old_cB")));
    assert_eq!(
        graph.labels_between(&flex("old_tA"), &flex("old_cB")),
        vec![BASE_DEFAULT_NEXT]
    );
    assert!(session.latest_pipeline_json().is_some());
}

#[tokio::test]
async fn install_then_uninstall_restores_the_graph() {
    let dir = TempDir::new().unwrap();
    let mut session = pipelined_session(dir.path(), "s1").await;
    let before = stable_edges(session.graphs().current().unwrap());

    let merged = tagged_splice(dir.path(), "merged.json");
    let slot = MountSlot::new(3).unwrap();
    session
        .install_func(&merged, &flex("old_tA"), &flex("old_cB"), slot)
        .await
        .unwrap();

    // the splice is live: A now feeds the mount branch, which selects X
    let branch = slot.branch_name();
    let graph = session.graphs().current().unwrap();
    assert!(graph.contains(&branch));
    assert!(graph.contains(&flex("new_tX")));
    assert_eq!(
        graph.labels_between(&flex("old_tA"), &branch),
        vec![BASE_DEFAULT_NEXT]
    );
    assert_eq!(
        graph.labels_between(&branch, &flex("new_tX")),
        vec![TRUE_NEXT]
    );

    session.uninstall_func(slot).await.unwrap();
    let graph = session.graphs().current().unwrap();
    assert!(!graph.contains(&branch));
    assert!(!graph.contains(&flex("new_tX")));
    assert_eq!(stable_edges(graph), before);

    // the initial graph is untouched by rebuilds
    assert_eq!(stable_edges(session.graphs().initial().unwrap()), before);

    // a second uninstall has nothing to remove
    let err = session.uninstall_func(slot).await.unwrap_err();
    assert!(matches!(err, ReconfigError::InvalidCommand(_)));
}

#[tokio::test]
async fn install_reuse_of_a_slot_is_refused() {
    let dir = TempDir::new().unwrap();
    let mut session = pipelined_session(dir.path(), "s1").await;
    let merged = tagged_splice(dir.path(), "merged.json");
    let slot = MountSlot::new(7).unwrap();
    session
        .install_func(&merged, &flex("old_tA"), &flex("old_cB"), slot)
        .await
        .unwrap();

    let err = session
        .install_func(&merged, &flex("old_tA"), &flex("old_cB"), slot)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconfigError::InvalidCommand(_)));
}

#[tokio::test]
async fn migrate_copies_a_function_between_switches() {
    let dir = TempDir::new().unwrap();
    let mut set = SessionSet::new();
    set.add(pipelined_session(dir.path(), "s2").await);
    set.add(pipelined_session(dir.path(), "s1").await);

    let merged = tagged_splice(dir.path(), "merged.json");
    let src_slot = MountSlot::new(3).unwrap();
    set.get_mut("s1")
        .unwrap()
        .install_func(&merged, &flex("old_tA"), &flex("old_cB"), src_slot)
        .await
        .unwrap();

    let dst_slot = MountSlot::new(5).unwrap();
    set.migrate_func(
        "s1",
        src_slot,
        "s2",
        &flex("old_tA"),
        &flex("old_cB"),
        dst_slot,
    )
    .await
    .unwrap();

    // destination runs a copy under its own slot
    let dst = set.get("s2").unwrap().graphs().current().unwrap();
    assert!(dst.contains(&dst_slot.branch_name()));
    assert!(dst.contains(&flex("new_tX")));
    assert_eq!(
        dst.labels_between(&dst_slot.branch_name(), &flex("new_tX")),
        vec![TRUE_NEXT]
    );

    // the source still has its function; migrate is a copy, not a move
    let src = set.get("s1").unwrap().graphs().current().unwrap();
    assert!(src.contains(&src_slot.branch_name()));

    // focus returned to the source switch
    assert_eq!(set.current().unwrap().name(), "s1");
}

#[tokio::test]
async fn unknown_switch_names_are_rejected() {
    let mut set = SessionSet::new();
    let err = set.switch_to("ghost").unwrap_err();
    assert!(matches!(err, ReconfigError::InvalidCommand(_)));
}
