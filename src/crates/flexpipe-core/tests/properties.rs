//! Property tests for the naming discipline, graph builder, taggers, and
//! planner output

use flexpipe_core::graph::BASE_DEFAULT_NEXT;
use flexpipe_core::pipeline::FLEX_NAME_KEY;
use flexpipe_core::tagger::{tag_initial, tag_migrate};
use flexpipe_core::{
    build_pipeline_graph, plan_install, FlexName, MountSlot, PipelineGraph, PipelineJson,
    ReconfigRequest,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::path::Path;

fn flex_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("old_r".to_string()),
        Just("old_s".to_string()),
        ("old_|new_", "t|c", "[A-Za-z0-9_.]{1,12}")
            .prop_map(|(lineage, kind, name)| format!("{lineage}{kind}{name}")),
        "[a-z0-9_$]{1,16}".prop_map(|name| format!("flx_{name}")),
    ]
}

proptest! {
    /// Flex-name <-> human-readable conversion round-trips in both
    /// directions
    #[test]
    fn human_readable_round_trips(raw in flex_name_strategy()) {
        let f = FlexName::parse(&raw).unwrap();
        let human = f.to_human_readable();
        let back = FlexName::from_human_readable(&human).unwrap();
        prop_assert_eq!(&back, &f);
        prop_assert_eq!(back.to_human_readable(), human);
    }

    /// Every in-range slot produces a valid branch name; everything else is
    /// rejected
    #[test]
    fn slot_range_is_enforced(n in -1000i64..1000) {
        match MountSlot::new(n) {
            Ok(slot) => {
                prop_assert!((0..128).contains(&n));
                prop_assert!(slot.branch_name().is_flex_branch());
            }
            Err(_) => prop_assert!(!(0..128).contains(&n)),
        }
    }
}

/// Arbitrary untagged ingress pipeline: successor codes map to a node,
/// the null token, or a dangling name
fn pipeline_strategy() -> impl Strategy<Value = Value> {
    let table_count = 1usize..4;
    let cond_count = 0usize..3;
    (table_count, cond_count)
        .prop_flat_map(|(nt, nc)| {
            let pool = nt + nc;
            // one code per successor slot: tables get one, conditionals two
            let codes = prop::collection::vec(0usize..pool + 3, nt + nc * 2);
            (Just(nt), Just(nc), codes)
        })
        .prop_map(|(nt, nc, codes)| {
            let node_name = |i: usize| {
                if i < nt {
                    format!("T{i}")
                } else {
                    format!("C{}", i - nt)
                }
            };
            let successor = |code: usize| -> Value {
                if code < nt + nc {
                    json!(node_name(code))
                } else if code == nt + nc {
                    Value::Null
                } else {
                    json!("ghost")
                }
            };
            let tables: Vec<Value> = (0..nt)
                .map(|i| {
                    json!({
                        "name": node_name(i),
                        "base_default_next": successor(codes[i]),
                        "next_tables": {}
                    })
                })
                .collect();
            let conditionals: Vec<Value> = (0..nc)
                .map(|j| {
                    json!({
                        "name": node_name(nt + j),
                        "true_next": successor(codes[nt + j * 2]),
                        "false_next": successor(codes[nt + j * 2 + 1]),
                        "expression": null
                    })
                })
                .collect();
            json!({
                "pipelines": [{
                    "name": "ingress",
                    "init_table": "T0",
                    "tables": tables,
                    "conditionals": conditionals
                }]
            })
        })
}

proptest! {
    /// Building any pipeline without action_calls succeeds: the root has
    /// exactly one outgoing edge, null successors land on the sink, and
    /// dangling references never crash the builder
    #[test]
    fn builder_handles_any_pipeline(doc in pipeline_strategy()) {
        let tagged = tag_initial(&PipelineJson::from_value(doc)).unwrap();
        let graph = build_pipeline_graph(&tagged).unwrap();
        prop_assert_eq!(graph.out_edges(&FlexName::root()).count(), 1);
        let root_edge = graph.out_edges(&FlexName::root()).next().unwrap();
        prop_assert_eq!(root_edge.label, BASE_DEFAULT_NEXT);
        // the sink never has outgoing edges
        prop_assert_eq!(graph.out_edges(&FlexName::sink()).count(), 0);
    }

    /// tag_migrate turns every old_* into new_* and preserves flx_* tags
    #[test]
    fn migrate_tagging_preserves_flex_branches(doc in pipeline_strategy()) {
        let tagged = tag_initial(&PipelineJson::from_value(doc)).unwrap();
        // adopt one conditional as a mount branch when there is one
        let mut value = tagged.into_value();
        let conds = value["pipelines"][0]["conditionals"].as_array_mut().unwrap();
        if let Some(first) = conds.first_mut() {
            first.as_object_mut().unwrap().insert(
                FLEX_NAME_KEY.into(),
                json!("flx_flex_func_mount_point_number_$1$"),
            );
        }
        let snapshot = tag_migrate(&PipelineJson::from_value(value)).unwrap();
        let ingress = snapshot.ingress().unwrap();
        for node in ingress.tables().unwrap().iter().chain(ingress.conditionals().unwrap()) {
            let tag = node[FLEX_NAME_KEY].as_str().unwrap();
            prop_assert!(
                tag.starts_with("new_") || tag.starts_with("flx_"),
                "unexpected tag after migrate retagging: {}",
                tag
            );
        }
    }
}

/// Runtime chain old_t0 -> old_t1 -> ... -> sink with extra labels on the
/// splice edge, and a merged chain new_t0 -> ... -> sink
fn install_case_strategy() -> impl Strategy<Value = (usize, usize, Vec<String>, i64)> {
    (
        2usize..5,
        1usize..4,
        prop::collection::vec("[a-z]{1,6}", 0..3),
        0i64..128,
    )
}

proptest! {
    /// Every primitive emitted by the install planner is accepted by the
    /// parser/validator
    #[test]
    fn planned_install_primitives_parse((runtime_len, merged_len, extra_labels, slot)
        in install_case_strategy())
    {
        let mut runtime = PipelineGraph::new();
        runtime.add_vertex(FlexName::root());
        runtime.add_vertex(FlexName::sink());
        let nodes: Vec<FlexName> = (0..runtime_len)
            .map(|i| FlexName::parse(&format!("old_t{i}")).unwrap())
            .collect();
        for n in &nodes {
            runtime.add_vertex(n.clone());
        }
        runtime.add_edge(&FlexName::root(), &nodes[0], BASE_DEFAULT_NEXT).unwrap();
        for w in nodes.windows(2) {
            runtime.add_edge(&w[0], &w[1], BASE_DEFAULT_NEXT).unwrap();
        }
        for label in &extra_labels {
            runtime.add_edge(&nodes[0], &nodes[1], label).unwrap();
        }
        runtime.add_edge(&nodes[runtime_len - 1], &FlexName::sink(), BASE_DEFAULT_NEXT).unwrap();

        let mut merged = PipelineGraph::new();
        merged.add_vertex(FlexName::root());
        merged.add_vertex(FlexName::sink());
        let body: Vec<FlexName> = (0..merged_len)
            .map(|i| FlexName::parse(&format!("new_t{i}")).unwrap())
            .collect();
        for n in &body {
            merged.add_vertex(n.clone());
        }
        merged.add_edge(&FlexName::root(), &body[0], BASE_DEFAULT_NEXT).unwrap();
        for w in body.windows(2) {
            merged.add_edge(&w[0], &w[1], BASE_DEFAULT_NEXT).unwrap();
        }
        merged.add_edge(&body[merged_len - 1], &FlexName::sink(), BASE_DEFAULT_NEXT).unwrap();

        let plan = plan_install(
            &runtime,
            &merged,
            Path::new("merged.json"),
            &nodes[0],
            &nodes[1],
            MountSlot::new(slot).unwrap(),
        )
        .unwrap();
        for line in &plan {
            let parsed: Result<ReconfigRequest, _> = line.parse();
            prop_assert!(parsed.is_ok(), "planner emitted unparseable line: {}", line);
        }
    }
}
