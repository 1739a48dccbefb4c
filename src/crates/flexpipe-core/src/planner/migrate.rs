//! Migrate planner: copy an installed function onto a second switch
//!
//! Behaves like install against the destination, except the splice body is
//! lifted from the source switch's migration snapshot (retagged `new_*` so
//! the destination's own `old_*` namespace stays untouched) rather than from
//! a freshly compiled artifact. The source switch is left as-is — migrate is
//! a copy, not a move.

use super::{change_line, insert_line};
use crate::error::{ReconfigError, Result};
use crate::graph::{PipelineGraph, FALSE_NEXT, TRUE_NEXT};
use crate::name::{FlexName, MountSlot};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Everything the migrate planner needs from both switches
#[derive(Debug)]
pub struct MigratePlanRequest<'a> {
    /// Name of the switch the function is copied from
    pub source_switch: &'a str,
    /// Graph of the source migration snapshot (already retagged)
    pub source_graph: &'a PipelineGraph,
    /// Path of the persisted migration snapshot, loaded into the
    /// destination's staging area
    pub migrate_json_path: &'a Path,
    /// Slot the function occupies on the source switch
    pub source_slot: MountSlot,
    /// Name of the switch the function is copied to
    pub dest_switch: &'a str,
    /// Current runtime graph of the destination switch
    pub dest_runtime: &'a PipelineGraph,
    /// Splice start point in the destination graph
    pub start: &'a FlexName,
    /// Splice end point in the destination graph
    pub end: &'a FlexName,
    /// Slot to mount on at the destination
    pub dest_slot: MountSlot,
}

pub fn plan_migrate(req: &MigratePlanRequest<'_>) -> Result<Vec<String>> {
    let source_branch = req.source_slot.branch_name();
    if !req.source_graph.contains(&source_branch) {
        return Err(ReconfigError::InvalidCommand(format!(
            "no function is installed at mount point number {} on {}",
            req.source_slot, req.source_switch
        )));
    }
    let mut entry: Option<&FlexName> = None;
    let mut boundary: Option<&FlexName> = None;
    for edge in req.source_graph.out_edges(&source_branch) {
        match edge.label {
            TRUE_NEXT => entry = Some(edge.to),
            FALSE_NEXT => boundary = Some(edge.to),
            _ => {}
        }
    }
    let (Some(entry), Some(boundary)) = (entry, boundary) else {
        return Err(ReconfigError::InvalidCommand(format!(
            "mount branch {source_branch} lacks true_next/false_next successors"
        )));
    };

    let dest_branch = req.dest_slot.branch_name();
    if req.dest_runtime.contains(&dest_branch) {
        return Err(ReconfigError::InvalidCommand(format!(
            "mount point number {} is already used on {}",
            req.dest_slot, req.dest_switch
        )));
    }
    if !req.dest_runtime.contains(req.start) || !req.dest_runtime.contains(req.end) {
        return Err(ReconfigError::InvalidCommand(format!(
            "splice points {} -> {} are not in {}'s runtime graph",
            req.start, req.end, req.dest_switch
        )));
    }
    let cut_labels: Vec<String> = req
        .dest_runtime
        .labels_between(req.start, req.end)
        .into_iter()
        .map(str::to_string)
        .collect();
    if cut_labels.is_empty() {
        return Err(ReconfigError::InvalidCommand(format!(
            "no edge from {} to {} in {}'s runtime graph",
            req.start, req.end, req.dest_switch
        )));
    }

    // Splice body: the subgraph between the source branch's true_next and
    // false_next targets, exclusive of the latter.
    let body: Vec<FlexName> = req
        .source_graph
        .reachable_until(entry, boundary)
        .into_iter()
        .filter(|n| !n.is_root() && !n.is_sink())
        .collect();
    if body.is_empty() {
        return Err(ReconfigError::InvalidCommand(format!(
            "mount point number {} on {} holds no function body",
            req.source_slot, req.source_switch
        )));
    }
    let body_set: HashSet<&FlexName> = body.iter().collect();

    let mut plan = vec![
        format!("connect {}", req.dest_switch),
        format!("init_p4objects_new {}", req.migrate_json_path.display()),
        insert_line(&dest_branch),
    ];
    for node in &body {
        plan.push(insert_line(node));
    }

    // Wire the body internally; every edge leaving the body is an exit,
    // redirected to the destination's end point.
    let end_wire = req.end.wire_name();
    let mut exits: Vec<(FlexName, String)> = Vec::new();
    for edge in req.source_graph.edges() {
        if !body_set.contains(edge.from) {
            continue;
        }
        if body_set.contains(edge.to) {
            plan.push(change_line(edge.from, edge.label, &edge.to.wire_name()));
        } else {
            exits.push((edge.from.clone(), edge.label.to_string()));
        }
    }
    for (node, label) in &exits {
        plan.push(change_line(node, label, &end_wire));
    }

    plan.push(change_line(&dest_branch, "false_next", &end_wire));
    plan.push(change_line(&dest_branch, "true_next", &entry.wire_name()));

    if req.start.is_root() {
        plan.push(format!("change init ingress {}", dest_branch.wire_name()));
    } else {
        for label in &cut_labels {
            plan.push(change_line(req.start, label, &dest_branch.wire_name()));
        }
    }

    plan.push(format!("trigger on {}", req.dest_slot));
    plan.push(format!("connect {}", req.source_switch));
    debug!(
        source = req.source_switch,
        dest = req.dest_switch,
        primitives = plan.len(),
        "planned migrate"
    );
    Ok(plan)
}
