//! Install planner: splice a compiled function into a live pipeline

use super::{change_line, insert_line};
use crate::error::{ReconfigError, Result};
use crate::graph::PipelineGraph;
use crate::name::{FlexName, MountSlot};
use std::path::Path;
use tracing::{debug, warn};

/// Plan the primitive sequence that splices the `merged` subgraph between
/// `start` and `end` in the runtime graph, mounted on `slot`.
///
/// The emitted order is fixed: load the staging area, insert the detached
/// mount branch and every splice node, wire the splice internally, redirect
/// its exits to `end`, aim the branch at both sides, cut the original
/// `start → end` connection over to the branch, and finally arm the slot.
pub fn plan_install(
    runtime: &PipelineGraph,
    merged: &PipelineGraph,
    merged_json_path: &Path,
    start: &FlexName,
    end: &FlexName,
    slot: MountSlot,
) -> Result<Vec<String>> {
    let branch = slot.branch_name();
    if runtime.contains(&branch) {
        return Err(ReconfigError::InvalidCommand(format!(
            "mount point number {slot} is already used on this switch"
        )));
    }
    if !runtime.contains(start) {
        return Err(ReconfigError::InvalidCommand(format!(
            "start point {start} is not in the runtime graph"
        )));
    }
    if !runtime.contains(end) {
        return Err(ReconfigError::InvalidCommand(format!(
            "end point {end} is not in the runtime graph"
        )));
    }
    // the labels to cut over; there must be something to splice across
    let cut_labels: Vec<String> = runtime
        .labels_between(start, end)
        .into_iter()
        .map(str::to_string)
        .collect();
    if cut_labels.is_empty() {
        return Err(ReconfigError::InvalidCommand(format!(
            "no edge from {start} to {end} in the runtime graph"
        )));
    }

    let mut plan = vec![
        format!("init_p4objects_new {}", merged_json_path.display()),
        insert_line(&branch),
    ];

    for node in merged.vertices() {
        if node.is_root() || node.is_sink() {
            continue;
        }
        plan.push(insert_line(node));
    }

    // Wire the splice internally. The first edge out of the merged root
    // names the entry vertex; edges into the merged sink are the exits and
    // are redirected to `end` below.
    let mut entry: Option<FlexName> = None;
    let mut exits: Vec<(FlexName, String)> = Vec::new();
    for edge in merged.edges() {
        if edge.from.is_root() {
            if entry.is_none() {
                entry = Some(edge.to.clone());
            } else {
                warn!(extra = %edge.to, "merged graph root has more than one successor");
            }
            continue;
        }
        if edge.to.is_sink() {
            exits.push((edge.from.clone(), edge.label.to_string()));
        } else {
            plan.push(change_line(edge.from, edge.label, &edge.to.wire_name()));
        }
    }
    let entry = entry.ok_or_else(|| {
        ReconfigError::MalformedPipeline("merged pipeline has no entry node".into())
    })?;

    let end_wire = end.wire_name();
    for (node, label) in &exits {
        plan.push(change_line(node, label, &end_wire));
    }

    plan.push(change_line(&branch, "false_next", &end_wire));
    plan.push(change_line(&branch, "true_next", &entry.wire_name()));

    if start.is_root() {
        plan.push(format!("change init ingress {}", branch.wire_name()));
    } else {
        for label in &cut_labels {
            plan.push(change_line(start, label, &branch.wire_name()));
        }
    }

    plan.push(format!("trigger on {slot}"));
    debug!(slot = %slot, primitives = plan.len(), "planned install");
    Ok(plan)
}
