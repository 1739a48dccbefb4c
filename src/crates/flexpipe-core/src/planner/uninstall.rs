//! Uninstall planner: remove an installed function and bypass its branch

use super::{change_line, delete_line};
use crate::error::{ReconfigError, Result};
use crate::graph::{PipelineGraph, FALSE_NEXT, TRUE_NEXT};
use crate::name::{FlexName, MountSlot};
use tracing::debug;

/// Plan the primitive sequence that disarms `slot`, deletes the splice body
/// hanging off its mount branch, reconnects every parent of the branch to
/// the downstream continuation, and finally deletes the branch itself.
pub fn plan_uninstall(runtime: &PipelineGraph, slot: MountSlot) -> Result<Vec<String>> {
    let branch = slot.branch_name();
    if !runtime.contains(&branch) {
        return Err(ReconfigError::InvalidCommand(format!(
            "no function is installed at mount point number {slot}"
        )));
    }

    let mut true_target: Option<&FlexName> = None;
    let mut false_target: Option<&FlexName> = None;
    let mut out_degree = 0usize;
    for edge in runtime.out_edges(&branch) {
        out_degree += 1;
        match edge.label {
            TRUE_NEXT => true_target = Some(edge.to),
            FALSE_NEXT => false_target = Some(edge.to),
            _ => {}
        }
    }
    let (Some(entry), Some(resume)) = (true_target, false_target) else {
        return Err(ReconfigError::InvalidCommand(format!(
            "mount branch {branch} lacks true_next/false_next successors"
        )));
    };
    if out_degree != 2 {
        return Err(ReconfigError::InvalidCommand(format!(
            "mount branch {branch} has {out_degree} successors, expected 2"
        )));
    }

    let mut plan = vec![format!("trigger off {slot}")];

    // The splice body: everything reachable from the entry that funnels
    // into the resume point, which the install planner guarantees.
    for node in runtime.reachable_until(entry, resume) {
        if node.is_root() || node.is_sink() {
            continue;
        }
        plan.push(delete_line(&node));
    }

    let resume_wire = resume.wire_name();
    let parents: Vec<_> = runtime.in_edges(&branch).collect();
    for edge in &parents {
        if edge.from.is_root() {
            if parents.len() != 1 {
                return Err(ReconfigError::InvalidCommand(format!(
                    "mount branch {branch} is the pipeline entry but has {} parents",
                    parents.len()
                )));
            }
            plan.push(format!("change init ingress {resume_wire}"));
        } else {
            plan.push(change_line(edge.from, edge.label, &resume_wire));
        }
    }

    plan.push(delete_line(&branch));
    debug!(slot = %slot, primitives = plan.len(), "planned uninstall");
    Ok(plan)
}
