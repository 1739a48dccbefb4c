//! Graph-diff planners
//!
//! Each planner translates one high-level request into a totally-ordered
//! sequence of primitive command lines. Planners are pure functions over
//! graphs: they validate every precondition up front and emit either the
//! complete sequence or nothing, so a failed plan never leaves a switch
//! half-reconfigured by construction (execution failures are a separate
//! concern — see the session controller).

mod install;
mod migrate;
mod uninstall;

pub use install::plan_install;
pub use migrate::{plan_migrate, MigratePlanRequest};
pub use uninstall::plan_uninstall;

use crate::name::FlexName;

/// Pipeline name used by every ingress primitive
pub(crate) const INGRESS: &str = "ingress";

/// `insert` line for one node. Mount-point branches start detached, with
/// both successors null.
pub(crate) fn insert_line(node: &FlexName) -> String {
    if node.is_flex_branch() {
        format!("insert flex {INGRESS} {} null null", node.wire_name())
    } else {
        format!("insert {} {INGRESS} {}", node.keyword(), node.wire_name())
    }
}

/// `change` line rewiring the `label` successor of `node` to `next_wire`
pub(crate) fn change_line(node: &FlexName, label: &str, next_wire: &str) -> String {
    format!(
        "change {} {INGRESS} {} {label} {next_wire}",
        node.keyword(),
        node.wire_name()
    )
}

/// `delete` line for one node
pub(crate) fn delete_line(node: &FlexName) -> String {
    format!("delete {} {INGRESS} {}", node.keyword(), node.wire_name())
}
