//! Pipeline graphs
//!
//! A pipeline is modeled as a directed multigraph: one vertex per table or
//! conditional (keyed by flex-name), a synthetic root `old_r` and sink
//! `old_s`, and labelled edges for every successor relation
//! (`base_default_next`, per-table symbolic results, `true_next`,
//! `false_next`). Multiple edges may connect the same pair of vertices, each
//! with its own label.
//!
//! Vertices and edges are stored in insertion order and every accessor
//! iterates in that order, so two builds of the same pipeline description
//! walk identically — the planners rely on this for stable primitive
//! sequences.

use crate::error::{ReconfigError, Result};
use crate::name::FlexName;
use crate::pipeline::{node_flex_name, node_name, successor, PipelineJson};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Edge label for the default successor of a table (and the root edge)
pub const BASE_DEFAULT_NEXT: &str = "base_default_next";

/// Edge label for the taken branch of a conditional
pub const TRUE_NEXT: &str = "true_next";

/// Edge label for the fall-through branch of a conditional
pub const FALSE_NEXT: &str = "false_next";

#[derive(Debug, Clone)]
struct EdgeRec {
    from: usize,
    to: usize,
    label: String,
}

/// Borrowed view of one labelled edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRef<'a> {
    pub from: &'a FlexName,
    pub to: &'a FlexName,
    pub label: &'a str,
}

/// Directed multigraph over flex-named vertices with labelled edges
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    vertices: Vec<FlexName>,
    index: HashMap<FlexName, usize>,
    edges: Vec<EdgeRec>,
    out: Vec<Vec<usize>>,
    inc: Vec<Vec<usize>>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vertex; returns false when it was already present
    pub fn add_vertex(&mut self, name: FlexName) -> bool {
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name.clone(), self.vertices.len());
        self.vertices.push(name);
        self.out.push(Vec::new());
        self.inc.push(Vec::new());
        true
    }

    /// Insert a labelled edge between two existing vertices
    pub fn add_edge(&mut self, from: &FlexName, to: &FlexName, label: &str) -> Result<()> {
        let fi = self.lookup(from)?;
        let ti = self.lookup(to)?;
        let id = self.edges.len();
        self.edges.push(EdgeRec {
            from: fi,
            to: ti,
            label: label.to_string(),
        });
        self.out[fi].push(id);
        self.inc[ti].push(id);
        Ok(())
    }

    fn lookup(&self, name: &FlexName) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| {
            ReconfigError::MalformedPipeline(format!("unknown graph vertex: {name}"))
        })
    }

    pub fn contains(&self, name: &FlexName) -> bool {
        self.index.contains_key(name)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertices in insertion order
    pub fn vertices(&self) -> impl Iterator<Item = &FlexName> {
        self.vertices.iter()
    }

    fn edge_ref(&self, id: usize) -> EdgeRef<'_> {
        let e = &self.edges[id];
        EdgeRef {
            from: &self.vertices[e.from],
            to: &self.vertices[e.to],
            label: &e.label,
        }
    }

    /// Outgoing edges of a vertex in insertion order; empty for unknown names
    pub fn out_edges<'a>(&'a self, name: &FlexName) -> impl Iterator<Item = EdgeRef<'a>> {
        let ids = self
            .index
            .get(name)
            .map(|&i| self.out[i].as_slice())
            .unwrap_or(&[]);
        ids.iter().map(move |&id| self.edge_ref(id))
    }

    /// Incoming edges of a vertex in insertion order; empty for unknown names
    pub fn in_edges<'a>(&'a self, name: &FlexName) -> impl Iterator<Item = EdgeRef<'a>> {
        let ids = self
            .index
            .get(name)
            .map(|&i| self.inc[i].as_slice())
            .unwrap_or(&[]);
        ids.iter().map(move |&id| self.edge_ref(id))
    }

    /// Labels of every edge from `u` to `v`, in insertion order
    pub fn labels_between(&self, u: &FlexName, v: &FlexName) -> Vec<&str> {
        self.out_edges(u)
            .filter(|e| e.to == v)
            .map(|e| e.label)
            .collect()
    }

    /// All edges, ordered by (source vertex insertion index, then per-source
    /// insertion order). The synthetic root is always vertex 0, so its edge
    /// is visited before any other.
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'_>> {
        self.vertices
            .iter()
            .flat_map(move |v| self.out_edges(v))
    }

    /// Vertices reachable from `start` without traversing past `stop`,
    /// excluding `stop` itself, reported in vertex insertion order.
    ///
    /// For an installed splice this is exactly the splice body: the subgraph
    /// is acyclic and funnels into `stop`, so the scan is equivalent to
    /// enumerating all simple paths from `start` to `stop`.
    pub fn reachable_until(&self, start: &FlexName, stop: &FlexName) -> Vec<FlexName> {
        let mut seen = vec![false; self.vertices.len()];
        let (Some(&s), Some(&t)) = (self.index.get(start), self.index.get(stop)) else {
            return Vec::new();
        };
        if s != t {
            let mut stack = vec![s];
            while let Some(i) = stack.pop() {
                if seen[i] {
                    continue;
                }
                seen[i] = true;
                for &eid in &self.out[i] {
                    let next = self.edges[eid].to;
                    if next != t && !seen[next] {
                        stack.push(next);
                    }
                }
            }
        }
        self.vertices
            .iter()
            .enumerate()
            .filter(|(i, _)| seen[*i])
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Build the pipeline graph from a tagged pipeline description.
///
/// Every table and conditional must already carry a flex-name tag. The
/// name→flex-name map gains the extra entry `null → old_s`, so dangling
/// `null` successors materialize as edges to the sink; a successor *name*
/// that resolves to nothing is reported as a dangling-reference diagnostic
/// and the edge is omitted.
pub fn build_pipeline_graph(pipeline: &PipelineJson) -> Result<PipelineGraph> {
    let ingress = pipeline.ingress()?;
    let mut graph = PipelineGraph::new();
    graph.add_vertex(FlexName::root());
    graph.add_vertex(FlexName::sink());

    let mut by_name: HashMap<String, FlexName> = HashMap::new();
    for table in ingress.tables()? {
        let flex = node_flex_name(table)?;
        graph.add_vertex(flex.clone());
        by_name.insert(node_name(table)?.to_string(), flex);
    }
    for cond in ingress.conditionals()? {
        let flex = node_flex_name(cond)?;
        graph.add_vertex(flex.clone());
        by_name.insert(node_name(cond)?.to_string(), flex);
    }

    let resolve = |name: Option<&str>| -> Option<FlexName> {
        match name {
            None => Some(FlexName::sink()),
            Some(n) => by_name.get(n).cloned(),
        }
    };

    let entry = match ingress.init_table() {
        None => FlexName::sink(),
        Some(n) => by_name.get(n).cloned().ok_or_else(|| {
            ReconfigError::MalformedPipeline(format!("init_table refers to unknown node: {n}"))
        })?,
    };
    graph.add_edge(&FlexName::root(), &entry, BASE_DEFAULT_NEXT)?;

    for table in ingress.tables()? {
        let from = node_flex_name(table)?;
        let base = successor(table, "base_default_next");
        match resolve(base) {
            Some(to) => graph.add_edge(&from, &to, BASE_DEFAULT_NEXT)?,
            None => warn!(
                table = %from,
                next = base.unwrap_or_default(),
                "dangling base_default_next reference; edge omitted"
            ),
        }
        if let Some(next_tables) = table.get("next_tables").and_then(Value::as_object) {
            for (label, next) in next_tables {
                match resolve(next.as_str()) {
                    Some(to) => graph.add_edge(&from, &to, label)?,
                    None => warn!(
                        table = %from,
                        label,
                        next = next.as_str().unwrap_or_default(),
                        "dangling next_tables reference; edge omitted"
                    ),
                }
            }
        }
    }

    for cond in ingress.conditionals()? {
        let from = node_flex_name(cond)?;
        for (key, label) in [("true_next", TRUE_NEXT), ("false_next", FALSE_NEXT)] {
            let next = successor(cond, key);
            match resolve(next) {
                Some(to) => graph.add_edge(&from, &to, label)?,
                None => warn!(
                    conditional = %from,
                    label,
                    next = next.unwrap_or_default(),
                    "dangling conditional reference; edge omitted"
                ),
            }
        }
    }

    Ok(graph)
}
