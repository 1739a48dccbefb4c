//! Transport seam between the session controller and a switch
//!
//! The real P4Runtime link is generated gRPC code that lives outside this
//! crate; sessions only depend on the [`Transport`] trait. The switch
//! contract the trait captures: primitives are delivered in issuance order,
//! and every non-`trigger` primitive response carries the switch's updated
//! compiled pipeline JSON.
//!
//! [`LoopbackSwitch`] is an in-memory implementation that applies each
//! primitive to a held pipeline document the way the switch-side runtime
//! does. It backs the integration tests and lets the CLI run complete
//! install/uninstall/migrate flows without a data plane.

use crate::command::{Action, ReconfigRequest, Target};
use crate::error::{ReconfigError, Result};
use crate::pipeline::{ingress_object_mut, node_flex_name, FLEX_NAME_KEY};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Switch response to one reconfiguration primitive
#[derive(Debug, Clone)]
pub struct PrimitiveResponse {
    /// Updated compiled pipeline JSON; `None` only for `trigger`
    pub pipeline_json: Option<String>,
}

/// One switch's control-plane link
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform master arbitration for the stream channel
    async fn master_arbitration_update(&mut self) -> Result<()>;

    /// Upload the initial forwarding pipeline (P4Info passed through opaque)
    async fn set_forwarding_pipeline_config(
        &mut self,
        p4info: &[u8],
        pipeline_json: &str,
    ) -> Result<()>;

    /// Deliver one validated primitive and wait for its response
    async fn send_primitive(&mut self, request: &ReconfigRequest) -> Result<PrimitiveResponse>;
}

/// In-memory switch emulation
#[derive(Debug, Default)]
pub struct LoopbackSwitch {
    running: Option<Value>,
    staging: Option<Value>,
}

impl LoopbackSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    fn running_mut(&mut self) -> Result<&mut Value> {
        self.running
            .as_mut()
            .ok_or_else(|| ReconfigError::Transport("no forwarding pipeline set".into()))
    }

    fn respond(&self) -> Result<PrimitiveResponse> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| ReconfigError::Transport("no forwarding pipeline set".into()))?;
        Ok(PrimitiveResponse {
            pipeline_json: Some(serde_json::to_string(running)?),
        })
    }

    /// Find a node in `nodes` by its wire name (flex-name with the kind
    /// letter stripped)
    fn position_by_wire<'a>(nodes: &'a [Value], wire: &str) -> Option<(usize, &'a Value)> {
        nodes.iter().enumerate().find(|(_, n)| {
            node_flex_name(n)
                .map(|f| f.wire_name() == wire)
                .unwrap_or(false)
        })
    }

    /// Resolve a wire token to the plain name of a running node; the `null`
    /// token resolves to JSON null
    fn resolve_next(running_ingress: &serde_json::Map<String, Value>, token: &str) -> Result<Value> {
        if token == "null" {
            return Ok(Value::Null);
        }
        for key in ["tables", "conditionals"] {
            if let Some(nodes) = running_ingress.get(key).and_then(Value::as_array) {
                if let Some((_, node)) = Self::position_by_wire(nodes, token) {
                    return Ok(node.get("name").cloned().unwrap_or(Value::Null));
                }
            }
        }
        Err(ReconfigError::Transport(format!(
            "unknown node in next slot: {token}"
        )))
    }

    fn take_from_staging(&mut self, key: &str, wire: &str) -> Result<Value> {
        let staging = self
            .staging
            .as_mut()
            .ok_or_else(|| ReconfigError::Transport("p4objects_new has not been initialized".into()))?;
        let ingress = ingress_object_mut(staging)?;
        let nodes = ingress
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| ReconfigError::Transport(format!("staging lacks {key}")))?;
        let (_, node) = Self::position_by_wire(nodes, wire).ok_or_else(|| {
            ReconfigError::Transport(format!("staging has no {key} entry named {wire}"))
        })?;
        Ok(node.clone())
    }

    fn apply(&mut self, request: &ReconfigRequest) -> Result<()> {
        let action = request.action;
        let target = request.target;
        let args = &request.args;
        match (action, target) {
            (Action::InitP4ObjectsNew, None) => {
                let text = std::fs::read_to_string(&args[0])?;
                self.staging = Some(serde_json::from_str(&text)?);
            }
            (Action::Insert, Some(Target::Tabl)) => {
                let node = self.take_from_staging("tables", &args[1])?;
                let ingress = ingress_object_mut(self.running_mut()?)?;
                ingress
                    .get_mut("tables")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks tables".into()))?
                    .push(node);
            }
            (Action::Insert, Some(Target::Cond)) => {
                let node = self.take_from_staging("conditionals", &args[1])?;
                let ingress = ingress_object_mut(self.running_mut()?)?;
                ingress
                    .get_mut("conditionals")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks conditionals".into()))?
                    .push(node);
            }
            (Action::Insert, Some(Target::Flex)) => {
                let ingress = ingress_object_mut(self.running_mut()?)?;
                let true_next = Self::resolve_next(ingress, &args[2])?;
                let false_next = Self::resolve_next(ingress, &args[3])?;
                let branch = json!({
                    "name": args[1],
                    (FLEX_NAME_KEY): args[1],
                    "true_next": true_next,
                    "false_next": false_next,
                    "expression": Value::Null,
                });
                ingress
                    .get_mut("conditionals")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks conditionals".into()))?
                    .push(branch);
            }
            (Action::Insert, Some(Target::RegisterArray)) => {
                let entry = json!({
                    "name": args[0],
                    "size": args[1].parse::<u64>().unwrap_or(0),
                    "bitwidth": args[2].parse::<u64>().unwrap_or(0),
                });
                let running = self.running_mut()?;
                let arrays = running
                    .as_object_mut()
                    .and_then(|o| {
                        o.entry("register_arrays")
                            .or_insert_with(|| json!([]))
                            .as_array_mut()
                    })
                    .ok_or_else(|| ReconfigError::Transport("register_arrays is not a list".into()))?;
                arrays.push(entry);
            }
            (Action::Change, Some(Target::Tabl)) => {
                let ingress = ingress_object_mut(self.running_mut()?)?;
                let next = Self::resolve_next(ingress, &args[3])?;
                let tables = ingress
                    .get_mut("tables")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks tables".into()))?;
                let pos = Self::position_by_wire(tables, &args[1])
                    .map(|(i, _)| i)
                    .ok_or_else(|| {
                        ReconfigError::Transport(format!("no running table named {}", args[1]))
                    })?;
                let table = tables[pos].as_object_mut().unwrap();
                if args[2] == "base_default_next" {
                    table.insert("base_default_next".into(), next);
                } else {
                    table
                        .entry("next_tables")
                        .or_insert_with(|| json!({}))
                        .as_object_mut()
                        .ok_or_else(|| {
                            ReconfigError::Transport("next_tables is not a mapping".into())
                        })?
                        .insert(args[2].clone(), next);
                }
            }
            (Action::Change, Some(Target::Cond | Target::Flex)) => {
                let ingress = ingress_object_mut(self.running_mut()?)?;
                let next = Self::resolve_next(ingress, &args[3])?;
                let conds = ingress
                    .get_mut("conditionals")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks conditionals".into()))?;
                let pos = Self::position_by_wire(conds, &args[1])
                    .map(|(i, _)| i)
                    .ok_or_else(|| {
                        ReconfigError::Transport(format!("no running branch named {}", args[1]))
                    })?;
                conds[pos]
                    .as_object_mut()
                    .unwrap()
                    .insert(args[2].clone(), next);
            }
            (Action::Change, Some(Target::Init)) => {
                let ingress = ingress_object_mut(self.running_mut()?)?;
                let next = Self::resolve_next(ingress, &args[1])?;
                ingress.insert("init_table".into(), next);
            }
            (Action::Change, Some(Target::RegisterArraySize | Target::RegisterArrayBitwidth)) => {
                let field = if target == Some(Target::RegisterArraySize) {
                    "size"
                } else {
                    "bitwidth"
                };
                let running = self.running_mut()?;
                let arrays = running
                    .get_mut("register_arrays")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("no register arrays".into()))?;
                let entry = arrays
                    .iter_mut()
                    .find(|a| a.get("name").and_then(Value::as_str) == Some(args[0].as_str()))
                    .ok_or_else(|| {
                        ReconfigError::Transport(format!("no register array named {}", args[0]))
                    })?;
                entry.as_object_mut().unwrap().insert(
                    field.into(),
                    json!(args[1].parse::<u64>().unwrap_or(0)),
                );
            }
            (Action::Delete, Some(Target::Tabl)) => {
                let ingress = ingress_object_mut(self.running_mut()?)?;
                let tables = ingress
                    .get_mut("tables")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks tables".into()))?;
                let pos = Self::position_by_wire(tables, &args[1])
                    .map(|(i, _)| i)
                    .ok_or_else(|| {
                        ReconfigError::Transport(format!("no running table named {}", args[1]))
                    })?;
                tables.remove(pos);
            }
            (Action::Delete, Some(Target::Cond | Target::Flex)) => {
                let ingress = ingress_object_mut(self.running_mut()?)?;
                let conds = ingress
                    .get_mut("conditionals")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("running lacks conditionals".into()))?;
                let pos = Self::position_by_wire(conds, &args[1])
                    .map(|(i, _)| i)
                    .ok_or_else(|| {
                        ReconfigError::Transport(format!("no running branch named {}", args[1]))
                    })?;
                conds.remove(pos);
            }
            (Action::Delete, Some(Target::RegisterArray)) => {
                let running = self.running_mut()?;
                let arrays = running
                    .get_mut("register_arrays")
                    .and_then(Value::as_array_mut)
                    .ok_or_else(|| ReconfigError::Transport("no register arrays".into()))?;
                arrays.retain(|a| a.get("name").and_then(Value::as_str) != Some(args[0].as_str()));
            }
            (Action::Trigger, None) => {
                if self.staging.is_none() {
                    return Err(ReconfigError::Transport(
                        "p4objects_new has not been initialized".into(),
                    ));
                }
            }
            _ => {
                return Err(ReconfigError::Transport(format!(
                    "unsupported primitive: {request}"
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LoopbackSwitch {
    async fn master_arbitration_update(&mut self) -> Result<()> {
        Ok(())
    }

    async fn set_forwarding_pipeline_config(
        &mut self,
        _p4info: &[u8],
        pipeline_json: &str,
    ) -> Result<()> {
        self.running = Some(serde_json::from_str(pipeline_json)?);
        Ok(())
    }

    async fn send_primitive(&mut self, request: &ReconfigRequest) -> Result<PrimitiveResponse> {
        self.apply(request)?;
        if request.is_trigger() {
            return Ok(PrimitiveResponse {
                pipeline_json: None,
            });
        }
        self.respond()
    }
}
