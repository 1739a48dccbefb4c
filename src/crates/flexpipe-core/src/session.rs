//! Per-switch sessions and the multi-switch session set
//!
//! A [`SwitchSession`] owns one switch's control-plane state: connection
//! identity, the latest compiled pipeline JSON observed from the switch, the
//! staging-area flag, and the rebuilt pipeline graphs. It enforces the
//! session state machine:
//!
//! ```text
//! DISCONNECTED --connect/arbitration--> CONNECTED
//! CONNECTED  --set_forwarding_pipeline_config--> PIPELINED
//! PIPELINED  --init_p4objects_new--> READY
//! ```
//!
//! Reconfiguration primitives are accepted only in READY
//! (`init_p4objects_new` also in PIPELINED); anything else is a
//! [`ReconfigError::PreconditionUnmet`]. The controller issues at most one
//! outstanding primitive per switch, persists every returned pipeline JSON,
//! and rebuilds the session's current graph from it before the next step.
//!
//! [`SessionSet`] keys sessions by switch name and carries the cursor the
//! interactive surfaces use; migrate is defined here because it needs two
//! sessions at once.

use crate::command::{Action, ReconfigRequest};
use crate::error::{ReconfigError, Result};
use crate::graph::{build_pipeline_graph, PipelineGraph};
use crate::name::{FlexName, MountSlot};
use crate::pipeline::PipelineJson;
use crate::planner::{plan_install, plan_migrate, plan_uninstall, MigratePlanRequest};
use crate::tagger::{tag_initial, tag_merged, tag_migrate};
use crate::transport::Transport;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Arbitration done, no pipeline uploaded yet
    Connected,
    /// Pipeline uploaded, staging area not loaded
    Pipelined,
    /// Staging loaded; reconfiguration primitives accepted
    Ready,
}

/// Initial and current pipeline graphs of a session
#[derive(Debug, Default)]
pub struct GraphManager {
    initial: Option<PipelineGraph>,
    current: Option<PipelineGraph>,
}

impl GraphManager {
    /// Rebuild from a pipeline description. The first successful rebuild
    /// becomes the session's initial graph; later rebuilds only replace the
    /// current one.
    pub fn refresh(&mut self, pipeline: &PipelineJson) -> Result<()> {
        let graph = build_pipeline_graph(pipeline)?;
        if self.initial.is_none() {
            self.initial = Some(graph.clone());
        }
        self.current = Some(graph);
        Ok(())
    }

    pub fn initial(&self) -> Option<&PipelineGraph> {
        self.initial.as_ref()
    }

    pub fn current(&self) -> Option<&PipelineGraph> {
        self.current.as_ref()
    }
}

/// One switch's control-plane session
pub struct SwitchSession {
    name: String,
    address: String,
    device_id: u64,
    transport: Box<dyn Transport>,
    output_dir: PathBuf,
    latest_pipeline_json: Option<PathBuf>,
    initialized_staging: bool,
    graphs: GraphManager,
    response_seq: u64,
}

impl std::fmt::Debug for SwitchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchSession")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish()
    }
}

impl SwitchSession {
    /// Open a session: performs master arbitration on the given transport.
    pub async fn connect(
        name: &str,
        address: &str,
        device_id: u64,
        mut transport: Box<dyn Transport>,
        output_dir: &Path,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(output_dir).await?;
        transport.master_arbitration_update().await?;
        info!(switch = name, address, device_id, "connected");
        Ok(SwitchSession {
            name: name.to_string(),
            address: address.to_string(),
            device_id,
            transport,
            output_dir: output_dir.to_path_buf(),
            latest_pipeline_json: None,
            initialized_staging: false,
            graphs: GraphManager::default(),
            response_seq: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn latest_pipeline_json(&self) -> Option<&Path> {
        self.latest_pipeline_json.as_deref()
    }

    pub fn graphs(&self) -> &GraphManager {
        &self.graphs
    }

    pub fn state(&self) -> SessionState {
        if self.latest_pipeline_json.is_none() {
            SessionState::Connected
        } else if !self.initialized_staging {
            SessionState::Pipelined
        } else {
            SessionState::Ready
        }
    }

    /// Upload the initial pipeline: tags it `old_*`, persists the tagged
    /// artifact, pushes it to the switch, and builds the initial graph.
    ///
    /// Must not be invoked twice on one session — reconfiguration changes
    /// the switch's program without updating the operator-supplied P4Info,
    /// so a second upload would run against stale metadata.
    pub async fn set_forwarding_pipeline_config(
        &mut self,
        p4info_path: &Path,
        pipeline_json_path: &Path,
    ) -> Result<()> {
        if self.latest_pipeline_json.is_some() {
            return Err(ReconfigError::PreconditionUnmet(format!(
                "set_forwarding_pipeline_config was already performed on {}",
                self.name
            )));
        }
        let p4info = tokio::fs::read(p4info_path).await?;
        let pipeline = PipelineJson::load(pipeline_json_path)?;
        let tagged = tag_initial(&pipeline)?;
        let tagged_path = self.output_dir.join(format!("{}_initial.json", self.name));
        tagged.save(&tagged_path)?;
        self.transport
            .set_forwarding_pipeline_config(&p4info, &tagged.to_json_string()?)
            .await?;
        self.graphs.refresh(&tagged)?;
        self.latest_pipeline_json = Some(tagged_path);
        info!(switch = %self.name, "forwarding pipeline installed");
        Ok(())
    }

    /// Load a compiled pipeline into the switch's staging area. The
    /// document is tagged `new_*` and persisted first, so the staged nodes
    /// carry the identities later `insert` primitives refer to.
    pub async fn init_staging(&mut self, pipeline_json_path: &Path) -> Result<()> {
        let pipeline = PipelineJson::load(pipeline_json_path)?;
        let tagged = tag_merged(&pipeline)?;
        let staged_path = self.output_dir.join(format!("{}_staging.json", self.name));
        tagged.save(&staged_path)?;
        self.execute_primitive(&format!("init_p4objects_new {}", staged_path.display()))
            .await
    }

    /// Parse, gate, and deliver one primitive; on success persist the
    /// returned pipeline JSON and rebuild the current graph from it.
    pub async fn execute_primitive(&mut self, line: &str) -> Result<()> {
        let request: ReconfigRequest = line.parse()?;
        match (self.state(), request.action) {
            (SessionState::Connected, _) => {
                return Err(ReconfigError::PreconditionUnmet(format!(
                    "{} has no forwarding pipeline; run set_forwarding_pipeline_config first",
                    self.name
                )));
            }
            (SessionState::Pipelined, Action::InitP4ObjectsNew) => {}
            (SessionState::Pipelined, _) => {
                return Err(ReconfigError::PreconditionUnmet(format!(
                    "p4objects_new has not been initialized for {}; run init_p4objects_new first",
                    self.name
                )));
            }
            (SessionState::Ready, _) => {}
        }

        self.log_request(line);
        debug!(switch = %self.name, %request, "sending primitive");
        let response = self.transport.send_primitive(&request).await?;

        if let Some(json) = response.pipeline_json {
            let path = self
                .output_dir
                .join(format!("{}_response_{}.json", self.name, self.response_seq));
            self.response_seq += 1;
            tokio::fs::write(&path, &json).await?;
            let pipeline = PipelineJson::from_str(&json)?;
            self.graphs.refresh(&pipeline)?;
            self.latest_pipeline_json = Some(path);
        }
        if request.action == Action::InitP4ObjectsNew {
            self.initialized_staging = true;
        }
        Ok(())
    }

    /// Execute a planned primitive sequence in order, stopping at the first
    /// failure. No rollback is attempted; the switch keeps whatever state
    /// the last successful primitive produced.
    pub async fn execute_plan(&mut self, plan: &[String]) -> Result<()> {
        for (i, line) in plan.iter().enumerate() {
            info!(switch = %self.name, step = i, "{line}");
            self.execute_primitive(line).await?;
        }
        Ok(())
    }

    /// Splice the compiled function at `merged_json_path` (already tagged
    /// `new_*`) between `start` and `end`, mounted on `slot`.
    pub async fn install_func(
        &mut self,
        merged_json_path: &Path,
        start: &FlexName,
        end: &FlexName,
        slot: MountSlot,
    ) -> Result<()> {
        let merged = PipelineJson::load(merged_json_path)?;
        let merged_graph = build_pipeline_graph(&merged)?;
        let plan = {
            let runtime = self.graphs.current().ok_or_else(|| {
                ReconfigError::PreconditionUnmet(format!(
                    "{} has no pipeline graph to splice into",
                    self.name
                ))
            })?;
            plan_install(runtime, &merged_graph, merged_json_path, start, end, slot)?
        };
        self.execute_plan(&plan).await
    }

    /// Remove the function mounted on `slot`.
    pub async fn uninstall_func(&mut self, slot: MountSlot) -> Result<()> {
        let plan = {
            let runtime = self.graphs.current().ok_or_else(|| {
                ReconfigError::PreconditionUnmet(format!(
                    "{} has no pipeline graph to uninstall from",
                    self.name
                ))
            })?;
            plan_uninstall(runtime, slot)?
        };
        self.execute_plan(&plan).await
    }

    fn log_request(&self, line: &str) {
        let path = self
            .output_dir
            .join(format!("{}_p4runtime_requests.txt", self.name));
        let stamped = format!("[{}] {line}\n", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"));
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(stamped.as_bytes()));
        if let Err(e) = written {
            warn!(switch = %self.name, error = %e, "could not append to request log");
        }
    }
}

/// All sessions of one operator process, keyed by switch name
#[derive(Debug, Default)]
pub struct SessionSet {
    sessions: HashMap<String, SwitchSession>,
    current: Option<String>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and make it current
    pub fn add(&mut self, session: SwitchSession) {
        self.current = Some(session.name().to_string());
        self.sessions.insert(session.name().to_string(), session);
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&SwitchSession> {
        self.sessions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SwitchSession> {
        self.sessions.get_mut(name)
    }

    pub fn current(&self) -> Option<&SwitchSession> {
        self.current.as_deref().and_then(|n| self.sessions.get(n))
    }

    pub fn current_mut(&mut self) -> Option<&mut SwitchSession> {
        let name = self.current.clone()?;
        self.sessions.get_mut(&name)
    }

    /// Point the cursor at a known switch
    pub fn switch_to(&mut self, name: &str) -> Result<()> {
        if !self.sessions.contains_key(name) {
            return Err(ReconfigError::InvalidCommand(format!(
                "can't find connection whose name is {name}"
            )));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Execute a plan that may hop between switches via `connect` lines
    pub async fn execute_plan(&mut self, plan: &[String]) -> Result<()> {
        for (i, line) in plan.iter().enumerate() {
            if let Some(name) = line.strip_prefix("connect ") {
                self.switch_to(name.trim())?;
                continue;
            }
            let session = self.current_mut().ok_or_else(|| {
                ReconfigError::PreconditionUnmet("no connected switch".into())
            })?;
            info!(switch = %session.name, step = i, "{line}");
            session.execute_primitive(line).await?;
        }
        Ok(())
    }

    /// Copy the function mounted on `source_slot` of `source` onto
    /// `dest_slot` of `dest`, splicing between `start` and `end` there. The
    /// source switch is not modified; the cursor returns to `source`
    /// afterwards.
    pub async fn migrate_func(
        &mut self,
        source: &str,
        source_slot: MountSlot,
        dest: &str,
        start: &FlexName,
        end: &FlexName,
        dest_slot: MountSlot,
    ) -> Result<()> {
        let src = self.sessions.get(source).ok_or_else(|| {
            ReconfigError::InvalidCommand(format!("can't find connection whose name is {source}"))
        })?;
        let dst = self.sessions.get(dest).ok_or_else(|| {
            ReconfigError::InvalidCommand(format!("can't find connection whose name is {dest}"))
        })?;

        let latest = src.latest_pipeline_json().ok_or_else(|| {
            ReconfigError::PreconditionUnmet(format!("{source} has no pipeline to migrate from"))
        })?;
        let runtime = PipelineJson::load(latest)?;
        let snapshot = tag_migrate(&runtime)?;
        let snapshot_path = src
            .output_dir
            .join(format!("{source}_migrate_{}.json", source_slot));
        snapshot.save(&snapshot_path)?;
        let source_graph = build_pipeline_graph(&snapshot)?;

        let dest_runtime = dst
            .graphs()
            .current()
            .ok_or_else(|| {
                ReconfigError::PreconditionUnmet(format!(
                    "{dest} has no pipeline graph to splice into"
                ))
            })?
            .clone();

        let plan = plan_migrate(&MigratePlanRequest {
            source_switch: source,
            source_graph: &source_graph,
            migrate_json_path: &snapshot_path,
            source_slot,
            dest_switch: dest,
            dest_runtime: &dest_runtime,
            start,
            end,
            dest_slot,
        })?;
        self.execute_plan(&plan).await
    }
}
