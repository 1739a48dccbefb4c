//! Interactive operator shell
//!
//! One command per line. Session-management commands (`connect`,
//! `set_forwarding_pipeline_config`, `install_func`, ...) are handled here;
//! anything else is treated as a raw reconfiguration primitive and handed to
//! the current session. Warnings re-prompt, hard errors end the loop.

use crate::compiler;
use crate::config::ShellConfig;
use crate::error::{Result, ShellError};
use flexpipe_core::tagger::tag_merged;
use flexpipe_core::{
    FlexName, LoopbackSwitch, MountSlot, PipelineJson, ReconfigError, SessionSet, SwitchSession,
};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const HELP: &str = "\
Commands:
  connect <switch_name> <switch_address> <device_id>   connect to a new switch
  connect <switch_name>                                change to a known switch
  set_forwarding_pipeline_config <p4info> <bmv2_json>  init a switch (once per switch)
  init_p4objects_new <bmv2_json>                       load the staging area
  install_func <header> <control_block> <start>-><end> <mount_point_number>
  uninstall_func <mount_point_number>
  migrate_func <mount_point_number> <switch_name> <start>-><end> <mount_point_number>
  show_program_graph                                   dump the current pipeline graph
  list_switches                                        list known switches
  <primitive>                                          raw reconfiguration primitive
  h | help                                             this message
  q | quit                                             quit";

/// What the loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The operator shell: a session set plus configuration
pub struct Shell {
    sessions: SessionSet,
    config: ShellConfig,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        Ok(Shell {
            sessions: SessionSet::new(),
            config,
        })
    }

    pub fn sessions(&self) -> &SessionSet {
        &self.sessions
    }

    fn current(&mut self) -> Result<&mut SwitchSession> {
        self.sessions.current_mut().ok_or_else(|| {
            ShellError::Warning(
                "This CLI doesn't connect to any switch now, please use `connect` command".into(),
            )
        })
    }

    fn require_pipelined(session: &SwitchSession) -> Result<()> {
        if session.latest_pipeline_json().is_none() {
            return Err(ShellError::Warning(
                "The switch hasn't been initiated, please use `set_forwarding_pipeline_config` \
                 command"
                    .into(),
            ));
        }
        Ok(())
    }

    fn require_file(path: &str, what: &str) -> Result<()> {
        if !Path::new(path).exists() {
            return Err(ReconfigError::InvalidCommand(format!("{what} not found: {path}")).into());
        }
        Ok(())
    }

    /// `<start>-><end>` in human-readable names
    fn parse_mount_point(mount_point: &str) -> Result<(FlexName, FlexName)> {
        let Some((start, end)) = mount_point.split_once("->") else {
            return Err(ReconfigError::InvalidCommand(format!(
                "parsing mount point fails, mount point is: {mount_point}"
            ))
            .into());
        };
        Ok((
            FlexName::from_human_readable(start.trim()).map_err(ShellError::from)?,
            FlexName::from_human_readable(end.trim()).map_err(ShellError::from)?,
        ))
    }

    /// Execute one shell command line
    pub async fn exec_line(&mut self, line: &str) -> Result<Flow> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            ["h"] | ["help"] => println!("{HELP}"),
            ["q"] | ["quit"] => return Ok(Flow::Quit),

            ["list_switches"] => {
                if self.sessions.is_empty() {
                    return Err(ShellError::Warning(
                        "CLI doesn't connect to any switch".into(),
                    ));
                }
                let mut names: Vec<&str> = self.sessions.names().collect();
                names.sort_unstable();
                for name in names {
                    let s = self.sessions.get(name).unwrap();
                    println!(
                        "connection [{name}]: address: {}, device_id: {}",
                        s.address(),
                        s.device_id()
                    );
                }
            }

            ["show_program_graph"] => {
                let session = self.current()?;
                let Some(graph) = session.graphs().current() else {
                    return Err(ShellError::Warning(format!(
                        "Connection {} doesn't have any program graph",
                        session.name()
                    )));
                };
                for vertex in graph.vertices() {
                    for edge in graph.out_edges(vertex) {
                        println!(
                            "{} --{}--> {}",
                            edge.from.to_human_readable(),
                            edge.label,
                            edge.to.to_human_readable()
                        );
                    }
                }
            }

            ["connect", name] => {
                self.sessions
                    .switch_to(name)
                    .map_err(|e| ShellError::Warning(e.to_string()))?;
            }
            ["connect", name, address, device_id] => {
                let device_id: u64 = device_id.parse().map_err(|_| {
                    ReconfigError::InvalidCommand(format!(
                        "device id is not an integer: {device_id}"
                    ))
                })?;
                println!("Connecting ...");
                let session = SwitchSession::connect(
                    name,
                    address,
                    device_id,
                    Box::new(LoopbackSwitch::new()),
                    &self.config.output_dir.join(name),
                )
                .await?;
                self.sessions.add(session);
                println!("Connect successfully");
            }

            ["set_forwarding_pipeline_config", p4info, bmv2_json] => {
                Self::require_file(p4info, "p4info file")?;
                Self::require_file(bmv2_json, "bmv2 JSON file")?;
                let session = self.current()?;
                println!("Installing p4 program on {} ...", session.name());
                session
                    .set_forwarding_pipeline_config(Path::new(p4info), Path::new(bmv2_json))
                    .await?;
                println!("Install successfully");
            }

            ["init_p4objects_new", bmv2_json] => {
                Self::require_file(bmv2_json, "bmv2 JSON file")?;
                let session = self.current()?;
                Self::require_pipelined(session)?;
                session.init_staging(Path::new(bmv2_json)).await?;
            }

            ["install_func", header, control_block, mount_point, slot] => {
                {
                    let session = self.current()?;
                    Self::require_pipelined(session)?;
                }
                Self::require_file(header, "p4 header file")?;
                Self::require_file(control_block, "control block file")?;
                let slot = MountSlot::parse(slot).map_err(ShellError::from)?;
                let (start, end) = Self::parse_mount_point(mount_point)?;

                println!("Installing function ...");
                let merged = compiler::merge_and_compile(
                    Path::new(header),
                    Path::new(control_block),
                    &self.config.output_dir,
                    &self.config.compiler,
                )
                .await?;
                // stamp the splice new_* so the staged nodes carry the
                // identities the plan refers to
                let tagged = tag_merged(&PipelineJson::load(&merged)?)?;
                tagged.save(&merged)?;

                let session = self.current()?;
                session.install_func(&merged, &start, &end, slot).await?;
                println!("Install successfully");
            }

            ["uninstall_func", slot] => {
                {
                    let session = self.current()?;
                    Self::require_pipelined(session)?;
                }
                let slot = MountSlot::parse(slot).map_err(ShellError::from)?;
                println!("Uninstalling function ...");
                let session = self.current()?;
                session.uninstall_func(slot).await?;
                println!("Uninstall successfully");
            }

            ["migrate_func", source_slot, dest, mount_point, dest_slot] => {
                let source = {
                    let session = self.current()?;
                    Self::require_pipelined(session)?;
                    session.name().to_string()
                };
                let source_slot = MountSlot::parse(source_slot).map_err(ShellError::from)?;
                let dest_slot = MountSlot::parse(dest_slot).map_err(ShellError::from)?;
                let (start, end) = Self::parse_mount_point(mount_point)?;
                println!("Migrating function ...");
                self.sessions
                    .migrate_func(&source, source_slot, dest, &start, &end, dest_slot)
                    .await?;
                println!("Migrate successfully");
            }

            _ => {
                // raw reconfiguration primitive
                let session = self.current()?;
                Self::require_pipelined(session)?;
                println!("Runtime reconfigurating ...");
                session.execute_primitive(line).await.map_err(|e| match e {
                    ReconfigError::InvalidCommand(_) => {
                        ShellError::Warning("Invalid command, please enter again".into())
                    }
                    other => ShellError::Reconfig(other),
                })?;
                println!("Runtime reconfiguration ends");
            }
        }
        Ok(Flow::Continue)
    }

    fn prompt(&self) {
        let prefix = self
            .sessions
            .current()
            .map(|s| format!("({}) ", s.name()))
            .unwrap_or_default();
        print!("{prefix}flexpipe> ");
        let _ = std::io::stdout().flush();
    }

    /// Interactive loop: warnings re-prompt, hard errors end the session
    pub async fn run_interactive(&mut self) -> i32 {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.prompt();
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    eprintln!("{e}");
                    return 1;
                }
            };
            match self.exec_line(&line).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) if e.is_warning() => println!("{e}"),
                Err(e) => {
                    eprintln!("{e}");
                    return 1;
                }
            }
        }
        println!("CLI quit");
        0
    }

    /// Batch mode: stop at the first warning or error
    pub async fn run_script(&mut self, script: &str) -> i32 {
        info!("start running script");
        for (i, line) in script.lines().enumerate() {
            info!(step = i, "{line}");
            match self.exec_line(line).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => {
                    eprintln!("{e}");
                    return 1;
                }
            }
        }
        info!("all commands are executed");
        0
    }
}
