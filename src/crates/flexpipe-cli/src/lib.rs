//! flexpipe operator CLI
//!
//! A line-oriented shell for reprogramming P4 switches at runtime: connect
//! to switches, upload pipelines, and install, uninstall, or migrate
//! functions without halting packet processing. The reconfiguration engine
//! itself lives in `flexpipe-core`; this crate adds the shell, its TOML
//! configuration, and the external-compiler wrapper.
//!
//! Sessions currently drive the in-memory loopback switch from
//! `flexpipe-core`; the transport seam is where a generated P4Runtime
//! client plugs in.

pub mod compiler;
pub mod config;
pub mod error;
pub mod shell;

pub use config::ShellConfig;
pub use error::{Result, ShellError};
pub use shell::{Flow, Shell};
