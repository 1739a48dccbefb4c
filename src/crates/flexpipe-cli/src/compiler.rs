//! External compiler invocation
//!
//! Install takes a headers file and a control-block file, wraps them in the
//! program prototype, and hands the merged source to the external P4
//! compiler. The artifact folder is named after a SHA-256 digest of both
//! inputs so repeated compiles of the same function land in the same place
//! across runs and processes.

use crate::error::Result;
use flexpipe_core::ReconfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Scaffold the merged program is built from. The operator supplies the
/// headers and the ingress control block; the remaining v1model stages are
/// pass-through.
const PROTOTYPE: &str = r#"#include <core.p4>
#include <v1model.p4>

#include "headers.p4"
#include "control_block.p4"

parser FlexParser(packet_in packet,
                  out headers hdr,
                  inout metadata meta,
                  inout standard_metadata_t standard_metadata) {
    state start {
        transition accept;
    }
}

control FlexVerifyChecksum(inout headers hdr, inout metadata meta) {
    apply { }
}

control FlexEgress(inout headers hdr,
                   inout metadata meta,
                   inout standard_metadata_t standard_metadata) {
    apply { }
}

control FlexComputeChecksum(inout headers hdr, inout metadata meta) {
    apply { }
}

control FlexDeparser(packet_out packet, in headers hdr) {
    apply { }
}

V1Switch(
    FlexParser(),
    FlexVerifyChecksum(),
    %INGRESS%(),
    FlexEgress(),
    FlexComputeChecksum(),
    FlexDeparser()
) main;
"#;

/// Name of the control block declared in a control-block file
fn control_block_name(source: &str) -> Result<&str> {
    let after = source.find("control").map(|i| &source[i + "control".len()..]);
    let name = after
        .and_then(|rest| rest.split_once('(').map(|(head, _)| head.trim()))
        .filter(|n| !n.is_empty());
    name.ok_or_else(|| {
        ReconfigError::CompileFailed("no control block declaration found".into()).into()
    })
}

/// Digest naming the compile artifact folder; stable across processes
fn artifact_hash(header: &str, control_block: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(header.as_bytes());
    hasher.update(control_block.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Merge the operator's headers and control block into a complete program,
/// compile it, and return the path of the compiled pipeline JSON.
pub async fn merge_and_compile(
    header_path: &Path,
    control_block_path: &Path,
    output_root: &Path,
    compiler: &str,
) -> Result<PathBuf> {
    let header = tokio::fs::read_to_string(header_path).await?;
    let control_block = tokio::fs::read_to_string(control_block_path).await?;
    let control_name = control_block_name(&control_block)?;

    let folder = format!(
        "header_{}_control_block_{}_{}",
        header_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        control_block_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        artifact_hash(&header, &control_block),
    );
    let artifact_dir = output_root.join(folder);
    tokio::fs::create_dir_all(&artifact_dir).await?;
    tokio::fs::write(artifact_dir.join("headers.p4"), &header).await?;
    tokio::fs::write(artifact_dir.join("control_block.p4"), &control_block).await?;
    let merged_path = artifact_dir.join("merged.p4");
    tokio::fs::write(&merged_path, PROTOTYPE.replace("%INGRESS%", control_name)).await?;

    info!(compiler, merged = %merged_path.display(), "compiling merged program");
    let status = Command::new(compiler)
        .arg("--arch")
        .arg("v1model")
        .arg("--target")
        .arg("bmv2")
        .arg("-o")
        .arg(&artifact_dir)
        .arg(&merged_path)
        .status()
        .await
        .map_err(|e| ReconfigError::CompileFailed(format!("could not run {compiler}: {e}")))?;
    if !status.success() {
        return Err(ReconfigError::CompileFailed(format!(
            "{compiler} exited with {status}"
        ))
        .into());
    }

    let compiled = artifact_dir.join("merged.json");
    if !compiled.exists() {
        return Err(ReconfigError::CompileFailed(format!(
            "compiler produced no artifact at {}",
            compiled.display()
        ))
        .into());
    }
    debug!(compiled = %compiled.display(), "compile finished");
    Ok(compiled)
}
