//! Flex-name taggers
//!
//! The taggers stamp flex-names into a pipeline description. Each one is a
//! pure value-to-value function: the input document is never mutated and
//! persistence of the tagged artifact is the caller's side effect, which
//! keeps the planners trivially testable.
//!
//! - [`tag_initial`] marks a freshly-compiled pipeline as pre-existing
//!   (`old_*`) before its first upload.
//! - [`tag_merged`] marks a compiled splice as newly-introduced (`new_*`)
//!   before it is loaded into a staging area.
//! - [`tag_migrate`] retags a runtime snapshot for upload to another switch:
//!   every `old_*` becomes `new_*` (the destination owns its own `old_*`
//!   namespace) while mount-point branches keep their `flx_*` names.

use crate::error::{ReconfigError, Result};
use crate::name::{FlexName, Lineage, NodeKind};
use crate::pipeline::{ingress_object_mut, PipelineJson, FLEX_NAME_KEY};
use serde_json::Value;

/// Tag every table and conditional of a fresh pipeline with `old_*` names
pub fn tag_initial(pipeline: &PipelineJson) -> Result<PipelineJson> {
    tag_with_lineage(pipeline, Lineage::Old)
}

/// Tag every table and conditional of a compiled splice with `new_*` names
pub fn tag_merged(pipeline: &PipelineJson) -> Result<PipelineJson> {
    tag_with_lineage(pipeline, Lineage::New)
}

fn tag_with_lineage(pipeline: &PipelineJson, lineage: Lineage) -> Result<PipelineJson> {
    let mut doc = pipeline.as_value().clone();
    let ingress = ingress_object_mut(&mut doc)?;
    if ingress.get("action_calls").is_some() {
        return Err(ReconfigError::MalformedPipeline(
            "ingress pipeline contains unsupported action_calls".into(),
        ));
    }
    for (key, kind) in [("tables", NodeKind::Table), ("conditionals", NodeKind::Conditional)] {
        let nodes = ingress.get_mut(key).and_then(Value::as_array_mut).ok_or_else(|| {
            ReconfigError::MalformedPipeline(format!("ingress pipeline lacks a {key} sequence"))
        })?;
        for node in nodes {
            let obj = node.as_object_mut().ok_or_else(|| {
                ReconfigError::MalformedPipeline(format!("non-object entry in {key}"))
            })?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ReconfigError::MalformedPipeline(format!("entry in {key} lacks a name"))
                })?
                .to_string();
            let flex = FlexName::tagged(lineage, kind, &name)?;
            obj.insert(FLEX_NAME_KEY.into(), Value::String(flex.as_str().into()));
        }
    }
    Ok(PipelineJson::from_value(doc))
}

/// Retag a runtime snapshot for migration: `old_*` → `new_*`, `flx_*` kept
pub fn tag_migrate(pipeline: &PipelineJson) -> Result<PipelineJson> {
    let mut doc = pipeline.as_value().clone();
    let ingress = ingress_object_mut(&mut doc)?;
    for key in ["tables", "conditionals"] {
        let nodes = ingress.get_mut(key).and_then(Value::as_array_mut).ok_or_else(|| {
            ReconfigError::MalformedPipeline(format!("ingress pipeline lacks a {key} sequence"))
        })?;
        for node in nodes {
            let obj = node.as_object_mut().ok_or_else(|| {
                ReconfigError::MalformedPipeline(format!("non-object entry in {key}"))
            })?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            let tag = obj
                .get(FLEX_NAME_KEY)
                .and_then(Value::as_str)
                .ok_or(ReconfigError::MissingTag(name))?;
            let flex = FlexName::parse(tag)?;
            let retagged = match flex.lineage() {
                Lineage::Flex => flex,
                _ => FlexName::parse(&format!("new_{}", &flex.as_str()[4..]))?,
            };
            obj.insert(
                FLEX_NAME_KEY.into(),
                Value::String(retagged.as_str().into()),
            );
        }
    }
    Ok(PipelineJson::from_value(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::node_flex_name;
    use serde_json::json;

    fn untagged() -> PipelineJson {
        PipelineJson::from_value(json!({
            "pipelines": [{
                "name": "ingress",
                "init_table": "acl",
                "tables": [
                    {"name": "acl", "base_default_next": "node_2", "next_tables": {}}
                ],
                "conditionals": [
                    {"name": "node_2", "true_next": null, "false_next": null}
                ]
            }]
        }))
    }

    #[test]
    fn initial_tags_are_old() {
        let tagged = tag_initial(&untagged()).unwrap();
        let ingress = tagged.ingress().unwrap();
        let t = node_flex_name(&ingress.tables().unwrap()[0]).unwrap();
        let c = node_flex_name(&ingress.conditionals().unwrap()[0]).unwrap();
        assert_eq!(t.as_str(), "old_tacl");
        assert_eq!(c.as_str(), "old_cnode_2");
    }

    #[test]
    fn merged_tags_are_new() {
        let tagged = tag_merged(&untagged()).unwrap();
        let ingress = tagged.ingress().unwrap();
        let t = node_flex_name(&ingress.tables().unwrap()[0]).unwrap();
        assert_eq!(t.as_str(), "new_tacl");
    }

    #[test]
    fn taggers_do_not_mutate_input() {
        let input = untagged();
        let _ = tag_initial(&input).unwrap();
        assert!(input.as_value()["pipelines"][0]["tables"][0]
            .get(FLEX_NAME_KEY)
            .is_none());
    }

    #[test]
    fn action_calls_are_fatal() {
        let mut doc = untagged().into_value();
        doc["pipelines"][0]
            .as_object_mut()
            .unwrap()
            .insert("action_calls".into(), json!([]));
        let p = PipelineJson::from_value(doc);
        assert!(matches!(
            tag_merged(&p),
            Err(ReconfigError::MalformedPipeline(_))
        ));
        assert!(matches!(
            tag_initial(&p),
            Err(ReconfigError::MalformedPipeline(_))
        ));
    }

    #[test]
    fn migrate_renames_old_and_keeps_flex() {
        let runtime = PipelineJson::from_value(json!({
            "pipelines": [{
                "name": "ingress",
                "init_table": "acl",
                "tables": [
                    {"name": "acl", "flex_name": "old_tacl", "base_default_next": null, "next_tables": {}},
                    {"name": "X", "flex_name": "new_tX", "base_default_next": null, "next_tables": {}}
                ],
                "conditionals": [
                    {
                        "name": "flx_flex_func_mount_point_number_$3$",
                        "flex_name": "flx_flex_func_mount_point_number_$3$",
                        "true_next": "X",
                        "false_next": null
                    }
                ]
            }]
        }));
        let snapshot = tag_migrate(&runtime).unwrap();
        let ingress = snapshot.ingress().unwrap();
        let tables = ingress.tables().unwrap();
        assert_eq!(node_flex_name(&tables[0]).unwrap().as_str(), "new_tacl");
        assert_eq!(node_flex_name(&tables[1]).unwrap().as_str(), "new_tX");
        let flx = node_flex_name(&ingress.conditionals().unwrap()[0]).unwrap();
        assert_eq!(flx.as_str(), "flx_flex_func_mount_point_number_$3$");
    }

    #[test]
    fn migrate_requires_tags() {
        let runtime = untagged();
        assert!(matches!(
            tag_migrate(&runtime),
            Err(ReconfigError::MissingTag(_))
        ));
    }
}
