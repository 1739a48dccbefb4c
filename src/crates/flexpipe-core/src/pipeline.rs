//! Compiled pipeline descriptions
//!
//! A pipeline description is the JSON artifact produced by the P4 compiler.
//! Only a small part of its shape matters here — the ingress pipeline with
//! its `tables`, `conditionals`, `init_table` and successor links — so the
//! document is kept as a [`serde_json::Value`] and accessed through narrow
//! views. Everything else (match keys, actions, expressions, headers) is
//! preserved byte-for-byte through tag/rewrite cycles.
//!
//! The engine augments every table and conditional with a string field under
//! [`FLEX_NAME_KEY`] recording its flex-name; it is written before the first
//! upload and preserved by the switch in every response.

use crate::error::{ReconfigError, Result};
use crate::name::FlexName;
use serde_json::Value;
use std::path::Path;

/// JSON key under which a node's flex-name is stored
pub const FLEX_NAME_KEY: &str = "flex_name";

/// A compiled pipeline description
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineJson {
    value: Value,
}

impl PipelineJson {
    pub fn from_value(value: Value) -> Self {
        PipelineJson { value }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        Ok(PipelineJson {
            value: serde_json::from_str(s)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.value)?)
    }

    /// View of the ingress pipeline.
    ///
    /// Fails with [`ReconfigError::MalformedPipeline`] when the `pipelines`
    /// sequence is missing, no element is named `ingress`, or the ingress
    /// pipeline carries the unsupported `action_calls` field.
    pub fn ingress(&self) -> Result<IngressView<'_>> {
        let obj = ingress_object(&self.value)?;
        if obj.get("action_calls").is_some() {
            return Err(ReconfigError::MalformedPipeline(
                "ingress pipeline contains unsupported action_calls".into(),
            ));
        }
        Ok(IngressView { obj })
    }
}

/// Borrowed view of the ingress pipeline object
#[derive(Debug, Clone, Copy)]
pub struct IngressView<'a> {
    obj: &'a serde_json::Map<String, Value>,
}

impl<'a> IngressView<'a> {
    pub fn tables(&self) -> Result<&'a Vec<Value>> {
        self.obj
            .get("tables")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ReconfigError::MalformedPipeline("ingress pipeline lacks a tables sequence".into())
            })
    }

    pub fn conditionals(&self) -> Result<&'a Vec<Value>> {
        self.obj
            .get("conditionals")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ReconfigError::MalformedPipeline(
                    "ingress pipeline lacks a conditionals sequence".into(),
                )
            })
    }

    /// Name of the entry table; `None` when the pipeline is empty
    pub fn init_table(&self) -> Option<&'a str> {
        self.obj.get("init_table").and_then(Value::as_str)
    }
}

/// Locate the ingress pipeline object inside a raw document
pub(crate) fn ingress_object(value: &Value) -> Result<&serde_json::Map<String, Value>> {
    let pipelines = value
        .get("pipelines")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ReconfigError::MalformedPipeline("document lacks a pipelines sequence".into())
        })?;
    pipelines
        .iter()
        .filter_map(Value::as_object)
        .find(|p| p.get("name").and_then(Value::as_str) == Some("ingress"))
        .ok_or_else(|| ReconfigError::MalformedPipeline("no ingress pipeline present".into()))
}

/// Mutable variant of [`ingress_object`], for the taggers
pub(crate) fn ingress_object_mut(value: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    let pipelines = value
        .get_mut("pipelines")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            ReconfigError::MalformedPipeline("document lacks a pipelines sequence".into())
        })?;
    pipelines
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|p| p.get("name").and_then(Value::as_str) == Some("ingress"))
        .ok_or_else(|| ReconfigError::MalformedPipeline("no ingress pipeline present".into()))
}

/// The `name` field of a table or conditional object
pub(crate) fn node_name(node: &Value) -> Result<&str> {
    node.get("name").and_then(Value::as_str).ok_or_else(|| {
        ReconfigError::MalformedPipeline("table or conditional lacks a name".into())
    })
}

/// The previously-assigned flex-name of a node; [`ReconfigError::MissingTag`]
/// when absent
pub(crate) fn node_flex_name(node: &Value) -> Result<FlexName> {
    let name = node_name(node)?;
    let tag = node
        .get(FLEX_NAME_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| ReconfigError::MissingTag(name.to_string()))?;
    FlexName::parse(tag)
}

/// A successor field: `None` for JSON null or a missing key
pub(crate) fn successor<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "pipelines": [
                {
                    "name": "ingress",
                    "init_table": "t0",
                    "tables": [
                        {"name": "t0", "base_default_next": null, "next_tables": {}}
                    ],
                    "conditionals": []
                },
                {"name": "egress", "init_table": null, "tables": [], "conditionals": []}
            ]
        })
    }

    #[test]
    fn extracts_ingress() {
        let p = PipelineJson::from_value(minimal());
        let ingress = p.ingress().unwrap();
        assert_eq!(ingress.init_table(), Some("t0"));
        assert_eq!(ingress.tables().unwrap().len(), 1);
        assert!(ingress.conditionals().unwrap().is_empty());
    }

    #[test]
    fn missing_ingress_is_malformed() {
        let p = PipelineJson::from_value(json!({"pipelines": [{"name": "egress"}]}));
        assert!(matches!(
            p.ingress(),
            Err(ReconfigError::MalformedPipeline(_))
        ));
        let p = PipelineJson::from_value(json!({}));
        assert!(matches!(
            p.ingress(),
            Err(ReconfigError::MalformedPipeline(_))
        ));
    }

    #[test]
    fn action_calls_are_rejected() {
        let mut doc = minimal();
        ingress_object_mut(&mut doc)
            .unwrap()
            .insert("action_calls".into(), json!([]));
        let p = PipelineJson::from_value(doc);
        assert!(matches!(
            p.ingress(),
            Err(ReconfigError::MalformedPipeline(_))
        ));
    }

    #[test]
    fn untagged_node_reports_missing_tag() {
        let p = PipelineJson::from_value(minimal());
        let table = &p.ingress().unwrap().tables().unwrap()[0];
        assert!(matches!(
            node_flex_name(table),
            Err(ReconfigError::MissingTag(_))
        ));
    }
}
