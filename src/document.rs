//! Workflow document model: the JSON shapes submitted by authoring tools.
//!
//! A [`WorkflowDocument`] is a flat node list plus an edge list. A
//! [`WorkflowBundle`] groups several documents into one run: exactly one
//! `main` workflow and any number of named `sub` workflows callable from
//! call nodes. Node inputs are [`ValueSource`] descriptors: either literal
//! constants or references to another node's published output slot.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use std::fmt;

/// One node as authored: an id, a type string, and a free-form attribute
/// bag whose shape depends on the type. `meta` carries presentation-only
/// fields and is dropped during graph preparation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data,
            meta: Value::Null,
        }
    }
}

/// A directed edge. `source_port_id` is present only on edges leaving a
/// branch-producing node (condition), where it names the branch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    #[serde(rename = "sourceNodeID")]
    pub source_node_id: String,
    #[serde(rename = "targetNodeID")]
    pub target_node_id: String,
    #[serde(
        rename = "sourcePortID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_port_id: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            source_port_id: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.source_port_id = Some(port.into());
        self
    }
}

/// A single workflow graph as submitted for execution.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Role of a workflow within a bundle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Main,
    Sub,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowKind::Main => write!(f, "main"),
            WorkflowKind::Sub => write!(f, "sub"),
        }
    }
}

/// One workflow inside a bundle. Sub-workflow `name` values are the lookup
/// keys used by call nodes and must be unique across the bundle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEntry {
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowEntry {
    pub fn document(&self) -> WorkflowDocument {
        WorkflowDocument {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

/// Multi-workflow input: workflow id → entry.
pub type WorkflowBundle = FxHashMap<String, WorkflowEntry>;

/// Authoring artifact: reference producer ids may carry a `_locals` suffix
/// that must be stripped before store lookup.
const LOCALS_SUFFIX: &str = "_locals";

/// Where a node input comes from: a literal constant, or a reference to a
/// `(producer node, slot)` pair resolved at read time.
///
/// JSON forms:
/// - `{ "kind": "constant", "content": <value> }`
/// - `{ "kind": "ref", "content": [<producerNodeID>, <slot>] }`
/// - any bare non-descriptor value, treated as a constant
///
/// The legacy field name `type` is accepted in place of `kind`, and an
/// unrecognized kind string falls back to its `content` as a constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueSource {
    Constant(Value),
    Ref { node_id: String, slot: String },
}

impl ValueSource {
    pub fn constant(value: impl Into<Value>) -> Self {
        ValueSource::Constant(value.into())
    }

    pub fn reference(node_id: impl Into<String>, slot: impl Into<String>) -> Self {
        let node_id: String = node_id.into();
        let node_id = node_id
            .strip_suffix(LOCALS_SUFFIX)
            .map(str::to_string)
            .unwrap_or(node_id);
        ValueSource::Ref {
            node_id,
            slot: slot.into(),
        }
    }

    /// Interpret a raw JSON value as a descriptor.
    pub fn from_json(raw: &Value) -> Result<Self, String> {
        let Some(object) = raw.as_object() else {
            return Ok(ValueSource::Constant(raw.clone()));
        };
        let kind = object
            .get("kind")
            .or_else(|| object.get("type"))
            .and_then(Value::as_str);
        match kind {
            Some("ref") => {
                let content = object.get("content").and_then(Value::as_array);
                let (node, slot) = content
                    .and_then(|parts| match parts.as_slice() {
                        [node, slot] => Some((node.as_str()?, slot.as_str()?)),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        "ref descriptor content must be a [producerNodeID, slot] pair".to_string()
                    })?;
                Ok(ValueSource::reference(node, slot))
            }
            Some(_) => Ok(ValueSource::Constant(
                object.get("content").cloned().unwrap_or(Value::Null),
            )),
            // No discriminator at all: a bare object literal.
            None => Ok(ValueSource::Constant(raw.clone())),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, ValueSource::Ref { .. })
    }

    pub fn to_json(&self) -> Value {
        match self {
            ValueSource::Constant(value) => json!({ "kind": "constant", "content": value }),
            ValueSource::Ref { node_id, slot } => {
                json!({ "kind": "ref", "content": [node_id, slot] })
            }
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValueSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        ValueSource::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

/// Pull a descriptor out of a node's `data.inputsValues` bag.
pub fn input_source(data: &Value, key: &str) -> Option<Result<ValueSource, String>> {
    data.get("inputsValues")
        .and_then(|inputs| inputs.get(key))
        .map(ValueSource::from_json)
}
