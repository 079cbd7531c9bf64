use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::flow::FlowDef;
use crate::pin::InputConfigDef;

/// Where an instance's node definition comes from.
///
/// When omitted, the instance's `nodeId` is looked up among the flow's
/// imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceSource {
  /// The root flow of another local file, path relative to the declaring file.
  File { path: String },
  /// A name exported by an installed or native package.
  Package { name: String },
  /// A sub-flow embedded directly in the instance.
  Inline { flow: Box<FlowDef> },
}

/// Editor position. Carried through resolution, ignored by execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub x: f64,
  pub y: f64,
}

/// A node placed inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDef {
  pub id: String,
  pub node_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<InstanceSource>,
  /// Input pin configuration, keyed by pin id.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub config: BTreeMap<String, InputConfigDef>,
  /// Configuration handed to a macro node when it is materialized.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub macro_data: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pos: Option<Position>,
}

impl InstanceDef {
  pub fn new(id: impl Into<String>, node_id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      node_id: node_id.into(),
      source: None,
      config: BTreeMap::new(),
      macro_data: None,
      pos: None,
    }
  }
}
