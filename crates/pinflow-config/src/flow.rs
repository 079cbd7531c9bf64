use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionDef;
use crate::import::ImportSpec;
use crate::instance::InstanceDef;
use crate::pin::{InputDef, OutputDef};

/// A flow source document: one root node definition built from a graph of
/// instances, plus the imports that graph depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDef {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub inputs: BTreeMap<String, InputDef>,
  #[serde(default)]
  pub outputs: BTreeMap<String, OutputDef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub completion_outputs: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub reactive_inputs: Vec<String>,
  /// Module path -> names requested from that module.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub imports: BTreeMap<String, Vec<ImportSpec>>,
  #[serde(default)]
  pub instances: Vec<InstanceDef>,
  #[serde(default)]
  pub connections: Vec<ConnectionDef>,
}

impl FlowDef {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      ..Self::default()
    }
  }

  /// Find an instance by id.
  pub fn get_instance(&self, id: &str) -> Option<&InstanceDef> {
    self.instances.iter().find(|i| i.id == id)
  }
}
