use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use pinflow_config::{PinRef, Position, THIS_INSTANCE_ID};
use serde::{Serialize, Serializer};

use crate::Value;
use crate::behavior::RunBehavior;
use crate::error::DefinitionError;
use crate::pin::{ERROR_PIN_ID, InputMode, InputPinConfig, InputPinDef, OutputPinDef, is_reserved_pin};

/// A run behavior paired with the stable key it was registered under.
///
/// Two implementations are equal when their keys are equal, so resolved
/// graphs built from the same sources compare equal.
#[derive(Clone)]
pub struct Implementation {
  key: String,
  behavior: Arc<dyn RunBehavior>,
}

impl Implementation {
  pub fn new(key: impl Into<String>, behavior: impl RunBehavior + 'static) -> Self {
    Self {
      key: key.into(),
      behavior: Arc::new(behavior),
    }
  }

  pub fn from_arc(key: impl Into<String>, behavior: Arc<dyn RunBehavior>) -> Self {
    Self {
      key: key.into(),
      behavior,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn behavior(&self) -> &Arc<dyn RunBehavior> {
    &self.behavior
  }
}

impl PartialEq for Implementation {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key
  }
}

impl std::fmt::Debug for Implementation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Implementation").field(&self.key).finish()
  }
}

impl Serialize for Implementation {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.key)
  }
}

/// A directed edge between two pins of the same graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Connection {
  pub from: PinRef,
  pub to: PinRef,
}

impl Connection {
  pub fn new(
    from_ins: impl Into<String>,
    from_pin: impl Into<String>,
    to_ins: impl Into<String>,
    to_pin: impl Into<String>,
  ) -> Self {
    Self {
      from: PinRef::new(from_ins, from_pin),
      to: PinRef::new(to_ins, to_pin),
    }
  }
}

impl From<&pinflow_config::ConnectionDef> for Connection {
  fn from(def: &pinflow_config::ConnectionDef) -> Self {
    Self {
      from: def.from.clone(),
      to: def.to.clone(),
    }
  }
}

/// A placement of a node definition inside a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
  pub id: String,
  /// Id of the definition in the resolved dependency map. Ignored when
  /// `inline` is set.
  pub node_id: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: BTreeMap<String, InputPinConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub macro_data: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub inline: Option<Box<NodeDefinition>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pos: Option<Position>,
}

impl NodeInstance {
  pub fn new(id: impl Into<String>, node_id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      node_id: node_id.into(),
      inputs: BTreeMap::new(),
      macro_data: None,
      inline: None,
      pos: None,
    }
  }

  /// An instance carrying its own definition.
  pub fn inline(id: impl Into<String>, definition: NodeDefinition) -> Self {
    let mut instance = Self::new(id, definition.id.clone());
    instance.inline = Some(Box::new(definition));
    instance
  }

  pub fn with_input(mut self, pin: impl Into<String>, config: InputPinConfig) -> Self {
    self.inputs.insert(pin.into(), config);
    self
  }

  pub fn with_macro_data(mut self, data: Value) -> Self {
    self.macro_data = Some(data);
    self
  }
}

/// The body of a visual node: instances wired by connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisualGraph {
  pub instances: Vec<NodeInstance>,
  pub connections: Vec<Connection>,
}

impl VisualGraph {
  pub fn new(instances: Vec<NodeInstance>, connections: Vec<Connection>) -> Self {
    Self {
      instances,
      connections,
    }
  }

  pub fn instance(&self, id: &str) -> Option<&NodeInstance> {
    self.instances.iter().find(|i| i.id == id)
  }

  /// Whether any connection targets `ins_id.pin_id`.
  pub fn is_connected(&self, ins_id: &str, pin_id: &str) -> bool {
    self.incoming(ins_id, pin_id).next().is_some()
  }

  pub fn incoming<'a>(
    &'a self,
    ins_id: &'a str,
    pin_id: &'a str,
  ) -> impl Iterator<Item = &'a Connection> + 'a {
    self
      .connections
      .iter()
      .filter(move |c| c.to.ins_id == ins_id && c.to.pin_id == pin_id)
  }

  pub fn outgoing<'a>(
    &'a self,
    ins_id: &'a str,
    pin_id: &'a str,
  ) -> impl Iterator<Item = &'a Connection> + 'a {
    self
      .connections
      .iter()
      .filter(move |c| c.from.ins_id == ins_id && c.from.pin_id == pin_id)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeBody {
  Code(Implementation),
  Visual(VisualGraph),
}

/// A reusable node. Immutable once built; construct through [`NodeSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub inputs: BTreeMap<String, InputPinDef>,
  pub outputs: BTreeMap<String, OutputPinDef>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub completion_outputs: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub reactive_inputs: Vec<String>,
  pub externally_triggered: bool,
  pub body: NodeBody,
}

impl NodeDefinition {
  pub fn graph(&self) -> Option<&VisualGraph> {
    match &self.body {
      NodeBody::Visual(graph) => Some(graph),
      NodeBody::Code(_) => None,
    }
  }

  pub fn graph_mut(&mut self) -> Option<&mut VisualGraph> {
    match &mut self.body {
      NodeBody::Visual(graph) => Some(graph),
      NodeBody::Code(_) => None,
    }
  }

  pub fn implementation(&self) -> Option<&Implementation> {
    match &self.body {
      NodeBody::Code(implementation) => Some(implementation),
      NodeBody::Visual(_) => None,
    }
  }

  pub fn is_visual(&self) -> bool {
    matches!(self.body, NodeBody::Visual(_))
  }

  /// Whether `pin` is a declared output or the implicit error pin.
  pub fn has_output(&self, pin: &str) -> bool {
    pin == ERROR_PIN_ID || self.outputs.contains_key(pin)
  }

  pub fn is_reactive(&self, input: &str) -> bool {
    self.reactive_inputs.iter().any(|i| i == input)
  }

  pub fn is_completion_output(&self, output: &str) -> bool {
    self.completion_outputs.iter().any(|o| o == output)
  }
}

struct PendingInput {
  mode: String,
  default_value: Option<Value>,
  description: Option<String>,
}

enum PendingBody {
  None,
  Code(Implementation),
  Visual(VisualGraph),
}

/// Builder for [`NodeDefinition`]; validated by [`define_node`].
pub struct NodeSpec {
  id: String,
  namespace: Option<String>,
  description: Option<String>,
  inputs: Vec<(String, PendingInput)>,
  outputs: BTreeMap<String, OutputPinDef>,
  completion_outputs: Vec<String>,
  reactive_inputs: Vec<String>,
  externally_triggered: bool,
  body: PendingBody,
}

impl NodeSpec {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      namespace: None,
      description: None,
      inputs: Vec::new(),
      outputs: BTreeMap::new(),
      completion_outputs: Vec::new(),
      reactive_inputs: Vec::new(),
      externally_triggered: false,
      body: PendingBody::None,
    }
  }

  pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
    self.namespace = Some(namespace.into());
    self
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Declare an input; `mode` is one of `required`, `optional`,
  /// `required-if-connected`.
  pub fn input(self, name: impl Into<String>, mode: impl Into<String>) -> Self {
    self.input_full(name, mode, None, None)
  }

  pub fn input_with_default(
    self,
    name: impl Into<String>,
    mode: impl Into<String>,
    default_value: Value,
  ) -> Self {
    self.input_full(name, mode, Some(default_value), None)
  }

  pub fn input_full(
    mut self,
    name: impl Into<String>,
    mode: impl Into<String>,
    default_value: Option<Value>,
    description: Option<String>,
  ) -> Self {
    self.inputs.push((
      name.into(),
      PendingInput {
        mode: mode.into(),
        default_value,
        description,
      },
    ));
    self
  }

  pub fn output(mut self, name: impl Into<String>) -> Self {
    self.outputs.insert(name.into(), OutputPinDef::default());
    self
  }

  pub fn output_def(mut self, name: impl Into<String>, def: OutputPinDef) -> Self {
    self.outputs.insert(name.into(), def);
    self
  }

  pub fn delayed_output(self, name: impl Into<String>) -> Self {
    self.output_def(
      name,
      OutputPinDef {
        delayed: true,
        description: None,
      },
    )
  }

  pub fn completion_output(mut self, name: impl Into<String>) -> Self {
    self.completion_outputs.push(name.into());
    self
  }

  pub fn reactive_input(mut self, name: impl Into<String>) -> Self {
    self.reactive_inputs.push(name.into());
    self
  }

  pub fn externally_triggered(mut self) -> Self {
    self.externally_triggered = true;
    self
  }

  pub fn code(mut self, key: impl Into<String>, behavior: impl RunBehavior + 'static) -> Self {
    self.body = PendingBody::Code(Implementation::new(key, behavior));
    self
  }

  pub fn implementation(mut self, implementation: Implementation) -> Self {
    self.body = PendingBody::Code(implementation);
    self
  }

  pub fn visual(mut self, graph: VisualGraph) -> Self {
    self.body = PendingBody::Visual(graph);
    self
  }

  pub fn build(self) -> Result<NodeDefinition, DefinitionError> {
    define_node(self)
  }
}

/// Validate a [`NodeSpec`] into an immutable [`NodeDefinition`].
pub fn define_node(spec: NodeSpec) -> Result<NodeDefinition, DefinitionError> {
  let node_id = spec.id;

  let mut inputs = BTreeMap::new();
  for (name, pending) in spec.inputs {
    if is_reserved_pin(&name) {
      return Err(DefinitionError::ReservedPinName { node_id, pin: name });
    }
    if inputs.contains_key(&name) {
      return Err(DefinitionError::DuplicateInput { node_id, pin: name });
    }
    let Some(mode) = InputMode::parse(&pending.mode) else {
      return Err(DefinitionError::UnknownInputMode {
        node_id,
        pin: name,
        mode: pending.mode,
      });
    };
    inputs.insert(
      name,
      InputPinDef {
        mode,
        default_value: pending.default_value,
        description: pending.description,
      },
    );
  }

  if let Some(pin) = spec.outputs.keys().find(|name| is_reserved_pin(name)) {
    return Err(DefinitionError::ReservedPinName {
      node_id,
      pin: pin.clone(),
    });
  }

  if let Some(output) = spec
    .completion_outputs
    .iter()
    .find(|o| !spec.outputs.contains_key(*o))
  {
    return Err(DefinitionError::MissingCompletionOutput {
      node_id,
      output: output.clone(),
    });
  }

  if let Some(input) = spec
    .reactive_inputs
    .iter()
    .find(|i| !inputs.contains_key(*i))
  {
    return Err(DefinitionError::UnknownReactiveInput {
      node_id,
      input: input.clone(),
    });
  }

  let (body, externally_triggered) = match spec.body {
    PendingBody::None => return Err(DefinitionError::MissingBody { node_id }),
    PendingBody::Code(implementation) => (NodeBody::Code(implementation), spec.externally_triggered),
    PendingBody::Visual(graph) => {
      let mut seen = HashSet::new();
      for instance in &graph.instances {
        if instance.id == THIS_INSTANCE_ID || !seen.insert(instance.id.as_str()) {
          return Err(DefinitionError::DuplicateInstance {
            node_id,
            instance_id: instance.id.clone(),
          });
        }
      }
      (NodeBody::Visual(graph), true)
    }
  };

  if inputs.is_empty() && !externally_triggered {
    return Err(DefinitionError::NoInputs { node_id });
  }

  Ok(NodeDefinition {
    id: node_id,
    namespace: spec.namespace,
    description: spec.description,
    inputs,
    outputs: spec.outputs,
    completion_outputs: spec.completion_outputs,
    reactive_inputs: spec.reactive_inputs,
    externally_triggered,
    body,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::behavior::{NodeInputs, RunContext, behavior_fn};
  use serde_json::json;

  fn noop() -> impl RunBehavior {
    behavior_fn(|_inputs: NodeInputs, _ctx: RunContext| async { Ok(()) })
  }

  #[test]
  fn test_define_code_node() {
    let def = NodeSpec::new("Add")
      .input("n1", "required")
      .input_with_default("n2", "optional", json!(0))
      .output("r")
      .completion_output("r")
      .code("test/Add", noop())
      .build()
      .unwrap();

    assert_eq!(def.id, "Add");
    assert_eq!(def.inputs["n1"].mode, InputMode::Required);
    assert_eq!(def.inputs["n2"].default_value, Some(json!(0)));
    assert!(def.is_completion_output("r"));
    assert!(def.has_output("__error"));
    assert!(!def.is_visual());
    assert_eq!(def.implementation().map(|i| i.key()), Some("test/Add"));
  }

  #[test]
  fn test_unknown_completion_output() {
    let err = NodeSpec::new("N")
      .input("a", "required")
      .output("r")
      .completion_output("done")
      .code("k", noop())
      .build()
      .unwrap_err();

    assert_eq!(
      err,
      DefinitionError::MissingCompletionOutput {
        node_id: "N".to_string(),
        output: "done".to_string(),
      }
    );
  }

  #[test]
  fn test_unknown_reactive_input() {
    let err = NodeSpec::new("N")
      .input("a", "required")
      .reactive_input("b")
      .code("k", noop())
      .build()
      .unwrap_err();

    assert!(matches!(err, DefinitionError::UnknownReactiveInput { input, .. } if input == "b"));
  }

  #[test]
  fn test_unknown_input_mode() {
    let err = NodeSpec::new("N")
      .input("a", "mandatory")
      .code("k", noop())
      .build()
      .unwrap_err();

    assert!(matches!(err, DefinitionError::UnknownInputMode { mode, .. } if mode == "mandatory"));
  }

  #[test]
  fn test_zero_inputs_requires_external_trigger() {
    let err = NodeSpec::new("Tick")
      .output("t")
      .code("k", noop())
      .build()
      .unwrap_err();
    assert_eq!(
      err,
      DefinitionError::NoInputs {
        node_id: "Tick".to_string()
      }
    );

    let def = NodeSpec::new("Tick")
      .output("t")
      .externally_triggered()
      .code("k", noop())
      .build()
      .unwrap();
    assert!(def.externally_triggered);
  }

  #[test]
  fn test_duplicate_input_is_rejected() {
    let err = NodeSpec::new("N")
      .input("a", "required")
      .input_with_default("a", "optional", json!(1))
      .code("k", noop())
      .build()
      .unwrap_err();

    assert_eq!(
      err,
      DefinitionError::DuplicateInput {
        node_id: "N".to_string(),
        pin: "a".to_string(),
      }
    );
  }

  #[test]
  fn test_reserved_pin_names() {
    let err = NodeSpec::new("N")
      .input("a", "required")
      .output("__error")
      .code("k", noop())
      .build()
      .unwrap_err();
    assert!(matches!(err, DefinitionError::ReservedPinName { pin, .. } if pin == "__error"));

    let err = NodeSpec::new("N")
      .input("__this", "required")
      .code("k", noop())
      .build()
      .unwrap_err();
    assert!(matches!(err, DefinitionError::ReservedPinName { pin, .. } if pin == "__this"));
  }

  #[test]
  fn test_missing_body() {
    let err = NodeSpec::new("N").input("a", "required").build().unwrap_err();
    assert!(matches!(err, DefinitionError::MissingBody { .. }));
  }

  #[test]
  fn test_visual_node_is_externally_triggered() {
    let graph = VisualGraph::new(
      vec![NodeInstance::new("a", "Add")],
      vec![Connection::new("__this", "n", "a", "n1")],
    );
    let def = NodeSpec::new("Flow")
      .input("n", "required")
      .output("r")
      .visual(graph)
      .build()
      .unwrap();

    assert!(def.externally_triggered);
    let graph = def.graph().unwrap();
    assert!(graph.is_connected("a", "n1"));
    assert!(!graph.is_connected("a", "n2"));
    assert_eq!(graph.outgoing("__this", "n").count(), 1);
  }

  #[test]
  fn test_duplicate_instance_ids() {
    let graph = VisualGraph::new(
      vec![NodeInstance::new("a", "Add"), NodeInstance::new("a", "Add")],
      vec![],
    );
    let err = NodeSpec::new("Flow").visual(graph).build().unwrap_err();
    assert!(matches!(err, DefinitionError::DuplicateInstance { instance_id, .. } if instance_id == "a"));
  }

  #[test]
  fn test_implementation_equality_by_key() {
    let a = Implementation::new("k", noop());
    let b = Implementation::new("k", noop());
    let c = Implementation::new("other", noop());
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(serde_json::to_value(&a).unwrap(), json!("k"));
  }
}
