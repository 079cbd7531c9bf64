//! Flattening of a resolved graph into live nodes.
//!
//! Code instances become [`CodeNode`]s holding their live input pins.
//! Visual instances become relays: values arriving at a relay input are
//! forwarded to the sub-graph's `__this` sources, and values reaching the
//! sub-graph's `__this` targets leave through the relay's outputs. Paths
//! join instance ids with `.`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use pinflow_node::{
  Connection, ERROR_PIN_ID, InputPinConfig, NodeBody, NodeDefinition, NodeInstance, ResolvedGraph,
  RunBehavior, Value, VisualGraph,
};

use crate::error::RuntimeError;
use crate::pin::LivePin;

/// Where a forwarded value goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Dest {
  /// An input of a node (a live pin, or a relay input).
  Pin { node: usize, pin: String },
  /// An output of a relay, reached from inside its sub-graph.
  RelayOutput { node: usize, pin: String },
  /// An output of the root graph.
  Boundary(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstanceStatus {
  Idle,
  Running,
  /// Run returned, completion outputs outstanding.
  Awaiting,
  Failed,
}

pub(crate) struct CodeNode {
  pub definition: NodeDefinition,
  pub behavior: Arc<dyn RunBehavior>,
  pub inputs: BTreeMap<String, LivePin>,
  pub status: InstanceStatus,
  /// Runs once at session start: the instance has no incoming
  /// connections, so no arrival will ever trigger it.
  pub start_trigger: bool,
  pub never_ran: bool,
  pub activation: u64,
  /// Delayed outputs of the run in flight.
  pub held: Vec<(String, Value)>,
  pub pending_completion: BTreeSet<String>,
}

impl CodeNode {
  pub fn is_satisfied(&self) -> bool {
    !self.inputs.values().any(LivePin::blocks)
  }

  /// New work for an idle instance. Before its first run any arrival
  /// counts; afterwards only queued values and reactive arrivals do.
  pub fn has_new_work(&self) -> bool {
    self.start_trigger
      || self.inputs.values().any(|pin| {
        pin.has_queued() || ((self.never_ran || pin.is_reactive()) && pin.has_new_value())
      })
  }

  /// New work for an instance awaiting its completion outputs.
  pub fn has_reactive_work(&self) -> bool {
    self
      .inputs
      .values()
      .any(|pin| pin.is_reactive() && pin.has_new_value())
  }

  pub fn inputs_state(&self) -> Value {
    Value::Object(
      self
        .inputs
        .iter()
        .map(|(name, pin)| (name.clone(), pin.describe()))
        .collect(),
    )
  }

  pub fn is_delayed(&self, pin: &str) -> bool {
    self
      .definition
      .outputs
      .get(pin)
      .is_some_and(|output| output.delayed)
  }
}

pub(crate) enum NodeKind {
  Code(Box<CodeNode>),
  Relay,
}

pub(crate) struct LiveNode {
  pub path: String,
  pub node_id: String,
  pub kind: NodeKind,
  pub declared_inputs: BTreeSet<String>,
  pub declared_outputs: BTreeSet<String>,
  pub output_routes: HashMap<String, Vec<Dest>>,
  /// Relays only: where each input forwards inside the sub-graph.
  pub input_routes: HashMap<String, Vec<Dest>>,
}

impl LiveNode {
  pub fn code(&self) -> Option<&CodeNode> {
    match &self.kind {
      NodeKind::Code(code) => Some(code),
      NodeKind::Relay => None,
    }
  }

  pub fn code_mut(&mut self) -> Option<&mut CodeNode> {
    match &mut self.kind {
      NodeKind::Code(code) => Some(code),
      NodeKind::Relay => None,
    }
  }

  pub fn has_output(&self, pin: &str) -> bool {
    pin == ERROR_PIN_ID || self.declared_outputs.contains(pin)
  }
}

pub(crate) struct LiveGraph {
  pub nodes: Vec<LiveNode>,
  pub paths: HashMap<String, usize>,
  /// Root `__this` sources.
  pub root_routes: HashMap<String, Vec<Dest>>,
  /// Relay inputs fed once at start: static configs and defaults.
  pub initial: Vec<(usize, String, Value)>,
}

pub(crate) fn build(graph: &ResolvedGraph) -> Result<LiveGraph, RuntimeError> {
  let wrapper;
  let root = if graph.main.is_visual() {
    &graph.main
  } else {
    wrapper = wrap_code(&graph.main);
    &wrapper
  };

  let mut live = LiveGraph {
    nodes: Vec::new(),
    paths: HashMap::new(),
    root_routes: HashMap::new(),
    initial: Vec::new(),
  };
  live.root_routes = flatten(graph, root, None, None, &mut live)?;
  Ok(live)
}

/// Present a code root as a one-instance graph.
fn wrap_code(main: &NodeDefinition) -> NodeDefinition {
  let id = main.id.clone();
  let connections = main
    .inputs
    .keys()
    .map(|pin| Connection::new(pinflow_node::THIS_INSTANCE_ID, pin, &id, pin))
    .chain(
      main
        .outputs
        .keys()
        .map(|pin| Connection::new(&id, pin, pinflow_node::THIS_INSTANCE_ID, pin)),
    )
    .collect();

  NodeDefinition {
    reactive_inputs: Vec::new(),
    externally_triggered: true,
    body: NodeBody::Visual(VisualGraph::new(
      vec![NodeInstance::inline(id, main.clone())],
      connections,
    )),
    ..main.clone()
  }
}

fn flatten(
  graph: &ResolvedGraph,
  definition: &NodeDefinition,
  prefix: Option<&str>,
  owner: Option<usize>,
  live: &mut LiveGraph,
) -> Result<HashMap<String, Vec<Dest>>, RuntimeError> {
  let Some(body) = definition.graph() else {
    return Ok(HashMap::new());
  };

  let mut local: HashMap<&str, usize> = HashMap::new();
  for instance in &body.instances {
    let path = match prefix {
      Some(prefix) => format!("{prefix}.{}", instance.id),
      None => instance.id.clone(),
    };
    let child = graph
      .definition_for(instance)
      .ok_or_else(|| RuntimeError::MissingDefinition {
        instance: path.clone(),
        node_id: instance.node_id.clone(),
      })?;

    if let Some(pin) = instance.inputs.keys().find(|pin| !child.inputs.contains_key(*pin)) {
      return Err(RuntimeError::pin(&path, pin, "not a declared input"));
    }

    let index = live.nodes.len();
    local.insert(instance.id.as_str(), index);
    live.paths.insert(path.clone(), index);

    let kind = match &child.body {
      NodeBody::Code(implementation) => NodeKind::Code(Box::new(CodeNode {
        definition: child.clone(),
        behavior: implementation.behavior().clone(),
        inputs: live_pins(body, instance, child, &path)?,
        status: InstanceStatus::Idle,
        start_trigger: !body.connections.iter().any(|c| c.to.ins_id == instance.id),
        never_ran: true,
        activation: 0,
        held: Vec::new(),
        pending_completion: BTreeSet::new(),
      })),
      NodeBody::Visual(_) => {
        for (pin, def) in &child.inputs {
          let value = match instance.inputs.get(pin) {
            Some(InputPinConfig::Static(value)) => Some(value.clone()),
            Some(_) => None,
            None if !body.is_connected(&instance.id, pin) => def.default_value.clone(),
            None => None,
          };
          if let Some(value) = value {
            live.initial.push((index, pin.clone(), value));
          }
        }
        NodeKind::Relay
      }
    };

    live.nodes.push(LiveNode {
      path: path.clone(),
      node_id: child.id.clone(),
      kind,
      declared_inputs: child.inputs.keys().cloned().collect(),
      declared_outputs: child.outputs.keys().cloned().collect(),
      output_routes: HashMap::new(),
      input_routes: HashMap::new(),
    });

    if child.is_visual() {
      let routes = flatten(graph, child, Some(&path), Some(index), live)?;
      live.nodes[index].input_routes = routes;
    }
  }

  let mut this_routes: HashMap<String, Vec<Dest>> = HashMap::new();
  for connection in &body.connections {
    let (to, pin) = (&connection.to.ins_id, &connection.to.pin_id);
    let dest = if connection.to.is_boundary() {
      match owner {
        Some(node) => Dest::RelayOutput {
          node,
          pin: pin.clone(),
        },
        None => Dest::Boundary(pin.clone()),
      }
    } else {
      let node = *local
        .get(to.as_str())
        .ok_or_else(|| RuntimeError::pin(to, pin, "connection targets an unknown instance"))?;
      if !live.nodes[node].declared_inputs.contains(pin) {
        return Err(RuntimeError::pin(&live.nodes[node].path, pin, "not a declared input"));
      }
      Dest::Pin {
        node,
        pin: pin.clone(),
      }
    };

    let (from, pin) = (&connection.from.ins_id, &connection.from.pin_id);
    if connection.from.is_boundary() {
      this_routes.entry(pin.clone()).or_default().push(dest);
    } else {
      let node = *local
        .get(from.as_str())
        .ok_or_else(|| RuntimeError::pin(from, pin, "connection starts at an unknown instance"))?;
      if !live.nodes[node].has_output(pin) {
        return Err(RuntimeError::pin(&live.nodes[node].path, pin, "not a declared output"));
      }
      live.nodes[node]
        .output_routes
        .entry(pin.clone())
        .or_default()
        .push(dest);
    }
  }

  Ok(this_routes)
}

fn live_pins(
  body: &VisualGraph,
  instance: &NodeInstance,
  definition: &NodeDefinition,
  path: &str,
) -> Result<BTreeMap<String, LivePin>, RuntimeError> {
  let mut pins = BTreeMap::new();
  for (name, def) in &definition.inputs {
    let connected = body.is_connected(&instance.id, name);
    let config = match instance.inputs.get(name) {
      Some(config) => config.clone(),
      None if connected => InputPinConfig::Queue,
      None => match &def.default_value {
        Some(value) => InputPinConfig::Static(value.clone()),
        None => InputPinConfig::Queue,
      },
    };
    if config.is_static() && connected {
      return Err(RuntimeError::pin(path, name, "static input has incoming connections"));
    }
    let pin = LivePin::new(config, def.mode.is_required(connected), definition.is_reactive(name));
    pins.insert(name.clone(), pin);
  }
  Ok(pins)
}
