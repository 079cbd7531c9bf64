use std::collections::BTreeMap;

use pinflow_config::{FlowDef, InstanceDef};
use pinflow_node::{
  Connection, InputPinConfig, NodeDefinition, NodeInstance, NodeSpec, OutputPinDef, VisualGraph,
};

use crate::error::ResolveError;

/// Build the root definition of a flow. Instance node ids are left as
/// authored; the resolver rewrites them once bindings are known.
pub(crate) fn flow_definition(flow: &FlowDef) -> Result<NodeDefinition, ResolveError> {
  let instances = flow
    .instances
    .iter()
    .map(|instance| node_instance(&flow.id, instance))
    .collect::<Result<Vec<_>, _>>()?;
  let connections = flow.connections.iter().map(Connection::from).collect();

  let mut spec = NodeSpec::new(&flow.id).visual(VisualGraph::new(instances, connections));
  if let Some(description) = &flow.description {
    spec = spec.description(description);
  }
  for (name, input) in &flow.inputs {
    spec = spec.input_full(
      name,
      &input.mode,
      input.default_value.clone(),
      input.description.clone(),
    );
  }
  for (name, output) in &flow.outputs {
    spec = spec.output_def(
      name,
      OutputPinDef {
        delayed: output.delayed,
        description: output.description.clone(),
      },
    );
  }
  for output in &flow.completion_outputs {
    spec = spec.completion_output(output);
  }
  for input in &flow.reactive_inputs {
    spec = spec.reactive_input(input);
  }

  spec
    .build()
    .map_err(|e| ResolveError::definition(&flow.id, e))
}

fn node_instance(flow_id: &str, def: &InstanceDef) -> Result<NodeInstance, ResolveError> {
  let inputs = def
    .config
    .iter()
    .map(|(pin, config)| {
      InputPinConfig::from_def(pin, config)
        .map(|config| (pin.clone(), config))
        .map_err(|e| ResolveError::definition(flow_id, e))
    })
    .collect::<Result<BTreeMap<_, _>, _>>()?;

  Ok(NodeInstance {
    id: def.id.clone(),
    node_id: def.node_id.clone(),
    inputs,
    macro_data: def.macro_data.clone(),
    inline: None,
    pos: def.pos,
  })
}
