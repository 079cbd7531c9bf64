use pinflow_node::{Connection, InputPinConfig, NodeDefinition, ResolvedGraph};

use crate::error::ResolveError;

/// Check every connection of every visual definition in `graph`.
pub(crate) fn validate_graph(graph: &ResolvedGraph) -> Result<(), ResolveError> {
  std::iter::once(&graph.main)
    .chain(graph.dependencies.values())
    .try_for_each(|definition| validate_definition(graph, definition))
}

fn validate_definition(graph: &ResolvedGraph, definition: &NodeDefinition) -> Result<(), ResolveError> {
  let Some(body) = definition.graph() else {
    return Ok(());
  };

  for connection in &body.connections {
    let invalid = |reason: String| ResolveError::InvalidConnection {
      flow: definition.id.clone(),
      connection: describe(connection),
      reason,
    };

    if connection.from.is_boundary() {
      if !definition.inputs.contains_key(&connection.from.pin_id) {
        return Err(invalid(format!("'{}' is not an input of the flow", connection.from.pin_id)));
      }
    } else {
      let source = instance_definition(graph, definition, &connection.from.ins_id)
        .ok_or_else(|| invalid(format!("unknown instance '{}'", connection.from.ins_id)))?;
      if !source.has_output(&connection.from.pin_id) {
        return Err(invalid(format!(
          "'{}' is not an output of '{}'",
          connection.from.pin_id, source.id
        )));
      }
    }

    if connection.to.is_boundary() {
      if !definition.outputs.contains_key(&connection.to.pin_id) {
        return Err(invalid(format!("'{}' is not an output of the flow", connection.to.pin_id)));
      }
    } else {
      let target = instance_definition(graph, definition, &connection.to.ins_id)
        .ok_or_else(|| invalid(format!("unknown instance '{}'", connection.to.ins_id)))?;
      if !target.inputs.contains_key(&connection.to.pin_id) {
        return Err(invalid(format!(
          "'{}' is not an input of '{}'",
          connection.to.pin_id, target.id
        )));
      }
      let configured_static = body
        .instance(&connection.to.ins_id)
        .and_then(|instance| instance.inputs.get(&connection.to.pin_id))
        .is_some_and(InputPinConfig::is_static);
      if configured_static {
        return Err(invalid("a static input cannot be connected".to_string()));
      }
    }
  }

  for instance in &body.instances {
    if let Some(inline) = &instance.inline {
      validate_definition(graph, inline)?;
    }
  }

  Ok(())
}

fn instance_definition<'a>(
  graph: &'a ResolvedGraph,
  definition: &'a NodeDefinition,
  ins_id: &str,
) -> Option<&'a NodeDefinition> {
  definition
    .graph()?
    .instance(ins_id)
    .and_then(|instance| graph.definition_for(instance))
}

fn describe(connection: &Connection) -> String {
  format!(
    "{}.{} -> {}.{}",
    connection.from.ins_id, connection.from.pin_id, connection.to.ins_id, connection.to.pin_id
  )
}
