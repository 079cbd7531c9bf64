use std::collections::BTreeMap;

use serde::Serialize;

use crate::definition::{NodeDefinition, NodeInstance};

/// The flat output of resolution: a root definition plus every definition
/// its instances transitively reference, keyed by namespaced id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGraph {
  pub main: NodeDefinition,
  pub dependencies: BTreeMap<String, NodeDefinition>,
}

/// An instance whose node id is neither inline nor in the dependency map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
  /// Id of the definition whose graph holds the instance.
  pub flow: String,
  pub instance: String,
  pub node_id: String,
}

impl ResolvedGraph {
  pub fn new(main: NodeDefinition, dependencies: BTreeMap<String, NodeDefinition>) -> Self {
    Self { main, dependencies }
  }

  pub fn get(&self, node_id: &str) -> Option<&NodeDefinition> {
    self.dependencies.get(node_id)
  }

  /// The definition an instance runs: its inline definition if it has one,
  /// otherwise the dependency it references.
  pub fn definition_for<'a>(&'a self, instance: &'a NodeInstance) -> Option<&'a NodeDefinition> {
    match &instance.inline {
      Some(definition) => Some(definition),
      None => self.dependencies.get(&instance.node_id),
    }
  }

  /// First instance, in any graph reachable from `main`, whose definition
  /// cannot be found.
  pub fn find_missing_dependency(&self) -> Option<MissingDependency> {
    std::iter::once(&self.main)
      .chain(self.dependencies.values())
      .find_map(|definition| self.missing_in(definition))
  }

  fn missing_in(&self, definition: &NodeDefinition) -> Option<MissingDependency> {
    let graph = definition.graph()?;
    for instance in &graph.instances {
      match &instance.inline {
        Some(inline) => {
          if let Some(missing) = self.missing_in(inline) {
            return Some(missing);
          }
        }
        None if !self.dependencies.contains_key(&instance.node_id) => {
          return Some(MissingDependency {
            flow: definition.id.clone(),
            instance: instance.id.clone(),
            node_id: instance.node_id.clone(),
          });
        }
        None => {}
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::behavior::{NodeInputs, RunContext, behavior_fn};
  use crate::definition::{NodeSpec, VisualGraph};

  fn code(id: &str) -> NodeDefinition {
    NodeSpec::new(id)
      .input("a", "required")
      .output("r")
      .code(id, behavior_fn(|_: NodeInputs, _: RunContext| async { Ok(()) }))
      .build()
      .unwrap()
  }

  fn visual(id: &str, instances: Vec<NodeInstance>) -> NodeDefinition {
    NodeSpec::new(id)
      .visual(VisualGraph::new(instances, vec![]))
      .build()
      .unwrap()
  }

  #[test]
  fn test_definition_for_prefers_inline() {
    let mut deps = BTreeMap::new();
    deps.insert("Add".to_string(), code("Add"));
    let graph = ResolvedGraph::new(visual("Main", vec![]), deps);

    let referenced = NodeInstance::new("a", "Add");
    let inline = NodeInstance::inline("b", code("Local"));
    let dangling = NodeInstance::new("c", "Nope");

    assert_eq!(graph.definition_for(&referenced).map(|d| d.id.as_str()), Some("Add"));
    assert_eq!(graph.definition_for(&inline).map(|d| d.id.as_str()), Some("Local"));
    assert!(graph.definition_for(&dangling).is_none());
  }

  #[test]
  fn test_find_missing_dependency_descends_into_inline_graphs() {
    let nested = visual("Nested", vec![NodeInstance::new("x", "Ghost")]);
    let main = visual(
      "Main",
      vec![NodeInstance::new("a", "Add"), NodeInstance::inline("n", nested)],
    );
    let mut deps = BTreeMap::new();
    deps.insert("Add".to_string(), code("Add"));

    let missing = ResolvedGraph::new(main, deps).find_missing_dependency();
    assert_eq!(
      missing,
      Some(MissingDependency {
        flow: "Nested".to_string(),
        instance: "x".to_string(),
        node_id: "Ghost".to_string(),
      })
    );
  }

  #[test]
  fn test_complete_graph_has_no_missing_dependency() {
    let main = visual("Main", vec![NodeInstance::new("a", "Add")]);
    let mut deps = BTreeMap::new();
    deps.insert("Add".to_string(), code("Add"));
    assert!(ResolvedGraph::new(main, deps).find_missing_dependency().is_none());
  }
}
