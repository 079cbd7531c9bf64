//! Namespace paths and the intermediate form of definitions during
//! resolution.
//!
//! While modules are being loaded every reference is a path of segments
//! relative to the module that holds it. Importing a module under an alias
//! prefixes all of its paths with that alias. Paths are only turned into
//! string ids once the whole graph is known.

use std::collections::{BTreeMap, HashMap, HashSet};

use pinflow_node::{InputPinConfig, NodeDefinition};

use crate::secrets::Secrets;

/// Separator used when rendering a path as an id.
pub(crate) const SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Segment {
  /// A local name bound by an import.
  Import(String),
  /// An instance: scopes inline sub-flows and materialized macros.
  Instance(String),
}

impl Segment {
  fn name(&self) -> &str {
    match self {
      Segment::Import(name) | Segment::Instance(name) => name,
    }
  }
}

pub(crate) type NsPath = Vec<Segment>;

/// What an instance runs.
#[derive(Debug, Clone)]
pub(crate) enum Target {
  Ref(NsPath),
  Inline(Box<Draft>),
}

impl Target {
  fn prefixed(&self, prefix: &[Segment]) -> Target {
    match self {
      Target::Ref(path) => Target::Ref(prefix.iter().chain(path).cloned().collect()),
      Target::Inline(draft) => Target::Inline(Box::new(draft.prefixed(prefix))),
    }
  }
}

/// A definition whose instance references are still paths. `targets` is
/// parallel to the graph's instances and empty for code nodes.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
  pub definition: NodeDefinition,
  pub targets: Vec<Target>,
}

impl Draft {
  pub fn code(definition: NodeDefinition) -> Self {
    Self {
      definition,
      targets: Vec::new(),
    }
  }

  fn prefixed(&self, prefix: &[Segment]) -> Draft {
    Draft {
      definition: self.definition.clone(),
      targets: self.targets.iter().map(|t| t.prefixed(prefix)).collect(),
    }
  }

  /// Produce the final definition: references become interned ids and
  /// secret references are substituted.
  pub fn into_definition(self, ids: &HashMap<NsPath, String>, secrets: &Secrets) -> NodeDefinition {
    let Draft {
      mut definition,
      targets,
    } = self;

    for pin in definition.inputs.values_mut() {
      if let Some(value) = &mut pin.default_value {
        secrets.substitute(value);
      }
    }

    if let Some(graph) = definition.graph_mut() {
      for (instance, target) in graph.instances.iter_mut().zip(targets) {
        for config in instance.inputs.values_mut() {
          if let InputPinConfig::Static(value) = config {
            secrets.substitute(value);
          }
        }
        match target {
          Target::Ref(path) => {
            if let Some(id) = ids.get(&path) {
              instance.node_id = id.clone();
            }
          }
          Target::Inline(draft) => {
            let inline = draft.into_definition(ids, secrets);
            instance.node_id = inline.id.clone();
            instance.inline = Some(Box::new(inline));
          }
        }
      }
    }

    definition
  }
}

/// A loaded flow: its root plus every definition it needs, keyed by paths
/// relative to the flow.
#[derive(Debug, Clone)]
pub(crate) struct Module {
  pub root: Draft,
  pub deps: BTreeMap<NsPath, Draft>,
}

impl Module {
  /// Copy this module's dependencies into `deps` under `prefix` and return
  /// the root, rewritten to the same prefix.
  pub fn hoist(&self, prefix: &[Segment], deps: &mut BTreeMap<NsPath, Draft>) -> Draft {
    for (path, draft) in &self.deps {
      let path = prefix.iter().chain(path).cloned().collect();
      deps.insert(path, draft.prefixed(prefix));
    }
    self.root.prefixed(prefix)
  }
}

pub(crate) fn render(path: &[Segment]) -> String {
  path
    .iter()
    .map(Segment::name)
    .collect::<Vec<_>>()
    .join(SEPARATOR)
}

/// Assign every path a distinct id. Paths whose rendering is already taken
/// get a numeric suffix, in path order.
pub(crate) fn intern<'a>(paths: impl IntoIterator<Item = &'a NsPath>) -> HashMap<NsPath, String> {
  let mut taken = HashSet::new();
  let mut ids = HashMap::new();

  for path in paths {
    let base = render(path);
    let mut id = base.clone();
    let mut n = 2;
    while !taken.insert(id.clone()) {
      id = format!("{base}_{n}");
      n += 1;
    }
    ids.insert(path.clone(), id);
  }

  ids
}

#[cfg(test)]
mod tests {
  use super::*;

  fn import(name: &str) -> Segment {
    Segment::Import(name.to_string())
  }

  #[test]
  fn test_render_joins_segments() {
    let path = vec![import("A"), import("Helper"), Segment::Instance("c1".to_string())];
    assert_eq!(render(&path), "A__Helper__c1");
  }

  #[test]
  fn test_intern_disambiguates_rendered_collisions() {
    let nested = vec![import("A"), import("B")];
    let flat = vec![import("A__B")];
    let inline = vec![Segment::Instance("A".to_string()), import("B")];

    let ids = intern([&nested, &flat, &inline]);
    let mut rendered: Vec<_> = ids.values().cloned().collect();
    rendered.sort();
    assert_eq!(rendered, vec!["A__B", "A__B_2", "A__B_3"]);
    assert_eq!(ids[&nested], "A__B");
  }
}
