use std::collections::BTreeMap;
use std::sync::Arc;

use pinflow_node::{MacroNode, NodeDefinition};

/// A package whose nodes are implemented in Rust and linked into the
/// process, importable by name like any installed package.
#[derive(Clone)]
pub struct NativePackage {
  name: String,
  nodes: BTreeMap<String, NodeDefinition>,
  macros: BTreeMap<String, Arc<dyn MacroNode>>,
}

/// Something a native package exports.
pub enum NativeExport<'a> {
  Node(&'a NodeDefinition),
  Macro(&'a Arc<dyn MacroNode>),
}

impl NativePackage {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      nodes: BTreeMap::new(),
      macros: BTreeMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Export a code node under its id.
  pub fn with_node(mut self, definition: NodeDefinition) -> Self {
    self.nodes.insert(definition.id.clone(), definition);
    self
  }

  /// Export a macro node under its id.
  pub fn with_macro(mut self, node: impl MacroNode + 'static) -> Self {
    self.macros.insert(node.id().to_string(), Arc::new(node));
    self
  }

  pub fn export(&self, name: &str) -> Option<NativeExport<'_>> {
    self
      .nodes
      .get(name)
      .map(NativeExport::Node)
      .or_else(|| self.macros.get(name).map(NativeExport::Macro))
  }

  pub fn exports(&self) -> impl Iterator<Item = &str> {
    self
      .nodes
      .keys()
      .chain(self.macros.keys())
      .map(String::as_str)
  }
}

/// Native packages available to the resolver, keyed by package name.
#[derive(Clone, Default)]
pub struct NodeLibrary {
  packages: BTreeMap<String, NativePackage>,
}

impl NodeLibrary {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_package(mut self, package: NativePackage) -> Self {
    self.add_package(package);
    self
  }

  pub fn add_package(&mut self, package: NativePackage) {
    self.packages.insert(package.name.clone(), package);
  }

  pub fn get(&self, name: &str) -> Option<&NativePackage> {
    self.packages.get(name)
  }

  pub fn package_names(&self) -> impl Iterator<Item = &str> {
    self.packages.keys().map(String::as_str)
  }
}
