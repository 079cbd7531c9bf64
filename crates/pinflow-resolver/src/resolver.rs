use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pinflow_config::{FlowDef, InstanceDef, InstanceSource, SourceFormat, parse_flow};
use pinflow_node::{DefinitionError, MacroNode, NodeDefinition, ResolvedGraph, Value};
use tracing::{debug, info, instrument};

use crate::error::ResolveError;
use crate::flow::flow_definition;
use crate::library::{NativeExport, NodeLibrary};
use crate::namespace::{Draft, Module, NsPath, Segment, Target, intern};
use crate::package::{PackageIndex, find_package_dir, load_package, read};
use crate::secrets::Secrets;
use crate::validate::validate_graph;

/// Resolver turns a flow source into a flat, namespaced graph.
pub trait Resolver: Send + Sync {
  /// Resolve the flow file at `path`.
  ///
  /// This process:
  /// 1. Loads the flow and, recursively, every module it imports
  /// 2. Checks each imported name is exported and bound once
  /// 3. Namespaces transitive dependencies and materializes macro nodes
  /// 4. Substitutes secret references and validates connections
  fn resolve(&self, path: &Path, secrets: &Secrets) -> Result<ResolvedGraph, ResolveError>;
}

/// Standard resolver: flow files, installed packages and a library of
/// native packages.
pub struct StandardResolver {
  library: NodeLibrary,
}

impl StandardResolver {
  pub fn new(library: NodeLibrary) -> Self {
    Self { library }
  }

  pub fn library(&self) -> &NodeLibrary {
    &self.library
  }

  /// Resolve an in-memory flow whose relative imports are based at
  /// `base_dir`.
  #[instrument(name = "resolve_source", skip(self, flow, secrets), fields(flow = %flow.id))]
  pub fn resolve_source(
    &self,
    flow: FlowDef,
    base_dir: &Path,
    secrets: &Secrets,
  ) -> Result<ResolvedGraph, ResolveError> {
    let mut session = ResolveSession::new(&self.library);
    let module = session.build_module(&flow, base_dir)?;
    finalize(module, secrets)
  }
}

impl Resolver for StandardResolver {
  #[instrument(name = "resolve", skip(self, secrets), fields(path = %path.display()))]
  fn resolve(&self, path: &Path, secrets: &Secrets) -> Result<ResolvedGraph, ResolveError> {
    let mut session = ResolveSession::new(&self.library);
    let (_, module) = session.load_flow_file(path)?;
    finalize(module, secrets)
  }
}

/// What a local name in a flow is bound to.
#[derive(Clone)]
struct Binding {
  /// Identifies the exported definition, so an instance `source` naming
  /// an already-imported definition reuses the binding.
  origin: String,
  kind: BindingKind,
}

#[derive(Clone)]
enum BindingKind {
  Code(NodeDefinition),
  Macro(Arc<dyn MacroNode>),
  Flow(Module),
}

/// State of one `resolve` call. Nothing is shared between calls.
struct ResolveSession<'a> {
  library: &'a NodeLibrary,
  stack: Vec<PathBuf>,
  flows: HashMap<PathBuf, Module>,
  packages: HashMap<PathBuf, PackageIndex>,
}

impl<'a> ResolveSession<'a> {
  fn new(library: &'a NodeLibrary) -> Self {
    Self {
      library,
      stack: Vec::new(),
      flows: HashMap::new(),
      packages: HashMap::new(),
    }
  }

  /// Load a flow file, memoized by canonical path.
  fn load_flow_file(&mut self, path: &Path) -> Result<(PathBuf, Module), ResolveError> {
    let canonical = fs::canonicalize(path).map_err(|source| ResolveError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    if let Some(start) = self.stack.iter().position(|p| *p == canonical) {
      let cycle = self.stack[start..]
        .iter()
        .chain(std::iter::once(&canonical))
        .map(|p| p.display().to_string())
        .collect();
      return Err(ResolveError::CircularImport { cycle });
    }

    if let Some(module) = self.flows.get(&canonical) {
      return Ok((canonical, module.clone()));
    }

    let flow = parse_flow(&read(&canonical)?, SourceFormat::from_path(&canonical)).map_err(
      |source| ResolveError::Parse {
        path: canonical.clone(),
        source,
      },
    )?;
    let base_dir = canonical
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    self.stack.push(canonical.clone());
    let result = self.build_module(&flow, &base_dir);
    self.stack.pop();
    let module = result?;

    debug!(
      path = %canonical.display(),
      flow = %flow.id,
      dependencies = module.deps.len(),
      "module_loaded"
    );
    self.flows.insert(canonical.clone(), module.clone());
    Ok((canonical, module))
  }

  fn build_module(&mut self, flow: &FlowDef, base_dir: &Path) -> Result<Module, ResolveError> {
    let definition = flow_definition(flow)?;

    let mut scope: BTreeMap<String, Binding> = BTreeMap::new();
    for (module_path, specs) in &flow.imports {
      for spec in specs {
        let binding = self.import(module_path, spec.exported_name(), base_dir)?;
        let alias = spec.local_alias();
        if scope.contains_key(alias) {
          return Err(ResolveError::DuplicateExport {
            flow: flow.id.clone(),
            name: alias.to_string(),
          });
        }
        scope.insert(alias.to_string(), binding);
      }
    }

    let mut deps = BTreeMap::new();
    let mut targets = Vec::with_capacity(flow.instances.len());
    for instance in &flow.instances {
      let target = match &instance.source {
        Some(InstanceSource::Inline { flow: inline }) => {
          let module = self.build_module(inline, base_dir)?;
          let prefix = [Segment::Instance(instance.id.clone())];
          Target::Inline(Box::new(module.hoist(&prefix, &mut deps)))
        }
        Some(InstanceSource::File { path: module_path })
        | Some(InstanceSource::Package { name: module_path }) => {
          let binding = self.import(module_path, &instance.node_id, base_dir)?;
          bind_source(&mut scope, flow, &instance.node_id, binding)?;
          bind_instance(&scope, flow, instance, &mut deps)?
        }
        None => bind_instance(&scope, flow, instance, &mut deps)?,
      };
      targets.push(target);
    }

    Ok(Module {
      root: Draft {
        definition,
        targets,
      },
      deps,
    })
  }

  /// Look up `name` in the module at `module_path`.
  fn import(&mut self, module_path: &str, name: &str, base_dir: &Path) -> Result<Binding, ResolveError> {
    if is_file_path(module_path) {
      let (canonical, module) = self.load_flow_file(&base_dir.join(module_path))?;
      if module.root.definition.id != name {
        return Err(ResolveError::unexported(module_path, name));
      }
      return Ok(Binding {
        origin: format!("{}#{name}", canonical.display()),
        kind: BindingKind::Flow(module),
      });
    }

    if let Some(package) = self.library.get(module_path) {
      let kind = match package.export(name) {
        Some(NativeExport::Node(definition)) => BindingKind::Code(definition.clone()),
        Some(NativeExport::Macro(node)) => BindingKind::Macro(node.clone()),
        None => return Err(ResolveError::unexported(module_path, name)),
      };
      return Ok(Binding {
        origin: format!("{module_path}#{name}"),
        kind,
      });
    }

    let dir = find_package_dir(base_dir, module_path).ok_or_else(|| {
      ResolveError::PackageNotFound {
        name: module_path.to_string(),
        from: base_dir.to_path_buf(),
      }
    })?;
    let index = match self.packages.entry(dir) {
      Entry::Occupied(entry) => entry.into_mut(),
      Entry::Vacant(entry) => {
        let index = load_package(entry.key())?;
        entry.insert(index)
      }
    };
    let file = index
      .exports
      .get(name)
      .cloned()
      .ok_or_else(|| ResolveError::unexported(&index.name, name))?;

    let (canonical, module) = self.load_flow_file(&file)?;
    Ok(Binding {
      origin: format!("{}#{name}", canonical.display()),
      kind: BindingKind::Flow(module),
    })
  }
}

/// Bind the definition named by an instance `source` under the instance's
/// node id, unless that exact definition is already bound.
fn bind_source(
  scope: &mut BTreeMap<String, Binding>,
  flow: &FlowDef,
  name: &str,
  binding: Binding,
) -> Result<(), ResolveError> {
  match scope.get(name) {
    Some(existing) if existing.origin == binding.origin => Ok(()),
    Some(_) => Err(ResolveError::DuplicateExport {
      flow: flow.id.clone(),
      name: name.to_string(),
    }),
    None => {
      scope.insert(name.to_string(), binding);
      Ok(())
    }
  }
}

/// Point an instance at the definition bound to its node id, adding that
/// definition (and, for flows, its own dependencies) to `deps`.
fn bind_instance(
  scope: &BTreeMap<String, Binding>,
  flow: &FlowDef,
  instance: &InstanceDef,
  deps: &mut BTreeMap<NsPath, Draft>,
) -> Result<Target, ResolveError> {
  let Some(binding) = scope.get(&instance.node_id) else {
    return Err(ResolveError::MissingDependency {
      flow: flow.id.clone(),
      instance: instance.id.clone(),
      node_id: instance.node_id.clone(),
    });
  };
  let alias = Segment::Import(instance.node_id.clone());

  let path = match &binding.kind {
    BindingKind::Code(definition) => {
      let path = vec![alias];
      deps
        .entry(path.clone())
        .or_insert_with(|| Draft::code(definition.clone()));
      path
    }
    BindingKind::Flow(module) => {
      let path = vec![alias];
      if !deps.contains_key(&path) {
        let root = module.hoist(&path, deps);
        deps.insert(path.clone(), root);
      }
      path
    }
    BindingKind::Macro(node) => {
      let config = instance
        .macro_data
        .clone()
        .unwrap_or_else(|| Value::Object(Default::default()));
      let definition = node
        .materialize(&config)
        .map_err(|e| ResolveError::definition(&flow.id, e))?;
      if definition.is_visual() {
        return Err(ResolveError::definition(
          &flow.id,
          DefinitionError::MacroProducedGraph {
            macro_id: node.id().to_string(),
          },
        ));
      }
      debug!(
        flow = %flow.id,
        instance = %instance.id,
        macro_id = %node.id(),
        "macro_materialized"
      );
      let path = vec![alias, Segment::Instance(instance.id.clone())];
      deps.insert(path.clone(), Draft::code(definition));
      path
    }
  };

  Ok(Target::Ref(path))
}

/// Intern paths, build final definitions and check the result.
fn finalize(module: Module, secrets: &Secrets) -> Result<ResolvedGraph, ResolveError> {
  let ids = intern(module.deps.keys());

  let mut dependencies = BTreeMap::new();
  for (path, draft) in module.deps {
    let mut definition = draft.into_definition(&ids, secrets);
    if let Some(id) = ids.get(&path) {
      definition.id = id.clone();
    }
    dependencies.insert(definition.id.clone(), definition);
  }
  let main = module.root.into_definition(&ids, secrets);
  let graph = ResolvedGraph::new(main, dependencies);

  if let Some(missing) = graph.find_missing_dependency() {
    return Err(ResolveError::MissingDependency {
      flow: missing.flow,
      instance: missing.instance,
      node_id: missing.node_id,
    });
  }
  validate_graph(&graph)?;

  info!(
    main = %graph.main.id,
    dependencies = graph.dependencies.len(),
    "flow_resolved"
  );
  Ok(graph)
}

fn is_file_path(module_path: &str) -> bool {
  module_path.starts_with("./")
    || module_path.starts_with("../")
    || Path::new(module_path).is_absolute()
    || [".yaml", ".yml", ".json"]
      .iter()
      .any(|ext| module_path.ends_with(ext))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_file_path() {
    assert!(is_file_path("./helper.flow.yaml"));
    assert!(is_file_path("../shared/x.flow.json"));
    assert!(is_file_path("helper.flow.yaml"));
    assert!(!is_file_path("@pinflow/stdlib"));
    assert!(!is_file_path("text-utils"));
  }
}
