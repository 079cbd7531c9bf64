use std::fs;

use pinflow_node::NodeBody;
use pinflow_resolver::{Resolver, Secrets, StandardResolver};
use pinflow_stdlib::{PACKAGE_NAME, library, package};

#[test]
fn test_package_exports() {
  let package = package().unwrap();
  let mut exports: Vec<&str> = package.exports().collect();
  exports.sort();
  assert_eq!(
    exports,
    vec!["Add", "Collect", "Debounce", "Delay", "InlineValue"]
  );
  assert_eq!(package.name(), PACKAGE_NAME);
}

#[test]
fn test_flow_importing_stdlib_resolves() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("main.flow.yaml");
  fs::write(
    &path,
    r#"
id: Main
inputs: { n: {} }
outputs: { list: {} }
completionOutputs: [list]
imports:
  "@pinflow/stdlib": [Add, { name: Collect, alias: Gather }, InlineValue]
instances:
  - id: one
    nodeId: InlineValue
    macroData: { value: 1 }
  - id: add
    nodeId: Add
  - id: gather
    nodeId: Gather
    macroData: { strategy: count, count: 2 }
connections:
  - { from: { insId: __this, pinId: n }, to: { insId: add, pinId: n1 } }
  - { from: { insId: one, pinId: value }, to: { insId: add, pinId: n2 } }
  - { from: { insId: add, pinId: r }, to: { insId: gather, pinId: value } }
  - { from: { insId: gather, pinId: list }, to: { insId: __this, pinId: list } }
"#,
  )
  .unwrap();

  let resolver = StandardResolver::new(library().unwrap());
  let graph = resolver.resolve(&path, &Secrets::new()).unwrap();

  assert!(graph.find_missing_dependency().is_none());
  let add = graph.get("Add").unwrap();
  assert!(matches!(&add.body, NodeBody::Code(i) if i.key() == "@pinflow/stdlib/Add"));
  assert_eq!(graph.dependencies.len(), 3);
}
