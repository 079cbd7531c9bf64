use std::path::Path;

use crate::error::ConfigError;
use crate::flow::FlowDef;
use crate::manifest::PackageManifest;

/// Serialization format of a flow source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
  Json,
  Yaml,
}

impl SourceFormat {
  /// Pick a format from a file extension. Anything that is not `.json` is
  /// read as YAML, which also accepts JSON documents.
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => SourceFormat::Json,
      _ => SourceFormat::Yaml,
    }
  }
}

/// Parse a flow source document.
pub fn parse_flow(contents: &str, format: SourceFormat) -> Result<FlowDef, ConfigError> {
  let flow = match format {
    SourceFormat::Json => serde_json::from_str(contents)?,
    SourceFormat::Yaml => serde_yaml::from_str(contents)?,
  };
  Ok(flow)
}

/// Parse a package manifest (`pinflow.json`).
pub fn parse_manifest(contents: &str) -> Result<PackageManifest, ConfigError> {
  Ok(serde_json::from_str(contents)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::InstanceSource;

  const ADD_ONE: &str = r#"
id: AddOne
inputs:
  n: {}
outputs:
  r: {}
imports:
  "@pinflow/stdlib": [Add]
instances:
  - id: add1
    nodeId: Add
    config:
      n2: { type: value, value: 1 }
connections:
  - from: { insId: __this, pinId: n }
    to: { insId: add1, pinId: n1 }
  - from: { insId: add1, pinId: sum }
    to: { insId: __this, pinId: r }
"#;

  #[test]
  fn test_parse_yaml_flow() {
    let flow = parse_flow(ADD_ONE, SourceFormat::Yaml).unwrap();

    assert_eq!(flow.id, "AddOne");
    assert_eq!(flow.inputs["n"].mode, "required");
    assert!(!flow.outputs["r"].delayed);
    assert_eq!(flow.imports["@pinflow/stdlib"][0].exported_name(), "Add");

    let add1 = flow.get_instance("add1").unwrap();
    assert_eq!(add1.node_id, "Add");
    assert_eq!(add1.config["n2"].kind, "value");
    assert_eq!(add1.config["n2"].value, Some(serde_json::json!(1)));

    assert_eq!(flow.connections.len(), 2);
    assert!(flow.connections[0].from.is_boundary());
    assert!(flow.connections[1].to.is_boundary());
  }

  #[test]
  fn test_parse_json_flow_with_inline_source() {
    let json = r#"{
      "id": "Outer",
      "instances": [
        {
          "id": "inner",
          "nodeId": "Inner",
          "source": { "type": "inline", "flow": { "id": "Inner", "outputs": { "o": {} } } }
        }
      ]
    }"#;

    let flow = parse_flow(json, SourceFormat::Json).unwrap();
    match &flow.instances[0].source {
      Some(InstanceSource::Inline { flow }) => assert_eq!(flow.id, "Inner"),
      other => panic!("expected inline source, got {:?}", other),
    }
  }

  #[test]
  fn test_format_from_path() {
    assert_eq!(SourceFormat::from_path(Path::new("a.flow.json")), SourceFormat::Json);
    assert_eq!(SourceFormat::from_path(Path::new("a.flow.yaml")), SourceFormat::Yaml);
    assert_eq!(SourceFormat::from_path(Path::new("a.flow")), SourceFormat::Yaml);
  }

  #[test]
  fn test_parse_manifest() {
    let manifest =
      parse_manifest(r#"{ "name": "@acme/math", "exposes": ["flows/*.flow.yaml"] }"#).unwrap();
    assert_eq!(manifest.name, "@acme/math");
    assert_eq!(manifest.version, None);
    assert_eq!(manifest.exposes, vec!["flows/*.flow.yaml".to_string()]);
  }

  #[test]
  fn test_parse_invalid_source() {
    let result = parse_flow("{ not json", SourceFormat::Json);
    assert!(matches!(result, Err(ConfigError::Json(_))));
  }
}
