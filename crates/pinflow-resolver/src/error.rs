use std::path::PathBuf;

use pinflow_config::ConfigError;
use pinflow_node::DefinitionError;
use thiserror::Error;

/// Errors that can occur while resolving a flow. All are fatal.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("failed to read '{path}': {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("failed to parse '{path}': {source}")]
  Parse { path: PathBuf, source: ConfigError },

  #[error("flow '{flow}': {source}")]
  Definition {
    flow: String,
    source: DefinitionError,
  },

  #[error("package '{name}' not found (searched upwards from '{from}')")]
  PackageNotFound { name: String, from: PathBuf },

  #[error("package '{package}': invalid exposes pattern '{pattern}': {message}")]
  InvalidExposePattern {
    package: String,
    pattern: String,
    message: String,
  },

  #[error("'{name}' is not exported by '{module}'")]
  UnexportedName { module: String, name: String },

  #[error("'{name}' is bound more than once in '{flow}'")]
  DuplicateExport { flow: String, name: String },

  #[error("circular import: {}", .cycle.join(" -> "))]
  CircularImport { cycle: Vec<String> },

  #[error("flow '{flow}': instance '{instance}' references unknown node '{node_id}'")]
  MissingDependency {
    flow: String,
    instance: String,
    node_id: String,
  },

  #[error("flow '{flow}': invalid connection {connection}: {reason}")]
  InvalidConnection {
    flow: String,
    connection: String,
    reason: String,
  },
}

impl ResolveError {
  pub(crate) fn definition(flow: impl Into<String>, source: DefinitionError) -> Self {
    Self::Definition {
      flow: flow.into(),
      source,
    }
  }

  pub(crate) fn unexported(module: impl Into<String>, name: impl Into<String>) -> Self {
    Self::UnexportedName {
      module: module.into(),
      name: name.into(),
    }
  }
}
