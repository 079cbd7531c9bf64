use thiserror::Error;

/// Errors raised while parsing flow sources and package manifests.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid JSON source: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid YAML source: {0}")]
  Yaml(#[from] serde_yaml::Error),
}
