use serde::{Deserialize, Serialize};

/// File name of a package manifest inside an installed package directory.
pub const MANIFEST_FILE_NAME: &str = "pinflow.json";

/// Metadata describing an installed flow package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
  /// Package name, e.g. "@acme/math"
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  /// Glob patterns, relative to the package directory, selecting the flow
  /// files whose root definitions the package exports.
  #[serde(default)]
  pub exposes: Vec<String>,
}
