use serde::{Deserialize, Serialize};

/// A single name requested from an imported module.
///
/// Written either as a bare string (`Add`) or as an object with an alias
/// (`{ name: Add, alias: Plus }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportSpec {
  Name(String),
  Aliased {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
  },
}

impl ImportSpec {
  /// The name exported by the module.
  pub fn exported_name(&self) -> &str {
    match self {
      ImportSpec::Name(name) => name,
      ImportSpec::Aliased { name, .. } => name,
    }
  }

  /// The name the importing flow refers to.
  pub fn local_alias(&self) -> &str {
    match self {
      ImportSpec::Name(name) => name,
      ImportSpec::Aliased { name, alias } => alias.as_deref().unwrap_or(name),
    }
  }
}
