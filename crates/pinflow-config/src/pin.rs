use serde::{Deserialize, Serialize};

fn default_mode() -> String {
  "required".to_string()
}

/// Declaration of a flow's boundary input.
///
/// `mode` is kept as written so that an unknown mode surfaces as a
/// definition error naming the pin instead of a generic parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDef {
  #[serde(default = "default_mode")]
  pub mode: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Default for InputDef {
  fn default() -> Self {
    Self {
      mode: default_mode(),
      default_value: None,
      description: None,
    }
  }
}

/// Declaration of a flow's boundary output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDef {
  #[serde(default)]
  pub delayed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Per-instance configuration of one input pin, as authored.
///
/// ```yaml
/// n2: { type: value, value: 1 }
/// items: { type: queue }
/// settings: { type: sticky }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfigDef {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<serde_json::Value>,
}

impl InputConfigDef {
  pub fn value(value: serde_json::Value) -> Self {
    Self {
      kind: "value".to_string(),
      value: Some(value),
    }
  }

  pub fn queue() -> Self {
    Self {
      kind: "queue".to_string(),
      value: None,
    }
  }

  pub fn sticky() -> Self {
    Self {
      kind: "sticky".to_string(),
      value: None,
    }
  }
}
