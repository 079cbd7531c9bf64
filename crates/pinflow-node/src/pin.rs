use pinflow_config::{InputConfigDef, THIS_INSTANCE_ID};
use serde::Serialize;

use crate::Value;
use crate::error::DefinitionError;

/// Reserved output pin every instance owns; failures are emitted here.
pub const ERROR_PIN_ID: &str = "__error";

/// Whether `name` is reserved and may not be declared by a node.
pub fn is_reserved_pin(name: &str) -> bool {
  name == ERROR_PIN_ID || name == THIS_INSTANCE_ID
}

/// How an input gates execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputMode {
  /// Must be satisfied before the instance may run.
  Required,
  /// Never blocks; absent when unsatisfied.
  Optional,
  /// Required only when some connection targets the pin.
  RequiredIfConnected,
}

impl InputMode {
  /// Parse the authored mode string.
  pub fn parse(mode: &str) -> Option<Self> {
    match mode {
      "required" => Some(InputMode::Required),
      "optional" => Some(InputMode::Optional),
      "required-if-connected" => Some(InputMode::RequiredIfConnected),
      _ => None,
    }
  }

  /// Whether an input in this mode blocks execution given its wiring.
  pub fn is_required(&self, connected: bool) -> bool {
    match self {
      InputMode::Required => true,
      InputMode::Optional => false,
      InputMode::RequiredIfConnected => connected,
    }
  }
}

/// Declared input pin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPinDef {
  pub mode: InputMode,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_value: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl InputPinDef {
  pub fn new(mode: InputMode) -> Self {
    Self {
      mode,
      default_value: None,
      description: None,
    }
  }

  pub fn with_default(mut self, value: Value) -> Self {
    self.default_value = Some(value);
    self
  }
}

/// Declared output pin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPinDef {
  /// Values emitted on a delayed output are held until the activation that
  /// produced them returns.
  pub delayed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// How one input of an instance buffers values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InputPinConfig {
  /// A constant, satisfied from creation. Must not be wired.
  Static(Value),
  /// FIFO buffer; one value is consumed per activation.
  Queue,
  /// Keeps the last received value and re-delivers it on every activation.
  Sticky,
}

impl InputPinConfig {
  /// Convert an authored pin config.
  pub fn from_def(pin: &str, def: &InputConfigDef) -> Result<Self, DefinitionError> {
    match def.kind.as_str() {
      "value" | "static" => def
        .value
        .clone()
        .map(InputPinConfig::Static)
        .ok_or_else(|| DefinitionError::MissingStaticValue {
          pin: pin.to_string(),
        }),
      "queue" => Ok(InputPinConfig::Queue),
      "sticky" => Ok(InputPinConfig::Sticky),
      other => Err(DefinitionError::UnknownInputConfig {
        pin: pin.to_string(),
        kind: other.to_string(),
      }),
    }
  }

  pub fn is_static(&self) -> bool {
    matches!(self, InputPinConfig::Static(_))
  }
}
