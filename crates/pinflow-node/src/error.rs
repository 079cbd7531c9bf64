use thiserror::Error;

/// A malformed node definition. Fatal: surfaces before any graph is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DefinitionError {
  #[error("node '{node_id}': completion output '{output}' is not a declared output")]
  MissingCompletionOutput { node_id: String, output: String },

  #[error("node '{node_id}': reactive input '{input}' is not a declared input")]
  UnknownReactiveInput { node_id: String, input: String },

  #[error("node '{node_id}': input '{pin}' has unknown mode '{mode}'")]
  UnknownInputMode {
    node_id: String,
    pin: String,
    mode: String,
  },

  #[error("input '{pin}' has unknown config type '{kind}' (expected value, queue or sticky)")]
  UnknownInputConfig { pin: String, kind: String },

  #[error("input '{pin}' is configured as a static value but has no value")]
  MissingStaticValue { pin: String },

  #[error("node '{node_id}' declares no inputs and is not externally triggered")]
  NoInputs { node_id: String },

  #[error("node '{node_id}': input '{pin}' is declared more than once")]
  DuplicateInput { node_id: String, pin: String },

  #[error("node '{node_id}': pin name '{pin}' is reserved")]
  ReservedPinName { node_id: String, pin: String },

  #[error("node '{node_id}' has no run behavior or graph")]
  MissingBody { node_id: String },

  #[error("node '{node_id}': duplicate instance id '{instance_id}'")]
  DuplicateInstance { node_id: String, instance_id: String },

  #[error("macro '{macro_id}': {message}")]
  InvalidMacroConfig { macro_id: String, message: String },

  #[error("macro '{macro_id}' must materialize a code node")]
  MacroProducedGraph { macro_id: String },
}

/// A failure reported by a node's run behavior.
#[derive(Debug, Error)]
pub enum NodeError {
  #[error("{0}")]
  Message(String),

  #[error("missing input: {0}")]
  MissingInput(String),

  #[error("invalid input '{pin}': {message}")]
  InvalidInput { pin: String, message: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl NodeError {
  pub fn message(message: impl Into<String>) -> Self {
    Self::Message(message.into())
  }

  pub fn invalid_input(pin: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidInput {
      pin: pin.into(),
      message: message.into(),
    }
  }
}

impl From<String> for NodeError {
  fn from(message: String) -> Self {
    Self::Message(message)
  }
}

impl From<&str> for NodeError {
  fn from(message: &str) -> Self {
    Self::Message(message.to_string())
  }
}
