use thiserror::Error;

/// Errors building a session. A session that started never fails as a
/// whole; instance failures are reported as [`InstanceError`].
#[derive(Debug, Error)]
pub enum RuntimeError {
  #[error("instance '{instance}': no definition for node '{node_id}'")]
  MissingDefinition { instance: String, node_id: String },

  #[error("instance '{instance}', pin '{pin}': {reason}")]
  PinConstruction {
    instance: String,
    pin: String,
    reason: String,
  },

  #[error("unknown graph input '{0}'")]
  UnknownInput(String),

  #[error("unknown graph output '{0}'")]
  UnknownOutput(String),

  #[error("session task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl RuntimeError {
  pub(crate) fn pin(
    instance: impl Into<String>,
    pin: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self::PinConstruction {
      instance: instance.into(),
      pin: pin.into(),
      reason: reason.into(),
    }
  }
}

/// A failed run, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("instance '{instance}' ({node_id}) failed: {message}")]
pub struct InstanceError {
  /// Dotted instance path from the root graph, e.g. `helper.add1`.
  pub instance: String,
  pub node_id: String,
  pub message: String,
}
