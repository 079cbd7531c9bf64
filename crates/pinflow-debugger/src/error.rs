use thiserror::Error;

/// A debug message that could not be understood. Logged and dropped;
/// never fatal to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("malformed message: {0}")]
  Malformed(#[from] serde_json::Error),
}
