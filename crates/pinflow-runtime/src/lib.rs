//! Pinflow Runtime
//!
//! Executes a [`ResolvedGraph`](pinflow_node::ResolvedGraph). Each call to
//! [`execute`] starts a session: one tokio task that owns every live pin of
//! the (flattened) graph and polls every in-flight run.
//!
//! Values are pushed along connections as soon as they are emitted. An
//! instance runs when its required inputs are satisfied and there is new
//! work for it; see [`InputPinConfig`](pinflow_node::InputPinConfig) for
//! how each input buffers values. Failures are isolated to the failing
//! instance and reported through the session's error callback.

mod error;
mod host;
mod pin;
mod scheduler;
mod session;
mod state;
mod wiring;

pub use error::{InstanceError, RuntimeError};
pub use session::{
  ErrorCallback, ExecuteOptions, GraphInput, GraphOutput, Session, SessionConfig, SessionControl,
  SessionOutcome, execute,
};
pub use state::StateStore;
