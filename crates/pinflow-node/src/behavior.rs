//! The contract a node implementation satisfies to plug into the runtime.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::Value;
use crate::definition::NodeDefinition;
use crate::error::{DefinitionError, NodeError};
use crate::state::InstanceState;

/// Input values for one activation.
///
/// A pin that is absent was not provided (optional and unsatisfied); this
/// is distinct from a pin provided with `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
  values: BTreeMap<String, Value>,
}

impl NodeInputs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, pin: impl Into<String>, value: Value) {
    self.values.insert(pin.into(), value);
  }

  pub fn get(&self, pin: &str) -> Option<&Value> {
    self.values.get(pin)
  }

  pub fn is_provided(&self, pin: &str) -> bool {
    self.values.contains_key(pin)
  }

  pub fn require(&self, pin: &str) -> Result<&Value, NodeError> {
    self
      .values
      .get(pin)
      .ok_or_else(|| NodeError::MissingInput(pin.to_string()))
  }

  /// Deserialize a provided input; `Ok(None)` when not provided.
  pub fn get_as<T: DeserializeOwned>(&self, pin: &str) -> Result<Option<T>, NodeError> {
    match self.values.get(pin) {
      Some(value) => serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| NodeError::invalid_input(pin, e.to_string())),
      None => Ok(None),
    }
  }

  pub fn require_as<T: DeserializeOwned>(&self, pin: &str) -> Result<T, NodeError> {
    self
      .get_as(pin)?
      .ok_or_else(|| NodeError::MissingInput(pin.to_string()))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.values.iter()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl FromIterator<(String, Value)> for NodeInputs {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().collect(),
    }
  }
}

/// The runtime side of a [`RunContext`]. Implemented by the scheduler.
pub trait RunHost: Send + Sync {
  /// Forward a value emitted on an output pin.
  fn emit(&self, pin: &str, value: Value);

  /// Mark the instance failed.
  fn report_error(&self, error: NodeError);

  /// Run a background task bound to the session lifetime.
  fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Side channel handed to every activation: outputs, state, error
/// reporting and session-scoped background work.
#[derive(Clone)]
pub struct RunContext {
  instance_id: Arc<str>,
  host: Arc<dyn RunHost>,
  state: InstanceState,
  cancel: CancellationToken,
}

impl RunContext {
  pub fn new(
    instance_id: impl Into<Arc<str>>,
    host: Arc<dyn RunHost>,
    state: InstanceState,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      instance_id: instance_id.into(),
      host,
      state,
      cancel,
    }
  }

  pub fn instance_id(&self) -> &str {
    &self.instance_id
  }

  pub fn emit(&self, pin: &str, value: impl Into<Value>) {
    self.host.emit(pin, value.into());
  }

  /// This instance's state slice.
  pub fn state(&self) -> &InstanceState {
    &self.state
  }

  pub fn report_error(&self, error: impl Into<NodeError>) {
    self.host.report_error(error.into());
  }

  /// Spawn work that may emit after `run` returns (timers, debouncers).
  /// The task is dropped when the session is torn down.
  pub fn spawn<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    self.host.spawn(Box::pin(task));
  }

  /// Cancelled when the session is torn down.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }
}

impl std::fmt::Debug for RunContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RunContext")
      .field("instance_id", &self.instance_id)
      .finish_non_exhaustive()
  }
}

/// The run behavior of a code node.
#[async_trait]
pub trait RunBehavior: Send + Sync {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError>;
}

/// A node definition builder parameterized by per-instance configuration.
pub trait MacroNode: Send + Sync {
  fn id(&self) -> &str;

  /// Build the concrete definition for one instance's configuration.
  fn materialize(&self, config: &Value) -> Result<NodeDefinition, DefinitionError>;
}

/// Adapter turning a closure into a [`RunBehavior`].
pub struct FnBehavior<F> {
  f: F,
}

/// Wrap an async closure as a run behavior.
///
/// ```ignore
/// let double = behavior_fn(|inputs, ctx| async move {
///   let n: i64 = inputs.require_as("n")?;
///   ctx.emit("r", n * 2);
///   Ok(())
/// });
/// ```
pub fn behavior_fn<F, Fut>(f: F) -> FnBehavior<F>
where
  F: Fn(NodeInputs, RunContext) -> Fut + Send + Sync,
  Fut: Future<Output = Result<(), NodeError>> + Send + 'static,
{
  FnBehavior { f }
}

#[async_trait]
impl<F, Fut> RunBehavior for FnBehavior<F>
where
  F: Fn(NodeInputs, RunContext) -> Fut + Send + Sync,
  Fut: Future<Output = Result<(), NodeError>> + Send + 'static,
{
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    (self.f)(inputs, ctx).await
  }
}
