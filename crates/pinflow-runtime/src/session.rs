use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use pinflow_debugger::Debugger;
use pinflow_debugger::protocol::CommandTarget;
use pinflow_node::{PinRef, ResolvedGraph, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::error::{InstanceError, RuntimeError};
use crate::host::forward_input;
use crate::scheduler::{ControlCommand, Scheduler};
use crate::state::StateStore;
use crate::wiring;

/// Called for every failed instance.
pub type ErrorCallback = Arc<dyn Fn(InstanceError) + Send + Sync>;

/// A value source for one root input.
#[derive(Debug)]
pub enum GraphInput {
  /// Delivered once when the session starts.
  Fixed(Value),
  /// Every value sent is delivered in order. The session cannot be
  /// exhausted while the sender is alive.
  Channel(mpsc::UnboundedReceiver<Value>),
}

impl GraphInput {
  pub fn fixed(value: impl Into<Value>) -> Self {
    Self::Fixed(value.into())
  }

  pub fn channel() -> (Self, mpsc::UnboundedSender<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self::Channel(rx), tx)
  }
}

/// A sink for one root output.
#[derive(Debug)]
pub struct GraphOutput {
  sender: mpsc::UnboundedSender<Value>,
}

impl GraphOutput {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { sender: tx }, rx)
  }
}

/// Per-session options.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
  /// Defaults to a random v4 uuid.
  pub execution_id: Option<String>,
  /// Breakpoints active from the start.
  pub breakpoints: Vec<PinRef>,
}

pub struct ExecuteOptions {
  pub graph: ResolvedGraph,
  pub inputs: HashMap<String, GraphInput>,
  pub outputs: HashMap<String, GraphOutput>,
  pub on_bubble_error: Option<ErrorCallback>,
  pub debugger: Option<Arc<dyn Debugger>>,
  pub config: SessionConfig,
}

impl ExecuteOptions {
  pub fn new(graph: ResolvedGraph) -> Self {
    Self {
      graph,
      inputs: HashMap::new(),
      outputs: HashMap::new(),
      on_bubble_error: None,
      debugger: None,
      config: SessionConfig::default(),
    }
  }

  pub fn input(mut self, pin: impl Into<String>, input: GraphInput) -> Self {
    self.inputs.insert(pin.into(), input);
    self
  }

  pub fn output(mut self, pin: impl Into<String>, output: GraphOutput) -> Self {
    self.outputs.insert(pin.into(), output);
    self
  }

  pub fn on_bubble_error(mut self, callback: impl Fn(InstanceError) + Send + Sync + 'static) -> Self {
    self.on_bubble_error = Some(Arc::new(callback));
    self
  }

  pub fn debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
    self.debugger = Some(debugger);
    self
  }

  pub fn config(mut self, config: SessionConfig) -> Self {
    self.config = config;
    self
  }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
  /// Every completion output of the root definition fired.
  Completed,
  /// Nothing left to do: no open inputs, no runs, no background tasks.
  Exhausted,
  /// Torn down with [`Session::destroy`].
  Destroyed,
}

/// Handle for driving a session from a debugger.
#[derive(Debug, Clone)]
pub struct SessionControl {
  sender: mpsc::UnboundedSender<ControlCommand>,
}

impl SessionControl {
  fn send(&self, command: ControlCommand) {
    // Session may have finished
    let _ = self.sender.send(command);
  }
}

impl CommandTarget for SessionControl {
  fn set_breakpoints(&self, breakpoints: Vec<PinRef>) {
    self.send(ControlCommand::SetBreakpoints(breakpoints));
  }

  fn inject_input(&self, ins_id: &str, pin_id: &str, value: Value) {
    self.send(ControlCommand::Inject {
      ins_id: ins_id.to_string(),
      pin_id: pin_id.to_string(),
      value,
    });
  }

  fn resume(&self) {
    self.send(ControlCommand::Resume);
  }
}

/// A running execution of a resolved graph.
pub struct Session {
  execution_id: String,
  cancel: CancellationToken,
  control: SessionControl,
  state: Arc<StateStore>,
  handle: JoinHandle<SessionOutcome>,
}

impl Session {
  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// Tear the session down. In-flight runs are detached and anything
  /// they emit afterwards is discarded.
  pub fn destroy(&self) {
    info!(execution_id = %self.execution_id, "session_destroy_requested");
    self.cancel.cancel();
  }

  pub async fn wait(self) -> Result<SessionOutcome, RuntimeError> {
    Ok(self.handle.await?)
  }

  pub fn control(&self) -> SessionControl {
    self.control.clone()
  }

  pub fn state(&self) -> &Arc<StateStore> {
    &self.state
  }

  pub fn state_snapshot(&self) -> Value {
    self.state.snapshot()
  }
}

impl std::fmt::Debug for Session {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Session")
      .field("execution_id", &self.execution_id)
      .finish_non_exhaustive()
  }
}

/// Start executing `options.graph`. Must be called inside a tokio runtime.
#[instrument(name = "execute", skip(options), fields(graph = %options.graph.main.id))]
pub fn execute(options: ExecuteOptions) -> Result<Session, RuntimeError> {
  let ExecuteOptions {
    graph,
    inputs,
    outputs,
    on_bubble_error,
    debugger,
    config,
  } = options;
  let root = &graph.main;

  if let Some(pin) = inputs.keys().find(|pin| !root.inputs.contains_key(*pin)) {
    return Err(RuntimeError::UnknownInput(pin.clone()));
  }
  if let Some(pin) = outputs.keys().find(|pin| !root.has_output(pin)) {
    return Err(RuntimeError::UnknownOutput(pin.clone()));
  }

  let live = wiring::build(&graph)?;
  let execution_id = config
    .execution_id
    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
  let cancel = CancellationToken::new();
  let (data_tx, data_rx) = mpsc::unbounded_channel();
  let (control_tx, control_rx) = mpsc::unbounded_channel();

  let mut initial_inputs = Vec::new();
  let mut open_inputs = 0;
  for (pin, def) in &root.inputs {
    match &def.default_value {
      Some(value) if !inputs.contains_key(pin) => initial_inputs.push((pin.clone(), value.clone())),
      _ => {}
    }
  }
  for (pin, input) in inputs {
    match input {
      GraphInput::Fixed(value) => initial_inputs.push((pin, value)),
      GraphInput::Channel(receiver) => {
        open_inputs += 1;
        forward_input(pin, receiver, data_tx.clone(), cancel.clone());
      }
    }
  }

  let state = Arc::new(StateStore::new());
  let root_pending: BTreeSet<String> = root.completion_outputs.iter().cloned().collect();
  let scheduler = Scheduler {
    execution_id: execution_id.clone(),
    root_completes: !root_pending.is_empty(),
    root_pending,
    graph: live,
    state: state.clone(),
    debugger,
    on_bubble_error,
    outputs: outputs
      .into_iter()
      .map(|(pin, output)| (pin, output.sender))
      .collect(),
    initial_inputs,
    breakpoints: config.breakpoints.into_iter().collect(),
    open_inputs,
    tasks: Arc::default(),
    data_tx,
    data_rx,
    control_rx,
    cancel: cancel.clone(),
  };

  info!(execution_id = %execution_id, "session_created");
  let handle = tokio::spawn(scheduler.run());

  Ok(Session {
    execution_id,
    cancel,
    control: SessionControl { sender: control_tx },
    state,
    handle,
  })
}
