//! The session loop.
//!
//! One task owns every live pin. It reacts to four sources, in priority
//! order: cancellation, debugger control, the ordered data channel
//! (emissions, failures, graph inputs) and completed runs. After each
//! event the instances touched by it are re-evaluated.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use pinflow_debugger::{Debugger, DebuggerEvent, DebuggerEventKind};
use pinflow_node::{
  ERROR_PIN_ID, NodeError, NodeInputs, PinRef, RunContext, THIS_INSTANCE_ID, Value,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::InstanceError;
use crate::host::{LoopMessage, NodeHost, RunOutcome};
use crate::session::{ErrorCallback, SessionOutcome};
use crate::state::StateStore;
use crate::wiring::{Dest, InstanceStatus, LiveGraph, NodeKind};

/// Commands from a debugger client.
#[derive(Debug)]
pub(crate) enum ControlCommand {
  SetBreakpoints(Vec<PinRef>),
  Inject {
    ins_id: String,
    pin_id: String,
    value: Value,
  },
  Resume,
}

pub(crate) struct Scheduler {
  pub execution_id: String,
  pub graph: LiveGraph,
  pub state: Arc<StateStore>,
  pub debugger: Option<Arc<dyn Debugger>>,
  pub on_bubble_error: Option<ErrorCallback>,
  pub outputs: HashMap<String, mpsc::UnboundedSender<Value>>,
  /// Fixed graph inputs and unprovided root defaults, delivered at start.
  pub initial_inputs: Vec<(String, Value)>,
  /// Root completion outputs that have not fired yet.
  pub root_pending: BTreeSet<String>,
  pub root_completes: bool,
  pub breakpoints: HashSet<PinRef>,
  pub open_inputs: usize,
  pub tasks: Arc<AtomicUsize>,
  pub data_tx: mpsc::UnboundedSender<LoopMessage>,
  pub data_rx: mpsc::UnboundedReceiver<LoopMessage>,
  pub control_rx: mpsc::UnboundedReceiver<ControlCommand>,
  pub cancel: CancellationToken,
}

impl Scheduler {
  pub async fn run(self) -> SessionOutcome {
    let mut session = RunningSession {
      inner: self,
      running: FuturesUnordered::new(),
      dirty: BTreeSet::new(),
      paused: false,
      started: Instant::now(),
    };
    session.run().await
  }
}

struct RunningSession {
  inner: Scheduler,
  running: FuturesUnordered<BoxFuture<'static, RunOutcome>>,
  dirty: BTreeSet<usize>,
  paused: bool,
  started: Instant,
}

impl RunningSession {
  async fn run(&mut self) -> SessionOutcome {
    info!(
      execution_id = %self.inner.execution_id,
      instances = self.inner.graph.nodes.len(),
      "session_started"
    );
    self.start();

    let outcome = loop {
      self.dispatch_dirty();
      if let Some(outcome) = self.finished() {
        break outcome;
      }

      let paused = self.paused;
      let idle = self.running.is_empty();
      tokio::select! {
        biased;
        _ = self.inner.cancel.cancelled() => break SessionOutcome::Destroyed,
        Some(command) = self.inner.control_rx.recv() => self.handle_control(command),
        Some(message) = self.inner.data_rx.recv(), if !paused => self.handle_message(message),
        Some(outcome) = self.running.next(), if !paused && !idle => self.handle_outcome(outcome),
      }
    };

    self.shutdown(outcome);
    outcome
  }

  fn start(&mut self) {
    for (node, pin, value) in std::mem::take(&mut self.inner.graph.initial) {
      self.deliver_input(node, &pin, value);
    }
    for (pin, value) in std::mem::take(&mut self.inner.initial_inputs) {
      self.deliver_root_input(&pin, value);
    }
    for (index, node) in self.inner.graph.nodes.iter().enumerate() {
      if node.code().is_some() {
        self.dirty.insert(index);
      }
    }
  }

  fn finished(&self) -> Option<SessionOutcome> {
    if self.inner.root_completes && self.inner.root_pending.is_empty() {
      return Some(SessionOutcome::Completed);
    }

    let exhausted = !self.paused
      && self.running.is_empty()
      && self.dirty.is_empty()
      && self.inner.open_inputs == 0
      && self.inner.tasks.load(Ordering::SeqCst) == 0
      && self.inner.data_rx.is_empty();
    exhausted.then_some(SessionOutcome::Exhausted)
  }

  fn shutdown(&mut self, outcome: SessionOutcome) {
    self.inner.cancel.cancel();

    // Runs still in flight are detached; anything they emit is dropped
    // with the loop's receiver.
    let running = std::mem::take(&mut self.running);
    if !running.is_empty() {
      tokio::spawn(running.for_each(|_| async {}));
    }

    self.inner.state.clear();
    info!(
      execution_id = %self.inner.execution_id,
      outcome = ?outcome,
      elapsed_ms = self.elapsed_ms(),
      "session_finished"
    );
  }

  fn handle_control(&mut self, command: ControlCommand) {
    match command {
      ControlCommand::SetBreakpoints(breakpoints) => {
        debug!(execution_id = %self.inner.execution_id, count = breakpoints.len(), "breakpoints_set");
        self.inner.breakpoints = breakpoints.into_iter().collect();
      }
      ControlCommand::Inject {
        ins_id,
        pin_id,
        value,
      } => {
        if ins_id == THIS_INSTANCE_ID {
          self.deliver_root_input(&pin_id, value);
          return;
        }
        match self.inner.graph.paths.get(&ins_id).copied() {
          Some(node) if self.inner.graph.nodes[node].declared_inputs.contains(&pin_id) => {
            self.deliver_input(node, &pin_id, value);
          }
          _ => warn!(
            execution_id = %self.inner.execution_id,
            instance = %ins_id,
            pin = %pin_id,
            "inject_target_unknown"
          ),
        }
      }
      ControlCommand::Resume => {
        if self.paused {
          info!(execution_id = %self.inner.execution_id, "session_resumed");
        }
        self.paused = false;
      }
    }
  }

  fn handle_message(&mut self, message: LoopMessage) {
    match message {
      LoopMessage::Emit {
        node,
        activation,
        pin,
        value,
      } => self.handle_emit(node, activation, pin, value),
      LoopMessage::Failed { node, error } => self.fail(node, error),
      LoopMessage::TaskFinished => {
        self.inner.tasks.fetch_sub(1, Ordering::SeqCst);
      }
      LoopMessage::Input { pin, value } => self.deliver_root_input(&pin, value),
      LoopMessage::InputClosed => {
        self.inner.open_inputs = self.inner.open_inputs.saturating_sub(1);
      }
    }
  }

  fn handle_emit(&mut self, node: usize, activation: u64, pin: String, value: Value) {
    let live = &mut self.inner.graph.nodes[node];
    if !live.has_output(&pin) {
      warn!(
        execution_id = %self.inner.execution_id,
        instance = %live.path,
        pin = %pin,
        "undeclared_output_dropped"
      );
      return;
    }
    let Some(code) = live.code_mut() else {
      return;
    };
    match code.status {
      InstanceStatus::Failed => return,
      InstanceStatus::Running if code.activation == activation && code.is_delayed(&pin) => {
        code.held.push((pin, value));
        return;
      }
      _ => {}
    }
    self.emit_output(node, pin, value);
  }

  fn handle_outcome(&mut self, outcome: RunOutcome) {
    // Emissions made during the run are queued ahead of its outcome. A
    // breakpoint hit while draining leaves the rest queued until resume.
    while !self.paused {
      let Ok(message) = self.inner.data_rx.try_recv() else {
        break;
      };
      self.handle_message(message);
    }

    let RunOutcome {
      node,
      activation,
      result,
    } = outcome;
    let Some(code) = self.inner.graph.nodes[node].code_mut() else {
      return;
    };
    if code.activation != activation || code.status != InstanceStatus::Running {
      return;
    }

    match result {
      Ok(()) => {
        let held = std::mem::take(&mut code.held);
        for (pin, value) in held {
          self.emit_output(node, pin, value);
        }

        let Some(code) = self.inner.graph.nodes[node].code_mut() else {
          return;
        };
        if code.status != InstanceStatus::Running {
          return;
        }
        if code.pending_completion.is_empty() {
          self.complete_unit(node);
        } else {
          code.status = InstanceStatus::Awaiting;
        }
        self.record_processing(node, false);
        self.dirty.insert(node);
      }
      Err(error) => {
        code.held.clear();
        self.fail(node, error);
      }
    }
  }

  fn dispatch_dirty(&mut self) {
    while !self.paused {
      let Some(node) = self.dirty.pop_first() else {
        break;
      };
      if self.is_ready(node) {
        self.activate(node);
      }
    }
  }

  fn is_ready(&self, node: usize) -> bool {
    let Some(code) = self.inner.graph.nodes[node].code() else {
      return false;
    };
    match code.status {
      InstanceStatus::Idle => code.is_satisfied() && code.has_new_work(),
      InstanceStatus::Awaiting => code.is_satisfied() && code.has_reactive_work(),
      InstanceStatus::Running | InstanceStatus::Failed => false,
    }
  }

  fn activate(&mut self, node: usize) {
    let live = &mut self.inner.graph.nodes[node];
    let path = live.path.clone();
    let Some(code) = live.code_mut() else {
      return;
    };

    code.activation += 1;
    code.start_trigger = false;
    code.never_ran = false;
    code.status = InstanceStatus::Running;
    code.held.clear();
    code.pending_completion = code.definition.completion_outputs.iter().cloned().collect();

    let inputs: NodeInputs = code
      .inputs
      .iter_mut()
      .filter_map(|(name, pin)| pin.take().map(|value| (name.clone(), value)))
      .collect();
    let activation = code.activation;
    let behavior = code.behavior.clone();
    let inputs_state = code.inputs_state();

    debug!(
      execution_id = %self.inner.execution_id,
      instance = %path,
      activation,
      "instance_activated"
    );
    self.record(DebuggerEventKind::InputsStateChange, &path, None, || inputs_state);
    self.record_processing(node, true);

    let host = NodeHost::new(
      node,
      activation,
      self.inner.data_tx.clone(),
      self.inner.tasks.clone(),
      self.inner.cancel.clone(),
    );
    let ctx = RunContext::new(
      path.as_str(),
      Arc::new(host),
      self.inner.state.slice(&path),
      self.inner.cancel.clone(),
    );

    self.running.push(Box::pin(async move {
      let result = AssertUnwindSafe(behavior.run(inputs, ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(NodeError::message(panic_message(panic.as_ref()))));
      RunOutcome {
        node,
        activation,
        result,
      }
    }));
  }

  fn emit_output(&mut self, node: usize, pin: String, value: Value) {
    self.route_output(node, &pin, value);

    let Some(code) = self.inner.graph.nodes[node].code_mut() else {
      return;
    };
    if code.pending_completion.remove(&pin)
      && code.pending_completion.is_empty()
      && code.status == InstanceStatus::Awaiting
    {
      self.complete_unit(node);
      self.dirty.insert(node);
    }
  }

  /// Clear the instance's state after its completion outputs all fired.
  fn complete_unit(&mut self, node: usize) {
    let live = &mut self.inner.graph.nodes[node];
    if let Some(code) = live.code_mut() {
      code.status = InstanceStatus::Idle;
      code.pending_completion.clear();
      if !code.definition.completion_outputs.is_empty() {
        self.inner.state.clear_instance(&live.path);
        debug!(
          execution_id = %self.inner.execution_id,
          instance = %live.path,
          "instance_completed"
        );
      }
    }
  }

  fn fail(&mut self, node: usize, error: NodeError) {
    let live = &mut self.inner.graph.nodes[node];
    let Some(code) = live.code_mut() else {
      return;
    };
    if code.status == InstanceStatus::Failed {
      return;
    }
    let was_running = code.status == InstanceStatus::Running;
    code.status = InstanceStatus::Failed;
    code.held.clear();
    code.pending_completion.clear();

    let error = InstanceError {
      instance: live.path.clone(),
      node_id: live.node_id.clone(),
      message: error.to_string(),
    };
    warn!(
      execution_id = %self.inner.execution_id,
      instance = %error.instance,
      node_id = %error.node_id,
      error = %error.message,
      "instance_failed"
    );

    if was_running {
      self.record_processing(node, false);
    }
    self.record(DebuggerEventKind::Error, &error.instance, None, || {
      Value::String(error.message.clone())
    });
    if let Some(callback) = &self.inner.on_bubble_error {
      callback(error.clone());
    }

    let payload = json!({
      "instance": error.instance,
      "nodeId": error.node_id,
      "message": error.message,
    });
    self.route_output(node, ERROR_PIN_ID, payload);
  }

  fn route_output(&mut self, node: usize, pin: &str, value: Value) {
    let live = &self.inner.graph.nodes[node];
    self.record(DebuggerEventKind::OutputChange, &live.path, Some(pin), || value.clone());

    let routes = live.output_routes.get(pin).cloned().unwrap_or_default();
    self.forward(routes, value);
  }

  fn forward(&mut self, routes: Vec<Dest>, value: Value) {
    for dest in routes {
      self.deliver(dest, value.clone());
    }
  }

  fn deliver(&mut self, dest: Dest, value: Value) {
    match dest {
      Dest::Pin { node, pin } => self.deliver_input(node, &pin, value),
      Dest::RelayOutput { node, pin } => self.route_output(node, &pin, value),
      Dest::Boundary(pin) => self.deliver_boundary(&pin, value),
    }
  }

  fn deliver_root_input(&mut self, pin: &str, value: Value) {
    self.record(DebuggerEventKind::InputChange, THIS_INSTANCE_ID, Some(pin), || value.clone());
    let routes = self.inner.graph.root_routes.get(pin).cloned().unwrap_or_default();
    self.forward(routes, value);
  }

  fn deliver_boundary(&mut self, pin: &str, value: Value) {
    self.record(DebuggerEventKind::OutputChange, THIS_INSTANCE_ID, Some(pin), || value.clone());
    self.inner.root_pending.remove(pin);
    if let Some(sender) = self.inner.outputs.get(pin) {
      // Caller may have dropped its receiver
      let _ = sender.send(value);
    }
  }

  fn deliver_input(&mut self, node: usize, pin: &str, value: Value) {
    let path = self.inner.graph.nodes[node].path.clone();
    self.record(DebuggerEventKind::InputChange, &path, Some(pin), || value.clone());

    let live = &mut self.inner.graph.nodes[node];
    let code = match &mut live.kind {
      NodeKind::Code(code) => code,
      NodeKind::Relay => {
        let routes = live.input_routes.get(pin).cloned().unwrap_or_default();
        self.forward(routes, value);
        return;
      }
    };
    if code.status == InstanceStatus::Failed {
      return;
    }
    let Some(live_pin) = code.inputs.get_mut(pin) else {
      return;
    };
    live_pin.push(value);
    let inputs_state = code.inputs_state();

    self.record(DebuggerEventKind::InputsStateChange, &path, None, || inputs_state);
    self.dirty.insert(node);

    if self.inner.breakpoints.contains(&PinRef::new(path.as_str(), pin)) {
      info!(
        execution_id = %self.inner.execution_id,
        instance = %path,
        pin = %pin,
        "breakpoint_hit"
      );
      self.paused = true;
    }
  }

  fn record_processing(&self, node: usize, processing: bool) {
    let path = &self.inner.graph.nodes[node].path;
    self.record(DebuggerEventKind::ProcessingChange, path, None, || {
      Value::Bool(processing)
    });
  }

  fn record(
    &self,
    kind: DebuggerEventKind,
    instance: &str,
    pin: Option<&str>,
    value: impl FnOnce() -> Value,
  ) {
    let Some(debugger) = &self.inner.debugger else {
      return;
    };
    if self.inner.cancel.is_cancelled() {
      return;
    }
    debugger.on_event(DebuggerEvent::new(
      kind,
      self.inner.execution_id.as_str(),
      instance,
      pin.map(str::to_string),
      value(),
      self.elapsed_ms(),
    ));
  }

  fn elapsed_ms(&self) -> u64 {
    u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
  }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    format!("panicked: {message}")
  } else if let Some(message) = panic.downcast_ref::<String>() {
    format!("panicked: {message}")
  } else {
    "panicked".to_string()
  }
}
