use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use pinflow_node::{InstanceState, NodeError, RunContext, RunHost, Value};
use tokio_util::sync::CancellationToken;

/// Host that records emissions and runs spawned tasks on the test runtime.
#[derive(Default)]
pub struct Recorder {
  emitted: Arc<Mutex<Vec<(String, Value)>>>,
  errors: Arc<Mutex<Vec<String>>>,
  state: InstanceState,
}

struct RecordingHost {
  emitted: Arc<Mutex<Vec<(String, Value)>>>,
  errors: Arc<Mutex<Vec<String>>>,
}

impl RunHost for RecordingHost {
  fn emit(&self, pin: &str, value: Value) {
    self.emitted.lock().push((pin.to_string(), value));
  }

  fn report_error(&self, error: NodeError) {
    self.errors.lock().push(error.to_string());
  }

  fn spawn(&self, task: BoxFuture<'static, ()>) {
    tokio::spawn(task);
  }
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn context(&self) -> RunContext {
    let host = RecordingHost {
      emitted: self.emitted.clone(),
      errors: self.errors.clone(),
    };
    RunContext::new(
      "test",
      Arc::new(host),
      self.state.clone(),
      CancellationToken::new(),
    )
  }

  pub fn emitted(&self) -> Vec<(String, Value)> {
    self.emitted.lock().clone()
  }

  pub fn state(&self) -> &InstanceState {
    &self.state
  }
}
