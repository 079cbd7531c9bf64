use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use pinflow_node::{NodeError, RunHost, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything that reaches the session loop from outside it, in arrival
/// order.
#[derive(Debug)]
pub(crate) enum LoopMessage {
  Emit {
    node: usize,
    activation: u64,
    pin: String,
    value: Value,
  },
  Failed {
    node: usize,
    error: NodeError,
  },
  /// A task spawned through `RunContext::spawn` ended.
  TaskFinished,
  /// A value from a channel graph input.
  Input { pin: String, value: Value },
  /// A channel graph input was closed by its sender.
  InputClosed,
}

/// Result of one activation, yielded by the loop's set of in-flight runs.
pub(crate) struct RunOutcome {
  pub node: usize,
  pub activation: u64,
  pub result: Result<(), NodeError>,
}

/// The [`RunHost`] given to one activation.
pub(crate) struct NodeHost {
  node: usize,
  activation: u64,
  sender: mpsc::UnboundedSender<LoopMessage>,
  tasks: Arc<AtomicUsize>,
  cancel: CancellationToken,
}

impl NodeHost {
  pub fn new(
    node: usize,
    activation: u64,
    sender: mpsc::UnboundedSender<LoopMessage>,
    tasks: Arc<AtomicUsize>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      node,
      activation,
      sender,
      tasks,
      cancel,
    }
  }

  fn send(&self, message: LoopMessage) {
    // Loop is gone once the session ended; late output is discarded
    let _ = self.sender.send(message);
  }
}

impl RunHost for NodeHost {
  fn emit(&self, pin: &str, value: Value) {
    self.send(LoopMessage::Emit {
      node: self.node,
      activation: self.activation,
      pin: pin.to_string(),
      value,
    });
  }

  fn report_error(&self, error: NodeError) {
    self.send(LoopMessage::Failed {
      node: self.node,
      error,
    });
  }

  fn spawn(&self, task: BoxFuture<'static, ()>) {
    // Counted before the activation returns so the loop never sees an
    // idle session with a task about to start.
    self.tasks.fetch_add(1, Ordering::SeqCst);

    let sender = self.sender.clone();
    let cancel = self.cancel.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = cancel.cancelled() => {}
        _ = task => {}
      }
      let _ = sender.send(LoopMessage::TaskFinished);
    });
  }
}

/// Forward a channel graph input into the loop until it closes.
pub(crate) fn forward_input(
  pin: String,
  mut receiver: mpsc::UnboundedReceiver<Value>,
  sender: mpsc::UnboundedSender<LoopMessage>,
  cancel: CancellationToken,
) {
  tokio::spawn(async move {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        value = receiver.recv() => match value {
          Some(value) => {
            let _ = sender.send(LoopMessage::Input { pin: pin.clone(), value });
          }
          None => {
            let _ = sender.send(LoopMessage::InputClosed);
            break;
          }
        },
      }
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_spawned_tasks_are_counted() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tasks = Arc::new(AtomicUsize::new(0));
    let host = NodeHost::new(3, 1, tx, tasks.clone(), CancellationToken::new());

    host.spawn(Box::pin(async {}));
    assert_eq!(tasks.load(Ordering::SeqCst), 1);

    assert!(matches!(rx.recv().await, Some(LoopMessage::TaskFinished)));
  }

  #[tokio::test]
  async fn test_emit_is_tagged_with_activation() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let host = NodeHost::new(3, 7, tx, Arc::default(), CancellationToken::new());

    host.emit("r", json!(1));

    match rx.recv().await {
      Some(LoopMessage::Emit {
        node,
        activation,
        pin,
        value,
      }) => {
        assert_eq!((node, activation, pin.as_str()), (3, 7, "r"));
        assert_eq!(value, json!(1));
      }
      other => panic!("unexpected message: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_cancel_stops_spawned_task() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let host = NodeHost::new(0, 1, tx, Arc::default(), cancel.clone());

    host.spawn(Box::pin(futures::future::pending()));
    cancel.cancel();

    assert!(matches!(rx.recv().await, Some(LoopMessage::TaskFinished)));
  }

  #[tokio::test]
  async fn test_closed_input_is_reported() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    forward_input("n".to_string(), input_rx, tx, CancellationToken::new());

    input_tx.send(json!(5)).unwrap();
    drop(input_tx);

    assert!(matches!(rx.recv().await, Some(LoopMessage::Input { value, .. }) if value == json!(5)));
    assert!(matches!(rx.recv().await, Some(LoopMessage::InputClosed)));
  }
}
