use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{Debugger, DebuggerEvent};
use crate::history::{EventHistory, MAX_LAST_EVENTS, MAX_LAST_EVENTS_TAPE_SIZE};
use crate::protocol::OutboundMessage;

/// Emitter settings.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
  /// Window over which events are collected into one batch.
  pub debounce: Duration,
  pub max_last_events: usize,
  pub max_tape_size: usize,
}

impl Default for EmitterConfig {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(50),
      max_last_events: MAX_LAST_EVENTS,
      max_tape_size: MAX_LAST_EVENTS_TAPE_SIZE,
    }
  }
}

/// Records events into an [`EventHistory`] and streams them in batches to
/// a listener.
///
/// `on_event` only appends to the history and pushes onto an unbounded
/// channel; batching happens on a background task, so the session loop is
/// never blocked by a slow listener. Delivery is best effort.
pub struct EventEmitter {
  history: Arc<EventHistory>,
  sender: mpsc::UnboundedSender<DebuggerEvent>,
  cancel: CancellationToken,
}

impl EventEmitter {
  /// Start the batching task. Must be called within a tokio runtime.
  ///
  /// Batches go to `listener` as [`OutboundMessage::Events`]; without a
  /// listener events are only recorded.
  pub fn start(config: EmitterConfig, listener: Option<mpsc::UnboundedSender<OutboundMessage>>) -> Self {
    let history = Arc::new(EventHistory::new(config.max_last_events, config.max_tape_size));
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    tokio::spawn(batch_loop(receiver, listener, config.debounce, cancel.clone()));

    Self {
      history,
      sender,
      cancel,
    }
  }

  pub fn history(&self) -> &Arc<EventHistory> {
    &self.history
  }

  /// Stop the batching task. Events still pending in the current window
  /// are flushed.
  pub fn shutdown(&self) {
    self.cancel.cancel();
  }
}

impl Debugger for EventEmitter {
  fn on_event(&self, event: DebuggerEvent) {
    self.history.record(event.clone());
    // Batching task may have stopped
    let _ = self.sender.send(event);
  }
}

impl Drop for EventEmitter {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

async fn batch_loop(
  mut receiver: mpsc::UnboundedReceiver<DebuggerEvent>,
  listener: Option<mpsc::UnboundedSender<OutboundMessage>>,
  debounce: Duration,
  cancel: CancellationToken,
) {
  loop {
    let first = tokio::select! {
      _ = cancel.cancelled() => {
        // Events queued when the cancellation won the race are flushed
        let rest: Vec<_> = std::iter::from_fn(|| receiver.try_recv().ok()).collect();
        if !rest.is_empty() {
          send(&listener, rest);
        }
        break;
      }
      event = receiver.recv() => match event {
        Some(event) => event,
        None => break,
      },
    };

    let mut batch = vec![first];
    let deadline = Instant::now() + debounce;
    let mut closed = false;
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          closed = true;
          break;
        }
        next = timeout_at(deadline, receiver.recv()) => match next {
          Ok(Some(event)) => batch.push(event),
          Ok(None) => {
            closed = true;
            break;
          }
          Err(_) => break,
        },
      }
    }

    // Events that arrived together with the cancellation still belong to
    // this batch.
    while let Ok(event) = receiver.try_recv() {
      batch.push(event);
    }

    send(&listener, batch);

    if closed {
      break;
    }
  }
}

fn send(listener: &Option<mpsc::UnboundedSender<OutboundMessage>>, batch: Vec<DebuggerEvent>) {
  debug!(events = batch.len(), "debugger_batch_flushed");
  if let Some(listener) = listener {
    // Listener may have gone away
    let _ = listener.send(OutboundMessage::Events { events: batch });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::DebuggerEventKind;
  use serde_json::json;

  fn event(value: i64) -> DebuggerEvent {
    DebuggerEvent::new(
      DebuggerEventKind::InputChange,
      "exec",
      "a",
      Some("v".to_string()),
      json!(value),
      0,
    )
  }

  #[tokio::test(start_paused = true)]
  async fn test_events_within_window_are_batched() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let emitter = EventEmitter::start(EmitterConfig::default(), Some(tx));

    emitter.on_event(event(1));
    emitter.on_event(event(2));
    emitter.on_event(event(3));

    let OutboundMessage::Events { events } = rx.recv().await.unwrap();
    assert_eq!(events.len(), 3);

    tokio::time::sleep(Duration::from_millis(200)).await;
    emitter.on_event(event(4));
    let OutboundMessage::Events { events } = rx.recv().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].value, json!(4));
  }

  #[tokio::test]
  async fn test_history_is_recorded_without_listener() {
    let emitter = EventEmitter::start(EmitterConfig::default(), None);
    emitter.on_event(event(1));
    emitter.on_event(event(2));

    let response = emitter.history().history("a", Some("v"), None);
    assert_eq!(response.total, 2);
  }

  #[tokio::test]
  async fn test_shutdown_flushes_pending_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let emitter = EventEmitter::start(EmitterConfig::default(), Some(tx));
    for n in 1..=3 {
      emitter.on_event(event(n));
    }
    emitter.shutdown();

    let mut delivered = Vec::new();
    while let Some(OutboundMessage::Events { events }) = rx.recv().await {
      delivered.extend(events.into_iter().map(|e| e.value));
    }
    assert_eq!(delivered, vec![json!(1), json!(2), json!(3)]);
  }

  #[tokio::test]
  async fn test_dropped_listener_does_not_fail() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let emitter = EventEmitter::start(EmitterConfig::default(), Some(tx));
    emitter.on_event(event(1));
    emitter.shutdown();
    assert_eq!(emitter.history().history("a", Some("v"), None).total, 1);
  }
}
