use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What a [`DebuggerEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebuggerEventKind {
  /// A value arrived at an input pin.
  InputChange,
  /// A value was emitted on an output pin.
  OutputChange,
  /// An instance started or stopped processing; `value` is a boolean.
  ProcessingChange,
  /// Satisfaction of an instance's inputs changed; `value` maps pin to
  /// buffered count or satisfaction.
  InputsStateChange,
  /// An instance failed.
  Error,
}

/// One observed transition of a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggerEvent {
  #[serde(rename = "type")]
  pub kind: DebuggerEventKind,
  #[serde(rename = "insId")]
  pub instance_id: String,
  #[serde(rename = "pinId", default, skip_serializing_if = "Option::is_none")]
  pub pin_id: Option<String>,
  pub value: serde_json::Value,
  pub timestamp: DateTime<Utc>,
  /// Milliseconds since the session started.
  pub elapsed_ms: u64,
  pub execution_id: String,
}

impl DebuggerEvent {
  pub fn new(
    kind: DebuggerEventKind,
    execution_id: impl Into<String>,
    instance_id: impl Into<String>,
    pin_id: Option<String>,
    value: serde_json::Value,
    elapsed_ms: u64,
  ) -> Self {
    Self {
      kind,
      instance_id: instance_id.into(),
      pin_id,
      value,
      timestamp: Utc::now(),
      elapsed_ms,
      execution_id: execution_id.into(),
    }
  }
}

/// Trait for observing a session.
///
/// The runtime calls `on_event` synchronously from its event loop, so
/// implementations must return quickly and never block.
pub trait Debugger: Send + Sync {
  fn on_event(&self, event: DebuggerEvent);
}

/// A debugger that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopDebugger;

impl Debugger for NoopDebugger {
  fn on_event(&self, _event: DebuggerEvent) {}
}

/// A debugger that forwards each event, unbatched, to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDebugger {
  sender: mpsc::UnboundedSender<DebuggerEvent>,
}

impl ChannelDebugger {
  pub fn new(sender: mpsc::UnboundedSender<DebuggerEvent>) -> Self {
    Self { sender }
  }
}

impl Debugger for ChannelDebugger {
  fn on_event(&self, event: DebuggerEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_event_wire_shape() {
    let event = DebuggerEvent::new(
      DebuggerEventKind::InputChange,
      "exec-1",
      "add1",
      Some("n1".to_string()),
      json!(5),
      12,
    );
    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["type"], json!("input-change"));
    assert_eq!(value["insId"], json!("add1"));
    assert_eq!(value["pinId"], json!("n1"));
    assert_eq!(value["elapsedMs"], json!(12));
    assert_eq!(value["executionId"], json!("exec-1"));

    let back: DebuggerEvent = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
  }

  #[test]
  fn test_channel_debugger_ignores_closed_receiver() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelDebugger::new(tx).on_event(DebuggerEvent::new(
      DebuggerEventKind::Error,
      "exec-1",
      "a",
      None,
      json!("boom"),
      0,
    ));
  }
}
