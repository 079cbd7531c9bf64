use std::collections::VecDeque;

use pinflow_node::{InputPinConfig, Value};

/// A live input pin of a code instance.
#[derive(Debug)]
pub(crate) struct LivePin {
  config: InputPinConfig,
  required: bool,
  reactive: bool,
  queue: VecDeque<Value>,
  last: Option<Value>,
  /// A value arrived since the last activation.
  fresh: bool,
}

impl LivePin {
  pub fn new(config: InputPinConfig, required: bool, reactive: bool) -> Self {
    Self {
      config,
      required,
      reactive,
      queue: VecDeque::new(),
      last: None,
      fresh: false,
    }
  }

  pub fn is_reactive(&self) -> bool {
    self.reactive
  }

  pub fn push(&mut self, value: Value) {
    match &mut self.config {
      InputPinConfig::Static(current) => *current = value,
      InputPinConfig::Queue => self.queue.push_back(value),
      InputPinConfig::Sticky => self.last = Some(value),
    }
    self.fresh = true;
  }

  pub fn is_satisfied(&self) -> bool {
    match self.config {
      InputPinConfig::Static(_) => true,
      InputPinConfig::Queue => !self.queue.is_empty(),
      InputPinConfig::Sticky => self.last.is_some(),
    }
  }

  /// Whether this pin keeps the instance from running.
  pub fn blocks(&self) -> bool {
    self.required && !self.is_satisfied()
  }

  pub fn has_queued(&self) -> bool {
    !self.queue.is_empty()
  }

  /// A value not yet seen by any activation.
  pub fn has_new_value(&self) -> bool {
    match self.config {
      InputPinConfig::Queue => !self.queue.is_empty(),
      InputPinConfig::Sticky | InputPinConfig::Static(_) => self.fresh,
    }
  }

  /// The value handed to an activation: dequeued for a queue, peeked
  /// otherwise.
  pub fn take(&mut self) -> Option<Value> {
    self.fresh = false;
    match &self.config {
      InputPinConfig::Static(value) => Some(value.clone()),
      InputPinConfig::Queue => self.queue.pop_front(),
      InputPinConfig::Sticky => self.last.clone(),
    }
  }

  /// Debugger view: buffered count for queues, satisfaction otherwise.
  pub fn describe(&self) -> Value {
    match self.config {
      InputPinConfig::Queue => Value::from(self.queue.len()),
      _ => Value::Bool(self.is_satisfied()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_queue_is_fifo() {
    let mut pin = LivePin::new(InputPinConfig::Queue, true, false);
    assert!(pin.blocks());

    pin.push(json!(1));
    pin.push(json!(2));
    assert!(pin.is_satisfied());
    assert_eq!(pin.take(), Some(json!(1)));
    assert_eq!(pin.take(), Some(json!(2)));
    assert_eq!(pin.take(), None);
    assert!(pin.blocks());
  }

  #[test]
  fn test_sticky_keeps_last_value() {
    let mut pin = LivePin::new(InputPinConfig::Sticky, true, false);
    pin.push(json!("a"));
    pin.push(json!("b"));

    assert_eq!(pin.take(), Some(json!("b")));
    assert!(!pin.has_new_value());
    assert_eq!(pin.take(), Some(json!("b")));
  }

  #[test]
  fn test_static_is_always_satisfied() {
    let mut pin = LivePin::new(InputPinConfig::Static(json!(1)), true, false);
    assert!(!pin.blocks());
    assert_eq!(pin.take(), Some(json!(1)));
    assert_eq!(pin.take(), Some(json!(1)));
  }

  #[test]
  fn test_optional_never_blocks() {
    let pin = LivePin::new(InputPinConfig::Queue, false, false);
    assert!(!pin.blocks());
    assert_eq!(pin.describe(), json!(0));
  }
}
