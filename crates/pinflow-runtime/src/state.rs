use std::collections::BTreeMap;

use parking_lot::Mutex;
use pinflow_debugger::protocol::StateSource;
use pinflow_node::{InstanceState, Value};

/// Per-instance state for one session.
///
/// Slices are created on first use and shared with the instance's
/// [`RunContext`](pinflow_node::RunContext); clearing a slice clears it in
/// place so running code observes the reset.
#[derive(Default)]
pub struct StateStore {
  slices: Mutex<BTreeMap<String, InstanceState>>,
}

impl StateStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// The state slice of `instance`, created if missing.
  pub fn slice(&self, instance: &str) -> InstanceState {
    self
      .slices
      .lock()
      .entry(instance.to_string())
      .or_default()
      .clone()
  }

  pub fn get(&self, instance: &str, key: &str) -> Option<Value> {
    self.slices.lock().get(instance)?.get_raw(key)
  }

  pub fn set(&self, instance: &str, key: impl Into<String>, value: Value) {
    self.slice(instance).set_raw(key, value);
  }

  /// Reset one instance after it completed a unit of work.
  pub fn clear_instance(&self, instance: &str) {
    if let Some(slice) = self.slices.lock().get(instance) {
      slice.clear();
    }
  }

  /// Discard everything. Called when the session ends.
  pub fn clear(&self) {
    let mut slices = self.slices.lock();
    for slice in slices.values() {
      slice.clear();
    }
    slices.clear();
  }

  /// All non-empty slices as `{ instance: { key: value } }`.
  pub fn snapshot(&self) -> Value {
    let slices = self.slices.lock();
    let map = slices
      .iter()
      .filter(|(_, slice)| !slice.is_empty())
      .map(|(instance, slice)| {
        let entries = slice.snapshot().into_iter().collect();
        (instance.clone(), Value::Object(entries))
      })
      .collect();
    Value::Object(map)
  }
}

impl StateSource for StateStore {
  fn state_snapshot(&self) -> Value {
    self.snapshot()
  }
}
