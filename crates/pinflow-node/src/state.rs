//! Per-instance state slices.
//!
//! Each running instance owns one [`InstanceState`]. Keys are declared by
//! the node author as typed [`StateKey`] constants; the namespace keeps
//! unrelated values of one instance from colliding.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Value;
use crate::error::NodeError;

/// A typed handle to one entry of an instance's state.
///
/// ```ignore
/// const BUFFER: StateKey<Vec<Value>> = StateKey::new("collect", "buffer");
/// ```
pub struct StateKey<T> {
  namespace: &'static str,
  name: &'static str,
  _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
  pub const fn new(namespace: &'static str, name: &'static str) -> Self {
    Self {
      namespace,
      name,
      _marker: PhantomData,
    }
  }

  /// The storage key, `namespace.name`.
  pub fn qualified(&self) -> String {
    format!("{}.{}", self.namespace, self.name)
  }
}

impl<T> Clone for StateKey<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for StateKey<T> {}

impl<T> std::fmt::Debug for StateKey<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "StateKey({}.{})", self.namespace, self.name)
  }
}

/// One instance's slice of the session state store.
///
/// Cloning shares the slice.
#[derive(Debug, Clone, Default)]
pub struct InstanceState {
  entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl InstanceState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<Option<T>, NodeError> {
    let raw = self.entries.lock().get(&key.qualified()).cloned();
    match raw {
      Some(value) => Ok(Some(serde_json::from_value(value)?)),
      None => Ok(None),
    }
  }

  pub fn set<T: Serialize>(&self, key: &StateKey<T>, value: &T) -> Result<(), NodeError> {
    let value = serde_json::to_value(value)?;
    self.entries.lock().insert(key.qualified(), value);
    Ok(())
  }

  /// Read-modify-write an entry under the slice lock, starting from
  /// `T::default()` when absent. Returns the stored value.
  pub fn update<T, F>(&self, key: &StateKey<T>, f: F) -> Result<T, NodeError>
  where
    T: Serialize + DeserializeOwned + Default + Clone,
    F: FnOnce(&mut T),
  {
    let mut entries = self.entries.lock();
    let qualified = key.qualified();
    let mut current: T = match entries.get(&qualified) {
      Some(value) => serde_json::from_value(value.clone())?,
      None => T::default(),
    };
    f(&mut current);
    entries.insert(qualified, serde_json::to_value(&current)?);
    Ok(current)
  }

  /// Remove an entry and return what it held.
  pub fn take<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<Option<T>, NodeError> {
    let raw = self.entries.lock().remove(&key.qualified());
    match raw {
      Some(value) => Ok(Some(serde_json::from_value(value)?)),
      None => Ok(None),
    }
  }

  pub fn remove<T>(&self, key: &StateKey<T>) {
    self.entries.lock().remove(&key.qualified());
  }

  /// Untyped read, used by the session store.
  pub fn get_raw(&self, key: &str) -> Option<Value> {
    self.entries.lock().get(key).cloned()
  }

  /// Untyped write, used by the session store.
  pub fn set_raw(&self, key: impl Into<String>, value: Value) {
    self.entries.lock().insert(key.into(), value);
  }

  pub fn clear(&self) {
    self.entries.lock().clear();
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }

  /// Copy of all entries.
  pub fn snapshot(&self) -> BTreeMap<String, Value> {
    self.entries.lock().clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const COUNT: StateKey<u64> = StateKey::new("counter", "count");
  const OTHER_COUNT: StateKey<u64> = StateKey::new("other", "count");
  const ITEMS: StateKey<Vec<Value>> = StateKey::new("collect", "items");

  #[test]
  fn test_typed_get_set() {
    let state = InstanceState::new();
    assert_eq!(state.get(&COUNT).unwrap(), None);

    state.set(&COUNT, &3).unwrap();
    assert_eq!(state.get(&COUNT).unwrap(), Some(3));
  }

  #[test]
  fn test_namespaces_do_not_collide() {
    let state = InstanceState::new();
    state.set(&COUNT, &1).unwrap();
    state.set(&OTHER_COUNT, &2).unwrap();

    assert_eq!(state.get(&COUNT).unwrap(), Some(1));
    assert_eq!(state.get(&OTHER_COUNT).unwrap(), Some(2));
  }

  #[test]
  fn test_update_starts_from_default() {
    let state = InstanceState::new();
    let items = state.update(&ITEMS, |items| items.push(json!(1))).unwrap();
    assert_eq!(items, vec![json!(1)]);

    let items = state.update(&ITEMS, |items| items.push(json!(2))).unwrap();
    assert_eq!(items, vec![json!(1), json!(2)]);
  }

  #[test]
  fn test_take_removes_entry() {
    let state = InstanceState::new();
    state.set(&COUNT, &4).unwrap();

    assert_eq!(state.take(&COUNT).unwrap(), Some(4));
    assert_eq!(state.take(&COUNT).unwrap(), None);
    assert!(state.is_empty());
  }

  #[test]
  fn test_clone_shares_slice() {
    let state = InstanceState::new();
    let shared = state.clone();
    shared.set(&COUNT, &7).unwrap();

    assert_eq!(state.get(&COUNT).unwrap(), Some(7));
    state.clear();
    assert!(shared.is_empty());
  }

  #[test]
  fn test_type_mismatch_is_an_error() {
    let state = InstanceState::new();
    state.set_raw("counter.count", json!("not a number"));
    assert!(matches!(state.get(&COUNT), Err(NodeError::Serialization(_))));
  }
}
