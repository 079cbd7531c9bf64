use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use crate::event::DebuggerEvent;

/// Samples kept per `(instance, pin)` key.
pub const MAX_LAST_EVENTS: usize = 100;

/// Events kept on the global tape.
pub const MAX_LAST_EVENTS_TAPE_SIZE: usize = 1000;

type HistoryKey = (String, Option<String>);

#[derive(Default)]
struct KeyHistory {
  total: u64,
  last: VecDeque<DebuggerEvent>,
}

#[derive(Default)]
struct HistoryInner {
  by_key: HashMap<HistoryKey, KeyHistory>,
  tape: VecDeque<DebuggerEvent>,
}

/// Answer to a history query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
  /// Every event ever recorded for the key, including evicted ones.
  pub total: u64,
  /// Most recent samples, oldest first.
  pub last_samples: Vec<DebuggerEvent>,
}

/// Capped event history shared between the emitter and query handlers.
pub struct EventHistory {
  inner: Mutex<HistoryInner>,
  max_last_events: usize,
  max_tape_size: usize,
}

impl Default for EventHistory {
  fn default() -> Self {
    Self::new(MAX_LAST_EVENTS, MAX_LAST_EVENTS_TAPE_SIZE)
  }
}

impl EventHistory {
  pub fn new(max_last_events: usize, max_tape_size: usize) -> Self {
    Self {
      inner: Mutex::new(HistoryInner::default()),
      max_last_events,
      max_tape_size,
    }
  }

  pub fn record(&self, event: DebuggerEvent) {
    let mut inner = self.inner.lock();

    let key = (event.instance_id.clone(), event.pin_id.clone());
    let entry = inner.by_key.entry(key).or_default();
    entry.total += 1;
    entry.last.push_back(event.clone());
    while entry.last.len() > self.max_last_events {
      entry.last.pop_front();
    }

    inner.tape.push_back(event);
    while inner.tape.len() > self.max_tape_size {
      inner.tape.pop_front();
    }
  }

  /// Up to `limit` most recent events for `(instance_id, pin_id)`.
  pub fn history(&self, instance_id: &str, pin_id: Option<&str>, limit: Option<usize>) -> HistoryResponse {
    let inner = self.inner.lock();
    let key = (instance_id.to_string(), pin_id.map(str::to_string));

    match inner.by_key.get(&key) {
      Some(entry) => {
        let limit = limit.unwrap_or(entry.last.len()).min(entry.last.len());
        let skip = entry.last.len() - limit;
        HistoryResponse {
          total: entry.total,
          last_samples: entry.last.iter().skip(skip).cloned().collect(),
        }
      }
      None => HistoryResponse {
        total: 0,
        last_samples: Vec::new(),
      },
    }
  }

  /// The global tape, oldest first.
  pub fn tape(&self) -> Vec<DebuggerEvent> {
    self.inner.lock().tape.iter().cloned().collect()
  }

  pub fn clear(&self) {
    let mut inner = self.inner.lock();
    inner.by_key.clear();
    inner.tape.clear();
  }
}
