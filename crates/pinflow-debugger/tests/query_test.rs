use pinflow_debugger::protocol::{DebugQuery, HistoryQuery, StateSource, answer_query};
use pinflow_debugger::{DebuggerEvent, DebuggerEventKind, EventHistory};
use serde_json::{Value, json};

struct FixedState(Value);

impl StateSource for FixedState {
  fn state_snapshot(&self) -> Value {
    self.0.clone()
  }
}

fn output(ins: &str, pin: &str, value: Value) -> DebuggerEvent {
  DebuggerEvent::new(
    DebuggerEventKind::OutputChange,
    "exec-1",
    ins,
    Some(pin.to_string()),
    value,
    0,
  )
}

#[test]
fn test_history_query_round_trip() {
  let history = EventHistory::default();
  history.record(output("add1", "r", json!(6)));
  history.record(output("add1", "r", json!(7)));
  let state = FixedState(json!({}));

  let query = DebugQuery::History(HistoryQuery {
    ins_id: "add1".to_string(),
    pin_id: Some("r".to_string()),
    limit: Some(1),
  });
  let body = answer_query(&query, &history, &state);

  assert_eq!(body["total"], json!(2));
  assert_eq!(body["lastSamples"].as_array().map(Vec::len), Some(1));
  assert_eq!(body["lastSamples"][0]["value"], json!(7));
}

#[test]
fn test_clear_then_state() {
  let history = EventHistory::default();
  history.record(output("a", "r", json!(1)));
  let state = FixedState(json!({ "collect1": { "collect.buffer": [1, 2] } }));

  answer_query(&DebugQuery::ClearHistory, &history, &state);
  assert_eq!(history.history("a", Some("r"), None).total, 0);

  let body = answer_query(&DebugQuery::State, &history, &state);
  assert_eq!(body["collect1"]["collect.buffer"], json!([1, 2]));
}
