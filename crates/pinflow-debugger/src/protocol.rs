//! Debug wire protocol.
//!
//! Inbound (client to session):
//! ```json
//! { "type": "setBreakpoints", "breakpoints": [{ "insId": "add1", "pinId": "n1" }] }
//! { "type": "injectInput", "insId": "add1", "pinId": "n1", "value": 5 }
//! { "type": "resume" }
//! ```
//!
//! Outbound (session to client):
//! ```json
//! { "type": "events", "events": [ ... ] }
//! ```
//!
//! Queries: `GET /history?insId=..&pinId=..&limit=..`, `DELETE /history`,
//! `GET /state`, served by [`crate::server`].

use pinflow_config::PinRef;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::error::ProtocolError;
use crate::event::DebuggerEvent;
use crate::history::EventHistory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
  SetBreakpoints {
    breakpoints: Vec<PinRef>,
  },
  InjectInput {
    #[serde(rename = "insId")]
    ins_id: String,
    #[serde(rename = "pinId")]
    pin_id: String,
    #[serde(default)]
    value: Value,
  },
  Resume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
  Events { events: Vec<DebuggerEvent> },
}

/// A session that can be driven by a debug client.
pub trait CommandTarget: Send + Sync {
  /// Replace the set of breakpoints.
  fn set_breakpoints(&self, breakpoints: Vec<PinRef>);

  /// Deliver `value` to an input pin as if it arrived over a connection.
  fn inject_input(&self, ins_id: &str, pin_id: &str, value: Value);

  /// Continue after a breakpoint.
  fn resume(&self);
}

/// Something whose state can be inspected with `GET /state`.
pub trait StateSource: Send + Sync {
  fn state_snapshot(&self) -> Value;
}

pub fn parse_message(text: &str) -> Result<InboundMessage, ProtocolError> {
  Ok(serde_json::from_str(text)?)
}

pub fn dispatch(target: &dyn CommandTarget, message: InboundMessage) {
  match message {
    InboundMessage::SetBreakpoints { breakpoints } => target.set_breakpoints(breakpoints),
    InboundMessage::InjectInput {
      ins_id,
      pin_id,
      value,
    } => target.inject_input(&ins_id, &pin_id, value),
    InboundMessage::Resume => target.resume(),
  }
}

/// Parse and dispatch a raw message. Malformed messages are logged and
/// dropped.
pub fn handle_message(target: &dyn CommandTarget, text: &str) {
  match parse_message(text) {
    Ok(message) => dispatch(target, message),
    Err(e) => warn!(error = %e, "debug_message_dropped"),
  }
}

/// Parameters of `GET /history`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
  pub ins_id: String,
  #[serde(default)]
  pub pin_id: Option<String>,
  #[serde(default)]
  pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugQuery {
  History(HistoryQuery),
  ClearHistory,
  State,
}

/// Answer a query as a JSON body.
pub fn answer_query(query: &DebugQuery, history: &EventHistory, state: &dyn StateSource) -> Value {
  match query {
    DebugQuery::History(HistoryQuery {
      ins_id,
      pin_id,
      limit,
    }) => serde_json::to_value(history.history(ins_id, pin_id.as_deref(), *limit))
      .unwrap_or(Value::Null),
    DebugQuery::ClearHistory => {
      history.clear();
      json!({ "cleared": true })
    }
    DebugQuery::State => state.state_snapshot(),
  }
}
