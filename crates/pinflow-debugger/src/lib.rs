//! Pinflow Debugger
//!
//! Observes a running session: every pin transition, processing change and
//! error becomes a [`DebuggerEvent`]. Events are kept in a capped
//! [`EventHistory`] and streamed, batched, to an attached listener by the
//! [`EventEmitter`].
//!
//! The [`protocol`] module defines the JSON messages exchanged with a debug
//! client and the small query surface (`GET /history`, `DELETE /history`,
//! `GET /state`); [`server`] serves both over HTTP and a websocket.

mod emitter;
mod error;
mod event;
mod history;
pub mod protocol;
pub mod server;

pub use emitter::{EmitterConfig, EventEmitter};
pub use error::ProtocolError;
pub use event::{
  ChannelDebugger, Debugger, DebuggerEvent, DebuggerEventKind, NoopDebugger,
};
pub use history::{EventHistory, HistoryResponse, MAX_LAST_EVENTS, MAX_LAST_EVENTS_TAPE_SIZE};
