//! Pinflow Node
//!
//! This crate provides the resolved representation shared by the resolver
//! and the runtime:
//!
//! - [`NodeDefinition`]: a reusable node, either code ([`RunBehavior`]) or a
//!   nested graph ([`VisualGraph`])
//! - [`InputMode`] / [`InputPinConfig`]: how an input gates execution and how
//!   it buffers values
//! - [`MacroNode`]: a definition builder materialized per instance
//! - [`ResolvedGraph`]: the flat, namespaced output of resolution
//!
//! Definitions are immutable once built. Code nodes only reach the outside
//! world through the [`RunContext`] handed to each activation.

mod behavior;
mod definition;
mod error;
mod graph;
mod pin;
mod state;

pub use behavior::{
  FnBehavior, MacroNode, NodeInputs, RunBehavior, RunContext, RunHost, behavior_fn,
};
pub use definition::{
  Connection, Implementation, NodeBody, NodeDefinition, NodeInstance, NodeSpec, VisualGraph,
  define_node,
};
pub use error::{DefinitionError, NodeError};
pub use graph::{MissingDependency, ResolvedGraph};
pub use pin::{ERROR_PIN_ID, InputMode, InputPinConfig, InputPinDef, OutputPinDef, is_reserved_pin};
pub use state::{InstanceState, StateKey};

pub use pinflow_config::{PinRef, Position, THIS_INSTANCE_ID};

/// Values flowing through pins.
pub type Value = serde_json::Value;
