//! Pinflow Config
//!
//! This crate contains the serializable flow source types for pinflow.
//! These types represent flows exactly as authored, before imports are
//! walked and definitions are namespaced by the resolver.
//!
//! Flows can be loaded from:
//! - YAML files (`*.flow.yaml`, `*.yml`)
//! - JSON files (`*.flow.json`)
//!
//! Installed packages describe themselves with a [`PackageManifest`]
//! (`pinflow.json`) listing the flow files they expose.

mod connection;
mod error;
mod flow;
mod import;
mod instance;
mod manifest;
mod parse;
mod pin;

pub use connection::{ConnectionDef, PinRef, THIS_INSTANCE_ID};
pub use error::ConfigError;
pub use flow::FlowDef;
pub use import::ImportSpec;
pub use instance::{InstanceDef, InstanceSource, Position};
pub use manifest::{MANIFEST_FILE_NAME, PackageManifest};
pub use parse::{SourceFormat, parse_flow, parse_manifest};
pub use pin::{InputConfigDef, InputDef, OutputDef};
