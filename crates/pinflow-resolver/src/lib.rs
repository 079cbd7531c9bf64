//! Pinflow Resolver
//!
//! Turns a flow, possibly spread across files and packages with transitive
//! imports, into one [`ResolvedGraph`](pinflow_node::ResolvedGraph): a root
//! definition plus a flat map of every definition it uses, with ids
//! namespaced so that unrelated definitions sharing a name never collide.
//!
//! Modules are located as follows:
//!
//! - a path (`./helper.flow.yaml`, `/abs/x.flow.json`) is a flow file, which
//!   exports its root id
//! - any other name is a package: first the native [`NodeLibrary`], then a
//!   `packages/<name>/pinflow.json` directory found by walking up from the
//!   importing file

mod error;
mod flow;
mod library;
mod namespace;
mod package;
mod resolver;
mod secrets;
mod validate;

pub use error::ResolveError;
pub use library::{NativeExport, NativePackage, NodeLibrary};
pub use resolver::{Resolver, StandardResolver};
pub use secrets::Secrets;
