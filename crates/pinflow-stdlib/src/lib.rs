//! Pinflow Standard Library
//!
//! Generic leaf nodes, registered as the native package
//! [`PACKAGE_NAME`]:
//!
//! - `Add`: sums `n1` and `n2` into `r`.
//! - `InlineValue` (macro): emits its configured `value` once on start.
//! - `Collect` (macro): buffers `value`s and emits them as `list` by
//!   count, timer or trigger.
//! - `Delay`: re-emits `value` after `ms` milliseconds.
//! - `Debounce`: emits the last `value` once no new one arrived for `ms`.

mod collect;
mod inline_value;
mod math;
mod timing;

#[cfg(test)]
mod testing;

pub use collect::{Collect, CollectConfig, CollectStrategy};
pub use inline_value::InlineValue;
pub use math::add;
pub use timing::{debounce, delay};

use pinflow_node::DefinitionError;
use pinflow_resolver::{NativePackage, NodeLibrary};

pub const PACKAGE_NAME: &str = "@pinflow/stdlib";

/// Implementation key for a node of this package.
pub(crate) fn key(node: &str) -> String {
  format!("{PACKAGE_NAME}/{node}")
}

/// The `@pinflow/stdlib` package.
pub fn package() -> Result<NativePackage, DefinitionError> {
  Ok(
    NativePackage::new(PACKAGE_NAME)
      .with_node(add()?)
      .with_node(delay()?)
      .with_node(debounce()?)
      .with_macro(InlineValue)
      .with_macro(Collect),
  )
}

/// A node library holding only the standard package.
pub fn library() -> Result<NodeLibrary, DefinitionError> {
  Ok(NodeLibrary::new().with_package(package()?))
}
