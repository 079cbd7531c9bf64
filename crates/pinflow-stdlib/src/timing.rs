use std::time::Duration;

use async_trait::async_trait;
use pinflow_node::{
  DefinitionError, NodeDefinition, NodeError, NodeInputs, NodeSpec, RunBehavior, RunContext,
  StateKey,
};
use serde_json::json;
use tracing::trace;

const DEFAULT_MS: u64 = 100;

const GENERATION: StateKey<u64> = StateKey::new("debounce", "generation");

fn duration(inputs: &NodeInputs) -> Result<Duration, NodeError> {
  let ms: Option<u64> = inputs.get_as("ms")?;
  Ok(Duration::from_millis(ms.unwrap_or(DEFAULT_MS)))
}

struct Delay;

#[async_trait]
impl RunBehavior for Delay {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    let value = inputs.require("value")?.clone();
    let wait = duration(&inputs)?;

    tokio::select! {
      _ = ctx.cancellation().cancelled() => return Ok(()),
      _ = tokio::time::sleep(wait) => {}
    }
    ctx.emit("value", value);
    Ok(())
  }
}

/// Re-emits each `value` after `ms` milliseconds. One value is delayed at
/// a time.
pub fn delay() -> Result<NodeDefinition, DefinitionError> {
  NodeSpec::new("Delay")
    .namespace(crate::PACKAGE_NAME)
    .input("value", "required")
    .input_with_default("ms", "optional", json!(DEFAULT_MS))
    .output("value")
    .code(crate::key("Delay"), Delay)
    .build()
}

struct Debounce;

#[async_trait]
impl RunBehavior for Debounce {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    let value = inputs.require("value")?.clone();
    let wait = duration(&inputs)?;
    let generation = ctx.state().update(&GENERATION, |g| *g += 1)?;

    let timer = ctx.clone();
    ctx.spawn(async move {
      tokio::time::sleep(wait).await;
      match timer.state().get(&GENERATION) {
        Ok(Some(current)) if current == generation => timer.emit("value", value),
        Ok(_) => trace!(instance = %timer.instance_id(), generation, "debounce_superseded"),
        Err(err) => timer.report_error(err),
      }
    });
    Ok(())
  }
}

/// Emits the latest `value` once `ms` milliseconds pass without a newer
/// one.
pub fn debounce() -> Result<NodeDefinition, DefinitionError> {
  NodeSpec::new("Debounce")
    .namespace(crate::PACKAGE_NAME)
    .input("value", "required")
    .input_with_default("ms", "optional", json!(DEFAULT_MS))
    .output("value")
    .code(crate::key("Debounce"), Debounce)
    .build()
}
