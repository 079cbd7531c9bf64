//! The `Collect` macro node.
//!
//! Buffers every `value` in the instance's state and emits the buffer as
//! `list`. `list` is a completion output: once it fires the buffer is
//! discarded and collection starts over.

use std::time::Duration;

use async_trait::async_trait;
use pinflow_node::{
  DefinitionError, MacroNode, NodeDefinition, NodeError, NodeInputs, NodeSpec, RunBehavior,
  RunContext, StateKey, Value,
};
use serde::Deserialize;

const BUFFER: StateKey<Vec<Value>> = StateKey::new("collect", "buffer");

/// When a `Collect` instance emits its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectStrategy {
  /// After `count` values.
  Count,
  /// `timeMs` after the first value of a batch.
  Time,
  /// Whenever a value arrives on `trigger`.
  Trigger,
}

/// `macroData` of a `Collect` instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectConfig {
  #[serde(default = "default_strategy")]
  pub strategy: CollectStrategy,
  #[serde(default)]
  pub count: Option<usize>,
  #[serde(default)]
  pub time_ms: Option<u64>,
}

fn default_strategy() -> CollectStrategy {
  CollectStrategy::Count
}

pub struct Collect;

impl MacroNode for Collect {
  fn id(&self) -> &str {
    "Collect"
  }

  fn materialize(&self, config: &Value) -> Result<NodeDefinition, DefinitionError> {
    let invalid = |message: String| DefinitionError::InvalidMacroConfig {
      macro_id: "Collect".to_string(),
      message,
    };
    let config: CollectConfig =
      serde_json::from_value(config.clone()).map_err(|err| invalid(err.to_string()))?;

    let spec = NodeSpec::new("Collect")
      .namespace(crate::PACKAGE_NAME)
      .output("list")
      .completion_output("list")
      .reactive_input("value");

    let key = crate::key("Collect");
    let spec = match config.strategy {
      CollectStrategy::Count => {
        let count = config
          .count
          .filter(|count| *count > 0)
          .ok_or_else(|| invalid("strategy 'count' needs a positive 'count'".to_string()))?;
        spec
          .input("value", "required")
          .code(format!("{key}:count:{count}"), ByCount { count })
      }
      CollectStrategy::Time => {
        let time_ms = config
          .time_ms
          .ok_or_else(|| invalid("strategy 'time' needs 'timeMs'".to_string()))?;
        let behavior = ByTime {
          window: Duration::from_millis(time_ms),
        };
        spec
          .input("value", "required")
          .code(format!("{key}:time:{time_ms}"), behavior)
      }
      CollectStrategy::Trigger => spec
        .input("value", "optional")
        .input("trigger", "optional")
        .reactive_input("trigger")
        .code(format!("{key}:trigger"), ByTrigger),
    };
    spec.build()
  }
}

fn push(ctx: &RunContext, inputs: &NodeInputs) -> Result<usize, NodeError> {
  let Some(value) = inputs.get("value") else {
    return Ok(ctx.state().get(&BUFFER)?.map_or(0, |buffer| buffer.len()));
  };
  let buffer = ctx.state().update(&BUFFER, |buffer| buffer.push(value.clone()))?;
  Ok(buffer.len())
}

fn flush(ctx: &RunContext) -> Result<(), NodeError> {
  let buffer = ctx.state().take(&BUFFER)?.unwrap_or_default();
  ctx.emit("list", buffer);
  Ok(())
}

struct ByCount {
  count: usize,
}

#[async_trait]
impl RunBehavior for ByCount {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    if push(&ctx, &inputs)? >= self.count {
      flush(&ctx)?;
    }
    Ok(())
  }
}

struct ByTime {
  window: Duration,
}

#[async_trait]
impl RunBehavior for ByTime {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    // The first value of a batch starts its window
    if push(&ctx, &inputs)? == 1 {
      let window = self.window;
      let timer = ctx.clone();
      ctx.spawn(async move {
        tokio::time::sleep(window).await;
        if let Err(err) = flush(&timer) {
          timer.report_error(err);
        }
      });
    }
    Ok(())
  }
}

struct ByTrigger;

#[async_trait]
impl RunBehavior for ByTrigger {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    push(&ctx, &inputs)?;
    if inputs.is_provided("trigger") {
      flush(&ctx)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::Recorder;
  use serde_json::json;

  fn value(v: Value) -> NodeInputs {
    NodeInputs::from_iter([("value".to_string(), v)])
  }

  async fn run(definition: &NodeDefinition, inputs: NodeInputs, recorder: &Recorder) {
    let behavior = definition.implementation().unwrap().behavior().clone();
    behavior.run(inputs, recorder.context()).await.unwrap();
  }

  #[tokio::test]
  async fn test_count_emits_after_n_values() {
    let definition = Collect
      .materialize(&json!({ "strategy": "count", "count": 3 }))
      .unwrap();
    let recorder = Recorder::new();

    for v in [1, 2] {
      run(&definition, value(json!(v)), &recorder).await;
    }
    assert!(recorder.emitted().is_empty());

    run(&definition, value(json!(3)), &recorder).await;
    assert_eq!(recorder.emitted(), vec![("list".to_string(), json!([1, 2, 3]))]);
    assert!(recorder.state().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_time_emits_after_window() {
    let definition = Collect
      .materialize(&json!({ "strategy": "time", "timeMs": 100 }))
      .unwrap();
    let recorder = Recorder::new();

    run(&definition, value(json!("a")), &recorder).await;
    run(&definition, value(json!("b")), &recorder).await;
    assert!(recorder.emitted().is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(recorder.emitted(), vec![("list".to_string(), json!(["a", "b"]))]);
  }

  #[tokio::test]
  async fn test_trigger_flushes_buffer() {
    let definition = Collect
      .materialize(&json!({ "strategy": "trigger" }))
      .unwrap();
    let recorder = Recorder::new();

    run(&definition, value(json!(1)), &recorder).await;
    let mut inputs = value(json!(2));
    inputs.insert("trigger", json!(true));
    run(&definition, inputs, &recorder).await;

    assert_eq!(recorder.emitted(), vec![("list".to_string(), json!([1, 2]))]);
  }

  #[test]
  fn test_definition_shape() {
    let definition = Collect.materialize(&json!({ "count": 2 })).unwrap();
    assert_eq!(definition.completion_outputs, vec!["list".to_string()]);
    assert!(definition.is_reactive("value"));
    assert_eq!(
      definition.implementation().unwrap().key(),
      "@pinflow/stdlib/Collect:count:2"
    );
  }

  #[test]
  fn test_invalid_config() {
    for config in [
      json!({ "strategy": "count" }),
      json!({ "strategy": "count", "count": 0 }),
      json!({ "strategy": "time" }),
      json!({ "strategy": "sometimes" }),
    ] {
      let err = Collect.materialize(&config).unwrap_err();
      assert!(matches!(err, DefinitionError::InvalidMacroConfig { .. }), "{config}");
    }
  }
}
