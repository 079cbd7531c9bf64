use async_trait::async_trait;
use pinflow_node::{
  DefinitionError, MacroNode, NodeDefinition, NodeError, NodeInputs, NodeSpec, RunBehavior,
  RunContext, Value,
};

/// Macro producing a source node that emits `macroData.value` once.
///
/// ```yaml
/// - id: five
///   nodeId: InlineValue
///   macroData: { value: 5 }
/// ```
pub struct InlineValue;

struct Emit {
  value: Value,
}

#[async_trait]
impl RunBehavior for Emit {
  async fn run(&self, _inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    ctx.emit("value", self.value.clone());
    Ok(())
  }
}

impl MacroNode for InlineValue {
  fn id(&self) -> &str {
    "InlineValue"
  }

  fn materialize(&self, config: &Value) -> Result<NodeDefinition, DefinitionError> {
    let value = config.get("value").cloned().unwrap_or(Value::Null);
    NodeSpec::new("InlineValue")
      .namespace(crate::PACKAGE_NAME)
      .output("value")
      .externally_triggered()
      .code(format!("{}:{value}", crate::key("InlineValue")), Emit { value })
      .build()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::Recorder;
  use serde_json::json;

  #[tokio::test]
  async fn test_emits_configured_value() {
    let definition = InlineValue.materialize(&json!({ "value": [1, 2] })).unwrap();
    let recorder = Recorder::new();

    let behavior = definition.implementation().unwrap().behavior().clone();
    behavior.run(NodeInputs::new(), recorder.context()).await.unwrap();

    assert_eq!(recorder.emitted(), vec![("value".to_string(), json!([1, 2]))]);
    assert!(definition.inputs.is_empty());
  }

  #[test]
  fn test_key_depends_on_value() {
    let a = InlineValue.materialize(&json!({ "value": 1 })).unwrap();
    let b = InlineValue.materialize(&json!({ "value": 2 })).unwrap();
    let a_again = InlineValue.materialize(&json!({ "value": 1 })).unwrap();

    assert_ne!(a.implementation(), b.implementation());
    assert_eq!(a.implementation(), a_again.implementation());
  }
}
