use async_trait::async_trait;
use pinflow_node::{
  DefinitionError, NodeDefinition, NodeError, NodeInputs, NodeSpec, RunBehavior, RunContext,
  Value,
};

struct Add;

#[async_trait]
impl RunBehavior for Add {
  async fn run(&self, inputs: NodeInputs, ctx: RunContext) -> Result<(), NodeError> {
    let n1 = number(&inputs, "n1")?;
    let n2 = number(&inputs, "n2")?;

    // Integer operands stay integers
    let sum = match (n1.as_i64(), n2.as_i64()) {
      (Some(a), Some(b)) => match a.checked_add(b) {
        Some(sum) => Value::from(sum),
        None => float(a as f64 + b as f64)?,
      },
      _ => float(n1.as_f64().unwrap_or_default() + n2.as_f64().unwrap_or_default())?,
    };

    ctx.emit("r", sum);
    Ok(())
  }
}

fn number<'a>(inputs: &'a NodeInputs, pin: &str) -> Result<&'a serde_json::Number, NodeError> {
  match inputs.require(pin)? {
    Value::Number(n) => Ok(n),
    other => Err(NodeError::invalid_input(pin, format!("expected a number, got {other}"))),
  }
}

fn float(value: f64) -> Result<Value, NodeError> {
  serde_json::Number::from_f64(value)
    .map(Value::Number)
    .ok_or_else(|| NodeError::message(format!("sum is not a finite number: {value}")))
}

pub fn add() -> Result<NodeDefinition, DefinitionError> {
  NodeSpec::new("Add")
    .namespace(crate::PACKAGE_NAME)
    .description("Adds two numbers")
    .input("n1", "required")
    .input("n2", "required")
    .output("r")
    .code(crate::key("Add"), Add)
    .build()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::Recorder;
  use serde_json::json;

  async fn run(n1: Value, n2: Value) -> (Result<(), NodeError>, Vec<(String, Value)>) {
    let recorder = Recorder::new();
    let inputs = NodeInputs::from_iter([("n1".to_string(), n1), ("n2".to_string(), n2)]);
    let result = Add.run(inputs, recorder.context()).await;
    (result, recorder.emitted())
  }

  #[tokio::test]
  async fn test_adds_integers() {
    let (result, emitted) = run(json!(5), json!(1)).await;
    result.unwrap();
    assert_eq!(emitted, vec![("r".to_string(), json!(6))]);
  }

  #[tokio::test]
  async fn test_adds_floats() {
    let (result, emitted) = run(json!(1.5), json!(2)).await;
    result.unwrap();
    assert_eq!(emitted, vec![("r".to_string(), json!(3.5))]);
  }

  #[tokio::test]
  async fn test_rejects_non_numbers() {
    let (result, emitted) = run(json!("a"), json!(2)).await;
    assert!(matches!(result, Err(NodeError::InvalidInput { pin, .. }) if pin == "n1"));
    assert!(emitted.is_empty());
  }
}
