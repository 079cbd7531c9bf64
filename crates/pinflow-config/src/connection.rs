use serde::{Deserialize, Serialize};

/// Reserved instance id for the enclosing flow's own boundary pins.
pub const THIS_INSTANCE_ID: &str = "__this";

/// One end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRef {
  pub ins_id: String,
  pub pin_id: String,
}

impl PinRef {
  pub fn new(ins_id: impl Into<String>, pin_id: impl Into<String>) -> Self {
    Self {
      ins_id: ins_id.into(),
      pin_id: pin_id.into(),
    }
  }

  /// Whether this end refers to the flow boundary rather than an instance.
  pub fn is_boundary(&self) -> bool {
    self.ins_id == THIS_INSTANCE_ID
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDef {
  pub from: PinRef,
  pub to: PinRef,
}
