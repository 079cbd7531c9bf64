use std::collections::BTreeMap;

use pinflow_node::Value;

const ENV_PREFIX: &str = "$ENV.";
const SECRETS_PREFIX: &str = "$secrets.";

/// Named values substituted into flows at resolution time.
///
/// A string that is exactly `"$ENV.<NAME>"` or `"$secrets.<NAME>"` inside an
/// input default or a static input config is replaced by the secret `NAME`,
/// or by `null` when no such secret exists.
#[derive(Clone, Default, PartialEq)]
pub struct Secrets {
  values: BTreeMap<String, String>,
}

impl Secrets {
  pub fn new() -> Self {
    Self::default()
  }

  /// Secrets taken from the process environment.
  pub fn from_env() -> Self {
    std::env::vars().collect()
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  pub fn extend(&mut self, other: Secrets) {
    self.values.extend(other.values);
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Replace every secret reference in `value`, at any depth.
  pub fn substitute(&self, value: &mut Value) {
    match value {
      Value::String(s) => {
        if let Some(name) = reference_name(s) {
          *value = match self.get(name) {
            Some(secret) => Value::String(secret.to_string()),
            None => Value::Null,
          };
        }
      }
      Value::Array(items) => items.iter_mut().for_each(|item| self.substitute(item)),
      Value::Object(map) => map.values_mut().for_each(|item| self.substitute(item)),
      _ => {}
    }
  }
}

fn reference_name(s: &str) -> Option<&str> {
  s.strip_prefix(ENV_PREFIX)
    .or_else(|| s.strip_prefix(SECRETS_PREFIX))
    .filter(|name| !name.is_empty())
}

impl FromIterator<(String, String)> for Secrets {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().collect(),
    }
  }
}

// Values stay out of logs.
impl std::fmt::Debug for Secrets {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_set().entries(self.values.keys()).finish()
  }
}
