use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Setting update sent by the host, e.g. from the UI.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SettingMessage {
    /// Published setting name.
    pub name: String,
    /// New value, as a JSON number or string.
    pub value: Value,
}

impl SettingMessage {
    /// The value as text, ready to be coerced to the setting's datatype.
    pub fn raw_value(&self) -> String {
        match &self.value {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }
}
