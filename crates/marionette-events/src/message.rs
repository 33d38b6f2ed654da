use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of one behavior use attached to an actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorUseId(String);

impl BehaviorUseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BehaviorUseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BehaviorUseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A message as seen by the handler that processes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredMessage {
    pub name: String,
    #[serde(default)]
    pub data: Value,
    /// Absolute game time at delivery, in seconds
    pub game_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl DeliveredMessage {
    pub fn new(name: impl Into<String>, data: Value, game_time: f64) -> Self {
        Self {
            name: name.into(),
            data,
            game_time,
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}
