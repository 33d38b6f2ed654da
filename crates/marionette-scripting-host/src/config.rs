use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Milliseconds between ticks when the runner drives the system (default: 50ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Upper bound on queued messages delivered in one tick; the rest wait
    #[serde(default = "default_max_messages_per_tick")]
    pub max_messages_per_tick: usize,

    /// Check `declare_memory_unchanged` against a snapshot in debug builds
    #[serde(default)]
    pub verify_memory_hints: bool,

    /// Default properties per behavior URI, used where a behavior use leaves
    /// a property unset
    #[serde(default)]
    pub behavior_defaults: HashMap<String, toml::Table>,
}

fn default_tick_interval() -> u64 {
    50
}

fn default_max_messages_per_tick() -> usize {
    10_000
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_messages_per_tick: default_max_messages_per_tick(),
            verify_memory_hints: false,
            behavior_defaults: HashMap::new(),
        }
    }
}

impl ScriptingConfig {
    /// Configured default properties for one behavior, as JSON values
    pub fn default_properties(&self, behavior_uri: &str) -> Vec<(String, Value)> {
        let Some(table) = self.behavior_defaults.get(behavior_uri) else {
            return Vec::new();
        };

        table
            .iter()
            .filter_map(|(key, value)| match serde_json::to_value(value) {
                Ok(value) => Some((key.clone(), value)),
                Err(e) => {
                    warn!(
                        target: "scripting",
                        "Ignoring default property {}.{}: {}",
                        behavior_uri,
                        key,
                        e
                    );
                    None
                }
            })
            .collect()
    }
}
