use std::sync::Arc;
use tracing::debug;

use super::Behavior;
use super::behavior_system::BehaviorSystem;
use super::config::ScriptingConfig;

/// Create a behavior system from config with the given behaviors registered
pub fn create_system_from_config(
    config: &ScriptingConfig,
    behaviors: impl IntoIterator<Item = Arc<dyn Behavior>>,
) -> BehaviorSystem {
    debug!(target: "scripting", "Creating behavior system");
    let mut system = BehaviorSystem::new(config.clone());

    for behavior in behaviors {
        system.register_behavior(behavior);
    }
    debug!(target: "scripting", "Registered {} behavior(s)", system.behavior_count());

    system
}
