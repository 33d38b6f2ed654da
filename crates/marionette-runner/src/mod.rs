mod behaviors;
pub mod config;
mod logging;
pub mod sandbox_host;
pub mod scene;
mod tick_loop;

pub use behaviors::{START_MESSAGE, TICK_MESSAGE, builtin_behaviors};
pub use config::{ConfigLoadError, ConfigSaveError, LoggingConfig, MarionetteConfig};
pub use logging::init_logging;
pub use sandbox_host::{FlushStats, SandboxHost};
pub use scene::Scene;
pub use tick_loop::{RunSummary, SceneRunner};
