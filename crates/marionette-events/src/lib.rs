/// Core message and response types for marionette
///
/// This crate holds the data that crosses the boundary between the scripting
/// facade and the host simulation, so the host can decode it without depending
/// on the scripting runtime itself.
pub mod math;
pub mod message;
pub mod notification;
pub mod response;

pub use math::{Color, Quat, Vec3};
pub use message::{BehaviorUseId, DeliveredMessage};
pub use notification::HostNotification;
pub use response::{PlayerToolTip, TickResponse, TorqueRequest, VelocityChange};

/// Maximum number of results a host physics query may return.
///
/// The host uses the same cap; a query that comes back with exactly this many
/// results is treated as overflowed.
pub const MAX_PHYSICS_QUERY_RESULTS: usize = 500;

/// Message name that asks the host to reset the game when broadcast.
pub const RESET_GAME_MESSAGE: &str = "ResetGame";
