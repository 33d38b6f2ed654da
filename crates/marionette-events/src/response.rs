use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Velocity delta for one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityChange {
    pub entity_name: String,
    pub delta: Vec3,
}

/// Torque to apply to one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorqueRequest {
    pub actor_id: String,
    pub torque: Vec3,
}

/// Key hint shown to a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerToolTip {
    pub player_name: String,
    pub key_code: String,
    pub text: String,
}

/// Everything handlers asked the host to do during one tick.
///
/// The host decodes this by field name, so the serialized shape is fixed:
/// `velocityChanges`, `torqueRequests`, `playerToolTips`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResponse {
    pub velocity_changes: Vec<VelocityChange>,
    pub torque_requests: Vec<TorqueRequest>,
    pub player_tool_tips: Vec<PlayerToolTip>,
}

impl TickResponse {
    pub fn is_empty(&self) -> bool {
        self.velocity_changes.is_empty()
            && self.torque_requests.is_empty()
            && self.player_tool_tips.is_empty()
    }
}
