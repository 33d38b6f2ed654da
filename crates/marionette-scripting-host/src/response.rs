use marionette_events::{PlayerToolTip, TickResponse, TorqueRequest, Vec3, VelocityChange};
use parking_lot::Mutex;

/// Effects produced by one handler invocation
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResponseBuffer {
    velocity_changes: Vec<VelocityChange>,
    torque_requests: Vec<TorqueRequest>,
    player_tool_tips: Vec<PlayerToolTip>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_velocity_change(&mut self, entity_name: &str, delta: Vec3) {
        self.velocity_changes.push(VelocityChange {
            entity_name: entity_name.to_string(),
            delta,
        });
    }

    pub fn push_torque(&mut self, actor_id: &str, torque: Vec3) {
        self.torque_requests.push(TorqueRequest {
            actor_id: actor_id.to_string(),
            torque,
        });
    }

    pub fn push_tool_tip(&mut self, player_name: &str, key_code: &str, text: &str) {
        self.player_tool_tips.push(PlayerToolTip {
            player_name: player_name.to_string(),
            key_code: key_code.to_string(),
            text: text.to_string(),
        });
    }

    pub fn velocity_changes(&self) -> &[VelocityChange] {
        &self.velocity_changes
    }

    pub fn torque_requests(&self) -> &[TorqueRequest] {
        &self.torque_requests
    }

    pub fn player_tool_tips(&self) -> &[PlayerToolTip] {
        &self.player_tool_tips
    }

    pub fn is_empty(&self) -> bool {
        self.velocity_changes.is_empty()
            && self.torque_requests.is_empty()
            && self.player_tool_tips.is_empty()
    }

    /// Append another buffer's entries after this one's, preserving order
    pub fn append(&mut self, other: ResponseBuffer) {
        self.velocity_changes.extend(other.velocity_changes);
        self.torque_requests.extend(other.torque_requests);
        self.player_tool_tips.extend(other.player_tool_tips);
    }

    pub fn into_response(self) -> TickResponse {
        TickResponse {
            velocity_changes: self.velocity_changes,
            torque_requests: self.torque_requests,
            player_tool_tips: self.player_tool_tips,
        }
    }
}

/// Per-tick accumulator that invocation buffers are merged into.
///
/// Merges and the end-of-tick drain go through the same lock.
#[derive(Debug, Default)]
pub struct TickBuffer {
    inner: Mutex<ResponseBuffer>,
}

impl TickBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, buffer: ResponseBuffer) {
        if buffer.is_empty() {
            return;
        }
        self.inner.lock().append(buffer);
    }

    /// Take everything accumulated this tick, leaving the buffer empty
    pub fn drain(&self) -> TickResponse {
        std::mem::take(&mut *self.inner.lock()).into_response()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
