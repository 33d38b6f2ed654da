//! Boundary to the host simulation.
//!
//! Everything physics, terrain or network related is owned by the host and
//! reached through [`HostServices::invoke`], a synchronous name + JSON payload
//! call. The payload and reply shapes for each service are fixed here.

use marionette_events::{HostNotification, Quat, TickResponse, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Service names understood by the host
pub mod services {
    pub const OVERLAP_SPHERE: &str = "OverlapSphere";
    pub const RAYCAST: &str = "Raycast";
    pub const CHECK_BOX: &str = "CheckBox";
    pub const SET_TERRAIN_CELL: &str = "SetTerrainCell";
    pub const GET_TERRAIN_CELL: &str = "GetTerrainCell";
    pub const IS_MULTIPLAYER: &str = "IsMultiplayer";
    pub const LOG_BEHAVIOR_MESSAGE: &str = "LogBehaviorMessage";
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host service '{service}' failed: {message}")]
    ServiceFailed { service: String, message: String },

    #[error("host service '{service}' is not available")]
    Unavailable { service: String },

    #[error("could not encode request for host service '{service}': {source}")]
    MalformedRequest {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed reply from host service '{service}': {source}")]
    MalformedReply {
        service: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Calls from the scripting layer into the host simulation
pub trait HostServices {
    /// Synchronous request/reply call into a host subsystem
    fn invoke(&mut self, service: &str, payload: Value) -> Result<Value, HostError>;

    /// One-way out-of-band event
    fn notify(&mut self, notification: HostNotification);

    /// Receive the merged effects of one tick
    fn flush(&mut self, response: &TickResponse);
}

/// Invoke a service and decode its reply
pub(crate) fn call<T: DeserializeOwned>(
    host: &mut dyn HostServices,
    service: &str,
    payload: impl Serialize,
) -> Result<T, HostError> {
    let payload = encode(service, payload)?;
    let reply = host.invoke(service, payload)?;
    serde_json::from_value(reply).map_err(|source| HostError::MalformedReply {
        service: service.to_string(),
        source,
    })
}

/// Invoke a service whose reply carries no data
pub(crate) fn call_unit(
    host: &mut dyn HostServices,
    service: &str,
    payload: impl Serialize,
) -> Result<(), HostError> {
    let payload = encode(service, payload)?;
    host.invoke(service, payload).map(|_| ())
}

fn encode(service: &str, payload: impl Serialize) -> Result<Value, HostError> {
    serde_json::to_value(payload).map_err(|source| HostError::MalformedRequest {
        service: service.to_string(),
        source,
    })
}

// ===== Payloads =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapSphereRequest {
    pub center: Vec3,
    pub radius: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaycastRequest {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaycastHit {
    pub actor: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBoxRequest {
    pub center: Vec3,
    pub dimensions: Vec3,
    pub rotation: Quat,
}

/// Integer voxel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

/// Shape, orientation and material of one terrain voxel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TerrainCell {
    pub shape: u8,
    pub direction: u8,
    pub style: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTerrainCellRequest {
    #[serde(flatten)]
    pub coord: CellCoord,
    #[serde(flatten)]
    pub cell: TerrainCell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBehaviorMessageRequest {
    pub actor: String,
    pub behavior_uri: String,
    pub behavior_use_id: String,
    pub file: String,
    pub line: u32,
    pub message: String,
}

// ===== Recording host =====

/// In-process host that replays canned replies and records everything it is
/// sent. Useful for exercising handlers without a simulation.
#[derive(Debug, Default)]
pub struct RecordingHost {
    replies: HashMap<String, VecDeque<Result<Value, String>>>,
    defaults: HashMap<String, Value>,
    pub invocations: Vec<(String, Value)>,
    pub notifications: Vec<HostNotification>,
    pub flushed: Vec<TickResponse>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for the next call to `service`
    pub fn reply(&mut self, service: &str, value: Value) -> &mut Self {
        self.replies
            .entry(service.to_string())
            .or_default()
            .push_back(Ok(value));
        self
    }

    /// Queue a one-shot failure for the next call to `service`
    pub fn fail(&mut self, service: &str, message: &str) -> &mut Self {
        self.replies
            .entry(service.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
        self
    }

    /// Reply used whenever no one-shot reply is queued
    pub fn default_reply(&mut self, service: &str, value: Value) -> &mut Self {
        self.defaults.insert(service.to_string(), value);
        self
    }

    /// Payloads sent to one service, in call order
    pub fn calls_to(&self, service: &str) -> Vec<&Value> {
        self.invocations
            .iter()
            .filter(|(name, _)| name == service)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl HostServices for RecordingHost {
    fn invoke(&mut self, service: &str, payload: Value) -> Result<Value, HostError> {
        self.invocations.push((service.to_string(), payload));

        if let Some(reply) = self.replies.get_mut(service).and_then(VecDeque::pop_front) {
            return reply.map_err(|message| HostError::ServiceFailed {
                service: service.to_string(),
                message,
            });
        }

        self.defaults
            .get(service)
            .cloned()
            .ok_or_else(|| HostError::Unavailable {
                service: service.to_string(),
            })
    }

    fn notify(&mut self, notification: HostNotification) {
        self.notifications.push(notification);
    }

    fn flush(&mut self, response: &TickResponse) {
        self.flushed.push(response.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_decodes_reply() {
        let mut host = RecordingHost::new();
        host.reply(services::CHECK_BOX, json!(true));

        let hit: bool = call(
            &mut host,
            services::CHECK_BOX,
            CheckBoxRequest {
                center: Vec3::ZERO,
                dimensions: Vec3::new(1.0, 1.0, 1.0),
                rotation: Quat::IDENTITY,
            },
        )
        .unwrap();
        assert!(hit);
        assert_eq!(host.calls_to(services::CHECK_BOX).len(), 1);
    }

    #[test]
    fn test_malformed_reply() {
        let mut host = RecordingHost::new();
        host.reply(services::IS_MULTIPLAYER, json!("yes"));

        let result: Result<bool, _> = call(&mut host, services::IS_MULTIPLAYER, json!({}));
        assert!(matches!(result, Err(HostError::MalformedReply { .. })));
    }

    #[test]
    fn test_unconfigured_service_is_unavailable() {
        let mut host = RecordingHost::new();
        let result = call_unit(&mut host, services::SET_TERRAIN_CELL, json!({}));
        assert!(matches!(result, Err(HostError::Unavailable { .. })));
    }

    #[test]
    fn test_set_terrain_payload_is_flat() {
        let request = SetTerrainCellRequest {
            coord: CellCoord { x: 1, y: -2, z: 3 },
            cell: TerrainCell {
                shape: 1,
                direction: 2,
                style: 16,
            },
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({"x": 1, "y": -2, "z": 3, "shape": 1, "direction": 2, "style": 16})
        );
    }
}
