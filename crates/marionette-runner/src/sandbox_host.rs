//! In-memory host for running scenes without a game engine.
//!
//! Actors are treated as spheres of [`BODY_RADIUS`] for physics queries,
//! terrain is a sparse voxel map and velocity changes are integrated with a
//! plain Euler step. Rotation is ignored everywhere.

use marionette_events::{HostNotification, TickResponse, Vec3, VelocityChange};
use marionette_scripting_host::host::{
    CellCoord, CheckBoxRequest, LogBehaviorMessageRequest, OverlapSphereRequest, RaycastHit,
    RaycastRequest, SetTerrainCellRequest, TerrainCell, services,
};
use marionette_scripting_host::{BehaviorSystem, HostError, HostServices};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

pub const BODY_RADIUS: f64 = 0.5;

/// Cell shape that clears a voxel
const EMPTY_SHAPE: u8 = 0;

#[derive(Debug, Clone)]
struct Body {
    name: String,
    position: Vec3,
    tags: BTreeSet<String>,
}

/// Running totals of what the behavior system asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub ticks: u64,
    pub velocity_changes: usize,
    pub torque_requests: usize,
    pub player_tool_tips: usize,
    pub clones: usize,
    pub destroys: usize,
}

#[derive(Debug, Default)]
pub struct SandboxHost {
    bodies: Vec<Body>,
    terrain: HashMap<CellCoord, TerrainCell>,
    pending_velocity: Vec<VelocityChange>,
    multiplayer: bool,
    reset_requested: bool,
    stats: FlushStats,
}

impl SandboxHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_multiplayer(mut self, multiplayer: bool) -> Self {
        self.multiplayer = multiplayer;
        self
    }

    /// Refresh the collision snapshot from the live actors
    pub fn sync(&mut self, system: &BehaviorSystem) {
        self.bodies = system
            .actors()
            .map(|actor| Body {
                name: actor.name().to_string(),
                position: actor.position(),
                tags: actor.tags().clone(),
            })
            .collect();
    }

    /// Apply flushed velocity changes, then move physics-enabled actors by `dt`
    pub fn step_physics(&mut self, system: &mut BehaviorSystem, dt: f64) {
        let mut velocities: HashMap<String, Vec3> = HashMap::new();
        for change in self.pending_velocity.drain(..) {
            let total = velocities.entry(change.entity_name).or_insert(Vec3::ZERO);
            *total = *total + change.delta;
        }

        let moves: Vec<(String, Vec3, Vec3)> = system
            .actors()
            .filter(|actor| actor.is_physics_enabled())
            .map(|actor| {
                let velocity = actor.velocity()
                    + velocities.get(actor.name()).copied().unwrap_or_default();
                (actor.name().to_string(), actor.position() + velocity * dt, velocity)
            })
            .collect();

        for (name, position, velocity) in moves {
            system.update_motion(&name, position, velocity);
        }
    }

    /// True once after a behavior asked for a game reset
    pub fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }

    pub fn terrain_cell(&self, coord: CellCoord) -> Option<TerrainCell> {
        self.terrain.get(&coord).copied()
    }

    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    fn overlap_sphere(&self, request: OverlapSphereRequest) -> Vec<String> {
        self.bodies
            .iter()
            .filter(|body| body.position.distance(request.center) <= request.radius + BODY_RADIUS)
            .filter(|body| request.tag.as_ref().is_none_or(|tag| body.tags.contains(tag)))
            .map(|body| body.name.clone())
            .collect()
    }

    /// Hits in snapshot order; the caller sorts if it wants to
    fn raycast(&self, request: RaycastRequest) -> Vec<RaycastHit> {
        let radius_sq = BODY_RADIUS * BODY_RADIUS;
        self.bodies
            .iter()
            .filter_map(|body| {
                let to_center = body.position - request.origin;
                let along = to_center.dot(request.direction);
                let miss_sq = to_center.length_squared() - along * along;
                if miss_sq > radius_sq {
                    return None;
                }
                let entry = (along - (radius_sq - miss_sq).sqrt()).max(0.0);
                (along >= -BODY_RADIUS && entry <= request.max_distance).then(|| RaycastHit {
                    actor: body.name.clone(),
                    distance: entry,
                })
            })
            .collect()
    }

    fn check_box(&self, request: CheckBoxRequest) -> bool {
        let half = request.dimensions * 0.5;
        self.bodies.iter().any(|body| {
            let offset = body.position - request.center;
            let nearest = Vec3::new(
                offset.x.clamp(-half.x, half.x),
                offset.y.clamp(-half.y, half.y),
                offset.z.clamp(-half.z, half.z),
            );
            (offset - nearest).length_squared() <= BODY_RADIUS * BODY_RADIUS
        })
    }

    fn set_terrain_cell(&mut self, request: SetTerrainCellRequest) {
        if request.cell.shape == EMPTY_SHAPE {
            self.terrain.remove(&request.coord);
        } else {
            self.terrain.insert(request.coord, request.cell);
        }
    }
}

impl HostServices for SandboxHost {
    fn invoke(&mut self, service: &str, payload: Value) -> Result<Value, HostError> {
        match service {
            services::OVERLAP_SPHERE => reply(service, self.overlap_sphere(decode(service, payload)?)),
            services::RAYCAST => reply(service, self.raycast(decode(service, payload)?)),
            services::CHECK_BOX => reply(service, self.check_box(decode(service, payload)?)),
            services::SET_TERRAIN_CELL => {
                self.set_terrain_cell(decode(service, payload)?);
                Ok(Value::Null)
            }
            services::GET_TERRAIN_CELL => {
                let coord: CellCoord = decode(service, payload)?;
                reply(service, self.terrain_cell(coord).unwrap_or_default())
            }
            services::IS_MULTIPLAYER => Ok(Value::Bool(self.multiplayer)),
            services::LOG_BEHAVIOR_MESSAGE => {
                let log: LogBehaviorMessageRequest = decode(service, payload)?;
                debug!(
                    target: "behaviors",
                    "[{} {}] {}:{}: {}",
                    log.actor,
                    log.behavior_use_id,
                    log.file,
                    log.line,
                    log.message
                );
                Ok(Value::Null)
            }
            other => Err(HostError::Unavailable {
                service: other.to_string(),
            }),
        }
    }

    fn notify(&mut self, notification: HostNotification) {
        match notification {
            HostNotification::GameResetRequested { requested_by } => {
                info!("Game reset requested by {}", requested_by);
                self.reset_requested = true;
            }
            HostNotification::ActorCloned { source, clone } => {
                debug!("{} cloned as {}", source, clone);
                self.stats.clones += 1;
            }
            HostNotification::ActorDestroyed { name } => {
                debug!("{} destroyed", name);
                self.stats.destroys += 1;
            }
        }
    }

    fn flush(&mut self, response: &TickResponse) {
        self.stats.ticks += 1;
        self.stats.velocity_changes += response.velocity_changes.len();
        self.stats.torque_requests += response.torque_requests.len();
        self.stats.player_tool_tips += response.player_tool_tips.len();

        for tip in &response.player_tool_tips {
            info!("Tooltip for {}: [{}] {}", tip.player_name, tip.key_code, tip.text);
        }
        self.pending_velocity
            .extend(response.velocity_changes.iter().cloned());
    }
}

fn decode<T: DeserializeOwned>(service: &str, payload: Value) -> Result<T, HostError> {
    serde_json::from_value(payload).map_err(|source| HostError::MalformedRequest {
        service: service.to_string(),
        source,
    })
}

fn reply(service: &str, value: impl Serialize) -> Result<Value, HostError> {
    serde_json::to_value(value).map_err(|source| HostError::MalformedReply {
        service: service.to_string(),
        source,
    })
}
