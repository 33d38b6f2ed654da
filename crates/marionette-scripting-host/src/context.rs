use marionette_events::{
    BehaviorUseId, DeliveredMessage, HostNotification, MAX_PHYSICS_QUERY_RESULTS, Quat,
    RESET_GAME_MESSAGE, Vec3,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::panic::Location;
use tracing::{debug, info, warn};

use crate::actor::{Actor, ActorStore, Memory};
use crate::behavior_system::{BroadcastOptions, Envelope, Recipient};
use crate::error::{ScriptError, ScriptResult};
use crate::host::{
    self, CellCoord, CheckBoxRequest, HostServices, LogBehaviorMessageRequest,
    OverlapSphereRequest, RaycastHit, RaycastRequest, SetTerrainCellRequest, TerrainCell, services,
};
use crate::response::ResponseBuffer;
use crate::views::{HandlingActor, MutableActorView, OtherActor};

/// Terrain style used when a handler does not pick one
pub const DEFAULT_CELL_STYLE: i64 = 16;
/// Highest valid terrain shape
pub const MAX_CELL_SHAPE: i64 = 4;
/// Highest valid terrain direction
pub const MAX_CELL_DIRECTION: i64 = 3;
/// Highest valid terrain style
pub const MAX_CELL_STYLE: i64 = 40;

/// What a handler returns: finished, or suspended with a continuation
pub type HandlerResult = ScriptResult<Flow>;

/// Code to run when a sleeping handler wakes up
pub type Continuation = Box<dyn FnOnce(&mut HandlerApi<'_>) -> HandlerResult + Send>;

/// How a handler invocation ended
pub enum Flow {
    Done,
    /// Resume `then` once `seconds` of game time have elapsed
    Sleep { seconds: f64, then: Continuation },
}

impl Flow {
    pub fn done() -> HandlerResult {
        Ok(Flow::Done)
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Done => f.write_str("Done"),
            Flow::Sleep { seconds, .. } => f.debug_struct("Sleep").field("seconds", seconds).finish(),
        }
    }
}

/// Side effects collected during one invocation, applied by the behavior system
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub responses: ResponseBuffer,
    pub outbox: Vec<Envelope>,
    pub notifications: Vec<HostNotification>,
    pub spawns: Vec<Actor>,
    pub destroy_self: bool,
    pub memory_unchanged: bool,
}

/// Everything a behavior handler can do while processing one message
pub struct HandlerApi<'a> {
    actor: &'a mut Actor,
    use_index: usize,
    message: DeliveredMessage,
    /// Current game time; equals the delivery time except after a sleep
    now: f64,
    stage: &'a ActorStore,
    host: &'a mut dyn HostServices,
    effects: Effects,
    memory_snapshot: Option<Memory>,
}

impl<'a> HandlerApi<'a> {
    /// Create a handler API for one delivery
    ///
    /// `stage` holds every other live actor; the handling actor is borrowed
    /// exclusively and must not also be in `stage`.
    pub fn new(
        actor: &'a mut Actor,
        use_id: &BehaviorUseId,
        message: DeliveredMessage,
        stage: &'a ActorStore,
        host: &'a mut dyn HostServices,
    ) -> ScriptResult<Self> {
        let now = message.game_time;
        Self::resumed(actor, use_id, message, now, stage, host)
    }

    /// Create a handler API for a continuation woken at game time `now`
    pub fn resumed(
        actor: &'a mut Actor,
        use_id: &BehaviorUseId,
        message: DeliveredMessage,
        now: f64,
        stage: &'a ActorStore,
        host: &'a mut dyn HostServices,
    ) -> ScriptResult<Self> {
        let use_index = validate(actor, use_id, &message)?;
        if !now.is_finite() {
            return Err(ScriptError::ContractViolation(format!(
                "current game time must be finite, got {now}"
            )));
        }

        Ok(Self {
            actor,
            use_index,
            message,
            now,
            stage,
            host,
            effects: Effects::default(),
            memory_snapshot: None,
        })
    }

    /// Remember the memory as it was, to check `declare_memory_unchanged` later
    pub(crate) fn with_memory_verification(mut self) -> Self {
        self.memory_snapshot = Some(self.actor.memory.clone());
        self
    }

    pub(crate) fn into_effects(self) -> Effects {
        if let Some(snapshot) = &self.memory_snapshot
            && self.effects.memory_unchanged
            && snapshot != &self.actor.memory
        {
            warn!(
                target: "scripting",
                "{} ({}) declared memory unchanged while handling '{}' but memory was modified",
                self.actor.name(),
                self.behavior_uri(),
                self.message.name
            );
        }
        self.effects
    }

    // ===== Message and behavior use =====

    pub fn message(&self) -> &DeliveredMessage {
        &self.message
    }

    pub fn message_name(&self) -> &str {
        &self.message.name
    }

    pub fn message_data(&self) -> &Value {
        &self.message.data
    }

    pub fn sender(&self) -> Option<&str> {
        self.message.sender.as_deref()
    }

    /// Current game time in seconds
    pub fn game_time(&self) -> f64 {
        self.now
    }

    pub fn behavior_use_id(&self) -> &BehaviorUseId {
        &self.actor.behavior_uses[self.use_index].id
    }

    pub fn behavior_uri(&self) -> &str {
        &self.actor.behavior_uses[self.use_index].behavior_uri
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.actor.behavior_uses[self.use_index].properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().get(name)
    }

    // ===== Actors =====

    /// The only mutable view; always the actor handling this message
    pub fn actor(&mut self) -> HandlingActor<'_> {
        HandlingActor::new(&mut *self.actor)
    }

    /// Read-only view of any live actor, `None` if `name` does not resolve
    pub fn get_other_actor(&self, name: &str) -> Option<OtherActor<'_>> {
        self.resolve(name).map(OtherActor::new)
    }

    pub fn does_actor_exist(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Like [`Self::does_actor_exist`] but empty names are rejected up front
    pub fn is_valid_actor(&self, name: &str) -> bool {
        !name.is_empty() && self.does_actor_exist(name)
    }

    /// Names of every live actor, sorted
    pub fn actor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stage
            .names()
            .map(str::to_string)
            .chain(std::iter::once(self.actor.name().to_string()))
            .chain(self.effects.spawns.iter().map(|a| a.name().to_string()))
            .collect();
        names.sort();
        names
    }

    pub fn actors_with_tag(&self, tag: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .stage
            .iter()
            .chain(std::iter::once(&*self.actor))
            .chain(self.effects.spawns.iter())
            .filter(|actor| actor.has_tag(tag))
            .map(|actor| actor.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn distance_between(&self, a: &str, b: &str) -> ScriptResult<f64> {
        let a = self.lookup(a)?;
        let b = self.lookup(b)?;
        Ok(a.position().distance(b.position()))
    }

    // ===== Memory =====

    /// Live value from the handling actor's memory
    pub fn memory(&self, key: &str) -> Option<&Value> {
        self.actor.memory_value(key)
    }

    pub fn set_memory<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> ScriptResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ScriptError::UnsupportedValue(format!("memory key '{key}': {e}")))?;
        self.actor().set_memory_value(key, value)?;
        Ok(())
    }

    pub fn remove_memory(&mut self, key: &str) -> ScriptResult<Option<Value>> {
        self.actor().remove_memory_value(key)
    }

    /// Independent copy of another actor's memory value
    pub fn get_other_memory(&self, name: &str, key: &str) -> ScriptResult<Option<Value>> {
        Ok(self.lookup(name)?.memory_value(key).cloned())
    }

    /// Copy of another actor's memory value decoded as `T`
    pub fn get_other_memory_as<T: DeserializeOwned>(
        &self,
        name: &str,
        key: &str,
    ) -> ScriptResult<Option<T>> {
        self.get_other_memory(name, key)?
            .map(|value| {
                serde_json::from_value(value).map_err(|e| {
                    ScriptError::UnsupportedValue(format!("memory key '{key}' of '{name}': {e}"))
                })
            })
            .transpose()
    }

    /// Scratch memory private to this behavior use
    pub fn behavior_use_local_memory(&mut self) -> &mut Memory {
        let use_id = self.behavior_use_id().clone();
        self.actor.behavior_use_local_memory(&use_id)
    }

    /// Hint that this invocation left memory untouched, so the host can skip
    /// synchronizing it. Not checked unless memory verification is enabled.
    pub fn declare_memory_unchanged(&mut self) {
        self.effects.memory_unchanged = true;
    }

    // ===== Messaging =====

    pub fn send_message(&mut self, target: &str, name: &str, data: Value) -> ScriptResult<()> {
        require_non_empty("target", target)?;
        require_non_empty("message name", name)?;
        if !self.does_actor_exist(target) {
            return Err(ScriptError::LookupFailure(target.to_string()));
        }

        self.effects.outbox.push(Envelope {
            recipient: Recipient::Actor(target.to_string()),
            name: name.to_string(),
            data,
            sender: Some(self.actor.name().to_string()),
        });
        Ok(())
    }

    pub fn send_self_message(&mut self, name: &str, data: Value) -> ScriptResult<()> {
        let target = self.actor.name().to_string();
        self.send_message(&target, name, data)
    }

    pub fn send_message_to_all(
        &mut self,
        name: &str,
        data: Value,
        options: BroadcastOptions,
    ) -> ScriptResult<()> {
        require_non_empty("message name", name)?;

        if name == RESET_GAME_MESSAGE {
            info!(target: "scripting", "{} requested a game reset", self.actor.name());
            self.effects
                .notifications
                .push(HostNotification::GameResetRequested {
                    requested_by: self.actor.name().to_string(),
                });
        }

        self.effects.outbox.push(Envelope {
            recipient: Recipient::All(options),
            name: name.to_string(),
            data,
            sender: Some(self.actor.name().to_string()),
        });
        Ok(())
    }

    // ===== Scheduling =====

    /// Suspend this handler; `then` runs once `seconds` of game time pass.
    /// Return the result from the handler.
    pub fn sleep(
        &self,
        seconds: f64,
        then: impl FnOnce(&mut HandlerApi<'_>) -> HandlerResult + Send + 'static,
    ) -> HandlerResult {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ScriptError::InvalidArgument(format!(
                "sleep duration must be a non-negative number of seconds, got {seconds}"
            )));
        }
        Ok(Flow::Sleep {
            seconds,
            then: Box::new(then),
        })
    }

    /// Drop deliveries of the current message to this behavior use until
    /// `delivery time + delta_seconds`
    pub fn set_cooldown(&mut self, delta_seconds: f64) -> ScriptResult<()> {
        if !delta_seconds.is_finite() {
            return Err(ScriptError::InvalidArgument(format!(
                "cooldown must be finite, got {delta_seconds}"
            )));
        }
        let use_id = self.behavior_use_id().clone();
        let until = self.message.game_time + delta_seconds;
        self.actor
            .set_cooldown(use_id, self.message.name.clone(), until);
        Ok(())
    }

    // ===== Physics and UI effects =====

    pub fn add_velocity_change(&mut self, delta: Vec3) {
        if !self.actor.is_physics_enabled() {
            return;
        }
        self.effects
            .responses
            .push_velocity_change(self.actor.name(), delta);
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        if !self.actor.is_physics_enabled() {
            return;
        }
        self.effects.responses.push_torque(self.actor.name(), torque);
    }

    /// Show a key hint to the player controlling the handling actor
    pub fn add_player_tool_tip(&mut self, key_code: &str, text: &str) {
        self.effects
            .responses
            .push_tool_tip(self.actor.name(), key_code, text);
    }

    // ===== Physics queries =====

    /// Every actor hit along the ray, nearest first when `sort_by_distance`
    pub fn raycast(
        &mut self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f64,
        sort_by_distance: bool,
    ) -> ScriptResult<Vec<String>> {
        let direction = direction.try_normalized().ok_or_else(|| {
            ScriptError::InvalidArgument("raycast direction must be non-zero".to_string())
        })?;
        if !origin.is_finite() || !max_distance.is_finite() || max_distance <= 0.0 {
            return Err(ScriptError::InvalidArgument(format!(
                "raycast needs a finite origin and positive distance, got {max_distance}"
            )));
        }

        let mut hits: Vec<RaycastHit> = host::call(
            &mut *self.host,
            services::RAYCAST,
            RaycastRequest {
                origin,
                direction,
                max_distance,
            },
        )?;
        if sort_by_distance {
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }

        Ok(dedup_names(hits.into_iter().map(|hit| hit.actor)))
    }

    /// Actors with a collider inside the sphere, each listed once
    pub fn overlap_sphere(
        &mut self,
        center: Vec3,
        radius: f64,
        tag: Option<&str>,
    ) -> ScriptResult<Vec<String>> {
        if !center.is_finite() || !radius.is_finite() || radius < 0.0 {
            return Err(ScriptError::InvalidArgument(format!(
                "overlap sphere needs a finite center and non-negative radius, got {radius}"
            )));
        }

        let colliders: Vec<String> = host::call(
            &mut *self.host,
            services::OVERLAP_SPHERE,
            OverlapSphereRequest {
                center,
                radius,
                tag: tag.map(str::to_string),
            },
        )?;
        if colliders.len() >= MAX_PHYSICS_QUERY_RESULTS {
            return Err(ScriptError::TooManyResults {
                count: colliders.len(),
            });
        }

        Ok(dedup_names(colliders))
    }

    /// True if the oriented box touches anything solid, the handling actor included
    pub fn check_box(&mut self, center: Vec3, dimensions: Vec3, rotation: Quat) -> ScriptResult<bool> {
        Ok(host::call(
            &mut *self.host,
            services::CHECK_BOX,
            CheckBoxRequest {
                center,
                dimensions,
                rotation,
            },
        )?)
    }

    pub fn is_multiplayer(&mut self) -> bool {
        host::call(&mut *self.host, services::IS_MULTIPLAYER, Value::Null).unwrap_or_else(|e| {
            debug!(target: "scripting", "IsMultiplayer unavailable, assuming single player: {e}");
            false
        })
    }

    // ===== Terrain =====

    pub fn set_cell(&mut self, x: f64, y: f64, z: f64, shape: i64, direction: i64) -> ScriptResult<()> {
        self.set_cell_with_style(x, y, z, shape, direction, DEFAULT_CELL_STYLE)
    }

    /// Request a terrain voxel change. Coordinates are floored, shape,
    /// direction and style are clamped into range.
    pub fn set_cell_with_style(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        shape: i64,
        direction: i64,
        style: i64,
    ) -> ScriptResult<()> {
        let request = SetTerrainCellRequest {
            coord: cell_coord(x, y, z)?,
            cell: clamp_cell(shape, direction, style),
        };
        host::call_unit(&mut *self.host, services::SET_TERRAIN_CELL, request)?;
        Ok(())
    }

    pub fn get_cell(&mut self, x: f64, y: f64, z: f64) -> ScriptResult<TerrainCell> {
        Ok(host::call(
            &mut *self.host,
            services::GET_TERRAIN_CELL,
            cell_coord(x, y, z)?,
        )?)
    }

    // ===== Lifecycle =====

    /// Instantiate a copy of `source`; returns the new actor's name
    pub fn clone_actor(&mut self, source: &str, position: Vec3, rotation: Quat) -> ScriptResult<String> {
        let template = self.lookup(source)?;

        let mut suffix = 1;
        let name = loop {
            let candidate = format!("{source} ({suffix})");
            if !self.does_actor_exist(&candidate) {
                break candidate;
            }
            suffix += 1;
        };

        let clone = template.instantiate_clone(name.clone(), position, rotation);
        debug!(target: "scripting", "{} cloned {} as {}", self.actor.name(), source, name);
        self.effects.notifications.push(HostNotification::ActorCloned {
            source: source.to_string(),
            clone: name.clone(),
        });
        self.effects.spawns.push(clone);
        Ok(name)
    }

    /// Destroy the handling actor at the end of the tick. Ignored unless this
    /// process owns the actor; returns whether the request was accepted.
    pub fn destroy_self(&mut self) -> bool {
        if !self.actor.is_locally_owned() {
            debug!(target: "scripting", "{} is not locally owned, ignoring destroy_self", self.actor.name());
            return false;
        }
        self.effects.destroy_self = true;
        true
    }

    // ===== Diagnostics =====

    /// Forward a log line, tagged with the calling source location, to the host.
    /// Never fails; a host that cannot take the log is only noted at debug level.
    #[track_caller]
    pub fn log_behavior_message(&mut self, message: &str) {
        let location = Location::caller();
        info!(
            target: "behaviors",
            actor = self.actor.name(),
            behavior = self.behavior_uri(),
            "{}:{}: {}",
            location.file(),
            location.line(),
            message
        );

        let request = LogBehaviorMessageRequest {
            actor: self.actor.name().to_string(),
            behavior_uri: self.behavior_uri().to_string(),
            behavior_use_id: self.behavior_use_id().to_string(),
            file: location.file().to_string(),
            line: location.line(),
            message: message.to_string(),
        };
        if let Err(e) = host::call_unit(&mut *self.host, services::LOG_BEHAVIOR_MESSAGE, request) {
            debug!(target: "scripting", "Host did not accept behavior log: {e}");
        }
    }

    // ===== Internals =====

    fn resolve(&self, name: &str) -> Option<&Actor> {
        if name == self.actor.name() {
            return Some(&*self.actor);
        }
        self.stage
            .get(name)
            .or_else(|| self.effects.spawns.iter().find(|a| a.name() == name))
    }

    fn lookup(&self, name: &str) -> ScriptResult<&Actor> {
        self.resolve(name)
            .ok_or_else(|| ScriptError::LookupFailure(name.to_string()))
    }
}

fn validate(actor: &Actor, use_id: &BehaviorUseId, message: &DeliveredMessage) -> ScriptResult<usize> {
    if actor.name().is_empty() {
        return Err(ScriptError::ContractViolation(
            "handling actor has no name".to_string(),
        ));
    }
    if message.name.is_empty() {
        return Err(ScriptError::ContractViolation(
            "delivered message has no name".to_string(),
        ));
    }
    if !message.game_time.is_finite() {
        return Err(ScriptError::ContractViolation(format!(
            "message game time must be finite, got {}",
            message.game_time
        )));
    }
    actor
        .behavior_uses()
        .iter()
        .position(|u| &u.id == use_id)
        .ok_or_else(|| {
            ScriptError::ContractViolation(format!(
                "behavior use '{use_id}' is not attached to '{}'",
                actor.name()
            ))
        })
}

fn require_non_empty(what: &str, value: &str) -> ScriptResult<()> {
    if value.is_empty() {
        return Err(ScriptError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn dedup_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn cell_coord(x: f64, y: f64, z: f64) -> ScriptResult<CellCoord> {
    match (floor_to_cell(x), floor_to_cell(y), floor_to_cell(z)) {
        (Some(x), Some(y), Some(z)) => Ok(CellCoord { x, y, z }),
        _ => Err(ScriptError::InvalidArgument(format!(
            "cell coordinates must be finite and within i64 range, got ({x}, {y}, {z})"
        ))),
    }
}

/// `None` for NaN, infinities and anything `as i64` would saturate
fn floor_to_cell(value: f64) -> Option<i64> {
    let floored = value.floor();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    (floored >= i64::MIN as f64 && floored < i64::MAX as f64).then_some(floored as i64)
}

fn clamp_cell(shape: i64, direction: i64, style: i64) -> TerrainCell {
    TerrainCell {
        shape: shape.clamp(0, MAX_CELL_SHAPE) as u8,
        direction: direction.clamp(0, MAX_CELL_DIRECTION) as u8,
        style: style.clamp(0, MAX_CELL_STYLE) as u8,
    }
}
