use marionette_events::{Color, Quat, Vec3};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::actor::{Actor, BEHAVIOR_USE_LOCAL_KEY};
use crate::error::{ScriptError, ScriptResult};

/// Shared borrow of the actor behind a view. Opaque outside this crate, so
/// behavior code can read an actor only through the view methods.
#[derive(Debug, Clone, Copy)]
pub struct ActorRef<'a>(&'a Actor);

impl<'a> ActorRef<'a> {
    fn get(self) -> &'a Actor {
        self.0
    }
}

/// Exclusive borrow of the handling actor, opaque outside this crate.
///
/// Behavior code cannot reach the `Actor` through it, so it cannot swap the
/// actor out or rename it:
///
/// ```compile_fail
/// use marionette_scripting_host::{Actor, HandlingActor, MutableActorView};
///
/// fn hijack(view: &mut HandlingActor<'_>) {
///     *view.actor_mut().0 = Actor::new("Victim");
/// }
/// ```
#[derive(Debug)]
pub struct ActorMut<'a>(&'a mut Actor);

impl<'a> ActorMut<'a> {
    fn get(self) -> &'a mut Actor {
        self.0
    }
}

/// Read capability over an actor
pub trait ReadOnlyActorView {
    #[doc(hidden)]
    fn actor_ref(&self) -> ActorRef<'_>;

    fn name(&self) -> &str {
        self.actor_ref().get().name()
    }

    fn position(&self) -> Vec3 {
        self.actor_ref().get().position()
    }

    fn rotation(&self) -> Quat {
        self.actor_ref().get().rotation()
    }

    fn velocity(&self) -> Vec3 {
        self.actor_ref().get().velocity()
    }

    fn tint(&self) -> Color {
        self.actor_ref().get().tint()
    }

    fn tags(&self) -> &BTreeSet<String> {
        self.actor_ref().get().tags()
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.actor_ref().get().has_tag(tag)
    }

    fn is_physics_enabled(&self) -> bool {
        self.actor_ref().get().is_physics_enabled()
    }

    fn clone_parent(&self) -> Option<&str> {
        self.actor_ref().get().clone_parent()
    }

    fn transform_parent(&self) -> Option<&str> {
        self.actor_ref().get().transform_parent()
    }

    /// Deep copy of a memory value; the caller never aliases actor state
    fn memory_copy(&self, key: &str) -> Option<Value> {
        self.actor_ref().get().memory_value(key).cloned()
    }
}

/// Read/write capability, only ever handed to the actor running a handler
pub trait MutableActorView: ReadOnlyActorView {
    #[doc(hidden)]
    fn actor_mut(&mut self) -> ActorMut<'_>;

    fn set_position(&mut self, position: Vec3) {
        self.actor_mut().get().position = position;
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.actor_mut().get().rotation = rotation;
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.actor_mut().get().velocity = velocity;
    }

    fn set_tint(&mut self, tint: Color) {
        self.actor_mut().get().tint = tint;
    }

    fn set_physics_enabled(&mut self, enabled: bool) {
        self.actor_mut().get().physics_enabled = enabled;
    }

    fn add_tag(&mut self, tag: &str) -> bool {
        self.actor_mut().get().tags.insert(tag.to_string())
    }

    fn remove_tag(&mut self, tag: &str) -> bool {
        self.actor_mut().get().tags.remove(tag)
    }

    /// Live memory value; mutations persist on the actor
    fn memory_mut(&mut self, key: &str) -> Option<&mut Value> {
        if key == BEHAVIOR_USE_LOCAL_KEY {
            return None;
        }
        self.actor_mut().get().memory.get_mut(key)
    }

    fn set_memory_value(&mut self, key: &str, value: Value) -> ScriptResult<Option<Value>> {
        check_memory_key(key)?;
        Ok(self.actor_mut().get().memory.insert(key.to_string(), value))
    }

    fn remove_memory_value(&mut self, key: &str) -> ScriptResult<Option<Value>> {
        check_memory_key(key)?;
        Ok(self.actor_mut().get().memory.remove(key))
    }
}

fn check_memory_key(key: &str) -> ScriptResult<()> {
    if key.is_empty() {
        return Err(ScriptError::InvalidArgument(
            "memory key must not be empty".to_string(),
        ));
    }
    if key == BEHAVIOR_USE_LOCAL_KEY {
        return Err(ScriptError::InvalidArgument(format!(
            "memory key '{key}' is reserved"
        )));
    }
    Ok(())
}

/// Read-only view of any live actor
#[derive(Debug, Clone, Copy)]
pub struct OtherActor<'a> {
    actor: &'a Actor,
}

impl<'a> OtherActor<'a> {
    pub(crate) fn new(actor: &'a Actor) -> Self {
        Self { actor }
    }
}

impl ReadOnlyActorView for OtherActor<'_> {
    fn actor_ref(&self) -> ActorRef<'_> {
        ActorRef(&*self.actor)
    }
}

/// Mutable view of the actor currently handling a message
#[derive(Debug)]
pub struct HandlingActor<'a> {
    actor: &'a mut Actor,
}

impl<'a> HandlingActor<'a> {
    pub(crate) fn new(actor: &'a mut Actor) -> Self {
        Self { actor }
    }

    /// User memory keys, private behavior-use region excluded
    pub fn memory_keys(&self) -> impl Iterator<Item = &str> {
        self.actor
            .memory
            .keys()
            .map(String::as_str)
            .filter(|key| *key != BEHAVIOR_USE_LOCAL_KEY)
    }
}

impl ReadOnlyActorView for HandlingActor<'_> {
    fn actor_ref(&self) -> ActorRef<'_> {
        ActorRef(&*self.actor)
    }
}

impl MutableActorView for HandlingActor<'_> {
    fn actor_mut(&mut self) -> ActorMut<'_> {
        ActorMut(&mut *self.actor)
    }
}
