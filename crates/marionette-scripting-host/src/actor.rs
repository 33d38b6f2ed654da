use marionette_events::{BehaviorUseId, Color, Quat, Vec3};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Memory key under which per-behavior-use scratch state is stored.
/// User code can neither read nor write it through the memory accessors.
pub const BEHAVIOR_USE_LOCAL_KEY: &str = "__behaviorUseLocal";

/// String-keyed JSON object that persists across handler invocations
pub type Memory = Map<String, Value>;

/// One instantiation of a behavior script on an actor
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleBehaviorUse {
    pub id: BehaviorUseId,
    pub behavior_uri: String,
    /// User-declared typed fields
    pub properties: Map<String, Value>,
}

impl ModuleBehaviorUse {
    pub fn new(id: impl Into<BehaviorUseId>, behavior_uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            behavior_uri: behavior_uri.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// A simulated entity. Owned by the host; handlers only ever see it through
/// [`crate::views::HandlingActor`] or [`crate::views::OtherActor`].
#[derive(Debug, Clone)]
pub struct Actor {
    name: String,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) velocity: Vec3,
    pub(crate) tint: Color,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) physics_enabled: bool,
    pub(crate) locally_owned: bool,
    pub(crate) memory: Memory,
    pub(crate) cooldowns: HashMap<(BehaviorUseId, String), f64>,
    pub(crate) clone_parent: Option<String>,
    pub(crate) transform_parent: Option<String>,
    pub(crate) behavior_uses: Vec<ModuleBehaviorUse>,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            tint: Color::WHITE,
            tags: BTreeSet::new(),
            physics_enabled: false,
            locally_owned: true,
            memory: Memory::new(),
            cooldowns: HashMap::new(),
            clone_parent: None,
            transform_parent: None,
            behavior_uses: Vec::new(),
        }
    }

    // ===== Host-side construction =====

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_tint(mut self, tint: Color) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_physics(mut self, enabled: bool) -> Self {
        self.physics_enabled = enabled;
        self
    }

    pub fn with_local_ownership(mut self, owned: bool) -> Self {
        self.locally_owned = owned;
        self
    }

    pub fn with_memory(mut self, key: impl Into<String>, value: Value) -> Self {
        self.memory.insert(key.into(), value);
        self
    }

    pub fn with_transform_parent(mut self, parent: impl Into<String>) -> Self {
        self.transform_parent = Some(parent.into());
        self
    }

    pub fn with_behavior_use(mut self, behavior_use: ModuleBehaviorUse) -> Self {
        self.behavior_uses.push(behavior_use);
        self
    }

    // ===== Accessors =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn tint(&self) -> Color {
        self.tint
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_physics_enabled(&self) -> bool {
        self.physics_enabled
    }

    pub fn is_locally_owned(&self) -> bool {
        self.locally_owned
    }

    pub fn clone_parent(&self) -> Option<&str> {
        self.clone_parent.as_deref()
    }

    pub fn transform_parent(&self) -> Option<&str> {
        self.transform_parent.as_deref()
    }

    pub fn behavior_uses(&self) -> &[ModuleBehaviorUse] {
        &self.behavior_uses
    }

    pub fn behavior_use(&self, id: &BehaviorUseId) -> Option<&ModuleBehaviorUse> {
        self.behavior_uses.iter().find(|u| &u.id == id)
    }

    /// Whole memory object, including the private behavior-use region
    pub(crate) fn raw_memory(&self) -> &Memory {
        &self.memory
    }

    /// User-visible memory value; the private region is never returned
    pub fn memory_value(&self, key: &str) -> Option<&Value> {
        if key == BEHAVIOR_USE_LOCAL_KEY {
            return None;
        }
        self.memory.get(key)
    }

    // ===== Cooldowns =====

    /// True while deliveries of `message` to `use_id` are suppressed
    pub fn is_cooling_down(&self, use_id: &BehaviorUseId, message: &str, now: f64) -> bool {
        self.cooldowns
            .get(&(use_id.clone(), message.to_string()))
            .is_some_and(|until| now < *until)
    }

    pub(crate) fn set_cooldown(&mut self, use_id: BehaviorUseId, message: String, until: f64) {
        self.cooldowns.insert((use_id, message), until);
    }

    /// Drop cooldown entries that have expired
    pub(crate) fn prune_cooldowns(&mut self, now: f64) {
        self.cooldowns.retain(|_, until| now < *until);
    }

    // ===== Private memory =====

    /// Scratch region for one behavior use, created on first access
    pub(crate) fn behavior_use_local_memory(&mut self, use_id: &BehaviorUseId) -> &mut Memory {
        let region = object_slot(
            self.memory
                .entry(BEHAVIOR_USE_LOCAL_KEY.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        );
        object_slot(
            region
                .entry(use_id.as_str().to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        )
    }

    /// Copy of this actor for cloning: new name, fresh cooldowns, parent link
    pub(crate) fn instantiate_clone(&self, name: String, position: Vec3, rotation: Quat) -> Actor {
        let mut clone = self.clone();
        clone.name = name;
        clone.position = position;
        clone.rotation = rotation;
        clone.cooldowns.clear();
        clone.clone_parent = Some(self.name.clone());
        clone.locally_owned = true;
        clone
    }
}

/// Coerce a JSON slot to an object and borrow it
fn object_slot(slot: &mut Value) -> &mut Memory {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

/// Host-owned set of live actors, keyed by unique name
#[derive(Debug, Default)]
pub struct ActorStore {
    actors: BTreeMap<String, Actor>,
}

impl ActorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an actor; returns the previous one if the name was taken
    pub fn insert(&mut self, actor: Actor) -> Option<Actor> {
        self.actors.insert(actor.name.clone(), actor)
    }

    pub fn remove(&mut self, name: &str) -> Option<Actor> {
        self.actors.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Actor> {
        self.actors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Actor> {
        self.actors.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
