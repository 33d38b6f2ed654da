//! TOML scene files: the actors to spawn and the messages to post over time.
//!
//! ```toml
//! [[actors]]
//! name = "Ball"
//! position = { x = 0, y = 5, z = 0 }
//! physics = true
//! memory = { bounces = 0 }
//!
//! [[actors.behaviors]]
//! uri = "builtin:Bouncer"
//! properties = { floor = 0.0 }
//!
//! [[messages]]
//! at = 1.0
//! target = "Ball"
//! name = "Kick"
//! data = { strength = 3 }
//! ```

use anyhow::{Context, Result};
use marionette_events::{Color, Quat, Vec3};
use marionette_scripting_host::{Actor, BehaviorSystem, BroadcastOptions, ModuleBehaviorUse};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub actors: Vec<ActorSpec>,
    #[serde(default)]
    pub messages: Vec<ScheduledMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorSpec {
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
    #[serde(default)]
    pub tint: Color,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub physics: bool,
    #[serde(default = "default_locally_owned")]
    pub locally_owned: bool,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub memory: toml::Table,
    #[serde(default)]
    pub behaviors: Vec<BehaviorUseSpec>,
}

fn default_locally_owned() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorUseSpec {
    /// Defaults to `<actor>/<index>`
    #[serde(default)]
    pub id: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub properties: toml::Table,
}

/// A host message posted once game time reaches `at`
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledMessage {
    pub at: f64,
    /// Single recipient; every actor when omitted
    #[serde(default)]
    pub target: Option<String>,
    /// Restrict a broadcast to actors with this tag
    #[serde(default)]
    pub tag: Option<String>,
    pub name: String,
    #[serde(default)]
    pub data: Option<toml::Value>,
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {}", path.display()))?;
        let mut scene: Scene = toml::from_str(&content)
            .with_context(|| format!("Failed to parse scene {}", path.display()))?;
        scene.messages.sort_by(|a, b| a.at.total_cmp(&b.at));
        info!(
            "Loaded scene {} ({} actors, {} scheduled messages)",
            path.display(),
            scene.actors.len(),
            scene.messages.len()
        );
        Ok(scene)
    }

    /// Spawn every actor in the scene into `system`
    pub fn populate(&self, system: &mut BehaviorSystem) -> Result<()> {
        for spec in &self.actors {
            let actor = spec.build()?;
            system
                .spawn_actor(actor)
                .with_context(|| format!("Failed to spawn actor {}", spec.name))?;
        }
        Ok(())
    }
}

impl ActorSpec {
    pub fn build(&self) -> Result<Actor> {
        let mut actor = Actor::new(self.name.as_str())
            .with_position(self.position)
            .with_rotation(self.rotation)
            .with_tint(self.tint)
            .with_physics(self.physics)
            .with_local_ownership(self.locally_owned);

        for tag in &self.tags {
            actor = actor.with_tag(tag.as_str());
        }
        if let Some(parent) = &self.parent {
            actor = actor.with_transform_parent(parent.as_str());
        }
        for (key, value) in &self.memory {
            actor = actor.with_memory(key.as_str(), to_json(value)?);
        }

        for (index, spec) in self.behaviors.iter().enumerate() {
            let id = spec
                .id
                .clone()
                .unwrap_or_else(|| format!("{}/{}", self.name, index));
            let mut behavior_use = ModuleBehaviorUse::new(id.as_str(), spec.uri.as_str());
            for (key, value) in &spec.properties {
                behavior_use = behavior_use.with_property(key.as_str(), to_json(value)?);
            }
            actor = actor.with_behavior_use(behavior_use);
        }

        debug!("Built actor {} with {} behavior use(s)", self.name, self.behaviors.len());
        Ok(actor)
    }
}

impl ScheduledMessage {
    pub fn post(&self, system: &mut BehaviorSystem) -> Result<()> {
        let data = self.data.as_ref().map(to_json).transpose()?.unwrap_or(Value::Null);
        match &self.target {
            Some(target) => system.post_message(target, &self.name, data)?,
            None => system.broadcast(
                &self.name,
                data,
                BroadcastOptions {
                    exclude_self: false,
                    tag: self.tag.clone(),
                },
            )?,
        }
        Ok(())
    }
}

fn to_json(value: &toml::Value) -> Result<Value> {
    serde_json::to_value(value).context("Value cannot be represented as JSON")
}
