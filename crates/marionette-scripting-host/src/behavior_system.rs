use marionette_events::{BehaviorUseId, DeliveredMessage, HostNotification, TickResponse, Vec3};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::Behavior;
use crate::actor::{Actor, ActorStore};
use crate::config::ScriptingConfig;
use crate::context::{Continuation, Flow, HandlerApi, HandlerResult};
use crate::error::{ScriptError, ScriptResult};
use crate::host::HostServices;
use crate::response::TickBuffer;
use crate::sleep::{SleepKey, SleepManager, SleepState};

/// Filters for `send_message_to_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// Skip the sending actor
    pub exclude_self: bool,
    /// Only deliver to actors carrying this tag
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    Actor(String),
    All(BroadcastOptions),
}

/// A message waiting in the bus queue
#[derive(Debug, Clone)]
pub struct Envelope {
    pub recipient: Recipient,
    pub name: String,
    pub data: Value,
    pub sender: Option<String>,
}

/// A handler waiting for its wake time
struct Suspended {
    message: DeliveredMessage,
    then: Continuation,
}

enum Invocation {
    Handler(Arc<dyn Behavior>),
    Resume(Continuation),
}

/// Message bus between the host and behavior scripts.
///
/// Owns the live actors, routes messages to their behavior uses, and
/// collects every invocation's effects into one response per tick.
pub struct BehaviorSystem {
    actors: ActorStore,
    /// Registered behaviors by URI
    behaviors: HashMap<String, Arc<dyn Behavior>>,
    queue: VecDeque<Envelope>,
    sleepers: SleepManager<Suspended>,
    responses: TickBuffer,
    notifications: Vec<HostNotification>,
    pending_destroy: Vec<String>,
    dirty_memory: BTreeSet<String>,
    game_time: f64,
    config: ScriptingConfig,
}

impl BehaviorSystem {
    pub fn new(config: ScriptingConfig) -> Self {
        Self {
            actors: ActorStore::new(),
            behaviors: HashMap::new(),
            queue: VecDeque::new(),
            sleepers: SleepManager::new(),
            responses: TickBuffer::new(),
            notifications: Vec::new(),
            pending_destroy: Vec::new(),
            dirty_memory: BTreeSet::new(),
            game_time: 0.0,
            config,
        }
    }

    // ===== Behaviors =====

    /// Register a behavior; replaces any behavior with the same URI
    pub fn register_behavior(&mut self, behavior: Arc<dyn Behavior>) {
        debug!(target: "scripting", "Registering behavior: {}", behavior.uri());
        if let Some(old) = self.behaviors.insert(behavior.uri().to_string(), behavior) {
            warn!(target: "scripting", "Behavior {} was already registered, replacing it", old.uri());
        }
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    pub fn behavior_uris(&self) -> Vec<&str> {
        let mut uris: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
        uris.sort();
        uris
    }

    // ===== Actors =====

    /// Add a host-created actor. Behavior properties missing on its uses are
    /// filled from the configured defaults.
    pub fn spawn_actor(&mut self, mut actor: Actor) -> ScriptResult<()> {
        if actor.name().is_empty() {
            return Err(ScriptError::InvalidArgument(
                "actor name must not be empty".to_string(),
            ));
        }
        if self.actors.contains(actor.name()) {
            return Err(ScriptError::InvalidArgument(format!(
                "an actor named '{}' already exists",
                actor.name()
            )));
        }

        let name = actor.name().to_string();
        for behavior_use in &mut actor.behavior_uses {
            if !self.behaviors.contains_key(&behavior_use.behavior_uri) {
                warn!(
                    target: "scripting",
                    "{} uses unregistered behavior {}",
                    name,
                    behavior_use.behavior_uri
                );
            }
            for (key, value) in self.config.default_properties(&behavior_use.behavior_uri) {
                behavior_use.properties.entry(key).or_insert(value);
            }
        }

        debug!(target: "scripting", "Spawned actor {}", name);
        self.actors.insert(actor);
        Ok(())
    }

    /// Remove an actor immediately on the host's behalf; its sleeping
    /// handlers are abandoned
    pub fn remove_actor(&mut self, name: &str) -> Option<Actor> {
        let actor = self.actors.remove(name)?;
        let cancelled = self.sleepers.cancel_actor(name);
        if cancelled > 0 {
            debug!(target: "scripting", "Abandoned {} sleeping handler(s) of {}", cancelled, name);
        }
        self.dirty_memory.remove(name);
        Some(actor)
    }

    pub fn actor(&self, name: &str) -> Option<&Actor> {
        self.actors.get(name)
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.iter()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn does_actor_exist(&self, name: &str) -> bool {
        self.actors.contains(name)
    }

    /// Write back host-simulated motion; false if the actor is gone
    pub fn update_motion(&mut self, name: &str, position: Vec3, velocity: Vec3) -> bool {
        let Some(actor) = self.actors.get_mut(name) else {
            return false;
        };
        actor.position = position;
        actor.velocity = velocity;
        true
    }

    pub fn sleep_state(&self, actor: &str) -> SleepState {
        self.sleepers.state(actor)
    }

    /// Names of actors whose memory may have changed since the last call
    pub fn take_dirty_memory(&mut self) -> Vec<String> {
        std::mem::take(&mut self.dirty_memory).into_iter().collect()
    }

    pub fn game_time(&self) -> f64 {
        self.game_time
    }

    pub fn queued_messages(&self) -> usize {
        self.queue.len()
    }

    // ===== Host ingress =====

    /// Queue a message from the host to one actor
    pub fn post_message(&mut self, target: &str, name: &str, data: Value) -> ScriptResult<()> {
        if target.is_empty() || name.is_empty() {
            return Err(ScriptError::InvalidArgument(
                "target and message name must not be empty".to_string(),
            ));
        }
        if !self.actors.contains(target) {
            return Err(ScriptError::LookupFailure(target.to_string()));
        }
        self.queue.push_back(Envelope {
            recipient: Recipient::Actor(target.to_string()),
            name: name.to_string(),
            data,
            sender: None,
        });
        Ok(())
    }

    /// Queue a message from the host to every actor
    pub fn broadcast(&mut self, name: &str, data: Value, options: BroadcastOptions) -> ScriptResult<()> {
        if name.is_empty() {
            return Err(ScriptError::InvalidArgument(
                "message name must not be empty".to_string(),
            ));
        }
        self.queue.push_back(Envelope {
            recipient: Recipient::All(options),
            name: name.to_string(),
            data,
            sender: None,
        });
        Ok(())
    }

    // ===== Tick =====

    /// Run one simulation tick at absolute `game_time`.
    ///
    /// Wakes due sleepers, delivers the messages queued before this call,
    /// applies deferred destruction, then flushes the merged response to the
    /// host. Messages sent by handlers during this tick are delivered on the
    /// next one.
    pub fn tick(&mut self, game_time: f64, host: &mut dyn HostServices) -> TickResponse {
        if game_time < self.game_time {
            warn!(target: "scripting", "Game time went backwards: {} -> {}", self.game_time, game_time);
        }
        self.game_time = game_time;

        self.resume_sleepers(game_time, host);

        let batch = self.queue.len().min(self.config.max_messages_per_tick);
        if batch < self.queue.len() {
            warn!(
                target: "scripting",
                "{} message(s) deferred to the next tick",
                self.queue.len() - batch
            );
        }
        let envelopes: Vec<Envelope> = self.queue.drain(..batch).collect();
        for envelope in envelopes {
            self.deliver(envelope, game_time, host);
        }

        self.apply_destroys();
        for actor in self.actors.iter_mut() {
            actor.prune_cooldowns(game_time);
        }

        for notification in self.notifications.drain(..) {
            host.notify(notification);
        }

        let response = self.responses.drain();
        host.flush(&response);
        response
    }

    fn resume_sleepers(&mut self, now: f64, host: &mut dyn HostServices) {
        for task in self.sleepers.take_due(now) {
            if !self.actors.contains(&task.key.actor) {
                debug!(
                    target: "scripting",
                    "Actor {} is gone, abandoning sleeping '{}' handler",
                    task.key.actor,
                    task.key.message
                );
                continue;
            }
            self.invoke(
                &task.key.actor,
                &task.key.use_id,
                task.payload.message,
                now,
                Invocation::Resume(task.payload.then),
                host,
            );
        }
    }

    fn deliver(&mut self, envelope: Envelope, now: f64, host: &mut dyn HostServices) {
        let recipients: Vec<String> = match &envelope.recipient {
            Recipient::Actor(name) => {
                if !self.actors.contains(name) {
                    debug!(target: "scripting", "Dropping '{}' for missing actor {}", envelope.name, name);
                    return;
                }
                vec![name.clone()]
            }
            Recipient::All(options) => self
                .actors
                .iter()
                .filter(|actor| {
                    !(options.exclude_self && envelope.sender.as_deref() == Some(actor.name()))
                })
                .filter(|actor| options.tag.as_deref().is_none_or(|tag| actor.has_tag(tag)))
                .map(|actor| actor.name().to_string())
                .collect(),
        };

        for recipient in recipients {
            let Some(actor) = self.actors.get(&recipient) else {
                continue;
            };

            let targets: Vec<(BehaviorUseId, Arc<dyn Behavior>)> = actor
                .behavior_uses()
                .iter()
                .filter_map(|u| {
                    let behavior = self.behaviors.get(&u.behavior_uri)?;
                    let subscribed = behavior
                        .subscribed_messages()
                        .iter()
                        .any(|filter| filter.matches(&envelope.name));
                    subscribed.then(|| (u.id.clone(), Arc::clone(behavior)))
                })
                .filter(|(use_id, _)| {
                    if actor.is_cooling_down(use_id, &envelope.name, now) {
                        debug!(target: "scripting", "{} ({}) cooling down, dropping '{}'", recipient, use_id, envelope.name);
                        return false;
                    }
                    if self.sleepers.is_sleeping(&recipient, use_id, &envelope.name) {
                        debug!(target: "scripting", "{} ({}) asleep in '{}', dropping it", recipient, use_id, envelope.name);
                        return false;
                    }
                    true
                })
                .collect();

            for (use_id, behavior) in targets {
                let mut message = DeliveredMessage::new(envelope.name.clone(), envelope.data.clone(), now);
                message.sender = envelope.sender.clone();
                self.invoke(&recipient, &use_id, message, now, Invocation::Handler(behavior), host);
            }
        }
    }

    /// Run one handler or continuation and merge its effects
    fn invoke(
        &mut self,
        actor_name: &str,
        use_id: &BehaviorUseId,
        message: DeliveredMessage,
        now: f64,
        invocation: Invocation,
        host: &mut dyn HostServices,
    ) {
        // The handling actor is taken out of the store so the API can hold it
        // exclusively while every other actor stays readable.
        let Some(mut actor) = self.actors.remove(actor_name) else {
            return;
        };
        let verify = cfg!(debug_assertions) && self.config.verify_memory_hints;

        let outcome = match HandlerApi::resumed(&mut actor, use_id, message.clone(), now, &self.actors, host) {
            Ok(api) => {
                let mut api = if verify { api.with_memory_verification() } else { api };
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match invocation {
                    Invocation::Handler(behavior) => behavior.on_message(&mut api),
                    Invocation::Resume(then) => then(&mut api),
                }));
                let effects = api.into_effects();
                Some((result, effects))
            }
            Err(e) => {
                error!(target: "scripting", "Could not invoke {} ({}): {}", actor_name, use_id, e);
                None
            }
        };
        self.actors.insert(actor);

        let Some((result, effects)) = outcome else {
            return;
        };

        self.responses.merge(effects.responses);
        self.queue.extend(effects.outbox);
        self.notifications.extend(effects.notifications);
        for spawn in effects.spawns {
            if self.actors.contains(spawn.name()) {
                warn!(target: "scripting", "Clone name {} already taken, dropping clone", spawn.name());
                continue;
            }
            self.dirty_memory.insert(spawn.name().to_string());
            self.actors.insert(spawn);
        }
        if effects.destroy_self && !self.pending_destroy.iter().any(|n| n == actor_name) {
            self.pending_destroy.push(actor_name.to_string());
        }
        if !effects.memory_unchanged {
            self.dirty_memory.insert(actor_name.to_string());
        }

        self.handle_result(actor_name, use_id, message, now, result);
    }

    fn handle_result(
        &mut self,
        actor_name: &str,
        use_id: &BehaviorUseId,
        message: DeliveredMessage,
        now: f64,
        result: std::thread::Result<HandlerResult>,
    ) {
        match result {
            Ok(Ok(Flow::Done)) => {}
            Ok(Ok(Flow::Sleep { seconds, then })) => {
                let key = SleepKey {
                    actor: actor_name.to_string(),
                    use_id: use_id.clone(),
                    message: message.name.clone(),
                };
                let message_name = message.name.clone();
                let id = self
                    .sleepers
                    .schedule(key, now, seconds, Suspended { message, then });
                debug!(target: "scripting", "{} ({}) sleeping {}s in '{}' ({:?})", actor_name, use_id, seconds, message_name, id);
            }
            Ok(Err(e)) => {
                error!(target: "scripting", "{} ({}) failed handling '{}': {}", actor_name, use_id, message.name, e);
            }
            Err(panic) => {
                error!(target: "scripting",
                    "{} ({}) panicked while handling '{}': {}",
                    actor_name,
                    use_id,
                    message.name,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn apply_destroys(&mut self) {
        for name in std::mem::take(&mut self.pending_destroy) {
            if self.remove_actor(&name).is_some() {
                info!(target: "scripting", "Destroyed actor {}", name);
                self.notifications
                    .push(HostNotification::ActorDestroyed { name });
            }
        }
    }
}

/// Text of a caught panic; `panic!` payloads are `&str` or `String`
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl Default for BehaviorSystem {
    fn default() -> Self {
        Self::new(ScriptingConfig::default())
    }
}
