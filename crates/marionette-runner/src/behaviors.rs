//! Behaviors shipped with the runner so scenes work out of the box.

use marionette_events::Vec3;
use marionette_scripting_host::{
    Behavior, BroadcastOptions, Flow, HandlerApi, HandlerResult, MessageFilter, ReadOnlyActorView,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Message broadcast by the tick loop every tick, with `{"dt": seconds}`
pub const TICK_MESSAGE: &str = "Tick";
/// Message broadcast once before the first tick
pub const START_MESSAGE: &str = "Start";

pub fn builtin_behaviors() -> Vec<Arc<dyn Behavior>> {
    vec![
        Arc::new(Spinner),
        Arc::new(Bouncer),
        Arc::new(Greeter),
        Arc::new(AlarmClock),
        Arc::new(Spawner),
    ]
}

fn number(api: &HandlerApi<'_>, property: &str, default: f64) -> f64 {
    api.property(property)
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

/// Applies a constant torque around Y (`speed`, default 1)
pub struct Spinner;

impl Behavior for Spinner {
    fn uri(&self) -> &str {
        "builtin:Spinner"
    }

    fn subscribed_messages(&self) -> &[MessageFilter] {
        &[MessageFilter::Named(TICK_MESSAGE)]
    }

    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult {
        let speed = number(api, "speed", 1.0);
        api.add_torque(Vec3::new(0.0, speed, 0.0));
        api.declare_memory_unchanged();
        Flow::done()
    }
}

/// Falls under `gravity` and kicks back up from `floor`, counting bounces
pub struct Bouncer;

impl Behavior for Bouncer {
    fn uri(&self) -> &str {
        "builtin:Bouncer"
    }

    fn subscribed_messages(&self) -> &[MessageFilter] {
        &[MessageFilter::Named(TICK_MESSAGE)]
    }

    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult {
        let dt = api.message_data().get("dt").and_then(Value::as_f64).unwrap_or(0.0);
        let floor = number(api, "floor", 0.0);
        let gravity = number(api, "gravity", 9.8);

        let (height, falling) = {
            let actor = api.actor();
            (actor.position().y, actor.velocity().y < 0.0)
        };

        if height <= floor && falling {
            let bounces = api.memory("bounces").and_then(Value::as_i64).unwrap_or(0);
            api.set_memory("bounces", &(bounces + 1))?;
            let speed = -api.actor().velocity().y;
            api.add_velocity_change(Vec3::new(0.0, 2.0 * speed, 0.0));
            api.set_cooldown(0.1)?;
        } else {
            api.add_velocity_change(Vec3::new(0.0, -gravity * dt, 0.0));
            api.declare_memory_unchanged();
        }
        Flow::done()
    }
}

/// Says hello to everyone tagged `greeting_tag` on start, replies to hellos
pub struct Greeter;

impl Behavior for Greeter {
    fn uri(&self) -> &str {
        "builtin:Greeter"
    }

    fn subscribed_messages(&self) -> &[MessageFilter] {
        &[
            MessageFilter::Named(START_MESSAGE),
            MessageFilter::Named("Hello"),
        ]
    }

    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult {
        match api.message_name() {
            START_MESSAGE => {
                let tag = api
                    .property("greeting_tag")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let name = api.actor().name().to_string();
                api.send_message_to_all(
                    "Hello",
                    json!({"from": name}),
                    BroadcastOptions {
                        exclude_self: true,
                        tag,
                    },
                )?;
            }
            _ => {
                let from = api.sender().unwrap_or("the host").to_string();
                api.log_behavior_message(&format!("{from} said hello"));
                api.add_player_tool_tip("E", &format!("Wave at {from}"));
                let greeted = api.memory("greeted").and_then(Value::as_i64).unwrap_or(0);
                api.set_memory("greeted", &(greeted + 1))?;
            }
        }
        Flow::done()
    }
}

/// Sleeps `seconds` after start, then sends itself `Alarm` and optionally
/// resets the game (`reset`)
pub struct AlarmClock;

impl Behavior for AlarmClock {
    fn uri(&self) -> &str {
        "builtin:AlarmClock"
    }

    fn subscribed_messages(&self) -> &[MessageFilter] {
        &[MessageFilter::Named(START_MESSAGE)]
    }

    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult {
        let seconds = number(api, "seconds", 1.0);
        let reset = api.property("reset").and_then(Value::as_bool).unwrap_or(false);

        api.sleep(seconds, move |api| {
            let now = api.game_time();
            api.set_memory("rang_at", &now)?;
            api.send_self_message("Alarm", json!({"at": now}))?;
            if reset {
                api.send_message_to_all(
                    marionette_events::RESET_GAME_MESSAGE,
                    Value::Null,
                    BroadcastOptions::default(),
                )?;
            }
            Flow::done()
        })
    }
}

/// Clones itself on `Spawn` up to `max_clones` times and destroys clones on
/// `Despawn`
pub struct Spawner;

impl Behavior for Spawner {
    fn uri(&self) -> &str {
        "builtin:Spawner"
    }

    fn subscribed_messages(&self) -> &[MessageFilter] {
        &[MessageFilter::Named("Spawn"), MessageFilter::Named("Despawn")]
    }

    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult {
        let is_clone = api.actor().clone_parent().is_some();

        match (api.message_name(), is_clone) {
            ("Spawn", false) => {
                let max = number(api, "max_clones", 3.0) as i64;
                let spawned = api.memory("spawned").and_then(Value::as_i64).unwrap_or(0);
                if spawned >= max {
                    api.declare_memory_unchanged();
                    return Flow::done();
                }

                let (name, position, rotation) = {
                    let actor = api.actor();
                    (actor.name().to_string(), actor.position(), actor.rotation())
                };
                let offset = Vec3::new(spawned as f64 + 1.0, 0.0, 0.0);
                let clone = api.clone_actor(&name, position + offset, rotation)?;
                api.set_memory("spawned", &(spawned + 1))?;
                api.send_message(&clone, "Spawned", json!({"index": spawned}))?;
            }
            ("Despawn", true) => {
                api.destroy_self();
            }
            _ => api.declare_memory_unchanged(),
        }
        Flow::done()
    }
}
