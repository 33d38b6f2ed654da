// Integration tests for the behavior message bus

use marionette_events::{HostNotification, Quat, Vec3};
use marionette_scripting_host::actor::BEHAVIOR_USE_LOCAL_KEY;
use marionette_scripting_host::{
    Actor, BehaviorSystem, BroadcastOptions, FnBehavior, Flow, HandlerApi, MessageFilter,
    ModuleBehaviorUse, MutableActorView, ReadOnlyActorView, RecordingHost, ScriptError,
    ScriptingConfig, SleepState, create_system_from_config,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Increment an integer counter in the handling actor's memory
fn bump(api: &mut HandlerApi<'_>, key: &str) -> Result<(), ScriptError> {
    let count = api.memory(key).and_then(Value::as_i64).unwrap_or(0);
    api.set_memory(key, &(count + 1))
}

fn counter(system: &BehaviorSystem, actor: &str, key: &str) -> i64 {
    system
        .actor(actor)
        .and_then(|a| a.memory_value(key))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn actor_with(name: &str, uri: &str) -> Actor {
    Actor::new(name).with_behavior_use(ModuleBehaviorUse::new(format!("{name}-use").as_str(), uri))
}

#[test]
fn test_velocity_change_flushed_once() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Push",
        vec![MessageFilter::Named("Push")],
        |api| {
            api.add_velocity_change(Vec3::new(1.0, 0.0, 0.0));
            Flow::done()
        },
    )));
    system
        .spawn_actor(actor_with("Ball", "test:Push").with_physics(true))
        .unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Ball", "Push", json!(null)).unwrap();
    let response = system.tick(1.0, &mut host);

    assert_eq!(response.velocity_changes.len(), 1);
    assert_eq!(response.velocity_changes[0].entity_name, "Ball");
    assert_eq!(response.velocity_changes[0].delta, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(host.flushed, vec![response]);

    let next = system.tick(2.0, &mut host);
    assert!(next.is_empty());
    assert_eq!(host.flushed.len(), 2);
}

#[test]
fn test_cooldown_drops_until_expiry() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Bell",
        vec![MessageFilter::Named("Hit")],
        |api| {
            bump(api, "rings")?;
            api.set_cooldown(5.0)?;
            Flow::done()
        },
    )));
    system.spawn_actor(actor_with("Bell", "test:Bell")).unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Bell", "Hit", json!(null)).unwrap();
    system.tick(0.0, &mut host);
    assert_eq!(counter(&system, "Bell", "rings"), 1);

    system.post_message("Bell", "Hit", json!(null)).unwrap();
    system.tick(4.9, &mut host);
    assert_eq!(counter(&system, "Bell", "rings"), 1);

    system.post_message("Bell", "Hit", json!(null)).unwrap();
    system.tick(5.0, &mut host);
    assert_eq!(counter(&system, "Bell", "rings"), 2);
}

fn sleeper_system(woke: Arc<AtomicUsize>) -> BehaviorSystem {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Sleeper",
        vec![MessageFilter::Named("Wait"), MessageFilter::Named("Die")],
        move |api| {
            if api.message_name() == "Die" {
                api.destroy_self();
                return Flow::done();
            }
            bump(api, "waits")?;
            let woke = Arc::clone(&woke);
            api.sleep(2.0, move |api| {
                woke.fetch_add(1, Ordering::SeqCst);
                let now = api.game_time();
                api.set_memory("woke_at", &now)?;
                Flow::done()
            })
        },
    )));
    system
        .spawn_actor(actor_with("Sleeper", "test:Sleeper"))
        .unwrap();
    system
}

#[test]
fn test_sleep_resumes_after_duration() {
    let woke = Arc::new(AtomicUsize::new(0));
    let mut system = sleeper_system(Arc::clone(&woke));
    let mut host = RecordingHost::new();

    system.post_message("Sleeper", "Wait", json!(null)).unwrap();
    system.tick(10.0, &mut host);
    assert_eq!(
        system.sleep_state("Sleeper"),
        SleepState::Sleeping { until: 12.0 }
    );

    system.tick(11.0, &mut host);
    assert_eq!(woke.load(Ordering::SeqCst), 0);

    system.tick(12.0, &mut host);
    assert_eq!(woke.load(Ordering::SeqCst), 1);
    assert_eq!(
        system.actor("Sleeper").unwrap().memory_value("woke_at"),
        Some(&json!(12.0))
    );
    assert_eq!(system.sleep_state("Sleeper"), SleepState::Running);
}

#[test]
fn test_sleep_abandoned_when_actor_destroyed() {
    let woke = Arc::new(AtomicUsize::new(0));
    let mut system = sleeper_system(Arc::clone(&woke));
    let mut host = RecordingHost::new();

    system.post_message("Sleeper", "Wait", json!(null)).unwrap();
    system.tick(10.0, &mut host);

    system.post_message("Sleeper", "Die", json!(null)).unwrap();
    system.tick(11.0, &mut host);
    assert!(!system.does_actor_exist("Sleeper"));
    assert!(host.notifications.contains(&HostNotification::ActorDestroyed {
        name: "Sleeper".to_string()
    }));

    system.tick(12.0, &mut host);
    system.tick(20.0, &mut host);
    assert_eq!(woke.load(Ordering::SeqCst), 0);
}

#[test]
fn test_same_message_dropped_while_sleeping() {
    let woke = Arc::new(AtomicUsize::new(0));
    let mut system = sleeper_system(Arc::clone(&woke));
    let mut host = RecordingHost::new();

    system.post_message("Sleeper", "Wait", json!(null)).unwrap();
    system.tick(10.0, &mut host);
    system.post_message("Sleeper", "Wait", json!(null)).unwrap();
    system.tick(11.0, &mut host);
    assert_eq!(counter(&system, "Sleeper", "waits"), 1);

    system.tick(12.0, &mut host);
    system.post_message("Sleeper", "Wait", json!(null)).unwrap();
    system.tick(13.0, &mut host);
    assert_eq!(counter(&system, "Sleeper", "waits"), 2);
}

#[test]
fn test_messages_sent_during_tick_arrive_next_tick() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Relay",
        vec![MessageFilter::All],
        |api| {
            match api.message_name() {
                "Ping" => api.send_message("B", "Pong", json!({"from": "A"}))?,
                "Pong" => {
                    assert_eq!(api.sender(), Some("A"));
                    bump(api, "pongs")?;
                }
                _ => {}
            }
            Flow::done()
        },
    )));
    system.spawn_actor(actor_with("A", "test:Relay")).unwrap();
    system.spawn_actor(actor_with("B", "test:Relay")).unwrap();
    let mut host = RecordingHost::new();

    system.post_message("A", "Ping", json!(null)).unwrap();
    system.tick(1.0, &mut host);
    assert_eq!(counter(&system, "B", "pongs"), 0);
    assert_eq!(system.queued_messages(), 1);

    system.tick(2.0, &mut host);
    assert_eq!(counter(&system, "B", "pongs"), 1);
}

#[test]
fn test_broadcast_filters_and_empty_world() {
    let mut empty = BehaviorSystem::default();
    let mut host = RecordingHost::new();
    empty
        .broadcast("Anyone", json!(null), BroadcastOptions::default())
        .unwrap();
    assert!(empty.tick(0.0, &mut host).is_empty());

    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Crowd",
        vec![MessageFilter::Named("Shout"), MessageFilter::Named("Hear")],
        |api| {
            if api.message_name() == "Shout" {
                api.send_message_to_all(
                    "Hear",
                    json!(null),
                    BroadcastOptions {
                        exclude_self: true,
                        tag: Some("listener".to_string()),
                    },
                )?;
            } else {
                bump(api, "heard")?;
            }
            Flow::done()
        },
    )));
    system
        .spawn_actor(actor_with("Speaker", "test:Crowd").with_tag("listener"))
        .unwrap();
    system
        .spawn_actor(actor_with("Ear", "test:Crowd").with_tag("listener"))
        .unwrap();
    system.spawn_actor(actor_with("Rock", "test:Crowd")).unwrap();

    system.post_message("Speaker", "Shout", json!(null)).unwrap();
    system.tick(0.0, &mut host);
    system.tick(0.1, &mut host);

    assert_eq!(counter(&system, "Ear", "heard"), 1);
    assert_eq!(counter(&system, "Speaker", "heard"), 0);
    assert_eq!(counter(&system, "Rock", "heard"), 0);
}

#[test]
fn test_reset_game_notifies_host() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Reset",
        vec![MessageFilter::Named("Lose")],
        |api| {
            api.send_message_to_all("ResetGame", json!(null), BroadcastOptions::default())?;
            Flow::done()
        },
    )));
    system.spawn_actor(actor_with("Judge", "test:Reset")).unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Judge", "Lose", json!(null)).unwrap();
    system.tick(0.0, &mut host);

    assert_eq!(
        host.notifications,
        vec![HostNotification::GameResetRequested {
            requested_by: "Judge".to_string()
        }]
    );
}

#[test]
fn test_clone_appears_after_invocation() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Splitter",
        vec![MessageFilter::Named("Split")],
        |api| {
            let name = api.actor().name().to_string();
            api.clone_actor(&name, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY)?;
            Flow::done()
        },
    )));
    system
        .spawn_actor(actor_with("Blob", "test:Splitter").with_memory("size", json!(2)))
        .unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Blob", "Split", json!(null)).unwrap();
    system.tick(0.0, &mut host);

    let clone = system.actor("Blob (1)").unwrap();
    assert_eq!(clone.clone_parent(), Some("Blob"));
    assert_eq!(clone.position(), Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(clone.memory_value("size"), Some(&json!(2)));
    assert!(host.notifications.contains(&HostNotification::ActorCloned {
        source: "Blob".to_string(),
        clone: "Blob (1)".to_string(),
    }));

    system.post_message("Blob", "Split", json!(null)).unwrap();
    system.tick(1.0, &mut host);
    assert!(system.does_actor_exist("Blob (2)"));
}

#[test]
fn test_actor_writes_keep_name_and_neighbours() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Rearrange",
        vec![MessageFilter::Named("Move")],
        |api| {
            let mut actor = api.actor();
            actor.set_position(Vec3::new(4.0, 0.0, 0.0));
            actor.add_tag("moved");
            actor.set_memory_value("hp", json!(1))?;
            assert!(actor.set_memory_value(BEHAVIOR_USE_LOCAL_KEY, json!({})).is_err());
            Flow::done()
        },
    )));
    system
        .spawn_actor(actor_with("Mover", "test:Rearrange"))
        .unwrap();
    system
        .spawn_actor(Actor::new("Victim").with_memory("hp", json!(100)))
        .unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Mover", "Move", json!(null)).unwrap();
    system.tick(0.0, &mut host);

    assert_eq!(system.actor_count(), 2);
    let mover = system.actor("Mover").unwrap();
    assert_eq!(mover.name(), "Mover");
    assert_eq!(mover.position(), Vec3::new(4.0, 0.0, 0.0));
    assert!(mover.has_tag("moved"));
    assert_eq!(mover.memory_value("hp"), Some(&json!(1)));
    assert_eq!(
        system.actor("Victim").unwrap().memory_value("hp"),
        Some(&json!(100))
    );
}

#[test]
fn test_private_memory_invisible_to_other_uses() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Keeper",
        vec![MessageFilter::Named("Store")],
        |api| {
            api.behavior_use_local_memory()
                .insert("secret".to_string(), json!(42));
            Flow::done()
        },
    )));
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Peeker",
        vec![MessageFilter::Named("Peek")],
        |api| {
            let from_view = api
                .get_other_actor("Owner")
                .and_then(|owner| owner.memory_copy(BEHAVIOR_USE_LOCAL_KEY));
            let from_memory = api.get_other_memory("Owner", BEHAVIOR_USE_LOCAL_KEY)?;
            let own_region_empty = api.behavior_use_local_memory().is_empty();
            let keys: Vec<String> = api.actor().memory_keys().map(str::to_string).collect();
            let own = api.memory(BEHAVIOR_USE_LOCAL_KEY).cloned();

            api.set_memory(
                "seen",
                &json!({
                    "view": from_view,
                    "memory": from_memory,
                    "own": own,
                    "ownRegionEmpty": own_region_empty,
                    "keys": keys,
                }),
            )?;
            Flow::done()
        },
    )));
    system
        .spawn_actor(
            Actor::new("Owner")
                .with_behavior_use(ModuleBehaviorUse::new("keeper", "test:Keeper"))
                .with_behavior_use(ModuleBehaviorUse::new("peeker", "test:Peeker")),
        )
        .unwrap();
    system.spawn_actor(actor_with("Snoop", "test:Peeker")).unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Owner", "Store", json!(null)).unwrap();
    system.tick(0.0, &mut host);
    system
        .broadcast("Peek", json!(null), BroadcastOptions::default())
        .unwrap();
    system.tick(1.0, &mut host);

    let hidden = json!({
        "view": null,
        "memory": null,
        "own": null,
        "ownRegionEmpty": true,
        "keys": [],
    });
    let snoop_seen = system.actor("Snoop").unwrap().memory_value("seen");
    assert_eq!(snoop_seen, Some(&hidden));

    let owner_seen = system.actor("Owner").unwrap().memory_value("seen").unwrap();
    assert_eq!(owner_seen, &hidden);
}

#[test]
fn test_destroy_ignored_for_remote_actor() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Fragile",
        vec![MessageFilter::Named("Break")],
        |api| {
            api.destroy_self();
            Flow::done()
        },
    )));
    system
        .spawn_actor(actor_with("Local", "test:Fragile"))
        .unwrap();
    system
        .spawn_actor(actor_with("Remote", "test:Fragile").with_local_ownership(false))
        .unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Local", "Break", json!(null)).unwrap();
    system.post_message("Remote", "Break", json!(null)).unwrap();
    system.tick(0.0, &mut host);

    assert!(!system.does_actor_exist("Local"));
    assert!(system.does_actor_exist("Remote"));
}

#[test]
fn test_failing_handler_does_not_stop_siblings() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Broken",
        vec![MessageFilter::Named("Go")],
        |api| api.distance_between("Nobody", "Nothing").map(|_| Flow::Done),
    )));
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Panicky",
        vec![MessageFilter::Named("Go")],
        |_api| panic!("handler blew up"),
    )));
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Mover",
        vec![MessageFilter::Named("Go")],
        |api| {
            api.add_torque(Vec3::new(0.0, 1.0, 0.0));
            Flow::done()
        },
    )));
    system
        .spawn_actor(
            Actor::new("Robot")
                .with_physics(true)
                .with_behavior_use(ModuleBehaviorUse::new("broken", "test:Broken"))
                .with_behavior_use(ModuleBehaviorUse::new("panicky", "test:Panicky"))
                .with_behavior_use(ModuleBehaviorUse::new("mover", "test:Mover")),
        )
        .unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Robot", "Go", json!(null)).unwrap();
    let response = system.tick(0.0, &mut host);

    assert_eq!(response.torque_requests.len(), 1);
    assert_eq!(response.torque_requests[0].actor_id, "Robot");
    assert!(system.does_actor_exist("Robot"));
}

#[test]
fn test_dirty_memory_tracking() {
    let mut system = BehaviorSystem::default();
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Quiet",
        vec![MessageFilter::Named("Look")],
        |api| {
            api.declare_memory_unchanged();
            Flow::done()
        },
    )));
    system.register_behavior(Arc::new(FnBehavior::new(
        "test:Noisy",
        vec![MessageFilter::Named("Look")],
        |api| {
            bump(api, "looks")?;
            Flow::done()
        },
    )));
    system.spawn_actor(actor_with("Quiet", "test:Quiet")).unwrap();
    system.spawn_actor(actor_with("Noisy", "test:Noisy")).unwrap();
    let mut host = RecordingHost::new();

    system.post_message("Quiet", "Look", json!(null)).unwrap();
    system.post_message("Noisy", "Look", json!(null)).unwrap();
    system.tick(0.0, &mut host);

    assert_eq!(system.take_dirty_memory(), vec!["Noisy".to_string()]);
    assert!(system.take_dirty_memory().is_empty());
}

#[test]
fn test_message_budget_defers_excess() {
    let config = ScriptingConfig {
        max_messages_per_tick: 2,
        ..ScriptingConfig::default()
    };
    let mut system = create_system_from_config(
        &config,
        [Arc::new(FnBehavior::new(
            "test:Counter",
            vec![MessageFilter::Named("Count")],
            |api| {
                bump(api, "count")?;
                Flow::done()
            },
        )) as Arc<dyn marionette_scripting_host::Behavior>],
    );
    system.spawn_actor(actor_with("C", "test:Counter")).unwrap();
    let mut host = RecordingHost::new();

    for _ in 0..3 {
        system.post_message("C", "Count", json!(null)).unwrap();
    }
    system.tick(0.0, &mut host);
    assert_eq!(counter(&system, "C", "count"), 2);
    assert_eq!(system.queued_messages(), 1);

    system.tick(0.1, &mut host);
    assert_eq!(counter(&system, "C", "count"), 3);
}

#[test]
fn test_host_ingress_validation() {
    let mut system = BehaviorSystem::default();
    system.spawn_actor(Actor::new("A")).unwrap();

    assert!(matches!(
        system.post_message("Missing", "Hi", json!(null)),
        Err(ScriptError::LookupFailure(_))
    ));
    assert!(matches!(
        system.post_message("A", "", json!(null)),
        Err(ScriptError::InvalidArgument(_))
    ));
    assert!(matches!(
        system.spawn_actor(Actor::new("A")),
        Err(ScriptError::InvalidArgument(_))
    ));
}

#[test]
fn test_behavior_defaults_fill_missing_properties() {
    let config: ScriptingConfig = toml::from_str(
        r#"
        [behavior_defaults."test:Spinner"]
        speed = 3.0
        axis = "y"
        "#,
    )
    .unwrap();
    let mut system = BehaviorSystem::new(config);
    system
        .spawn_actor(Actor::new("Fan").with_behavior_use(
            ModuleBehaviorUse::new("spin", "test:Spinner").with_property("speed", json!(9.0)),
        ))
        .unwrap();

    let props = &system.actor("Fan").unwrap().behavior_uses()[0].properties;
    assert_eq!(props.get("speed"), Some(&json!(9.0)));
    assert_eq!(props.get("axis"), Some(&json!("y")));
}
