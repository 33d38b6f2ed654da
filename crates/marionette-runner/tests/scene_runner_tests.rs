// Integration tests for running scenes end to end

use marionette_events::Vec3;
use marionette_runner::{Scene, SceneRunner};
use marionette_scripting_host::ScriptingConfig;
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;

fn config() -> ScriptingConfig {
    ScriptingConfig {
        tick_interval_ms: 100,
        ..ScriptingConfig::default()
    }
}

fn load(toml: &str) -> Scene {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scene.toml");
    fs::write(&path, toml).unwrap();
    Scene::load(&path).unwrap()
}

#[test]
fn test_alarm_clock_rings_after_sleeping() {
    let scene = load(
        r#"
[[actors]]
name = "Clock"

[[actors.behaviors]]
uri = "builtin:AlarmClock"
properties = { seconds = 0.3 }
"#,
    );
    let mut runner = SceneRunner::new(&config(), scene).unwrap();

    // Start is delivered at t=0.0, the clock wakes at t >= 0.3
    for _ in 0..3 {
        runner.step().unwrap();
    }
    let clock = runner.system().actor("Clock").unwrap();
    assert_eq!(clock.memory_value("rang_at"), None);

    runner.step().unwrap();
    let rang_at = runner
        .system()
        .actor("Clock")
        .unwrap()
        .memory_value("rang_at")
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!(rang_at >= 0.3);
}

#[test]
fn test_spinner_requests_torque_every_tick() {
    let scene = load(
        r#"
[[actors]]
name = "Fan"
physics = true

[[actors.behaviors]]
uri = "builtin:Spinner"
properties = { speed = 2.0 }
"#,
    );
    let mut runner = SceneRunner::new(&config(), scene).unwrap();

    let response = runner.step().unwrap();
    assert_eq!(response.torque_requests.len(), 1);
    assert_eq!(response.torque_requests[0].actor_id, "Fan");
    assert_eq!(response.torque_requests[0].torque, Vec3::new(0.0, 2.0, 0.0));

    runner.step().unwrap();
    assert_eq!(runner.summary().stats.torque_requests, 2);
}

#[test]
fn test_bouncer_falls_and_bounces() {
    let scene = load(
        r#"
[[actors]]
name = "Ball"
position = { x = 0, y = 0.05, z = 0 }
physics = true

[[actors.behaviors]]
uri = "builtin:Bouncer"
properties = { gravity = 10.0 }
"#,
    );
    let mut runner = SceneRunner::new(&config(), scene).unwrap();

    runner.step().unwrap();
    let ball = runner.system().actor("Ball").unwrap();
    assert!(ball.velocity().y < 0.0);

    // Below the floor and falling: kicked back up
    runner.step().unwrap();
    let ball = runner.system().actor("Ball").unwrap();
    assert_eq!(ball.memory_value("bounces"), Some(&json!(1)));
    assert!(ball.velocity().y > 0.0);
}

#[test]
fn test_scheduled_messages_clone_and_despawn() {
    let scene = load(
        r#"
[[actors]]
name = "Hive"

[[actors.behaviors]]
uri = "builtin:Spawner"
properties = { max_clones = 2 }

[[messages]]
at = 0.0
target = "Hive"
name = "Spawn"

[[messages]]
at = 0.1
target = "Hive"
name = "Spawn"

[[messages]]
at = 0.2
target = "Hive"
name = "Spawn"

[[messages]]
at = 0.3
name = "Despawn"
"#,
    );
    let mut runner = SceneRunner::new(&config(), scene).unwrap();

    for _ in 0..3 {
        runner.step().unwrap();
    }
    assert_eq!(runner.system().actor_count(), 3);
    assert!(runner.system().does_actor_exist("Hive (1)"));
    assert!(runner.system().does_actor_exist("Hive (2)"));

    runner.step().unwrap();
    assert_eq!(runner.system().actor_count(), 1);
    let summary = runner.summary();
    assert_eq!(summary.stats.clones, 2);
    assert_eq!(summary.stats.destroys, 2);
}

#[test]
fn test_reset_rebuilds_scene() {
    let scene = load(
        r#"
[[actors]]
name = "Judge"

[[actors.behaviors]]
uri = "builtin:AlarmClock"
properties = { seconds = 0.1, reset = true }
"#,
    );
    let mut runner = SceneRunner::new(&config(), scene).unwrap();

    // t=0.0 sleeps, t=0.1 rings and asks for a reset
    runner.step().unwrap();
    runner.step().unwrap();

    let summary = runner.summary();
    assert_eq!(summary.resets, 1);
    assert_eq!(summary.game_time, 0.0);
    let judge = runner.system().actor("Judge").unwrap();
    assert_eq!(judge.memory_value("rang_at"), None);
}

#[tokio::test]
async fn test_run_stops_after_tick_limit() {
    let scene = load(
        r#"
[[actors]]
name = "Fan"
physics = true

[[actors.behaviors]]
uri = "builtin:Spinner"
"#,
    );
    let config = ScriptingConfig {
        tick_interval_ms: 1,
        ..ScriptingConfig::default()
    };
    let mut runner = SceneRunner::new(&config, scene).unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = runner.run(Some(5), Some(shutdown_rx)).await.unwrap();
    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.stats.torque_requests, 5);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() {
    let mut runner = SceneRunner::new(&config(), Scene::default()).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown_tx.send(true).unwrap();
    });

    let summary = runner.run(None, Some(shutdown_rx)).await.unwrap();
    stopper.await.unwrap();
    assert!(summary.ticks >= 1);
    assert_eq!(summary.actors, 0);
}
