use anyhow::Result;
use marionette_events::TickResponse;
use marionette_scripting_host::{
    BehaviorSystem, BroadcastOptions, ScriptingConfig, create_system_from_config,
};
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::behaviors::{START_MESSAGE, TICK_MESSAGE, builtin_behaviors};
use crate::sandbox_host::{FlushStats, SandboxHost};
use crate::scene::Scene;

/// What a finished run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub game_time: f64,
    pub actors: usize,
    pub resets: u32,
    pub stats: FlushStats,
}

/// Drives a [`BehaviorSystem`] over a scene at a fixed tick rate
pub struct SceneRunner {
    scene: Scene,
    config: ScriptingConfig,
    system: BehaviorSystem,
    host: SandboxHost,
    /// Index of the next scene message to post
    next_message: usize,
    tick_interval: Duration,
    ticks: u64,
    game_time: f64,
    started: bool,
    resets: u32,
}

impl SceneRunner {
    pub fn new(config: &ScriptingConfig, scene: Scene) -> Result<Self> {
        let system = build_system(config, &scene)?;
        Ok(Self {
            scene,
            config: config.clone(),
            system,
            host: SandboxHost::new(),
            next_message: 0,
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            ticks: 0,
            game_time: 0.0,
            started: false,
            resets: 0,
        })
    }

    pub fn system(&self) -> &BehaviorSystem {
        &self.system
    }

    pub fn host(&self) -> &SandboxHost {
        &self.host
    }

    /// Advance the simulation by one tick
    pub fn step(&mut self) -> Result<TickResponse> {
        let dt = self.tick_interval.as_secs_f64();

        if !self.started {
            self.system
                .broadcast(START_MESSAGE, json!(null), BroadcastOptions::default())?;
            self.started = true;
        }

        while let Some(message) = self.scene.messages.get(self.next_message)
            && message.at <= self.game_time
        {
            message.post(&mut self.system)?;
            self.next_message += 1;
        }

        self.system
            .broadcast(TICK_MESSAGE, json!({ "dt": dt }), BroadcastOptions::default())?;

        self.host.sync(&self.system);
        let response = self.system.tick(self.game_time, &mut self.host);
        self.host.step_physics(&mut self.system, dt);

        let dirty = self.system.take_dirty_memory();
        if !dirty.is_empty() {
            debug!("Memory changed for {}", dirty.join(", "));
        }

        self.ticks += 1;
        self.game_time += dt;

        if self.host.take_reset_request() {
            self.reset()?;
        }

        Ok(response)
    }

    /// Rebuild the scene from scratch; the tick counter keeps running
    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting scene after {} ticks", self.ticks);
        self.system = build_system(&self.config, &self.scene)?;
        self.next_message = 0;
        self.game_time = 0.0;
        self.started = false;
        self.resets += 1;
        Ok(())
    }

    /// Tick until `max_ticks` is reached or shutdown is signalled.
    ///
    /// Without a shutdown channel, Ctrl+C stops the loop.
    pub async fn run(
        &mut self,
        max_ticks: Option<u64>,
        mut shutdown_rx: Option<watch::Receiver<bool>>,
    ) -> Result<RunSummary> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Running scene with {} actors every {:?}",
            self.system.actor_count(),
            self.tick_interval
        );

        loop {
            if max_ticks.is_some_and(|max| self.ticks >= max) {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.step()?;
                }
                _ = async {
                    if let Some(ref mut rx) = shutdown_rx {
                        rx.changed().await
                    } else {
                        std::future::pending().await
                    }
                } => {
                    info!("Scene runner received shutdown signal");
                    break;
                }
                _ = tokio::signal::ctrl_c(), if shutdown_rx.is_none() => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    break;
                }
            }
        }

        let summary = self.summary();
        info!(
            "Stopped after {} ticks ({:.2}s game time, {} actors)",
            summary.ticks, summary.game_time, summary.actors
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.ticks,
            game_time: self.game_time,
            actors: self.system.actor_count(),
            resets: self.resets,
            stats: self.host.stats().clone(),
        }
    }
}

fn build_system(config: &ScriptingConfig, scene: &Scene) -> Result<BehaviorSystem> {
    let mut system = create_system_from_config(config, builtin_behaviors());
    scene.populate(&mut system)?;
    Ok(system)
}
