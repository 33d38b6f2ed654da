use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use marionette_runner::{ConfigLoadError, MarionetteConfig, Scene, SceneRunner, init_logging};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scene file
    Run {
        /// Scene to load
        scene: PathBuf,

        /// Stop after this many ticks (runs until Ctrl+C otherwise)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Override the configured tick interval
        #[arg(long)]
        tick_interval_ms: Option<u64>,
    },
    /// Write an example config file to the default location
    InitConfig,
}

const EXAMPLE_CONFIG: &str = r#"# Marionette Configuration

[scripting]
tick_interval_ms = 50
max_messages_per_tick = 10000
# Warn when a behavior declares its memory unchanged but modified it (debug builds)
verify_memory_hints = false

# Default properties per behavior, used where a scene leaves them unset
[scripting.behavior_defaults."builtin:Bouncer"]
gravity = 9.8

[logging]
file_logging = false
filter = "info"
"#;

fn create_example_config() -> Result<()> {
    let config_path =
        MarionetteConfig::config_path().context("Failed to determine config directory")?;

    // Never overwrite an existing config file
    if config_path.exists() {
        bail!(
            "Config file already exists at {}. Please edit it manually or delete it to create a new one.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, EXAMPLE_CONFIG)?;
    eprintln!("Config file created at: {}", config_path.display());

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<MarionetteConfig> {
    let result = match path {
        Some(path) => MarionetteConfig::load_from(path),
        None => MarionetteConfig::load(),
    };

    match result {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) if path.is_none() => Ok(MarionetteConfig::default()),
        Err(err) => Err(err).context("Failed to load config"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig = cli.command {
        return create_example_config();
    }

    let mut config = load_config(cli.config.as_ref())?;
    match cli.debug {
        0 => {}
        1 => config.logging.filter = "debug".to_string(),
        _ => config.logging.filter = "trace".to_string(),
    }
    let _guard = init_logging("marionette", &config.logging)?;

    let Command::Run {
        scene,
        ticks,
        tick_interval_ms,
    } = cli.command
    else {
        return Ok(());
    };

    if let Some(interval) = tick_interval_ms {
        config.scripting.tick_interval_ms = interval;
    }

    info!("Starting marionette...");
    let scene = Scene::load(&scene)?;
    let mut runner = SceneRunner::new(&config.scripting, scene)?;
    let summary = runner.run(ticks, None).await?;

    println!(
        "{} ticks, {:.2}s game time, {} actors, {} resets",
        summary.ticks, summary.game_time, summary.actors, summary.resets
    );
    println!(
        "velocity changes: {}, torque requests: {}, tooltips: {}, clones: {}, destroys: {}",
        summary.stats.velocity_changes,
        summary.stats.torque_requests,
        summary.stats.player_tool_tips,
        summary.stats.clones,
        summary.stats.destroys
    );

    Ok(())
}
