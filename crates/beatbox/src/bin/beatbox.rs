//! Beatbox command line
//!
//! - `render`: play a pattern offline into a WAV file
//! - `play`: play a pattern on the default output device (`cpal-device` feature)
//! - `config`: print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beatbox::{mixer_pair, parse_pattern, Beatbox, RecordingError};
use beatconf::{BeatConfig, PreloadSample};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beatbox", version, about = "Step-sequencer drum machine")]
struct Cli {
    /// Config file (replaces ./beatbox.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a pattern to a WAV file
    Render {
        /// Active cells as `row:col,col;row:col`; rows are indices or sample names
        #[arg(long)]
        pattern: String,

        /// Passes over the grid
        #[arg(long, default_value_t = 1)]
        measures: u32,

        /// Extra sample as NAME=PATH (repeatable)
        #[arg(long = "sample", value_parser = parse_named_sample)]
        samples: Vec<PreloadSample>,

        #[arg(long)]
        out: PathBuf,
    },

    /// Play a pattern on the default output device
    #[cfg(feature = "cpal-device")]
    Play {
        #[arg(long)]
        pattern: String,

        /// Extra sample as NAME=PATH (repeatable)
        #[arg(long = "sample", value_parser = parse_named_sample)]
        samples: Vec<PreloadSample>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,

        /// Print events to stdout as JSON lines
        #[arg(long)]
        json_events: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also list the files and environment variables that contributed
        #[arg(long)]
        sources: bool,
    },
}

fn parse_named_sample(arg: &str) -> Result<PreloadSample, String> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got {arg:?}"))?;
    if name.is_empty() {
        return Err("sample name is empty".to_string());
    }
    Ok(PreloadSample {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = BeatConfig::load_with_sources_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    match cli.command {
        Command::Render {
            pattern,
            measures,
            samples,
            out,
        } => {
            config.samples.preload.extend(samples);
            let pattern = parse_pattern(&pattern)?;

            // Offline: the mixer half lives inside the renderer, this handle is never read
            let (_mixer, handle) = mixer_pair(config.audio.sample_rate, config.audio.max_voices);
            let beatbox = Beatbox::new(
                config.clone(),
                Arc::new(handle),
                Err(RecordingError::DeviceUnavailable("offline render".to_string())),
            )?;
            beatbox.preload(&config.samples).await?;
            beatbox.apply_pattern(&pattern)?;

            let report = beatbox
                .render_to_file(&out, measures)
                .with_context(|| format!("failed to render {}", out.display()))?;
            info!(
                frames = report.frames,
                beats = report.beats,
                triggered = report.triggered,
                "render complete"
            );
        }

        #[cfg(feature = "cpal-device")]
        Command::Play {
            pattern,
            samples,
            seconds,
            json_events,
        } => {
            config.samples.preload.extend(samples);
            let pattern = parse_pattern(&pattern)?;

            let (_stream, handle) = beatbox::device::open_output(&config.audio)?;
            let beatbox = Beatbox::new(
                config.clone(),
                Arc::new(handle),
                beatbox::device::open_capture(),
            )?;
            beatbox.preload(&config.samples).await?;
            beatbox.apply_pattern(&pattern)?;

            if json_events {
                let mut events = beatbox.subscribe();
                tokio::spawn(async move {
                    while let Ok(event) = events.recv().await {
                        if let Ok(line) = serde_json::to_string(&event) {
                            println!("{line}");
                        }
                    }
                });
            }

            beatbox.transport_play();
            match seconds {
                Some(secs) => tokio::time::sleep(std::time::Duration::from_secs(secs)).await,
                None => tokio::signal::ctrl_c().await?,
            }
            beatbox.transport_pause();
        }

        Command::Config { sources: show_sources } => {
            if show_sources {
                for file in &sources.files {
                    println!("# file: {}", file.display());
                }
                for var in &sources.env_overrides {
                    println!("# env: {var}");
                }
            }
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
