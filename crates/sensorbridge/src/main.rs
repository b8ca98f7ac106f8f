//! `sbridge` - CLI for sensorbridge
//!
//! This binary runs the acquisition pipelines and offers a few offline
//! helpers for checking configuration and thermal frames.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use sensorbridge::cli::{Cli, Command, ConfigCommand, DetectCommand};
use sensorbridge::simulate::{SimulatedHygrometer, SimulatedThermalCamera};
use sensorbridge::thermal::{DryRunUploader, HttpUploader, ImageUploader, Renderer};
use sensorbridge::{
    hardware, init_logging, telemetry, ClimatePoller, Config, DryRunSink, FireDetector,
    PipelineKind, PipelineManager, RealtimeDatabase, RecordSink, ThermalFrame, ThermalPipeline,
};

/// Flags that change where pipelines read from and write to.
#[derive(Debug, Clone, Copy)]
struct RunMode {
    dry_run: bool,
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // These must work even when the configuration does not load.
    match &cli.command {
        Command::Config(ConfigCommand::Path) => {
            println!("{}", Config::default_config_path().display());
            return Ok(());
        }
        Command::Config(ConfigCommand::Validate { file }) => {
            let path = file
                .clone()
                .or_else(|| cli.config.clone())
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => {
                    println!("Configuration error: {e}");
                    std::process::exit(1);
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let mut config =
        Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    let mode = RunMode {
        dry_run: cli.dry_run,
        simulate: cli.simulate,
    };

    match cli.command {
        Command::Climate => run_pipelines(&config, &[PipelineKind::Climate], mode).await,
        Command::Telemetry(cmd) => {
            if let Some(connection) = cmd.connection {
                config.telemetry.connection = connection;
            }
            run_pipelines(&config, &[PipelineKind::Telemetry], mode).await
        }
        Command::Thermal => run_pipelines(&config, &[PipelineKind::Thermal], mode).await,
        Command::Run => {
            let kinds: Vec<PipelineKind> = [
                (PipelineKind::Climate, config.climate.enabled),
                (PipelineKind::Telemetry, config.telemetry.enabled),
                (PipelineKind::Thermal, config.thermal.enabled),
            ]
            .into_iter()
            .filter_map(|(kind, enabled)| enabled.then_some(kind))
            .collect();
            if kinds.is_empty() {
                return Err(anyhow!("every pipeline is disabled in the configuration"));
            }
            run_pipelines(&config, &kinds, mode).await
        }
        Command::Detect(cmd) => handle_detect(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

/// Start the given pipelines and wait until they end or Ctrl+C is pressed.
async fn run_pipelines(
    config: &Config,
    kinds: &[PipelineKind],
    mode: RunMode,
) -> anyhow::Result<()> {
    info!(
        platform = hardware::platform_name(),
        dry_run = mode.dry_run,
        simulate = mode.simulate,
        "Starting {} pipeline(s)",
        kinds.len()
    );

    let sink: Arc<dyn RecordSink> = if mode.dry_run {
        Arc::new(DryRunSink)
    } else {
        Arc::new(RealtimeDatabase::new(&config.database)?)
    };

    let mut manager = PipelineManager::new();
    let mut tasks = JoinSet::new();

    for &kind in kinds {
        let handle = manager.register(kind);
        match kind {
            PipelineKind::Climate => {
                let sensor: Box<dyn sensorbridge::Hygrometer> = if mode.simulate {
                    Box::new(SimulatedHygrometer::new())
                } else {
                    hardware::open_hygrometer(&config.climate)
                        .context("failed to initialise the DHT22")?
                };
                let poller =
                    ClimatePoller::from_config(sensor, Arc::clone(&sink), &config.climate)?;
                tasks.spawn(async move { (kind, poller.run(handle).await) });
            }
            PipelineKind::Telemetry => {
                if mode.simulate {
                    warn!(
                        "No simulated autopilot; connecting to {}",
                        config.telemetry.connection
                    );
                }
                let telemetry_config = config.telemetry.clone();
                let sink = Arc::clone(&sink);
                tasks.spawn(async move {
                    (kind, telemetry::run_link(&telemetry_config, sink, handle).await)
                });
            }
            PipelineKind::Thermal => {
                let camera: Box<dyn sensorbridge::ThermalSensor> = if mode.simulate {
                    Box::new(SimulatedThermalCamera::new())
                } else {
                    hardware::open_thermal_camera(&config.thermal)
                        .context("failed to initialise the AMG88xx")?
                };
                let uploader: Arc<dyn ImageUploader> = if mode.dry_run {
                    Arc::new(DryRunUploader)
                } else {
                    Arc::new(HttpUploader::new(
                        &config.thermal.upload_url,
                        config.thermal.upload_timeout(),
                    )?)
                };
                let pipeline = ThermalPipeline::from_config(camera, uploader, &config.thermal);
                tasks.spawn(async move { (kind, pipeline.run(handle).await) });
            }
        }
    }

    let mut first_error: Option<anyhow::Error> = None;
    let mut stopping = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                match signal {
                    Ok(()) => {
                        info!("Stopping...");
                        manager.stop_all();
                    }
                    Err(e) => warn!("Cannot listen for Ctrl+C: {e}"),
                }
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok((kind, Ok(())))) => info!("{kind} pipeline finished"),
                Some(Ok((kind, Err(e)))) => {
                    error!("{kind} pipeline failed: {e}");
                    first_error.get_or_insert_with(|| anyhow!("{kind} pipeline failed: {e}"));
                }
                Some(Err(e)) => {
                    error!("Pipeline task aborted: {e}");
                    first_error.get_or_insert_with(|| anyhow!("pipeline task aborted: {e}"));
                }
            },
        }
    }

    for status in manager.statuses() {
        info!(
            iterations = status.iterations,
            transmitted = status.transmitted,
            failures = status.failures,
            "{} pipeline summary",
            status.kind
        );
    }

    first_error.map_or(Ok(()), Err)
}

fn handle_detect(config: &Config, cmd: &DetectCommand) -> anyhow::Result<()> {
    let frame = ThermalFrame::from_file(&cmd.file)?;
    let detection = FireDetector::new(config.thermal.detection.clone()).detect(&frame);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
    } else {
        println!("Fire:    {}", if detection.fire { "YES" } else { "no" });
        println!("Rule:    {}", detection.stage);
        println!("Max:     {:.2}°C", detection.max);
        println!("Min:     {:.2}°C", detection.min);
        println!("Mean:    {:.2}°C", detection.mean);
        if let Some(bbox) = detection.bbox {
            println!(
                "Region:  rows {}-{}, columns {}-{}",
                bbox.row_min, bbox.row_max, bbox.col_min, bbox.col_max
            );
        }
    }

    if let Some(output) = &cmd.output {
        let jpeg = Renderer::from_config(&config.thermal).render_jpeg(&frame, &detection)?;
        std::fs::write(output, jpeg)
            .with_context(|| format!("failed to write {}", output.display()))?;
        if !cmd.json {
            println!("Image:   {}", output.display());
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Database]");
                println!("  URL:                {}", config.database.url);
                println!(
                    "  Auth token:         {}",
                    if config.database.auth_token.is_some() {
                        "set"
                    } else {
                        "none"
                    }
                );
                println!();
                println!("[Climate]");
                println!("  Enabled:            {}", config.climate.enabled);
                println!("  Device:             {}", config.climate.device.display());
                println!("  Interval (s):       {}", config.climate.interval_secs);
                println!("  Path:               {}", config.climate.path);
                println!();
                println!("[Telemetry]");
                println!("  Enabled:            {}", config.telemetry.enabled);
                println!("  Connection:         {}", config.telemetry.connection);
                println!("  Path:               {}", config.telemetry.path);
                println!(
                    "  Flush interval (s): {}",
                    config.telemetry.flush_interval_secs
                );
                println!();
                println!("[Thermal]");
                println!("  Enabled:            {}", config.thermal.enabled);
                println!("  Upload URL:         {}", config.thermal.upload_url);
                println!("  Interval (ms):      {}", config.thermal.interval_ms);
                println!(
                    "  I2C:                bus {} address {:#04x}",
                    config.thermal.i2c_bus, config.thermal.i2c_address
                );
                println!("  Image size:         {}", config.thermal.image_size);
            }
        }
        // Handled before the configuration is loaded.
        ConfigCommand::Path | ConfigCommand::Validate { .. } => {}
    }
    Ok(())
}
