//! DualPeak CLI Application

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use dualpeak_core::domain::audio::{AudioEnumerator, DeviceInfo};
use dualpeak_core::domain::config::{ConfigManager, ConfigWatcher, DualPeakConfig};
use dualpeak_core::domain::params::{parse_value, ParamId, ParameterSet};
use dualpeak_core::domain::processor::{Processor, SampleRateCell};
use dualpeak_core::domain::response::{CurvePoint, Grid, ResponseCurveEngine};
use dualpeak_core::domain::settings::ChainSettings;
use dualpeak_infra::audio::{CpalEnumerator, DuplexConfig, DuplexStream};
use dualpeak_infra::display::ResponseTimer;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dualpeak")]
#[command(about = "Dual peak filter equalizer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (defaults to the platform config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input and output devices
    Devices,
    /// Filter the configured input device into the configured output device
    Run,
    /// Print the response curve for a set of parameters
    Curve(CurveArgs),
    /// Export or inspect persisted parameter state
    #[command(subcommand)]
    State(StateCommand),
}

/// Values accept display text such as "2.5 kHz" or "-6 dB"
#[derive(Args)]
struct CurveArgs {
    /// Peak 1 center frequency
    #[arg(long, default_value = "1000", allow_hyphen_values = true)]
    freq: String,

    /// Peak 1 gain in dB
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    gain: String,

    /// Quality of both peaks
    #[arg(long, default_value = "1", allow_hyphen_values = true)]
    q: String,

    /// Spread of peak 2 above peak 1
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    span: String,

    /// Gain moved from peak 1 to peak 2 in dB
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    balance: String,

    #[arg(long, default_value_t = 48000.0)]
    sample_rate: f64,

    /// Number of points across 20 Hz - 20 kHz
    #[arg(long, default_value_t = 32)]
    width: usize,

    /// Emit JSON including the display grid
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum StateCommand {
    /// Write a state file from the config's [parameters] section
    Export { path: PathBuf },
    /// Decode a state file and print its values
    Show { path: PathBuf },
}

#[derive(Serialize)]
struct CurveReport {
    settings: ChainSettings,
    sample_rate: f64,
    points: Vec<CurvePoint>,
    grid: Grid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => ConfigManager::default_config_dir()?,
    };
    let manager = ConfigManager::new(config_dir);

    match cli.command {
        Command::Devices => list_devices(),
        Command::Run => run(manager).await,
        Command::Curve(args) => print_curve(&args),
        Command::State(StateCommand::Export { path }) => export_state(&manager, &path).await,
        Command::State(StateCommand::Show { path }) => show_state(&path).await,
    }
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    let default_input = enumerator.default_input_device().ok().map(|d| d.id);
    let default_output = enumerator.default_output_device().ok().map(|d| d.id);

    let print = |device: &DeviceInfo, is_default: bool| {
        let rate = device
            .default_sample_rate
            .map(|r| format!(", {r} Hz"))
            .unwrap_or_default();
        let marker = if is_default { " [default]" } else { "" };
        println!("  {} ({} ch{}){}", device.name, device.max_channels, rate, marker);
    };

    println!("Input devices:");
    for device in enumerator.input_devices()? {
        print(&device, default_input.as_ref() == Some(&device.id));
    }

    println!("Output devices:");
    for device in enumerator.output_devices()? {
        print(&device, default_output.as_ref() == Some(&device.id));
    }

    Ok(())
}

async fn run(manager: ConfigManager) -> anyhow::Result<()> {
    let config = manager.load().await;

    let params = Arc::new(ParameterSet::new());
    params.apply(&config.parameters);

    let processor = Processor::new(Arc::clone(&params));
    if let Some(path) = &config.app.state_path {
        if let Some(bytes) = read_state_file(path).await {
            processor.set_state(&bytes);
        }
    }

    let sample_rate = processor.sample_rate_cell();
    let stream = DuplexStream::start(&DuplexConfig::from(&config), processor)
        .context("Failed to start audio stream")?;

    let engine = ResponseCurveEngine::new(Arc::clone(&params), sample_rate);
    let timer = ResponseTimer::spawn(engine, config.app.refresh_rate_hz, config.app.display_width);
    let mut frames = timer.subscribe();

    let watcher = ConfigWatcher::new(manager.config_dir().to_path_buf()).await?;
    let mut changes = watcher.subscribe();

    info!("DualPeak running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(path) = changes.recv() => {
                if path.file_name() == manager.config_path().file_name() {
                    reload_parameters(&params, &path).await;
                }
            }
            Ok(()) = frames.changed() => {
                let frame = frames.borrow_and_update();
                let peak_db = frame.magnitudes_db.iter().cloned().fold(f64::MIN, f64::max);
                debug!(sequence = frame.sequence, peak_db, "Response curve updated");
            }
        }
    }

    info!("Shutting down");
    timer.stop();
    let stats = stream.stop();
    if stats.underruns > 0 || stats.overruns > 0 {
        warn!(
            underruns = stats.underruns,
            overruns = stats.overruns,
            "Stream dropped samples"
        );
    }

    if let Some(path) = &config.app.state_path {
        let bytes = params.save_state()?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write state to {}", path.display()))?;
        info!(path = %path.display(), "Parameter state saved");
    }

    Ok(())
}

async fn reload_parameters(params: &ParameterSet, path: &Path) {
    match DualPeakConfig::load_from_file(path).await {
        Ok(config) => {
            params.apply(&config.parameters);
            info!(path = %path.display(), "Parameters reloaded from config");
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable config change"),
    }
}

async fn read_state_file(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No saved state yet");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read saved state");
            None
        }
    }
}

fn set_from_text(params: &ParameterSet, id: ParamId, text: &str) -> anyhow::Result<()> {
    let parameter = params.get(id);
    match parse_value(parameter.kind(), text) {
        Some(value) => {
            parameter.set(value);
            Ok(())
        }
        None => bail!("Invalid value for {}: {:?}", id, text),
    }
}

fn print_curve(args: &CurveArgs) -> anyhow::Result<()> {
    if !args.sample_rate.is_finite() || args.sample_rate <= 0.0 {
        bail!("Sample rate must be positive");
    }

    let params = Arc::new(ParameterSet::new());
    set_from_text(&params, ParamId::Peak1Freq, &args.freq)?;
    set_from_text(&params, ParamId::Peak1Gain, &args.gain)?;
    set_from_text(&params, ParamId::Peak1Quality, &args.q)?;
    set_from_text(&params, ParamId::Span, &args.span)?;
    set_from_text(&params, ParamId::Balance, &args.balance)?;

    let engine = ResponseCurveEngine::new(
        Arc::clone(&params),
        Arc::new(SampleRateCell::new(args.sample_rate)),
    );
    let curve = engine.curve(args.width);

    if args.json {
        let report = CurveReport {
            settings: engine.settings(),
            sample_rate: engine.sample_rate(),
            points: curve.iter().collect(),
            grid: Grid::standard(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for parameter in params.iter() {
        println!("{:>14}: {}", parameter.name(), parameter.display());
    }
    println!();
    println!("{:>12}  {:>9}", "frequency", "dB");
    for point in &curve {
        println!("{:>9.1} Hz  {:>+9.2}", point.frequency, point.magnitude_db);
    }

    Ok(())
}

async fn export_state(manager: &ConfigManager, path: &Path) -> anyhow::Result<()> {
    let config = manager.load().await;
    let params = ParameterSet::new();
    params.apply(&config.parameters);

    let bytes = params.save_state()?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "State exported");
    Ok(())
}

async fn show_state(path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let params = ParameterSet::new();
    params
        .load_state(&bytes)
        .with_context(|| format!("{} is not a valid state file", path.display()))?;

    for parameter in params.iter() {
        println!("{:>14}: {}", parameter.name(), parameter.display());
    }
    Ok(())
}
