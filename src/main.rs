//! telemetry-cli - Main Entry Point
//!
//! Starts an interactive console on a telemetry link. The hidden
//! `plot-window` subcommand runs a single plot window and is only meant to
//! be launched by the console itself.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use telemetry_cli::{
    backend::{stats::LinkStatistics, DeviceTransport, LineCodec, Link, Runner},
    config::{self, AppConfig, AppState},
    console::Console,
    logging,
    plot::{window, ProcessSpawner},
    state::SessionState,
};

#[derive(Debug, Parser)]
#[command(name = "telemetry-cli", version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connect to this port on startup
    #[arg(long)]
    port: Option<String>,

    /// Baudrate used with `--port`
    #[arg(long)]
    bauds: Option<u32>,

    /// Do not write a session log file
    #[arg(long)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run a single plot window fed on stdin
    #[command(hide = true)]
    PlotWindow(window::WindowArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(config::config_path);
    let mut app_config = AppConfig::load_or_default(config_path.as_deref());
    if cli.no_log_file {
        app_config.logging.enabled = false;
    }

    if let Some(Mode::PlotWindow(args)) = cli.command {
        // Plot windows log to stderr only
        app_config.logging.enabled = false;
        let _log = logging::init(&app_config.logging)?;
        window::run_plot_window(args)?;
        return Ok(());
    }

    let _log = logging::init(&app_config.logging)?;
    tracing::info!("Starting telemetry-cli {}", env!("CARGO_PKG_VERSION"));

    let app_state = AppState::load_or_default();

    let link = Link::new(DeviceTransport::new(), LineCodec::new()).shared();
    let stats = LinkStatistics::new(
        app_config.runner.stats_interval(),
        app_config.runner.average_window,
    );
    let state = SessionState::new(stats).shared();
    let runner = Runner::new(link, state.clone(), &app_config.runner);
    let spawner = ProcessSpawner::new(app_config.plot.clone())?;

    let stdout = std::io::stdout();
    let mut console = Console::new(runner, state, spawner, stdout.lock())
        .with_defaults(app_config.connection.clone())
        .with_app_state(app_state, config::app_state_path());

    console.write_line("telemetry-cli started. Type 'help' for the list of commands.")?;

    if cli.port.is_some() || cli.bauds.is_some() {
        if let Err(e) = console.serial(cli.port, cli.bauds) {
            console.write_line(&format!("Error: {e:#}"))?;
        }
    }

    console.run(std::io::stdin().lock())?;

    tracing::info!("Shutting down...");
    Ok(())
}
