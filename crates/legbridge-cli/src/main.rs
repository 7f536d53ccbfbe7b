//! `legbridge` – bridge entry point.
//!
//! 1. Initialises logging (and OTLP export when configured).
//! 2. Loads `~/.legbridge/config.toml` (or the path given as the first
//!    argument), writing a default file on first run.
//! 3. Validates it; any configuration error exits non-zero before the robot
//!    is contacted.
//! 4. Starts the bridge and the WebSocket mirror, then waits for Ctrl-C and
//!    shuts down gracefully (abort goals, stop feeds, sit, disconnect).

mod config;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use legbridge_hal::{RobotTransport, SimRobot};
use legbridge_middleware::WsBridge;
use legbridge_runtime::{Bridge, BridgeSettings, init_tracing};
use legbridge_types::BridgeError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // Set LEGBRIDGE_LOG_FORMAT=json for newline-delimited JSON logs.
    let _guard = init_tracing("legbridge");

    print_banner();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);

    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => first_run(&path),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match cfg.validate() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            println!("{}: {}", "Invalid configuration".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(settings, cfg.server.ws_port)) {
        Ok(()) => {
            println!("{}", "  ✓ legbridge stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "bridge failed");
            println!("{}: {}", "Bridge error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: BridgeSettings, ws_port: u16) -> Result<(), BridgeError> {
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        on_signal.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // No vendor transport is linked into this build; the simulated robot
    // stands in for the hardware.
    let transport: Arc<dyn RobotTransport> = Arc::new(SimRobot::new());
    println!(
        "  Connecting to {} as {} …",
        settings.connection.hostname.bold(),
        settings.connection.username.bold()
    );
    let bridge = Bridge::start(settings, transport).await?;
    let boot = bridge.boot_report();
    for (step, result) in [("claim", &boot.claim), ("power on", &boot.power_on), ("stand", &boot.stand)] {
        match result {
            Some(r) if r.success => println!("  {} {step}", "✓".green().bold()),
            Some(r) => println!("  {} {step}: {}", "✗".red().bold(), r.message),
            None => {}
        }
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, ws_port));
    let mut mirror =
        tokio::spawn(WsBridge::new(bridge.bus().clone()).run_ws_server(addr, shutdown.clone()));
    println!("  WebSocket mirror on {}", format!("ws://{addr}").bold());
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    // The mirror only ends early when it cannot bind.
    let ended_early = tokio::select! {
        _ = shutdown.cancelled() => None,
        ended = &mut mirror => Some(ended),
    };
    info!("shutdown requested");
    shutdown.cancel();
    bridge.shutdown().await?;

    let ended = match ended_early {
        Some(ended) => ended,
        None => mirror.await,
    };
    ended.map_err(|e| BridgeError::Channel(format!("websocket mirror task failed: {e}")))?
}

fn first_run(path: &Path) -> config::Config {
    let cfg = config::Config::default();
    println!();
    println!("  No configuration found at {}.", path.display().to_string().bold());
    match config::save_to(&cfg, path) {
        Ok(()) => println!(
            "  {} Default config written; edit it to set the robot credentials.\n",
            "✓".green().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"    __            __         _     __         "#.bold().cyan());
    println!("{}", r#"   / /__  ____ _/ /_  _____(_)___/ /___ ____ "#.bold().cyan());
    println!("{}", r#"  / / _ \/ __ `/ __ \/ ___/ / __  / __ `/ _ \"#.bold().cyan());
    println!("{}", r#" / /  __/ /_/ / /_/ / /  / / /_/ / /_/ /  __/"#.bold().cyan());
    println!("{}", r#"/_/\___/\__, /_.___/_/  /_/\__,_/\__, /\___/ "#.bold().cyan());
    println!("{}", r#"       /____/                   /____/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "legbridge".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Legged robot control-plane bridge");
    println!();
}
