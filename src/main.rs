//! Vigil Sensor Agent CLI
//!
//! Runs the sensor set and prints events as JSON lines, or executes
//! one-shot probes for diagnostics.

use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_sensor_agent::probes::{bluetooth, permissions, system, vm};
use vigil_sensor_agent::{ChannelSink, Config, SensorRegistry, VERSION};

/// Capacity of the event channel between workers and stdout.
const EVENT_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Parser)]
#[command(name = "vigil-sensor")]
#[command(version = VERSION)]
#[command(about = "Endpoint telemetry agent for exam integrity monitoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sensors and print events as JSON lines
    Run {
        /// Comma-separated sensor names (defaults to all)
        #[arg(long)]
        sensors: Option<String>,
    },

    /// Run a one-shot probe and print the result
    Probe {
        /// Which probe: system, vm, bluetooth, permissions
        which: String,
    },

    /// List sensors and whether each would start
    Status,

    /// Show the active configuration
    Config,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Run { sensors } => cmd_run(sensors.as_deref()),
        Commands::Probe { which } => cmd_probe(&which),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

fn cmd_run(sensors: Option<&str>) {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: could not load configuration: {e}");
            Config::default()
        }
    };

    let mut registry = SensorRegistry::from_config(&config);
    let (sink, events) = ChannelSink::bounded(EVENT_CHANNEL_CAPACITY);

    let started = match sensors {
        Some(list) => {
            let mut started = Vec::new();
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if registry.start(name, sink.clone()) {
                    started.push(name.to_string());
                } else {
                    eprintln!("Warning: sensor '{name}' did not start");
                }
            }
            started
        }
        None => registry
            .start_all(&sink)
            .into_iter()
            .map(String::from)
            .collect(),
    };

    if started.is_empty() {
        eprintln!("Error: no sensors started");
        std::process::exit(1);
    }

    let session_id = uuid::Uuid::new_v4();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(%session_id, host, sensors = ?started, "agent session started");

    eprintln!("Vigil Sensor Agent v{VERSION}");
    eprintln!("Session: {session_id}");
    eprintln!("Running sensors: {}", started.join(", "));
    eprintln!("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }

    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => println!("{event}"),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    eprintln!("Stopping sensors...");
    registry.stop_all();

    // Flush whatever the workers delivered before they were joined.
    while let Ok(event) = events.try_recv() {
        println!("{event}");
    }
}

fn cmd_probe(which: &str) {
    let result = match which {
        "system" => serde_json::to_value(system::detect()),
        "vm" => serde_json::to_value(vm::detect()),
        "bluetooth" => serde_json::to_value(bluetooth::status()),
        "permissions" => serde_json::to_value(serde_json::json!({
            "accessibility": permissions::accessibility_granted(),
            "screenRecording": permissions::screen_recording_granted(),
            "inputMonitoring": permissions::input_monitoring_granted(),
        })),
        other => {
            eprintln!("Error: unknown probe '{other}' (expected system, vm, bluetooth, permissions)");
            std::process::exit(2);
        }
    };

    match result {
        Ok(value) => println!("{value}"),
        Err(e) => {
            eprintln!("Error: could not serialize probe result: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();
    let registry = SensorRegistry::from_config(&config);

    println!("Vigil Sensor Agent v{VERSION}");
    println!("Registered sensors:");
    for name in registry.names() {
        println!("  {name}");
    }
    println!("Config path: {}", Config::config_path().display());
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: could not serialize configuration: {e}");
            std::process::exit(1);
        }
    }
}
