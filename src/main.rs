//! Binary entrypoint for the pvdongle CLI.
//!
//! Commands:
//! - `init` - create a starter `pvdongle.toml`
//! - `ports` - list serial ports and flag known dongles
//! - `commands` - print the command catalogue
//! - `send <name>...` - connect and send catalogue commands in order
//! - `scene <index>` - activate a scene
//! - `pair` - join a shade in programming mode to the dongle's network
//! - `scan [--from <n>] [--to <n>] [--dwell <s>]` - step through scenes `from..=to` to find a shade's presets
//! - `monitor [--seconds <s>]` - connect and print link events as JSON lines
//!
//! See the library crate docs for module-level details: `pvdongle::`.
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use pvdongle::config::Config;
use pvdongle::dongle::{catalogue, discovery, ConnectionState, Dongle, SerialTransport};
use pvdongle::logutil::{byte_repr, hex_snippet};

/// How long to wait for the first successful handshake before giving up.
const READY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "pvdongle")]
#[command(about = "Drive PowerView shades through a USB RF dongle")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "pvdongle.toml", global = true)]
    config: String,

    /// Serial device, overrides the config file (e.g., /dev/ttyACM0)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// List serial ports, marking recognised dongles
    Ports,
    /// Print every catalogue command with its wire bytes
    Commands,
    /// Send one or more catalogue commands by name
    Send {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Activate a scene by index
    Scene { index: u8 },
    /// Pair a shade whose program button has been pressed
    Pair,
    /// Open the shade, then activate each scene in turn
    Scan {
        #[arg(long, default_value_t = 0)]
        from: u8,
        /// Last scene index (inclusive)
        #[arg(long, default_value_t = 31)]
        to: u8,
        /// Seconds to wait after each scene
        #[arg(long, default_value_t = 3)]
        dwell: u64,
    },
    /// Print link events as JSON lines
    Monitor {
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // init must work before any config file exists
    let config = if matches!(cli.command, Commands::Init) {
        Config::console_only()
    } else {
        resolve_config(&cli.config, cli.port.as_deref(), cli.baud).await?
    };
    init_logging(&Some(config.clone()), cli.verbose);
    run(cli.command, config, &cli.config).await
}

async fn run(command: Commands, config: Config, config_path: &str) -> Result<()> {
    match command {
        Commands::Init => {
            info!("Initializing new pvdongle configuration");
            Config::create_default(config_path).await?;
            println!("Created default configuration at {}", config_path);
            println!("Set [dongle].port to your device, then try: pvdongle ports");
        }
        Commands::Ports => {
            let ports = discovery::list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                match (port.vid, port.pid, port.dongle) {
                    (Some(vid), Some(pid), Some(name)) => {
                        println!("{}  {:04x}:{:04x}  {}", port.device, vid, pid, name)
                    }
                    (Some(vid), Some(pid), None) => {
                        println!("{}  {:04x}:{:04x}", port.device, vid, pid)
                    }
                    _ => println!("{}", port.device),
                }
            }
        }
        Commands::Commands => {
            for command in catalogue::all() {
                println!(
                    "{:<28} {:<20} {}",
                    command.name(),
                    hex_snippet(command.bytes(), 16),
                    byte_repr(command.bytes())
                );
            }
        }
        Commands::Send { names } => {
            // Reject typos before touching the port
            for name in &names {
                catalogue::lookup(name)?;
            }
            let dongle = start_dongle(&config).await?;
            let mut failed = 0usize;
            for name in &names {
                match dongle.write(name).await {
                    Ok(()) => println!("{}: ok", name),
                    Err(e) => {
                        failed += 1;
                        error!("{}", e);
                        println!("{}: failed ({})", name, e);
                    }
                }
            }
            finish(&dongle).await;
            if failed > 0 {
                bail!("{} of {} command(s) failed", failed, names.len());
            }
        }
        Commands::Scene { index } => {
            let dongle = start_dongle(&config).await?;
            let outcome = dongle.activate_scene(index).await;
            finish(&dongle).await;
            outcome?;
            println!("Scene {} activated", index);
        }
        Commands::Pair => {
            let dongle = start_dongle(&config).await?;
            let outcome = dongle.connect_new_shade().await;
            finish(&dongle).await;
            outcome?;
            println!("Shade paired");
        }
        Commands::Scan { from, to, dwell } => {
            let scenes = scan_range(from, to)?;
            let dwell = Duration::from_secs(dwell);
            let dongle = start_dongle(&config).await?;
            if let Err(e) = dongle.open().await {
                warn!("Could not open shade before scan: {}", e);
            }
            tokio::time::sleep(dwell).await;
            for index in scenes {
                println!("Activating scene {}", index);
                if let Err(e) = dongle.activate_scene(index).await {
                    warn!("Scene {} failed: {}", index, e);
                }
                tokio::time::sleep(dwell).await;
            }
            finish(&dongle).await;
        }
        Commands::Monitor { seconds } => {
            let dongle = spawn_dongle(&config);
            let mut events = dongle.subscribe();
            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => println!("{}", serde_json::to_string(&event)?),
                        None => break,
                    },
                    _ = &mut deadline => break,
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted");
                        break;
                    }
                }
            }
            finish(&dongle).await;
        }
    }

    Ok(())
}

/// Scene indices visited by `scan`, both ends included.
fn scan_range(from: u8, to: u8) -> Result<RangeInclusive<u8>> {
    if from > to {
        bail!("--from ({}) must not be above --to ({})", from, to);
    }
    Ok(from..=to)
}

/// Load the config file if present (else auto-detect a dongle), then apply CLI overrides.
async fn resolve_config(path: &str, port: Option<&str>, baud: Option<u32>) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        Config::load(path).await?
    } else {
        let mut config = Config::console_only();
        if port.is_none() {
            // no file and no --port: fall back to the first recognised dongle
            match discovery::find_dongles() {
                Ok(found) => {
                    if let Some(dongle) = found.into_iter().next() {
                        config.dongle.port = dongle.device;
                    }
                }
                Err(e) => eprintln!("Dongle auto-detection failed: {}", e),
            }
        }
        config
    };
    if let Some(port) = port {
        config.dongle.port = port.to_string();
    }
    if let Some(baud) = baud {
        config.dongle.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

fn spawn_dongle(config: &Config) -> Dongle {
    let transport = SerialTransport::new(&config.dongle.port, config.dongle.baud_rate);
    Dongle::spawn_with(Box::new(transport), config.dongle.link_options())
}

/// Spawn the link and wait for the first handshake.
async fn start_dongle(config: &Config) -> Result<Dongle> {
    info!(
        "Starting pvdongle v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.dongle.port
    );
    let dongle = spawn_dongle(config);
    match tokio::time::timeout(READY_TIMEOUT, dongle.wait_for_state(ConnectionState::Idle)).await {
        Ok(ready) => ready?,
        Err(_) => {
            dongle.shutdown().await;
            return Err(anyhow!(
                "dongle on {} did not answer the handshake within {:?}",
                config.dongle.port,
                READY_TIMEOUT
            ));
        }
    }
    Ok(dongle)
}

async fn finish(dongle: &Dongle) {
    let metrics = dongle.metrics();
    info!(
        "Link metrics: {}",
        serde_json::to_string(&metrics).unwrap_or_else(|_| format!("{:?}", metrics))
    );
    dongle.shutdown().await;
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match (verbosity, config) {
        (0, Some(cfg)) => cfg.logging.level_filter(),
        (0, None) => log::LevelFilter::Info,
        (1, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    if let Some(f) = file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
