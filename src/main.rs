//! Synheart Editor Agent CLI
//!
//! Passive editor behavior monitor with baseline-relative risk scoring.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synheart_editor_agent::{
    collector::{Collector, CollectorConfig, EventSource},
    config::Config,
    monitor::{load_baseline, Monitor},
    sink::{ConsoleSink, CsvLogSink},
    store::{DayExport, DayRepository, JsonDayRepository, SessionStore},
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog},
    PRIVACY_DECLARATION, VERSION,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use synheart_editor_agent::{BlockingGatewayClient, GatewayConfig};

#[derive(Parser)]
#[command(name = "synheart-editor")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Passive editor behavior monitor with baseline-relative risk scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring editor events (JSON Lines on stdin or from a file)
    Start {
        /// Read events from a file instead of stdin
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Drive timers by event timestamps instead of the wall clock
        #[arg(long)]
        replay: bool,

        /// Enable gateway upload (requires gateway feature)
        #[arg(long)]
        gateway: bool,

        /// Gateway port (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_port: Option<u16>,

        /// Gateway token (auto-detected from runtime dir if not specified)
        #[arg(long)]
        gateway_token: Option<String>,

        /// Upload interval in seconds
        #[arg(long, default_value = "300")]
        sync_interval: u64,
    },

    /// Pause monitoring
    Pause,

    /// Resume monitoring
    Resume,

    /// Show today's statistics and collection status
    Status,

    /// Display privacy declaration
    Privacy,

    /// Export day statistics
    Export {
        /// Day to export (YYYY-MM-DD); all days when omitted
        #[arg(long)]
        day: Option<String>,

        /// Output directory
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Wipe the statistics of one day
    Reset {
        /// Day to reset (YYYY-MM-DD)
        #[arg(long)]
        day: String,

        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show configuration
    Config,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            input,
            replay,
            gateway,
            gateway_port,
            gateway_token,
            sync_interval,
        } => {
            cmd_start(
                input,
                replay,
                gateway,
                gateway_port,
                gateway_token,
                sync_interval,
            );
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
        Commands::Export {
            day,
            output,
            format,
        } => {
            cmd_export(day, output, &format);
        }
        Commands::Reset { day, yes } => {
            cmd_reset(&day, yes);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the default level.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("synheart_editor_agent=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    })
}

/// Build the monitor with its sinks and persisted baseline.
fn build_monitor(
    config: &Config,
    transparency_log: &SharedTransparencyLog,
    now: chrono::DateTime<Utc>,
    collector: Option<Collector>,
) -> Monitor {
    let repository = JsonDayRepository::new(config.days_path());
    let mut monitor = Monitor::new(config.clone(), Box::new(repository), now)
        .with_transparency(transparency_log.clone())
        .with_baseline_file(config.baseline_path());

    monitor.add_sink(Box::new(ConsoleSink::new()));
    if config.enable_logging {
        monitor.add_sink(Box::new(CsvLogSink::new(config.csv_log_path())));
    }
    if let Some(collector) = collector {
        monitor.add_subscription(Box::new(collector));
    }

    if monitor.is_calibrating() {
        println!(
            "Calibrating baseline: {}/{} windows collected",
            monitor.calibrator().count(),
            config.baseline_windows
        );
    }
    monitor
}

#[allow(unused_variables)]
fn cmd_start(
    input: Option<PathBuf>,
    replay: bool,
    enable_gateway: bool,
    gateway_port: Option<u16>,
    gateway_token: Option<String>,
    sync_interval: u64,
) {
    println!("Synheart Editor Agent v{VERSION}");
    println!();

    // Load or create configuration
    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let source = match input {
        Some(path) => EventSource::File(path),
        None => EventSource::Stdin,
    };

    println!("Starting monitor...");
    match &source {
        EventSource::Stdin => println!("  Events: stdin"),
        EventSource::File(path) => println!("  Events: {}", path.display()),
    }
    println!("  Clock: {}", if replay { "event time (replay)" } else { "wall clock" });
    println!("  Window duration: {}s", config.window_duration.as_secs());
    println!("  Idle threshold: {}s", config.idle_ms / 1000);
    println!(
        "  Trigger: score >= {} for {} window(s)",
        config.score_threshold, config.consecutive_windows
    );
    println!("  Time zone: {}", config.tz());
    println!(
        "  CSV log: {}",
        if config.enable_logging {
            config.csv_log_path().display().to_string()
        } else {
            "disabled".to_string()
        }
    );

    // Show gateway status
    #[cfg(feature = "gateway")]
    let gateway_client = if enable_gateway {
        match create_gateway_client(gateway_port, gateway_token) {
            Ok(client) => {
                println!("  Gateway upload: enabled (interval: {sync_interval}s)");
                println!("  Device ID: {}", client.device_id());

                match client.test_connection() {
                    Ok(true) => println!("  Gateway connection: OK"),
                    Ok(false) => eprintln!("Warning: Gateway health check failed"),
                    Err(e) => eprintln!("Warning: Could not connect to gateway: {e}"),
                }
                Some(client)
            }
            Err(e) => {
                eprintln!("Warning: Gateway initialization failed: {e}");
                eprintln!("Continuing without gateway upload.");
                None
            }
        }
    } else {
        println!("  Gateway upload: disabled");
        None
    };

    #[cfg(not(feature = "gateway"))]
    if enable_gateway {
        eprintln!("Warning: --gateway flag ignored (gateway feature not enabled at compile time)");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let transparency_log = create_shared_log_with_persistence(config.transparency_path());

    let mut collector = Collector::new(CollectorConfig { source });
    let receiver = collector.receiver().clone();
    if let Err(e) = collector.start() {
        eprintln!("Error starting collector: {e}");
        std::process::exit(1);
    }
    let mut collector = Some(collector);

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Live runs start the clock now; replays start it at the first event.
    let mut monitor = if replay {
        None
    } else {
        Some(build_monitor(
            &config,
            &transparency_log,
            Utc::now(),
            collector.take(),
        ))
    };

    // Support pause/resume from another process by polling the config file.
    let mut paused = !replay && config.paused;
    if paused {
        println!("Monitoring is currently paused.");
        println!("Run `synheart-editor resume` to continue.");
        println!();
    }
    let mut last_config_check = std::time::Instant::now();

    #[cfg(feature = "gateway")]
    let mut last_gateway_sync = std::time::Instant::now();

    while running.load(Ordering::SeqCst) {
        if !replay && last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;
                    println!();
                    println!(
                        "{}",
                        if paused {
                            "Pausing monitoring..."
                        } else {
                            "Resuming monitoring..."
                        }
                    );
                }
            }
            last_config_check = std::time::Instant::now();
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                // Events that arrive while paused are dropped unseen.
                if paused {
                    continue;
                }
                let monitor = monitor.get_or_insert_with(|| {
                    build_monitor(&config, &transparency_log, event.at, collector.take())
                });
                monitor.handle_event(&event);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if !replay && !paused {
                    if let Some(monitor) = monitor.as_mut() {
                        monitor.advance_to(Utc::now());
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                println!();
                println!("Event stream ended");
                break;
            }
        }

        // Upload today's aggregate on the configured interval
        #[cfg(feature = "gateway")]
        if let (Some(client), Some(monitor)) = (&gateway_client, monitor.as_mut()) {
            if last_gateway_sync.elapsed() >= Duration::from_secs(sync_interval) {
                upload_today(client, monitor, &config);
                last_gateway_sync = std::time::Instant::now();
            }
        }
    }

    // Stop monitoring
    println!();
    println!("Stopping monitor...");
    match monitor.as_mut() {
        Some(monitor) => {
            if let Err(e) = monitor.stop() {
                eprintln!("Warning: Could not persist state: {e}");
            }

            #[cfg(feature = "gateway")]
            if let Some(ref client) = gateway_client {
                upload_today(client, monitor, &config);
            }

            let today = monitor.export_today(Utc::now());
            println!(
                "Today ({}): {} keystrokes, {} min active, {} min idle",
                today.day,
                today.keystrokes,
                today.active_ms / 60_000,
                today.idle_ms / 60_000
            );
        }
        None => {
            if let Some(mut collector) = collector.take() {
                collector.stop();
            }
            if let Err(e) = transparency_log.save() {
                eprintln!("Warning: Could not save transparency log: {e}");
            }
        }
    }

    // Final stats
    println!();
    println!("{}", transparency_log.summary());
}

#[cfg(feature = "gateway")]
fn upload_today(client: &BlockingGatewayClient, monitor: &mut Monitor, config: &Config) {
    let now = Utc::now();
    let export = monitor.export_today(now);
    let scores = monitor
        .store()
        .get(&export.day)
        .and_then(|day| day.score_summary());

    match client.upload_day(&export, scores, &config.timezone) {
        Ok(response) => println!("[Gateway] Uploaded {} | {response}", export.day),
        Err(e) => eprintln!("[Gateway] Upload failed: {e}"),
    }
}

fn cmd_pause() {
    let mut config = load_config();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring paused. Use 'synheart-editor resume' to continue.");
}

fn cmd_resume() {
    let mut config = load_config();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring resumed.");
}

fn cmd_status() {
    let config = load_config();
    let repository = JsonDayRepository::new(config.days_path());
    let store = SessionStore::new(Box::new(repository), config.tz());
    let today = store.day_key(Utc::now());

    println!("Synheart Editor Agent Status");
    println!("============================");
    println!();

    println!("Configuration:");
    println!("  Window duration: {}s", config.window_duration.as_secs());
    println!("  Idle threshold: {}s", config.idle_ms / 1000);
    println!("  Paused: {}", config.paused);
    println!();

    match load_baseline(&config.baseline_path()) {
        Ok(Some(calibrator)) if !calibrator.is_calibrating(config.baseline_windows) => {
            println!("Baseline: calibrated ({} windows)", calibrator.count());
        }
        Ok(Some(calibrator)) => println!(
            "Baseline: calibrating ({}/{} windows)",
            calibrator.count(),
            config.baseline_windows
        ),
        Ok(None) => println!("Baseline: not started"),
        Err(e) => println!("Baseline: unreadable ({e})"),
    }
    println!();

    match store.load(&today) {
        Ok(Some(day)) => {
            println!("Today ({today}):");
            println!("  Keystrokes: {}", day.keystrokes);
            println!("  Active: {} min", day.active_ms / 60_000);
            println!("  Idle: {} min", day.idle_ms / 60_000);
            if let Some(avg) = day.inter_key_avg_ms {
                println!("  Average inter-key interval: {avg:.0} ms");
            }
            if day.currently_idle {
                println!("  Currently idle");
            }

            let mut files: Vec<_> = day.per_file.iter().collect();
            files.sort_by(|a, b| b.1.active_ms.cmp(&a.1.active_ms));
            for (file, stats) in files.iter().take(5) {
                println!(
                    "    {file}: {} min, {} keystrokes",
                    stats.active_ms / 60_000,
                    stats.keystrokes
                );
            }

            if let Some(summary) = day.score_summary() {
                println!(
                    "  Scores: {} windows, mean {:.2}, sd {:.2}, max {:.2}, {} trigger(s)",
                    summary.windows, summary.mean, summary.std_dev, summary.max, summary.triggers
                );
            }
        }
        Ok(None) => println!("No activity recorded today."),
        Err(e) => println!("Could not read today's record: {e}"),
    }
    println!();

    // Load and show transparency stats if available
    let stats_path = config.transparency_path();
    if stats_path.exists() {
        let stats = TransparencyLog::with_persistence(stats_path).stats();
        println!("Cumulative Statistics:");
        println!("  Editor events: {}", stats.total_events());
        println!("  Windows completed: {}", stats.windows_completed);
        println!("  Triggers fired: {}", stats.triggers_fired);
        println!("  Log rows written: {}", stats.rows_logged);
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_export(day: Option<String>, output: Option<PathBuf>, format: &str) {
    let config = load_config();
    let export_dir = output.unwrap_or(config.export_path.clone());
    let repository = JsonDayRepository::new(config.days_path());

    let days = match day {
        Some(day) => vec![day],
        None => repository.days().unwrap_or_else(|e| {
            eprintln!("Error listing days: {e}");
            std::process::exit(1);
        }),
    };

    let mut exports: Vec<DayExport> = Vec::new();
    for day in &days {
        match repository.get(day) {
            Ok(Some(stats)) => exports.push(stats.export()),
            Ok(None) => eprintln!("Warning: No data for {day}"),
            Err(e) => eprintln!("Warning: Could not read {day}: {e}"),
        }
    }

    if exports.is_empty() {
        println!("No day data found in {:?}", repository.dir());
        println!("Run 'synheart-editor start' to begin monitoring.");
        return;
    }

    let output_path = export_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        if format == "jsonl" { "jsonl" } else { "json" }
    ));

    let content = if format == "jsonl" {
        // JSON Lines format
        let lines: Vec<String> = exports
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect();
        lines.join("\n")
    } else {
        match serde_json::to_string_pretty(&exports) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Error serializing: {e}");
                return;
            }
        }
    };

    if let Err(e) = std::fs::create_dir_all(&export_dir) {
        warn!("Could not create export directory: {e}");
    }
    match std::fs::write(&output_path, content) {
        Ok(_) => println!("Exported {} day(s) to {output_path:?}", exports.len()),
        Err(e) => eprintln!("Error writing export: {e}"),
    }
}

fn cmd_reset(day: &str, yes: bool) {
    if !yes {
        eprintln!("Refusing to reset {day} without --yes");
        std::process::exit(1);
    }

    let config = load_config();
    let repository = JsonDayRepository::new(config.days_path());
    let mut store = SessionStore::new(Box::new(repository), config.tz());

    let result = match store.reset(day, Utc::now()) {
        Ok(_) => store.flush(),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => println!("Statistics for {day} have been reset."),
        Err(e) => {
            eprintln!("Error resetting {day}: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}

/// Create gateway client from CLI args or runtime directory.
#[cfg(feature = "gateway")]
fn create_gateway_client(
    port: Option<u16>,
    token: Option<String>,
) -> Result<BlockingGatewayClient, synheart_editor_agent::GatewayError> {
    if let (Some(p), Some(t)) = (port, token.clone()) {
        return BlockingGatewayClient::new(GatewayConfig::new("127.0.0.1", p, t));
    }

    if port.is_some() || token.is_some() {
        eprintln!("Warning: Partial gateway config provided, trying runtime directory...");
    }
    BlockingGatewayClient::from_runtime()
}
