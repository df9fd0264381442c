mod commands;
mod logging;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use dropwatch_core::filename::{self, NAME_FORMAT};
use dropwatch_core::mapping::{self, SAMPLE_ACTIVITIES, SAMPLE_MATERIALS};
use dropwatch_core::{
    platform, Alert, AppConfig, Coordinator, DialogNotifier, LogNotifier, MappingTable, Notifier,
    NotifyEventSource, ReadinessDetector, TransferEngine, WatchTarget,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CRITICAL_LOG_PATH: &str = "dropwatch_critical.log";
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match dropwatch_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            return fatal(true, anyhow::Error::new(err).context("Error loading configuration"));
        }
    };

    let result = match args.command.unwrap_or(Commands::Watch) {
        Commands::Watch => run_watch(&config).await,
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Commands::Route { file_name } => run_route(&config, &file_name),
        Commands::InitMappings => init_mappings(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fatal(config.native_alerts, err),
    }
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    if config.native_alerts {
        Arc::new(DialogNotifier)
    } else {
        Arc::new(LogNotifier)
    }
}

async fn run_watch(config: &AppConfig) -> anyhow::Result<()> {
    info!("{}", "=== DROPWATCH STARTING ===".green());

    let processed_root = config.processed_root();
    info!("Watch folder: {}", config.watch_path.display());
    info!("Processed folder: {}", processed_root.display());

    if !config.watch_path.exists() {
        info!(
            "Watch folder does not exist, creating: {}",
            config.watch_path.display()
        );
    }
    fs::create_dir_all(&config.watch_path).with_context(|| {
        format!("Cannot create watch folder {}", config.watch_path.display())
    })?;
    fs::create_dir_all(&processed_root).with_context(|| {
        format!("Cannot create processed folder {}", processed_root.display())
    })?;
    init_mappings(config)?;

    let restored = platform::restore_leftovers(&config.watch_path).with_context(|| {
        format!("Cannot scan watch folder {}", config.watch_path.display())
    })?;
    if restored > 0 {
        warn!("Restored {} file(s) left aside by an interrupted lock check", restored);
    }

    let materials = MappingTable::load(&config.material_map_path);
    let activities = MappingTable::load(&config.activity_map_path);

    let probe = platform::default_probe();
    let detector = ReadinessDetector::new(config.readiness_settings(), Arc::clone(&probe));
    let engine = TransferEngine::new(processed_root, materials, activities, probe)
        .with_invalid_file_grace(config.invalid_file_grace());

    let cancel = CancellationToken::new();
    let coordinator = Coordinator::new(detector, engine, build_notifier(config), cancel.clone());

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let _source = NotifyEventSource::start(&WatchTarget::new(config.watch_path.clone()), tx)
        .context("Cannot start file watcher")?;
    info!("File watcher started successfully");

    tokio::spawn(cancel_on_ctrl_c(cancel));
    coordinator.run(rx).await;

    info!("File watcher stopped");
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Service stopped by user");
            cancel.cancel();
        }
        Err(err) => error!("Cannot listen for shutdown signal: {}", err),
    }
}

fn run_route(config: &AppConfig, file_name: &str) -> anyhow::Result<()> {
    let parsed = filename::parse(file_name)
        .with_context(|| format!("'{}' does not follow {}", file_name, NAME_FORMAT))?;

    let engine = TransferEngine::new(
        config.processed_root(),
        MappingTable::load(&config.material_map_path),
        MappingTable::load(&config.activity_map_path),
        platform::default_probe(),
    );
    let destination = engine.destination_for(&parsed, Local::now().date_naive())?;

    println!("{} {}", "Material code:".cyan(), parsed.material_code);
    println!("{} {}", "Activity code:".cyan(), parsed.activity_code);
    println!("{} {}", "New file name:".cyan(), destination.file_name.to_string_lossy());
    println!(
        "{} {}",
        "Destination:".green(),
        destination.full_path().display()
    );
    Ok(())
}

fn init_mappings(config: &AppConfig) -> anyhow::Result<()> {
    let samples = [
        (&config.activity_map_path, SAMPLE_ACTIVITIES),
        (&config.material_map_path, SAMPLE_MATERIALS),
    ];
    for (path, entries) in samples {
        mapping::write_sample_if_missing(path, entries)
            .with_context(|| format!("Cannot write mapping file {}", path.display()))?;
    }
    Ok(())
}

/// Logs, alerts and records an error that ends the process.
fn fatal(native_alerts: bool, err: anyhow::Error) -> ExitCode {
    let reason = format!("{:#}", err);
    let alert = Alert::Startup {
        reason: reason.clone(),
    };
    if native_alerts {
        DialogNotifier.alert_and_wait(&alert);
    } else {
        LogNotifier.alert(&alert);
    }

    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(CRITICAL_LOG_PATH)
        .and_then(|mut file| writeln!(file, "{} - CRITICAL ERROR: {}", Local::now(), reason));
    if let Err(e) = appended {
        error!("Cannot write {}: {}", CRITICAL_LOG_PATH, e);
    }

    ExitCode::FAILURE
}
