//! Entry point: CLI dispatch, config loading, and the server run loop.

mod bootstrap;
mod cli;
mod config;
mod logging;

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use akumulid_engine::{DbConnection, MemoryEngine};
use akumulid_server::{register_builtin_servers, Server, SignalHandler};

use cli::Cli;
use config::AppConfig;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    logging::init();

    if let Err(e) = run(&cli) {
        tracing::error!(error = %e, "akumulid exiting with error");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Bootstrap(#[from] bootstrap::BootstrapError),
    #[error(transparent)]
    Engine(#[from] akumulid_engine::EngineError),
    #[error(transparent)]
    Server(#[from] akumulid_server::ServerError),
    #[error("{0}")]
    Other(String),
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf, AppError> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    config::default_config_path().ok_or_else(|| AppError::Other("could not determine home directory".to_string()))
}

fn write_debug_target(target: &str, text: &str) -> std::io::Result<()> {
    if target.eq_ignore_ascii_case("stdout") {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(text.as_bytes())
    } else {
        std::fs::write(target, text)
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    if cli.init || cli.init_expandable {
        let path = resolve_config_path(cli)?;
        let text = config::default_config_text(cli.init_expandable, cli.disable_wal);
        std::fs::write(&path, text).map_err(|e| AppError::Other(format!("failed to write {path:?}: {e}")))?;
        tracing::info!(path = %path.display(), "wrote default config");
        return Ok(());
    }

    let config_path = resolve_config_path(cli)?;
    let mut app_config: AppConfig = config::load(&config_path)?;

    if cli.create {
        let volume_override = cli.ci.then_some(config::CI_VOLUME_SIZE);
        bootstrap::create_database(&app_config, cli.allocate, volume_override)?;
        tracing::info!(path = %app_config.path.display(), "OK database created");
        return Ok(());
    }

    if cli.delete {
        bootstrap::delete_database(&app_config)?;
        tracing::info!(path = %app_config.path.display(), "OK database deleted");
        return Ok(());
    }

    if let Some(reason) = app_config.validate_wal() {
        tracing::warn!(%reason, "WAL configuration rejected");
    }

    if let Some(target) = &cli.debug_dump {
        bootstrap::ensure_manifest_exists(&app_config)?;
        let connection = DbConnection::open(app_config.path.clone(), Box::new(MemoryEngine::new()))?;
        let report = connection.debug_report();
        write_debug_target(target, &report)
            .map_err(|e| AppError::Other(format!("failed to write debug dump: {e}")))?;
        return Ok(());
    }

    if let Some(target) = &cli.debug_recovery_dump {
        bootstrap::ensure_manifest_exists(&app_config)?;
        let connection = DbConnection::open(app_config.path.clone(), Box::new(MemoryEngine::new()))?;
        let report = connection.debug_report_after_recovery();
        write_debug_target(target, &report)
            .map_err(|e| AppError::Other(format!("failed to write debug dump: {e}")))?;
        return Ok(());
    }

    bootstrap::ensure_manifest_exists(&app_config)?;
    run_server(app_config)
}

fn run_server(app_config: AppConfig) -> Result<(), AppError> {
    let connection = DbConnection::open(app_config.path.clone(), Box::new(MemoryEngine::new()))?;

    register_builtin_servers();

    let signal_handler = SignalHandler::new();
    let mut servers: Vec<Box<dyn Server>> = Vec::new();

    for (id, settings) in app_config.servers.iter().enumerate() {
        let mut server = akumulid_server::build(&connection, settings)?;
        server.start(&signal_handler, id as u64)?;
        tracing::info!(server = %settings.name, "OK server started");
        servers.push(server);
    }

    let wait_handle = signal_handler
        .spawn_wait_thread()
        .map_err(|e| AppError::Other(format!("failed to install signal handler: {e}")))?;

    let _ = wait_handle.join();

    for server in &servers {
        server.stop();
        tracing::info!("stopped");
    }

    Ok(())
}
