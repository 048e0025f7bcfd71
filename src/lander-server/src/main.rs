// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod listener;
mod protocol;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use lander_app::{init_logging, normalize_name, ConfigFile};
use lander_backend::{register_builtin_backends_on, BackendAccess, RegistrationContext};
use lander_core::{FaultTransition, Lander, LanderListener, Operation, PowerState};
use lander_core::DynResult;

use config::ServerConfig;
use protocol::StatusReport;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - lander operation server");
const STATUS_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_BACKEND: &str = "sim";

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Lander backend to use (e.g. sim)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// IP address for the JSON TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the JSON TCP listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

/// Resolved configuration after merging config file and CLI arguments.
#[derive(Debug)]
struct ResolvedConfig {
    backend: String,
    access: BackendAccess,
    listen_addr: SocketAddr,
}

fn resolve_config(
    cli: &Cli,
    cfg: &ServerConfig,
    registry: &RegistrationContext,
) -> DynResult<ResolvedConfig> {
    let backend = cli
        .backend
        .as_deref()
        .or(cfg.backend.name.as_deref())
        .map(normalize_name)
        .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
    if !registry.is_backend_registered(&backend) {
        return Err(format!(
            "Unknown lander backend: {} (available: {})",
            backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }

    let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
    let listen_port = cli.port.unwrap_or(cfg.listen.port);

    Ok(ResolvedConfig {
        backend,
        access: BackendAccess::Sim(cfg.sim.clone()),
        listen_addr: SocketAddr::from((listen_ip, listen_port)),
    })
}

/// Traces operation and fault state changes.
struct LogListener;

impl LanderListener for LogListener {
    fn on_running_change(&self, op: Operation, running: bool) {
        debug!("{} running: {}", op, running);
    }

    fn on_finished(&self, op: Operation) {
        debug!("{} finished", op);
    }

    fn on_fault_change(&self, transition: &FaultTransition) {
        debug!(
            "{} fault {} {}",
            transition.domain,
            transition.name,
            if transition.asserted { "asserted" } else { "resolved" }
        );
    }

    fn on_power_update(&self, power: &PowerState) {
        debug!("Power update: {:?}", power);
    }

    fn on_ground_result(&self, found: bool, position: f64) {
        info!("Ground found: {} at {}", found, position);
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let mut bootstrap_ctx = RegistrationContext::new();
    register_builtin_backends_on(&mut bootstrap_ctx);

    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = ServerConfig::load(cli.config.as_deref())?;
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cli.log_level.as_deref().or(cfg.general.log_level.as_deref()));

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let resolved = resolve_config(&cli, &cfg, &bootstrap_ctx)?;
    info!("Starting lander-server (backend: {})", resolved.backend);

    let handle = bootstrap_ctx.build_backend(&resolved.backend, resolved.access)?;
    let lander = Arc::new(Lander::new(handle.backend, cfg.behavior.policies())?);

    let (status_tx, _) = broadcast::channel::<StatusReport>(STATUS_CHANNEL_CAPACITY);
    lander.set_command_status_callback(Arc::new({
        let status_tx = status_tx.clone();
        move |id, success| {
            info!("Command {} finished (success: {})", id, success);
            // No connected clients is fine.
            let _ = status_tx.send(StatusReport { id, success });
        }
    }));
    lander.register_listener(Arc::new(LogListener));

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Telemetry has to flow before waiting for the servers so the tables
    // are populated by the time commands arrive.
    let mut events = handle.events;
    let telemetry_lander = Arc::clone(&lander);
    let mut telemetry_shutdown_rx = shutdown_rx.clone();
    task_handles.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event.deliver_to(&telemetry_lander),
                    None => {
                        warn!("Backend telemetry stream closed");
                        break;
                    }
                },
                _ = listener::wait_for_shutdown(&mut telemetry_shutdown_rx) => break,
            }
        }
    }));

    let missing = lander.wait_for_servers().await;
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|op| op.name()).collect();
        warn!("Action servers unavailable: {}", names.join(", "));
    }

    if cfg.listen.enabled {
        let listen_addr = resolved.listen_addr;
        let listener_lander = Arc::clone(&lander);
        let listener_status_tx = status_tx.clone();
        let listener_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = listener::run_listener(
                listen_addr,
                listener_lander,
                listener_status_tx,
                listener_shutdown_rx,
            )
            .await
            {
                error!("Listener error: {:?}", e);
            }
        }));
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);

    let grace = cfg.behavior.shutdown_grace();
    if tokio::time::timeout(grace, lander.shutdown()).await.is_err() {
        warn!("Operations still running after {:?}, abandoning them", grace);
    }

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RegistrationContext {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        registry
    }

    #[test]
    fn test_resolve_defaults() {
        let cli = Cli::parse_from(["lander-server"]);
        let resolved = resolve_config(&cli, &ServerConfig::default(), &registry()).unwrap();
        assert_eq!(resolved.backend, "sim");
        assert_eq!(resolved.listen_addr, "127.0.0.1:4540".parse().unwrap());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "lander-server",
            "--backend",
            "SIM",
            "-l",
            "0.0.0.0",
            "-p",
            "5000",
        ]);
        let mut cfg = ServerConfig::default();
        cfg.backend.name = Some("hardware".to_string());
        let resolved = resolve_config(&cli, &cfg, &registry()).unwrap();
        assert_eq!(resolved.backend, "sim");
        assert_eq!(resolved.listen_addr, "0.0.0.0:5000".parse().unwrap());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let cli = Cli::parse_from(["lander-server", "-b", "hardware"]);
        let err = resolve_config(&cli, &ServerConfig::default(), &registry()).unwrap_err();
        assert!(err.to_string().contains("available: sim"));
    }
}
