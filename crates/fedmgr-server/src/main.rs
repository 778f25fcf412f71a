mod config;
mod handler;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fedmgr_federation::{
    ControllerSecret, FederationLock, FederationManager, FederationState, LoadOutcome,
    TcpTransport,
};
use tracing::{error, info, warn};

use crate::config::{ControllerConfig, DefinitionsFile};
use crate::handler::ControllerHandler;

#[derive(Parser)]
#[command(name = "fedmgr-server", about = "cluster controller federation manager")]
struct Args {
    /// path to TOML configuration file
    #[arg(short = 'c', long, env = "FEDMGR_CONFIG")]
    config: Option<PathBuf>,

    /// print default configuration as TOML and exit
    #[arg(long)]
    config_template: bool,

    /// name of the local cluster
    #[arg(long, env = "FEDMGR_CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// address to bind to
    #[arg(long, env = "FEDMGR_HOST")]
    host: Option<String>,

    /// port to listen on for other controllers
    #[arg(short, long, env = "FEDMGR_PORT")]
    port: Option<u16>,

    /// directory for the federation state file. state is not saved when unset
    #[arg(long, env = "FEDMGR_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// TOML file with federation definitions, applied at startup
    #[arg(long, env = "FEDMGR_FEDERATIONS_FILE")]
    federations_file: Option<PathBuf>,

    /// seconds between sibling health checks
    #[arg(long, env = "FEDMGR_PING_INTERVAL_SECS")]
    ping_interval_secs: Option<u64>,

    /// maximum number of concurrent inbound controller connections
    #[arg(long, env = "FEDMGR_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// shared secret for authenticating controller-to-controller frames.
    /// when set, frames with a bad or missing tag end the connection.
    #[arg(long, env = "FEDMGR_AUTH_PASS")]
    auth_pass: Option<String>,

    /// path to a file containing the auth password (alternative to
    /// --auth-pass). the file contents are trimmed of trailing whitespace.
    #[arg(long, env = "FEDMGR_AUTH_PASS_FILE")]
    auth_pass_file: Option<PathBuf>,
}

/// Applies CLI overrides to a `ControllerConfig`. Only `Some` values from
/// the CLI args take effect, which preserves the resolution order:
/// defaults → TOML file → env vars → CLI flags.
fn apply_args(cfg: &mut ControllerConfig, args: &Args) {
    if let Some(ref name) = args.cluster_name {
        cfg.cluster_name = name.clone();
    }
    if let Some(ref host) = args.host {
        cfg.bind = host.clone();
    }
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(ref dir) = args.state_dir {
        cfg.state_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(ref path) = args.federations_file {
        cfg.federations_file = path.to_string_lossy().into_owned();
    }
    if let Some(v) = args.ping_interval_secs {
        cfg.federation.ping_interval_secs = v;
    }
    if let Some(v) = args.max_connections {
        cfg.max_connections = v;
    }
    if let Some(ref pass) = args.auth_pass {
        cfg.auth_pass = pass.clone();
    }
}

/// Prints `msg` to stderr and exits with code 1.
fn exit_err(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}

/// Resolves the controller secret from config + optional file flag.
/// The config value and --auth-pass-file are mutually exclusive.
fn resolve_secret(cfg: &ControllerConfig, args: &Args) -> Option<Arc<ControllerSecret>> {
    if !cfg.auth_pass.is_empty() && args.auth_pass_file.is_some() {
        exit_err("error: --auth-pass and --auth-pass-file are mutually exclusive");
    }
    if !cfg.auth_pass.is_empty() {
        return Some(Arc::new(ControllerSecret::from_password(&cfg.auth_pass)));
    }
    if let Some(ref path) = args.auth_pass_file {
        match ControllerSecret::from_file(path) {
            Ok(secret) => return Some(Arc::new(secret)),
            Err(e) => exit_err(format!(
                "error: failed to read --auth-pass-file '{}': {e}",
                path.display()
            )),
        }
    }
    None
}

/// Parses a `host:port` pair into a `SocketAddr`. Exits with a message on failure.
fn parse_bind_addr(host: &str, port: u16) -> SocketAddr {
    match format!("{host}:{port}").parse() {
        Ok(a) => a,
        Err(e) => exit_err(format!("invalid bind address '{host}:{port}': {e}")),
    }
}

/// Restores saved membership. Failures are logged and the controller
/// continues unfederated.
async fn recover_state(manager: &FederationManager, state_dir: &std::path::Path) {
    match manager.load_state(state_dir).await {
        Ok(LoadOutcome::Joined { federation }) => {
            info!(%federation, "rejoined saved federation")
        }
        Ok(LoadOutcome::NotFederated | LoadOutcome::NoState) => {}
        Err(e) if e.is_incompatible_version() => {
            warn!("ignoring federation state from an incompatible version: {e}")
        }
        Err(e) => error!("failed to recover federation state: {e}"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fedmgr=info".into()),
        )
        .init();

    let args = Args::parse();

    // --config-template: dump defaults and exit
    if args.config_template {
        match ControllerConfig::default().to_toml() {
            Ok(toml) => {
                println!("{toml}");
                std::process::exit(0);
            }
            Err(e) => exit_err(format!("failed to generate config template: {e}")),
        }
    }

    // build ControllerConfig: defaults → TOML file → CLI/env overrides
    let mut cfg = match &args.config {
        Some(path) => ControllerConfig::from_file(path).unwrap_or_else(|e| exit_err(e)),
        None => ControllerConfig::default(),
    };
    apply_args(&mut cfg, &args);
    if let Err(e) = cfg.validate() {
        exit_err(format!("error: {e}"));
    }

    let secret = resolve_secret(&cfg, &args);
    let addr = parse_bind_addr(&cfg.bind, cfg.port);

    let state_dir = cfg.state_dir_path();
    if let Some(ref dir) = state_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            exit_err(format!(
                "failed to create state dir '{}': {e}",
                dir.display()
            ));
        }
    }

    let definitions = cfg.federations_path().map(|path| {
        DefinitionsFile::from_file(&path).unwrap_or_else(|e| exit_err(format!("error: {e}")))
    });

    info!(cluster = %cfg.cluster_name, "federation manager starting...");
    if secret.is_some() {
        info!("controller transport authentication enabled");
    }

    let lock = Arc::new(FederationLock::new(FederationState::default()));
    let transport = TcpTransport::new(cfg.transport_config(), secret.clone());
    let manager = Arc::new(FederationManager::new(
        cfg.federation_config(),
        lock,
        Arc::new(transport),
    ));

    if let Some(ref dir) = state_dir {
        recover_state(&manager, dir).await;
    }
    if let Some(defs) = definitions {
        manager.update_federations(&defs.into_update()).await;
    }

    let handler = Arc::new(ControllerHandler::new(Arc::clone(&manager)));
    let result = server::run(addr, handler, secret, cfg.max_connections).await;

    if let Some(ref dir) = state_dir {
        match manager.save_state(dir).await {
            Ok(()) => info!(dir = %dir.display(), "saved federation state"),
            Err(e) => error!(
                os_error = ?e.raw_os_error(),
                "failed to save federation state: {e}"
            ),
        }
    }
    manager.shutdown().await;

    if let Err(e) = result {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
