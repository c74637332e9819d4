//! coedit Daemon (coeditd)
//!
//! Server process for collaborative text editing. Clients register on a
//! document, push character edits and poll for edits made by others.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (TCP on 6380, WebSocket on 6381, files under ./documents)
//! coeditd
//!
//! # Serve a different directory, flushing every 30 seconds
//! coeditd --root /srv/docs --flush-interval 30
//!
//! # Resolve documents through a file catalog
//! coeditd --catalog /var/lib/coedit/catalog.db --root /srv/projects
//!
//! # With authentication
//! coeditd --password mysecret
//!
//! # With configuration file
//! coeditd --config /etc/coedit/coedit.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use coedit_core::{ContentStore, LocationResolver, SessionManager, TransformWindow};
use coedit_storage::{DirectoryResolver, FileStore, MemoryStore, SqliteCatalog};
use coedit_transport::{TcpServer, WebSocketServer};

use crate::config::{Config, StorageBackend};

/// coedit Daemon - collaborative text editing server
#[derive(Parser, Debug)]
#[command(name = "coeditd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on [default: 6380]
    #[arg(long, env = "COEDIT_TCP_PORT")]
    tcp_port: Option<u16>,

    /// WebSocket port to listen on [default: 6381]
    #[arg(long, env = "COEDIT_WS_PORT")]
    ws_port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "COEDIT_BIND")]
    bind: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "COEDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COEDIT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Disable TCP server
    #[arg(long)]
    no_tcp: bool,

    /// Disable WebSocket server
    #[arg(long)]
    no_ws: bool,

    /// Directory holding document files [default: documents]
    #[arg(long, env = "COEDIT_ROOT")]
    root: Option<PathBuf>,

    /// SQLite file catalog used to locate documents under the root
    #[arg(long, env = "COEDIT_CATALOG", conflicts_with = "memory")]
    catalog: Option<PathBuf>,

    /// Keep documents in memory only
    #[arg(long)]
    memory: bool,

    /// Require authentication with this password
    #[arg(long, env = "COEDIT_PASSWORD")]
    password: Option<String>,

    /// Seconds between background flushes of each open document [default: 120]
    #[arg(long, env = "COEDIT_FLUSH_INTERVAL")]
    flush_interval: Option<u64>,

    /// Edits an incoming operation is transformed against
    /// (since-last-sync, full-history)
    #[arg(long, env = "COEDIT_TRANSFORM_WINDOW")]
    transform_window: Option<TransformWindow>,
}

impl Args {
    /// Resolve the effective configuration: file values, overridden by flags
    fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        let server = &mut config.server;
        if let Some(port) = self.tcp_port {
            server.tcp_port = port;
        }
        if let Some(port) = self.ws_port {
            server.ws_port = port;
        }
        if let Some(bind) = &self.bind {
            server.bind = bind.clone();
        }
        if self.no_tcp {
            server.tcp = false;
        }
        if self.no_ws {
            server.websocket = false;
        }
        if self.password.is_some() {
            server.password = self.password.clone();
        }

        if let Some(secs) = self.flush_interval {
            config.engine.flush_interval_secs = secs;
        }
        if let Some(window) = self.transform_window {
            config.engine.transform_window = window;
        }

        let storage = &mut config.storage;
        if let Some(root) = &self.root {
            storage.root = root.clone();
        }
        if let Some(catalog) = &self.catalog {
            storage.backend = StorageBackend::Catalog;
            storage.catalog = Some(catalog.clone());
        }
        if self.memory {
            storage.backend = StorageBackend::Memory;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner();

    let config = args.resolve()?;
    let (resolver, store) = open_storage(&config)?;
    let manager = Arc::new(SessionManager::new(resolver, store, config.engine.clone()));

    info!(
        tcp_port = config.server.tcp_port,
        ws_port = config.server.ws_port,
        bind = %config.server.bind,
        flush_interval_secs = config.engine.flush_interval().as_secs(),
        transform_window = %config.engine.transform_window,
        "Starting coedit daemon"
    );

    if config.server.password.is_some() {
        info!("Authentication enabled");
    }

    let mut handles = Vec::new();

    if config.server.tcp {
        let tcp_addr = socket_addr(&config.server.bind, config.server.tcp_port)?;
        let tcp_server = match &config.server.password {
            Some(pwd) => TcpServer::with_password(manager.clone(), tcp_addr, pwd.clone()),
            None => TcpServer::new(manager.clone(), tcp_addr),
        };
        handles.push(tokio::spawn(async move {
            if let Err(e) = tcp_server.run().await {
                error!(error = %e, "TCP server error");
            }
        }));
    }

    if config.server.websocket {
        let ws_addr = socket_addr(&config.server.bind, config.server.ws_port)?;
        let ws_server = match &config.server.password {
            Some(pwd) => WebSocketServer::with_password(manager.clone(), ws_addr, pwd.clone()),
            None => WebSocketServer::new(manager.clone(), ws_addr),
        };
        handles.push(tokio::spawn(async move {
            if let Err(e) = ws_server.run().await {
                error!(error = %e, "WebSocket server error");
            }
        }));
    }

    if handles.is_empty() {
        anyhow::bail!("At least one transport must be enabled");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for handle in &handles {
        handle.abort();
    }
    manager.shutdown().await;

    Ok(())
}

fn socket_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))
}

fn open_storage(config: &Config) -> Result<(Arc<dyn LocationResolver>, Arc<dyn ContentStore>)> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Memory => {
            info!("Running in-memory only");
            let store = Arc::new(MemoryStore::new());
            Ok((store.clone(), store))
        }
        StorageBackend::File => {
            info!(root = %storage.root.display(), "Serving documents from directory");
            Ok((
                Arc::new(DirectoryResolver::new(storage.root.clone())),
                Arc::new(FileStore::new()),
            ))
        }
        StorageBackend::Catalog => {
            let path = storage
                .catalog
                .as_ref()
                .context("The catalog backend requires a catalog path")?;
            info!(catalog = %path.display(), root = %storage.root.display(), "Resolving documents through file catalog");
            let catalog = SqliteCatalog::new(path, storage.root.clone())
                .with_context(|| format!("Failed to open catalog {}", path.display()))?;
            Ok((Arc::new(catalog), Arc::new(FileStore::new())))
        }
    }
}

fn print_banner() {
    println!(
        r#"
   ___ ___   ___ ___ ___ _____
  / __/ _ \ | __|   \_ _|_   _|
 | (_| (_) || _|| |) | |  | |
  \___\___/ |___|___/___| |_|
  Collaborative text editing server
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
