//! Vault Backup Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vault_server::args::Args;
use vault_server::clients::ClientRegistry;
use vault_server::config::{ServerConfig, default_database_path};
use vault_server::connection::{ConnectionParams, handle_connection, log_connection_end};
use vault_server::constants::*;
use vault_server::db::{MemoryStore, MetadataStore, SqliteStore};
use vault_server::handlers::RequestDispatcher;
use vault_server::sweeper::{spawn_broker_sweeper, spawn_registry_maintenance};
use vault_server::transfers::{FileStorage, TransferEngine, TransferMemoryBroker};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Print banner first
    println!("{}{}", MSG_BANNER, env!("CARGO_PKG_VERSION"));

    setup_tracing(args.debug);

    let config = match ServerConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}{}", ERR_GENERIC, e);
            std::process::exit(1);
        }
    };

    // Setup metadata store and backup storage
    let store = setup_store(args.memory, args.database.clone()).await;
    if let Err(e) = std::fs::create_dir_all(&config.storage_root) {
        eprintln!("{}{}", ERR_STORAGE_INIT, e);
        std::process::exit(1);
    }
    println!("{}{}", MSG_STORAGE, config.storage_root.display());

    // Build the core
    let broker = Arc::new(TransferMemoryBroker::new(config.broker));
    let registry = Arc::new(ClientRegistry::new(config.registry, Arc::clone(&broker)));
    let engine = Arc::new(TransferEngine::new(
        Arc::clone(&registry),
        FileStorage::new(config.storage_root.clone()),
        Arc::clone(&store),
    ));
    let dispatcher = Arc::new(RequestDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&engine),
        Arc::clone(&store),
    ));

    // Repopulate the registry; failure here is fatal
    let loaded = match load_clients(&registry, Arc::clone(&store)).await {
        Ok(count) => count,
        Err(e) => {
            eprintln!("{}{}", ERR_LOAD_CLIENTS, e);
            std::process::exit(1);
        }
    };
    println!("{}{}", MSG_CLIENTS_LOADED, loaded);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("{}{}: {}", ERR_BIND_FAILED, addr, e);
            std::process::exit(1);
        }
    };
    println!("{}{}", MSG_LISTENING, addr);

    let maintenance = spawn_registry_maintenance(Arc::clone(&registry));
    let sweeper = spawn_broker_sweeper(Arc::clone(&engine), config.broker.sweep_interval);

    // Setup graceful shutdown handling
    let shutdown_signal = setup_shutdown_signal();

    tokio::select! {
        _ = shutdown_signal => {
            println!("{}", MSG_SHUTDOWN_RECEIVED);
        }
        _ = async {
            loop {
                match listener.accept().await {
                    Ok((socket, peer_addr)) => {
                        let params = ConnectionParams::new(peer_addr, Arc::clone(&dispatcher), &config);
                        tokio::spawn(async move {
                            let result = handle_connection(socket, params).await;
                            log_connection_end(&result, peer_addr);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "{}", ERR_ACCEPT);
                    }
                }
            }
        } => {}
    }

    maintenance.abort();
    sweeper.abort();
    registry.shutdown();
    broker.clear();
    println!("{}", MSG_SHUTDOWN_COMPLETE);
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `--debug` selects the default level.
fn setup_tracing(debug: bool) {
    let default = if debug {
        "vault_server=debug"
    } else {
        "vault_server=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Open the configured metadata store, exiting on failure
async fn setup_store(memory: bool, database_path: Option<PathBuf>) -> Arc<dyn MetadataStore> {
    if memory {
        println!("{}", MSG_MEMORY_STORE);
        return Arc::new(MemoryStore::new());
    }

    // Determine database path (use provided path or platform default)
    let db_path = database_path.unwrap_or_else(|| match default_database_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}{}", ERR_GENERIC, e);
            std::process::exit(1);
        }
    });

    match SqliteStore::open(&db_path).await {
        Ok(store) => {
            println!("{}{}", MSG_DATABASE, db_path.display());
            Arc::new(store)
        }
        Err(e) => {
            eprintln!("{}{}", ERR_DATABASE_INIT, e);
            std::process::exit(1);
        }
    }
}

/// Load every persisted client into the registry
async fn load_clients(
    registry: &Arc<ClientRegistry>,
    store: Arc<dyn MetadataStore>,
) -> Result<usize, String> {
    let registry = Arc::clone(registry);
    tokio::task::spawn_blocking(move || {
        let records = store.load_all_clients().map_err(|e| e.to_string())?;
        for record in &records {
            registry
                .register(record.id, &record.name, record.public_key.clone())
                .map_err(|e| e.to_string())?;
        }
        info!(clients = records.len(), "persisted clients loaded");
        Ok(records.len())
    })
    .await
    .map_err(|e| e.to_string())?
}

async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect(ERR_SIGNAL_SIGTERM);
        let mut sigint = signal(SignalKind::interrupt()).expect(ERR_SIGNAL_SIGINT);

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect(ERR_SIGNAL_CTRLC);
    }
}
