//! casvault - Multi-tenant content-addressed storage server.
//!
//! Run modes:
//!   cargo run                 - Show usage
//!   cargo run -- serve        - Start the HTTP API server
//!   cargo run -- gc           - Run a one-shot garbage-collection pass
//!   cargo run -- demo         - Run an interactive in-memory demo

use std::env;

use casvault::api::{self, server::AppState};
use casvault::config::CasVaultConfig;
use casvault::logging;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "serve" => run_serve().await,
        "gc" => run_gc().await,
        "demo" => run_demo().await,
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("casvault - Content-Addressed Storage Server");
    println!();
    println!("Usage:");
    println!("  casvault-server serve   Start the HTTP API server");
    println!("  casvault-server gc      Run a one-shot garbage-collection pass");
    println!("  casvault-server demo    Run an interactive in-memory demo");
    println!();
    println!("Environment Variables:");
    println!("  CASVAULT_BIND_ADDR          Listen address (default: 0.0.0.0:8080)");
    println!("  CASVAULT_NODE_LIMIT         Max node size in bytes (default: 65536)");
    println!("  CASVAULT_STORE_BACKEND      memory | local_fs (default: memory)");
    println!("  CASVAULT_STORE_DIR          Root directory for the local_fs backend");
    println!("  CASVAULT_METADATA_BACKEND   memory | sqlite (default: memory)");
    println!("  CASVAULT_SQLITE_PATH        Database file for the sqlite backend");
    println!("  CASVAULT_MAX_DEPOT_HISTORY  Max retained commits per depot (default: 100)");
    println!("  CASVAULT_MAX_REWRITE_ENTRIES Max entries per rewrite batch (default: 1000)");
    println!("  CASVAULT_LOG_LEVEL          trace|debug|info|warn|error (default: info)");
    println!("  CASVAULT_LOG_JSON           1 to emit structured JSON logs");
}

async fn run_serve() {
    let config = match CasVaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    config.print_summary();

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    let router = api::build_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    println!("casvault listening on {}", config.bind_addr);
    if let Err(e) = axum::serve(listener, router).await {
        eprintln!("Server error: {}", e);
    }
}

/// Garbage collection entry point. Node retention for files and
/// directories is driven by the ownership index and depot history, not a
/// standalone sweep; set-node GC (deleteZeroRefNodes) remains an open
/// placeholder (see DESIGN.md), so this subcommand validates the
/// configured store and reports that there is nothing to sweep yet
/// rather than silently doing nothing.
async fn run_gc() {
    let config = match CasVaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = AppState::from_config(&config) {
        eprintln!("Failed to initialize application state: {}", e);
        std::process::exit(1);
    }

    println!("Garbage collection: nothing to sweep (set-node reclamation is not yet implemented, see DESIGN.md)");
}

async fn run_demo() {
    use casvault::delegate::{new_root, Capabilities};
    use casvault::ids::DelegateId;

    println!("\n=== casvault demo ===\n");

    let state = AppState::in_memory(65536, 100, 1000);

    let root_delegate = new_root(
        DelegateId::from_bytes(*uuid::Uuid::new_v4().as_bytes()),
        "demo-realm",
        Capabilities { can_upload: true, can_manage_depot: true },
    );
    state.delegates.create(&root_delegate).await.expect("create root delegate");
    println!("Root delegate: {}", root_delegate.delegate_id);

    let empty_root = casvault::codec::empty_dnode_key();
    let depot = state
        .depots
        .create(
            "demo-realm",
            casvault::ids::DepotId::from_bytes(*uuid::Uuid::new_v4().as_bytes()),
            "demo-depot",
            empty_root,
            100,
            &root_delegate.delegate_id.to_string(),
            "",
        )
        .await
        .expect("create depot");
    println!("Depot: {} (root {})", depot.name, depot.root);

    let write_path = casvault::fs::FsOps::parse_path_or_index(Some("/hello.txt"), None).expect("parse path");
    let outcome = state
        .fs
        .write(depot.root, &write_path, b"hello from casvault".to_vec(), "text/plain", &root_delegate)
        .await
        .expect("write file");
    println!("Wrote /hello.txt, new root: {}", outcome.new_root);

    let (bytes, content_type, size) =
        state.fs.read(outcome.new_root, &write_path).await.expect("read file");
    println!(
        "Read back {} bytes ({}): {}",
        size,
        content_type,
        String::from_utf8_lossy(&bytes)
    );

    println!("\n=== Demo Complete ===");
}
