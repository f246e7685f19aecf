use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use url::Url;

use mfe_proxy::config::{ASSET_PREFIXES_KEY, ROUTES_KEY};
use mfe_proxy::server::{HttpFetcher, ProxyServer};
use mfe_proxy::{Env, ProxyError, RequestConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "mfe-proxy")]
#[command(about = "Mount-aware reverse proxy for independently deployed microfrontends")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1")]
    listen_address: String,

    /// Listen port
    #[arg(long, default_value_t = 8080)]
    listen_port: u16,

    /// JSON file holding the ROUTES document; falls back to the ROUTES
    /// environment variable
    #[arg(long)]
    routes_file: Option<PathBuf>,

    /// Upstream binding in NAME=BASE_URL form (repeatable)
    #[arg(long = "binding", value_name = "NAME=BASE_URL")]
    bindings: Vec<String>,

    /// Extra asset prefixes as a JSON array of strings
    #[arg(long)]
    asset_prefixes: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let env = match build_env(&args) {
        Ok(env) => env,
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("Configuration error: {}", e);
            eprintln!("Use --help for usage information");
            process::exit(1);
        }
    };

    // Validate the route table once at startup so a broken ROUTES value
    // fails fast instead of on the first request.
    match RequestConfig::from_env(&env) {
        Ok(config) => display_startup_info(&config),
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }

    let listen = match format!("{}:{}", args.listen_address, args.listen_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid listen address: {}", e);
            process::exit(1);
        }
    };

    info!("Starting microfrontend proxy");
    let server = ProxyServer::new(listen, env);
    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Initialize logging with the specified level
fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let mut filter_str = format!("mfe_proxy={},hyper=warn,tokio=warn", level);

    // Allow environment override
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        filter_str = env_filter;
    }

    let filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| format!("Invalid log filter '{}': {}", filter_str, e))?;

    let fmt_layer = fmt::layer().with_target(true).with_level(true).compact();

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();

    Ok(())
}

/// Build the process-wide environment from the command line
fn build_env(args: &Args) -> Result<Env, ProxyError> {
    let routes = match &args.routes_file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!(
                "Failed to read routes file {}: {}",
                path.display(),
                e
            ))
        })?,
        None => std::env::var("ROUTES")
            .map_err(|_| ProxyError::config("ROUTES environment variable is required"))?,
    };

    let mut env = Env::new();
    env.set_var(ROUTES_KEY, routes);

    if let Some(prefixes) = &args.asset_prefixes {
        env.set_var(ASSET_PREFIXES_KEY, prefixes.clone());
    }

    for binding in &args.bindings {
        let (name, base) = binding.split_once('=').ok_or_else(|| {
            ProxyError::config(format!(
                "Invalid binding '{}': expected NAME=BASE_URL",
                binding
            ))
        })?;
        let base = Url::parse(base).map_err(|e| {
            ProxyError::config(format!("Invalid base URL for binding '{}': {}", name, e))
        })?;
        env.set_binding(name.to_string(), Arc::new(HttpFetcher::new(base)));
    }

    Ok(env)
}

/// Log the resolved configuration at startup
fn display_startup_info(config: &RequestConfig) {
    info!("Route table ({} routes):", config.routes.len());
    for (i, route) in config.routes.iter().enumerate() {
        info!(
            "  {}. '{}' -> {} (static mount: {}, preload: {})",
            i + 1,
            route.expression(),
            route.binding(),
            route.static_mount().unwrap_or("-"),
            route.preload()
        );
    }
    info!(
        "Asset prefixes: {}",
        config.assets.iter().collect::<Vec<_>>().join(", ")
    );
    if config.smooth_transitions {
        info!("Smooth transitions enabled");
    }
}
