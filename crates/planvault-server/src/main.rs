//! Planvault - Entry point
//!
//! This is the main binary for the planvault service.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info};

use planvault_config::{ConfigLoader, PlanvaultConfig, ENV_PREFIX};
use planvault_server::{telemetry_config, Components, ShutdownSignal};

/// Default configuration file, loaded when present.
const DEFAULT_CONFIG_FILE: &str = "planvault.toml";

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("planvault {}", planvault_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Planvault - Versioned plan store with change indexing

USAGE:
    planvault [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

Without --config, ./planvault.toml is read if it exists. A .env file in the
working directory is loaded before environment overrides are applied.

ENVIRONMENT VARIABLES:
    PLANVAULT__SERVER__HTTP_ADDR              Listen address (default: 0.0.0.0:8080)
    PLANVAULT__PLAN__RESOURCE_TYPE            Storage key prefix (default: plan)
    PLANVAULT__PLAN__SCHEMA_PATH              Custom JSON Schema for plans
    PLANVAULT__STORE__BACKEND                 memory | redis (default: memory)
    PLANVAULT__STORE__REDIS__ADDR             Redis address (default: 127.0.0.1:6379)
    PLANVAULT__STORE__REDIS__POOL_SIZE        Redis connections (default: 8)
    PLANVAULT__QUEUE__BACKEND                 log | rabbitmq | disabled (default: log)
    PLANVAULT__QUEUE__CAPACITY                Intents buffered before dropping (default: 1024)
    PLANVAULT__QUEUE__RABBITMQ__API_URL       RabbitMQ management API URL
    PLANVAULT__QUEUE__RABBITMQ__EXCHANGE      Exchange to publish intents to
    PLANVAULT__AUTH__ENABLED                  Require bearer tokens
    PLANVAULT__AUTH__TOKENS                   Comma-separated accepted tokens
    PLANVAULT__TELEMETRY__LOGGING__LEVEL      Log filter (default: info)
    PLANVAULT__TELEMETRY__LOGGING__FORMAT     json | pretty (default: json)

EXAMPLES:
    # Run with configuration file
    planvault --config /etc/planvault/planvault.toml

    # Run against Redis with environment variables
    PLANVAULT__STORE__BACKEND=redis PLANVAULT__STORE__REDIS__ADDR=redis:6379 planvault
"
    );
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<PlanvaultConfig> {
    let loader = ConfigLoader::new().with_defaults();
    let loader = match path {
        Some(path) => loader
            .with_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };

    let config = loader
        .with_dotenv()?
        .with_env_prefix(ENV_PREFIX)
        .load()
        .context("invalid configuration")?;
    Ok(config)
}

async fn run(config: PlanvaultConfig) -> anyhow::Result<()> {
    let components = Components::build(&config)
        .await
        .context("failed to initialize components")?;

    info!("Starting planvault v{}", planvault_server::VERSION);
    info!(
        addr = %config.server.http_addr,
        store = ?config.store.backend,
        queue = ?config.queue.backend,
        resource_type = %config.plan.resource_type,
        auth = config.auth.enabled,
        "configuration loaded"
    );

    let server = components.server(&config);
    let result = server.run_with_shutdown(ShutdownSignal::with_os_signals()).await;

    components.shutdown().await;
    info!("planvault stopped");
    result.context("server error")
}

#[tokio::main]
async fn main() {
    // Parse arguments
    let args = Args::parse();

    // Load configuration; logging is not up yet, so report to stderr
    let config = match load_config(args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    // Initialize tracing and metrics
    if let Err(e) = planvault_telemetry::init_telemetry(&telemetry_config(&config)) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}
