//! DCAuth - Directory-backed authentication gateway
//!
//! Checks credentials against an LDAP directory and issues signed tokens.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dcauth_core::config::{LoggingConfig, ServerConfig};
use dcauth_core::{ConfigSource, FileConfigSource, LayeredConfig, MapConfigSource};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Used when `--config` is not given and the file exists
const DEFAULT_CONFIG_FILE: &str = "dcauth.toml";

#[derive(Parser)]
#[command(name = "dcauth")]
#[command(author = "DCAuth Team")]
#[command(version = dcauth_core::VERSION)]
#[command(about = "Directory-backed authentication gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DCAUTH_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "DCAUTH_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "DCAUTH_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DCAUTH_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default)
    Serve,

    /// Authenticate one credential and print the response
    Check {
        /// Username (`DOMAIN\user`, `user@domain` or `user`)
        username: String,

        /// Domain override
        #[arg(short, long)]
        domain: Option<String>,

        /// Password; read from stdin when omitted
        #[arg(long, env = "DCAUTH_CHECK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Validate a token with the configured key and print its claims
    VerifyToken {
        token: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config: Arc<dyn ConfigSource> = Arc::new(load_config(cli.config.as_deref())?);

    init_logging(&LoggingConfig::from_source(config.as_ref()), cli.log_level.as_deref());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let mut server = ServerConfig::from_source(config.as_ref())?;
            if let Some(bind) = cli.bind {
                server.bind_address = bind;
            }
            if let Some(port) = cli.port {
                server.port = port;
            }

            print_banner();
            commands::serve::execute(config, server).await?;
        }
        Commands::Check {
            username,
            domain,
            password,
        } => {
            let authenticated =
                commands::check::execute(config, username, domain, password).await?;
            if !authenticated {
                std::process::exit(1);
            }
        }
        Commands::VerifyToken { token } => {
            commands::verify_token::execute(config.as_ref(), &token)?;
        }
        Commands::Version => {
            println!("dcauth {}", dcauth_core::VERSION);
        }
    }

    Ok(())
}

/// Structured store from `path` (or `dcauth.toml` when present), overlaid
/// with environment variables outside development
fn load_config(path: Option<&str>) -> anyhow::Result<LayeredConfig> {
    let store: Box<dyn ConfigSource> = match path {
        Some(path) => Box::new(
            FileConfigSource::from_file(path)
                .with_context(|| format!("loading configuration from {}", path))?,
        ),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Box::new(
            FileConfigSource::from_file(DEFAULT_CONFIG_FILE)
                .with_context(|| format!("loading configuration from {}", DEFAULT_CONFIG_FILE))?,
        ),
        None => Box::new(MapConfigSource::new()),
    };

    Ok(LayeredConfig::new(store))
}

fn init_logging(logging: &LoggingConfig, level_override: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(level_override.unwrap_or(logging.level.as_str()))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_json() {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn print_banner() {
    println!(
        r#"
    ____   ____    _         _   _
   |  _ \ / ___|  / \  _   _| |_| |__
   | | | | |     / _ \| | | | __| '_ \
   | |_| | |___ / ___ \ |_| | |_| | | |
   |____/ \____/_/   \_\__,_|\__|_| |_|

   Directory-backed authentication gateway
   Version: {}
"#,
        dcauth_core::VERSION
    );
}
