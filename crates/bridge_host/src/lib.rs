//! # Wire Bridge Host
//!
//! Process wrapper around the [`wire_bridge`] engine: CLI parsing,
//! configuration loading, logging, periodic maintenance and graceful
//! shutdown.
//!
//! ```bash
//! # Run with default configuration (bridge.toml is created if missing)
//! bridge-host
//!
//! # Custom configuration, strict validation, JSON logs
//! bridge-host --config production.toml --strict --json-logs
//!
//! # Check the engine end to end without a network
//! bridge-host --self-test
//!
//! # Create a key for [security].encryption_key
//! bridge-host --generate-key
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod loopback;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;
use tracing::error;

pub use config::{ConfigError, LimitSettings, LoggingSettings, ProtocolSettings, SecuritySettings};

/// Runs the host until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    if args.generate_key {
        println!("{}", config::encode_key(&wire_bridge::codec::encryption::generate_key()));
        return Ok(());
    }

    let config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {e}", args.config_path.display());
            std::process::exit(1);
        }
    };

    let mut logging_settings = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging_settings.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args, config) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
