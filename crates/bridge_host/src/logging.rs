//! Logging setup for the bridge host.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either
//! a human-readable or a JSON formatting layer.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber for the host and the engine.
///
/// # Arguments
///
/// * `config` - The `[logging]` section, with any `--log-level` override applied
/// * `json_format` - Forces JSON output (`--json-logs`) regardless of `config`
///
/// # Returns
///
/// `Ok(())` once the subscriber is installed. Fails when a global subscriber
/// already exists, so this runs once per process.
///
/// `RUST_LOG` wins over the configured level when it is set, which allows
/// e.g. `RUST_LOG=wire_bridge=trace` to follow routing without touching the
/// config file.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Logs the startup banner with the protocol and host versions.
pub fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║           🌉 WIRE BRIDGE HOST 🌉         ║");
    info!("║   Unified Wire Bridge Protocol v{}      ║", wire_bridge::PROTOCOL_VERSION);
    info!("║   Host v{:<33}║", version);
    info!("╚══════════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_setup_is_refused() {
        let settings = LoggingSettings::default();
        // Another test may have installed a subscriber first; either way the
        // process ends up with exactly one.
        let _ = setup_logging(&settings, false);
        assert!(setup_logging(&settings, true).is_err());
    }
}
