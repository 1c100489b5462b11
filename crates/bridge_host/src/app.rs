//! Application lifecycle: engine construction, monitoring and shutdown.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::loopback::run_self_test;
use crate::signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use wire_bridge::{HandlerConfig, HandlerStats, MessageHandler, Router};

/// The host process.
///
/// Owns one engine. Transports are attached by the embedding application
/// through [`Application::handler`]; the host itself only keeps the engine
/// healthy until a shutdown signal arrives.
pub struct Application {
    config: AppConfig,
    engine_config: HandlerConfig,
    handler: MessageHandler,
    self_test: bool,
}

impl Application {
    /// Applies CLI overrides to `config`, validates it and builds the engine.
    pub fn new(args: CliArgs, mut config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if args.strict {
            config.protocol.strict_validation = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let engine_config = config.to_handler_config()?;
        let router = Arc::new(Router::with_default_timeout(engine_config.default_timeout()));
        let handler = MessageHandler::new(router, engine_config.clone())?;

        Ok(Self {
            config,
            engine_config,
            handler,
            self_test: args.self_test,
        })
    }

    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        if self.self_test {
            info!("🧪 Running loopback self-test");
            let report = run_self_test(self.engine_config.clone()).await?;
            info!("📊 Self-test report: {}", serde_json::to_string(&report)?);
            return Ok(());
        }

        let cleanup_handle = self.handler.spawn_cleanup_task();
        let monitoring_handle = self.spawn_monitor();

        info!("✅ Bridge host is now running as {}", self.config.protocol.server_type);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown_signal().await?;

        // A second signal skips the graceful path
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up forced shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting immediately");
            std::process::exit(1);
        });

        if let Some(handle) = monitoring_handle {
            handle.abort();
        }
        let rejected = self.handler.shutdown();
        if rejected > 0 {
            warn!("⚠️ {} requests were still pending at shutdown", rejected);
        }
        if tokio::time::timeout(Duration::from_secs(2), cleanup_handle).await.is_err() {
            warn!("⏰ Cleanup task did not stop in time");
        }

        log_final_statistics(&self.handler.get_stats());
        info!("✅ Bridge host shutdown complete");
        Ok(())
    }

    /// Periodic statistics report; disabled when the interval is 0.
    fn spawn_monitor(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval_secs = self.config.logging.stats_interval_secs;
        if interval_secs == 0 {
            return None;
        }
        let handler = self.handler.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            let mut last_received = 0u64;
            interval.tick().await;

            loop {
                interval.tick().await;
                let stats = handler.get_stats();
                let received = stats.messages_received.saturating_sub(last_received);
                last_received = stats.messages_received;

                info!(
                    "📊 Bridge health - {} messages in last {}s | {} pending | {} queued | {} timed out",
                    received,
                    interval_secs,
                    stats.pending_requests,
                    stats.queued_requests,
                    stats.requests_timed_out
                );
                if stats.queued_requests > 0 {
                    warn!(
                        "🔥 {} callers waiting for one of {} request slots",
                        stats.queued_requests, stats.max_concurrent_requests
                    );
                }
            }
        }))
    }

    fn log_configuration_summary(&self) {
        let config = &self.engine_config;
        info!("📋 Configuration Summary:");
        info!("  🏷️ Role: {} (capabilities: {:?})", config.server_type, config.capabilities);
        info!("  🛡️ Strict validation: {}", config.strict_validation);
        info!(
            "  📦 Compression: {} | 🔐 Encryption: {}",
            config.enable_compression, config.enable_encryption
        );
        info!(
            "  ⏱️ Request timeout: {}ms (max {}ms)",
            config.default_timeout_ms, config.max_timeout_ms
        );
        info!(
            "  🚦 Max concurrent requests: {} (queue {})",
            config.max_concurrent_requests, config.request_queue_size
        );
    }
}

fn log_final_statistics(stats: &HandlerStats) {
    info!("📊 Final Statistics:");
    info!("  - Messages sent/received: {}/{}", stats.messages_sent, stats.messages_received);
    info!(
        "  - Requests completed/failed/timed out: {}/{}/{}",
        stats.requests_completed, stats.requests_failed, stats.requests_timed_out
    );
    info!("  - Responses dropped: {}", stats.responses_dropped);
    info!("  - Frames rejected: {}", stats.rejected_messages);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["bridge-host"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_cli_overrides_are_applied() {
        let app =
            Application::new(args(&["--strict", "-l", "debug"]), AppConfig::default()).unwrap();
        assert!(app.handler().config().strict_validation);
        assert_eq!(app.config.logging.level, "debug");
        assert!(app.handler().router().has_system_handler("ping"));
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        assert!(Application::new(args(&["-l", "loud"]), AppConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_self_test_run_completes() {
        let app = Application::new(args(&["--self-test"]), AppConfig::default()).unwrap();
        app.run().await.unwrap();
    }
}
