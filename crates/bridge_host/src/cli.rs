//! Command-line interface of the bridge host.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "bridge.toml";

/// Command line arguments parsed from user input.
///
/// Every option except `config_path` overrides a value from the
/// configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Whether to reject inbound messages with validation errors
    pub strict: bool,
    /// Run the in-memory loopback self-test and exit
    pub self_test: bool,
    /// Print a fresh base64 encryption key and exit
    pub generate_key: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list; the first item is the program name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            strict: matches.get_flag("strict"),
            self_test: matches.get_flag("self-test"),
            generate_key: matches.get_flag("generate-key"),
        }
    }
}

fn command() -> Command {
    Command::new("Wire Bridge Host")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Hosts the Unified Wire Bridge Protocol engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help(
                    "Reject inbound messages that fail validation instead of accepting them \
                     with warnings",
                )
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("self-test")
                .long("self-test")
                .help("Run a handshake, ping and request between two in-memory engines, then exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-key")
                .long("generate-key")
                .help("Print a new base64 encryption key for [security].encryption_key and exit")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["bridge-host"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("bridge.toml"));
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
        assert!(!args.strict);
        assert!(!args.self_test);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "bridge-host",
            "--config",
            "prod.toml",
            "-l",
            "debug",
            "--json-logs",
            "--strict",
            "--self-test",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("prod.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(args.strict);
        assert!(args.self_test);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(CliArgs::try_parse_from(["bridge-host", "--bind", "0.0.0.0:80"]).is_err());
    }
}
