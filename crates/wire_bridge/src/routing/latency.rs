//! Expected latency of the known request operations.

use crate::message::RequestOperation;
use std::time::Duration;

/// Expected completion time of a known request operation.
///
/// Unknown operations return `None`; callers fall back to their configured
/// default.
pub fn expected_latency(operation: &str) -> Option<Duration> {
    use RequestOperation::*;

    let millis = match operation.parse::<RequestOperation>().ok()? {
        ServerInfo | ServerStatus | PlayerList | PlayerInfo | WhitelistList | WorldList
        | WorldInfo => 5_000,
        PlayerKick | PlayerBan | PlayerUnban | PlayerMessage => 5_000,
        WhitelistAdd | WhitelistRemove | WhitelistEnable | WhitelistDisable => 5_000,
        ServerMetrics | CommandExecute => 10_000,
        ServerStop | WorldSave => 60_000,
        ServerRestart => 120_000,
    };
    Some(Duration::from_millis(millis))
}

/// Resolves the effective timeout of a request.
///
/// Precedence is explicit value, then the latency table, then `default`;
/// the result never exceeds `max`.
pub fn effective_timeout(
    operation: &str,
    explicit: Option<Duration>,
    default: Duration,
    max: Duration,
) -> Duration {
    explicit
        .or_else(|| expected_latency(operation))
        .unwrap_or(default)
        .min(max)
}
