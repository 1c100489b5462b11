//! The known operation vocabulary, one closed enum per message kind.
//!
//! Route tables stay keyed by the raw operation string so applications can
//! bind operations outside this vocabulary; the enums are what the validator
//! whitelists and what the expected-latency table is keyed by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when a string is not part of an operation vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown operation: {0}")]
pub struct UnknownOperation(pub String);

macro_rules! operation_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every operation in this vocabulary.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the wire representation of this operation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownOperation;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownOperation(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

operation_vocabulary! {
    /// Request operations a connector is expected to answer.
    RequestOperation {
        ServerInfo => "server.info",
        ServerStatus => "server.status",
        ServerMetrics => "server.metrics",
        ServerRestart => "server.restart",
        ServerStop => "server.stop",
        PlayerList => "player.list",
        PlayerInfo => "player.info",
        PlayerKick => "player.kick",
        PlayerBan => "player.ban",
        PlayerUnban => "player.unban",
        PlayerMessage => "player.message",
        WhitelistList => "whitelist.list",
        WhitelistAdd => "whitelist.add",
        WhitelistRemove => "whitelist.remove",
        WhitelistEnable => "whitelist.enable",
        WhitelistDisable => "whitelist.disable",
        CommandExecute => "command.execute",
        WorldList => "world.list",
        WorldInfo => "world.info",
        WorldSave => "world.save",
    }
}

operation_vocabulary! {
    /// Event operations with known payload shapes.
    EventOperation {
        PlayerJoin => "player.join",
        PlayerLeave => "player.leave",
        PlayerChat => "player.chat",
        PlayerDeath => "player.death",
        ServerStarted => "server.started",
        ServerStopping => "server.stopping",
        ServerStatus => "server.status",
        WorldSaved => "world.saved",
    }
}

operation_vocabulary! {
    /// Connection-lifecycle operations carried by system messages.
    SystemOp {
        Ping => "ping",
        Pong => "pong",
        Handshake => "handshake",
        Capabilities => "capabilities",
        Disconnect => "disconnect",
        Error => "error",
    }
}

impl SystemOp {
    /// System operations are exempt from the `category.action` form.
    pub fn is_system_operation(op: &str) -> bool {
        op.parse::<SystemOp>().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_round_trips_through_strings() {
        for op in RequestOperation::ALL {
            assert_eq!(op.as_str().parse::<RequestOperation>().unwrap(), *op);
        }
        for op in EventOperation::ALL {
            assert_eq!(op.as_str().parse::<EventOperation>().unwrap(), *op);
        }
        for op in SystemOp::ALL {
            assert_eq!(op.as_str().parse::<SystemOp>().unwrap(), *op);
        }
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_value(SystemOp::Handshake).unwrap(),
            serde_json::json!("handshake")
        );
        let op: RequestOperation =
            serde_json::from_value(serde_json::json!("player.kick")).unwrap();
        assert_eq!(op, RequestOperation::PlayerKick);
    }

    #[test]
    fn test_unknown_operation() {
        let err = "player.teleport".parse::<RequestOperation>().unwrap_err();
        assert_eq!(err, UnknownOperation("player.teleport".to_string()));
        assert!(SystemOp::is_system_operation("pong"));
        assert!(!SystemOp::is_system_operation("system.pong"));
    }
}
