//! Utility functions shared across the engine.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

const ID_SUFFIX_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Get current timestamp in milliseconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current time truncated to millisecond precision, the precision carried on the wire.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Generates a message identifier of the form `<epoch-millis>-<9 lowercase alnum>`.
///
/// The millisecond prefix makes ids sortable by creation time in logs; the
/// random suffix gives 36^9 combinations per millisecond.
pub fn generate_message_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_CHARSET[rng.gen_range(0..ID_SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("{}-{}", current_timestamp(), suffix)
}

/// Checks the recommended `<digits>-<9 lowercase alnum>` id shape.
pub fn is_canonical_message_id(id: &str) -> bool {
    let Some((prefix, suffix)) = id.split_once('-') else {
        return false;
    };
    !prefix.is_empty()
        && prefix.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == ID_SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_canonical() {
        for _ in 0..100 {
            let id = generate_message_id();
            assert!(is_canonical_message_id(&id), "unexpected id shape: {id}");
        }
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate_message_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_canonical_id_shape() {
        assert!(is_canonical_message_id("1700000000000-abc123xyz"));
        assert!(!is_canonical_message_id("1700000000000-ABC123XYZ"));
        assert!(!is_canonical_message_id("1700000000000-abc"));
        assert!(!is_canonical_message_id("abc-abc123xyz"));
        assert!(!is_canonical_message_id("custom-id"));
        assert!(!is_canonical_message_id("-abc123xyz"));
    }

    #[test]
    fn test_now_millis_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
