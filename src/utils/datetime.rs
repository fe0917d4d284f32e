//! Timestamps for resource and grant records.
//!
//! Records encode their timestamps through serde (`#[bincode(with_serde)]`),
//! so any field of this type round-trips through the Sled trees unchanged.

use chrono::{DateTime, SubsecRound, Utc};

/// Type alias for the UTC timestamps carried by Coral records
pub type CoralDateTime = DateTime<Utc>;

/// Current time truncated to microseconds.
///
/// Sub-microsecond precision does not survive every serde format, so records
/// are stamped at a precision that compares equal after a reload.
pub fn now() -> CoralDateTime {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_current() {
        let diff = (now().timestamp() - Utc::now().timestamp()).abs();
        assert!(diff < 2, "Timestamps should be within 2 seconds");
    }

    #[test]
    fn test_now_survives_bincode() {
        let stamp = now();
        let bytes = bincode::serde::encode_to_vec(stamp, bincode::config::standard()).unwrap();
        let (decoded, _): (CoralDateTime, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, stamp);
    }
}
