//! Protocol version constants and the stable command-name vocabulary
//! (spec.md §4.2, §4.8).

/// Oldest protocol version either peer may negotiate down to.
pub const EARLIEST_SUPPORTED_VERSION: i64 = 7;
/// Newest protocol version this implementation understands.
pub const LATEST_SUPPORTED_VERSION: i64 = 9;

/// First version that understands the `idle` keepalive command.
pub const IDLE_COMMAND_MINIMUM_VERSION: i64 = 8;
/// First version that hashes ranges with BLAKE3 instead of xxHash64 (the
/// hash algorithm switch itself lives in the out-of-scope sync subsystem;
/// this constant exists so version-conditional encoders agree on where
/// the cutover falls).
pub const BLAKE3_HASHING_MINIMUM_VERSION: i64 = 9;

pub mod command {
    pub const PROTOCOL: &str = "protocol";
    pub const SCHEMA: &str = "schema";
    pub const QUIT: &str = "quit";
    pub const EXPORT_SNAPSHOT: &str = "export_snapshot";
    pub const IMPORT_SNAPSHOT: &str = "import_snapshot";
    pub const UNHOLD_SNAPSHOT: &str = "unhold_snapshot";
    pub const WITHOUT_SNAPSHOT: &str = "without_snapshot";
    pub const RANGE: &str = "range";
    pub const HASH: &str = "hash";
    pub const ROWS: &str = "rows";
    pub const IDLE: &str = "idle";
    pub const TARGET_BLOCK_SIZE: &str = "target_block_size";
    pub const TARGET_MINIMUM_BLOCK_SIZE: &str = "target_minimum_block_size";
}

/// Given the version a peer proposes, negotiate the version this session
/// will use: the lesser of the proposal and [`LATEST_SUPPORTED_VERSION`].
/// Callers must separately reject the result if it falls below
/// [`EARLIEST_SUPPORTED_VERSION`].
pub fn negotiate(peer_proposed: i64) -> i64 {
    peer_proposed.min(LATEST_SUPPORTED_VERSION)
}

pub fn is_supported(version: i64) -> bool {
    (EARLIEST_SUPPORTED_VERSION..=LATEST_SUPPORTED_VERSION).contains(&version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_takes_the_lesser_version() {
        assert_eq!(negotiate(9), 9);
        assert_eq!(negotiate(20), LATEST_SUPPORTED_VERSION);
        assert_eq!(negotiate(6), 6);
    }

    #[test]
    fn version_6_is_rejected_as_unsupported() {
        assert!(!is_supported(6));
        assert!(is_supported(7));
        assert!(is_supported(9));
        assert!(!is_supported(10));
    }
}
