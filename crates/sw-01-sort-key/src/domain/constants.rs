//! # Protocol Constants
//!
//! These values are part of the replay protocol. Changing any of them
//! changes the sort keys of historical interactions and therefore the
//! evaluated state of deployed contracts.

/// Last block height whose interactions carry the all-`9` bucket.
pub const LEGACY_BUCKET_MAX_HEIGHT: u64 = 973_730;

/// Bucket of interactions above [`LEGACY_BUCKET_MAX_HEIGHT`].
pub const DEFAULT_BUCKET: &str = "0000000000000";

/// Bucket of legacy and dummy interactions, and of "last" keys.
pub const LAST_BUCKET: &str = "9999999999999";

/// Smallest hash segment.
pub const SORTING_FIRST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash segment greater than any hex digest.
pub const SORTING_LAST: &str = "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz";

/// Width of the zero-padded height segment.
pub const HEIGHT_WIDTH: usize = 12;
