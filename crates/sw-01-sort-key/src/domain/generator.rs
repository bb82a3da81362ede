//! # Sort Key Generation
//!
//! `create_sort_key` is a pure function of (block id, tx id, height): every
//! node computes the same key for the same transaction.

use sha2::{Digest, Sha256};
use shared_types::SortKey;

use super::constants::{
    DEFAULT_BUCKET, HEIGHT_WIDTH, LAST_BUCKET, LEGACY_BUCKET_MAX_HEIGHT, SORTING_FIRST,
    SORTING_LAST,
};

/// Compute the sort key of a transaction.
///
/// `dummy` keys (speculative evaluation) always use the all-`9` bucket so
/// they order after every real key at the same height.
#[must_use]
pub fn create_sort_key(block_id: &str, tx_id: &str, block_height: u64, dummy: bool) -> SortKey {
    let mut hasher = Sha256::new();
    hasher.update(b64_url_to_bytes(block_id));
    hasher.update(b64_url_to_bytes(tx_id));
    let hashed = hex::encode(hasher.finalize());

    SortKey::new(format!(
        "{},{},{}",
        pad_height(block_height),
        bucket_for(block_height, dummy),
        hashed
    ))
}

/// The maximal key at a height: "state as of the end of this block".
#[must_use]
pub fn generate_last_sort_key(block_height: u64) -> SortKey {
    SortKey::new(format!(
        "{},{},{}",
        pad_height(block_height),
        LAST_BUCKET,
        SORTING_LAST
    ))
}

/// The minimal key, ordered before any interaction.
#[must_use]
pub fn genesis_sort_key() -> SortKey {
    SortKey::new(format!("{},{},{}", pad_height(0), DEFAULT_BUCKET, SORTING_FIRST))
}

/// Block height encoded in the first segment of a key.
#[must_use]
pub fn extract_block_height(sort_key: &SortKey) -> Option<u64> {
    sort_key.block_height()
}

fn bucket_for(block_height: u64, dummy: bool) -> &'static str {
    if dummy || block_height <= LEGACY_BUCKET_MAX_HEIGHT {
        LAST_BUCKET
    } else {
        DEFAULT_BUCKET
    }
}

fn pad_height(block_height: u64) -> String {
    format!("{:0>width$}", block_height, width = HEIGHT_WIDTH)
}

/// Decode a base64url id. Ids that do not decode are hashed as raw text.
fn b64_url_to_bytes(value: &str) -> Vec<u8> {
    let trimmed = value.trim_end_matches('=');
    match base64::decode_config(trimmed, base64::URL_SAFE_NO_PAD) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(value, error = %e, "id is not base64url, hashing raw bytes");
            value.as_bytes().to_vec()
        }
    }
}
