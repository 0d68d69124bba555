//! Payment references
//!
//! `{prefix}-{millis}-{random}`. One per payment attempt; it is the
//! idempotency key for verification and is stored on the order.

use shared::util::{now_millis, random_suffix};

pub const DEFAULT_PREFIX: &str = "MKT";
const RANDOM_LEN: usize = 8;

pub fn generate_reference(prefix: &str) -> String {
    format!("{prefix}-{}-{}", now_millis(), random_suffix(RANDOM_LEN))
}

/// Shape check for references arriving from the outside (callbacks, API)
pub fn is_well_formed(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
