//! Size gate: skip objects that are already under the byte budget.
//!
//! Decided from metadata alone, before any download. A size of zero or less
//! means "unknown" and never skips.

/// Default byte budget (600 KiB).
pub const DEFAULT_MAX_BYTES: u64 = 600 * 1024;

/// True when `size_bytes` is known and no larger than `max_bytes`.
///
/// Callers that take the skip path must still write the idempotency marker.
pub fn is_already_small_enough(size_bytes: i64, max_bytes: u64) -> bool {
    u64::try_from(size_bytes).is_ok_and(|size| size > 0 && size <= max_bytes)
}
