//! Reconnect backoff calculation.
//!
//! Sync-only math; the async sleep that consumes these delays lives in the
//! client crate's reconnection handling.

// ─────────────────────────────────────────────────────────────────────────────
// Calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff delay for a zero-based attempt index.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`.
#[must_use]
pub fn backoff_delay_ms(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
