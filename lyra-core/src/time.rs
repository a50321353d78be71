//! Time and duration conversion utilities.
//!
//! Progress values travel through the crate as whole milliseconds (`u64`),
//! while the runtime hands out [`Duration`]s. These helpers convert between
//! the two with explicit saturation instead of silent truncation.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    ///
    /// In practice, this is always safe because durations exceeding `u64::MAX`
    /// milliseconds would represent ~584 million years.
    fn as_millis_u64(&self) -> u64;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Shift a millisecond position by a signed offset, flooring at zero.
#[must_use]
pub const fn apply_offset_ms(position_ms: u64, offset_ms: i64) -> u64 {
    if offset_ms >= 0 {
        position_ms.saturating_add(offset_ms.unsigned_abs())
    } else {
        position_ms.saturating_sub(offset_ms.unsigned_abs())
    }
}
