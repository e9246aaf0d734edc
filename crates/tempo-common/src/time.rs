//! Logical time helpers.
//!
//! All clock objects measure time in milliseconds held as `f64`, matching the
//! host's logical timebase. Durations coming from the host are never rejected;
//! out-of-range values are clamped here and the clamp is logged.

use crate::error::TempoError;
use tracing::debug;

/// Logical time or duration in milliseconds.
pub type Millis = f64;

/// Remaining ramp time below which a ramp counts as finished.
pub const RAMP_EPSILON: Millis = 1e-9;

/// Default polling granularity of a ramp.
pub const DEFAULT_GRAIN: Millis = 20.0;

/// Smallest interval a periodic timer accepts.
pub const MIN_INTERVAL: Millis = 1.0;

/// Clamp a one-shot delay: negative or non-finite values become 0.
#[must_use]
pub fn clamp_delay(value: Millis) -> Millis {
    let clamped = if value.is_finite() { value.max(0.0) } else { 0.0 };
    report_clamp(value, clamped);
    clamped
}

/// Clamp a periodic interval to at least [`MIN_INTERVAL`].
#[must_use]
pub fn clamp_interval(value: Millis) -> Millis {
    let clamped = if value.is_finite() {
        value.max(MIN_INTERVAL)
    } else {
        MIN_INTERVAL
    };
    report_clamp(value, clamped);
    clamped
}

/// Clamp a ramp granularity.
///
/// Non-positive or non-finite values select `default`; anything else is forced
/// to at least 1.
#[must_use]
pub fn clamp_grain(value: Millis, default: Millis) -> Millis {
    let clamped = if !value.is_finite() || value <= 0.0 {
        default.max(1.0)
    } else {
        value.max(1.0)
    };
    report_clamp(value, clamped);
    clamped
}

// NaN never compares equal, so it is always reported.
#[allow(clippy::float_cmp)]
fn report_clamp(value: Millis, clamped: Millis) {
    if value != clamped {
        debug!(error = %TempoError::InvalidDuration { value, clamped }, "duration clamped");
    }
}
