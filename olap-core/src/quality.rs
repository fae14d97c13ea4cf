//! Quantized error-rate codec
//!
//! Error rates are stored as `round(rate * 1000)` in 16 bits. Values outside
//! the representable range saturate silently.

/// Largest quantized error rate
pub const MAX_ERATE: u16 = u16::MAX;

const SCALE: f32 = 1000.0;

/// Quantize an error rate (fraction, e.g. `0.02` for 2%)
pub fn shrink(rate: f32) -> u16 {
    let x = (rate * SCALE).round();
    if x.is_nan() || x <= 0.0 {
        0
    } else if x >= MAX_ERATE as f32 {
        MAX_ERATE
    } else {
        x as u16
    }
}

/// Expand a quantized error rate back to a fraction
pub fn expand(q: u16) -> f32 {
    q as f32 / SCALE
}

/// Quantize an error rate given in percent
pub fn shrink_percent(percent: f32) -> u16 {
    shrink(0.01 * percent)
}

/// Expand a quantized error rate to percent
pub fn expand_percent(q: u16) -> f32 {
    100.0 * expand(q)
}
