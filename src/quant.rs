//! Affine Quantization Parameters
//!
//! Maps an observed float range onto an integer range so that
//! `value ≈ scale * (quantized - zero_point)`.
//!
//! Degenerate ranges are normalized rather than rejected: an all-zero range
//! gets a scale of 0.1, and ranges too narrow for the small-scale threshold
//! are widened until the scale equals the threshold exactly.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TeselaError};
use crate::types::ScalarType;

/// Smallest scale used before the range is widened (fp16 normal minimum)
pub const SMALL_SCALE_THRESHOLD: f32 = 6.1e-5;

/// Scale used when the observed range is empty
const DEGENERATE_SCALE: f64 = 0.1;

/// Affine quantization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Step between adjacent quantized values
    pub scale: f32,
    /// Quantized value representing real zero
    pub zero_point: i32,
}

/// Choose `(scale, zero_point)` for the range `[min_val, max_val]` over the
/// integer range `[qmin, qmax]`.
///
/// ```
/// use tesela::quant::{choose_qparams, SMALL_SCALE_THRESHOLD};
///
/// let params = choose_qparams(0.0, 0.0, -128, 127, SMALL_SCALE_THRESHOLD);
/// assert_eq!(params.scale, 0.1);
/// ```
///
/// # Panics
///
/// Panics if `qmin >= qmax`.
#[must_use]
pub fn choose_qparams(min_val: f32, max_val: f32, qmin: i64, qmax: i64, eps: f32) -> QuantParams {
    assert!(qmin < qmax, "quantized range [{qmin}, {qmax}] is empty");

    // Zero must be exactly representable
    let mut min_val = min_val.min(0.0);
    let mut max_val = max_val.max(0.0);
    let qrange = (qmax - qmin) as f64;

    let mut scale = (f64::from(max_val) - f64::from(min_val)) / qrange;
    if scale as f32 == 0.0 || (1.0 / scale as f32).is_infinite() {
        scale = DEGENERATE_SCALE;
    }

    if scale < f64::from(eps) {
        let org_scale = scale;
        scale = f64::from(eps);
        if min_val == 0.0 {
            max_val = (f64::from(eps) * qrange) as f32;
        } else if max_val == 0.0 {
            min_val = (-f64::from(eps) * qrange) as f32;
        } else {
            let amplifier = f64::from(eps) / org_scale;
            min_val = (f64::from(min_val) * amplifier) as f32;
            max_val = (f64::from(max_val) * amplifier) as f32;
        }
    }

    let min_scaled = f64::from(min_val) / scale;
    let max_scaled = f64::from(max_val) / scale;
    let zero_point_from_min = qmin as f64 - min_scaled;
    let zero_point_from_max = qmax as f64 - max_scaled;
    let zero_point_from_min_error = (qmin as f64).abs() - min_scaled.abs();
    let zero_point_from_max_error = (qmax as f64).abs() - max_scaled.abs();

    let initial_zero_point = if zero_point_from_min_error < zero_point_from_max_error {
        zero_point_from_min
    } else {
        zero_point_from_max
    };

    let zero_point = initial_zero_point
        .clamp(qmin as f64, qmax as f64)
        .round_ties_even() as i32;

    QuantParams {
        scale: scale as f32,
        zero_point,
    }
}

/// [`choose_qparams`] over the representable range of `dtype`.
///
/// # Errors
///
/// Returns [`TeselaError::UnsupportedDtype`] for dtypes without an integer
/// range (floats, bool, 64-bit ints).
pub fn choose_qparams_for(dtype: ScalarType, min_val: f32, max_val: f32, eps: f32) -> Result<QuantParams> {
    let (qmin, qmax) = dtype.quant_range().ok_or(TeselaError::UnsupportedDtype {
        operation: "quantization",
        dtype,
    })?;
    Ok(choose_qparams(min_val, max_val, qmin, qmax, eps))
}

/// [`choose_qparams_for`] using the observed range of `data`.
///
/// An empty slice is treated as the range `[0, 0]`.
///
/// # Errors
///
/// Returns [`TeselaError::UnsupportedDtype`] for dtypes without an integer
/// range.
pub fn choose_qparams_from_data(dtype: ScalarType, data: &[f32], eps: f32) -> Result<QuantParams> {
    let (min_val, max_val) = data
        .iter()
        .fold((0.0f32, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    choose_qparams_for(dtype, min_val, max_val, eps)
}

/// Quantize one value, saturating to `[qmin, qmax]`
#[must_use]
pub fn quantize_value(value: f32, params: QuantParams, qmin: i64, qmax: i64) -> i64 {
    let q = (f64::from(value) / f64::from(params.scale)).round_ties_even() as i64
        + i64::from(params.zero_point);
    q.clamp(qmin, qmax)
}

/// Recover the real value of a quantized one
#[must_use]
pub fn dequantize_value(quantized: i64, params: QuantParams) -> f32 {
    ((quantized - i64::from(params.zero_point)) as f64 * f64::from(params.scale)) as f32
}
