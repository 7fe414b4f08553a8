/// Sign of `v` with `sign(0) == 0`.
///
/// `f64::signum` maps `0.0` to `1.0`, which would bias the sign-agreement
/// counter toward positive steps on coordinates with a vanishing gradient.
pub(crate) fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Soft-threshold shrinkage `sign(v) * max(|v| - lambda, 0)`.
pub fn soft_threshold(v: f64, lambda: f64) -> f64 {
    sign(v) * (v.abs() - lambda).max(0.0)
}

/// Element-wise soft-threshold of `src` into `dst`.
///
/// Panics if the slices differ in length.
pub fn threshold_into(src: &[f64], lambda: f64, dst: &mut [f64]) {
    assert_eq!(src.len(), dst.len(), "threshold length mismatch");
    for (out, &v) in dst.iter_mut().zip(src) {
        *out = soft_threshold(v, lambda);
    }
}

/// Element-wise soft-threshold returning a new vector.
pub fn threshold(v: &[f64], lambda: f64) -> Vec<f64> {
    let mut out = vec![0.0; v.len()];
    threshold_into(v, lambda, &mut out);
    out
}
