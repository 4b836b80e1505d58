//! Scalar and array numeric helpers
use ndarray::{ArrayD, Axis};

/// Small positive constant keeping logarithms and divisions finite.
pub const EPSILON: f32 = 1e-6;

/// Logistic sigmoid.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^x)` without overflow.
pub fn softplus(x: f32) -> f32 {
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

/// `ln(sigmoid(x))` without underflow.
pub fn log_sigmoid(x: f32) -> f32 {
    -softplus(-x)
}

/// Sign of `x`, with `sign(0) = 0`.
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Log of the sum of exponentials along the last axis (which is removed).
pub fn logsumexp_last(x: &ArrayD<f32>) -> ArrayD<f32> {
    let axis = Axis(x.ndim() - 1);
    x.map_axis(axis, |lane| {
        let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        if max == f32::NEG_INFINITY {
            return f32::NEG_INFINITY;
        }
        max + lane.fold(0.0, |s, &v| s + (v - max).exp()).ln()
    })
}

/// Normalized log-probabilities along the last axis.
pub fn log_softmax_last(x: &ArrayD<f32>) -> ArrayD<f32> {
    let normalizer = logsumexp_last(x).insert_axis(Axis(x.ndim() - 1));
    x - &normalizer
}

/// Natural logarithm of the gamma function.
pub fn ln_gamma(x: f64) -> f64 {
    libm::lgamma(x)
}

/// Digamma function (derivative of `ln_gamma`) for positive arguments.
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    // Shift into the range where the asymptotic series is accurate
    while x < 6.0 {
        result -= x.recip();
        x += 1.0;
    }
    let inv = x.recip();
    let inv2 = inv * inv;
    result + x.ln()
        - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 / 240.0)))
}

/// `ln B(a, b)`, the log of the beta function.
pub fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn sigmoid_is_symmetric() {
        for x in [-30.0_f32, -1.0, 0.0, 2.5, 40.0] {
            assert!((sigmoid(x) + sigmoid(-x) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(-2.0), -1.0);
    }

    #[test]
    fn log_softmax_normalizes() {
        let x = arr2(&[[-1.0_f32, 0.0, 1.0], [f32::NEG_INFINITY, 0.0, 0.0]]).into_dyn();
        let y = log_softmax_last(&x);
        for row in y.outer_iter() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
        assert!((y[[1, 1]] + 2.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn digamma_known_values() {
        // psi(1) = -euler_gamma
        assert!((digamma(1.0) + 0.577_215_664_901_532_9).abs() < 1e-9);
        // psi(0.5) = -euler_gamma - 2 ln 2
        assert!((digamma(0.5) + 0.577_215_664_901_532_9 + 2.0 * 2.0_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn ln_beta_of_ones() {
        assert!(ln_beta(1.0, 1.0).abs() < 1e-12);
        assert!((ln_beta(2.0, 3.0) - (1.0_f64 / 12.0).ln()).abs() < 1e-12);
    }
}
