//! Utility functions for parameter transformations.
//!
//! Response functions map unconstrained raw predictions onto the positive
//! reals; their inverses (link functions) map parameter values back. Both
//! sides are closed enums so a distribution picks its pair from a fixed table
//! instead of by name lookup at runtime.

use crate::error::{LssError, Result};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response function types for transforming distributional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFn {
    /// Exponential transformation for strictly positive values.
    Exp,
    /// Softplus transformation for strictly positive values.
    Softplus,
}

/// Inverse response (link) functions, mapping parameters back to raw space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverseResponseFn {
    /// Natural logarithm, inverse of [`ResponseFn::Exp`].
    Log,
    /// Inverse softplus, inverse of [`ResponseFn::Softplus`].
    SoftplusInv,
}

/// Fixed table of accepted response-function names and their (response, inverse) pairs.
pub const RESPONSE_FN_TABLE: [(&str, ResponseFn, InverseResponseFn); 2] = [
    ("exp", ResponseFn::Exp, InverseResponseFn::Log),
    ("softplus", ResponseFn::Softplus, InverseResponseFn::SoftplusInv),
];

impl ResponseFn {
    /// Get the string name of the response function.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseFn::Exp => "exp",
            ResponseFn::Softplus => "softplus",
        }
    }

    /// The matching inverse response function.
    pub fn inverse(&self) -> InverseResponseFn {
        match self {
            ResponseFn::Exp => InverseResponseFn::Log,
            ResponseFn::Softplus => InverseResponseFn::SoftplusInv,
        }
    }

    /// Apply the response function to an array of values.
    pub fn apply(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        match self {
            ResponseFn::Exp => exp_fn(x),
            ResponseFn::Softplus => softplus_fn(x),
        }
    }

    /// Apply the response function to a single value.
    pub fn apply_scalar(&self, x: f64) -> f64 {
        match self {
            ResponseFn::Exp => exp_scalar(x),
            ResponseFn::Softplus => softplus_scalar(x),
        }
    }

    /// Compute the derivative of the response function at x.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ResponseFn::Exp => x.exp(),
            // d/dx softplus(x) = sigmoid(x)
            ResponseFn::Softplus => sigmoid(x),
        }
    }

    /// Compute the second derivative of the response function at x.
    pub fn second_derivative(&self, x: f64) -> f64 {
        match self {
            ResponseFn::Exp => x.exp(),
            ResponseFn::Softplus => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
        }
    }
}

impl FromStr for ResponseFn {
    type Err = LssError;

    fn from_str(s: &str) -> Result<Self> {
        RESPONSE_FN_TABLE
            .iter()
            .find(|(name, _, _)| *name == s)
            .map(|&(_, f, _)| f)
            .ok_or_else(|| {
                LssError::InvalidParameter(
                    "Invalid response function. Please choose from 'exp' or 'softplus'."
                        .to_string(),
                )
            })
    }
}

impl fmt::Display for ResponseFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl InverseResponseFn {
    /// Get the string name of the inverse response function.
    pub fn name(&self) -> &'static str {
        match self {
            InverseResponseFn::Log => "log",
            InverseResponseFn::SoftplusInv => "softplus_inv",
        }
    }

    /// Apply the inverse response function to an array of values.
    pub fn apply(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        match self {
            InverseResponseFn::Log => log_fn(x),
            InverseResponseFn::SoftplusInv => softplusinv_fn(x),
        }
    }

    /// Apply the inverse response function to a single value.
    pub fn apply_scalar(&self, x: f64) -> f64 {
        match self {
            InverseResponseFn::Log => log_scalar(x),
            InverseResponseFn::SoftplusInv => softplusinv_scalar(x),
        }
    }
}

impl fmt::Display for InverseResponseFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const EPSILON: f64 = 1e-6;

/// Replace NaN and infinity values with the mean of the finite values.
pub fn nan_to_num(x: &ArrayView1<f64>) -> Array1<f64> {
    let valid_values: Vec<f64> = x.iter().filter(|v| v.is_finite()).copied().collect();
    let mean = if valid_values.is_empty() {
        0.0
    } else {
        valid_values.iter().sum::<f64>() / valid_values.len() as f64
    };

    x.mapv(|v| if v.is_finite() { v } else { mean })
}

/// [`nan_to_num`] on a one-element column: a lone non-finite value has no
/// finite neighbours to average, so it becomes 0.
fn nan_to_num_scalar(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ============================================================================
// Array functions
// ============================================================================

/// Exponential function for strictly positive values.
pub fn exp_fn(x: &ArrayView1<f64>) -> Array1<f64> {
    nan_to_num(x).mapv(|v| v.exp() + EPSILON)
}

/// Natural logarithm, the link for [`exp_fn`].
pub fn log_fn(x: &ArrayView1<f64>) -> Array1<f64> {
    nan_to_num(x).mapv(|v| (v + EPSILON).ln())
}

/// Softplus function for strictly positive values.
/// softplus(x) = ln(1 + exp(x))
pub fn softplus_fn(x: &ArrayView1<f64>) -> Array1<f64> {
    nan_to_num(x).mapv(softplus_scalar)
}

/// Inverse softplus, the link for [`softplus_fn`].
/// softplus_inv(x) = x + ln(-expm1(-x))
pub fn softplusinv_fn(x: &ArrayView1<f64>) -> Array1<f64> {
    nan_to_num(x).mapv(softplusinv_scalar)
}

// ============================================================================
// Scalar functions
// ============================================================================

fn exp_scalar(x: f64) -> f64 {
    nan_to_num_scalar(x).exp() + EPSILON
}

fn log_scalar(x: f64) -> f64 {
    (nan_to_num_scalar(x) + EPSILON).ln()
}

fn softplus_scalar(x: f64) -> f64 {
    let x = nan_to_num_scalar(x);
    // Numerically stable softplus
    if x > 20.0 {
        x + EPSILON
    } else if x < -20.0 {
        EPSILON
    } else {
        x.exp().ln_1p() + EPSILON
    }
}

fn softplusinv_scalar(x: f64) -> f64 {
    let x = nan_to_num_scalar(x);
    x + (-(-x).exp_m1()).ln()
}

// ============================================================================
// Special functions
// ============================================================================

/// Trigamma function, the derivative of digamma.
///
/// Shifts the argument above 6 with the recurrence
/// ψ₁(x) = ψ₁(x + 1) + 1/x², then evaluates the asymptotic series.
pub fn trigamma(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        return f64::NAN;
    }
    if x <= 0.0 && x.floor() == x {
        return f64::INFINITY;
    }
    if x < 0.0 {
        // Reflection: ψ₁(1 - x) + ψ₁(x) = π² / sin²(πx)
        let s = (std::f64::consts::PI * x).sin();
        return -trigamma(1.0 - x) + std::f64::consts::PI.powi(2) / (s * s);
    }

    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }

    let inv = 1.0 / x;
    let inv2 = inv * inv;
    // 1/x + 1/(2x²) + 1/(6x³) - 1/(30x⁵) + 1/(42x⁷) - 1/(30x⁹) + 5/(66x¹¹)
    let series = inv
        + 0.5 * inv2
        + inv * inv2
            * (1.0 / 6.0
                + inv2 * (-1.0 / 30.0 + inv2 * (1.0 / 42.0 + inv2 * (-1.0 / 30.0 + inv2 * 5.0 / 66.0))));
    acc + series
}
