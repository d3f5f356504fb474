//! Base distribution trait and types.

use crate::error::{LssError, Result};
use ndarray::{Array2, ArrayView1};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stabilization methods for gradients and hessians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stabilization {
    /// No stabilization.
    #[default]
    None,
    /// Median Absolute Deviation stabilization.
    #[serde(rename = "MAD")]
    Mad,
    /// L2 norm stabilization.
    L2,
}

impl Stabilization {
    /// Get the string name of the stabilization method.
    pub fn name(&self) -> &'static str {
        match self {
            Stabilization::None => "None",
            Stabilization::Mad => "MAD",
            Stabilization::L2 => "L2",
        }
    }

    /// Stabilize a derivative matrix column by column, in place.
    pub fn apply(&self, arr: &mut Array2<f64>) {
        match self {
            Stabilization::None => replace_nans_with_mean(arr),
            Stabilization::Mad => stabilize_mad(arr),
            Stabilization::L2 => stabilize_l2(arr),
        }
    }
}

impl FromStr for Stabilization {
    type Err = LssError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "None" => Ok(Stabilization::None),
            "MAD" => Ok(Stabilization::Mad),
            "L2" => Ok(Stabilization::L2),
            _ => Err(LssError::InvalidParameter(
                "Invalid stabilization method. Please choose from 'None', 'MAD' or 'L2'."
                    .to_string(),
            )),
        }
    }
}

impl fmt::Display for Stabilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered mapping from distributional parameter names to functions.
///
/// Keys keep insertion order, so the parameter at position `j` always owns
/// column `j` of a prediction matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDict<F> {
    entries: Vec<(String, F)>,
}

impl<F> ParamDict<F> {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a parameter, replacing the function if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, f: F) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = f,
            None => self.entries.push((name, f)),
        }
    }

    /// Look up the function registered for `name`.
    pub fn get(&self, name: &str) -> Option<&F> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, f)| f)
    }

    /// Parameter names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Functions in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &F> {
        self.entries.iter().map(|(_, f)| f)
    }

    /// (name, function) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &F)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F> Default for ParamDict<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, F> FromIterator<(K, F)> for ParamDict<F> {
    fn from_iter<I: IntoIterator<Item = (K, F)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, f) in iter {
            dict.insert(k, f);
        }
        dict
    }
}

/// Container for gradients and hessians.
#[derive(Debug, Clone)]
pub struct GradientsAndHessians {
    /// Gradients with shape (n_samples, n_params).
    pub gradients: Array2<f64>,
    /// Hessians with shape (n_samples, n_params).
    pub hessians: Array2<f64>,
}

/// A parametric probability family, evaluated on already-transformed parameters.
///
/// Implementations know nothing about response functions or boosting; the
/// [`DistributionClass`](super::DistributionClass) handler wraps a family and
/// takes care of link functions, stabilization and prediction.
#[typetag::serde(tag = "type")]
pub trait DistributionFamily: Send + Sync + fmt::Debug {
    /// Clone the family into a boxed trait object.
    fn clone_box(&self) -> Box<dyn DistributionFamily>;

    /// Get the name of this family (e.g., "Gamma").
    fn name(&self) -> &'static str;

    /// Names of the distributional parameters, in column order.
    fn arg_names(&self) -> &'static [&'static str];

    /// Number of distributional parameters.
    fn n_params(&self) -> usize {
        self.arg_names().len()
    }

    /// Whether `y` lies in the support of the family.
    fn in_support(&self, y: f64) -> bool;

    /// Log density at `y`.
    fn log_prob(&self, params: &[f64], y: f64) -> f64;

    /// First derivative of the log density w.r.t. each parameter.
    fn grad_log_prob(&self, params: &[f64], y: f64) -> Vec<f64>;

    /// Diagonal second derivatives of the log density w.r.t. each parameter.
    fn hess_log_prob(&self, params: &[f64], y: f64) -> Vec<f64>;

    /// Cumulative distribution function at `y`.
    fn cdf(&self, params: &[f64], y: f64) -> f64;

    /// Quantile function for `q` in [0, 1].
    fn quantile(&self, params: &[f64], q: f64) -> f64;

    /// Draw `n` samples for one observation.
    fn sample(&self, params: &[f64], n: usize, rng: &mut ChaCha8Rng) -> Vec<f64>;

    /// Unconditional parameter estimates from target moments, on the parameter scale.
    fn moment_estimates(&self, target: &ArrayView1<f64>) -> Vec<f64>;
}

impl Clone for Box<dyn DistributionFamily> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Replace non-finite values in array with column means.
pub(crate) fn replace_nans_with_mean(arr: &mut Array2<f64>) {
    for mut col in arr.columns_mut() {
        let valid: Vec<f64> = col.iter().filter(|v| v.is_finite()).copied().collect();
        let mean = if valid.is_empty() {
            0.0
        } else {
            valid.iter().sum::<f64>() / valid.len() as f64
        };
        for v in col.iter_mut() {
            if !v.is_finite() {
                *v = mean;
            }
        }
    }
}

/// MAD stabilization.
fn stabilize_mad(arr: &mut Array2<f64>) {
    replace_nans_with_mean(arr);

    for mut col in arr.columns_mut() {
        let median = compute_median(&col.to_vec());
        let deviations: Vec<f64> = col.iter().map(|&v| (v - median).abs()).collect();
        let mad = compute_median(&deviations).max(1e-4);

        col.mapv_inplace(|v| v / mad);
    }
}

/// L2 stabilization.
fn stabilize_l2(arr: &mut Array2<f64>) {
    replace_nans_with_mean(arr);

    for mut col in arr.columns_mut() {
        let sum_sq: f64 = col.iter().map(|v| v * v).sum();
        let l2 = (sum_sq / col.len() as f64).sqrt().clamp(1e-4, 10000.0);

        col.mapv_inplace(|v| v / l2);
    }
}

/// Compute median of the finite values in a slice.
pub(crate) fn compute_median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().filter(|v| v.is_finite()).copied().collect();
    if sorted.is_empty() {
        return 0.0;
    }

    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Linear interpolation between order statistics, `sorted` ascending.
pub(crate) fn interpolated_quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
