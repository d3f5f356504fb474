//! Gamma distribution implementation.
//!
//! Distributional parameters:
//! - `concentration`: shape parameter of the distribution (often referred to as alpha)
//! - `rate`: rate = 1 / scale of the distribution (often referred to as beta)

use super::base::{DistributionFamily, ParamDict, Stabilization};
use super::distribution_class::{DistributionClass, DistributionClassArgs};
use crate::config::GammaConfig;
use crate::error::Result;
use crate::utils::{ResponseFn, trigamma};
use ndarray::ArrayView1;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as RandDistribution, Gamma as RandGamma};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Gamma as StatrsGamma};
use statrs::function::gamma::digamma;

const ARG_NAMES: [&str; 2] = ["concentration", "rate"];

/// The two-parameter Gamma family with (concentration, rate) parameterisation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GammaFamily {}

impl GammaFamily {
    /// (concentration, rate), or `None` when fewer than two parameters are given.
    fn unpack(params: &[f64]) -> Option<(f64, f64)> {
        match params {
            [concentration, rate, ..] => Some((*concentration, *rate)),
            _ => None,
        }
    }

    fn dist(params: &[f64]) -> Option<StatrsGamma> {
        let (concentration, rate) = Self::unpack(params)?;
        if concentration <= 0.0 || rate <= 0.0 {
            return None;
        }
        StatrsGamma::new(concentration, rate).ok()
    }
}

#[typetag::serde]
impl DistributionFamily for GammaFamily {
    fn clone_box(&self) -> Box<dyn DistributionFamily> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "Gamma"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &ARG_NAMES
    }

    fn in_support(&self, y: f64) -> bool {
        y >= 0.0
    }

    fn log_prob(&self, params: &[f64], y: f64) -> f64 {
        match Self::dist(params) {
            Some(dist) => dist.ln_pdf(y),
            None => f64::NEG_INFINITY,
        }
    }

    /// ∂ℓ/∂α = ln β - ψ(α) + ln y, ∂ℓ/∂β = α/β - y
    fn grad_log_prob(&self, params: &[f64], y: f64) -> Vec<f64> {
        let Some((concentration, rate)) = Self::unpack(params) else {
            return vec![f64::NAN; ARG_NAMES.len()];
        };
        vec![
            rate.ln() - digamma(concentration) + y.ln(),
            concentration / rate - y,
        ]
    }

    /// ∂²ℓ/∂α² = -ψ₁(α), ∂²ℓ/∂β² = -α/β²
    fn hess_log_prob(&self, params: &[f64], _y: f64) -> Vec<f64> {
        let Some((concentration, rate)) = Self::unpack(params) else {
            return vec![f64::NAN; ARG_NAMES.len()];
        };
        vec![-trigamma(concentration), -concentration / (rate * rate)]
    }

    fn cdf(&self, params: &[f64], y: f64) -> f64 {
        match Self::dist(params) {
            Some(dist) => dist.cdf(y),
            None => f64::NAN,
        }
    }

    fn quantile(&self, params: &[f64], q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) {
            return f64::NAN;
        }
        match Self::dist(params) {
            Some(dist) => dist.inverse_cdf(q),
            None => f64::NAN,
        }
    }

    fn sample(&self, params: &[f64], n: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
        let Some((concentration, rate)) = Self::unpack(params) else {
            return vec![f64::NAN; n];
        };
        if concentration <= 0.0 || rate <= 0.0 {
            return vec![f64::NAN; n];
        }
        // rand_distr::Gamma uses shape and scale (1/rate) parameterization
        match RandGamma::new(concentration, 1.0 / rate) {
            Ok(dist) => (0..n).map(|_| dist.sample(rng)).collect(),
            Err(_) => vec![f64::NAN; n],
        }
    }

    /// Method of moments: α = m²/v, β = m/v.
    fn moment_estimates(&self, target: &ArrayView1<f64>) -> Vec<f64> {
        let n = target.len() as f64;
        let mean = target.sum() / n;
        let var = target.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;

        let concentration = mean * mean / var;
        let rate = mean / var;
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if var > 0.0 && valid(concentration) && valid(rate) {
            vec![concentration, rate]
        } else {
            vec![1.0, 1.0]
        }
    }
}

/// Gamma target distribution.
///
/// Binds concentration and rate to one response function and its inverse, and
/// exposes the configured [`DistributionClass`] for training and prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gamma {
    dist_class: DistributionClass,
}

impl Gamma {
    pub fn new(stabilization: Stabilization, response_fn: ResponseFn) -> Self {
        let inverse_response_fn = response_fn.inverse();

        let param_dict: ParamDict<ResponseFn> =
            ARG_NAMES.iter().map(|&name| (name, response_fn)).collect();
        let param_dict_inv: ParamDict<_> =
            ARG_NAMES.iter().map(|&name| (name, inverse_response_fn)).collect();
        let distribution_arg_names: Vec<String> = param_dict.keys().map(str::to_string).collect();

        let dist_class = DistributionClass::from_valid_args(DistributionClassArgs {
            distribution: Box::new(GammaFamily {}),
            univariate: true,
            discrete: false,
            n_dist_param: param_dict.len(),
            stabilization,
            param_dict,
            param_dict_inv,
            distribution_arg_names,
        });

        Self { dist_class }
    }

    /// Build from option names: stabilization "None"/"MAD"/"L2", response "exp"/"softplus".
    pub fn from_strs(stabilization: &str, response_fn: &str) -> Result<Self> {
        let response_fn: ResponseFn = response_fn.parse()?;
        let stabilization: Stabilization = stabilization.parse()?;
        Ok(Self::new(stabilization, response_fn))
    }

    pub fn from_config(config: &GammaConfig) -> Self {
        Self::new(config.stabilization, config.response_fn)
    }

    /// The configured distribution handler.
    pub fn dist_class(&self) -> &DistributionClass {
        &self.dist_class
    }

    pub fn into_dist_class(self) -> DistributionClass {
        self.dist_class
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Self::new(Stabilization::None, ResponseFn::Exp)
    }
}
