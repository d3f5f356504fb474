//! Configuration records.
//!
//! Everything here is plain data with `Default` and serde support, so the same
//! settings can be built in code or loaded from a JSON file.

use crate::distributions::Stabilization;
use crate::error::{LssError, Result};
use crate::utils::ResponseFn;
use serde::{Deserialize, Serialize};

/// Settings for the Gamma target distribution.
///
/// Option names go through the same `FromStr` parsing as
/// [`Gamma::from_strs`](crate::distributions::Gamma::from_strs), so an unknown
/// name is an [`LssError::InvalidParameter`] however the config is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GammaConfigNames")]
pub struct GammaConfig {
    /// Stabilization method for the gradient and hessian.
    pub stabilization: Stabilization,
    /// Response function shared by concentration and rate.
    pub response_fn: ResponseFn,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            stabilization: Stabilization::None,
            response_fn: ResponseFn::Exp,
        }
    }
}

impl GammaConfig {
    /// Parse from JSON, e.g. `{"stabilization": "MAD", "response_fn": "softplus"}`.
    ///
    /// Missing fields fall back to their defaults; unknown names are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let names: GammaConfigNames = serde_json::from_str(json)?;
        Self::try_from(names)
    }
}

/// Option names as they appear in a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GammaConfigNames {
    stabilization: Option<String>,
    response_fn: Option<String>,
}

impl TryFrom<GammaConfigNames> for GammaConfig {
    type Error = LssError;

    fn try_from(names: GammaConfigNames) -> Result<Self> {
        let defaults = Self::default();
        let response_fn = match names.response_fn {
            Some(name) => name.parse()?,
            None => defaults.response_fn,
        };
        let stabilization = match names.stabilization {
            Some(name) => name.parse()?,
            None => defaults.stabilization,
        };
        Ok(Self {
            stabilization,
            response_fn,
        })
    }
}

/// Settings for [`DistributionClass::calculate_start_values`](crate::distributions::DistributionClass::calculate_start_values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartValueConfig {
    /// Maximum number of L-BFGS iterations.
    pub max_iter: u64,
}

impl Default for StartValueConfig {
    fn default() -> Self {
        Self { max_iter: 50 }
    }
}

/// Settings for [`DistributionClass::predict_dist`](crate::distributions::DistributionClass::predict_dist).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    /// Number of samples drawn per observation.
    pub n_samples: usize,
    /// Quantile levels in [0, 1].
    pub quantiles: Vec<f64>,
    /// Random seed.
    pub seed: u64,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            quantiles: vec![0.1, 0.5, 0.9],
            seed: 123,
        }
    }
}
