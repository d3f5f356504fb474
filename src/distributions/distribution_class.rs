//! Generic distribution handler shared by every target distribution.
//!
//! A [`DistributionClass`] wraps a [`DistributionFamily`] together with the
//! response and inverse response functions of each parameter. It owns all the
//! estimation plumbing: parameter transforms, negative log-likelihood,
//! gradients and hessians for the boosting objective, unconditional start
//! values and predictions.

use super::base::{
    DistributionFamily, GradientsAndHessians, ParamDict, Stabilization, interpolated_quantile,
};
use crate::config::{PredictConfig, StartValueConfig};
use crate::error::{LssError, Result};
use crate::types::ResponseData;
use crate::utils::{InverseResponseFn, ResponseFn};
use argmin::core::{CostFunction, Error as ArgminError, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Prediction types for [`DistributionClass::predict_dist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredType {
    /// Return distributional parameters.
    Parameters,
    /// Draw samples from the predicted distribution.
    Samples,
    /// Calculate quantiles from samples.
    Quantiles,
    /// Return distribution info for PDF/CDF evaluation.
    Distribution,
}

/// Prediction output types.
#[derive(Debug, Clone)]
pub enum PredictionOutput {
    /// Distributional parameters (n_obs x n_params).
    Parameters(Array2<f64>),
    /// Samples drawn from the predicted distribution (n_samples x n_obs).
    Samples(Array2<f64>),
    /// Quantiles computed from samples (n_obs x n_quantiles).
    Quantiles(Array2<f64>),
    /// Distribution info with parameters for PDF/CDF evaluation.
    Distribution(DistributionInfo),
}

/// Distribution information for PDF/CDF evaluation.
#[derive(Debug, Clone)]
pub struct DistributionInfo {
    /// Name of the distribution family (e.g., "Gamma").
    pub dist_name: String,
    /// Predicted parameters (n_obs x n_params).
    pub params: Array2<f64>,
    /// Parameter names in order (e.g., ["concentration", "rate"]).
    pub param_names: Vec<String>,
    /// Whether the distribution is univariate.
    pub is_univariate: bool,
    /// Whether the distribution has discrete support.
    pub is_discrete: bool,
}

/// Arguments for constructing a [`DistributionClass`].
///
/// This is also the wire form of a serialized handler: deserializing a
/// [`DistributionClass`] reads this record and validates it.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionClassArgs {
    /// The underlying probability family.
    pub distribution: Box<dyn DistributionFamily>,
    /// Whether the target is univariate.
    pub univariate: bool,
    /// Whether the family has discrete support.
    pub discrete: bool,
    /// Number of distributional parameters.
    pub n_dist_param: usize,
    /// Stabilization applied to gradients and hessians.
    pub stabilization: Stabilization,
    /// Response function per parameter.
    pub param_dict: ParamDict<ResponseFn>,
    /// Inverse response function per parameter.
    pub param_dict_inv: ParamDict<InverseResponseFn>,
    /// Parameter names, in column order.
    pub distribution_arg_names: Vec<String>,
}

impl DistributionClassArgs {
    /// Check the record is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.n_dist_param != self.param_dict.len() {
            return Err(LssError::InvalidParameter(format!(
                "n_dist_param is {} but param_dict has {} entries",
                self.n_dist_param,
                self.param_dict.len()
            )));
        }
        if self.distribution.n_params() != self.n_dist_param {
            return Err(LssError::InvalidParameter(format!(
                "{} has {} parameters, n_dist_param is {}",
                self.distribution.name(),
                self.distribution.n_params(),
                self.n_dist_param
            )));
        }
        if !self.param_dict_inv.keys().eq(self.param_dict.keys()) {
            return Err(LssError::InvalidParameter(
                "param_dict_inv keys must match param_dict keys".to_string(),
            ));
        }
        if !self
            .distribution_arg_names
            .iter()
            .map(String::as_str)
            .eq(self.param_dict.keys())
        {
            return Err(LssError::InvalidParameter(format!(
                "distribution_arg_names {:?} must equal the param_dict keys in order",
                self.distribution_arg_names
            )));
        }
        Ok(())
    }
}

/// Generic handler binding a probability family to its link functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DistributionClassArgs")]
pub struct DistributionClass {
    distribution: Box<dyn DistributionFamily>,
    univariate: bool,
    discrete: bool,
    n_dist_param: usize,
    stabilization: Stabilization,
    param_dict: ParamDict<ResponseFn>,
    param_dict_inv: ParamDict<InverseResponseFn>,
    distribution_arg_names: Vec<String>,
}

impl DistributionClass {
    /// Create a new handler, validating the configuration record.
    pub fn new(args: DistributionClassArgs) -> Result<Self> {
        args.validate()?;
        Ok(Self::from_valid_args(args))
    }

    /// Build from a record the caller has constructed consistently.
    pub(crate) fn from_valid_args(args: DistributionClassArgs) -> Self {
        debug_assert!(args.validate().is_ok());
        debug!(
            "configured {} distribution: params={:?}, stabilization={}",
            args.distribution.name(),
            args.distribution_arg_names,
            args.stabilization
        );
        Self {
            distribution: args.distribution,
            univariate: args.univariate,
            discrete: args.discrete,
            n_dist_param: args.n_dist_param,
            stabilization: args.stabilization,
            param_dict: args.param_dict,
            param_dict_inv: args.param_dict_inv,
            distribution_arg_names: args.distribution_arg_names,
        }
    }

    pub fn family(&self) -> &dyn DistributionFamily {
        self.distribution.as_ref()
    }

    pub fn is_univariate(&self) -> bool {
        self.univariate
    }

    pub fn is_discrete(&self) -> bool {
        self.discrete
    }

    pub fn n_dist_param(&self) -> usize {
        self.n_dist_param
    }

    pub fn stabilization(&self) -> Stabilization {
        self.stabilization
    }

    pub fn param_dict(&self) -> &ParamDict<ResponseFn> {
        &self.param_dict
    }

    pub fn param_dict_inv(&self) -> &ParamDict<InverseResponseFn> {
        &self.param_dict_inv
    }

    pub fn distribution_arg_names(&self) -> &[String] {
        &self.distribution_arg_names
    }

    /// Serialize the handler to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore a handler from JSON produced by [`to_json`](Self::to_json).
    ///
    /// An inconsistent record is rejected the same way [`new`](Self::new) rejects it.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reshape flat parameter-major raw scores into (n_obs, n_params).
    ///
    /// Boosting libraries hand back multi-output margins as one vector where
    /// all observations of parameter 0 come first, then parameter 1, and so on.
    pub fn raw_from_flat(&self, flat: &ArrayView1<f64>, n_obs: usize) -> Result<Array2<f64>> {
        let by_param = Array2::from_shape_vec((self.n_dist_param, n_obs), flat.to_vec())?;
        Ok(by_param.reversed_axes().as_standard_layout().into_owned())
    }

    /// Transform raw predictions to the parameter space.
    pub fn transform_params(&self, predictions: &ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_n_cols(predictions)?;
        let mut result = Array2::zeros(predictions.dim());
        for (i, response_fn) in self.param_dict.values().enumerate() {
            let transformed = response_fn.apply(&predictions.column(i));
            result.column_mut(i).assign(&transformed);
        }
        Ok(result)
    }

    /// Map parameters back to raw (unconstrained) space.
    pub fn inverse_transform_params(&self, params: &ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_n_cols(params)?;
        let mut result = Array2::zeros(params.dim());
        for (i, inverse_fn) in self.param_dict_inv.values().enumerate() {
            let raw = inverse_fn.apply(&params.column(i));
            result.column_mut(i).assign(&raw);
        }
        Ok(result)
    }

    /// Log density of one observation given transformed parameters.
    pub fn log_prob(&self, params: &[f64], target: f64) -> Result<f64> {
        if params.len() != self.n_dist_param {
            return Err(LssError::ShapeMismatch {
                expected_shape: format!("({},)", self.n_dist_param),
                actual_shape: format!("({},)", params.len()),
            });
        }
        Ok(self.distribution.log_prob(params, target))
    }

    /// Total negative log-likelihood for transformed parameters.
    ///
    /// Returns `+inf` when any target lies outside the family's support.
    pub fn nll(&self, params: &ArrayView2<f64>, target: &ResponseData) -> Result<f64> {
        let y = self.univariate_target(target)?;
        self.check_param_shape(params, y.len())?;

        let mut total = 0.0;
        for (row, &y_val) in params.rows().into_iter().zip(y.iter()) {
            if !self.distribution.in_support(y_val) {
                return Ok(f64::INFINITY);
            }
            let p = row.to_vec();
            total -= self.distribution.log_prob(&p, y_val);
        }
        Ok(total)
    }

    /// Evaluation metric on raw predictions, as (name, value).
    pub fn metric_fn(
        &self,
        predictions: &ArrayView2<f64>,
        target: &ResponseData,
    ) -> Result<(&'static str, f64)> {
        let y = self.univariate_target(target)?;
        self.check_param_shape(predictions, y.len())?;
        let transformed = self.transform_params(predictions)?;
        let nll = self.nll(&transformed.view(), target)?;
        Ok(("nll", nll))
    }

    /// Compute gradients and hessians of the NLL w.r.t. raw predictions.
    ///
    /// Uses the chain rule through each parameter's response function r:
    /// g = -ℓ'(θ) r'(η) and h = -(ℓ''(θ) r'(η)² + ℓ'(θ) r''(η)).
    ///
    /// # Arguments
    /// * `predictions` - Raw predictions with shape (n_samples, n_params)
    /// * `target` - Target values
    /// * `weights` - Optional sample weights
    pub fn compute_gradients_and_hessians(
        &self,
        predictions: &ArrayView2<f64>,
        target: &ResponseData,
        weights: Option<&ArrayView1<f64>>,
    ) -> Result<GradientsAndHessians> {
        let y = self.univariate_target(target)?;
        self.check_param_shape(predictions, y.len())?;
        if let Some(w) = weights {
            if w.len() != y.len() {
                return Err(LssError::ShapeMismatch {
                    expected_shape: format!("({},)", y.len()),
                    actual_shape: format!("({},)", w.len()),
                });
            }
        }

        let n_samples = predictions.nrows();
        let transformed = self.transform_params(predictions)?;
        let response_fns: Vec<ResponseFn> = self.param_dict.values().copied().collect();

        let mut gradients = Array2::zeros((n_samples, self.n_dist_param));
        let mut hessians = Array2::zeros((n_samples, self.n_dist_param));

        for i in 0..n_samples {
            let params = transformed.row(i).to_vec();
            let grad = self.distribution.grad_log_prob(&params, y[i]);
            let hess = self.distribution.hess_log_prob(&params, y[i]);

            for (j, response_fn) in response_fns.iter().enumerate() {
                let eta = predictions[[i, j]];
                let d1 = response_fn.derivative(eta);
                let d2 = response_fn.second_derivative(eta);
                gradients[[i, j]] = -grad[j] * d1;
                hessians[[i, j]] = -(hess[j] * d1 * d1 + grad[j] * d2);
            }
        }

        self.stabilization.apply(&mut gradients);
        self.stabilization.apply(&mut hessians);

        if let Some(w) = weights {
            for (mut g_row, (mut h_row, &wi)) in gradients
                .rows_mut()
                .into_iter()
                .zip(hessians.rows_mut().into_iter().zip(w.iter()))
            {
                g_row.mapv_inplace(|v| v * wi);
                h_row.mapv_inplace(|v| v * wi);
            }
        }

        Ok(GradientsAndHessians {
            gradients,
            hessians,
        })
    }

    /// Calculate unconditional start values for distributional parameters.
    ///
    /// Starts from the family's moment estimates mapped through the inverse
    /// response functions, then refines them with L-BFGS.
    ///
    /// # Returns
    /// Tuple of (loss, start_values) with start values in raw space.
    pub fn calculate_start_values(
        &self,
        target: &ResponseData,
        config: &StartValueConfig,
    ) -> Result<(f64, Array1<f64>)> {
        let y = self.univariate_target(target)?;
        if y.is_empty() {
            return Err(LssError::InvalidInput(
                "cannot compute start values for an empty target".to_string(),
            ));
        }

        let init_params: Vec<f64> = self
            .distribution
            .moment_estimates(y)
            .iter()
            .zip(self.param_dict_inv.values())
            .map(|(&m, inverse_fn)| inverse_fn.apply_scalar(m))
            .collect();

        let problem = StartValueProblem {
            distribution: self.distribution.clone(),
            target: y.to_vec(),
            response_fns: self.param_dict.values().copied().collect(),
        };
        let init_cost = problem.cost(&init_params)?;

        // Set up L-BFGS with More-Thuente line search
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, 7);

        let result = Executor::new(problem, solver)
            .configure(|state| state.param(init_params.clone()).max_iters(config.max_iter))
            .run();

        match result {
            Ok(res) => {
                let best_cost = res.state().get_best_cost();
                let best_params = res.state().get_best_param().cloned();
                match best_params {
                    Some(params)
                        if best_cost.is_finite()
                            && best_cost <= init_cost
                            && params.iter().all(|v| v.is_finite()) =>
                    {
                        debug!("start values converged: loss={best_cost:.6}, params={params:?}");
                        Ok((best_cost, Array1::from_vec(params)))
                    }
                    _ => Ok((init_cost, Array1::from_vec(init_params))),
                }
            }
            Err(e) => {
                warn!("start value optimization failed, using moment estimates: {e}");
                Ok((init_cost, Array1::from_vec(init_params)))
            }
        }
    }

    /// Draw samples given transformed parameters.
    ///
    /// # Returns
    /// Samples with shape (n_samples, n_obs).
    pub fn draw_samples(
        &self,
        params: &ArrayView2<f64>,
        n_samples: usize,
        seed: u64,
    ) -> Result<Array2<f64>> {
        self.check_n_cols(params)?;
        let n_obs = params.nrows();
        let mut result = Array2::zeros((n_samples, n_obs));
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        for (j, row) in params.rows().into_iter().enumerate() {
            let p = row.to_vec();
            let draws = self.distribution.sample(&p, n_samples, &mut rng);
            for (i, v) in draws.into_iter().enumerate() {
                result[[i, j]] = v;
            }
        }
        Ok(result)
    }

    /// Predict from raw scores.
    ///
    /// # Arguments
    /// * `predictions` - Raw predictions (including start values) with shape (n_obs, n_params)
    /// * `pred_type` - What to return
    /// * `config` - Sampling size, quantile levels and seed
    pub fn predict_dist(
        &self,
        predictions: &ArrayView2<f64>,
        pred_type: PredType,
        config: &PredictConfig,
    ) -> Result<PredictionOutput> {
        let params = self.transform_params(predictions)?;

        match pred_type {
            PredType::Parameters => Ok(PredictionOutput::Parameters(params)),

            PredType::Samples => {
                let samples = self.draw_samples(&params.view(), config.n_samples, config.seed)?;
                Ok(PredictionOutput::Samples(samples))
            }

            PredType::Quantiles => {
                if let Some(&q) = config.quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
                    return Err(LssError::InvalidParameter(format!(
                        "quantile {q} is outside [0, 1]"
                    )));
                }
                if config.n_samples == 0 {
                    return Err(LssError::InvalidParameter(
                        "n_samples must be positive for quantile prediction".to_string(),
                    ));
                }

                let samples = self.draw_samples(&params.view(), config.n_samples, config.seed)?;
                let mut quant_result = Array2::zeros((params.nrows(), config.quantiles.len()));

                for (i, col) in samples.columns().into_iter().enumerate() {
                    let mut obs_samples = col.to_vec();
                    obs_samples.sort_by(f64::total_cmp);

                    for (q_idx, &q) in config.quantiles.iter().enumerate() {
                        quant_result[[i, q_idx]] = interpolated_quantile(&obs_samples, q);
                    }
                }
                Ok(PredictionOutput::Quantiles(quant_result))
            }

            PredType::Distribution => Ok(PredictionOutput::Distribution(DistributionInfo {
                dist_name: self.distribution.name().to_string(),
                params,
                param_names: self.distribution_arg_names.clone(),
                is_univariate: self.univariate,
                is_discrete: self.discrete,
            })),
        }
    }

    fn univariate_target<'a>(&self, target: &ResponseData<'a>) -> Result<&'a ArrayView1<'a, f64>> {
        if !self.univariate {
            return Err(LssError::InvalidInput(format!(
                "{} is not configured as univariate",
                self.distribution.name()
            )));
        }
        target.as_univariate()
    }

    fn check_n_cols(&self, arr: &ArrayView2<f64>) -> Result<()> {
        if arr.ncols() != self.n_dist_param {
            return Err(LssError::ShapeMismatch {
                expected_shape: format!("(n, {})", self.n_dist_param),
                actual_shape: format!("{:?}", arr.dim()),
            });
        }
        Ok(())
    }

    fn check_param_shape(&self, arr: &ArrayView2<f64>, n_obs: usize) -> Result<()> {
        if arr.dim() != (n_obs, self.n_dist_param) {
            return Err(LssError::ShapeMismatch {
                expected_shape: format!("({}, {})", n_obs, self.n_dist_param),
                actual_shape: format!("{:?}", arr.dim()),
            });
        }
        Ok(())
    }
}

impl TryFrom<DistributionClassArgs> for DistributionClass {
    type Error = LssError;

    fn try_from(args: DistributionClassArgs) -> Result<Self> {
        Self::new(args)
    }
}

// ============================================================================
// L-BFGS Optimization for Start Values
// ============================================================================

/// Unconditional NLL as a function of raw parameters.
struct StartValueProblem {
    distribution: Box<dyn DistributionFamily>,
    target: Vec<f64>,
    response_fns: Vec<ResponseFn>,
}

impl StartValueProblem {
    fn transform(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter()
            .zip(self.response_fns.iter())
            .map(|(&p, response_fn)| response_fn.apply_scalar(p))
            .collect()
    }
}

impl CostFunction for StartValueProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let transformed = self.transform(params);
        let loss: f64 = self
            .target
            .iter()
            .map(|&y| -self.distribution.log_prob(&transformed, y))
            .sum();

        if loss.is_finite() { Ok(loss) } else { Ok(f64::MAX) }
    }
}

impl Gradient for StartValueProblem {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        let transformed = self.transform(params);
        let mut grad = vec![0.0; params.len()];

        for &y in &self.target {
            let score = self.distribution.grad_log_prob(&transformed, y);
            for (j, g) in grad.iter_mut().enumerate() {
                *g -= score[j] * self.response_fns[j].derivative(params[j]);
            }
        }

        for g in grad.iter_mut() {
            if !g.is_finite() {
                *g = 0.0;
            }
        }
        Ok(grad)
    }
}
