//! # gammalss
//!
//! Gamma target distribution for distributional gradient boosting (LSS).
//!
//! Instead of a point estimate, the booster predicts both Gamma parameters
//! (`concentration`, `rate`) per observation. This crate binds those
//! parameters to response functions (`exp` or `softplus`) and their inverses,
//! and supplies the [`DistributionClass`](distributions::DistributionClass)
//! handler that turns raw boosting scores into gradients, hessians, start
//! values and predictions.
//!
//! ## Example
//!
//! ```
//! use gammalss::prelude::*;
//! use ndarray::array;
//!
//! let gamma = Gamma::from_strs("MAD", "softplus").unwrap();
//! let dist = gamma.dist_class();
//! assert_eq!(dist.distribution_arg_names(), ["concentration", "rate"]);
//!
//! let y = array![0.5, 1.2, 2.3];
//! let raw = array![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0]];
//! let target = ResponseData::Univariate(&y.view());
//! let derivs = dist
//!     .compute_gradients_and_hessians(&raw.view(), &target, None)
//!     .unwrap();
//! assert_eq!(derivs.gradients.dim(), (3, 2));
//! ```

pub mod config;
pub mod distributions;
pub mod error;
pub mod types;
pub mod utils;

pub mod prelude {
    //! Convenient re-exports of commonly used types.
    pub use crate::config::{GammaConfig, PredictConfig, StartValueConfig};
    pub use crate::distributions::{
        DistributionClass, DistributionFamily, Gamma, GammaFamily, GradientsAndHessians,
        PredType, PredictionOutput, Stabilization,
    };
    pub use crate::error::{LssError, Result};
    pub use crate::types::ResponseData;
    pub use crate::utils::{InverseResponseFn, ResponseFn};
}
