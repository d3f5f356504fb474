//! Distribution implementations for gammalss.
//!
//! [`DistributionFamily`] describes a probability family on its natural
//! parameter scale; [`DistributionClass`] binds a family to response and link
//! functions and runs the estimation; [`Gamma`] configures the Gamma family.

pub mod base;
pub mod distribution_class;
mod gamma;

pub use base::{DistributionFamily, GradientsAndHessians, ParamDict, Stabilization};
pub use distribution_class::{
    DistributionClass, DistributionClassArgs, DistributionInfo, PredType, PredictionOutput,
};
pub use gamma::{Gamma, GammaFamily};
