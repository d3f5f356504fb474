//! Response variable containers.

use crate::error::{LssError, Result};
use ndarray::{ArrayView1, ArrayView2};

/// Target values handed to a distribution handler.
///
/// Univariate families (such as Gamma) accept only the `Univariate` variant;
/// the multivariate shape exists so the handler can reject it with a typed error
/// instead of a panic.
#[derive(Debug, Clone, Copy)]
pub enum ResponseData<'a> {
    /// A 1-dimensional view of a univariate target variable.
    Univariate(&'a ArrayView1<'a, f64>),
    /// A 2-dimensional view of a multivariate target variable.
    Multivariate(&'a ArrayView2<'a, f64>),
}

impl<'a> ResponseData<'a> {
    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        match self {
            ResponseData::Univariate(y) => y.len(),
            ResponseData::Multivariate(y) => y.nrows(),
        }
    }

    /// Borrow the univariate view, or fail for multivariate targets.
    pub fn as_univariate(&self) -> Result<&'a ArrayView1<'a, f64>> {
        match *self {
            ResponseData::Univariate(y) => Ok(y),
            ResponseData::Multivariate(y) => Err(LssError::InvalidInput(format!(
                "expected a univariate target, got {} columns",
                y.ncols()
            ))),
        }
    }
}
