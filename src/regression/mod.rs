//! Linear regression over normalised occurrence counts

pub mod ols;
pub mod surface;

pub use ols::SimpleRegression;
pub use surface::{regression_meta, regression_tile};
