//! Finite strain behaviours.
//!
//! Driving variables are the deformation gradients at the beginning and at
//! the end of the step (canonical tensor ordering), the thermodynamic force
//! is the Cauchy stress. Computations are carried out in 3D and truncated to
//! the modelling hypothesis.
use crate::error::Result;
use crate::interfaces::BehaviourData;
use crate::mandel;
use nalgebra::{DMatrix, DVector, SMatrix};

pub mod hencky;
pub mod saint_venant_kirchhoff;

pub use hencky::HenckyElasticity;
pub use saint_venant_kirchhoff::SaintVenantKirchhoff;

/// Truncates a 3D Mandel stensor to the stensor size of the hypothesis.
pub(crate) fn to_hypothesis(data: &BehaviourData, v: &nalgebra::SVector<f64, 6>) -> Result<DVector<f64>> {
    mandel::mandel3d_to_stensor(v, data.hypothesis)
}

pub(crate) fn to_dynamic(k: &SMatrix<f64, 6, 6>, n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| k[(i, j)])
}
