//! Strain based behaviours.
//!
//! Every behaviour of this family receives the total strain at the
//! beginning and at the end of the step (stress-free expansions already
//! removed) and returns the Cauchy stress.
use crate::interfaces::BehaviourData;
use nalgebra::DVector;

pub mod linear_elastic;
pub mod mises_plasticity;
pub mod thermo_elastic;

pub use linear_elastic::{Elasticity, OrthotropicElasticity};
pub use mises_plasticity::MisesPlasticity;
pub use thermo_elastic::ThermoElasticity;

pub fn strain_increment(data: &BehaviourData) -> DVector<f64> {
    &data.gradients1 - &data.gradients0
}

/// Lamé coefficients `(lambda, mu)`.
pub fn lame_coefficients(young: f64, nu: f64) -> (f64, f64) {
    (
        young * nu / ((1.0 + nu) * (1.0 - 2.0 * nu)),
        young / (2.0 * (1.0 + nu)),
    )
}
