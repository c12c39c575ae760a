//! Solver-facing layer of constitutive behaviours.
//!
//! A behaviour implements [`interfaces::Behaviour`] once, on canonical
//! quantities: symmetric tensors in the Mandel notation (`xx, yy, zz,
//! sqrt(2) xy, sqrt(2) xz, sqrt(2) yz`, truncated to the modelling
//! hypothesis), non-symmetric tensors in the order `F11 F22 F33 F12 F21 F13
//! F31 F23 F32`. The [`solvers`] modules translate the calling conventions
//! of Castem, Abaqus/Standard, CalculiX, OpenRadioss and of the generic
//! interface to this representation, and [`exports`] provides the
//! corresponding `extern "C"` entry points for the bundled behaviours.
//! [`mtest`] drives a behaviour on a single material point.
//!
//! Errors are [`error::BehaviourError`] values inside the crate. They are
//! converted to the integer status codes of the solvers only at the entry
//! points, where panics are caught as well.
//!
//! # Features
//!
//! - `runtime-checks` (default): the entry points check the number of
//!   material properties, of state variables and the size of the tensors
//!   given by the solver. Without it, inconsistent buffers are a violation of
//!   the caller's contract and are only caught as panics.
pub mod cohesive;
pub mod error;
pub mod exports;
pub mod finite_strain;
pub mod finitestrain;
pub mod hypothesis;
pub mod interfaces;
pub mod logarithmic_strain;
pub mod mandel;
pub mod mtest;
pub mod parameters;
pub mod smallstrain;
pub mod solvers;
pub mod stiffness;
pub mod stress_free_expansion;
pub mod stress_strain;
pub mod tangent_operator;
pub mod views;

pub use error::{BehaviourError, ErrorCategory, Result};
pub use hypothesis::ModellingHypothesis;
pub use interfaces::Behaviour;
pub use parameters::ParameterStore;
