//! Generic interface.
//!
//! The caller exchanges canonical (Mandel) quantities through a pair of
//! states, one at the beginning and one at the end of the time step. The
//! temperature is the first external state variable. `K[0]` holds the
//! stiffness request code; for finite strain behaviours `K[1]` selects the
//! stress measure (0 Cauchy, 1 second Piola-Kirchhoff) and `K[2]` the
//! tangent operator (0 `DSIG_DF`, 1 `DS_DEGL`). On output `K` holds the
//! tangent operator, row-major.
//!
//! The entry point returns 1 on success, 0 on success with a proposed time
//! step scaling factor below 0.99, and -1 on failure, the error message
//! being copied into the caller's buffer.
use crate::error::{BehaviourError, Result};
use crate::finite_strain::{cauchy_to_pk2, pk2_to_cauchy};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{Behaviour, BehaviourType, PropertyRole, TangentOperatorFlag};
use crate::mandel;
use crate::parameters::ParameterStore;
use crate::solvers::dispatch::{self, BufferSizes};
use crate::solvers::handler::{self, HandlerInput, HandlerOptions, StepOutcome, StepOutput};
use crate::solvers::{behaviour_properties, decode_stiffness_request, out_of_bounds_policy, SolverPolicy};
use crate::stress_free_expansion::{
    FiniteStrainStressFreeExpansionHandler, SmallStrainStressFreeExpansionHandler,
    StressFreeExpansionHandler,
};
use crate::views::{self, SolverConvention, StorageOrder};
use nalgebra::{DVector, Matrix3};
use std::os::raw::c_char;

pub struct Generic;

impl SolverPolicy for Generic {
    const NAME: &'static str = "Generic";
    const STRAIN_CONVENTION: SolverConvention = SolverConvention::Mandel;
    const STRESS_CONVENTION: SolverConvention = SolverConvention::Mandel;
    const STORAGE_ORDER: StorageOrder = StorageOrder::RowMajor;
    const FINITE_STRAIN_TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::DSIG_DF;
}

/// Size of the error message buffer, terminating null byte included.
pub const ERROR_MESSAGE_LENGTH: usize = 512;

/// Proposed time step scaling factors below this value are reported.
const RDT_THRESHOLD: f64 = 0.99;

#[repr(C)]
#[derive(Debug)]
pub struct GenericState {
    pub gradients: *mut f64,
    pub thermodynamic_forces: *mut f64,
    pub material_properties: *mut f64,
    pub internal_state_variables: *mut f64,
    pub stored_energy: *mut f64,
    pub dissipated_energy: *mut f64,
    pub external_state_variables: *mut f64,
}

#[repr(C)]
#[derive(Debug)]
pub struct GenericBehaviourData {
    pub error_message: *mut c_char,
    pub dt: f64,
    pub k: *mut f64,
    pub rdt: *mut f64,
    pub speed_of_sound: *mut f64,
    pub s0: GenericState,
    pub s1: GenericState,
}

/// Safe view of a [`GenericBehaviourData`].
#[derive(Debug)]
pub struct GenericCall<'a> {
    pub dt: f64,
    pub k: &'a mut [f64],
    pub rdt: &'a mut f64,
    pub gradients0: &'a [f64],
    pub gradients1: &'a [f64],
    pub thermodynamic_forces0: &'a [f64],
    pub thermodynamic_forces1: &'a mut [f64],
    pub material_properties: &'a [f64],
    pub internal_state_variables0: &'a [f64],
    pub internal_state_variables1: &'a mut [f64],
    pub external_state_variables0: &'a [f64],
    pub external_state_variables1: &'a [f64],
}

/// Sizes of the arrays of a generic call for the behaviour `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericSizes {
    pub gradients: usize,
    pub thermodynamic_forces: usize,
    pub material_properties: usize,
    pub internal_state_variables: usize,
    /// Temperature included.
    pub external_state_variables: usize,
    pub tangent: usize,
}

impl GenericSizes {
    pub fn of<B: Behaviour>(h: ModellingHypothesis) -> Result<Self> {
        let gradients = B::BEHAVIOUR_TYPE.gradient_size(h)?;
        let thermodynamic_forces = B::BEHAVIOUR_TYPE.thermodynamic_force_size(h)?;
        Ok(Self {
            gradients,
            thermodynamic_forces,
            material_properties: Generic::material_properties_layout::<B>(h)?.len(),
            internal_state_variables: B::internal_variables_nb(h)?,
            external_state_variables: 1,
            tangent: thermodynamic_forces * gradients,
        })
    }
}

unsafe fn slice<'a>(p: *const f64, n: usize) -> &'a [f64] {
    if n == 0 || p.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(p, n)
    }
}

unsafe fn slice_mut<'a>(p: *mut f64, n: usize) -> &'a mut [f64] {
    if n == 0 || p.is_null() {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(p, n)
    }
}

impl<'a> GenericCall<'a> {
    /// # Safety
    ///
    /// Every array of `data` must hold at least the number of values given
    /// by `sizes`, and `rdt` must be valid.
    pub unsafe fn from_raw(data: &'a mut GenericBehaviourData, sizes: &GenericSizes) -> Result<Self> {
        let rdt = data
            .rdt
            .as_mut()
            .ok_or_else(|| BehaviourError::Programming("null rdt pointer".to_string()))?;
        let tangent = if data.k.is_null() { 0 } else { sizes.tangent.max(3) };
        Ok(Self {
            dt: data.dt,
            k: slice_mut(data.k, tangent),
            rdt,
            gradients0: slice(data.s0.gradients, sizes.gradients),
            gradients1: slice(data.s1.gradients, sizes.gradients),
            thermodynamic_forces0: slice(data.s0.thermodynamic_forces, sizes.thermodynamic_forces),
            thermodynamic_forces1: slice_mut(data.s1.thermodynamic_forces, sizes.thermodynamic_forces),
            material_properties: slice(data.s1.material_properties, sizes.material_properties),
            internal_state_variables0: slice(data.s0.internal_state_variables, sizes.internal_state_variables),
            internal_state_variables1: slice_mut(data.s1.internal_state_variables, sizes.internal_state_variables),
            external_state_variables0: slice(data.s0.external_state_variables, sizes.external_state_variables),
            external_state_variables1: slice(data.s1.external_state_variables, sizes.external_state_variables),
        })
    }
}

/// Copies `message` in a null terminated buffer of
/// [`ERROR_MESSAGE_LENGTH`] bytes, truncating it if needed.
///
/// # Safety
///
/// `buffer` is null or points to at least [`ERROR_MESSAGE_LENGTH`] bytes.
pub unsafe fn write_error_message(buffer: *mut c_char, message: &str) {
    if buffer.is_null() {
        return;
    }
    let buffer = std::slice::from_raw_parts_mut(buffer as *mut u8, ERROR_MESSAGE_LENGTH);
    let n = message.len().min(ERROR_MESSAGE_LENGTH - 1);
    buffer[..n].copy_from_slice(&message.as_bytes()[..n]);
    buffer[n] = 0;
}

/// Outcome of a generic call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericStatus {
    pub code: i32,
    pub message: Option<String>,
}

pub fn integrate<B: Behaviour>(
    mut call: GenericCall<'_>,
    h: ModellingHypothesis,
    parameters: &ParameterStore,
) -> GenericStatus {
    match dispatch::guarded(Generic::NAME, B::NAME, || execute::<B>(&mut call, h, parameters)) {
        Ok(None) => GenericStatus {
            code: if *call.rdt < RDT_THRESHOLD { 0 } else { 1 },
            message: None,
        },
        Ok(Some(message)) => GenericStatus {
            code: -1,
            message: Some(message),
        },
        Err(e) => GenericStatus {
            code: -1,
            message: Some(e.message),
        },
    }
}

/// Stress measure exchanged with finite strain behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StressMeasure {
    Cauchy,
    SecondPiolaKirchhoff,
}

fn finite_strain_options(k: &[f64]) -> Result<(StressMeasure, TangentOperatorFlag)> {
    let code = |i: usize| k.get(i).map(|v| v.round() as i32).unwrap_or(0);
    let measure = match code(1) {
        0 => StressMeasure::Cauchy,
        1 => StressMeasure::SecondPiolaKirchhoff,
        c => {
            return Err(BehaviourError::UnsupportedCase(format!(
                "stress measure {c} is not supported by the generic interface"
            )))
        }
    };
    let tangent = match code(2) {
        0 => TangentOperatorFlag::DSIG_DF,
        1 => TangentOperatorFlag::DS_DEGL,
        c => {
            return Err(BehaviourError::UnsupportedCase(format!(
                "tangent operator {c} is not supported by the generic interface"
            )))
        }
    };
    Ok((measure, tangent))
}

fn to_cauchy(s: &DVector<f64>, f: &Matrix3<f64>, h: ModellingHypothesis) -> Result<DVector<f64>> {
    mandel::matrix_to_stensor(&pk2_to_cauchy(&mandel::stensor_to_matrix(s, h)?, f)?, h)
}

fn from_cauchy(sigma: &DVector<f64>, f: &Matrix3<f64>, h: ModellingHypothesis) -> Result<DVector<f64>> {
    mandel::matrix_to_stensor(&cauchy_to_pk2(&mandel::stensor_to_matrix(sigma, h)?, f)?, h)
}

/// Returns the failure message of a failed integration.
fn execute<B: Behaviour>(
    call: &mut GenericCall<'_>,
    h: ModellingHypothesis,
    parameters: &ParameterStore,
) -> Result<Option<String>> {
    dispatch::check_hypothesis::<B>(h)?;
    let sizes = GenericSizes::of::<B>(h)?;
    dispatch::check_buffer_sizes::<B, Generic>(
        h,
        BufferSizes {
            nprops: call.material_properties.len().max(1),
            nstatv: call.internal_state_variables0.len(),
            ntens: call.thermodynamic_forces0.len(),
        },
        sizes.thermodynamic_forces,
        0,
    )?;
    let finite_strain = B::BEHAVIOUR_TYPE == BehaviourType::StandardFiniteStrain;
    let (measure, tangent_operator) = if finite_strain {
        finite_strain_options(call.k)?
    } else {
        (StressMeasure::Cauchy, Generic::FINITE_STRAIN_TANGENT_OPERATOR)
    };
    let (stiffness, prediction) = decode_stiffness_request(call.k.first().copied().unwrap_or(0.0))?;
    let layout = Generic::material_properties_layout::<B>(h)?;
    let t0 = call.external_state_variables0.first().copied().unwrap_or(0.0);
    let t1 = call.external_state_variables1.first().copied().unwrap_or(t0);
    let mut input = HandlerInput::new(h);
    input.dt = call.dt;
    input.temperature = t0;
    input.temperature_increment = t1 - t0;
    input.gradients0 = DVector::from_column_slice(call.gradients0);
    input.gradients1 = DVector::from_column_slice(call.gradients1);
    let forces0 = DVector::from_column_slice(call.thermodynamic_forces0);
    let f = |g: &DVector<f64>| mandel::tensor_to_matrix(g, h);
    input.thermodynamic_forces = match measure {
        StressMeasure::SecondPiolaKirchhoff if finite_strain => to_cauchy(&forces0, &f(&input.gradients0)?, h)?,
        _ => forces0,
    };
    input.elastic_properties = Generic::elastic_properties(&layout, call.material_properties, h)?;
    input.thermal_expansion_properties = layout.gather(call.material_properties, PropertyRole::ThermalExpansion)?;
    input.material_properties = behaviour_properties::<B>(&layout, call.material_properties)?;
    input.internal_state_variables = call.internal_state_variables0.to_vec();
    input.external_state_variables = call.external_state_variables0.iter().skip(1).copied().collect();
    input.external_state_variables_increments = call
        .external_state_variables1
        .iter()
        .zip(call.external_state_variables0)
        .skip(1)
        .map(|(a, b)| a - b)
        .collect();
    let options = HandlerOptions {
        stiffness,
        prediction,
        out_of_bounds_policy: out_of_bounds_policy(parameters),
        tangent_operator,
    };
    let sfe: &dyn StressFreeExpansionHandler = if finite_strain {
        &FiniteStrainStressFreeExpansionHandler
    } else {
        &SmallStrainStressFreeExpansionHandler
    };
    let f1 = if finite_strain { Some(f(&input.gradients1)?) } else { None };
    match handler::execute::<B>(input, &options, Some(sfe), parameters)? {
        StepOutcome::Converged(output) => {
            let forces = match (measure, f1) {
                (StressMeasure::SecondPiolaKirchhoff, Some(f1)) => from_cauchy(&output.thermodynamic_forces, &f1, h)?,
                _ => output.thermodynamic_forces.clone(),
            };
            export::<B>(&output, &forces, call)?;
            *call.rdt = call.rdt.min(output.time_step_scaling_factor);
            Ok(None)
        }
        StepOutcome::Failed {
            time_step_scaling_factor,
        } => {
            *call.rdt = time_step_scaling_factor;
            Ok(Some(format!("integration failed for behaviour '{}'", B::NAME)))
        }
    }
}

fn export<B: Behaviour>(output: &StepOutput, forces: &DVector<f64>, call: &mut GenericCall<'_>) -> Result<()> {
    views::export_stensor(forces, call.thermodynamic_forces1, Generic::STRESS_CONVENTION)?;
    let isvs = &output.internal_state_variables;
    if call.internal_state_variables1.len() < isvs.len() {
        return Err(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: isvs.len(),
            got: call.internal_state_variables1.len(),
        });
    }
    call.internal_state_variables1[..isvs.len()].copy_from_slice(isvs);
    if let Some(k) = &output.tangent {
        views::export_tangent(k, call.k, Generic::STORAGE_ORDER, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finitestrain::SaintVenantKirchhoff;
    use crate::smallstrain::{lame_coefficients, Elasticity, MisesPlasticity};
    use approx::assert_relative_eq;

    struct Buffers {
        k: Vec<f64>,
        rdt: f64,
        gradients0: Vec<f64>,
        gradients1: Vec<f64>,
        forces0: Vec<f64>,
        forces1: Vec<f64>,
        props: Vec<f64>,
        isvs0: Vec<f64>,
        isvs1: Vec<f64>,
    }

    impl Buffers {
        fn new(ng: usize, nf: usize, props: &[f64], nisv: usize) -> Self {
            Self {
                k: vec![0.0; nf * ng],
                rdt: 1.0,
                gradients0: vec![0.0; ng],
                gradients1: vec![0.0; ng],
                forces0: vec![0.0; nf],
                forces1: vec![0.0; nf],
                props: props.to_vec(),
                isvs0: vec![0.0; nisv],
                isvs1: vec![0.0; nisv],
            }
        }

        fn run<B: Behaviour>(&mut self, h: ModellingHypothesis, parameters: &ParameterStore) -> GenericStatus {
            let call = GenericCall {
                dt: 1.0,
                k: &mut self.k,
                rdt: &mut self.rdt,
                gradients0: &self.gradients0,
                gradients1: &self.gradients1,
                thermodynamic_forces0: &self.forces0,
                thermodynamic_forces1: &mut self.forces1,
                material_properties: &self.props,
                internal_state_variables0: &self.isvs0,
                internal_state_variables1: &mut self.isvs1,
                external_state_variables0: &[293.15],
                external_state_variables1: &[293.15],
            };
            integrate::<B>(call, h, parameters)
        }
    }

    #[test]
    fn elastic_step_returns_one() {
        let (young, nu) = (200e3, 0.3);
        let mut b = Buffers::new(4, 4, &[young, nu], 0);
        b.gradients1[0] = 1e-3;
        b.k[0] = 4.0;
        let status = b.run::<Elasticity>(ModellingHypothesis::PlaneStrain, &ParameterStore::new());
        assert_eq!(status.code, 1);
        let (lambda, mu) = lame_coefficients(young, nu);
        assert_relative_eq!(b.forces1[0], (lambda + 2.0 * mu) * 1e-3, max_relative = 1e-12);
        // canonical operator, no normalisation
        assert_relative_eq!(b.k[15], 2.0 * mu, max_relative = 1e-12);
    }

    #[test]
    fn small_scaling_factors_return_zero() {
        let mut b = Buffers::new(6, 6, &[200e3, 0.3, 300.0, 10e3], 7);
        b.gradients1[0] = 5e-3;
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_plastic_increment", 1e-4);
        let status = b.run::<MisesPlasticity>(ModellingHypothesis::Tridimensional, &parameters);
        assert_eq!(status.code, 0);
        assert!(b.rdt < 0.99);
        assert!(b.isvs1[6] > 0.0);
    }

    #[test]
    fn failures_return_minus_one_with_a_message() {
        let mut b = Buffers::new(6, 6, &[200e3, 0.3, 300.0, 10e3], 7);
        b.gradients1[0] = 5e-3;
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_strain_increment", 1e-3);
        let status = b.run::<MisesPlasticity>(ModellingHypothesis::Tridimensional, &parameters);
        assert_eq!(status.code, -1);
        assert!(status.message.unwrap().contains("MisesPlasticity"));
        assert_eq!(b.rdt, 0.1);
    }

    #[test]
    fn second_piola_kirchhoff_measure() {
        let (young, nu) = (200e3, 0.3);
        let mut b = Buffers::new(9, 6, &[young, nu], 0);
        let identity = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        b.gradients0.copy_from_slice(&identity);
        b.gradients1.copy_from_slice(&identity);
        b.gradients1[0] = 1.02;
        b.k[0] = 4.0;
        b.k[1] = 1.0;
        b.k[2] = 1.0;
        let status = b.run::<SaintVenantKirchhoff>(ModellingHypothesis::Tridimensional, &ParameterStore::new());
        assert_eq!(status.code, 1);
        let (lambda, mu) = lame_coefficients(young, nu);
        let egl = 0.5 * (1.02_f64 * 1.02 - 1.0);
        assert_relative_eq!(b.forces1[0], (lambda + 2.0 * mu) * egl, max_relative = 1e-10);
        assert_relative_eq!(b.k[0], lambda + 2.0 * mu, max_relative = 1e-10);

        b.k[1] = 2.0;
        let status = b.run::<SaintVenantKirchhoff>(ModellingHypothesis::Tridimensional, &ParameterStore::new());
        assert_eq!(status.code, -1);
        assert!(status.message.unwrap().contains("stress measure"));
    }

    #[test]
    fn error_messages_are_truncated() {
        let mut buffer = vec![1 as c_char; ERROR_MESSAGE_LENGTH];
        let message = "x".repeat(2 * ERROR_MESSAGE_LENGTH);
        unsafe { write_error_message(buffer.as_mut_ptr(), &message) };
        assert_eq!(buffer[ERROR_MESSAGE_LENGTH - 1], 0);
        assert_eq!(buffer[0], b'x' as c_char);
    }
}
