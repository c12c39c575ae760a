//! OpenRadioss interface.
//!
//! The explicit solver integrates a whole group of `nel` elements per call.
//! Every array is stored component-major (component `c` of element `i` at
//! `c * nel + i`), shears in the order `xy, yz, zx`. Strain increments use
//! engineering shears, stresses tensorial ones. No tangent operator is
//! computed and a failed integration is fatal.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{Behaviour, BehaviourType, PropertyRole, StiffnessMatrixType, TangentOperatorFlag};
use crate::mandel::scale_shear;
use crate::parameters::ParameterStore;
use crate::solvers::dispatch::{self, BufferSizes};
use crate::solvers::handler::{self, HandlerInput, HandlerOptions, StepOutcome};
use crate::solvers::{behaviour_properties, out_of_bounds_policy, SolverPolicy};
use crate::stress_free_expansion::{SmallStrainStressFreeExpansionHandler, StressFreeExpansionHandler};
use crate::views::{SolverConvention, StorageOrder};
use nalgebra::DVector;
use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

pub struct OpenRadioss;

impl SolverPolicy for OpenRadioss {
    const NAME: &'static str = "OpenRadioss";
    const STRAIN_CONVENTION: SolverConvention = SolverConvention::Engineering;
    const STRESS_CONVENTION: SolverConvention = SolverConvention::Tensorial;
    const STORAGE_ORDER: StorageOrder = StorageOrder::RowMajor;
    const FINITE_STRAIN_TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::DSIG_DF;
}

/// Canonical index of the components of an OpenRadioss stensor.
const COMPONENTS: [usize; 6] = [0, 1, 2, 3, 5, 4];

#[derive(Debug)]
pub struct OpenRadiossCall<'a> {
    pub nel: usize,
    pub dt: f64,
    /// One value per element.
    pub temperature: &'a [f64],
    pub props: &'a [f64],
    pub deps: &'a [f64],
    pub sig0: &'a [f64],
    pub sig1: &'a mut [f64],
    /// `nuvar` state variables per element, variable `k` of element `i` at
    /// `i + k * nel`.
    pub uvar: &'a mut [f64],
    pub nuvar: usize,
}

fn check_len(buffer: &[f64], expected: usize) -> Result<()> {
    if buffer.len() < expected {
        return Err(BehaviourError::InvalidTensorSize {
            expected,
            got: buffer.len(),
        });
    }
    Ok(())
}

fn gather(buffer: &[f64], nel: usize, i: usize, factor: f64) -> DVector<f64> {
    let mut v = DVector::zeros(6);
    for (c, canonical) in COMPONENTS.iter().enumerate() {
        v[*canonical] = buffer[c * nel + i];
    }
    scale_shear(v.as_mut_slice(), factor);
    v
}

fn scatter(v: &DVector<f64>, buffer: &mut [f64], nel: usize, i: usize) {
    for (c, canonical) in COMPONENTS.iter().enumerate() {
        let factor = if *canonical < 3 { 1.0 } else { FRAC_1_SQRT_2 };
        buffer[c * nel + i] = v[*canonical] * factor;
    }
}

/// Integrates `B` on every element of the group. Returns 0 on success, the
/// status code of the first error otherwise.
pub fn mat_user<B: Behaviour>(mut call: OpenRadiossCall<'_>, parameters: &ParameterStore) -> i32 {
    match dispatch::guarded(OpenRadioss::NAME, B::NAME, || integrate::<B>(&mut call, parameters)) {
        Ok(()) => 0,
        Err(e) => e.code,
    }
}

fn integrate<B: Behaviour>(call: &mut OpenRadiossCall<'_>, parameters: &ParameterStore) -> Result<()> {
    let h = ModellingHypothesis::Tridimensional;
    dispatch::check_hypothesis::<B>(h)?;
    dispatch::check_buffer_sizes::<B, OpenRadioss>(
        h,
        BufferSizes {
            nprops: call.props.len(),
            nstatv: call.nuvar,
            ntens: 6,
        },
        6,
        0,
    )?;
    if B::BEHAVIOUR_TYPE != BehaviourType::StandardStrainBased {
        return Err(BehaviourError::UnsupportedCase(format!(
            "behaviours of type '{}' are not supported by the OpenRadioss interface",
            B::BEHAVIOUR_TYPE
        )));
    }
    let nel = call.nel;
    check_len(call.temperature, nel)?;
    check_len(call.deps, 6 * nel)?;
    check_len(call.sig0, 6 * nel)?;
    check_len(call.sig1, 6 * nel)?;
    check_len(call.uvar, call.nuvar * nel)?;
    let layout = OpenRadioss::material_properties_layout::<B>(h)?;
    let elastic_properties = OpenRadioss::elastic_properties(&layout, call.props, h)?;
    let thermal_expansion_properties = layout.gather(call.props, PropertyRole::ThermalExpansion)?;
    let material_properties = behaviour_properties::<B>(&layout, call.props)?;
    let nisv = B::internal_variables_nb(h)?;
    let options = HandlerOptions {
        stiffness: StiffnessMatrixType::NoStiffness,
        prediction: false,
        out_of_bounds_policy: out_of_bounds_policy(parameters),
        tangent_operator: OpenRadioss::FINITE_STRAIN_TANGENT_OPERATOR,
    };
    let sfe: &dyn StressFreeExpansionHandler = &SmallStrainStressFreeExpansionHandler;
    for i in 0..nel {
        let mut input = HandlerInput::new(h);
        input.dt = call.dt;
        input.temperature = call.temperature[i];
        input.gradients0 = DVector::zeros(6);
        input.gradients1 = gather(call.deps, nel, i, FRAC_1_SQRT_2);
        input.thermodynamic_forces = gather(call.sig0, nel, i, SQRT_2);
        input.elastic_properties = elastic_properties.clone();
        input.thermal_expansion_properties = thermal_expansion_properties.clone();
        input.material_properties = material_properties.clone();
        input.internal_state_variables = (0..nisv).map(|k| call.uvar[i + k * nel]).collect();
        match handler::execute::<B>(input, &options, Some(sfe), parameters)? {
            StepOutcome::Converged(output) => {
                scatter(&output.thermodynamic_forces, call.sig1, nel, i);
                for (k, v) in output.internal_state_variables.iter().enumerate() {
                    call.uvar[i + k * nel] = *v;
                }
            }
            StepOutcome::Failed { .. } => {
                tracing::warn!(behaviour = B::NAME, element = i, "integration failed");
                return Err(BehaviourError::IntegrationFailed(B::NAME.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smallstrain::{lame_coefficients, Elasticity, MisesPlasticity};
    use approx::assert_relative_eq;

    #[test]
    fn elements_are_integrated_independently() {
        let (young, nu) = (200e3, 0.3);
        let nel = 2;
        // element 0: engineering yz shear, element 1: xx strain
        let mut deps = vec![0.0; 12];
        deps[4 * nel] = 2e-3;
        deps[1] = 1e-3;
        let mut sig1 = vec![0.0; 12];
        let call = OpenRadiossCall {
            nel,
            dt: 1e-6,
            temperature: &[293.15, 293.15],
            props: &[young, nu],
            deps: &deps,
            sig0: &[0.0; 12],
            sig1: &mut sig1,
            uvar: &mut [],
            nuvar: 0,
        };
        assert_eq!(mat_user::<Elasticity>(call, &ParameterStore::new()), 0);
        let (lambda, mu) = lame_coefficients(young, nu);
        assert_relative_eq!(sig1[4 * nel], mu * 2e-3, max_relative = 1e-12);
        assert_eq!(sig1[3 * nel], 0.0);
        assert_eq!(sig1[5 * nel], 0.0);
        assert_relative_eq!(sig1[1], (lambda + 2.0 * mu) * 1e-3, max_relative = 1e-12);
        assert_relative_eq!(sig1[nel + 1], lambda * 1e-3, max_relative = 1e-12);
    }

    #[test]
    fn failures_are_fatal() {
        let mut deps = vec![0.0; 6];
        deps[0] = 1e-2;
        let mut sig1 = vec![0.0; 6];
        let mut uvar = vec![0.0; 7];
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_strain_increment", 1e-3);
        let call = OpenRadiossCall {
            nel: 1,
            dt: 1e-6,
            temperature: &[293.15],
            props: &[200e3, 0.3, 300.0, 10e3],
            deps: &deps,
            sig0: &[0.0; 6],
            sig1: &mut sig1,
            uvar: &mut uvar,
            nuvar: 7,
        };
        assert_eq!(mat_user::<MisesPlasticity>(call, &parameters), -2);
    }
}
