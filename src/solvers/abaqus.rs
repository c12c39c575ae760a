//! Abaqus/Standard (UMAT) interface.
//!
//! The modelling hypothesis is fixed by the exported entry point. Plane
//! stress uses the reduced `(11, 22, 12)` layout. Finite strain behaviours
//! receive the deformation gradients `DFGRD0`/`DFGRD1` and exchange the
//! Cauchy stress, the tangent being the one of the Jaumann rate of the
//! Kirchhoff stress.
//!
//! A failed integration is reported through `PNEWDT` and leaves the outputs
//! untouched, the solver being in charge of the time step reduction.
use crate::error::{BehaviourError, Result};
use crate::finite_strain::fortran_to_matrix;
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourType, PropertyRole, StiffnessMatrixType, SymmetryType, TangentOperatorFlag,
};
use crate::mandel;
use crate::parameters::ParameterStore;
use crate::solvers::dispatch::{self, BufferSizes};
use crate::solvers::handler::{self, HandlerInput, HandlerOptions, StepOutcome, StepOutput};
use crate::solvers::{behaviour_properties, out_of_bounds_policy, SolverPolicy};
use crate::stress_free_expansion::{
    FiniteStrainStressFreeExpansionHandler, SmallStrainStressFreeExpansionHandler,
    StressFreeExpansionHandler,
};
use crate::views::{self, SolverConvention, StorageOrder};
use nalgebra::DVector;

pub struct Abaqus;

impl SolverPolicy for Abaqus {
    const NAME: &'static str = "Abaqus";
    const STRAIN_CONVENTION: SolverConvention = SolverConvention::Engineering;
    const STRESS_CONVENTION: SolverConvention = SolverConvention::Tensorial;
    const STORAGE_ORDER: StorageOrder = StorageOrder::ColumnMajor;
    const FINITE_STRAIN_TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::ABAQUS;
}

/// Buffers of one UMAT call.
#[derive(Debug)]
pub struct AbaqusCall<'a> {
    pub stress: &'a mut [f64],
    pub statev: &'a mut [f64],
    pub ddsdde: &'a mut [f64],
    /// Small strain behaviours only.
    pub stran: &'a [f64],
    pub dstran: &'a [f64],
    /// Finite strain behaviours only, column-major.
    pub dfgrd0: &'a [f64],
    pub dfgrd1: &'a [f64],
    pub dtime: f64,
    pub temperature: f64,
    pub temperature_increment: f64,
    pub predef: &'a [f64],
    pub dpred: &'a [f64],
    pub ntens: usize,
    pub props: &'a [f64],
    pub pnewdt: &'a mut f64,
}

/// Number of stress components exchanged with Abaqus.
pub fn ntens(h: ModellingHypothesis) -> Result<usize> {
    if h.is_plane_stress() {
        return Ok(3);
    }
    h.stensor_size()
}

/// Integrates `B` and returns 0 on success, the status code of the error
/// otherwise. `PNEWDT` is set to -1 on errors.
pub fn umat<B: Behaviour>(mut call: AbaqusCall<'_>, h: ModellingHypothesis, parameters: &ParameterStore) -> i32 {
    let mut pnewdt = *call.pnewdt;
    let result = dispatch::guarded(Abaqus::NAME, B::NAME, || {
        integrate::<B>(&mut call, h, parameters, &mut pnewdt)
    });
    let status = match result {
        Ok(()) => 0,
        Err(e) => {
            pnewdt = -1.0;
            e.code
        }
    };
    *call.pnewdt = pnewdt;
    status
}

fn import_symmetric(buffer: &[f64], h: ModellingHypothesis, convention: SolverConvention) -> Result<DVector<f64>> {
    if h.is_plane_stress() {
        views::import_plane_stress_stensor(buffer, convention)
    } else {
        views::import_stensor(buffer, h, convention)
    }
}

fn import_gradient(f: &[f64], h: ModellingHypothesis) -> Result<DVector<f64>> {
    mandel::matrix_to_tensor(&fortran_to_matrix(f)?, h)
}

fn integrate<B: Behaviour>(
    call: &mut AbaqusCall<'_>,
    h: ModellingHypothesis,
    parameters: &ParameterStore,
    pnewdt: &mut f64,
) -> Result<()> {
    dispatch::check_hypothesis::<B>(h)?;
    let sizes = BufferSizes {
        nprops: call.props.len(),
        nstatv: call.statev.len(),
        ntens: call.ntens,
    };
    dispatch::check_buffer_sizes::<B, Abaqus>(h, sizes, ntens(h)?, 0)?;
    let finite_strain = match B::BEHAVIOUR_TYPE {
        BehaviourType::StandardStrainBased => false,
        BehaviourType::StandardFiniteStrain if B::SYMMETRY == SymmetryType::Orthotropic => {
            return Err(BehaviourError::UnsupportedCase(
                "orthotropic finite strain behaviours are not supported by the Abaqus interface".to_string(),
            ))
        }
        BehaviourType::StandardFiniteStrain => true,
        btype => {
            return Err(BehaviourError::UnsupportedCase(format!(
                "behaviours of type '{btype}' are not supported by the Abaqus interface"
            )))
        }
    };
    let layout = Abaqus::material_properties_layout::<B>(h)?;
    let mut input = HandlerInput::new(h);
    input.dt = call.dtime;
    input.temperature = call.temperature;
    input.temperature_increment = call.temperature_increment;
    if finite_strain {
        input.gradients0 = import_gradient(call.dfgrd0, h)?;
        input.gradients1 = import_gradient(call.dfgrd1, h)?;
    } else {
        input.gradients0 = import_symmetric(call.stran, h, Abaqus::STRAIN_CONVENTION)?;
        input.gradients1 = &input.gradients0 + import_symmetric(call.dstran, h, Abaqus::STRAIN_CONVENTION)?;
    }
    input.thermodynamic_forces = import_symmetric(call.stress, h, Abaqus::STRESS_CONVENTION)?;
    input.elastic_properties = Abaqus::elastic_properties(&layout, call.props, h)?;
    input.thermal_expansion_properties = layout.gather(call.props, PropertyRole::ThermalExpansion)?;
    input.material_properties = behaviour_properties::<B>(&layout, call.props)?;
    let nisv = B::internal_variables_nb(h)?;
    input.internal_state_variables = call
        .statev
        .get(..nisv)
        .ok_or(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: nisv,
            got: call.statev.len(),
        })?
        .to_vec();
    input.external_state_variables = call.predef.to_vec();
    input.external_state_variables_increments = call.dpred.to_vec();
    let options = HandlerOptions {
        stiffness: if B::HAS_CONSISTENT_TANGENT_OPERATOR {
            StiffnessMatrixType::ConsistentTangent
        } else {
            StiffnessMatrixType::Tangent
        },
        prediction: false,
        out_of_bounds_policy: out_of_bounds_policy(parameters),
        tangent_operator: Abaqus::FINITE_STRAIN_TANGENT_OPERATOR,
    };
    let sfe: &dyn StressFreeExpansionHandler = if finite_strain {
        &FiniteStrainStressFreeExpansionHandler
    } else {
        &SmallStrainStressFreeExpansionHandler
    };
    match handler::execute::<B>(input, &options, Some(sfe), parameters)? {
        StepOutcome::Converged(output) => {
            export::<B>(&output, call, h)?;
            *pnewdt = pnewdt.min(output.time_step_scaling_factor);
        }
        StepOutcome::Failed {
            time_step_scaling_factor,
        } => {
            tracing::debug!(behaviour = B::NAME, factor = time_step_scaling_factor, "integration failed");
            *pnewdt = time_step_scaling_factor;
        }
    }
    Ok(())
}

fn export<B: Behaviour>(output: &StepOutput, call: &mut AbaqusCall<'_>, h: ModellingHypothesis) -> Result<()> {
    if h.is_plane_stress() {
        views::export_plane_stress_stensor(&output.thermodynamic_forces, call.stress, Abaqus::STRESS_CONVENTION)?;
    } else {
        views::export_stensor(&output.thermodynamic_forces, call.stress, Abaqus::STRESS_CONVENTION)?;
    }
    let isvs = &output.internal_state_variables;
    call.statev[..isvs.len()].copy_from_slice(isvs);
    if let Some(k) = &output.tangent {
        if h.is_plane_stress() {
            let packed = views::pack_plane_stress_tangent(k)?;
            call.ddsdde[..9].copy_from_slice(&packed);
        } else {
            views::export_tangent(
                &views::normalize_tangent(k),
                call.ddsdde,
                Abaqus::STORAGE_ORDER,
                B::IS_CONSISTENT_TANGENT_OPERATOR_SYMMETRIC,
            )?;
        }
    }
    Ok(())
}
