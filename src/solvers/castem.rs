//! Castem (UMAT) interface.
//!
//! Strains are given with engineering shears, stresses with tensorial
//! shears, the tangent operator is written column-major in `DDSDDE` whose
//! first entry holds the stiffness request code on input. The modelling
//! hypothesis is encoded in `NDI` and the material properties start with a
//! block managed by the interface (elastic constants, mass density, thermal
//! expansion coefficients, orientation, plate width).
//!
//! Finite strain behaviours receive the deformation gradients `DFGRD0` and
//! `DFGRD1` and exchange the Cauchy stress, the tangent operator being the
//! Truesdell rate moduli. Small strain behaviours may also be driven through
//! the finite rotation small strain strategy, see
//! [`umat_finite_rotation_small_strain`].
//!
//! Behaviours declaring [`Behaviour::MAXIMUM_SUB_STEPPING`] are integrated
//! with an internal sub-stepping: a failed step is halved and replayed from
//! the last converged state.
use crate::error::{BehaviourError, Result};
use crate::finite_strain::{self, fortran_to_matrix, green_lagrange_axial_stretch};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourType, MaterialPropertiesLayout, PropertyRole, SymmetryType,
    TangentOperatorFlag,
};
use crate::mandel;
use crate::parameters::ParameterStore;
use crate::solvers::dispatch::{self, BufferSizes};
use crate::solvers::handler::{self, HandlerInput, HandlerOptions, StepOutcome, StepOutput};
use crate::solvers::{
    behaviour_properties, decode_stiffness_request, out_of_bounds_policy, plane_stress,
    SolverPolicy, ISOTROPIC_ELASTIC_PROPERTIES, ORTHOTROPIC_ELASTIC_PROPERTIES,
    ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES,
};
use crate::stress_free_expansion::{
    ExternalStressFreeExpansionHandler, SmallStrainStressFreeExpansionHandler, StressFreeExpansionFn,
    StressFreeExpansionHandler,
};
use crate::tangent_operator::{self, ConversionContext};
use crate::views::{self, normalize_tangent, SolverConvention, StorageOrder};
use nalgebra::{DMatrix, DVector, Matrix3};
use std::os::raw::c_char;

pub struct Castem;

impl SolverPolicy for Castem {
    const NAME: &'static str = "Castem";
    const STRAIN_CONVENTION: SolverConvention = SolverConvention::Engineering;
    const STRESS_CONVENTION: SolverConvention = SolverConvention::Tensorial;
    const STORAGE_ORDER: StorageOrder = StorageOrder::ColumnMajor;
    const FINITE_STRAIN_TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::C_TRUESDELL;

    fn material_properties_layout<B: Behaviour>(h: ModellingHypothesis) -> Result<MaterialPropertiesLayout> {
        use PropertyRole::Interface;
        let elastic = if B::REQUIRES_STIFFNESS_TENSOR {
            PropertyRole::Elastic
        } else {
            Interface
        };
        let thermal = if B::REQUIRES_THERMAL_EXPANSION_COEFFICIENT_TENSOR {
            PropertyRole::ThermalExpansion
        } else {
            Interface
        };
        let mut layout = MaterialPropertiesLayout::new();
        match (B::BEHAVIOUR_TYPE, B::SYMMETRY) {
            (BehaviourType::CohesiveZoneModel, _) => {
                layout.push_all(
                    &["NormalStiffness", "TangentialStiffness", "MassDensity", "NormalThermalExpansion"],
                    Interface,
                );
            }
            (_, SymmetryType::Isotropic) => {
                layout
                    .push_all(&ISOTROPIC_ELASTIC_PROPERTIES, elastic)
                    .push("MassDensity", Interface)
                    .push("ThermalExpansion", thermal);
                if h.is_plane_stress() {
                    layout.push("PlateWidth", Interface);
                }
            }
            (_, SymmetryType::Orthotropic) if h.is_plane_stress() => {
                layout
                    .push_all(&["YoungModulus1", "YoungModulus2", "PoissonRatio12", "ShearModulus12"], elastic)
                    .push_all(&["V1X", "V1Y"], Interface)
                    .push_all(&["YoungModulus3", "PoissonRatio23", "PoissonRatio13"], elastic)
                    .push("MassDensity", Interface)
                    .push_all(&ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES[..2], thermal)
                    .push("PlateWidth", Interface);
            }
            (_, SymmetryType::Orthotropic) => match h.space_dimension()? {
                1 => {
                    layout
                        .push_all(&ORTHOTROPIC_ELASTIC_PROPERTIES[..6], elastic)
                        .push("MassDensity", Interface)
                        .push_all(&ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES, thermal);
                }
                2 => {
                    layout
                        .push_all(&ORTHOTROPIC_ELASTIC_PROPERTIES[..7], elastic)
                        .push_all(&["V1X", "V1Y"], Interface)
                        .push("MassDensity", Interface)
                        .push_all(&ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES, thermal);
                }
                _ => {
                    layout
                        .push_all(&ORTHOTROPIC_ELASTIC_PROPERTIES, elastic)
                        .push_all(&["V1X", "V1Y", "V1Z", "V2X", "V2Y", "V2Z"], Interface)
                        .push("MassDensity", Interface)
                        .push_all(&ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES, thermal);
                }
            },
        }
        layout.push_all(B::material_properties(), PropertyRole::Behaviour);
        Ok(layout)
    }

    /// The plane stress block interleaves the in-plane and out-of-plane
    /// constants.
    fn elastic_properties(
        layout: &MaterialPropertiesLayout,
        props: &[f64],
        h: ModellingHypothesis,
    ) -> Result<Vec<f64>> {
        let e = layout.gather(props, PropertyRole::Elastic)?;
        if h.is_plane_stress() && e.len() == 7 {
            return Ok([0, 1, 4, 2, 5, 6, 3].iter().map(|i| e[*i]).collect());
        }
        Ok(e)
    }
}

/// Buffers of one UMAT call. Slices have the sizes declared by the solver.
#[derive(Debug)]
pub struct CastemCall<'a> {
    pub stress: &'a mut [f64],
    pub statev: &'a mut [f64],
    pub ddsdde: &'a mut [f64],
    pub stran: &'a [f64],
    pub dstran: &'a [f64],
    /// Deformation gradients, column-major. Only read for finite strain
    /// behaviours and the finite rotation small strain strategy.
    pub dfgrd0: &'a [f64],
    pub dfgrd1: &'a [f64],
    pub dtime: f64,
    pub temperature: f64,
    pub temperature_increment: f64,
    pub predef: &'a [f64],
    pub dpred: &'a [f64],
    pub ndi: i32,
    pub ntens: usize,
    pub props: &'a [f64],
    /// Material axes expressed in the global frame, column-major.
    pub drot: &'a [f64],
    pub pnewdt: &'a mut f64,
}

pub fn hypothesis_from_ndi(ndi: i32) -> Result<ModellingHypothesis> {
    use ModellingHypothesis::*;
    match ndi {
        14 => Ok(AxisymmetricalGeneralisedPlaneStrain),
        0 => Ok(Axisymmetrical),
        -2 => Ok(PlaneStress),
        -1 => Ok(PlaneStrain),
        -3 => Ok(GeneralisedPlaneStrain),
        2 => Ok(Tridimensional),
        _ => Err(BehaviourError::invalid_hypothesis("", format!("NDI = {ndi}"))),
    }
}

pub fn ndi_from_hypothesis(h: ModellingHypothesis) -> Result<i32> {
    use ModellingHypothesis::*;
    match h {
        AxisymmetricalGeneralisedPlaneStrain => Ok(14),
        Axisymmetrical => Ok(0),
        PlaneStress => Ok(-2),
        PlaneStrain => Ok(-1),
        GeneralisedPlaneStrain => Ok(-3),
        Tridimensional => Ok(2),
        Undefined => Err(BehaviourError::invalid_hypothesis("", h)),
    }
}

/// Signature of the exported Castem entry points: the UMAT arguments
/// followed by the optional stress-free expansion handler.
pub type UmatFn = unsafe extern "C" fn(
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *const f64,
    *const f64,
    *const f64,
    *const f64,
    *const f64,
    *const f64,
    *const f64,
    *const f64,
    *const c_char,
    *const i32,
    *const i32,
    *const i32,
    *const i32,
    *const f64,
    *const i32,
    *const f64,
    *const f64,
    *mut f64,
    *const f64,
    *const f64,
    *const f64,
    *const i32,
    *const i32,
    *const i32,
    *const i32,
    *const i32,
    *mut i32,
    Option<StressFreeExpansionFn>,
);

fn kinc(result: std::result::Result<(), dispatch::DispatchError>) -> i32 {
    match result {
        Ok(()) => 1,
        Err(e) => e.code,
    }
}

/// Integrates `B` and returns the value of `KINC`: 1 on success, the status
/// code of the error otherwise.
pub fn umat<B: Behaviour>(
    call: CastemCall<'_>,
    sfe: Option<StressFreeExpansionFn>,
    parameters: &ParameterStore,
) -> i32 {
    let sfe = sfe.map(ExternalStressFreeExpansionHandler);
    let sfe = sfe.as_ref().map(|s| s as &dyn StressFreeExpansionHandler);
    kinc(dispatch::guarded(Castem::NAME, B::NAME, || integrate::<B>(call, sfe, parameters)))
}

/// Integrates the small strain behaviour `B` under finite rotations.
///
/// The behaviour is driven by the Green-Lagrange strain computed from
/// `DFGRD0` and `DFGRD1` and sees the second Piola-Kirchhoff stress. The
/// Cauchy stress of the solver is converted back and forth, and the tangent
/// operator is returned as the Truesdell rate moduli. The stress-free
/// expansion is computed by the small strain handler unless the solver
/// provides one.
pub fn umat_finite_rotation_small_strain<B: Behaviour>(
    call: CastemCall<'_>,
    sfe: Option<StressFreeExpansionFn>,
    parameters: &ParameterStore,
) -> i32 {
    let sfe = sfe.map(ExternalStressFreeExpansionHandler);
    let sfe: &dyn StressFreeExpansionHandler = match &sfe {
        Some(s) => s,
        None => &SmallStrainStressFreeExpansionHandler,
    };
    kinc(dispatch::guarded(Castem::NAME, B::NAME, || {
        integrate_finite_rotation_small_strain::<B>(call, sfe, parameters)
    }))
}

/// `true` when the generic plane stress algorithm must be used.
fn uses_plane_stress_algorithm<B: Behaviour>(h: ModellingHypothesis) -> bool {
    h.is_plane_stress()
        && !B::is_defined(h)
        && B::is_defined(ModellingHypothesis::GeneralisedPlaneStrain)
        && B::BEHAVIOUR_TYPE == BehaviourType::StandardStrainBased
}

fn integrate<B: Behaviour>(
    mut call: CastemCall<'_>,
    sfe: Option<&dyn StressFreeExpansionHandler>,
    parameters: &ParameterStore,
) -> Result<()> {
    let h = hypothesis_from_ndi(call.ndi)?;
    if uses_plane_stress_algorithm::<B>(h) {
        return plane_stress::integrate::<B>(call, sfe, parameters);
    }
    dispatch::check_hypothesis::<B>(h)?;
    let sizes = BufferSizes {
        nprops: call.props.len(),
        nstatv: call.statev.len(),
        ntens: call.ntens,
    };
    dispatch::check_buffer_sizes::<B, Castem>(h, sizes, B::BEHAVIOUR_TYPE.thermodynamic_force_size(h)?, 0)?;
    if B::BEHAVIOUR_TYPE == BehaviourType::General {
        return Err(BehaviourError::UnsupportedCase(format!(
            "behaviours of type '{}' are not supported by the Castem interface",
            B::BEHAVIOUR_TYPE
        )));
    }
    let layout = Castem::material_properties_layout::<B>(h)?;
    let input = import::<B>(&call, h, h, &layout)?;
    let options = options(&call, parameters)?;
    match run::<B>(input, &options, sfe, parameters)? {
        StepOutcome::Converged(output) => export::<B>(&output, &output.internal_state_variables, &mut call),
        StepOutcome::Failed {
            time_step_scaling_factor,
        } => {
            *call.pnewdt = time_step_scaling_factor;
            Err(BehaviourError::IntegrationFailed(B::NAME.to_string()))
        }
    }
}

/// Axial Green-Lagrange strain of a plane stress state, read from the
/// `AxialStrain` state variable of the behaviour or, when the generic plane
/// stress algorithm is used, right after the behaviour's state variables.
fn plane_stress_axial_strain<B: Behaviour>(statev: &[f64], h: ModellingHypothesis) -> Result<Option<f64>> {
    if !h.is_plane_stress() {
        return Ok(None);
    }
    if uses_plane_stress_algorithm::<B>(h) {
        let offset = B::internal_variables_nb(ModellingHypothesis::GeneralisedPlaneStrain)?;
        return statev
            .get(offset)
            .copied()
            .map(Some)
            .ok_or(BehaviourError::UnMatchedNumberOfStateVariables {
                expected: offset + 1,
                got: statev.len(),
            });
    }
    dispatch::check_hypothesis::<B>(h)?;
    let variables = B::internal_state_variables_descriptors(h);
    finite_strain::axial_strain(statev, &variables, h, B::NAME).map(Some)
}

fn axial_stretch<B: Behaviour>(statev: &[f64], h: ModellingHypothesis) -> Result<Option<f64>> {
    plane_stress_axial_strain::<B>(statev, h)?
        .map(green_lagrange_axial_stretch)
        .transpose()
}

fn integrate_finite_rotation_small_strain<B: Behaviour>(
    call: CastemCall<'_>,
    sfe: &dyn StressFreeExpansionHandler,
    parameters: &ParameterStore,
) -> Result<()> {
    if B::BEHAVIOUR_TYPE != BehaviourType::StandardStrainBased {
        return Err(BehaviourError::UnsupportedCase(format!(
            "the finite rotation small strain strategy only applies to small strain behaviours, '{}' is of type '{}'",
            B::NAME,
            B::BEHAVIOUR_TYPE
        )));
    }
    let h = hypothesis_from_ndi(call.ndi)?;
    let n = call.ntens;
    if call.stress.len() < n {
        return Err(BehaviourError::InvalidTensorSize {
            expected: n,
            got: call.stress.len(),
        });
    }
    let tangent_requested = call.ddsdde.first().is_some_and(|k| k.abs() > 0.5);
    let mut e0 = vec![0.0; n];
    let mut e1 = vec![0.0; n];
    finite_strain::compute_green_lagrange_strain(&mut e0, call.dfgrd0, n, false)?;
    finite_strain::compute_green_lagrange_strain(&mut e1, call.dfgrd1, n, false)?;
    let de: Vec<f64> = e1.iter().zip(&e0).map(|(a, b)| a - b).collect();
    let fzz0 = axial_stretch::<B>(call.statev, h)?;
    let mut stress = call.stress[..n].to_vec();
    finite_strain::compute_second_piola_kirchhoff_stress_from_cauchy_stress(&mut stress, call.dfgrd0, n, false, fzz0)?;
    integrate::<B>(
        CastemCall {
            stress: &mut stress,
            statev: &mut *call.statev,
            ddsdde: &mut *call.ddsdde,
            stran: &e0,
            dstran: &de,
            dfgrd0: call.dfgrd0,
            dfgrd1: call.dfgrd1,
            dtime: call.dtime,
            temperature: call.temperature,
            temperature_increment: call.temperature_increment,
            predef: call.predef,
            dpred: call.dpred,
            ndi: call.ndi,
            ntens: n,
            props: call.props,
            drot: call.drot,
            pnewdt: &mut *call.pnewdt,
        },
        Some(sfe),
        parameters,
    )?;
    let fzz1 = axial_stretch::<B>(call.statev, h)?;
    finite_strain::compute_cauchy_stress_from_second_piola_kirchhoff_stress(&mut stress, call.dfgrd1, n, false, fzz1)?;
    call.stress[..n].copy_from_slice(&stress);
    if tangent_requested {
        let mut f1 = fortran_to_matrix(call.dfgrd1)?;
        if let Some(fzz) = fzz1 {
            f1[(2, 2)] = fzz;
        }
        let cse = views::denormalize_tangent(&views::import_tangent(call.ddsdde, n, n, Castem::STORAGE_ORDER)?);
        let ctx = ConversionContext::new(Matrix3::identity(), f1, Matrix3::zeros());
        let ct = tangent_operator::convert(
            TangentOperatorFlag::DS_DEGL,
            TangentOperatorFlag::C_TRUESDELL,
            &tangent_operator::embed(&cse, 6, 6)?,
            &ctx,
        )?;
        views::export_tangent(
            &normalize_tangent(&tangent_operator::truncate(&ct, n, n)),
            call.ddsdde,
            Castem::STORAGE_ORDER,
            B::IS_CONSISTENT_TANGENT_OPERATOR_SYMMETRIC,
        )?;
    }
    Ok(())
}

pub(crate) fn options(call: &CastemCall<'_>, parameters: &ParameterStore) -> Result<HandlerOptions> {
    let code = call.ddsdde.first().copied().ok_or(BehaviourError::InvalidTensorSize {
        expected: 1,
        got: 0,
    })?;
    let (stiffness, prediction) = decode_stiffness_request(code)?;
    Ok(HandlerOptions {
        stiffness,
        prediction,
        out_of_bounds_policy: out_of_bounds_policy(parameters),
        tangent_operator: Castem::FINITE_STRAIN_TANGENT_OPERATOR,
    })
}

/// Index in the canonical order of the `i`-th component of a Castem
/// cohesive buffer: the normal component comes last in Castem, first in the
/// canonical order.
fn cohesive_index(i: usize, n: usize) -> usize {
    if i == n - 1 {
        0
    } else {
        i + 1
    }
}

fn import_cohesive(buffer: &[f64], n: usize) -> Result<DVector<f64>> {
    if buffer.len() < n {
        return Err(BehaviourError::InvalidTensorSize {
            expected: n,
            got: buffer.len(),
        });
    }
    let mut v = DVector::zeros(n);
    for (i, value) in buffer[..n].iter().enumerate() {
        v[cohesive_index(i, n)] = *value;
    }
    Ok(v)
}

fn export_cohesive(v: &DVector<f64>, buffer: &mut [f64]) {
    let n = v.len();
    for (i, value) in buffer[..n].iter_mut().enumerate() {
        *value = v[cohesive_index(i, n)];
    }
}

fn cohesive_operator(k: &DMatrix<f64>) -> DMatrix<f64> {
    let n = k.nrows();
    DMatrix::from_fn(n, n, |i, j| k[(cohesive_index(i, n), cohesive_index(j, n))])
}

/// Canonical inputs of a call. `h` is the hypothesis of the material
/// properties layout, `hb` the one of the behaviour.
pub(crate) fn import<B: Behaviour>(
    call: &CastemCall<'_>,
    h: ModellingHypothesis,
    hb: ModellingHypothesis,
    layout: &MaterialPropertiesLayout,
) -> Result<HandlerInput> {
    let mut input = HandlerInput::new(hb);
    input.dt = call.dtime;
    input.temperature = call.temperature;
    input.temperature_increment = call.temperature_increment;
    if B::BEHAVIOUR_TYPE == BehaviourType::CohesiveZoneModel {
        let n = hb.space_dimension()?;
        input.gradients0 = import_cohesive(call.stran, n)?;
        input.gradients1 = &input.gradients0 + import_cohesive(call.dstran, n)?;
        input.thermodynamic_forces = import_cohesive(call.stress, n)?;
    } else if B::BEHAVIOUR_TYPE == BehaviourType::StandardFiniteStrain {
        input.gradients0 = mandel::matrix_to_tensor(&fortran_to_matrix(call.dfgrd0)?, hb)?;
        input.gradients1 = mandel::matrix_to_tensor(&fortran_to_matrix(call.dfgrd1)?, hb)?;
        input.thermodynamic_forces = views::import_stensor(call.stress, hb, Castem::STRESS_CONVENTION)?;
    } else {
        input.gradients0 = views::import_stensor(call.stran, hb, Castem::STRAIN_CONVENTION)?;
        input.gradients1 =
            &input.gradients0 + views::import_stensor(call.dstran, hb, Castem::STRAIN_CONVENTION)?;
        input.thermodynamic_forces = views::import_stensor(call.stress, hb, Castem::STRESS_CONVENTION)?;
    }
    if B::REQUIRES_STIFFNESS_TENSOR {
        input.elastic_properties = Castem::elastic_properties(layout, call.props, h)?;
    }
    if B::REQUIRES_THERMAL_EXPANSION_COEFFICIENT_TENSOR {
        input.thermal_expansion_properties = layout.gather(call.props, PropertyRole::ThermalExpansion)?;
    }
    input.material_properties = behaviour_properties::<B>(layout, call.props)?;
    let nisv = B::internal_variables_nb(hb)?;
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
    if B::SYMMETRY == SymmetryType::Orthotropic && call.drot.len() >= 9 {
        input.rotation = Some(Matrix3::from_column_slice(&call.drot[..9]));
    }
    Ok(input)
}

/// Writes the results of a converged step. `isvs` may hold more values
/// than the behaviour's state variables.
pub(crate) fn export<B: Behaviour>(
    output: &StepOutput,
    isvs: &[f64],
    call: &mut CastemCall<'_>,
) -> Result<()> {
    if B::BEHAVIOUR_TYPE == BehaviourType::CohesiveZoneModel {
        export_cohesive(&output.thermodynamic_forces, call.stress);
    } else {
        views::export_stensor(&output.thermodynamic_forces, call.stress, Castem::STRESS_CONVENTION)?;
    }
    if call.statev.len() < isvs.len() {
        return Err(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: isvs.len(),
            got: call.statev.len(),
        });
    }
    call.statev[..isvs.len()].copy_from_slice(isvs);
    if let Some(k) = &output.tangent {
        let d = if B::BEHAVIOUR_TYPE == BehaviourType::CohesiveZoneModel {
            cohesive_operator(k)
        } else {
            normalize_tangent(k)
        };
        views::export_tangent(
            &d,
            call.ddsdde,
            Castem::STORAGE_ORDER,
            B::IS_CONSISTENT_TANGENT_OPERATOR_SYMMETRIC,
        )?;
    }
    if output.time_step_scaling_factor < 1.0 {
        *call.pnewdt = call.pnewdt.min(output.time_step_scaling_factor);
    }
    Ok(())
}

fn interpolate(x0: &DVector<f64>, x1: &DVector<f64>, a: f64) -> DVector<f64> {
    x0 + (x1 - x0) * a
}

fn interpolate_slice(x0: &[f64], dx: &[f64], a: f64) -> Vec<f64> {
    x0.iter().zip(dx).map(|(x, d)| x + a * d).collect()
}

/// Integrates the step, with internal sub-stepping for the behaviours which
/// allow it.
pub(crate) fn run<B: Behaviour>(
    input: HandlerInput,
    options: &HandlerOptions,
    sfe: Option<&dyn StressFreeExpansionHandler>,
    parameters: &ParameterStore,
) -> Result<StepOutcome> {
    if B::MAXIMUM_SUB_STEPPING == 0 || options.prediction {
        return handler::execute::<B>(input, options, sfe, parameters);
    }
    let mut forces = input.thermodynamic_forces.clone();
    let mut isvs = input.internal_state_variables.clone();
    let mut factor = 1.0_f64;
    let (mut t, mut window) = (0.0_f64, 1.0_f64);
    let mut failures = 0;
    let mut last = None;
    while t < 1.0 {
        let last_sub_step = window >= 1.0 - t;
        let dtf = if last_sub_step { 1.0 - t } else { window };
        let mut sub = input.clone();
        sub.dt = input.dt * dtf;
        sub.temperature = input.temperature + t * input.temperature_increment;
        sub.temperature_increment = dtf * input.temperature_increment;
        sub.gradients0 = interpolate(&input.gradients0, &input.gradients1, t);
        sub.gradients1 = interpolate(&input.gradients0, &input.gradients1, t + dtf);
        sub.thermodynamic_forces = forces.clone();
        sub.internal_state_variables = isvs.clone();
        sub.external_state_variables = interpolate_slice(
            &input.external_state_variables,
            &input.external_state_variables_increments,
            t,
        );
        sub.external_state_variables_increments = input
            .external_state_variables_increments
            .iter()
            .map(|d| d * dtf)
            .collect();
        match handler::execute::<B>(sub, options, sfe, parameters)? {
            StepOutcome::Converged(output) => {
                t = if last_sub_step { 1.0 } else { t + dtf };
                forces = output.thermodynamic_forces.clone();
                isvs = output.internal_state_variables.clone();
                factor = factor.min(output.time_step_scaling_factor);
                last = Some(output);
            }
            StepOutcome::Failed { .. } => {
                failures += 1;
                if failures > B::MAXIMUM_SUB_STEPPING {
                    return Err(BehaviourError::MaximumSubSteppingReached(B::NAME.to_string()));
                }
                window = dtf / 2.0;
                tracing::debug!(behaviour = B::NAME, start = t, window, "sub-step failed, halving");
            }
        }
    }
    let output = last.ok_or_else(|| BehaviourError::Internal("empty sub-stepping".to_string()))?;
    Ok(StepOutcome::Converged(StepOutput {
        time_step_scaling_factor: factor,
        ..output
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohesive::LinearCohesiveZone;
    use crate::finitestrain::SaintVenantKirchhoff;
    use crate::smallstrain::{lame_coefficients, Elasticity, MisesPlasticity, OrthotropicElasticity};
    use approx::assert_relative_eq;

    const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    struct Buffers {
        stress: Vec<f64>,
        statev: Vec<f64>,
        ddsdde: Vec<f64>,
        stran: Vec<f64>,
        dstran: Vec<f64>,
        props: Vec<f64>,
        drot: Vec<f64>,
        dfgrd0: Vec<f64>,
        dfgrd1: Vec<f64>,
        pnewdt: f64,
    }

    impl Buffers {
        fn new(ntens: usize, nstatv: usize, props: &[f64], dstran: &[f64], request: f64) -> Self {
            let mut ddsdde = vec![0.0; ntens * ntens];
            ddsdde[0] = request;
            Self {
                stress: vec![0.0; ntens],
                statev: vec![0.0; nstatv],
                ddsdde,
                stran: vec![0.0; ntens],
                dstran: dstran.to_vec(),
                props: props.to_vec(),
                drot: IDENTITY.to_vec(),
                dfgrd0: IDENTITY.to_vec(),
                dfgrd1: IDENTITY.to_vec(),
                pnewdt: 1.0,
            }
        }

        fn call(&mut self, ndi: i32) -> CastemCall<'_> {
            CastemCall {
                stress: &mut self.stress,
                statev: &mut self.statev,
                ddsdde: &mut self.ddsdde,
                stran: &self.stran,
                dstran: &self.dstran,
                dfgrd0: &self.dfgrd0,
                dfgrd1: &self.dfgrd1,
                dtime: 1.0,
                temperature: 293.15,
                temperature_increment: 0.0,
                predef: &[],
                dpred: &[],
                ndi,
                ntens: self.stran.len(),
                props: &self.props,
                drot: &self.drot,
                pnewdt: &mut self.pnewdt,
            }
        }
    }

    #[test]
    fn ndi_codes() {
        assert_eq!(hypothesis_from_ndi(14).unwrap(), ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain);
        assert_eq!(hypothesis_from_ndi(-3).unwrap(), ModellingHypothesis::GeneralisedPlaneStrain);
        assert_eq!(hypothesis_from_ndi(5).unwrap_err().status_code(), -2);
    }

    #[test]
    fn orthotropic_plane_stress_layout() {
        let h = ModellingHypothesis::PlaneStress;
        let layout = Castem::material_properties_layout::<OrthotropicElasticity>(h).unwrap();
        assert_eq!(layout.len(), 13);
        let props: Vec<f64> = (0..13).map(f64::from).collect();
        let e = Castem::elastic_properties(&layout, &props, h).unwrap();
        // E1 E2 E3 nu12 nu23 nu13 G12
        assert_eq!(e, vec![0.0, 1.0, 6.0, 2.0, 7.0, 8.0, 3.0]);
        let layout = Castem::material_properties_layout::<OrthotropicElasticity>(ModellingHypothesis::Tridimensional)
            .unwrap();
        assert_eq!(layout.len(), 19);
    }

    #[test]
    fn elastic_step_writes_the_normalised_tangent() {
        let mut b = Buffers::new(6, 1, &[200e3, 0.3, 7800.0, 0.0], &[1e-3, 0.0, 0.0, 2e-3, 0.0, 0.0], 1.0);
        let kinc = umat::<Elasticity>(b.call(2), None, &ParameterStore::new());
        assert_eq!(kinc, 1);
        let mu = 200e3 / 2.6;
        // engineering shear strain 2e-3 gives sigma_xy = mu * 2e-3
        assert_relative_eq!(b.stress[3], mu * 2e-3, max_relative = 1e-12);
        assert_relative_eq!(b.ddsdde[3 * 6 + 3], mu, max_relative = 1e-12);
    }

    #[test]
    fn wrong_number_of_material_properties() {
        let mut b = Buffers::new(6, 1, &[200e3, 0.3, 7800.0], &[0.0; 6], 0.0);
        assert_eq!(umat::<Elasticity>(b.call(2), None, &ParameterStore::new()), -2);
    }

    #[test]
    fn cohesive_components_are_swapped() {
        let props = [0.0, 0.0, 0.0, 0.0, 1e6, 1e4];
        // tangential opening first, normal last
        let mut b = Buffers::new(2, 1, &props, &[2e-3, 1e-3], 1.0);
        assert_eq!(umat::<LinearCohesiveZone>(b.call(-1), None, &ParameterStore::new()), 1);
        assert_relative_eq!(b.stress[0], 20.0, max_relative = 1e-12);
        assert_relative_eq!(b.stress[1], 1e3, max_relative = 1e-12);
        assert_eq!(b.ddsdde, vec![1e4, 0.0, 0.0, 1e6]);
    }

    #[test]
    fn sub_stepping_recovers_from_failures() {
        // interface block (E, nu, rho, alpha) then the behaviour's properties
        let props = [200e3, 0.3, 7800.0, 0.0, 200e3, 0.3, 300.0, 10e3];
        let dstran = [4e-3, -1e-3, -1e-3, 0.0, 0.0, 0.0];
        let mut reference = Buffers::new(6, 7, &props, &dstran, 0.0);
        assert_eq!(umat::<MisesPlasticity>(reference.call(2), None, &ParameterStore::new()), 1);
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_strain_increment", 1.5e-3);
        let mut b = Buffers::new(6, 7, &props, &dstran, 0.0);
        assert_eq!(umat::<MisesPlasticity>(b.call(2), None, &parameters), 1);
        for i in 0..6 {
            assert_relative_eq!(b.stress[i], reference.stress[i], epsilon = 1e-8, max_relative = 1e-8);
        }
        assert_relative_eq!(b.statev[6], reference.statev[6], max_relative = 1e-8);

        parameters.set_parameter("maximum_strain_increment", 1e-6);
        let mut b = Buffers::new(6, 7, &props, &dstran, 0.0);
        assert_eq!(umat::<MisesPlasticity>(b.call(2), None, &parameters), -2);
    }

    /// Column-major `diag(stretch, 1, 1)`.
    fn uniaxial_stretch(stretch: f64) -> Vec<f64> {
        let mut f = IDENTITY.to_vec();
        f[0] = stretch;
        f
    }

    #[test]
    fn finite_strain_behaviours_exchange_the_cauchy_stress() {
        let (young, nu, stretch) = (200e3, 0.3, 1.01);
        let (lambda, mu) = lame_coefficients(young, nu);
        let egl = 0.5 * (stretch * stretch - 1.0);
        let mut b = Buffers::new(6, 1, &[young, nu, 7800.0, 0.0], &[0.0; 6], 1.0);
        b.dfgrd1 = uniaxial_stretch(stretch);
        assert_eq!(umat::<SaintVenantKirchhoff>(b.call(2), None, &ParameterStore::new()), 1);
        assert_relative_eq!(b.stress[0], stretch * (lambda + 2.0 * mu) * egl, max_relative = 1e-10);
        assert_relative_eq!(b.stress[1], lambda * egl / stretch, max_relative = 1e-10);
        // Truesdell rate moduli
        assert_relative_eq!(b.ddsdde[0], stretch.powi(3) * (lambda + 2.0 * mu), max_relative = 1e-10);
    }

    #[test]
    fn finite_rotation_small_strain_uniaxial_stretch() {
        let (young, nu, stretch) = (200e3, 0.3, 1.01);
        let (lambda, mu) = lame_coefficients(young, nu);
        let egl = 0.5 * (stretch * stretch - 1.0);
        let mut b = Buffers::new(6, 1, &[young, nu, 7800.0, 0.0], &[0.0; 6], 1.0);
        b.dfgrd1 = uniaxial_stretch(stretch);
        let kinc = umat_finite_rotation_small_strain::<Elasticity>(b.call(2), None, &ParameterStore::new());
        assert_eq!(kinc, 1);
        // sigma = F S F^T / J with S = C : E
        assert_relative_eq!(b.stress[0], stretch * (lambda + 2.0 * mu) * egl, max_relative = 1e-10);
        assert_relative_eq!(b.stress[1], lambda * egl / stretch, max_relative = 1e-10);
        assert_relative_eq!(b.stress[3], 0.0);
        assert_relative_eq!(b.ddsdde[0], stretch.powi(3) * (lambda + 2.0 * mu), max_relative = 1e-10);
        assert_relative_eq!(b.ddsdde[1], stretch * lambda, max_relative = 1e-10);
    }

    #[test]
    fn finite_rotation_small_strain_rotates_the_stress() {
        let mut b = Buffers::new(6, 1, &[200e3, 0.3, 7800.0, 0.0], &[0.0; 6], 0.0);
        b.stress[0] = 100.0;
        // quarter turn around z
        b.dfgrd1 = vec![0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let kinc = umat_finite_rotation_small_strain::<Elasticity>(b.call(2), None, &ParameterStore::new());
        assert_eq!(kinc, 1);
        assert_relative_eq!(b.stress[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(b.stress[1], 100.0, max_relative = 1e-12);
        assert_relative_eq!(b.stress[3], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn finite_rotation_small_strain_requires_the_axial_strain_in_plane_stress() {
        let mut b = Buffers::new(4, 1, &[200e3, 0.3, 7800.0, 0.0, 1.0], &[0.0; 4], 1.0);
        b.stress[0] = 10.0;
        b.dfgrd1 = uniaxial_stretch(1.01);
        let kinc = umat_finite_rotation_small_strain::<Elasticity>(b.call(-2), None, &ParameterStore::new());
        assert_eq!(kinc, -2);
        assert_eq!(b.stress, vec![10.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn finite_rotation_small_strain_through_the_plane_stress_algorithm() {
        let (young, nu, stretch) = (200e3, 0.3, 1.0001);
        let egl = 0.5 * (stretch * stretch - 1.0);
        let props = [young, nu, 7800.0, 0.0, 1.0, young, nu, 300.0, 10e3];
        let mut b = Buffers::new(4, 6, &props, &[0.0; 4], 0.0);
        b.dfgrd1 = uniaxial_stretch(stretch);
        let kinc = umat_finite_rotation_small_strain::<MisesPlasticity>(b.call(-2), None, &ParameterStore::new());
        assert_eq!(kinc, 1);
        let ezz = b.statev[5];
        assert_relative_eq!(ezz, -nu / (1.0 - nu) * egl, max_relative = 1e-8);
        let fzz = (1.0 + 2.0 * ezz).sqrt();
        let sxx = young / (1.0 - nu * nu) * egl;
        assert_relative_eq!(b.stress[0], stretch * sxx / fzz, max_relative = 1e-8);
        assert_relative_eq!(b.stress[2], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn finite_rotation_small_strain_rejects_finite_strain_behaviours() {
        let mut b = Buffers::new(6, 1, &[200e3, 0.3, 7800.0, 0.0], &[0.0; 6], 0.0);
        let kinc =
            umat_finite_rotation_small_strain::<SaintVenantKirchhoff>(b.call(2), None, &ParameterStore::new());
        assert_eq!(kinc, -2);
    }
}
