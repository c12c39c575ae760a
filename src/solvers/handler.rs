//! Integration of one behaviour over one time step, shared by every solver
//! interface.
//!
//! The handler only sees canonical quantities: the solver modules import
//! their buffers into a [`HandlerInput`] and export the [`StepOutcome`].
//! The sequence is the same for every solver:
//!
//! 1. reject a missing stress-free expansion handler, an undefined
//!    modelling hypothesis and a negative time step;
//! 2. build the stiffness and thermal expansion tensors requested by the
//!    behaviour, rotate the inputs in the material frame and remove the
//!    stress-free expansion;
//! 3. compute the prediction operator, or integrate the behaviour between
//!    the a priori and a posteriori time step scaling factors;
//! 4. convert the tangent operator to the one expected by the solver and
//!    rotate the results back.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::finite_strain::axial_deformation_gradient;
use crate::interfaces::{
    axial_strain_offset, Behaviour, BehaviourData, BehaviourType, IntegrationResult,
    OutOfBoundsPolicy, StiffnessMatrixType, SymmetryType, TangentOperatorFlag,
};
use crate::mandel;
use crate::parameters::ParameterStore;
use crate::stiffness::{compute_stiffness_tensor, compute_thermal_expansion_coefficient_tensor};
use crate::stress_free_expansion::StressFreeExpansionHandler;
use crate::tangent_operator::{self, ConversionContext};
use nalgebra::{DMatrix, DVector, Matrix3};

/// Canonical inputs of one integration.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerInput {
    pub hypothesis: ModellingHypothesis,
    pub dt: f64,
    pub temperature: f64,
    pub temperature_increment: f64,
    pub gradients0: DVector<f64>,
    pub gradients1: DVector<f64>,
    pub thermodynamic_forces: DVector<f64>,
    /// Elastic constants, in the order of the stiffness builders.
    pub elastic_properties: Vec<f64>,
    pub thermal_expansion_properties: Vec<f64>,
    /// The behaviour's own material properties.
    pub material_properties: Vec<f64>,
    pub internal_state_variables: Vec<f64>,
    pub external_state_variables: Vec<f64>,
    pub external_state_variables_increments: Vec<f64>,
    /// Material axes expressed in the global frame (one per column). Only
    /// used by orthotropic behaviours.
    pub rotation: Option<Matrix3<f64>>,
}

impl HandlerInput {
    pub fn new(h: ModellingHypothesis) -> Self {
        Self {
            hypothesis: h,
            dt: 0.0,
            temperature: 0.0,
            temperature_increment: 0.0,
            gradients0: DVector::zeros(0),
            gradients1: DVector::zeros(0),
            thermodynamic_forces: DVector::zeros(0),
            elastic_properties: Vec::new(),
            thermal_expansion_properties: Vec::new(),
            material_properties: Vec::new(),
            internal_state_variables: Vec::new(),
            external_state_variables: Vec::new(),
            external_state_variables_increments: Vec::new(),
            rotation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandlerOptions {
    pub stiffness: StiffnessMatrixType,
    /// Compute the prediction operator instead of integrating.
    pub prediction: bool,
    pub out_of_bounds_policy: OutOfBoundsPolicy,
    /// Operator expected by the solver for finite strain behaviours.
    pub tangent_operator: TangentOperatorFlag,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            stiffness: StiffnessMatrixType::NoStiffness,
            prediction: false,
            out_of_bounds_policy: OutOfBoundsPolicy::None,
            tangent_operator: TangentOperatorFlag::DSIG_DF,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub result: IntegrationResult,
    pub thermodynamic_forces: DVector<f64>,
    pub internal_state_variables: Vec<f64>,
    pub tangent: Option<DMatrix<f64>>,
    pub time_step_scaling_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Converged(StepOutput),
    /// The step must be restarted with a time step multiplied by the factor.
    Failed { time_step_scaling_factor: f64 },
}

/// Change of basis between the global and the material frames.
///
/// Finite strain behaviours see the deformation gradient `Rᵀ F R` and their
/// tangent operator is rotated back after its conversion, which requires an
/// operator between symmetric tensors.
struct MaterialFrame {
    /// global -> material
    r: Matrix3<f64>,
    q: DMatrix<f64>,
    finite_strain: bool,
}

impl MaterialFrame {
    fn new<B: Behaviour>(
        rotation: Option<Matrix3<f64>>,
        h: ModellingHypothesis,
        tangent_operator: TangentOperatorFlag,
    ) -> Result<Option<Self>> {
        let rotation = match rotation {
            Some(r) if B::SYMMETRY == SymmetryType::Orthotropic => r,
            _ => return Ok(None),
        };
        if h.space_dimension()? == 1 {
            return Ok(None);
        }
        let finite_strain = match B::BEHAVIOUR_TYPE {
            BehaviourType::StandardStrainBased => false,
            BehaviourType::StandardFiniteStrain if tangent_operator.is_with_respect_to_tensor() => {
                return Err(BehaviourError::UnsupportedCase(format!(
                    "the tangent operator '{tangent_operator}' of '{}' can not be rotated back from the material frame",
                    B::NAME
                )))
            }
            BehaviourType::StandardFiniteStrain => true,
            _ => return Ok(None),
        };
        let n = h.stensor_size()?;
        let r = rotation.transpose();
        let q = mandel::stensor_push_forward_operator(&r);
        Ok(Some(Self {
            r,
            q: DMatrix::from_fn(n, n, |i, j| q[(i, j)]),
            finite_strain,
        }))
    }

    fn to_material(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.q * v
    }

    fn gradients_to_material(&self, g: &DVector<f64>, h: ModellingHypothesis) -> Result<DVector<f64>> {
        if !self.finite_strain {
            return Ok(self.to_material(g));
        }
        let f = mandel::tensor_to_matrix(g, h)?;
        mandel::matrix_to_tensor(&(self.r * f * self.r.transpose()), h)
    }

    fn to_global(&self, v: &DVector<f64>) -> DVector<f64> {
        self.q.tr_mul(v)
    }

    fn operator_to_global(&self, k: &DMatrix<f64>) -> DMatrix<f64> {
        self.q.tr_mul(k) * &self.q
    }
}

fn check_size(v: &DVector<f64>, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(BehaviourError::InvalidTensorSize {
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

/// Builds the behaviour data in the material frame, stress-free expansion
/// removed.
fn behaviour_data<B: Behaviour>(
    input: HandlerInput,
    frame: Option<&MaterialFrame>,
    sfe: Option<&dyn StressFreeExpansionHandler>,
    parameters: &ParameterStore,
) -> Result<BehaviourData> {
    let h = input.hypothesis;
    let mut data = BehaviourData::new(B::BEHAVIOUR_TYPE, h)?;
    check_size(&input.gradients0, data.gradients0.len())?;
    check_size(&input.gradients1, data.gradients1.len())?;
    check_size(&input.thermodynamic_forces, data.thermodynamic_forces.len())?;
    data.dt = input.dt;
    data.temperature = input.temperature;
    data.temperature_increment = input.temperature_increment;
    match frame {
        Some(frame) => {
            data.gradients0 = frame.gradients_to_material(&input.gradients0, h)?;
            data.gradients1 = frame.gradients_to_material(&input.gradients1, h)?;
            data.thermodynamic_forces = frame.to_material(&input.thermodynamic_forces);
        }
        None => {
            data.gradients0 = input.gradients0;
            data.gradients1 = input.gradients1;
            data.thermodynamic_forces = input.thermodynamic_forces;
        }
    }
    if B::REQUIRES_STIFFNESS_TENSOR {
        data.stiffness_tensor = Some(compute_stiffness_tensor(
            B::BEHAVIOUR_TYPE,
            h,
            B::SYMMETRY,
            h.is_plane_stress(),
            &input.elastic_properties,
        )?);
    }
    if B::REQUIRES_THERMAL_EXPANSION_COEFFICIENT_TENSOR {
        data.thermal_expansion = Some(compute_thermal_expansion_coefficient_tensor(
            h,
            B::SYMMETRY,
            &input.thermal_expansion_properties,
        )?);
    }
    data.material_properties = input.material_properties;
    data.internal_state_variables = input.internal_state_variables;
    data.external_state_variables = input.external_state_variables;
    data.external_state_variables_increments = input.external_state_variables_increments;
    if B::HAS_STRESS_FREE_EXPANSION {
        if let Some(handler) = sfe {
            let (s0, s1) = B::compute_stress_free_expansion(&data, parameters)?;
            handler.apply(&mut data.gradients0, &mut data.gradients1, &s0, &s1, h)?;
        }
    }
    Ok(data)
}

/// Finite strain behaviours used in plane stress track the through-thickness
/// stretch in their `AxialStrain` state variable, which replaces the `F33`
/// component of the gradients. Returns the position of that variable.
fn plane_stress_axial_strain<B: Behaviour>(input: &mut HandlerInput) -> Result<Option<usize>> {
    let h = input.hypothesis;
    if B::BEHAVIOUR_TYPE != BehaviourType::StandardFiniteStrain || !h.is_plane_stress() {
        return Ok(None);
    }
    let variables = B::internal_state_variables_descriptors(h);
    let offset = axial_strain_offset(&variables, h, B::NAME)?;
    let fzz = axial_deformation_gradient(&input.internal_state_variables, &variables, h, B::NAME)?;
    for g in [&mut input.gradients0, &mut input.gradients1] {
        if let Some(f33) = g.get_mut(2) {
            *f33 = fzz;
        }
    }
    Ok(Some(offset))
}

/// Kinematics needed to convert a finite strain tangent operator.
struct Kinematics {
    f0: Matrix3<f64>,
    f1: Matrix3<f64>,
}

fn finite_strain_tangent<B: Behaviour>(
    k: &DMatrix<f64>,
    h: ModellingHypothesis,
    kinematics: &Kinematics,
    cauchy: &DVector<f64>,
    to: TangentOperatorFlag,
) -> Result<DMatrix<f64>> {
    let from = B::TANGENT_OPERATOR;
    let k3 = tangent_operator::embed(k, 6, tangent_operator::operator_columns(from))?;
    let ctx = ConversionContext::new(kinematics.f0, kinematics.f1, mandel::stensor_to_matrix(cauchy, h)?);
    let r = tangent_operator::convert(from, to, &k3, &ctx)?;
    let ncols = if to.is_with_respect_to_tensor() {
        h.tensor_size()?
    } else {
        h.stensor_size()?
    };
    Ok(tangent_operator::truncate(&r, h.stensor_size()?, ncols))
}

fn solver_tangent<B: Behaviour>(
    behaviour: &B,
    h: ModellingHypothesis,
    options: &HandlerOptions,
    kinematics: Option<&Kinematics>,
    frame: Option<&MaterialFrame>,
) -> Result<DMatrix<f64>> {
    let k = behaviour.tangent_operator();
    let k = match kinematics {
        Some(kinematics) => finite_strain_tangent::<B>(
            k,
            h,
            kinematics,
            behaviour.thermodynamic_forces(),
            options.tangent_operator,
        )?,
        None => k.clone(),
    };
    Ok(match frame {
        Some(frame) => frame.operator_to_global(&k),
        None => k,
    })
}

/// Integrates `B` over one time step.
pub fn execute<B: Behaviour>(
    mut input: HandlerInput,
    options: &HandlerOptions,
    sfe: Option<&dyn StressFreeExpansionHandler>,
    parameters: &ParameterStore,
) -> Result<StepOutcome> {
    if B::HAS_STRESS_FREE_EXPANSION && sfe.is_none() {
        return Err(BehaviourError::UnsupportedStressFreeExpansion(B::NAME.to_string()));
    }
    let h = input.hypothesis;
    if !B::is_defined(h) {
        return Err(BehaviourError::invalid_hypothesis(B::NAME, h));
    }
    if input.dt < 0.0 {
        return Err(BehaviourError::NegativeTimeStep(input.dt, B::NAME.to_string()));
    }
    let axial_strain = plane_stress_axial_strain::<B>(&mut input)?;
    let frame = MaterialFrame::new::<B>(input.rotation, h, options.tangent_operator)?;
    let forces0 = input.thermodynamic_forces.clone();
    let isvs0 = input.internal_state_variables.clone();
    let data = behaviour_data::<B>(input, frame.as_ref(), sfe, parameters)?;
    let mut kinematics = match B::BEHAVIOUR_TYPE {
        BehaviourType::StandardFiniteStrain => {
            let (f0, f1) = data.deformation_gradients()?;
            Some(Kinematics { f0, f1 })
        }
        _ => None,
    };
    let mut behaviour = B::new(data, parameters)?;
    behaviour.set_out_of_bounds_policy(options.out_of_bounds_policy);
    behaviour.initialize()?;
    behaviour.check_bounds()?;
    if options.prediction {
        if !B::HAS_PREDICTION_OPERATOR {
            return Err(BehaviourError::PredictionOperatorIsNotAvailable(B::NAME.to_string()));
        }
        let result = behaviour.compute_prediction_operator(options.stiffness)?;
        if result == IntegrationResult::Failure {
            return Ok(StepOutcome::Failed {
                time_step_scaling_factor: behaviour.minimal_time_step_scaling_factor(),
            });
        }
        return Ok(StepOutcome::Converged(StepOutput {
            result,
            thermodynamic_forces: forces0,
            internal_state_variables: isvs0,
            tangent: Some(solver_tangent(&behaviour, h, options, kinematics.as_ref(), frame.as_ref())?),
            time_step_scaling_factor: 1.0,
        }));
    }
    let (ok, mut factor) = behaviour.compute_a_priori_time_step_scaling_factor();
    if !ok {
        tracing::debug!(behaviour = B::NAME, factor, "a priori time step scaling factor rejected the step");
        return Ok(StepOutcome::Failed {
            time_step_scaling_factor: factor,
        });
    }
    let result = match behaviour.integrate(options.stiffness) {
        Ok(result) => result,
        Err(e) if e.is_numerical() => {
            tracing::debug!(behaviour = B::NAME, error = %e, "integration failed");
            IntegrationResult::Failure
        }
        Err(e) => return Err(e),
    };
    if result == IntegrationResult::Failure {
        return Ok(StepOutcome::Failed {
            time_step_scaling_factor: factor.min(behaviour.minimal_time_step_scaling_factor()),
        });
    }
    let (ok, a_posteriori) = behaviour.compute_a_posteriori_time_step_scaling_factor();
    if !ok {
        return Ok(StepOutcome::Failed {
            time_step_scaling_factor: a_posteriori,
        });
    }
    factor = factor.min(a_posteriori);
    if let (Some(offset), Some(kinematics)) = (axial_strain, kinematics.as_mut()) {
        if let Some(ezz) = behaviour.internal_state_variables().get(offset) {
            kinematics.f1[(2, 2)] = 1.0 + ezz;
        }
    }
    let result = if factor < 1.0 {
        IntegrationResult::UnreliableResults
    } else {
        result
    };
    behaviour.check_bounds()?;
    let tangent = match options.stiffness {
        StiffnessMatrixType::NoStiffness => None,
        StiffnessMatrixType::ConsistentTangent if !B::HAS_CONSISTENT_TANGENT_OPERATOR => {
            return Err(BehaviourError::ConsistentTangentOperatorIsNotAvailable(B::NAME.to_string()))
        }
        _ => Some(solver_tangent(&behaviour, h, options, kinematics.as_ref(), frame.as_ref())?),
    };
    let forces = behaviour.thermodynamic_forces();
    Ok(StepOutcome::Converged(StepOutput {
        result,
        thermodynamic_forces: match &frame {
            Some(frame) => frame.to_global(forces),
            None => forces.clone(),
        },
        internal_state_variables: behaviour.internal_state_variables().to_vec(),
        tangent,
        time_step_scaling_factor: factor,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finitestrain::SaintVenantKirchhoff;
    use crate::smallstrain::{Elasticity, MisesPlasticity, OrthotropicElasticity, ThermoElasticity};
    use approx::assert_relative_eq;

    fn small_strain_input(h: ModellingHypothesis, deto: &[f64]) -> HandlerInput {
        let n = h.stensor_size().unwrap();
        let mut input = HandlerInput::new(h);
        input.dt = 1.0;
        input.temperature = 293.15;
        input.gradients0 = DVector::zeros(n);
        input.gradients1 = DVector::from_column_slice(deto);
        input.thermodynamic_forces = DVector::zeros(n);
        input
    }

    fn converged(outcome: StepOutcome) -> StepOutput {
        match outcome {
            StepOutcome::Converged(output) => output,
            StepOutcome::Failed { .. } => panic!("unexpected failure"),
        }
    }

    #[test]
    fn uniaxial_elastic_step() {
        let mut input = small_strain_input(ModellingHypothesis::Tridimensional, &[1e-3, 0.0, 0.0, 0.0, 0.0, 0.0]);
        input.elastic_properties = vec![200e3, 0.3];
        let options = HandlerOptions {
            stiffness: StiffnessMatrixType::ConsistentTangent,
            ..HandlerOptions::default()
        };
        let output = converged(execute::<Elasticity>(input, &options, None, &ParameterStore::new()).unwrap());
        assert_eq!(output.result, IntegrationResult::Success);
        assert_eq!(output.time_step_scaling_factor, 1.0);
        assert_relative_eq!(output.thermodynamic_forces[0], 269.2307692307692, max_relative = 1e-12);
        assert_eq!(output.tangent.unwrap().nrows(), 6);
    }

    #[test]
    fn uniaxial_stress_step() {
        let nu = 0.3;
        let deto = [1e-3, -nu * 1e-3, -nu * 1e-3, 0.0, 0.0, 0.0];
        let mut input = small_strain_input(ModellingHypothesis::Tridimensional, &deto);
        input.elastic_properties = vec![200e3, nu];
        let outcome = execute::<Elasticity>(input, &HandlerOptions::default(), None, &ParameterStore::new());
        let output = converged(outcome.unwrap());
        assert_eq!(output.result, IntegrationResult::Success);
        assert_eq!(output.time_step_scaling_factor, 1.0);
        let sig = &output.thermodynamic_forces;
        assert_relative_eq!(sig[0], 200.0, max_relative = 1e-12);
        assert_relative_eq!(sig[1], 0.0, epsilon = 1e-10);
        assert_relative_eq!(sig[2], 0.0, epsilon = 1e-10);
        assert_eq!(&sig.as_slice()[3..], &[0.0; 3]);
    }

    #[test]
    fn missing_stress_free_expansion_handler_is_checked_first() {
        let mut input = HandlerInput::new(ModellingHypothesis::Undefined);
        input.dt = -1.0;
        let err = execute::<ThermoElasticity>(input, &HandlerOptions::default(), None, &ParameterStore::new())
            .unwrap_err();
        assert!(matches!(err, BehaviourError::UnsupportedStressFreeExpansion(_)));
    }

    #[test]
    fn negative_time_step() {
        let mut input = small_strain_input(ModellingHypothesis::PlaneStrain, &[0.0; 4]);
        input.dt = -1.0;
        input.elastic_properties = vec![200e3, 0.3];
        let err = execute::<Elasticity>(input, &HandlerOptions::default(), None, &ParameterStore::new())
            .unwrap_err();
        assert!(matches!(err, BehaviourError::NegativeTimeStep(..)));
    }

    #[test]
    fn failures_report_the_minimal_factor() {
        let mut input = small_strain_input(ModellingHypothesis::Tridimensional, &[1e-2, 0.0, 0.0, 0.0, 0.0, 0.0]);
        input.material_properties = vec![200e3, 0.3, 300.0, 0.0];
        input.internal_state_variables = vec![0.0; 7];
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_strain_increment", 1e-3);
        let outcome = execute::<MisesPlasticity>(input, &HandlerOptions::default(), None, &parameters).unwrap();
        assert_eq!(outcome, StepOutcome::Failed { time_step_scaling_factor: 0.1 });
    }

    #[test]
    fn large_plastic_increments_are_unreliable() {
        let mut input = small_strain_input(ModellingHypothesis::Tridimensional, &[1e-2, 0.0, 0.0, 0.0, 0.0, 0.0]);
        input.material_properties = vec![200e3, 0.3, 300.0, 0.0];
        input.internal_state_variables = vec![0.0; 7];
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_plastic_increment", 1e-3);
        let output = converged(execute::<MisesPlasticity>(input, &HandlerOptions::default(), None, &parameters).unwrap());
        assert_eq!(output.result, IntegrationResult::UnreliableResults);
        assert!(output.time_step_scaling_factor < 1.0);
    }

    #[test]
    fn prediction_operator_availability() {
        let h = ModellingHypothesis::Tridimensional;
        let options = HandlerOptions {
            stiffness: StiffnessMatrixType::Elastic,
            prediction: true,
            ..HandlerOptions::default()
        };
        let mut input = HandlerInput::new(h);
        input.gradients0 = mandel::tensor_identity(h).unwrap();
        input.gradients1 = input.gradients0.clone();
        input.thermodynamic_forces = DVector::zeros(6);
        input.elastic_properties = vec![200e3, 0.3];
        let err = execute::<SaintVenantKirchhoff>(input, &options, None, &ParameterStore::new()).unwrap_err();
        assert!(matches!(err, BehaviourError::PredictionOperatorIsNotAvailable(_)));

        let mut input = small_strain_input(h, &[1e-3, 0.0, 0.0, 0.0, 0.0, 0.0]);
        input.elastic_properties = vec![200e3, 0.3];
        let output = converged(execute::<Elasticity>(input, &options, None, &ParameterStore::new()).unwrap());
        assert_eq!(output.thermodynamic_forces, DVector::zeros(6));
        assert!(output.tangent.is_some());
    }

    #[test]
    fn orthotropic_behaviours_are_integrated_in_the_material_frame() {
        let h = ModellingHypothesis::PlaneStrain;
        let props = vec![100e3, 200e3, 150e3, 0.3, 0.3, 0.3, 50e3];
        // material axis 1 along the global y axis
        let rotation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let mut rotated = small_strain_input(h, &[0.0, 1e-3, 0.0, 0.0]);
        rotated.elastic_properties = props.clone();
        rotated.rotation = Some(rotation);
        let mut reference = small_strain_input(h, &[1e-3, 0.0, 0.0, 0.0]);
        reference.elastic_properties = props;
        let options = HandlerOptions {
            stiffness: StiffnessMatrixType::Elastic,
            ..HandlerOptions::default()
        };
        let parameters = ParameterStore::new();
        let rotated = converged(execute::<OrthotropicElasticity>(rotated, &options, None, &parameters).unwrap());
        let reference = converged(execute::<OrthotropicElasticity>(reference, &options, None, &parameters).unwrap());
        assert_relative_eq!(rotated.thermodynamic_forces[1], reference.thermodynamic_forces[0], max_relative = 1e-12);
        assert_relative_eq!(rotated.thermodynamic_forces[0], reference.thermodynamic_forces[1], max_relative = 1e-12);
        let (kr, k) = (rotated.tangent.unwrap(), reference.tangent.unwrap());
        assert_relative_eq!(kr[(1, 1)], k[(0, 0)], max_relative = 1e-12);
    }

    #[test]
    fn finite_strain_tangent_is_converted() {
        let h = ModellingHypothesis::PlaneStrain;
        let mut input = HandlerInput::new(h);
        input.gradients0 = mandel::tensor_identity(h).unwrap();
        input.gradients1 = DVector::from_vec(vec![1.01, 0.99, 1.0, 0.02, 0.0]);
        input.thermodynamic_forces = DVector::zeros(4);
        input.elastic_properties = vec![200e3, 0.3];
        let options = HandlerOptions {
            stiffness: StiffnessMatrixType::ConsistentTangent,
            tangent_operator: TangentOperatorFlag::DSIG_DF,
            ..HandlerOptions::default()
        };
        let output = converged(execute::<SaintVenantKirchhoff>(input, &options, None, &ParameterStore::new()).unwrap());
        let k = output.tangent.unwrap();
        assert_eq!((k.nrows(), k.ncols()), (4, 5));
    }

    #[test]
    fn deformation_gradients_are_rotated_in_the_material_frame() {
        let h = ModellingHypothesis::Tridimensional;
        // material axis 1 along the global y axis
        let rotation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let q = mandel::stensor_push_forward_operator(&rotation.transpose());
        let frame = MaterialFrame {
            r: rotation.transpose(),
            q: DMatrix::from_fn(6, 6, |i, j| q[(i, j)]),
            finite_strain: true,
        };
        let f = DVector::from_vec(vec![1.1, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let g = frame.gradients_to_material(&f, h).unwrap();
        assert_relative_eq!(g[0], 1.0, epsilon = 1e-15);
        assert_relative_eq!(g[1], 1.1, epsilon = 1e-15);
        let sigma = DVector::from_vec(vec![100.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(frame.to_material(&sigma)[1], 100.0, epsilon = 1e-12);
        assert_relative_eq!(frame.to_global(&frame.to_material(&sigma)), sigma, epsilon = 1e-12);
    }
}
