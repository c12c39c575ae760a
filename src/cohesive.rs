//! Cohesive zone models.
//!
//! The driving variable is the opening displacement, the thermodynamic force
//! the traction. Both are expressed in the local frame of the interface, the
//! normal component coming first.
use crate::error::Result;
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourData, BehaviourType, IntegrationResult, StiffnessMatrixType,
    VariableDescriptor,
};
use crate::parameters::ParameterStore;
use nalgebra::{DMatrix, DVector};

/// Linear cohesive zone, `t = diag(kn, kt, kt) u`.
///
/// Material properties: `NormalStiffness`, `TangentialStiffness`.
#[derive(Debug, Clone)]
pub struct LinearCohesiveZone {
    data: BehaviourData,
    stiffness: DMatrix<f64>,
    traction: DVector<f64>,
    tangent: DMatrix<f64>,
}

impl Behaviour for LinearCohesiveZone {
    const NAME: &'static str = "LinearCohesiveZone";
    const BEHAVIOUR_TYPE: BehaviourType = BehaviourType::CohesiveZoneModel;
    const HAS_PREDICTION_OPERATOR: bool = true;

    fn is_defined(h: ModellingHypothesis) -> bool {
        !matches!(
            h,
            ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain | ModellingHypothesis::Undefined
        )
    }

    fn material_properties() -> &'static [&'static str] {
        &["NormalStiffness", "TangentialStiffness"]
    }

    fn internal_state_variables_descriptors(_h: ModellingHypothesis) -> Vec<VariableDescriptor> {
        Vec::new()
    }

    fn new(data: BehaviourData, _parameters: &ParameterStore) -> Result<Self> {
        let (kn, kt) = (data.material_property(0)?, data.material_property(1)?);
        let n = data.gradients1.len();
        let stiffness = DMatrix::from_fn(n, n, |i, j| match (i, j) {
            (0, 0) => kn,
            (i, j) if i == j => kt,
            _ => 0.0,
        });
        Ok(Self {
            traction: data.thermodynamic_forces.clone(),
            tangent: stiffness.clone(),
            stiffness,
            data,
        })
    }

    fn compute_prediction_operator(&mut self, _smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        self.tangent.copy_from(&self.stiffness);
        Ok(IntegrationResult::Success)
    }

    fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        self.traction = &self.stiffness * &self.data.gradients1;
        if smt != StiffnessMatrixType::NoStiffness {
            self.tangent.copy_from(&self.stiffness);
        }
        Ok(IntegrationResult::Success)
    }

    fn thermodynamic_forces(&self) -> &DVector<f64> {
        &self.traction
    }

    fn internal_state_variables(&self) -> &[f64] {
        &[]
    }

    fn tangent_operator(&self) -> &DMatrix<f64> {
        &self.tangent
    }
}
