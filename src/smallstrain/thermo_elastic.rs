use crate::error::Result;
use crate::interfaces::{
    check_bound, Behaviour, BehaviourData, BehaviourType, IntegrationResult, OutOfBoundsPolicy,
    StiffnessMatrixType, VariableDescriptor,
};
use crate::hypothesis::ModellingHypothesis;
use crate::parameters::ParameterStore;
use crate::smallstrain::linear_elastic::LinearElasticCore;
use nalgebra::{DMatrix, DVector};

/// Default value of the `ReferenceTemperature` parameter.
pub const REFERENCE_TEMPERATURE: f64 = 293.15;

/// Isotropic thermo-elasticity. The thermal strain `a (T - Tref)` is a
/// stress-free expansion removed by the interface before integration.
#[derive(Debug, Clone)]
pub struct ThermoElasticity {
    core: LinearElasticCore,
    policy: OutOfBoundsPolicy,
}

impl Behaviour for ThermoElasticity {
    const NAME: &'static str = "ThermoElasticity";
    const BEHAVIOUR_TYPE: BehaviourType = BehaviourType::StandardStrainBased;
    const HAS_STRESS_FREE_EXPANSION: bool = true;
    const REQUIRES_STIFFNESS_TENSOR: bool = true;
    const REQUIRES_THERMAL_EXPANSION_COEFFICIENT_TENSOR: bool = true;
    const HAS_PREDICTION_OPERATOR: bool = true;

    fn material_properties() -> &'static [&'static str] {
        &[]
    }

    fn internal_state_variables_descriptors(_h: ModellingHypothesis) -> Vec<VariableDescriptor> {
        Vec::new()
    }

    fn compute_stress_free_expansion(
        data: &BehaviourData,
        parameters: &ParameterStore,
    ) -> Result<(DVector<f64>, DVector<f64>)> {
        let tref = parameters.real_or("ReferenceTemperature", REFERENCE_TEMPERATURE);
        let a = data.thermal_expansion(Self::NAME)?;
        let t1 = data.temperature + data.temperature_increment;
        Ok((a * (data.temperature - tref), a * (t1 - tref)))
    }

    fn new(data: BehaviourData, _parameters: &ParameterStore) -> Result<Self> {
        Ok(Self {
            core: LinearElasticCore::new(data, Self::NAME)?,
            policy: OutOfBoundsPolicy::None,
        })
    }

    fn set_out_of_bounds_policy(&mut self, policy: OutOfBoundsPolicy) {
        self.policy = policy;
    }

    fn check_bounds(&self) -> Result<()> {
        let data = self.core.data();
        check_bound(self.policy, "Temperature", data.temperature, Some(0.0), None)?;
        check_bound(
            self.policy,
            "Temperature",
            data.temperature + data.temperature_increment,
            Some(0.0),
            None,
        )
    }

    fn compute_prediction_operator(&mut self, _smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        Ok(self.core.compute_prediction_operator())
    }

    fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        Ok(self.core.integrate(smt))
    }

    fn thermodynamic_forces(&self) -> &DVector<f64> {
        self.core.stress()
    }

    fn internal_state_variables(&self) -> &[f64] {
        &[]
    }

    fn tangent_operator(&self) -> &DMatrix<f64> {
        self.core.tangent()
    }
}
