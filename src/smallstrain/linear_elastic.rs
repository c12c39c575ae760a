use crate::error::Result;
use crate::interfaces::{
    Behaviour, BehaviourData, BehaviourType, IntegrationResult, StiffnessMatrixType, SymmetryType,
    VariableDescriptor,
};
use crate::hypothesis::ModellingHypothesis;
use crate::parameters::ParameterStore;
use crate::smallstrain::strain_increment;
use nalgebra::{DMatrix, DVector};

/// Linear elastic law `sig1 = sig0 + C : deto`, the stiffness being built
/// by the interface from the material properties.
#[derive(Debug, Clone)]
pub struct LinearElasticCore {
    data: BehaviourData,
    stiffness: DMatrix<f64>,
    sig: DVector<f64>,
    tangent: DMatrix<f64>,
}

impl LinearElasticCore {
    pub fn new(data: BehaviourData, behaviour: &str) -> Result<Self> {
        let stiffness = data.stiffness_tensor(behaviour)?.clone();
        Ok(Self {
            sig: data.thermodynamic_forces.clone(),
            tangent: stiffness.clone(),
            stiffness,
            data,
        })
    }

    pub fn data(&self) -> &BehaviourData {
        &self.data
    }

    pub fn integrate(&mut self, smt: StiffnessMatrixType) -> IntegrationResult {
        self.sig = &self.data.thermodynamic_forces + &self.stiffness * strain_increment(&self.data);
        if smt != StiffnessMatrixType::NoStiffness {
            self.tangent.copy_from(&self.stiffness);
        }
        IntegrationResult::Success
    }

    pub fn compute_prediction_operator(&mut self) -> IntegrationResult {
        self.tangent.copy_from(&self.stiffness);
        IntegrationResult::Success
    }

    pub fn stress(&self) -> &DVector<f64> {
        &self.sig
    }

    pub fn tangent(&self) -> &DMatrix<f64> {
        &self.tangent
    }
}

macro_rules! linear_elastic_behaviour {
    ($(#[$doc:meta])* $name:ident, $symmetry:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(LinearElasticCore);

        impl Behaviour for $name {
            const NAME: &'static str = stringify!($name);
            const BEHAVIOUR_TYPE: BehaviourType = BehaviourType::StandardStrainBased;
            const SYMMETRY: SymmetryType = $symmetry;
            const REQUIRES_STIFFNESS_TENSOR: bool = true;
            const HAS_PREDICTION_OPERATOR: bool = true;

            fn material_properties() -> &'static [&'static str] {
                &[]
            }

            fn internal_state_variables_descriptors(_h: ModellingHypothesis) -> Vec<VariableDescriptor> {
                Vec::new()
            }

            fn new(data: BehaviourData, _parameters: &ParameterStore) -> Result<Self> {
                Ok(Self(LinearElasticCore::new(data, Self::NAME)?))
            }

            fn compute_prediction_operator(&mut self, _smt: StiffnessMatrixType) -> Result<IntegrationResult> {
                Ok(self.0.compute_prediction_operator())
            }

            fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult> {
                Ok(self.0.integrate(smt))
            }

            fn thermodynamic_forces(&self) -> &DVector<f64> {
                self.0.stress()
            }

            fn internal_state_variables(&self) -> &[f64] {
                &[]
            }

            fn tangent_operator(&self) -> &DMatrix<f64> {
                self.0.tangent()
            }
        }
    };
}

linear_elastic_behaviour!(
    /// Isotropic linear elasticity.
    Elasticity,
    SymmetryType::Isotropic
);

linear_elastic_behaviour!(
    /// Orthotropic linear elasticity, expressed in the material frame.
    OrthotropicElasticity,
    SymmetryType::Orthotropic
);
