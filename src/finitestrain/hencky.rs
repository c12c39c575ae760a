use crate::error::Result;
use crate::finitestrain::{to_dynamic, to_hypothesis};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourData, BehaviourType, IntegrationResult, StiffnessMatrixType,
    TangentOperatorFlag, VariableDescriptor,
};
use crate::logarithmic_strain::LogarithmicStrainHandler;
use crate::parameters::ParameterStore;
use crate::stiffness::compute_isotropic_stiffness_tensor;
use nalgebra::{DMatrix, DVector, SMatrix};

/// Hencky elasticity, `T = C : E_log`, turned into a finite strain
/// behaviour by the logarithmic strain framework.
///
/// Material properties: `YoungModulus`, `PoissonRatio`.
#[derive(Debug, Clone)]
pub struct HenckyElasticity {
    data: BehaviourData,
    stiffness: SMatrix<f64, 6, 6>,
    sig: DVector<f64>,
    tangent: DMatrix<f64>,
}

impl Behaviour for HenckyElasticity {
    const NAME: &'static str = "HenckyElasticity";
    const BEHAVIOUR_TYPE: BehaviourType = BehaviourType::StandardFiniteStrain;
    const TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::DS_DEGL;

    fn is_defined(h: ModellingHypothesis) -> bool {
        !matches!(h, ModellingHypothesis::PlaneStress | ModellingHypothesis::Undefined)
    }

    fn material_properties() -> &'static [&'static str] {
        &["YoungModulus", "PoissonRatio"]
    }

    fn internal_state_variables_descriptors(_h: ModellingHypothesis) -> Vec<VariableDescriptor> {
        Vec::new()
    }

    fn new(data: BehaviourData, _parameters: &ParameterStore) -> Result<Self> {
        let c = compute_isotropic_stiffness_tensor(
            ModellingHypothesis::Tridimensional,
            false,
            data.material_property(0)?,
            data.material_property(1)?,
        )?;
        let n = data.thermodynamic_forces.len();
        Ok(Self {
            stiffness: SMatrix::<f64, 6, 6>::from_fn(|i, j| c[(i, j)]),
            sig: data.thermodynamic_forces.clone(),
            tangent: DMatrix::zeros(n, n),
            data,
        })
    }

    fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        let (_, f1) = self.data.deformation_gradients()?;
        let handler = LogarithmicStrainHandler::new(f1)?;
        let t = self.stiffness * handler.logarithmic_strain();
        self.sig = to_hypothesis(&self.data, &handler.convert_to_cauchy_stress(&t)?)?;
        if smt != StiffnessMatrixType::NoStiffness {
            let k = handler.convert_to_material_tangent_modulus(&self.stiffness, &t);
            self.tangent = to_dynamic(&k, self.sig.len());
        }
        Ok(IntegrationResult::Success)
    }

    fn thermodynamic_forces(&self) -> &DVector<f64> {
        &self.sig
    }

    fn internal_state_variables(&self) -> &[f64] {
        &[]
    }

    fn tangent_operator(&self) -> &DMatrix<f64> {
        &self.tangent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn behaviour(h: ModellingHypothesis, stretch: f64) -> HenckyElasticity {
        let mut data = BehaviourData::new(BehaviourType::StandardFiniteStrain, h).unwrap();
        data.material_properties = vec![200e3, 0.3];
        data.gradients1[0] = stretch;
        HenckyElasticity::new(data, &ParameterStore::new()).unwrap()
    }

    #[test]
    fn kirchhoff_stress_is_linear_in_the_logarithmic_strain() {
        let mut b = behaviour(ModellingHypothesis::Tridimensional, 1.05);
        b.integrate(StiffnessMatrixType::ConsistentTangent).unwrap();
        let (lambda, mu) = crate::smallstrain::lame_coefficients(200e3, 0.3);
        // for a pure stretch tau = T, sigma = tau / J
        let e = 1.05_f64.ln();
        assert_relative_eq!(b.thermodynamic_forces()[0], (lambda + 2.0 * mu) * e / 1.05, max_relative = 1e-10);
        assert_relative_eq!(b.thermodynamic_forces()[2], lambda * e / 1.05, max_relative = 1e-10);
    }

    #[test]
    fn small_stretch_tangent_is_the_elastic_stiffness() {
        let mut b = behaviour(ModellingHypothesis::PlaneStrain, 1.0);
        b.integrate(StiffnessMatrixType::ConsistentTangent).unwrap();
        let c = compute_isotropic_stiffness_tensor(ModellingHypothesis::PlaneStrain, false, 200e3, 0.3).unwrap();
        assert_relative_eq!(*b.tangent_operator(), c, epsilon = 1e-6);
    }
}
