use crate::error::Result;
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourData, BehaviourType, IntegrationResult, StiffnessMatrixType,
    VariableDescriptor,
};
use crate::mandel;
use crate::parameters::ParameterStore;
use crate::smallstrain::{lame_coefficients, strain_increment};
use crate::stiffness::compute_isotropic_stiffness_tensor;
use crate::stress_strain::deviatoric;
use nalgebra::{DMatrix, DVector};

/// von Mises plasticity with linear isotropic hardening, integrated by a
/// radial return.
///
/// Material properties: `YoungModulus`, `PoissonRatio`, `YieldStress`,
/// `HardeningSlope`. State variables: the elastic strain followed by the
/// equivalent plastic strain.
///
/// Parameters:
/// - `maximum_strain_increment`: the integration fails when a component of
///   the strain increment exceeds this value;
/// - `maximum_plastic_increment`: a larger equivalent plastic strain
///   increment yields an a posteriori time step scaling factor below 1.
#[derive(Debug, Clone)]
pub struct MisesPlasticity {
    data: BehaviourData,
    mu: f64,
    lambda: f64,
    sigma_y: f64,
    hardening: f64,
    stiffness: DMatrix<f64>,
    maximum_strain_increment: f64,
    maximum_plastic_increment: f64,
    sig: DVector<f64>,
    isvs: Vec<f64>,
    dp: f64,
    tangent: DMatrix<f64>,
}

impl MisesPlasticity {
    fn n(&self) -> usize {
        self.sig.len()
    }

    fn elastic_strain(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.data.internal_state_variables[..self.n()])
    }

    fn equivalent_plastic_strain(&self) -> f64 {
        self.data.internal_state_variables[self.n()]
    }

    /// Elasto-plastic operator; `theta = 1` gives the continuum tangent.
    fn plastic_operator(&self, normal: &DVector<f64>, theta: f64) -> DMatrix<f64> {
        let n = self.n();
        let id = mandel::identity(self.data.hypothesis).unwrap_or_else(|_| DVector::zeros(n));
        let kappa = self.lambda + 2.0 * self.mu / 3.0;
        let id_dev = DMatrix::identity(n, n) - &id * id.transpose() / 3.0;
        let theta_bar = 1.0 / (1.0 + self.hardening / (3.0 * self.mu)) - (1.0 - theta);
        kappa * &id * id.transpose() + 2.0 * self.mu * theta * id_dev
            - 2.0 * self.mu * theta_bar * normal * normal.transpose()
    }
}

impl Behaviour for MisesPlasticity {
    const NAME: &'static str = "MisesPlasticity";
    const BEHAVIOUR_TYPE: BehaviourType = BehaviourType::StandardStrainBased;
    const HAS_PREDICTION_OPERATOR: bool = true;
    const MAXIMUM_SUB_STEPPING: u32 = 8;

    /// Plane stress is handled by the interfaces.
    fn is_defined(h: ModellingHypothesis) -> bool {
        !matches!(h, ModellingHypothesis::PlaneStress | ModellingHypothesis::Undefined)
    }

    fn material_properties() -> &'static [&'static str] {
        &["YoungModulus", "PoissonRatio", "YieldStress", "HardeningSlope"]
    }

    fn internal_state_variables_descriptors(_h: ModellingHypothesis) -> Vec<VariableDescriptor> {
        vec![
            VariableDescriptor::stensor("eel", "ElasticStrain"),
            VariableDescriptor::scalar("p", "EquivalentPlasticStrain"),
        ]
    }

    fn new(data: BehaviourData, parameters: &ParameterStore) -> Result<Self> {
        let young = data.material_property(0)?;
        let nu = data.material_property(1)?;
        let (lambda, mu) = lame_coefficients(young, nu);
        let h = data.hypothesis;
        let nisv = Self::internal_variables_nb(h)?;
        if data.internal_state_variables.len() < nisv {
            return Err(crate::error::BehaviourError::UnMatchedNumberOfStateVariables {
                expected: nisv,
                got: data.internal_state_variables.len(),
            });
        }
        let stiffness = compute_isotropic_stiffness_tensor(h, false, young, nu)?;
        Ok(Self {
            mu,
            lambda,
            sigma_y: data.material_property(2)?,
            hardening: data.material_property(3)?,
            maximum_strain_increment: parameters.real_or("maximum_strain_increment", f64::INFINITY),
            maximum_plastic_increment: parameters.real_or("maximum_plastic_increment", f64::INFINITY),
            sig: data.thermodynamic_forces.clone(),
            isvs: data.internal_state_variables[..nisv].to_vec(),
            dp: 0.0,
            tangent: stiffness.clone(),
            stiffness,
            data,
        })
    }

    fn compute_a_posteriori_time_step_scaling_factor(&self) -> (bool, f64) {
        if self.dp > self.maximum_plastic_increment {
            (true, self.maximum_plastic_increment / self.dp)
        } else {
            (true, 1.0)
        }
    }

    fn compute_prediction_operator(&mut self, _smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        self.tangent.copy_from(&self.stiffness);
        Ok(IntegrationResult::Success)
    }

    fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        let deto = strain_increment(&self.data);
        if deto.amax() > self.maximum_strain_increment {
            tracing::debug!(behaviour = Self::NAME, increment = deto.amax(), "strain increment too large");
            return Ok(IntegrationResult::Failure);
        }
        let n = self.n();
        let p0 = self.equivalent_plastic_strain();
        let eel_tr = self.elastic_strain() + &deto;
        let sig_tr = &self.stiffness * &eel_tr;
        let s_tr = deviatoric(&sig_tr);
        let s_tr_eq = (1.5 * s_tr.norm_squared()).sqrt();
        let sigma_y = self.sigma_y + self.hardening * p0;
        //the .max(0.0) contains the check if the stress is already above the yield surface
        let del_lambda = ((s_tr_eq - sigma_y) / (3. * self.mu + self.hardening)).max(0.0);
        self.dp = del_lambda;
        if del_lambda == 0.0 {
            self.sig = sig_tr;
            self.isvs[..n].copy_from_slice(eel_tr.as_slice());
            if smt != StiffnessMatrixType::NoStiffness {
                self.tangent.copy_from(&self.stiffness);
            }
            return Ok(IntegrationResult::Success);
        }
        let flow = 1.5 * &s_tr / s_tr_eq;
        let eel = eel_tr - del_lambda * flow;
        self.sig = &self.stiffness * &eel;
        self.isvs[..n].copy_from_slice(eel.as_slice());
        self.isvs[n] = p0 + del_lambda;
        let normal = &s_tr / s_tr.norm();
        match smt {
            StiffnessMatrixType::NoStiffness => {}
            StiffnessMatrixType::Elastic | StiffnessMatrixType::Secant => {
                self.tangent.copy_from(&self.stiffness)
            }
            StiffnessMatrixType::Tangent => self.tangent = self.plastic_operator(&normal, 1.0),
            StiffnessMatrixType::ConsistentTangent => {
                let theta = 1.0 - 3.0 * self.mu * del_lambda / s_tr_eq;
                self.tangent = self.plastic_operator(&normal, theta);
            }
        }
        Ok(IntegrationResult::Success)
    }

    fn thermodynamic_forces(&self) -> &DVector<f64> {
        &self.sig
    }

    fn internal_state_variables(&self) -> &[f64] {
        &self.isvs
    }

    fn tangent_operator(&self) -> &DMatrix<f64> {
        &self.tangent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stress_strain::von_mises;
    use approx::assert_relative_eq;

    const PROPS: [f64; 4] = [200e3, 0.3, 300.0, 10e3];

    fn behaviour(h: ModellingHypothesis, deto: &[f64]) -> MisesPlasticity {
        let mut data = BehaviourData::new(BehaviourType::StandardStrainBased, h).unwrap();
        data.material_properties = PROPS.to_vec();
        data.internal_state_variables = vec![0.0; MisesPlasticity::internal_variables_nb(h).unwrap()];
        data.gradients1.copy_from_slice(deto);
        MisesPlasticity::new(data, &ParameterStore::new()).unwrap()
    }

    #[test]
    fn plastic_flow_stays_on_the_yield_surface() {
        let h = ModellingHypothesis::Tridimensional;
        let mut b = behaviour(h, &[5e-3, -1e-3, -1e-3, 0.0, 0.0, 1e-3]);
        b.integrate(StiffnessMatrixType::ConsistentTangent).unwrap();
        let p = b.internal_state_variables()[6];
        assert!(p > 0.0);
        assert_relative_eq!(von_mises(b.thermodynamic_forces()), 300.0 + 10e3 * p, max_relative = 1e-10);
    }

    #[test]
    fn consistent_tangent_matches_finite_differences() {
        let h = ModellingHypothesis::PlaneStrain;
        let deto = [4e-3, -1e-3, 0.0, 2e-3];
        let mut b = behaviour(h, &deto);
        b.integrate(StiffnessMatrixType::ConsistentTangent).unwrap();
        let k = b.tangent_operator().clone();
        let eps = 1e-8;
        for j in 0..4 {
            let (mut plus, mut minus) = (deto, deto);
            plus[j] += eps;
            minus[j] -= eps;
            let mut bp = behaviour(h, &plus);
            let mut bm = behaviour(h, &minus);
            bp.integrate(StiffnessMatrixType::NoStiffness).unwrap();
            bm.integrate(StiffnessMatrixType::NoStiffness).unwrap();
            let numerical = (bp.thermodynamic_forces() - bm.thermodynamic_forces()) / (2.0 * eps);
            for i in 0..4 {
                assert_relative_eq!(k[(i, j)], numerical[i], epsilon = 1e-2, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn large_increments_fail() {
        let h = ModellingHypothesis::Tridimensional;
        let mut data = BehaviourData::new(BehaviourType::StandardStrainBased, h).unwrap();
        data.material_properties = PROPS.to_vec();
        data.internal_state_variables = vec![0.0; 7];
        data.gradients1[0] = 1e-2;
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_strain_increment", 5e-3);
        let mut b = MisesPlasticity::new(data, &parameters).unwrap();
        assert_eq!(b.integrate(StiffnessMatrixType::NoStiffness).unwrap(), IntegrationResult::Failure);
    }

    #[test]
    fn not_defined_in_plane_stress() {
        assert!(!MisesPlasticity::is_defined(ModellingHypothesis::PlaneStress));
        assert!(MisesPlasticity::is_defined(ModellingHypothesis::GeneralisedPlaneStrain));
        assert_eq!(MisesPlasticity::internal_variables_nb(ModellingHypothesis::Tridimensional).unwrap(), 7);
    }
}
