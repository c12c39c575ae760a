use crate::error::Result;
use crate::finite_strain::{green_lagrange, green_lagrange_axial_stretch, pk2_to_cauchy};
use crate::finitestrain::to_hypothesis;
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourData, BehaviourType, IntegrationResult, StiffnessMatrixType, SymmetryType,
    TangentOperatorFlag, VariableDescriptor,
};
use crate::mandel::{self, mandel_to_tensor, tensor_to_mandel};
use crate::parameters::ParameterStore;
use nalgebra::{DMatrix, DVector, SVector};

/// `S = C : E_GL`, the stiffness being built by the interface.
///
/// In plane stress the interface hands over the plane stress stiffness and
/// the axial Green-Lagrange strain cancelling `Szz` is computed explicitly.
/// The through-thickness stretch minus one is stored in the `AxialStrain`
/// state variable.
#[derive(Debug, Clone)]
pub struct SaintVenantKirchhoff {
    data: BehaviourData,
    stiffness: DMatrix<f64>,
    sig: DVector<f64>,
    isvs: Vec<f64>,
    tangent: DMatrix<f64>,
}

impl Behaviour for SaintVenantKirchhoff {
    const NAME: &'static str = "SaintVenantKirchhoff";
    const BEHAVIOUR_TYPE: BehaviourType = BehaviourType::StandardFiniteStrain;
    const SYMMETRY: SymmetryType = SymmetryType::Isotropic;
    const REQUIRES_STIFFNESS_TENSOR: bool = true;
    const TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::DS_DEGL;

    fn material_properties() -> &'static [&'static str] {
        &[]
    }

    fn internal_state_variables_descriptors(h: ModellingHypothesis) -> Vec<VariableDescriptor> {
        if h.is_plane_stress() {
            vec![VariableDescriptor::scalar("etozz", "AxialStrain")]
        } else {
            Vec::new()
        }
    }

    fn new(data: BehaviourData, _parameters: &ParameterStore) -> Result<Self> {
        let stiffness = data.stiffness_tensor(Self::NAME)?.clone();
        Ok(Self {
            sig: data.thermodynamic_forces.clone(),
            isvs: data.internal_state_variables.clone(),
            tangent: stiffness.clone(),
            stiffness,
            data,
        })
    }

    fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        let (_, mut f1) = self.data.deformation_gradients()?;
        let h = self.data.hypothesis;
        if h.is_plane_stress() {
            let e = green_lagrange(&f1);
            let nu = self.stiffness[(0, 1)] / self.stiffness[(0, 0)];
            let fzz = green_lagrange_axial_stretch(-nu / (1.0 - nu) * (e[(0, 0)] + e[(1, 1)]))?;
            f1[(2, 2)] = fzz;
            if let Some(etozz) = self.isvs.first_mut() {
                *etozz = fzz - 1.0;
            }
        }
        let egl = mandel::mandel3d_to_stensor(&tensor_to_mandel(&green_lagrange(&f1)), h)?;
        let s = &self.stiffness * egl;
        let s3d: SVector<f64, 6> = mandel::stensor_to_mandel3d(&s, h)?;
        let sigma = pk2_to_cauchy(&mandel_to_tensor(&s3d), &f1)?;
        self.sig = to_hypothesis(&self.data, &tensor_to_mandel(&sigma))?;
        if smt != StiffnessMatrixType::NoStiffness {
            self.tangent.copy_from(&self.stiffness);
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
