//! Small strain behaviours called through a Castem entry point.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{Behaviour, BehaviourType, MaterialPropertiesLayout, StiffnessMatrixType, SymmetryType};
use crate::mandel::stensor_push_forward_operator;
use crate::mtest::{BehaviourWorkSpace, CurrentState, MTestBehaviour};
use crate::solvers::castem::{ndi_from_hypothesis, UmatFn};
use crate::solvers::{Castem, SolverPolicy, ISOTROPIC_ELASTIC_PROPERTIES, ORTHOTROPIC_ELASTIC_PROPERTIES};
use crate::stiffness::{compute_stiffness_tensor, stiffness_properties_nb};
use crate::views::{denormalize_tangent, export_stensor, import_stensor, import_tangent, SolverConvention, StorageOrder};
use nalgebra::DMatrix;
use std::ptr;

pub struct CastemSmallStrainBehaviour {
    name: String,
    umat: UmatFn,
    hypothesis: ModellingHypothesis,
    layout: MaterialPropertiesLayout,
    internal_state_variables: usize,
    symmetry: SymmetryType,
}

impl CastemSmallStrainBehaviour {
    /// Driver of `umat`, the Castem entry point of `B`. In plane stress, a
    /// behaviour only defined in generalised plane strain is integrated by
    /// the interface, which stores the axial strain as an extra state
    /// variable.
    pub fn new<B: Behaviour>(umat: UmatFn, h: ModellingHypothesis) -> Result<Self> {
        if B::BEHAVIOUR_TYPE != BehaviourType::StandardStrainBased {
            return Err(BehaviourError::UnsupportedCase(format!(
                "'{}' is not a small strain behaviour",
                B::NAME
            )));
        }
        let generic_plane_stress =
            h.is_plane_stress() && !B::is_defined(h) && B::is_defined(ModellingHypothesis::GeneralisedPlaneStrain);
        let hb = if generic_plane_stress {
            ModellingHypothesis::GeneralisedPlaneStrain
        } else {
            h
        };
        if !B::is_defined(hb) {
            return Err(BehaviourError::invalid_hypothesis(B::NAME, h));
        }
        Ok(Self {
            name: B::NAME.to_string(),
            umat,
            hypothesis: h,
            layout: Castem::material_properties_layout::<B>(h)?,
            internal_state_variables: B::internal_variables_nb(hb)? + usize::from(generic_plane_stress),
            symmetry: B::SYMMETRY,
        })
    }

    /// Elastic stiffness built from the material properties, in the global
    /// frame.
    fn elastic_stiffness(&self, s: &CurrentState) -> Result<DMatrix<f64>> {
        let h = self.hypothesis;
        let names = match self.symmetry {
            SymmetryType::Isotropic => &ISOTROPIC_ELASTIC_PROPERTIES[..],
            SymmetryType::Orthotropic => &ORTHOTROPIC_ELASTIC_PROPERTIES[..stiffness_properties_nb(h, self.symmetry)?],
        };
        let props = names
            .iter()
            .map(|n| self.layout.value(&s.mprops, n))
            .collect::<Result<Vec<_>>>()?;
        let k = compute_stiffness_tensor(
            BehaviourType::StandardStrainBased,
            h,
            self.symmetry,
            h.is_plane_stress(),
            &props,
        )?;
        if self.symmetry == SymmetryType::Isotropic || h.space_dimension()? == 1 {
            return Ok(k);
        }
        let n = k.nrows();
        let q = stensor_push_forward_operator(&s.r);
        let q = DMatrix::from_fn(n, n, |i, j| q[(i, j)]);
        Ok(q.tr_mul(&k) * q)
    }

    fn call_behaviour(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        request: f64,
        smt: StiffnessMatrixType,
        integrate: bool,
    ) -> Result<(bool, f64)> {
        wk.check(self)?;
        let h = self.hypothesis;
        let n = h.stensor_size()?;
        let mut stran = vec![0.0; n];
        export_stensor(&s.e0, &mut stran, SolverConvention::Engineering)?;
        let mut dstran = vec![0.0; n];
        export_stensor(&(&s.e1 - &s.e0), &mut dstran, SolverConvention::Engineering)?;
        let mut stress = vec![0.0; n];
        export_stensor(&s.s0, &mut stress, SolverConvention::Tensorial)?;
        let mut ddsdde = vec![0.0; n * n];
        ddsdde[0] = request;
        if s.mprops.len() != wk.mps.len() || s.iv0.len() != self.internal_state_variables {
            return Err(BehaviourError::Programming(format!(
                "inconsistent state for behaviour '{}'",
                self.name
            )));
        }
        wk.mps.copy_from_slice(&s.mprops);
        wk.ivs[..s.iv0.len()].copy_from_slice(&s.iv0);
        // Castem expects the material axes as columns
        let drot = s.r.transpose();
        let temperature = s.esv0.first().copied().unwrap_or(0.0);
        let dtemp = s.desv.first().copied().unwrap_or(0.0);
        let time = 0.0;
        let ndi = ndi_from_hypothesis(h)?;
        let nshr = i32::from(n > 3) + 2 * i32::from(n > 4);
        let ntens = n as i32;
        let nstatv = wk.ivs.len() as i32;
        let nprops = wk.mps.len() as i32;
        let mut unused = [0.0; 7];
        let u = unused.as_mut_ptr();
        let mut pnewdt = 1.0;
        let mut kinc = 0;
        unsafe {
            (self.umat)(
                stress.as_mut_ptr(),
                wk.ivs.as_mut_ptr(),
                ddsdde.as_mut_ptr(),
                u,
                u.add(1),
                u.add(2),
                u.add(3),
                u.add(4),
                u.add(5),
                u.add(6),
                stran.as_ptr(),
                dstran.as_ptr(),
                &time,
                &dt,
                &temperature,
                &dtemp,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &ndi,
                &nshr,
                &ntens,
                &nstatv,
                wk.mps.as_ptr(),
                &nprops,
                ptr::null(),
                drot.as_slice().as_ptr(),
                &mut pnewdt,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &mut kinc,
                None,
            )
        };
        if kinc != 1 {
            tracing::debug!(behaviour = %self.name, kinc, pnewdt, "integration rejected");
            return Ok((false, pnewdt));
        }
        if integrate {
            s.s1 = import_stensor(&stress, h, SolverConvention::Tensorial)?;
            let n = s.iv1.len();
            s.iv1.copy_from_slice(&wk.ivs[..n]);
        }
        if smt != StiffnessMatrixType::NoStiffness {
            wk.k = denormalize_tangent(&import_tangent(&ddsdde, n, n, StorageOrder::ColumnMajor)?);
        }
        Ok((true, pnewdt))
    }
}

fn request_code(smt: StiffnessMatrixType) -> f64 {
    match smt {
        StiffnessMatrixType::NoStiffness => 0.0,
        StiffnessMatrixType::Elastic => 1.0,
        StiffnessMatrixType::Secant => 2.0,
        StiffnessMatrixType::Tangent => 3.0,
        StiffnessMatrixType::ConsistentTangent => 4.0,
    }
}

impl MTestBehaviour for CastemSmallStrainBehaviour {
    fn name(&self) -> &str {
        &self.name
    }

    fn hypothesis(&self) -> ModellingHypothesis {
        self.hypothesis
    }

    fn gradients_size(&self) -> Result<usize> {
        self.hypothesis.stensor_size()
    }

    fn thermodynamic_forces_size(&self) -> Result<usize> {
        self.hypothesis.stensor_size()
    }

    fn internal_state_variables_size(&self) -> Result<usize> {
        Ok(self.internal_state_variables)
    }

    fn material_properties_names(&self) -> Result<Vec<String>> {
        Ok(self.layout.names().into_iter().map(str::to_string).collect())
    }

    fn compute_prediction_operator(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        smt: StiffnessMatrixType,
    ) -> Result<(bool, f64)> {
        match smt {
            StiffnessMatrixType::NoStiffness => Ok((true, 1.0)),
            StiffnessMatrixType::Elastic => {
                wk.check(self)?;
                wk.k = self.elastic_stiffness(s)?;
                Ok((true, 1.0))
            }
            _ => self.call_behaviour(s, wk, 1.0, -request_code(smt).min(3.0), smt, false),
        }
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<(bool, f64)> {
        self.call_behaviour(s, wk, dt, request_code(smt), smt, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exports::{umatelasticity, umatmisesplasticity, umatorthotropicelasticity};
    use crate::smallstrain::{lame_coefficients, Elasticity, MisesPlasticity, OrthotropicElasticity};
    use approx::assert_relative_eq;
    use nalgebra::{DVector, Matrix3};

    fn prepare(b: &CastemSmallStrainBehaviour, mprops: Vec<f64>) -> (CurrentState, BehaviourWorkSpace) {
        let s = CurrentState::new(b, mprops, 293.15).unwrap();
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        (s, wk)
    }

    #[test]
    fn elastic_step_and_tangent() {
        let (young, nu) = (200e3, 0.3);
        let b = CastemSmallStrainBehaviour::new::<Elasticity>(umatelasticity, ModellingHypothesis::Tridimensional)
            .unwrap();
        assert_eq!(b.material_properties_names().unwrap()[..2], ["YoungModulus", "PoissonRatio"]);
        let (mut s, mut wk) = prepare(&b, vec![young, nu, 7800.0, 0.0]);
        s.e1 = DVector::from_vec(vec![0.0, 0.0, 0.0, 1e-3, 0.0, 0.0]);
        let (ok, factor) = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::ConsistentTangent)
            .unwrap();
        assert!(ok);
        assert_eq!(factor, 1.0);
        let (_, mu) = lame_coefficients(young, nu);
        assert_relative_eq!(s.s1[3], 2.0 * mu * 1e-3, max_relative = 1e-12);
        assert_relative_eq!(wk.k[(3, 3)], 2.0 * mu, max_relative = 1e-12);
        assert_relative_eq!(wk.k[(0, 1)], wk.k[(1, 0)], max_relative = 1e-12);
    }

    #[test]
    fn elastic_prediction_is_built_from_the_material_properties() {
        let b = CastemSmallStrainBehaviour::new::<MisesPlasticity>(umatmisesplasticity, ModellingHypothesis::PlaneStrain)
            .unwrap();
        let (mut s, mut wk) = prepare(&b, vec![200e3, 0.3, 7800.0, 0.0, 200e3, 0.3, 300.0, 10e3]);
        let (ok, _) = b
            .compute_prediction_operator(&mut s, &mut wk, StiffnessMatrixType::Elastic)
            .unwrap();
        assert!(ok);
        let expected = compute_stiffness_tensor(
            BehaviourType::StandardStrainBased,
            ModellingHypothesis::PlaneStrain,
            SymmetryType::Isotropic,
            false,
            &[200e3, 0.3],
        )
        .unwrap();
        assert_relative_eq!(wk.k, expected, max_relative = 1e-12);
    }

    #[test]
    fn orthotropic_prediction_is_rotated() {
        let h = ModellingHypothesis::Tridimensional;
        let b = CastemSmallStrainBehaviour::new::<OrthotropicElasticity>(umatorthotropicelasticity, h).unwrap();
        let mut mprops = vec![200e3, 100e3, 50e3, 0.3, 0.2, 0.25, 70e3, 40e3, 20e3];
        mprops.extend([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 7800.0, 0.0, 0.0, 0.0]);
        let (mut s, mut wk) = prepare(&b, mprops);
        // material axis 1 along global y
        s.r = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        b.compute_prediction_operator(&mut s, &mut wk, StiffnessMatrixType::Elastic)
            .unwrap();
        let prediction = wk.k.clone();
        s.e1 = DVector::from_vec(vec![0.0, 1e-3, 0.0, 0.0, 0.0, 0.0]);
        let (ok, _) = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::ConsistentTangent)
            .unwrap();
        assert!(ok);
        assert_relative_eq!(prediction, wk.k, max_relative = 1e-10);
        assert_relative_eq!(s.s1[1], prediction[(1, 1)] * 1e-3, max_relative = 1e-12);
        assert!(prediction[(1, 1)] > prediction[(0, 0)]);
    }

    #[test]
    fn rejected_calls_return_the_scaling_factor() {
        let b = CastemSmallStrainBehaviour::new::<Elasticity>(umatelasticity, ModellingHypothesis::Tridimensional)
            .unwrap();
        let (mut s, mut wk) = prepare(&b, vec![200e3, 0.3, 7800.0, 0.0]);
        let (ok, factor) = b
            .integrate(&mut s, &mut wk, -1.0, StiffnessMatrixType::NoStiffness)
            .unwrap();
        assert!(!ok);
        assert_eq!(factor, 1.0);
        assert_eq!(s.s1, DVector::zeros(6));
    }

    #[test]
    fn unallocated_workspace_is_a_programming_error() {
        let b = CastemSmallStrainBehaviour::new::<Elasticity>(umatelasticity, ModellingHypothesis::Tridimensional)
            .unwrap();
        let mut s = CurrentState::new(&b, vec![200e3, 0.3, 7800.0, 0.0], 293.15).unwrap();
        let mut wk = BehaviourWorkSpace::default();
        let err = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::NoStiffness)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "programming error: the memory has not been allocated correctly"
        );
    }
}
