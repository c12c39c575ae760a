use crate::error::{BehaviourError, Result};
use crate::mtest::MTestBehaviour;
use nalgebra::{DVector, Matrix3};

/// State of a material point at the beginning (`0`) and at the end (`1`) of
/// the current time step. `iv_1` holds the internal state variables of the
/// previous step.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    pub e0: DVector<f64>,
    pub e1: DVector<f64>,
    pub s0: DVector<f64>,
    pub s1: DVector<f64>,
    pub mprops: Vec<f64>,
    pub iv_1: Vec<f64>,
    pub iv0: Vec<f64>,
    pub iv1: Vec<f64>,
    /// External state variables, the temperature first.
    pub esv0: Vec<f64>,
    pub desv: Vec<f64>,
    /// Global to material frame.
    pub r: Matrix3<f64>,
}

impl CurrentState {
    pub fn new(b: &dyn MTestBehaviour, mprops: Vec<f64>, temperature: f64) -> Result<Self> {
        let nmps = b.material_properties_names()?.len();
        if mprops.len() != nmps {
            return Err(BehaviourError::UnMatchedNumberOfMaterialProperties {
                expected: nmps,
                got: mprops.len(),
            });
        }
        let e = b.gradients_default_initial_values()?;
        let s = DVector::zeros(b.thermodynamic_forces_size()?);
        let iv = vec![0.0; b.internal_state_variables_size()?];
        Ok(Self {
            e0: e.clone(),
            e1: e,
            s0: s.clone(),
            s1: s,
            mprops,
            iv_1: iv.clone(),
            iv0: iv.clone(),
            iv1: iv,
            esv0: vec![temperature],
            desv: vec![0.0],
            r: Matrix3::identity(),
        })
    }

    /// Accepts the end of step values as the beginning of the next step.
    pub fn update(&mut self) {
        self.iv_1 = self.iv0.clone();
        self.iv0 = self.iv1.clone();
        self.s0 = self.s1.clone();
        self.e0 = self.e1.clone();
        for (v, dv) in self.esv0.iter_mut().zip(self.desv.iter_mut()) {
            *v += *dv;
            *dv = 0.0;
        }
    }

    /// Discards the end of step values.
    pub fn revert(&mut self) {
        self.e1 = self.e0.clone();
        self.s1 = self.s0.clone();
        self.iv1 = self.iv0.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::ModellingHypothesis;
    use crate::mtest::GenericBehaviourDriver;
    use crate::parameters::ParameterStore;
    use crate::smallstrain::MisesPlasticity;

    #[test]
    fn update_and_revert() {
        let b = GenericBehaviourDriver::<MisesPlasticity>::new(ModellingHypothesis::PlaneStrain, ParameterStore::new())
            .unwrap();
        assert!(CurrentState::new(&b, vec![200e3, 0.3], 293.15).is_err());
        let mut s = CurrentState::new(&b, vec![200e3, 0.3, 300.0, 10e3], 293.15).unwrap();
        assert_eq!(s.iv0.len(), 5);
        s.e1[0] = 1e-3;
        s.s1[0] = 200.0;
        s.iv1[4] = 1e-4;
        s.desv[0] = 10.0;
        s.update();
        assert_eq!(s.e0[0], 1e-3);
        assert_eq!(s.s0[0], 200.0);
        assert_eq!(s.iv0[4], 1e-4);
        assert_eq!(s.iv_1[4], 0.0);
        approx::assert_relative_eq!(s.esv0[0], 303.15, max_relative = 1e-15);
        assert_eq!(s.desv[0], 0.0);

        s.e1[0] = 2e-3;
        s.iv1[4] = 5e-4;
        s.revert();
        assert_eq!(s.e1[0], 1e-3);
        assert_eq!(s.iv1[4], 1e-4);
    }
}
