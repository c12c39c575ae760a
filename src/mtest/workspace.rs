use crate::error::{BehaviourError, Result};
use crate::mtest::MTestBehaviour;
use nalgebra::DMatrix;

/// Buffers reused by the successive calls to a behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourWorkSpace {
    /// Tangent operator, thermodynamic forces by gradients.
    pub k: DMatrix<f64>,
    /// Material properties.
    pub mps: Vec<f64>,
    /// Internal state variables, never empty.
    pub ivs: Vec<f64>,
}

impl Default for BehaviourWorkSpace {
    fn default() -> Self {
        Self {
            k: DMatrix::zeros(0, 0),
            mps: Vec::new(),
            ivs: Vec::new(),
        }
    }
}

impl BehaviourWorkSpace {
    pub fn allocate(&mut self, nmps: usize, nivs: usize, nforces: usize, ngradients: usize) {
        self.k = DMatrix::zeros(nforces, ngradients);
        self.mps = vec![0.0; nmps];
        self.ivs = vec![0.0; nivs.max(1)];
    }

    /// Checks that the workspace was allocated for `b`.
    pub fn check(&self, b: &dyn MTestBehaviour) -> Result<()> {
        let allocated = self.mps.len() == b.material_properties_names()?.len()
            && self.ivs.len() == b.internal_state_variables_size()?.max(1)
            && self.k.nrows() == b.thermodynamic_forces_size()?
            && self.k.ncols() == b.gradients_size()?;
        if !allocated {
            return Err(BehaviourError::Programming(
                "the memory has not been allocated correctly".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtest::GenericBehaviourDriver;
    use crate::parameters::ParameterStore;
    use crate::smallstrain::MisesPlasticity;
    use crate::ModellingHypothesis;

    #[test]
    fn allocation_is_checked() {
        let b = GenericBehaviourDriver::<MisesPlasticity>::new(ModellingHypothesis::PlaneStrain, ParameterStore::new())
            .unwrap();
        let mut wk = BehaviourWorkSpace::default();
        assert_eq!((wk.k.nrows(), wk.k.ncols()), (0, 0));
        assert!(matches!(wk.check(&b), Err(BehaviourError::Programming(_))));
        b.allocate(&mut wk).unwrap();
        assert!(wk.check(&b).is_ok());
        assert_eq!(wk.ivs.len(), 5);
        assert_eq!(wk.mps.len(), 4);
        assert_eq!((wk.k.nrows(), wk.k.ncols()), (4, 4));
    }
}
