//! Removal of stress-free expansions (thermal expansion, swelling) from the
//! driving variables before integration.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::mandel;
use nalgebra::{DVector, Matrix3};

/// Signature of the handlers given by the solvers:
/// `(e0, e1, s0, s1, space dimension)`.
pub type StressFreeExpansionFn =
    unsafe extern "C" fn(*mut f64, *mut f64, *const f64, *const f64, u16);

/// Strategy correcting the driving variables at the beginning (`e0`) and at
/// the end (`e1`) of the step with the stress-free expansions `s0` and `s1`.
pub trait StressFreeExpansionHandler {
    fn apply(
        &self,
        e0: &mut DVector<f64>,
        e1: &mut DVector<f64>,
        s0: &DVector<f64>,
        s1: &DVector<f64>,
        h: ModellingHypothesis,
    ) -> Result<()>;
}

/// `e -= s`, for strain based behaviours.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallStrainStressFreeExpansionHandler;

impl StressFreeExpansionHandler for SmallStrainStressFreeExpansionHandler {
    fn apply(
        &self,
        e0: &mut DVector<f64>,
        e1: &mut DVector<f64>,
        s0: &DVector<f64>,
        s1: &DVector<f64>,
        _h: ModellingHypothesis,
    ) -> Result<()> {
        if e0.len() != s0.len() || e1.len() != s1.len() {
            return Err(BehaviourError::InvalidTensorSize {
                expected: e0.len(),
                got: s0.len(),
            });
        }
        *e0 -= s0;
        *e1 -= s1;
        Ok(())
    }
}

/// Multiplicative split `F = Fm Fs` with an isotropic or orthotropic
/// `Fs = diag(1 + s)`, the diagonal of `s` being read from the stensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FiniteStrainStressFreeExpansionHandler;

impl FiniteStrainStressFreeExpansionHandler {
    fn correct(f: &mut DVector<f64>, s: &DVector<f64>, h: ModellingHypothesis) -> Result<()> {
        let m = mandel::tensor_to_matrix(f, h)?;
        let inv = Matrix3::from_diagonal(&nalgebra::Vector3::new(
            1.0 / (1.0 + s[0]),
            1.0 / (1.0 + s[1]),
            1.0 / (1.0 + s[2]),
        ));
        *f = mandel::matrix_to_tensor(&(m * inv), h)?;
        Ok(())
    }
}

impl StressFreeExpansionHandler for FiniteStrainStressFreeExpansionHandler {
    fn apply(
        &self,
        e0: &mut DVector<f64>,
        e1: &mut DVector<f64>,
        s0: &DVector<f64>,
        s1: &DVector<f64>,
        h: ModellingHypothesis,
    ) -> Result<()> {
        Self::correct(e0, s0, h)?;
        Self::correct(e1, s1, h)
    }
}

/// Handler given by a solver as a C function pointer.
#[derive(Debug, Clone, Copy)]
pub struct ExternalStressFreeExpansionHandler(pub StressFreeExpansionFn);

impl StressFreeExpansionHandler for ExternalStressFreeExpansionHandler {
    fn apply(
        &self,
        e0: &mut DVector<f64>,
        e1: &mut DVector<f64>,
        s0: &DVector<f64>,
        s1: &DVector<f64>,
        h: ModellingHypothesis,
    ) -> Result<()> {
        check_sizes(e0, s0)?;
        check_sizes(e1, s1)?;
        let dimension = h.space_dimension()? as u16;
        // SAFETY: every buffer holds at least the stensor size of the
        // hypothesis, which is all a handler reads or writes.
        unsafe {
            (self.0)(
                e0.as_mut_ptr(),
                e1.as_mut_ptr(),
                s0.as_ptr(),
                s1.as_ptr(),
                dimension,
            )
        };
        Ok(())
    }
}

fn check_sizes(e: &DVector<f64>, s: &DVector<f64>) -> Result<()> {
    if e.len() < s.len() {
        return Err(BehaviourError::InvalidTensorSize {
            expected: e.len(),
            got: s.len(),
        });
    }
    Ok(())
}

/// Stress-free expansion handler used by the Castem interface for strain
/// based behaviours.
pub unsafe extern "C" fn castem_small_strain_stress_free_expansion_handler(
    e0: *mut f64,
    e1: *mut f64,
    s0: *const f64,
    s1: *const f64,
    dimension: u16,
) {
    let n = match dimension {
        1 => 3,
        2 => 4,
        _ => 6,
    };
    let e0 = std::slice::from_raw_parts_mut(e0, n);
    let e1 = std::slice::from_raw_parts_mut(e1, n);
    let s0 = std::slice::from_raw_parts(s0, n);
    let s1 = std::slice::from_raw_parts(s1, n);
    for i in 0..n {
        e0[i] -= s0[i];
        e1[i] -= s1[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn small_strain_subtraction() {
        let h = ModellingHypothesis::PlaneStrain;
        let mut e0 = DVector::from_vec(vec![1e-3, 0.0, 0.0, 0.0]);
        let mut e1 = DVector::from_vec(vec![2e-3, 0.0, 0.0, 0.0]);
        let s = DVector::from_vec(vec![1e-4, 1e-4, 1e-4, 0.0]);
        SmallStrainStressFreeExpansionHandler
            .apply(&mut e0, &mut e1, &s, &s, h)
            .unwrap();
        assert_relative_eq!(e1[0], 1.9e-3, epsilon = 1e-15);
        assert_relative_eq!(e1[1], -1e-4, epsilon = 1e-15);
    }

    #[test]
    fn external_handler_matches_the_builtin_one() {
        let h = ModellingHypothesis::Tridimensional;
        let mut e0 = DVector::from_element(6, 1e-3);
        let mut e1 = DVector::from_element(6, 2e-3);
        let s0 = DVector::from_element(6, 1e-4);
        let s1 = DVector::from_element(6, 3e-4);
        let handler = ExternalStressFreeExpansionHandler(castem_small_strain_stress_free_expansion_handler);
        handler.apply(&mut e0, &mut e1, &s0, &s1, h).unwrap();
        assert_relative_eq!(e0[5], 9e-4, epsilon = 1e-15);
        assert_relative_eq!(e1[0], 1.7e-3, epsilon = 1e-15);
    }

    #[test]
    fn finite_strain_expansion_is_multiplicative() {
        let h = ModellingHypothesis::Tridimensional;
        let mut f0 = mandel::tensor_identity(h).unwrap();
        let mut f1 = f0.clone();
        f1[0] = 1.02;
        let s = DVector::from_vec(vec![0.02, 0.0, 0.0, 0.0, 0.0, 0.0]);
        FiniteStrainStressFreeExpansionHandler
            .apply(&mut f0, &mut f1, &s, &s, h)
            .unwrap();
        assert_relative_eq!(f1[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(f0[0], 1.0 / 1.02, epsilon = 1e-14);
    }
}
