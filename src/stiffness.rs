//! Elastic stiffness and thermal expansion tensors built from the material
//! properties handed over by a solver.
//!
//! Operators are returned in the canonical (Mandel) convention. Plane stress
//! comes in two flavours: the *altered* operator enforces `sigma_zz = 0`
//! directly in the stiffness, the *unaltered* one is the plane strain
//! operator.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{BehaviourType, SymmetryType};
use nalgebra::{DMatrix, DVector};

/// Number of elastic material properties expected by the builders.
pub fn stiffness_properties_nb(h: ModellingHypothesis, stype: SymmetryType) -> Result<usize> {
    Ok(match stype {
        SymmetryType::Isotropic => 2,
        SymmetryType::Orthotropic => match h.space_dimension()? {
            1 => 6,
            2 => 7,
            _ => 9,
        },
    })
}

/// Number of thermal expansion coefficients expected by the builders.
pub fn thermal_expansion_properties_nb(h: ModellingHypothesis, stype: SymmetryType) -> Result<usize> {
    h.space_dimension()?;
    Ok(match stype {
        SymmetryType::Isotropic => 1,
        SymmetryType::Orthotropic => {
            if h.is_plane_stress() {
                2
            } else {
                3
            }
        }
    })
}

fn check_properties(props: &[f64], expected: usize) -> Result<()> {
    if props.len() < expected {
        return Err(BehaviourError::UnMatchedNumberOfMaterialProperties {
            expected,
            got: props.len(),
        });
    }
    Ok(())
}

pub fn compute_stiffness_tensor(
    btype: BehaviourType,
    h: ModellingHypothesis,
    stype: SymmetryType,
    altered: bool,
    props: &[f64],
) -> Result<DMatrix<f64>> {
    match btype {
        BehaviourType::StandardStrainBased | BehaviourType::StandardFiniteStrain => {}
        BehaviourType::General | BehaviourType::CohesiveZoneModel => {
            return Err(BehaviourError::UnsupportedCase(format!(
                "no stiffness tensor for behaviours of type '{btype}'"
            )))
        }
    }
    check_properties(props, stiffness_properties_nb(h, stype)?)?;
    match stype {
        SymmetryType::Isotropic => compute_isotropic_stiffness_tensor(h, altered, props[0], props[1]),
        SymmetryType::Orthotropic => compute_orthotropic_stiffness_tensor(h, altered, props),
    }
}

pub fn compute_isotropic_stiffness_tensor(
    h: ModellingHypothesis,
    altered: bool,
    young: f64,
    nu: f64,
) -> Result<DMatrix<f64>> {
    let n = h.stensor_size()?;
    let mut c = DMatrix::zeros(n, n);
    if h.is_plane_stress() && altered {
        let c1 = young / (1.0 - nu * nu);
        let c2 = nu * c1;
        let c3 = (1.0 - nu) * c1;
        c[(0, 0)] = c1;
        c[(0, 1)] = c2;
        c[(1, 0)] = c2;
        c[(1, 1)] = c1;
        c[(3, 3)] = c3;
        return Ok(c);
    }
    let lambda = young * nu / ((1.0 - 2.0 * nu) * (1.0 + nu));
    let g2 = young / (1.0 + nu);
    for i in 0..3 {
        for j in 0..3 {
            c[(i, j)] = lambda;
        }
        c[(i, i)] = lambda + g2;
    }
    for i in 3..n {
        c[(i, i)] = g2;
    }
    Ok(c)
}

/// Normal block of the orthotropic stiffness, inverse of the compliance.
fn orthotropic_normal_block(props: &[f64]) -> [[f64; 3]; 3] {
    let s11 = 1.0 / props[0];
    let s22 = 1.0 / props[1];
    let s33 = 1.0 / props[2];
    let s12 = -props[3] / props[0];
    let s13 = -props[5] / props[0];
    let s23 = -props[4] / props[1];
    let det_s = s11 * s22 * s33 + 2.0 * s23 * s13 * s12
        - s11 * s23 * s23
        - s22 * s13 * s13
        - s33 * s12 * s12;
    let c11 = (s22 * s33 - s23 * s23) / det_s;
    let c12 = (s13 * s23 - s12 * s33) / det_s;
    let c13 = (s12 * s23 - s13 * s22) / det_s;
    let c22 = (s11 * s33 - s13 * s13) / det_s;
    let c23 = (s12 * s13 - s11 * s23) / det_s;
    let c33 = (s11 * s22 - s12 * s12) / det_s;
    [[c11, c12, c13], [c12, c22, c23], [c13, c23, c33]]
}

/// Properties: `E1 E2 E3 nu12 nu23 nu13 G12 G23 G13`, truncated to 6 in
/// 1D and 7 in 2D.
pub fn compute_orthotropic_stiffness_tensor(
    h: ModellingHypothesis,
    altered: bool,
    props: &[f64],
) -> Result<DMatrix<f64>> {
    check_properties(props, stiffness_properties_nb(h, SymmetryType::Orthotropic)?)?;
    let n = h.stensor_size()?;
    let mut c = DMatrix::zeros(n, n);
    if h.is_plane_stress() && altered {
        let s11 = 1.0 / props[0];
        let s22 = 1.0 / props[1];
        let s12 = -props[3] / props[0];
        let det = s11 * s22 - s12 * s12;
        c[(0, 0)] = s22 / det;
        c[(0, 1)] = -s12 / det;
        c[(1, 0)] = -s12 / det;
        c[(1, 1)] = s11 / det;
        c[(3, 3)] = 2.0 * props[6];
        return Ok(c);
    }
    let normal = orthotropic_normal_block(props);
    for i in 0..3 {
        for j in 0..3 {
            c[(i, j)] = normal[i][j];
        }
    }
    if n >= 4 {
        c[(3, 3)] = 2.0 * props[6];
    }
    if n == 6 {
        c[(4, 4)] = 2.0 * props[8];
        c[(5, 5)] = 2.0 * props[7];
    }
    Ok(c)
}

/// Thermal expansion coefficients as a canonical stensor.
pub fn compute_thermal_expansion_coefficient_tensor(
    h: ModellingHypothesis,
    stype: SymmetryType,
    props: &[f64],
) -> Result<DVector<f64>> {
    check_properties(props, thermal_expansion_properties_nb(h, stype)?)?;
    let mut a = DVector::zeros(h.stensor_size()?);
    match stype {
        SymmetryType::Isotropic => a.rows_mut(0, 3).fill(props[0]),
        SymmetryType::Orthotropic => {
            a[0] = props[0];
            a[1] = props[1];
            if !h.is_plane_stress() {
                a[2] = props[2];
            }
        }
    }
    Ok(a)
}
