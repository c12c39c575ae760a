//! Canonical storage of symmetric and non-symmetric second order tensors.
//!
//! Symmetric tensors are stored in Mandel notation, the off-diagonal
//! components being multiplied by `sqrt(2)`:
//! `xx, yy, zz, sqrt(2) xy, sqrt(2) xz, sqrt(2) yz`, truncated to the size
//! of the modelling hypothesis (`rr, zz, tt` in 1D).
//!
//! Non-symmetric tensors are stored as
//! `F11, F22, F33, F12, F21, F13, F31, F23, F32`, truncated to 3 or 5
//! components in 1D and 2D.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use nalgebra::{DVector, Matrix3, SMatrix, SVector};
use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

pub const MANDEL_IDENTITY: SVector<f64, 6> = SVector::<f64, 6>::new(1.0, 1.0, 1.0, 0.0, 0.0, 0.0);

pub fn trace(vector: &DVector<f64>) -> f64 {
    vector.rows(0, 3).sum()
}

/// Identity stensor for the given hypothesis.
pub fn identity(h: ModellingHypothesis) -> Result<DVector<f64>> {
    let mut id = DVector::zeros(h.stensor_size()?);
    id.rows_mut(0, 3).fill(1.0);
    Ok(id)
}

pub fn tensor_to_mandel(tensor: &Matrix3<f64>) -> SVector<f64, 6> {
    SVector::<f64, 6>::new(
        tensor.m11,
        tensor.m22,
        tensor.m33,
        FRAC_1_SQRT_2 * (tensor.m12 + tensor.m21),
        FRAC_1_SQRT_2 * (tensor.m13 + tensor.m31),
        FRAC_1_SQRT_2 * (tensor.m23 + tensor.m32),
    )
}

pub fn mandel_to_tensor(mandel: &SVector<f64, 6>) -> Matrix3<f64> {
    let (xy, xz, yz) = (
        FRAC_1_SQRT_2 * mandel[3],
        FRAC_1_SQRT_2 * mandel[4],
        FRAC_1_SQRT_2 * mandel[5],
    );
    Matrix3::new(
        mandel[0], xy, xz, //
        xy, mandel[1], yz, //
        xz, yz, mandel[2],
    )
}

fn check_size(v: &DVector<f64>, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(BehaviourError::InvalidTensorSize {
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

/// Expands a hypothesis-sized stensor to its 3D Mandel representation.
pub fn stensor_to_mandel3d(v: &DVector<f64>, h: ModellingHypothesis) -> Result<SVector<f64, 6>> {
    check_size(v, h.stensor_size()?)?;
    let mut m = SVector::<f64, 6>::zeros();
    m.rows_mut(0, v.len()).copy_from(v);
    Ok(m)
}

/// Truncates a 3D Mandel vector to the size of the hypothesis.
pub fn mandel3d_to_stensor(m: &SVector<f64, 6>, h: ModellingHypothesis) -> Result<DVector<f64>> {
    let n = h.stensor_size()?;
    Ok(DVector::from_column_slice(&m.as_slice()[..n]))
}

pub fn stensor_to_matrix(v: &DVector<f64>, h: ModellingHypothesis) -> Result<Matrix3<f64>> {
    Ok(mandel_to_tensor(&stensor_to_mandel3d(v, h)?))
}

pub fn matrix_to_stensor(m: &Matrix3<f64>, h: ModellingHypothesis) -> Result<DVector<f64>> {
    mandel3d_to_stensor(&tensor_to_mandel(m), h)
}

/// (row, column) of each component of the canonical non-symmetric tensor.
pub const TENSOR_INDICES: [(usize, usize); 9] = [
    (0, 0),
    (1, 1),
    (2, 2),
    (0, 1),
    (1, 0),
    (0, 2),
    (2, 0),
    (1, 2),
    (2, 1),
];

pub fn tensor_to_matrix(v: &DVector<f64>, h: ModellingHypothesis) -> Result<Matrix3<f64>> {
    check_size(v, h.tensor_size()?)?;
    let mut m = Matrix3::zeros();
    for (k, (i, j)) in TENSOR_INDICES.iter().take(v.len()).enumerate() {
        m[(*i, *j)] = v[k];
    }
    Ok(m)
}

pub fn matrix_to_tensor(m: &Matrix3<f64>, h: ModellingHypothesis) -> Result<DVector<f64>> {
    let n = h.tensor_size()?;
    Ok(DVector::from_iterator(
        n,
        TENSOR_INDICES.iter().take(n).map(|(i, j)| m[(*i, *j)]),
    ))
}

/// Identity non-symmetric tensor for the given hypothesis.
pub fn tensor_identity(h: ModellingHypothesis) -> Result<DVector<f64>> {
    matrix_to_tensor(&Matrix3::identity(), h)
}

/// Mandel basis element `k`, i.e. the symmetric matrix whose Mandel vector
/// is the `k`-th unit vector.
pub fn mandel_basis(k: usize) -> Matrix3<f64> {
    let mut e = SVector::<f64, 6>::zeros();
    e[k] = 1.0;
    mandel_to_tensor(&e)
}

/// Expresses the stensor `v` in the basis rotated by `r`, `r v r^T`.
pub fn rotate_stensor(v: &DVector<f64>, r: &Matrix3<f64>, h: ModellingHypothesis) -> Result<DVector<f64>> {
    let m = stensor_to_matrix(v, h)?;
    matrix_to_stensor(&(r * m * r.transpose()), h)
}

/// Linear map `M -> f M f^T` written as a 6x6 Mandel operator. With a
/// rotation matrix this is the change of basis of a stensor, with a
/// deformation gradient the push-forward of a material stensor.
pub fn stensor_push_forward_operator(f: &Matrix3<f64>) -> SMatrix<f64, 6, 6> {
    let mut q = SMatrix::<f64, 6, 6>::zeros();
    for k in 0..6 {
        let pushed = tensor_to_mandel(&(f * mandel_basis(k) * f.transpose()));
        q.set_column(k, &pushed);
    }
    q
}

/// Canonical basis element `k` of the non-symmetric tensors.
pub fn tensor_basis(k: usize) -> Matrix3<f64> {
    let (i, j) = TENSOR_INDICES[k];
    let mut e = Matrix3::zeros();
    e[(i, j)] = 1.0;
    e
}

/// Linear map `A -> r A r^T` on non-symmetric tensors, as a 9x9 operator in
/// the canonical tensor ordering.
pub fn tensor_rotation_operator(r: &Matrix3<f64>) -> SMatrix<f64, 9, 9> {
    let mut q = SMatrix::<f64, 9, 9>::zeros();
    for k in 0..9 {
        let rotated = r * tensor_basis(k) * r.transpose();
        for (l, (i, j)) in TENSOR_INDICES.iter().enumerate() {
            q[(l, k)] = rotated[(*i, *j)];
        }
    }
    q
}

/// Multiplies the shear components by `factor`.
pub fn scale_shear(v: &mut [f64], factor: f64) {
    for c in v.iter_mut().skip(3) {
        *c *= factor;
    }
}

pub fn shear_to_mandel(v: &mut [f64]) {
    scale_shear(v, SQRT_2)
}

pub fn shear_from_mandel(v: &mut [f64]) {
    scale_shear(v, FRAC_1_SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mandel_round_trip_3d() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0);
        let v = tensor_to_mandel(&m);
        assert_relative_eq!(v[3], SQRT_2 * 2.0, epsilon = 1e-14);
        assert_relative_eq!(v[4], SQRT_2 * 3.0, epsilon = 1e-14);
        assert_relative_eq!(v[5], SQRT_2 * 5.0, epsilon = 1e-14);
        assert_relative_eq!(mandel_to_tensor(&v), m, epsilon = 1e-14);
    }

    #[test]
    fn mandel_scalar_product_is_the_double_contraction() {
        let a = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0);
        let b = Matrix3::new(-1.0, 0.5, 0.1, 0.5, 2.0, -3.0, 0.1, -3.0, 1.0);
        let contraction = a.component_mul(&b).sum();
        assert_relative_eq!(
            tensor_to_mandel(&a).dot(&tensor_to_mandel(&b)),
            contraction,
            epsilon = 1e-12
        );
    }

    #[test]
    fn plane_stensor_keeps_out_of_plane_terms_null() {
        let v = DVector::from_vec(vec![1.0, 2.0, 3.0, SQRT_2]);
        let m = stensor_to_matrix(&v, ModellingHypothesis::PlaneStrain).unwrap();
        assert_relative_eq!(m.m12, 1.0, epsilon = 1e-14);
        assert_eq!(m.m13, 0.0);
        assert_eq!(m.m23, 0.0);
        let back = matrix_to_stensor(&m, ModellingHypothesis::PlaneStrain).unwrap();
        assert_relative_eq!(back, v, epsilon = 1e-14);
    }

    #[test]
    fn tensor_ordering() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let v = matrix_to_tensor(&m, ModellingHypothesis::Tridimensional).unwrap();
        assert_eq!(v.as_slice(), &[1.0, 5.0, 9.0, 2.0, 4.0, 3.0, 7.0, 6.0, 8.0]);
        let v2 = matrix_to_tensor(&m, ModellingHypothesis::PlaneStrain).unwrap();
        assert_eq!(v2.as_slice(), &[1.0, 5.0, 9.0, 2.0, 4.0]);
        assert_eq!(tensor_to_matrix(&v, ModellingHypothesis::Tridimensional).unwrap(), m);
    }

    #[test]
    fn wrong_size_is_reported() {
        let v = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(stensor_to_matrix(&v, ModellingHypothesis::Tridimensional).is_err());
    }

    #[test]
    fn rotation_operator_matches_direct_rotation() {
        let (c, s) = (0.3_f64.cos(), 0.3_f64.sin());
        let r = Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0);
        let v = DVector::from_vec(vec![1.0, -2.0, 0.5, 0.7, 0.2, -0.1]);
        let h = ModellingHypothesis::Tridimensional;
        let direct = rotate_stensor(&v, &r, h).unwrap();
        let q = stensor_push_forward_operator(&r);
        let via_operator = q * stensor_to_mandel3d(&v, h).unwrap();
        for i in 0..6 {
            assert_relative_eq!(direct[i], via_operator[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn tensor_rotation_operator_is_orthogonal() {
        let (c, s) = (0.7_f64.cos(), 0.7_f64.sin());
        let r = Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c);
        let q = tensor_rotation_operator(&r);
        assert_relative_eq!(q * q.transpose(), SMatrix::<f64, 9, 9>::identity(), epsilon = 1e-12);
    }
}
