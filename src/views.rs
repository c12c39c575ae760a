//! Conversion between the solvers' flat buffers and the canonical Mandel
//! representation.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::mandel::scale_shear;
use nalgebra::{DMatrix, DVector, Matrix3};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

/// Storage of the shear components of a symmetric tensor in a solver buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverConvention {
    /// Already scaled by `sqrt(2)`.
    Mandel,
    /// Engineering shear strain, `gamma = 2 eps`.
    Engineering,
    /// Plain tensorial component, e.g. stresses.
    Tensorial,
}

impl SolverConvention {
    /// Factor applied to the shear components when importing a buffer.
    fn import_factor(self) -> f64 {
        match self {
            SolverConvention::Mandel => 1.0,
            SolverConvention::Engineering => FRAC_1_SQRT_2,
            SolverConvention::Tensorial => SQRT_2,
        }
    }
}

/// Order in which a solver stores a square matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageOrder {
    /// Fortran solvers.
    ColumnMajor,
    RowMajor,
}

fn check_len(len: usize, expected: usize) -> Result<()> {
    if len < expected {
        return Err(BehaviourError::InvalidTensorSize { expected, got: len });
    }
    Ok(())
}

pub fn import_stensor(
    buffer: &[f64],
    h: ModellingHypothesis,
    convention: SolverConvention,
) -> Result<DVector<f64>> {
    let n = h.stensor_size()?;
    check_len(buffer.len(), n)?;
    let mut v = DVector::from_column_slice(&buffer[..n]);
    scale_shear(v.as_mut_slice(), convention.import_factor());
    Ok(v)
}

pub fn export_stensor(
    v: &DVector<f64>,
    buffer: &mut [f64],
    convention: SolverConvention,
) -> Result<()> {
    check_len(buffer.len(), v.len())?;
    buffer[..v.len()].copy_from_slice(v.as_slice());
    scale_shear(&mut buffer[..v.len()], 1.0 / convention.import_factor());
    Ok(())
}

/// Scaling factor between the canonical and the solver's representation of
/// the `(i, j)` component of a stensor-to-stensor operator.
fn normalisation_factor(i: usize, j: usize) -> f64 {
    match (i < 3, j < 3) {
        (true, true) => 1.0,
        (false, false) => 0.5,
        _ => FRAC_1_SQRT_2,
    }
}

/// Converts a canonical tangent operator to the engineering convention used
/// by the UMAT-like solvers.
pub fn normalize_tangent(d: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(d.nrows(), d.ncols(), |i, j| {
        d[(i, j)] * normalisation_factor(i, j)
    })
}

/// Inverse of [`normalize_tangent`].
pub fn denormalize_tangent(d: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(d.nrows(), d.ncols(), |i, j| {
        d[(i, j)] / normalisation_factor(i, j)
    })
}

/// Swaps the row and column indices of a flat `n x n` buffer in place.
pub fn transpose(buffer: &mut [f64], n: usize) -> Result<()> {
    check_len(buffer.len(), n * n)?;
    for i in 0..n {
        for j in (i + 1)..n {
            buffer.swap(i * n + j, j * n + i);
        }
    }
    Ok(())
}

/// Writes an operator in the solver buffer. `nalgebra` matrices are column
/// major, so row-major solvers get the transposed storage unless the
/// operator is known to be symmetric.
pub fn export_tangent(
    d: &DMatrix<f64>,
    buffer: &mut [f64],
    order: StorageOrder,
    symmetric: bool,
) -> Result<()> {
    let n = d.nrows() * d.ncols();
    check_len(buffer.len(), n)?;
    buffer[..n].copy_from_slice(d.as_slice());
    if order == StorageOrder::RowMajor && !symmetric {
        if d.nrows() == d.ncols() {
            transpose(&mut buffer[..n], d.nrows())?;
        } else {
            for i in 0..d.nrows() {
                for j in 0..d.ncols() {
                    buffer[i * d.ncols() + j] = d[(i, j)];
                }
            }
        }
    }
    Ok(())
}

pub fn import_tangent(
    buffer: &[f64],
    nrows: usize,
    ncols: usize,
    order: StorageOrder,
) -> Result<DMatrix<f64>> {
    check_len(buffer.len(), nrows * ncols)?;
    Ok(match order {
        StorageOrder::ColumnMajor => DMatrix::from_column_slice(nrows, ncols, &buffer[..nrows * ncols]),
        StorageOrder::RowMajor => DMatrix::from_row_slice(nrows, ncols, &buffer[..nrows * ncols]),
    })
}

/// Canonical indices of the components kept by the reduced plane stress
/// layout `(11, 22, 12)`.
pub const PLANE_STRESS_COMPONENTS: [usize; 3] = [0, 1, 3];

/// Extracts the reduced plane stress operator, in the engineering
/// convention, from a canonical operator of size 4 or 6.
pub fn extract_plane_stress_tangent(d: &DMatrix<f64>) -> Result<Matrix3<f64>> {
    if d.nrows() != d.ncols() || d.nrows() < 4 {
        return Err(BehaviourError::InvalidTensorSize {
            expected: 4,
            got: d.nrows(),
        });
    }
    let map = PLANE_STRESS_COMPONENTS;
    Ok(Matrix3::from_fn(|i, j| {
        d[(map[i], map[j])] * normalisation_factor(map[i], map[j])
    }))
}

/// Column-major packing of [`extract_plane_stress_tangent`].
pub fn pack_plane_stress_tangent(d: &DMatrix<f64>) -> Result<[f64; 9]> {
    let k = extract_plane_stress_tangent(d)?;
    let mut packed = [0.0; 9];
    packed.copy_from_slice(k.as_slice());
    Ok(packed)
}

/// Expands the reduced `(11, 22, 12)` layout into a canonical 2D stensor,
/// the `zz` component being left to the behaviour.
pub fn import_plane_stress_stensor(buffer: &[f64], convention: SolverConvention) -> Result<DVector<f64>> {
    check_len(buffer.len(), 3)?;
    Ok(DVector::from_vec(vec![
        buffer[0],
        buffer[1],
        0.0,
        buffer[2] * convention.import_factor(),
    ]))
}

pub fn export_plane_stress_stensor(
    v: &DVector<f64>,
    buffer: &mut [f64],
    convention: SolverConvention,
) -> Result<()> {
    check_len(buffer.len(), 3)?;
    if v.len() != 4 {
        return Err(BehaviourError::InvalidTensorSize {
            expected: 4,
            got: v.len(),
        });
    }
    buffer[0] = v[0];
    buffer[1] = v[1];
    buffer[2] = v[3] / convention.import_factor();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn engineering_strain_import() {
        let gamma = [1.0, 2.0, 3.0, 0.2, 0.4, 0.6];
        let v = import_stensor(&gamma, ModellingHypothesis::Tridimensional, SolverConvention::Engineering)
            .unwrap();
        assert_relative_eq!(v[3], 0.2 / SQRT_2, epsilon = 1e-15);
        let mut out = [0.0; 6];
        export_stensor(&v, &mut out, SolverConvention::Engineering).unwrap();
        for (a, b) in out.iter().zip(gamma.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn plane_stress_operator_from_a_full_operator() {
        let d = DMatrix::from_fn(6, 6, |i, j| (10 * i + j + 1) as f64);
        let k = extract_plane_stress_tangent(&d).unwrap();
        assert_eq!(k[(0, 0)], 1.0);
        assert_eq!(k[(1, 0)], 11.0);
        assert_relative_eq!(k[(0, 2)], 4.0 * FRAC_1_SQRT_2, max_relative = 1e-15);
        assert_relative_eq!(k[(2, 1)], 32.0 * FRAC_1_SQRT_2, max_relative = 1e-15);
        assert_relative_eq!(k[(2, 2)], 17.0, max_relative = 1e-15);
        // column-major packing
        let packed = pack_plane_stress_tangent(&d).unwrap();
        assert_relative_eq!(packed[6], 4.0 * FRAC_1_SQRT_2, max_relative = 1e-15);
        assert!(extract_plane_stress_tangent(&DMatrix::zeros(3, 3)).is_err());
    }

    #[test]
    fn normalisation_factors() {
        let d = DMatrix::from_element(4, 4, 1.0);
        let n = normalize_tangent(&d);
        assert_eq!(n[(0, 1)], 1.0);
        assert_relative_eq!(n[(0, 3)], FRAC_1_SQRT_2);
        assert_relative_eq!(n[(3, 0)], FRAC_1_SQRT_2);
        assert_eq!(n[(3, 3)], 0.5);
        assert_relative_eq!(denormalize_tangent(&n), d, epsilon = 1e-15);
    }

    #[test]
    fn row_major_export_transposes_general_operators() {
        let d = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let mut column_major = [0.0; 9];
        export_tangent(&d, &mut column_major, StorageOrder::ColumnMajor, false).unwrap();
        assert_eq!(column_major, [1.0, 4.0, 7.0, 2.0, 5.0, 8.0, 3.0, 6.0, 9.0]);
        let mut row_major = [0.0; 9];
        export_tangent(&d, &mut row_major, StorageOrder::RowMajor, false).unwrap();
        assert_eq!(row_major, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let back = import_tangent(&row_major, 3, 3, StorageOrder::RowMajor).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn plane_stress_round_trip() {
        let v = import_plane_stress_stensor(&[1.0, 2.0, 0.5], SolverConvention::Engineering).unwrap();
        assert_eq!(v.len(), 4);
        assert_eq!(v[2], 0.0);
        let mut out = [0.0; 3];
        export_plane_stress_stensor(&v, &mut out, SolverConvention::Engineering).unwrap();
        assert_relative_eq!(out[2], 0.5, epsilon = 1e-15);
    }
}
