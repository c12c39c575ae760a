//! Kinematics and stress measures of finite strain behaviours.
//!
//! The first half works on [`Matrix3`]s. The second half works on the
//! buffers of the Fortran solvers: a deformation gradient is 9 reals stored
//! column-major (`F11 F21 F31 F12 ...`), symmetric tensors follow the
//! solver's `(11, 22, 33, 12, 13, 23)` layout truncated to `ntens`
//! components, strains use engineering shears.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{axial_strain_offset, VariableDescriptor};
use nalgebra::Matrix3;

/// Below this value the determinant of a deformation gradient is
/// considered null.
pub const SINGULAR_DETERMINANT: f64 = 1e-12;

pub fn fortran_to_matrix(f: &[f64]) -> Result<Matrix3<f64>> {
    if f.len() < 9 {
        return Err(BehaviourError::InvalidTensorSize {
            expected: 9,
            got: f.len(),
        });
    }
    Ok(Matrix3::from_column_slice(&f[..9]))
}

pub fn matrix_to_fortran(m: &Matrix3<f64>) -> [f64; 9] {
    let mut f = [0.0; 9];
    f.copy_from_slice(m.as_slice());
    f
}

/// Determinant of `f`, rejecting (nearly) singular gradients.
pub fn jacobian(f: &Matrix3<f64>) -> Result<f64> {
    let j = f.determinant();
    if j.abs() <= SINGULAR_DETERMINANT {
        return Err(BehaviourError::Internal(
            "singular deformation gradient".to_string(),
        ));
    }
    Ok(j)
}

fn inverse(f: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    jacobian(f)?;
    f.try_inverse()
        .ok_or_else(|| BehaviourError::Internal("singular deformation gradient".to_string()))
}

pub fn green_lagrange(f: &Matrix3<f64>) -> Matrix3<f64> {
    0.5 * (f.transpose() * f - Matrix3::identity())
}

/// `sigma = J^-1 F S F^T`
pub fn pk2_to_cauchy(s: &Matrix3<f64>, f: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    let j = jacobian(f)?;
    Ok(f * s * f.transpose() / j)
}

/// `S = J F^-1 sigma F^-T`
pub fn cauchy_to_pk2(sigma: &Matrix3<f64>, f: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    let j = jacobian(f)?;
    let fi = inverse(f)?;
    Ok(j * fi * sigma * fi.transpose())
}

pub fn kirchhoff_from_cauchy(sigma: &Matrix3<f64>, f: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    Ok(jacobian(f)? * sigma)
}

/// First Piola-Kirchhoff stress `P = J sigma F^-T`.
pub fn pk1_from_cauchy(sigma: &Matrix3<f64>, f: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    let j = jacobian(f)?;
    Ok(j * sigma * inverse(f)?.transpose())
}

/// Matrix indices of the components of a solver stensor buffer.
pub fn stensor_layout(ntens: usize, ps: bool) -> Result<&'static [(usize, usize)]> {
    static PLANE_STRESS: [(usize, usize); 3] = [(0, 0), (1, 1), (0, 1)];
    static FULL: [(usize, usize); 6] = [(0, 0), (1, 1), (2, 2), (0, 1), (0, 2), (1, 2)];
    match (ntens, ps) {
        (3, true) => Ok(&PLANE_STRESS),
        (3, false) | (4, _) | (6, _) => Ok(&FULL[..ntens]),
        _ => Err(BehaviourError::InvalidTensorSize {
            expected: 6,
            got: ntens,
        }),
    }
}

fn read_stress(s: &[f64], layout: &[(usize, usize)]) -> Result<Matrix3<f64>> {
    if s.len() < layout.len() {
        return Err(BehaviourError::InvalidTensorSize {
            expected: layout.len(),
            got: s.len(),
        });
    }
    let mut m = Matrix3::zeros();
    for (k, (i, j)) in layout.iter().enumerate() {
        m[(*i, *j)] = s[k];
        m[(*j, *i)] = s[k];
    }
    Ok(m)
}

fn write_stress(m: &Matrix3<f64>, s: &mut [f64], layout: &[(usize, usize)], ps: bool) {
    for (k, (i, j)) in layout.iter().enumerate() {
        s[k] = if ps && *i == 2 && *j == 2 { 0.0 } else { m[(*i, *j)] };
    }
}

/// Deformation gradient of a solver buffer, the through-thickness stretch
/// being replaced by `fzz` in plane stress.
fn solver_gradient(f: &[f64], fzz: Option<f64>) -> Result<Matrix3<f64>> {
    let mut m = fortran_to_matrix(f)?;
    if let Some(fzz) = fzz {
        m[(2, 2)] = fzz;
    }
    Ok(m)
}

/// Green-Lagrange strain of the Fortran gradient `f`, engineering shears.
pub fn compute_green_lagrange_strain(e: &mut [f64], f: &[f64], ntens: usize, ps: bool) -> Result<()> {
    let layout = stensor_layout(ntens, ps)?;
    if e.len() < ntens {
        return Err(BehaviourError::InvalidTensorSize {
            expected: ntens,
            got: e.len(),
        });
    }
    let egl = green_lagrange(&fortran_to_matrix(f)?);
    for (k, (i, j)) in layout.iter().enumerate() {
        e[k] = if i == j { egl[(*i, *j)] } else { 2.0 * egl[(*i, *j)] };
    }
    Ok(())
}

/// Converts, in place, a Cauchy stress buffer into the second
/// Piola-Kirchhoff stress.
pub fn compute_second_piola_kirchhoff_stress_from_cauchy_stress(
    s: &mut [f64],
    f: &[f64],
    ntens: usize,
    ps: bool,
    fzz: Option<f64>,
) -> Result<()> {
    let layout = stensor_layout(ntens, ps)?;
    let sigma = read_stress(s, layout)?;
    let pk2 = cauchy_to_pk2(&sigma, &solver_gradient(f, fzz)?)?;
    write_stress(&pk2, s, layout, ps);
    Ok(())
}

/// Converts, in place, a second Piola-Kirchhoff stress buffer into the
/// Cauchy stress.
pub fn compute_cauchy_stress_from_second_piola_kirchhoff_stress(
    s: &mut [f64],
    f: &[f64],
    ntens: usize,
    ps: bool,
    fzz: Option<f64>,
) -> Result<()> {
    let layout = stensor_layout(ntens, ps)?;
    let pk2 = read_stress(s, layout)?;
    let sigma = pk2_to_cauchy(&pk2, &solver_gradient(f, fzz)?)?;
    write_stress(&sigma, s, layout, ps);
    Ok(())
}

/// Value of the state variable whose external name is `AxialStrain`.
pub fn axial_strain(
    statev: &[f64],
    variables: &[VariableDescriptor],
    h: ModellingHypothesis,
    behaviour: &str,
) -> Result<f64> {
    let offset = axial_strain_offset(variables, h, behaviour)?;
    statev
        .get(offset)
        .copied()
        .ok_or(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: offset + 1,
            got: statev.len(),
        })
}

/// Through-thickness stretch `1 + ezz` of a finite strain behaviour in
/// plane stress.
pub fn axial_deformation_gradient(
    statev: &[f64],
    variables: &[VariableDescriptor],
    h: ModellingHypothesis,
    behaviour: &str,
) -> Result<f64> {
    Ok(1.0 + axial_strain(statev, variables, h, behaviour)?)
}

/// Through-thickness stretch `sqrt(1 + 2 ezz)` of a Green-Lagrange axial
/// strain.
pub fn green_lagrange_axial_stretch(ezz: f64) -> Result<f64> {
    let c = 1.0 + 2.0 * ezz;
    if c <= 0.0 {
        return Err(BehaviourError::Internal(format!("invalid axial strain ({ezz})")));
    }
    Ok(c.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const F: [f64; 9] = [1.1, 0.05, 0.0, 0.2, 0.95, 0.0, 0.0, 0.0, 1.02];

    #[test]
    fn fortran_layout_is_column_major() {
        let m = fortran_to_matrix(&F).unwrap();
        assert_eq!(m[(1, 0)], 0.05);
        assert_eq!(m[(0, 1)], 0.2);
        assert_eq!(matrix_to_fortran(&m), F);
    }

    #[test]
    fn green_lagrange_matches_the_component_formula() {
        let mut e = [0.0; 4];
        compute_green_lagrange_strain(&mut e, &F, 4, false).unwrap();
        assert_relative_eq!(e[0], 0.5 * (F[0] * F[0] + F[1] * F[1] + F[2] * F[2] - 1.0), epsilon = 1e-15);
        assert_relative_eq!(e[3], F[2] * F[5] + F[1] * F[4] + F[0] * F[3], epsilon = 1e-15);
    }

    #[test]
    fn singular_gradient_is_an_internal_error() {
        let f = Matrix3::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 1.0);
        let err = cauchy_to_pk2(&Matrix3::identity(), &f).unwrap_err();
        assert_eq!(err.status_code(), -6);
    }

    #[test]
    fn plane_stress_layout() {
        assert_eq!(stensor_layout(3, true).unwrap(), &[(0, 0), (1, 1), (0, 1)]);
        assert!(stensor_layout(5, false).is_err());
    }

    #[test]
    fn axial_stretch_lookup() {
        let h = ModellingHypothesis::PlaneStress;
        let variables = [
            VariableDescriptor::stensor("eel", "ElasticStrain"),
            VariableDescriptor::scalar("etozz", "AxialStrain"),
        ];
        let statev = [0.0, 0.0, 0.0, 0.0, -2e-3];
        assert_relative_eq!(axial_deformation_gradient(&statev, &variables, h, "b").unwrap(), 0.998);
        let err = axial_deformation_gradient(&statev, &variables[..1], h, "b").unwrap_err();
        assert!(matches!(err, BehaviourError::MissingAxialStrain(_)));
        assert!(axial_strain(&statev[..4], &variables, h, "b").is_err());
        assert_relative_eq!(green_lagrange_axial_stretch(0.5 * (0.81 - 1.0)).unwrap(), 0.9, max_relative = 1e-14);
        assert!(green_lagrange_axial_stretch(-0.5).is_err());
    }

    #[test]
    fn kirchhoff_and_pk1() {
        let f = fortran_to_matrix(&F).unwrap();
        let sigma = Matrix3::new(100.0, 10.0, 0.0, 10.0, 50.0, 0.0, 0.0, 0.0, 0.0);
        let tau = kirchhoff_from_cauchy(&sigma, &f).unwrap();
        let pk1 = pk1_from_cauchy(&sigma, &f).unwrap();
        let pk2 = cauchy_to_pk2(&sigma, &f).unwrap();
        assert_relative_eq!(pk1, f * pk2, epsilon = 1e-10);
        assert_relative_eq!(tau, pk1 * f.transpose(), epsilon = 1e-10);
    }
}
