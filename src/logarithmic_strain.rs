//! Logarithmic strain framework (Miehe, Apel and Lambrecht).
//!
//! A behaviour written in terms of `E_log = 1/2 ln(C)` and of its dual
//! stress `T` is turned into a finite strain behaviour by the conversions of
//! [`LogarithmicStrainHandler`]. The derivatives of the isotropic tensor
//! function are computed with the Daleckii-Krein formulae, coincident
//! eigenvalues being handled through the limits of the divided differences.
use crate::error::{BehaviourError, Result};
use crate::finite_strain;
use crate::mandel::{mandel_basis, mandel_to_tensor, tensor_to_mandel};
use nalgebra::{Matrix3, SMatrix, SVector, SymmetricEigen, Vector3};

type Stensor = SVector<f64, 6>;
type StensorOperator = SMatrix<f64, 6, 6>;

fn g(x: f64) -> f64 {
    0.5 * x.ln()
}

fn dg(x: f64) -> f64 {
    0.5 / x
}

fn d2g(x: f64) -> f64 {
    -0.5 / (x * x)
}

fn coincident(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-10 * a.abs().max(b.abs()).max(1.0)
}

/// First divided difference `g[a, b]`.
fn divided_difference(a: f64, b: f64) -> f64 {
    if coincident(a, b) {
        dg(0.5 * (a + b))
    } else {
        (g(a) - g(b)) / (a - b)
    }
}

/// Second divided difference `g[a, b, c]`.
fn second_divided_difference(a: f64, b: f64, c: f64) -> f64 {
    if !coincident(a, c) {
        (divided_difference(a, b) - divided_difference(b, c)) / (a - c)
    } else if !coincident(a, b) {
        (divided_difference(a, c) - divided_difference(c, b)) / (a - b)
    } else {
        0.5 * d2g((a + b + c) / 3.0)
    }
}

#[derive(Debug, Clone)]
pub struct LogarithmicStrainHandler {
    f: Matrix3<f64>,
    /// Eigenvalues of the right Cauchy-Green tensor.
    eigenvalues: Vector3<f64>,
    eigenvectors: Matrix3<f64>,
    strain: Stensor,
    /// `dE_log / dE_GL`
    projector: StensorOperator,
}

impl LogarithmicStrainHandler {
    pub fn new(f: Matrix3<f64>) -> Result<Self> {
        finite_strain::jacobian(&f)?;
        let c = f.transpose() * f;
        let eigen = SymmetricEigen::new(c);
        if eigen.eigenvalues.iter().any(|l| *l <= 0.0) {
            return Err(BehaviourError::Internal(
                "non positive eigenvalue of the right Cauchy-Green tensor".to_string(),
            ));
        }
        let (eigenvalues, eigenvectors) = (eigen.eigenvalues, eigen.eigenvectors);
        let log = eigenvectors
            * Matrix3::from_diagonal(&eigenvalues.map(g))
            * eigenvectors.transpose();
        let mut handler = Self {
            f,
            eigenvalues,
            eigenvectors,
            strain: tensor_to_mandel(&log),
            projector: StensorOperator::zeros(),
        };
        for k in 0..6 {
            // dC = 2 dE_GL
            let d = handler.first_derivative(&mandel_basis(k)) * 2.0;
            handler.projector.set_column(k, &tensor_to_mandel(&d));
        }
        Ok(handler)
    }

    fn to_eigen_basis(&self, x: &Matrix3<f64>) -> Matrix3<f64> {
        self.eigenvectors.transpose() * x * self.eigenvectors
    }

    /// Directional derivative of `1/2 ln(C)` along `dc`.
    fn first_derivative(&self, dc: &Matrix3<f64>) -> Matrix3<f64> {
        let l = &self.eigenvalues;
        let x = self.to_eigen_basis(dc);
        let y = Matrix3::from_fn(|i, j| divided_difference(l[i], l[j]) * x[(i, j)]);
        self.eigenvectors * y * self.eigenvectors.transpose()
    }

    /// `t : d2(1/2 ln C)[x, y]`, every argument expressed in the eigen basis.
    fn second_derivative_contraction(
        &self,
        t: &Matrix3<f64>,
        x: &Matrix3<f64>,
        y: &Matrix3<f64>,
    ) -> f64 {
        let l = &self.eigenvalues;
        let mut r = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    let dd = second_divided_difference(l[i], l[j], l[k]);
                    r += t[(i, k)] * dd * (x[(i, j)] * y[(j, k)] + y[(i, j)] * x[(j, k)]);
                }
            }
        }
        r
    }

    pub fn deformation_gradient(&self) -> &Matrix3<f64> {
        &self.f
    }

    pub fn logarithmic_strain(&self) -> &Stensor {
        &self.strain
    }

    /// Derivative of the logarithmic strain with respect to the
    /// Green-Lagrange strain.
    pub fn projector(&self) -> &StensorOperator {
        &self.projector
    }

    /// `S = P^T : T`
    pub fn convert_to_second_piola_kirchhoff_stress(&self, t: &Stensor) -> Stensor {
        self.projector.transpose() * t
    }

    pub fn convert_from_second_piola_kirchhoff_stress(&self, s: &Stensor) -> Result<Stensor> {
        self.projector
            .transpose()
            .lu()
            .solve(s)
            .ok_or_else(|| BehaviourError::Internal("singular logarithmic strain projector".to_string()))
    }

    pub fn convert_to_cauchy_stress(&self, t: &Stensor) -> Result<Stensor> {
        let s = mandel_to_tensor(&self.convert_to_second_piola_kirchhoff_stress(t));
        Ok(tensor_to_mandel(&finite_strain::pk2_to_cauchy(&s, &self.f)?))
    }

    pub fn convert_from_cauchy_stress(&self, sigma: &Stensor) -> Result<Stensor> {
        let s = finite_strain::cauchy_to_pk2(&mandel_to_tensor(sigma), &self.f)?;
        self.convert_from_second_piola_kirchhoff_stress(&tensor_to_mandel(&s))
    }

    /// Converts `dT/dE_log` into `dS/dE_GL = P^T K P + T : L`.
    pub fn convert_to_material_tangent_modulus(&self, k: &StensorOperator, t: &Stensor) -> StensorOperator {
        let tt = self.to_eigen_basis(&mandel_to_tensor(t));
        let basis: Vec<Matrix3<f64>> = (0..6).map(|m| self.to_eigen_basis(&mandel_basis(m))).collect();
        // L = d2E_log/dE_GL2 = 4 d2(1/2 ln C)
        let tl = StensorOperator::from_fn(|m, n| {
            4.0 * self.second_derivative_contraction(&tt, &basis[m], &basis[n])
        });
        self.projector.transpose() * k * self.projector + tl
    }
}
