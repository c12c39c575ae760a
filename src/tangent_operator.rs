//! Conversions between the tangent operators of finite strain behaviours.
//!
//! Operators are handled in their 3D form: 6x6 for derivatives with
//! respect to a symmetric tensor, 6x9 for derivatives with respect to the
//! deformation gradient (canonical tensor ordering). Lower dimensional
//! operators are embedded with [`embed`] and recovered with [`truncate`].
use crate::error::{BehaviourError, Result};
use crate::finite_strain;
use crate::interfaces::TangentOperatorFlag;
use crate::logarithmic_strain::LogarithmicStrainHandler;
use crate::mandel::{self, mandel_basis, mandel_to_tensor, tensor_basis, tensor_to_mandel, TENSOR_INDICES};
use nalgebra::{DMatrix, Matrix3, SMatrix, SVector};

/// Kinematic and static state needed by the conversions.
#[derive(Debug, Clone)]
pub struct ConversionContext<'a> {
    /// Deformation gradient at the beginning of the step.
    pub f0: Matrix3<f64>,
    /// Deformation gradient at the end of the step.
    pub f1: Matrix3<f64>,
    /// Cauchy stress at the end of the step.
    pub cauchy: Matrix3<f64>,
    /// Logarithmic strain handler and dual stress, for `DT_DELOG`.
    pub logarithmic: Option<(&'a LogarithmicStrainHandler, SVector<f64, 6>)>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(f0: Matrix3<f64>, f1: Matrix3<f64>, cauchy: Matrix3<f64>) -> Self {
        Self {
            f0,
            f1,
            cauchy,
            logarithmic: None,
        }
    }

    fn second_piola_kirchhoff(&self) -> Result<Matrix3<f64>> {
        finite_strain::cauchy_to_pk2(&self.cauchy, &self.f1)
    }
}

/// Number of columns of the 3D operator.
pub fn operator_columns(flag: TangentOperatorFlag) -> usize {
    if flag.is_with_respect_to_tensor() {
        9
    } else {
        6
    }
}

/// Copies `k` into the top left corner of a zero `nrows x ncols` operator.
pub fn embed(k: &DMatrix<f64>, nrows: usize, ncols: usize) -> Result<DMatrix<f64>> {
    if k.nrows() > nrows || k.ncols() > ncols {
        return Err(BehaviourError::InvalidTensorSize {
            expected: nrows * ncols,
            got: k.len(),
        });
    }
    let mut r = DMatrix::zeros(nrows, ncols);
    r.view_mut((0, 0), (k.nrows(), k.ncols())).copy_from(k);
    Ok(r)
}

pub fn truncate(k: &DMatrix<f64>, nrows: usize, ncols: usize) -> DMatrix<f64> {
    k.view((0, 0), (nrows, ncols)).into_owned()
}

fn check_shape(k: &DMatrix<f64>, flag: TangentOperatorFlag) -> Result<()> {
    let ncols = operator_columns(flag);
    if k.nrows() != 6 || k.ncols() != ncols {
        return Err(BehaviourError::InvalidTensorSize {
            expected: 6 * ncols,
            got: k.len(),
        });
    }
    Ok(())
}

fn unsupported(from: TangentOperatorFlag, to: TangentOperatorFlag) -> BehaviourError {
    BehaviourError::Internal(format!(
        "unsupported tangent operator conversion from '{from}' to '{to}'"
    ))
}

/// Converts the 3D operator `k` from `from` to `to`.
pub fn convert(
    from: TangentOperatorFlag,
    to: TangentOperatorFlag,
    k: &DMatrix<f64>,
    ctx: &ConversionContext,
) -> Result<DMatrix<f64>> {
    use TangentOperatorFlag::*;
    check_shape(k, from)?;
    if from == to {
        return Ok(k.clone());
    }
    match (from, to) {
        (DT_DELOG, _) => convert(DS_DEGL, to, &logarithmic_to_green_lagrange(k, ctx)?, ctx),
        (DS_DC, _) => convert(DS_DEGL, to, &(k * 2.0), ctx),
        (ABAQUS, _) => convert(DS_DEGL, to, &abaqus_to_green_lagrange(k, ctx)?, ctx),
        (C_TRUESDELL, _) => convert(DS_DEGL, to, &truesdell_to_green_lagrange(&to_static::<6>(k), ctx)?, ctx),
        (DS_DEGL, DS_DC) => Ok(k * 0.5),
        (DS_DEGL, C_TRUESDELL) => Ok(to_dynamic(&green_lagrange_to_truesdell(k, ctx)?)),
        (DS_DEGL, ABAQUS) => green_lagrange_to_abaqus(k, ctx),
        (DS_DEGL, _) => convert(DS_DF, to, &green_lagrange_to_ds_df(k, ctx), ctx),
        (DS_DF | DSIG_DF | DTAU_DF, DS_DDF | DSIG_DDF | DTAU_DDF) => {
            let dx_df = convert(from, with_respect_to_f(to), k, ctx)?;
            Ok(with_respect_to_increment(&dx_df, &ctx.f0))
        }
        (DS_DF, DSIG_DF) => ds_df_to_dsig_df(k, ctx),
        (DS_DF, DTAU_DF) => convert(DSIG_DF, DTAU_DF, &ds_df_to_dsig_df(k, ctx)?, ctx),
        (DSIG_DF, DTAU_DF) => dsig_df_to_dtau_df(k, ctx),
        (DSIG_DF, DS_DF) => convert(DTAU_DF, DS_DF, &dsig_df_to_dtau_df(k, ctx)?, ctx),
        (DTAU_DF, DS_DF) => dtau_df_to_ds_df(k, ctx),
        (DTAU_DF, DSIG_DF) => convert(DS_DF, DSIG_DF, &dtau_df_to_ds_df(k, ctx)?, ctx),
        _ => Err(unsupported(from, to)),
    }
}

fn with_respect_to_f(flag: TangentOperatorFlag) -> TangentOperatorFlag {
    use TangentOperatorFlag::*;
    match flag {
        DS_DDF => DS_DF,
        DSIG_DDF => DSIG_DF,
        DTAU_DDF => DTAU_DF,
        other => other,
    }
}

fn to_static<const C: usize>(k: &DMatrix<f64>) -> SMatrix<f64, 6, C> {
    SMatrix::<f64, 6, C>::from_fn(|i, j| k[(i, j)])
}

/// `F1 = dF F0`, hence `dX/d(dF) : A = dX/dF1 : (A F0)`.
fn with_respect_to_increment(k: &DMatrix<f64>, f0: &Matrix3<f64>) -> DMatrix<f64> {
    let mut r = DMatrix::zeros(6, 9);
    for col in 0..9 {
        let pushed = tensor_basis(col) * f0;
        for (l, (i, j)) in TENSOR_INDICES.iter().enumerate() {
            let c = pushed[(*i, *j)];
            if c != 0.0 {
                for row in 0..6 {
                    r[(row, col)] += k[(row, l)] * c;
                }
            }
        }
    }
    r
}

/// `dE = sym(F^T dF)`
fn green_lagrange_to_ds_df(k: &DMatrix<f64>, ctx: &ConversionContext) -> DMatrix<f64> {
    let k = to_static::<6>(k);
    let mut r = DMatrix::zeros(6, 9);
    for col in 0..9 {
        // tensor_to_mandel symmetrises its argument
        let de = tensor_to_mandel(&(ctx.f1.transpose() * tensor_basis(col)));
        r.column_mut(col).copy_from(&(k * de));
    }
    r
}

fn ds_df_to_dsig_df(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    let f = &ctx.f1;
    let j = finite_strain::jacobian(f)?;
    let fi = f
        .try_inverse()
        .ok_or_else(|| BehaviourError::Internal("singular deformation gradient".to_string()))?;
    let s = ctx.second_piola_kirchhoff()?;
    let mut r = DMatrix::zeros(6, 9);
    for col in 0..9 {
        let df = tensor_basis(col);
        let ds = mandel_to_tensor(&SVector::<f64, 6>::from_fn(|i, _| k[(i, col)]));
        let dsig = -(fi * df).trace() * ctx.cauchy
            + (df * s * f.transpose() + f * s * df.transpose() + f * ds * f.transpose()) / j;
        r.column_mut(col).copy_from(&tensor_to_mandel(&dsig));
    }
    Ok(r)
}

/// `tau = J sigma`
fn dsig_df_to_dtau_df(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    let f = &ctx.f1;
    let j = finite_strain::jacobian(f)?;
    let fi = f
        .try_inverse()
        .ok_or_else(|| BehaviourError::Internal("singular deformation gradient".to_string()))?;
    let sigma = tensor_to_mandel(&ctx.cauchy);
    let mut r = DMatrix::zeros(6, 9);
    for col in 0..9 {
        let dj = j * (fi * tensor_basis(col)).trace();
        for row in 0..6 {
            r[(row, col)] = j * k[(row, col)] + dj * sigma[row];
        }
    }
    Ok(r)
}

/// `S = F^-1 tau F^-T`
fn dtau_df_to_ds_df(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    let fi = ctx
        .f1
        .try_inverse()
        .ok_or_else(|| BehaviourError::Internal("singular deformation gradient".to_string()))?;
    let s = ctx.second_piola_kirchhoff()?;
    let mut r = DMatrix::zeros(6, 9);
    for col in 0..9 {
        let df = tensor_basis(col);
        let dtau = mandel_to_tensor(&SVector::<f64, 6>::from_fn(|i, _| k[(i, col)]));
        let ds = -fi * df * s - s * df.transpose() * fi.transpose() + fi * dtau * fi.transpose();
        r.column_mut(col).copy_from(&tensor_to_mandel(&ds));
    }
    Ok(r)
}

/// Operator `X -> sigma X + X sigma` on symmetric tensors.
fn jaumann_correction(sigma: &Matrix3<f64>) -> SMatrix<f64, 6, 6> {
    let mut a = SMatrix::<f64, 6, 6>::zeros();
    for n in 0..6 {
        let m = mandel_basis(n);
        a.set_column(n, &tensor_to_mandel(&(sigma * m + m * sigma)));
    }
    a
}

fn to_dynamic(k: &SMatrix<f64, 6, 6>) -> DMatrix<f64> {
    DMatrix::from_column_slice(6, 6, k.as_slice())
}

/// Push-forward of `dS/dE_GL` divided by `J`.
fn green_lagrange_to_truesdell(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<SMatrix<f64, 6, 6>> {
    let j = finite_strain::jacobian(&ctx.f1)?;
    let q = mandel::stensor_push_forward_operator(&ctx.f1);
    Ok(q * to_static::<6>(k) * q.transpose() / j)
}

fn truesdell_to_green_lagrange(k: &SMatrix<f64, 6, 6>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    let j = finite_strain::jacobian(&ctx.f1)?;
    let q = mandel::stensor_push_forward_operator(&ctx.f1);
    let qi = q
        .try_inverse()
        .ok_or_else(|| BehaviourError::Internal("singular deformation gradient".to_string()))?;
    Ok(to_dynamic(&(j * qi * k * qi.transpose())))
}

/// Truesdell modulus plus the correction turning it into the Jaumann rate
/// modulus.
fn green_lagrange_to_abaqus(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    let c = green_lagrange_to_truesdell(k, ctx)? + jaumann_correction(&ctx.cauchy);
    Ok(to_dynamic(&c))
}

fn abaqus_to_green_lagrange(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    truesdell_to_green_lagrange(&(to_static::<6>(k) - jaumann_correction(&ctx.cauchy)), ctx)
}

fn logarithmic_to_green_lagrange(k: &DMatrix<f64>, ctx: &ConversionContext) -> Result<DMatrix<f64>> {
    let (handler, t) = ctx.logarithmic.as_ref().ok_or_else(|| {
        BehaviourError::Internal("no logarithmic strain handler for a DT_DELOG operator".to_string())
    })?;
    let d = handler.convert_to_material_tangent_modulus(&to_static::<6>(k), t);
    Ok(DMatrix::from_column_slice(6, 6, d.as_slice()))
}
