//! CalculiX interface.
//!
//! Only the tridimensional hypothesis is supported. Mechanical strains are
//! given as tensorial components (`emec0`, `emec`); finite strain
//! behaviours receive the deformation gradients `xokl`, `xkl` and exchange
//! the second Piola-Kirchhoff stress. The tangent operator is written in
//! `stiff` as the 21 components of its upper triangle, column by column.
//!
//! Orthotropic behaviours require an orientation (`iorien` > 0) whose
//! material axes are built from `orab` at the integration point `pgauss`,
//! isotropic ones reject it.
use crate::error::{BehaviourError, Result};
use crate::finite_strain::{cauchy_to_pk2, fortran_to_matrix, pk2_to_cauchy};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, BehaviourType, PropertyRole, StiffnessMatrixType, SymmetryType, TangentOperatorFlag,
};
use crate::mandel;
use crate::parameters::ParameterStore;
use crate::solvers::dispatch::{self, BufferSizes};
use crate::solvers::handler::{self, HandlerInput, HandlerOptions, StepOutcome, StepOutput};
use crate::solvers::{behaviour_properties, out_of_bounds_policy, SolverPolicy};
use crate::stress_free_expansion::{
    FiniteStrainStressFreeExpansionHandler, SmallStrainStressFreeExpansionHandler,
    StressFreeExpansionHandler,
};
use crate::views::{self, SolverConvention, StorageOrder};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

pub struct CalculiX;

impl SolverPolicy for CalculiX {
    const NAME: &'static str = "CalculiX";
    const STRAIN_CONVENTION: SolverConvention = SolverConvention::Tensorial;
    const STRESS_CONVENTION: SolverConvention = SolverConvention::Tensorial;
    const STORAGE_ORDER: StorageOrder = StorageOrder::ColumnMajor;
    const FINITE_STRAIN_TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::DS_DEGL;
}

/// Size of the packed tangent operator.
pub const PACKED_STIFFNESS_SIZE: usize = 21;

#[derive(Debug)]
pub struct CalculiXCall<'a> {
    pub elconloc: &'a [f64],
    pub emec0: &'a [f64],
    pub emec: &'a [f64],
    pub xokl: &'a [f64],
    pub xkl: &'a [f64],
    /// Temperature at the end of the step.
    pub t1l: f64,
    pub dtime: f64,
    pub xstateini: &'a [f64],
    pub xstate: &'a mut [f64],
    pub stre: &'a mut [f64],
    pub stiff: &'a mut [f64],
    /// Index, starting at 1, of the orientation in `orab`, 0 for none.
    pub iorien: i32,
    /// Coordinates of the integration point.
    pub pgauss: &'a [f64],
    /// Orientations, 7 values each.
    pub orab: &'a [f64],
    pub pnewdt: &'a mut f64,
}

/// Number of values describing an orientation in `orab`.
pub const ORIENTATION_SIZE: usize = 7;

fn invalid_orientation(reason: &str) -> BehaviourError {
    BehaviourError::UnsupportedCase(format!("invalid orientation: {reason}"))
}

fn unit(v: Vector3<f64>, what: &str) -> Result<Vector3<f64>> {
    v.try_normalize(f64::EPSILON).ok_or_else(|| invalid_orientation(what))
}

/// Material axes, one per column, of the orientation `orab`: the points `a`
/// and `b` followed by the type of the system.
///
/// For a rectangular system (type 1), `a` lies on the first axis and `b` in
/// the plane of the first two axes. For a cylindrical system (type 2), `a`
/// and `b` define the third axis and the first one is radial at `pgauss`.
pub fn material_axes(orab: &[f64], pgauss: &[f64]) -> Result<Matrix3<f64>> {
    if orab.len() < ORIENTATION_SIZE {
        return Err(BehaviourError::InvalidTensorSize {
            expected: ORIENTATION_SIZE,
            got: orab.len(),
        });
    }
    let a = Vector3::new(orab[0], orab[1], orab[2]);
    let b = Vector3::new(orab[3], orab[4], orab[5]);
    let (e1, e2, e3) = match orab[6].round() as i32 {
        1 => {
            let e1 = unit(a, "null first axis")?;
            let e3 = unit(a.cross(&b), "aligned points")?;
            (e1, e3.cross(&e1), e3)
        }
        2 => {
            if pgauss.len() < 3 {
                return Err(BehaviourError::InvalidTensorSize {
                    expected: 3,
                    got: pgauss.len(),
                });
            }
            let e3 = unit(b - a, "coincident points")?;
            let d = Vector3::new(pgauss[0], pgauss[1], pgauss[2]) - a;
            let e1 = unit(d - e3 * d.dot(&e3), "integration point on the axis")?;
            (e1, e3.cross(&e1), e3)
        }
        _ => return Err(invalid_orientation("unknown system type")),
    };
    Ok(Matrix3::from_columns(&[e1, e2, e3]))
}

/// Material axes of the call, checked against the symmetry of `B`.
fn orientation<B: Behaviour>(call: &CalculiXCall<'_>) -> Result<Option<Matrix3<f64>>> {
    match (B::SYMMETRY, call.iorien) {
        (SymmetryType::Orthotropic, 0) => Err(BehaviourError::UnsupportedCase(format!(
            "no orientation defined for the orthotropic behaviour '{}'",
            B::NAME
        ))),
        (SymmetryType::Orthotropic, i) if i > 0 => {
            let start = (i as usize - 1) * ORIENTATION_SIZE;
            let orab = call.orab.get(start..).unwrap_or_default();
            material_axes(orab, call.pgauss).map(Some)
        }
        (SymmetryType::Orthotropic, _) => Err(invalid_orientation("negative index")),
        (_, 0) => Ok(None),
        _ => Err(BehaviourError::UnsupportedCase(format!(
            "no orientation shall be defined for the isotropic behaviour '{}'",
            B::NAME
        ))),
    }
}

/// Upper triangle of a symmetric operator, column by column.
pub fn pack_stiffness(d: &DMatrix<f64>, stiff: &mut [f64]) -> Result<()> {
    if d.nrows() != 6 || d.ncols() != 6 || stiff.len() < PACKED_STIFFNESS_SIZE {
        return Err(BehaviourError::InvalidTensorSize {
            expected: PACKED_STIFFNESS_SIZE,
            got: stiff.len(),
        });
    }
    let mut k = 0;
    for j in 0..6 {
        for i in 0..=j {
            stiff[k] = d[(i, j)];
            k += 1;
        }
    }
    Ok(())
}

/// Integrates `B` and returns 0 on success, the status code of the error
/// otherwise.
pub fn umat<B: Behaviour>(mut call: CalculiXCall<'_>, h: ModellingHypothesis, parameters: &ParameterStore) -> i32 {
    let mut pnewdt = *call.pnewdt;
    let result = dispatch::guarded(CalculiX::NAME, B::NAME, || {
        integrate::<B>(&mut call, h, parameters, &mut pnewdt)
    });
    let status = match result {
        Ok(()) => 0,
        Err(e) => {
            pnewdt = -1.0;
            e.code
        }
    };
    *call.pnewdt = pnewdt;
    status
}

fn integrate<B: Behaviour>(
    call: &mut CalculiXCall<'_>,
    h: ModellingHypothesis,
    parameters: &ParameterStore,
    pnewdt: &mut f64,
) -> Result<()> {
    if h != ModellingHypothesis::Tridimensional {
        return Err(BehaviourError::invalid_hypothesis(B::NAME, h));
    }
    dispatch::check_hypothesis::<B>(h)?;
    let sizes = BufferSizes {
        nprops: call.elconloc.len(),
        nstatv: call.xstate.len(),
        ntens: call.stre.len(),
    };
    dispatch::check_buffer_sizes::<B, CalculiX>(h, sizes, 6, 0)?;
    let finite_strain = match B::BEHAVIOUR_TYPE {
        BehaviourType::StandardStrainBased => false,
        BehaviourType::StandardFiniteStrain => true,
        btype => {
            return Err(BehaviourError::UnsupportedCase(format!(
                "behaviours of type '{btype}' are not supported by the CalculiX interface"
            )))
        }
    };
    let layout = CalculiX::material_properties_layout::<B>(h)?;
    let mut input = HandlerInput::new(h);
    input.rotation = orientation::<B>(call)?;
    input.dt = call.dtime;
    input.temperature = call.t1l;
    let stress = views::import_stensor(call.stre, h, CalculiX::STRESS_CONVENTION)?;
    if finite_strain {
        let f0 = fortran_to_matrix(call.xokl)?;
        input.gradients0 = mandel::matrix_to_tensor(&f0, h)?;
        input.gradients1 = mandel::matrix_to_tensor(&fortran_to_matrix(call.xkl)?, h)?;
        let pk2 = mandel::stensor_to_matrix(&stress, h)?;
        input.thermodynamic_forces = mandel::matrix_to_stensor(&pk2_to_cauchy(&pk2, &f0)?, h)?;
    } else {
        input.gradients0 = views::import_stensor(call.emec0, h, CalculiX::STRAIN_CONVENTION)?;
        input.gradients1 = views::import_stensor(call.emec, h, CalculiX::STRAIN_CONVENTION)?;
        input.thermodynamic_forces = stress;
    }
    input.elastic_properties = CalculiX::elastic_properties(&layout, call.elconloc, h)?;
    input.thermal_expansion_properties = layout.gather(call.elconloc, PropertyRole::ThermalExpansion)?;
    input.material_properties = behaviour_properties::<B>(&layout, call.elconloc)?;
    let nisv = B::internal_variables_nb(h)?;
    input.internal_state_variables = call
        .xstateini
        .get(..nisv)
        .ok_or(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: nisv,
            got: call.xstateini.len(),
        })?
        .to_vec();
    let options = HandlerOptions {
        stiffness: if B::HAS_CONSISTENT_TANGENT_OPERATOR {
            StiffnessMatrixType::ConsistentTangent
        } else {
            StiffnessMatrixType::Tangent
        },
        prediction: false,
        out_of_bounds_policy: out_of_bounds_policy(parameters),
        tangent_operator: CalculiX::FINITE_STRAIN_TANGENT_OPERATOR,
    };
    let sfe: &dyn StressFreeExpansionHandler = if finite_strain {
        &FiniteStrainStressFreeExpansionHandler
    } else {
        &SmallStrainStressFreeExpansionHandler
    };
    match handler::execute::<B>(input, &options, Some(sfe), parameters)? {
        StepOutcome::Converged(output) => {
            export::<B>(&output, call, h, finite_strain)?;
            *pnewdt = pnewdt.min(output.time_step_scaling_factor);
        }
        StepOutcome::Failed {
            time_step_scaling_factor,
        } => {
            tracing::debug!(behaviour = B::NAME, factor = time_step_scaling_factor, "integration failed");
            *pnewdt = time_step_scaling_factor;
        }
    }
    Ok(())
}

fn export<B: Behaviour>(
    output: &StepOutput,
    call: &mut CalculiXCall<'_>,
    h: ModellingHypothesis,
    finite_strain: bool,
) -> Result<()> {
    let stress: DVector<f64> = if finite_strain {
        let f1 = fortran_to_matrix(call.xkl)?;
        let sigma = mandel::stensor_to_matrix(&output.thermodynamic_forces, h)?;
        mandel::matrix_to_stensor(&cauchy_to_pk2(&sigma, &f1)?, h)?
    } else {
        output.thermodynamic_forces.clone()
    };
    views::export_stensor(&stress, call.stre, CalculiX::STRESS_CONVENTION)?;
    let isvs = &output.internal_state_variables;
    call.xstate[..isvs.len()].copy_from_slice(isvs);
    if let Some(k) = &output.tangent {
        pack_stiffness(&views::normalize_tangent(k), call.stiff)?;
    }
    Ok(())
}
