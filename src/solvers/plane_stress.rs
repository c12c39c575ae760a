//! Plane stress for strain based behaviours which are only defined in
//! generalised plane strain.
//!
//! The axial strain increment is found by a secant method cancelling the
//! axial stress, each iteration being a full generalised plane strain
//! integration. The axial strain is stored after the behaviour's state
//! variables and the tangent operator is obtained by static condensation of
//! the axial direction.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{Behaviour, MaterialPropertiesLayout, SymmetryType};
use crate::parameters::ParameterStore;
use crate::solvers::castem::{self, Castem, CastemCall};
use crate::solvers::dispatch::{self, BufferSizes};
use crate::solvers::handler::{HandlerInput, HandlerOptions, StepOutcome, StepOutput};
use crate::solvers::SolverPolicy;
use crate::stress_free_expansion::StressFreeExpansionHandler;
use nalgebra::DMatrix;

const MAXIMUM_ITERATIONS: u32 = 50;
const TOLERANCE: f64 = 1e-12;

/// Elastic coefficients `(E, nu)` used to build the initial guesses.
fn elastic_coefficients<B: Behaviour>(layout: &MaterialPropertiesLayout, props: &[f64]) -> Result<(f64, f64)> {
    match B::SYMMETRY {
        SymmetryType::Isotropic => Ok((
            layout.value(props, "YoungModulus")?,
            layout.value(props, "PoissonRatio")?,
        )),
        SymmetryType::Orthotropic => Ok((
            layout.value(props, "YoungModulus3")?,
            layout.value(props, "PoissonRatio13")?,
        )),
    }
}

/// Static condensation of the axial direction.
pub(crate) fn condense(k: &DMatrix<f64>) -> DMatrix<f64> {
    let mut r = DMatrix::from_fn(k.nrows(), k.ncols(), |i, j| {
        k[(i, j)] - k[(i, 2)] * k[(2, j)] / k[(2, 2)]
    });
    r.row_mut(2).fill(0.0);
    r.column_mut(2).fill(0.0);
    r
}

struct AxialStrainSolver<'a, B> {
    input: HandlerInput,
    options: &'a HandlerOptions,
    sfe: Option<&'a dyn StressFreeExpansionHandler>,
    parameters: &'a ParameterStore,
    ezz0: f64,
    _behaviour: std::marker::PhantomData<B>,
}

impl<B: Behaviour> AxialStrainSolver<'_, B> {
    fn solve(&self, dezz: f64) -> Result<StepOutcome> {
        let mut input = self.input.clone();
        input.gradients1[2] = self.ezz0 + dezz;
        castem::run::<B>(input, self.options, self.sfe, self.parameters)
    }
}

fn axial_stress(output: &StepOutput) -> f64 {
    output.thermodynamic_forces[2]
}

pub(crate) fn integrate<B: Behaviour>(
    mut call: CastemCall<'_>,
    sfe: Option<&dyn StressFreeExpansionHandler>,
    parameters: &ParameterStore,
) -> Result<()> {
    let h = ModellingHypothesis::PlaneStress;
    let hb = ModellingHypothesis::GeneralisedPlaneStrain;
    let sizes = BufferSizes {
        nprops: call.props.len(),
        nstatv: call.statev.len(),
        ntens: call.ntens,
    };
    dispatch::check_buffer_sizes::<B, Castem>(h, sizes, h.stensor_size()?, 1)?;
    let layout = Castem::material_properties_layout::<B>(h)?;
    let (young, nu) = elastic_coefficients::<B>(&layout, call.props)?;
    let mut input = castem::import::<B>(&call, h, hb, &layout)?;
    let nisv = B::internal_variables_nb(hb)?;
    let ezz0 = call
        .statev
        .get(nisv)
        .copied()
        .ok_or(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: nisv + 1,
            got: call.statev.len(),
        })?;
    let de = &input.gradients1 - &input.gradients0;
    input.gradients0[2] = ezz0;
    let options = castem::options(&call, parameters)?;
    let solver = AxialStrainSolver::<B> {
        input,
        options: &options,
        sfe,
        parameters,
        ezz0,
        _behaviour: std::marker::PhantomData,
    };
    let c = -nu / (1.0 - nu);
    let c3 = 1.0 / young;
    let mut x0 = c * (de[0] + de[1]);
    let mut out0 = match solver.solve(x0)? {
        StepOutcome::Converged(output) => output,
        StepOutcome::Failed {
            time_step_scaling_factor,
        } => return failed::<B>(&mut call, time_step_scaling_factor),
    };
    let (dezz, mut output) = if options.prediction || (c3 * axial_stress(&out0)).abs() < TOLERANCE {
        (x0, out0)
    } else {
        let mut x1 = x0 - c3 * axial_stress(&out0);
        let mut iteration = 0;
        loop {
            let out1 = match solver.solve(x1)? {
                StepOutcome::Converged(output) => output,
                StepOutcome::Failed {
                    time_step_scaling_factor,
                } => return failed::<B>(&mut call, time_step_scaling_factor),
            };
            let r1 = axial_stress(&out1);
            if (c3 * r1).abs() < TOLERANCE {
                break (x1, out1);
            }
            iteration += 1;
            let slope = r1 - axial_stress(&out0);
            if iteration >= MAXIMUM_ITERATIONS || slope == 0.0 {
                return Err(BehaviourError::Divergence {
                    iterations: iteration,
                    residual: (c3 * r1).abs(),
                });
            }
            let x2 = x1 - r1 * (x1 - x0) / slope;
            x0 = x1;
            out0 = out1;
            x1 = x2;
        }
    };
    tracing::trace!(behaviour = B::NAME, axial_strain_increment = dezz, "plane stress equilibrium");
    output.thermodynamic_forces[2] = 0.0;
    output.tangent = output.tangent.as_ref().map(condense);
    let mut isvs = output.internal_state_variables.clone();
    isvs.push(if options.prediction { ezz0 } else { ezz0 + dezz });
    castem::export::<B>(&output, &isvs, &mut call)
}

fn failed<B: Behaviour>(call: &mut CastemCall<'_>, factor: f64) -> Result<()> {
    *call.pnewdt = factor;
    Err(BehaviourError::IntegrationFailed(B::NAME.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smallstrain::MisesPlasticity;
    use approx::assert_relative_eq;

    #[test]
    fn condensation_of_an_isotropic_operator() {
        let (young, nu) = (200e3, 0.3);
        let k = crate::stiffness::compute_isotropic_stiffness_tensor(
            ModellingHypothesis::GeneralisedPlaneStrain,
            false,
            young,
            nu,
        )
        .unwrap();
        let c = condense(&k);
        assert_relative_eq!(c[(0, 0)], young / (1.0 - nu * nu), max_relative = 1e-12);
        assert_relative_eq!(c[(0, 1)], nu * young / (1.0 - nu * nu), max_relative = 1e-12);
        assert_eq!(c[(2, 2)], 0.0);
        assert_relative_eq!(c[(3, 3)], k[(3, 3)], max_relative = 1e-12);
    }

    #[test]
    fn axial_stress_vanishes() {
        let props = [200e3, 0.3, 7800.0, 0.0, 1.0, 200e3, 0.3, 300.0, 10e3];
        let mut stress = vec![0.0; 4];
        let mut statev = vec![0.0; 6];
        let mut ddsdde = vec![0.0; 16];
        ddsdde[0] = 4.0;
        let mut pnewdt = 1.0;
        let call = CastemCall {
            stress: &mut stress,
            statev: &mut statev,
            ddsdde: &mut ddsdde,
            stran: &[0.0; 4],
            dstran: &[3e-3, 0.0, 0.0, 1e-3],
            dfgrd0: &[],
            dfgrd1: &[],
            dtime: 1.0,
            temperature: 293.15,
            temperature_increment: 0.0,
            predef: &[],
            dpred: &[],
            ndi: -2,
            ntens: 4,
            props: &props,
            drot: &[],
            pnewdt: &mut pnewdt,
        };
        assert_eq!(castem::umat::<MisesPlasticity>(call, None, &ParameterStore::new()), 1);
        assert_eq!(stress[2], 0.0);
        assert!(stress[0] > 0.0);
        // plastic flow, the axial strain is below the elastic estimate
        assert!(statev[5] < 0.0);
        assert!(statev[4] > 0.0);
        assert_eq!(ddsdde[2 * 4 + 2], 0.0);
    }
}
