//! Outermost layer of the solver interfaces: consistency checks of the
//! solver's buffers and conversion of errors and panics into status codes.
use crate::error::{BehaviourError, Result, UNKNOWN_ERROR_CODE};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::Behaviour;
use crate::solvers::SolverPolicy;
use std::panic::{self, AssertUnwindSafe};

/// Error reported to a solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub code: i32,
    pub message: String,
}

/// Rejects the hypotheses for which `B` is not defined.
pub fn check_hypothesis<B: Behaviour>(h: ModellingHypothesis) -> Result<()> {
    if !B::is_defined(h) {
        return Err(BehaviourError::invalid_hypothesis(B::NAME, h));
    }
    Ok(())
}

/// Sizes of the buffers given by a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub nprops: usize,
    pub nstatv: usize,
    pub ntens: usize,
}

/// Checks the sizes declared by the solver against the behaviour's
/// introspection, `expected_ntens` being the solver's stensor size.
/// `extra_state_variables` accounts for the variables added
/// by the interface itself.
#[cfg(feature = "runtime-checks")]
pub fn check_buffer_sizes<B: Behaviour, P: SolverPolicy>(
    h: ModellingHypothesis,
    sizes: BufferSizes,
    expected_ntens: usize,
    extra_state_variables: usize,
) -> Result<()> {
    let nprops = P::material_properties_layout::<B>(h)?.len().max(1);
    if sizes.nprops != nprops {
        return Err(BehaviourError::UnMatchedNumberOfMaterialProperties {
            expected: nprops,
            got: sizes.nprops,
        });
    }
    let nstatv = B::internal_variables_nb(h)? + extra_state_variables;
    // solvers do not handle empty arrays
    if sizes.nstatv != nstatv && !(nstatv == 0 && sizes.nstatv == 1) {
        return Err(BehaviourError::UnMatchedNumberOfStateVariables {
            expected: nstatv,
            got: sizes.nstatv,
        });
    }
    if sizes.ntens != expected_ntens {
        return Err(BehaviourError::InvalidTensorSize {
            expected: expected_ntens,
            got: sizes.ntens,
        });
    }
    Ok(())
}

#[cfg(not(feature = "runtime-checks"))]
pub fn check_buffer_sizes<B: Behaviour, P: SolverPolicy>(
    _h: ModellingHypothesis,
    _sizes: BufferSizes,
    _expected_ntens: usize,
    _extra_state_variables: usize,
) -> Result<()> {
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown exception".to_string()
    }
}

/// Runs `f` behind a panic barrier. Errors are logged and converted to the
/// status code of their category, panics to [`UNKNOWN_ERROR_CODE`].
pub fn guarded<T>(
    solver: &str,
    behaviour: &str,
    f: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let code = e.status_code();
            tracing::warn!(solver, behaviour, category = %e.category(), code, "{e}");
            Err(DispatchError {
                code,
                message: e.to_string(),
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(solver, behaviour, code = UNKNOWN_ERROR_CODE, "{message}");
            Err(DispatchError {
                code: UNKNOWN_ERROR_CODE,
                message,
            })
        }
    }
}
