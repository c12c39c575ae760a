use crate::error::Result;
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::StiffnessMatrixType;
use crate::mtest::{BehaviourWorkSpace, CurrentState};
use nalgebra::DVector;

/// A behaviour seen from the driver.
///
/// `integrate` and `compute_prediction_operator` return `(true, factor)` on
/// success and `(false, factor)` when the step must be restarted with a time
/// step multiplied by `factor`. Errors are reserved to calls that can not
/// succeed whatever the time step.
pub trait MTestBehaviour {
    fn name(&self) -> &str;

    fn hypothesis(&self) -> ModellingHypothesis;

    fn gradients_size(&self) -> Result<usize>;

    fn thermodynamic_forces_size(&self) -> Result<usize>;

    fn internal_state_variables_size(&self) -> Result<usize>;

    fn material_properties_names(&self) -> Result<Vec<String>>;

    /// Values of the gradients in the undeformed configuration.
    fn gradients_default_initial_values(&self) -> Result<DVector<f64>> {
        Ok(DVector::zeros(self.gradients_size()?))
    }

    fn allocate(&self, wk: &mut BehaviourWorkSpace) -> Result<()> {
        wk.allocate(
            self.material_properties_names()?.len(),
            self.internal_state_variables_size()?,
            self.thermodynamic_forces_size()?,
            self.gradients_size()?,
        );
        Ok(())
    }

    /// Computes the operator used to predict the next gradients, stored in
    /// `wk.k`. The state is left untouched.
    fn compute_prediction_operator(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        smt: StiffnessMatrixType,
    ) -> Result<(bool, f64)>;

    /// Integrates from `s.e0` to `s.e1`. On success `s.s1` and `s.iv1` hold
    /// the new state and `wk.k` the requested tangent operator.
    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<(bool, f64)>;
}
