//! Behaviours integrated in-process through the behaviour handler.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{Behaviour, BehaviourType, MaterialPropertiesLayout, PropertyRole, StiffnessMatrixType};
use crate::mandel;
use crate::mtest::{BehaviourWorkSpace, CurrentState, MTestBehaviour};
use crate::parameters::ParameterStore;
use crate::solvers::dispatch;
use crate::solvers::handler::{self, HandlerInput, HandlerOptions, StepOutcome};
use crate::solvers::{behaviour_properties, out_of_bounds_policy, Generic, SolverPolicy};
use crate::stress_free_expansion::{
    FiniteStrainStressFreeExpansionHandler, SmallStrainStressFreeExpansionHandler, StressFreeExpansionHandler,
};
use nalgebra::DVector;
use std::marker::PhantomData;

pub struct GenericBehaviourDriver<B> {
    hypothesis: ModellingHypothesis,
    layout: MaterialPropertiesLayout,
    parameters: ParameterStore,
    behaviour: PhantomData<B>,
}

impl<B: Behaviour> GenericBehaviourDriver<B> {
    pub fn new(h: ModellingHypothesis, parameters: ParameterStore) -> Result<Self> {
        dispatch::check_hypothesis::<B>(h)?;
        if B::BEHAVIOUR_TYPE == BehaviourType::General {
            return Err(BehaviourError::UnsupportedCase(format!(
                "behaviours of type '{}' can not be driven",
                B::BEHAVIOUR_TYPE
            )));
        }
        Ok(Self {
            hypothesis: h,
            layout: Generic::material_properties_layout::<B>(h)?,
            parameters,
            behaviour: PhantomData,
        })
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.parameters
    }

    fn input(&self, s: &CurrentState, dt: f64) -> Result<HandlerInput> {
        let h = self.hypothesis;
        let mut input = HandlerInput::new(h);
        input.dt = dt;
        input.temperature = s.esv0.first().copied().unwrap_or(0.0);
        input.temperature_increment = s.desv.first().copied().unwrap_or(0.0);
        input.external_state_variables = s.esv0.iter().skip(1).copied().collect();
        input.external_state_variables_increments = s.desv.iter().skip(1).copied().collect();
        input.gradients0 = s.e0.clone();
        input.gradients1 = s.e1.clone();
        input.thermodynamic_forces = s.s0.clone();
        input.elastic_properties = Generic::elastic_properties(&self.layout, &s.mprops, h)?;
        input.thermal_expansion_properties = self.layout.gather(&s.mprops, PropertyRole::ThermalExpansion)?;
        input.material_properties = behaviour_properties::<B>(&self.layout, &s.mprops)?;
        input.internal_state_variables = s.iv0.clone();
        input.rotation = Some(s.r.transpose());
        Ok(input)
    }

    fn call_behaviour(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
        prediction: bool,
    ) -> Result<(bool, f64)> {
        wk.check(self)?;
        let options = HandlerOptions {
            stiffness: smt,
            prediction,
            out_of_bounds_policy: out_of_bounds_policy(&self.parameters),
            tangent_operator: Generic::FINITE_STRAIN_TANGENT_OPERATOR,
        };
        let sfe: &dyn StressFreeExpansionHandler = match B::BEHAVIOUR_TYPE {
            BehaviourType::StandardFiniteStrain => &FiniteStrainStressFreeExpansionHandler,
            _ => &SmallStrainStressFreeExpansionHandler,
        };
        let result = handler::execute::<B>(self.input(s, dt)?, &options, Some(sfe), &self.parameters);
        let output = match result {
            Ok(StepOutcome::Converged(output)) => output,
            Ok(StepOutcome::Failed {
                time_step_scaling_factor,
            }) => return Ok((false, time_step_scaling_factor)),
            Err(e) => return Err(e),
        };
        if !prediction {
            s.s1 = output.thermodynamic_forces;
            s.iv1 = output.internal_state_variables;
        }
        if let Some(k) = output.tangent {
            wk.k = k;
        }
        Ok((true, output.time_step_scaling_factor))
    }
}

impl<B: Behaviour> MTestBehaviour for GenericBehaviourDriver<B> {
    fn name(&self) -> &str {
        B::NAME
    }

    fn hypothesis(&self) -> ModellingHypothesis {
        self.hypothesis
    }

    fn gradients_size(&self) -> Result<usize> {
        B::BEHAVIOUR_TYPE.gradient_size(self.hypothesis)
    }

    fn thermodynamic_forces_size(&self) -> Result<usize> {
        B::BEHAVIOUR_TYPE.thermodynamic_force_size(self.hypothesis)
    }

    fn internal_state_variables_size(&self) -> Result<usize> {
        B::internal_variables_nb(self.hypothesis)
    }

    fn material_properties_names(&self) -> Result<Vec<String>> {
        Ok(self.layout.names().into_iter().map(str::to_string).collect())
    }

    /// The identity deformation gradient for finite strain behaviours.
    fn gradients_default_initial_values(&self) -> Result<DVector<f64>> {
        match B::BEHAVIOUR_TYPE {
            BehaviourType::StandardFiniteStrain => mandel::tensor_identity(self.hypothesis),
            _ => Ok(DVector::zeros(self.gradients_size()?)),
        }
    }

    fn compute_prediction_operator(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        smt: StiffnessMatrixType,
    ) -> Result<(bool, f64)> {
        self.call_behaviour(s, wk, 0.0, smt, true)
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<(bool, f64)> {
        self.call_behaviour(s, wk, dt, smt, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finitestrain::SaintVenantKirchhoff;
    use crate::smallstrain::{lame_coefficients, Elasticity, MisesPlasticity};
    use approx::assert_relative_eq;

    #[test]
    fn elastic_step() {
        let (young, nu) = (200e3, 0.3);
        let b = GenericBehaviourDriver::<Elasticity>::new(ModellingHypothesis::PlaneStrain, ParameterStore::new())
            .unwrap();
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        let mut s = CurrentState::new(&b, vec![young, nu], 293.15).unwrap();
        s.e1[0] = 1e-3;
        let (ok, factor) = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::ConsistentTangent)
            .unwrap();
        assert!(ok);
        assert_eq!(factor, 1.0);
        let (lambda, mu) = lame_coefficients(young, nu);
        assert_relative_eq!(s.s1[0], (lambda + 2.0 * mu) * 1e-3, max_relative = 1e-12);
        assert_relative_eq!(s.s1[2], lambda * 1e-3, max_relative = 1e-12);
        assert_relative_eq!(wk.k[(3, 3)], 2.0 * mu, max_relative = 1e-12);
    }

    #[test]
    fn failures_are_reported_with_a_factor() {
        let mut parameters = ParameterStore::new();
        parameters.set_parameter("maximum_strain_increment", 1e-3);
        let b = GenericBehaviourDriver::<MisesPlasticity>::new(ModellingHypothesis::Tridimensional, parameters)
            .unwrap();
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        let mut s = CurrentState::new(&b, vec![200e3, 0.3, 300.0, 10e3], 293.15).unwrap();
        s.e1[0] = 2e-3;
        let (ok, factor) = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::NoStiffness)
            .unwrap();
        assert!(!ok);
        assert_eq!(factor, 0.1);
    }

    #[test]
    fn finite_strain_behaviours_start_from_the_identity() {
        let b = GenericBehaviourDriver::<SaintVenantKirchhoff>::new(
            ModellingHypothesis::Tridimensional,
            ParameterStore::new(),
        )
        .unwrap();
        assert_eq!(b.gradients_size().unwrap(), 9);
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        let mut s = CurrentState::new(&b, vec![200e3, 0.3], 293.15).unwrap();
        assert_eq!(s.e0.as_slice()[..3], [1.0, 1.0, 1.0]);
        let (ok, _) = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::NoStiffness)
            .unwrap();
        assert!(ok);
        assert_relative_eq!(s.s1.norm(), 0.0);
    }
}
