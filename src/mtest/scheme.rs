//! Time loop of a single material point driven along an imposed gradient
//! path.
use crate::error::{BehaviourError, Result};
use crate::interfaces::StiffnessMatrixType;
use crate::mtest::{BehaviourWorkSpace, CurrentState, MTestBehaviour};
use nalgebra::{DVector, Matrix3};
use serde::{Deserialize, Serialize};

/// Smallest reduction of the time step after a failure.
const MINIMAL_TIME_STEP_SCALING_FACTOR: f64 = 0.1;

/// Relative distance under which a time is merged with the end of the
/// period.
const TIME_TOLERANCE: f64 = 1e-12;

fn default_temperature() -> f64 {
    293.15
}

fn default_max_sub_steps() -> usize {
    10
}

fn default_stiffness() -> StiffnessMatrixType {
    StiffnessMatrixType::NoStiffness
}

/// Description of a test, read from JSON.
///
/// ```json
/// {
///   "material_properties": [200e3, 0.3],
///   "times": [0, 1],
///   "gradients": [[0, 0, 0, 0], [1e-3, 0, 0, 0]]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub material_properties: Vec<f64>,
    pub times: Vec<f64>,
    /// Imposed gradients at each time, interpolated linearly in between.
    pub gradients: Vec<Vec<f64>>,
    /// Temperature at each time, constant if empty.
    #[serde(default)]
    pub temperatures: Vec<f64>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum number of time step reductions in each period.
    #[serde(default = "default_max_sub_steps")]
    pub max_sub_steps: usize,
    #[serde(default = "default_stiffness")]
    pub stiffness: StiffnessMatrixType,
    /// Global to material frame, row by row.
    #[serde(default)]
    pub rotation: Option<[[f64; 3]; 3]>,
}

impl TestCase {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn check(&self, b: &dyn MTestBehaviour) -> Result<()> {
        if self.times.len() < 2 || self.times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(BehaviourError::Other(
                "at least two strictly increasing times are required".to_string(),
            ));
        }
        if self.gradients.len() != self.times.len() {
            return Err(BehaviourError::Other(format!(
                "{} imposed gradients given for {} times",
                self.gradients.len(),
                self.times.len()
            )));
        }
        if !self.temperatures.is_empty() && self.temperatures.len() != self.times.len() {
            return Err(BehaviourError::Other(format!(
                "{} temperatures given for {} times",
                self.temperatures.len(),
                self.times.len()
            )));
        }
        let n = b.gradients_size()?;
        if let Some(g) = self.gradients.iter().find(|g| g.len() != n) {
            return Err(BehaviourError::InvalidTensorSize {
                expected: n,
                got: g.len(),
            });
        }
        Ok(())
    }

    fn temperature_at(&self, i: usize) -> f64 {
        self.temperatures.get(i).copied().unwrap_or(self.temperature)
    }
}

/// Runs `test` and returns the initial state followed by every accepted
/// state.
///
/// A rejected step is restarted from the beginning of the step with a time
/// step multiplied by the factor proposed by the behaviour, at least
/// [`MINIMAL_TIME_STEP_SCALING_FACTOR`].
pub fn run(test: &TestCase, b: &dyn MTestBehaviour) -> Result<Vec<CurrentState>> {
    test.check(b)?;
    let mut wk = BehaviourWorkSpace::default();
    b.allocate(&mut wk)?;
    let mut state = CurrentState::new(b, test.material_properties.clone(), test.temperature_at(0))?;
    if let Some(r) = test.rotation {
        state.r = Matrix3::from_fn(|i, j| r[i][j]);
    }
    state.e0 = DVector::from_column_slice(&test.gradients[0]);
    state.e1 = state.e0.clone();
    let mut states = vec![state.clone()];
    for (i, period) in test.times.windows(2).enumerate() {
        let (ta, tb) = (period[0], period[1]);
        let ga = DVector::from_column_slice(&test.gradients[i]);
        let gb = DVector::from_column_slice(&test.gradients[i + 1]);
        let (ea, eb) = (test.temperature_at(i), test.temperature_at(i + 1));
        let at = |t: f64| ((t - ta) / (tb - ta)).clamp(0.0, 1.0);
        let mut t = ta;
        let mut dt = tb - ta;
        let mut sub_steps = 0;
        while t < tb {
            let end = if tb - (t + dt) <= TIME_TOLERANCE * (tb - ta) { tb } else { t + dt };
            dt = end - t;
            let x = at(end);
            state.e1 = &ga + (&gb - &ga) * x;
            state.desv[0] = ea + (eb - ea) * x - state.esv0[0];
            wk.check(b)?;
            let (ok, factor) = b.integrate(&mut state, &mut wk, dt, test.stiffness)?;
            if !ok {
                sub_steps += 1;
                if sub_steps > test.max_sub_steps {
                    return Err(BehaviourError::MaximumSubSteppingReached(b.name().to_string()));
                }
                state.revert();
                state.desv[0] = 0.0;
                let factor = if factor < 1.0 { factor.max(MINIMAL_TIME_STEP_SCALING_FACTOR) } else { 0.5 };
                tracing::debug!(behaviour = b.name(), t, dt, factor, "time step reduced");
                dt *= factor;
                continue;
            }
            state.update();
            t = end;
            states.push(state.clone());
        }
    }
    Ok(states)
}
