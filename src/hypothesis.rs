use crate::error::{BehaviourError, Result};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Spatial dimension and strain-state assumption of a computation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
pub enum ModellingHypothesis {
    AxisymmetricalGeneralisedPlaneStrain,
    Axisymmetrical,
    PlaneStress,
    PlaneStrain,
    GeneralisedPlaneStrain,
    Tridimensional,
    Undefined,
}

impl ModellingHypothesis {
    /// All hypotheses except the `Undefined` sentinel.
    pub fn iter_defined() -> impl Iterator<Item = ModellingHypothesis> {
        ModellingHypothesis::iter().filter(|h| *h != ModellingHypothesis::Undefined)
    }

    pub fn space_dimension(self) -> Result<usize> {
        use ModellingHypothesis::*;
        match self {
            AxisymmetricalGeneralisedPlaneStrain => Ok(1),
            Axisymmetrical | PlaneStress | PlaneStrain | GeneralisedPlaneStrain => Ok(2),
            Tridimensional => Ok(3),
            Undefined => Err(BehaviourError::invalid_hypothesis("", self)),
        }
    }

    /// Number of components of a symmetric tensor.
    pub fn stensor_size(self) -> Result<usize> {
        Ok(match self.space_dimension()? {
            1 => 3,
            2 => 4,
            _ => 6,
        })
    }

    /// Number of components of a non-symmetric tensor.
    pub fn tensor_size(self) -> Result<usize> {
        Ok(match self.space_dimension()? {
            1 => 3,
            2 => 5,
            _ => 9,
        })
    }

    pub fn is_plane_stress(self) -> bool {
        self == ModellingHypothesis::PlaneStress
    }

    /// Name of the hypothesis used for the sub-directories and symbols of
    /// generated libraries.
    pub fn short_name(self) -> &'static str {
        use ModellingHypothesis::*;
        match self {
            AxisymmetricalGeneralisedPlaneStrain => "AxisymmetricalGeneralisedPlaneStrain",
            Axisymmetrical => "Axisymmetrical",
            PlaneStress => "PlaneStress",
            PlaneStrain => "PlaneStrain",
            GeneralisedPlaneStrain => "GeneralisedPlaneStrain",
            Tridimensional => "Tridimensional",
            Undefined => "Undefined",
        }
    }
}

impl Default for ModellingHypothesis {
    fn default() -> Self {
        ModellingHypothesis::Undefined
    }
}
