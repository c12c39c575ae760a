//! Solver interfaces.
//!
//! Each solver is a zero-sized type implementing [`SolverPolicy`]: the
//! conventions of its buffers and the layout of its material properties.
//! The shared integration state machine lives in [`handler`], the error to
//! status code mapping and the runtime checks in [`dispatch`].
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::{
    Behaviour, MaterialPropertiesLayout, OutOfBoundsPolicy, PropertyRole, StiffnessMatrixType,
    SymmetryType, TangentOperatorFlag,
};
use crate::parameters::ParameterStore;
use crate::stiffness::{stiffness_properties_nb, thermal_expansion_properties_nb};
use crate::views::{SolverConvention, StorageOrder};

pub mod abaqus;
pub mod calculix;
pub mod castem;
pub mod dispatch;
pub mod generic;
pub mod handler;
pub mod openradioss;
pub mod plane_stress;

pub use abaqus::Abaqus;
pub use calculix::CalculiX;
pub use castem::Castem;
pub use generic::Generic;
pub use openradioss::OpenRadioss;

pub trait SolverPolicy {
    const NAME: &'static str;
    /// Convention of the strain buffers.
    const STRAIN_CONVENTION: SolverConvention;
    /// Convention of the stress buffers.
    const STRESS_CONVENTION: SolverConvention;
    const STORAGE_ORDER: StorageOrder;
    /// Tangent operator handed back for finite strain behaviours.
    const FINITE_STRAIN_TANGENT_OPERATOR: TangentOperatorFlag;

    fn material_properties_layout<B: Behaviour>(h: ModellingHypothesis) -> Result<MaterialPropertiesLayout> {
        prepended_layout::<B>(h)
    }

    /// Elastic properties in the order expected by the stiffness builders.
    fn elastic_properties(
        layout: &MaterialPropertiesLayout,
        props: &[f64],
        _h: ModellingHypothesis,
    ) -> Result<Vec<f64>> {
        layout.gather(props, PropertyRole::Elastic)
    }
}

pub const ISOTROPIC_ELASTIC_PROPERTIES: [&str; 2] = ["YoungModulus", "PoissonRatio"];

pub const ORTHOTROPIC_ELASTIC_PROPERTIES: [&str; 9] = [
    "YoungModulus1",
    "YoungModulus2",
    "YoungModulus3",
    "PoissonRatio12",
    "PoissonRatio23",
    "PoissonRatio13",
    "ShearModulus12",
    "ShearModulus23",
    "ShearModulus13",
];

pub const ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES: [&str; 3] =
    ["ThermalExpansion1", "ThermalExpansion2", "ThermalExpansion3"];

/// Layout of the solvers which only add the elastic constants and the
/// thermal expansion coefficients when the behaviour asks the interface to
/// compute the corresponding tensors.
pub fn prepended_layout<B: Behaviour>(h: ModellingHypothesis) -> Result<MaterialPropertiesLayout> {
    let mut layout = MaterialPropertiesLayout::new();
    if B::REQUIRES_STIFFNESS_TENSOR {
        let n = stiffness_properties_nb(h, B::SYMMETRY)?;
        match B::SYMMETRY {
            SymmetryType::Isotropic => layout.push_all(&ISOTROPIC_ELASTIC_PROPERTIES, PropertyRole::Elastic),
            SymmetryType::Orthotropic => {
                layout.push_all(&ORTHOTROPIC_ELASTIC_PROPERTIES[..n], PropertyRole::Elastic)
            }
        };
    }
    if B::REQUIRES_THERMAL_EXPANSION_COEFFICIENT_TENSOR {
        let n = thermal_expansion_properties_nb(h, B::SYMMETRY)?;
        match B::SYMMETRY {
            SymmetryType::Isotropic => layout.push("ThermalExpansion", PropertyRole::ThermalExpansion),
            SymmetryType::Orthotropic => layout.push_all(
                &ORTHOTROPIC_THERMAL_EXPANSION_PROPERTIES[..n],
                PropertyRole::ThermalExpansion,
            ),
        };
    }
    layout.push_all(B::material_properties(), PropertyRole::Behaviour);
    Ok(layout)
}

/// Kind of operator requested by a Castem-like request code, and whether a
/// prediction operator is wanted instead of an integration.
pub fn decode_stiffness_request(code: f64) -> Result<(StiffnessMatrixType, bool)> {
    let requests = [
        (0.0, StiffnessMatrixType::NoStiffness, false),
        (1.0, StiffnessMatrixType::Elastic, false),
        (2.0, StiffnessMatrixType::Secant, false),
        (3.0, StiffnessMatrixType::Tangent, false),
        (4.0, StiffnessMatrixType::ConsistentTangent, false),
        (-1.0, StiffnessMatrixType::Elastic, true),
        (-2.0, StiffnessMatrixType::Secant, true),
        (-3.0, StiffnessMatrixType::Tangent, true),
    ];
    requests
        .iter()
        .find(|(c, _, _)| (code - c).abs() < 0.25)
        .map(|(_, smt, prediction)| (*smt, *prediction))
        .ok_or(BehaviourError::InvalidStiffnessRequest(code))
}

/// Out of bounds policy selected by the `OutOfBoundsPolicy` unsigned
/// integer parameter: 1 warns, 2 is strict, anything else ignores bounds.
pub fn out_of_bounds_policy(parameters: &ParameterStore) -> OutOfBoundsPolicy {
    match parameters.unsigned_integer_or("OutOfBoundsPolicy", 0) {
        1 => OutOfBoundsPolicy::Warning,
        2 => OutOfBoundsPolicy::Strict,
        _ => OutOfBoundsPolicy::None,
    }
}

/// Behaviour's own properties, read after the block managed by the
/// interface.
pub(crate) fn behaviour_properties<B: Behaviour>(
    layout: &MaterialPropertiesLayout,
    props: &[f64],
) -> Result<Vec<f64>> {
    let offset = layout.behaviour_properties_offset();
    let n = B::material_properties().len();
    props
        .get(offset..offset + n)
        .map(<[f64]>::to_vec)
        .ok_or(BehaviourError::UnMatchedNumberOfMaterialProperties {
            expected: offset + n,
            got: props.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smallstrain::{MisesPlasticity, OrthotropicElasticity, ThermoElasticity};

    #[test]
    fn stiffness_requests() {
        assert_eq!(decode_stiffness_request(0.0).unwrap(), (StiffnessMatrixType::NoStiffness, false));
        assert_eq!(decode_stiffness_request(4.1).unwrap(), (StiffnessMatrixType::ConsistentTangent, false));
        assert_eq!(decode_stiffness_request(-1.0).unwrap(), (StiffnessMatrixType::Elastic, true));
        assert!(matches!(
            decode_stiffness_request(2.5),
            Err(BehaviourError::InvalidStiffnessRequest(_))
        ));
    }

    #[test]
    fn prepended_layouts() {
        let h = ModellingHypothesis::PlaneStrain;
        let layout = prepended_layout::<OrthotropicElasticity>(h).unwrap();
        assert_eq!(layout.len(), 7);
        assert_eq!(layout.names()[6], "ShearModulus12");
        let layout = prepended_layout::<ThermoElasticity>(h).unwrap();
        assert_eq!(layout.names(), vec!["YoungModulus", "PoissonRatio", "ThermalExpansion"]);
        let layout = prepended_layout::<MisesPlasticity>(h).unwrap();
        assert_eq!(layout.behaviour_properties_offset(), 0);
        assert_eq!(layout.len(), 4);
    }
}
