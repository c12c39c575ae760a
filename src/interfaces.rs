//! Canonical data model shared by every solver interface: the behaviour
//! trait, the descriptions of material properties and state variables, and
//! the enumerations exchanged between a handler and a behaviour.
use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::parameters::ParameterStore;
use nalgebra::{DMatrix, DVector, Matrix3};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum BehaviourType {
    General,
    /// Strain in, stress out.
    StandardStrainBased,
    /// Deformation gradient in, Cauchy stress out.
    StandardFiniteStrain,
    /// Opening displacement in, traction out.
    CohesiveZoneModel,
}

impl BehaviourType {
    pub fn gradient_size(self, h: ModellingHypothesis) -> Result<usize> {
        match self {
            BehaviourType::General | BehaviourType::StandardStrainBased => h.stensor_size(),
            BehaviourType::StandardFiniteStrain => h.tensor_size(),
            BehaviourType::CohesiveZoneModel => h.space_dimension(),
        }
    }

    pub fn thermodynamic_force_size(self, h: ModellingHypothesis) -> Result<usize> {
        match self {
            BehaviourType::CohesiveZoneModel => h.space_dimension(),
            _ => h.stensor_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SymmetryType {
    Isotropic,
    Orthotropic,
}

/// Derivative of a stress measure with respect to a strain measure.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
pub enum TangentOperatorFlag {
    DSIG_DF,
    DSIG_DDF,
    DSIG_DD,
    DSIG_DDE,
    DTAU_DF,
    DTAU_DDF,
    DS_DF,
    DS_DDF,
    DS_DC,
    DS_DEGL,
    /// Truesdell rate of the Cauchy stress, as expected by Castem.
    C_TRUESDELL,
    /// Jaumann rate of the Kirchhoff stress divided by `J`, as expected by
    /// Abaqus/Standard.
    ABAQUS,
    /// Derivative of the dual stress of the logarithmic strain.
    DT_DELOG,
}

impl TangentOperatorFlag {
    /// `true` when the operator is taken with respect to a non-symmetric
    /// tensor (9 columns in 3D).
    pub fn is_with_respect_to_tensor(self) -> bool {
        use TangentOperatorFlag::*;
        matches!(
            self,
            DSIG_DF | DSIG_DDF | DTAU_DF | DTAU_DDF | DS_DF | DS_DDF
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IntegrationResult {
    Success,
    Failure,
    UnreliableResults,
}

/// Kind of operator requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum StiffnessMatrixType {
    NoStiffness,
    Elastic,
    Secant,
    Tangent,
    ConsistentTangent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
pub enum OutOfBoundsPolicy {
    #[default]
    None,
    Warning,
    Strict,
}

/// Applies `policy` to a bound violation of `variable`. Values inside
/// `[lower, upper]` are always accepted.
pub fn check_bound(
    policy: OutOfBoundsPolicy,
    variable: &str,
    value: f64,
    lower: Option<f64>,
    upper: Option<f64>,
) -> Result<()> {
    let below = lower.map_or(false, |l| value < l);
    let above = upper.map_or(false, |u| value > u);
    if !(below || above) {
        return Ok(());
    }
    let bounds = format!(
        "[{}, {}]",
        lower.map_or("-inf".to_string(), |l| l.to_string()),
        upper.map_or("+inf".to_string(), |u| u.to_string())
    );
    match policy {
        OutOfBoundsPolicy::None => Ok(()),
        OutOfBoundsPolicy::Warning => {
            tracing::warn!(variable, value, bounds = %bounds, "variable out of bounds");
            Ok(())
        }
        OutOfBoundsPolicy::Strict => Err(BehaviourError::OutOfBounds {
            variable: variable.to_string(),
            value,
            bounds,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    Scalar,
    Stensor,
}

/// Description of an internal state variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    /// Glossary name, e.g. `AxialStrain`.
    pub external_name: String,
    pub kind: VariableKind,
}

impl VariableDescriptor {
    pub fn scalar(name: &str, external_name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_name: external_name.to_string(),
            kind: VariableKind::Scalar,
        }
    }

    pub fn stensor(name: &str, external_name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_name: external_name.to_string(),
            kind: VariableKind::Stensor,
        }
    }

    pub fn size(&self, h: ModellingHypothesis) -> Result<usize> {
        match self.kind {
            VariableKind::Scalar => Ok(1),
            VariableKind::Stensor => h.stensor_size(),
        }
    }
}

/// Total number of reals needed to store `variables`.
pub fn variables_size(variables: &[VariableDescriptor], h: ModellingHypothesis) -> Result<usize> {
    variables.iter().map(|v| v.size(h)).sum()
}

/// Position of the unique scalar variable whose external name is
/// `AxialStrain`.
pub fn axial_strain_offset(
    variables: &[VariableDescriptor],
    h: ModellingHypothesis,
    behaviour: &str,
) -> Result<usize> {
    let mut offset = 0;
    let mut found = None;
    for v in variables {
        if v.external_name == "AxialStrain" {
            if found.is_some() {
                return Err(BehaviourError::AmbiguousAxialStrain(behaviour.to_string()));
            }
            found = Some(offset);
        }
        offset += v.size(h)?;
    }
    found.ok_or_else(|| BehaviourError::MissingAxialStrain(behaviour.to_string()))
}

/// Role of an entry of the material properties buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyRole {
    /// Used to build the stiffness tensor.
    Elastic,
    ThermalExpansion,
    /// Managed by the interface but not used by the behaviour (mass density,
    /// orientation, plate width, ...).
    Interface,
    Behaviour,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialPropertyDescriptor {
    pub name: String,
    pub external_name: String,
    pub type_tag: String,
    pub offset: usize,
    pub array_size: usize,
    pub role: PropertyRole,
}

/// Flat layout of the material properties expected by one solver for one
/// behaviour and one modelling hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialPropertiesLayout {
    descriptors: Vec<MaterialPropertyDescriptor>,
}

impl MaterialPropertiesLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors
            .last()
            .map_or(0, |d| d.offset + d.array_size)
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn push(&mut self, name: &str, role: PropertyRole) -> &mut Self {
        self.push_array(name, name, 1, role)
    }

    pub fn push_array(
        &mut self,
        name: &str,
        external_name: &str,
        array_size: usize,
        role: PropertyRole,
    ) -> &mut Self {
        let offset = self.len();
        self.descriptors.push(MaterialPropertyDescriptor {
            name: name.to_string(),
            external_name: external_name.to_string(),
            type_tag: "real".to_string(),
            offset,
            array_size,
            role,
        });
        self
    }

    pub fn push_all(&mut self, names: &[&str], role: PropertyRole) -> &mut Self {
        for n in names {
            self.push(n, role);
        }
        self
    }

    pub fn descriptors(&self) -> &[MaterialPropertyDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    fn offsets(&self, role: PropertyRole) -> impl Iterator<Item = usize> + '_ {
        self.descriptors
            .iter()
            .filter(move |d| d.role == role)
            .flat_map(|d| d.offset..d.offset + d.array_size)
    }

    /// Offset of the first property of the given role, or the end of the
    /// layout when there is none.
    fn first_offset(&self, role: PropertyRole) -> usize {
        self.offsets(role).next().unwrap_or(self.len())
    }

    pub fn elastic_properties_offset(&self) -> usize {
        self.first_offset(PropertyRole::Elastic)
    }

    pub fn thermal_expansion_properties_offset(&self) -> usize {
        self.first_offset(PropertyRole::ThermalExpansion)
    }

    pub fn behaviour_properties_offset(&self) -> usize {
        self.first_offset(PropertyRole::Behaviour)
    }

    /// Number of entries of the leading block managed by the interface.
    pub fn interface_properties_nb(&self) -> usize {
        self.behaviour_properties_offset()
    }

    fn check(&self, props: &[f64]) -> Result<()> {
        if props.len() < self.len() {
            return Err(BehaviourError::UnMatchedNumberOfMaterialProperties {
                expected: self.len(),
                got: props.len(),
            });
        }
        Ok(())
    }

    /// Gathers the properties of the given role, in declaration order.
    pub fn gather(&self, props: &[f64], role: PropertyRole) -> Result<Vec<f64>> {
        self.check(props)?;
        Ok(self.offsets(role).map(|i| props[i]).collect())
    }

    /// Value of the property `name` in `props`.
    pub fn value(&self, props: &[f64], name: &str) -> Result<f64> {
        self.check(props)?;
        self.descriptors
            .iter()
            .find(|d| d.name == name)
            .map(|d| props[d.offset])
            .ok_or_else(|| BehaviourError::Programming(format!("no material property '{name}'")))
    }
}

/// Canonical state handed to a behaviour for one integration step.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourData {
    pub hypothesis: ModellingHypothesis,
    pub dt: f64,
    pub temperature: f64,
    pub temperature_increment: f64,
    /// Driving variables at the beginning of the step.
    pub gradients0: DVector<f64>,
    /// Driving variables at the end of the step.
    pub gradients1: DVector<f64>,
    /// Thermodynamic forces at the beginning of the step.
    pub thermodynamic_forces: DVector<f64>,
    /// The behaviour's own material properties.
    pub material_properties: Vec<f64>,
    pub internal_state_variables: Vec<f64>,
    pub external_state_variables: Vec<f64>,
    pub external_state_variables_increments: Vec<f64>,
    pub stiffness_tensor: Option<DMatrix<f64>>,
    pub thermal_expansion: Option<DVector<f64>>,
}

impl BehaviourData {
    /// Zero-initialised data sized for `btype` under `h`.
    pub fn new(btype: BehaviourType, h: ModellingHypothesis) -> Result<Self> {
        let ng = btype.gradient_size(h)?;
        let nf = btype.thermodynamic_force_size(h)?;
        let mut gradients = DVector::zeros(ng);
        if btype == BehaviourType::StandardFiniteStrain {
            gradients.rows_mut(0, 3).fill(1.0);
        }
        Ok(Self {
            hypothesis: h,
            dt: 0.0,
            temperature: 293.15,
            temperature_increment: 0.0,
            gradients0: gradients.clone(),
            gradients1: gradients,
            thermodynamic_forces: DVector::zeros(nf),
            material_properties: Vec::new(),
            internal_state_variables: Vec::new(),
            external_state_variables: Vec::new(),
            external_state_variables_increments: Vec::new(),
            stiffness_tensor: None,
            thermal_expansion: None,
        })
    }

    pub fn stiffness_tensor(&self, behaviour: &str) -> Result<&DMatrix<f64>> {
        self.stiffness_tensor.as_ref().ok_or_else(|| {
            BehaviourError::Programming(format!("no stiffness tensor given to '{behaviour}'"))
        })
    }

    pub fn thermal_expansion(&self, behaviour: &str) -> Result<&DVector<f64>> {
        self.thermal_expansion.as_ref().ok_or_else(|| {
            BehaviourError::Programming(format!(
                "no thermal expansion coefficients given to '{behaviour}'"
            ))
        })
    }

    /// Material property `i` of the behaviour.
    pub fn material_property(&self, i: usize) -> Result<f64> {
        self.material_properties.get(i).copied().ok_or(
            BehaviourError::UnMatchedNumberOfMaterialProperties {
                expected: i + 1,
                got: self.material_properties.len(),
            },
        )
    }

    /// Deformation gradients at the beginning and at the end of the step.
    pub fn deformation_gradients(&self) -> Result<(Matrix3<f64>, Matrix3<f64>)> {
        Ok((
            crate::mandel::tensor_to_matrix(&self.gradients0, self.hypothesis)?,
            crate::mandel::tensor_to_matrix(&self.gradients1, self.hypothesis)?,
        ))
    }
}

/// A constitutive law integrated over one time step.
///
/// Traits of the behaviour are associated constants: they are resolved at
/// compile time by every handler.
pub trait Behaviour: Sized {
    const NAME: &'static str;
    const BEHAVIOUR_TYPE: BehaviourType;
    const SYMMETRY: SymmetryType = SymmetryType::Isotropic;
    const HAS_STRESS_FREE_EXPANSION: bool = false;
    const REQUIRES_STIFFNESS_TENSOR: bool = false;
    const REQUIRES_THERMAL_EXPANSION_COEFFICIENT_TENSOR: bool = false;
    const HAS_CONSISTENT_TANGENT_OPERATOR: bool = true;
    const IS_CONSISTENT_TANGENT_OPERATOR_SYMMETRIC: bool = true;
    const HAS_PREDICTION_OPERATOR: bool = false;
    /// Operator returned by [`Behaviour::tangent_operator`] for finite
    /// strain behaviours.
    const TANGENT_OPERATOR: TangentOperatorFlag = TangentOperatorFlag::DS_DEGL;
    /// Number of internal sub-steps a Castem handler may use, 0 disables
    /// sub-stepping.
    const MAXIMUM_SUB_STEPPING: u32 = 0;

    fn is_defined(h: ModellingHypothesis) -> bool {
        h != ModellingHypothesis::Undefined
    }

    /// Names of the behaviour's own material properties.
    fn material_properties() -> &'static [&'static str];

    fn internal_state_variables_descriptors(h: ModellingHypothesis) -> Vec<VariableDescriptor>;

    fn internal_variables_nb(h: ModellingHypothesis) -> Result<usize> {
        variables_size(&Self::internal_state_variables_descriptors(h), h)
    }

    /// Stress-free expansion at the beginning and at the end of the step.
    fn compute_stress_free_expansion(
        _data: &BehaviourData,
        _parameters: &ParameterStore,
    ) -> Result<(DVector<f64>, DVector<f64>)> {
        Err(BehaviourError::Programming(format!(
            "'{}' does not compute any stress-free expansion",
            Self::NAME
        )))
    }

    fn new(data: BehaviourData, parameters: &ParameterStore) -> Result<Self>;

    fn set_out_of_bounds_policy(&mut self, _policy: OutOfBoundsPolicy) {}

    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn check_bounds(&self) -> Result<()> {
        Ok(())
    }

    fn compute_a_priori_time_step_scaling_factor(&self) -> (bool, f64) {
        (true, 1.0)
    }

    fn compute_a_posteriori_time_step_scaling_factor(&self) -> (bool, f64) {
        (true, 1.0)
    }

    /// Scaling factor proposed after a failed integration.
    fn minimal_time_step_scaling_factor(&self) -> f64 {
        0.1
    }

    fn compute_prediction_operator(&mut self, _smt: StiffnessMatrixType) -> Result<IntegrationResult> {
        Err(BehaviourError::PredictionOperatorIsNotAvailable(Self::NAME.to_string()))
    }

    fn integrate(&mut self, smt: StiffnessMatrixType) -> Result<IntegrationResult>;

    fn thermodynamic_forces(&self) -> &DVector<f64>;

    fn internal_state_variables(&self) -> &[f64];

    fn tangent_operator(&self) -> &DMatrix<f64>;
}
