//! Standalone driver of a behaviour: integrates a material point along an
//! imposed gradient path, either through a solver entry point or directly.
mod behaviour;
mod castem;
mod current_state;
mod generic;
pub mod scheme;
mod workspace;

pub use behaviour::MTestBehaviour;
pub use castem::CastemSmallStrainBehaviour;
pub use current_state::CurrentState;
pub use generic::GenericBehaviourDriver;
pub use scheme::TestCase;
pub use workspace::BehaviourWorkSpace;
