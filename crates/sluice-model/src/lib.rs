//! Sluice model domain
//!
//! Types describing the shape of a simulation run — scenario combinations,
//! the run clock, and the accessor traits through which recorders observe
//! simulation entities. The simulation engine itself lives elsewhere; this
//! crate only defines what the recording layer consumes from it.

pub mod domain;
pub mod entity;
pub mod scenario;
pub mod testing;
pub mod time;

pub use domain::Domain;
pub use entity::{FlowNode, IndexParameter, Parameter, StorageNode};
pub use scenario::{Scenario, ScenarioDomain, ScenarioIndex};
pub use time::{Timestep, Timestepper};
