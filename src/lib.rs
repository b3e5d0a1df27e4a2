#![warn(clippy::all)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod analytical;
pub mod config;
pub mod controller;
mod element;
pub mod errors;
pub mod geometry;
pub mod hydro;
pub mod loads;
pub mod mesh;
pub mod region;
pub mod results;
pub mod rigid_body;
pub mod shape;
pub mod structure;
pub mod tracker;

pub use analytical::{speed_for_wetted_length, FlatPlate};
pub use config::SolveRequest;
pub use controller::{
    initial_state, solve, solve_from, ConvergenceHistory, ConvergenceRecord, CouplingSettings,
    Relaxation, Residuals, Solution, SolutionState, Tolerances,
};
pub use errors::{
    ComponentFault, ConfigError, Divergence, DivergenceReason, HydroError, MeshError,
    RequestError, SingularCause, SolveError, SolveFailure, StructuralError,
};
pub use geometry::{point, Placement, Point};
pub use hydro::{
    integrate_forces, solve_pressure, ElementPressure, FlowConditions, HydroForces,
    HydroSettings, HydroSolution, Panel, PressureField,
};
pub use loads::StructuralLoad;
pub use mesh::{build_mesh, refine, Corner, Mesh, RefinementPolicy, SurfaceDefinition};
pub use region::WettedRegion;
pub use results::{SolutionSnapshot, SolveReport, SolveStatus, WettedLengthTrace};
pub use rigid_body::{
    equilibrate_draft, equilibrate_trim, Attitude, HeaveBalance, RigidBody, TrimBalance, TrialSurface,
};
pub use shape::Shape;
pub use structure::{
    solve_deflection, DeflectionField, EndCondition, NodeDeflection, PointLoad,
    StructuralMode, StructuralProperties,
};
pub use tracker::{
    damp_region, target_region, trial_region, update_wetted_region, EntryCondition, TrackerSettings,
};
