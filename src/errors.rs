//! Error types produced while meshing, solving or coupling a planing surface.

use thiserror::Error;

use crate::controller::ConvergenceHistory;
use crate::region::WettedRegion;

/// Error returned when a surface definition or refinement request is malformed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MeshError {
    /// Returned when fewer elements are requested than the beam formulation needs.
    #[error("at least 2 elements are required (received {elements})")]
    TooFewElements {
        /// Requested element count.
        elements: usize,
    },
    /// Returned when the surface length is zero, negative or not finite.
    #[error("surface length must be positive and finite (received {0})")]
    InvalidLength(f64),
    /// Returned when the trim angle is not finite or not within (-90, 90) degrees.
    #[error("trim angle must be finite and within (-90, 90) degrees (received {0})")]
    InvalidTrim(f64),
    /// Returned when the camber ratio is not finite or folds the surface back on itself.
    #[error("camber must be finite with magnitude below 0.25 (received {0})")]
    InvalidCamber(f64),
    /// Returned when the end clustering strength is outside `[0, 1)`.
    #[error("clustering must lie in [0, 1) (received {0})")]
    InvalidClustering(f64),
    /// Returned when a corner does not lie strictly inside the surface.
    #[error("corner at s = {arclength} lies outside the surface (0, {length})")]
    CornerOutsideSurface {
        /// Arclength of the offending corner in metres.
        arclength: f64,
        /// Surface length in metres.
        length: f64,
    },
    /// Returned when a corner kink angle is not finite.
    #[error("corner at s = {arclength} has a non-finite angle")]
    InvalidCornerAngle {
        /// Arclength of the offending corner in metres.
        arclength: f64,
    },
    /// Returned when a refinement interval does not overlap the mesh.
    #[error("refinement interval [{start}, {end}] does not overlap the mesh")]
    IntervalOutsideMesh {
        /// Start of the requested interval in metres of arclength.
        start: f64,
        /// End of the requested interval in metres of arclength.
        end: f64,
    },
    /// Returned when the mesh and a field defined on it disagree in size.
    #[error("field has {found} nodes but the mesh has {expected}")]
    FieldMismatch {
        /// Number of nodes in the mesh.
        expected: usize,
        /// Number of nodes carried by the field.
        found: usize,
    },
}

/// Reason the discretized pressure equation could not be solved.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum SingularCause {
    /// The wetted region has collapsed to (almost) a single point.
    #[error("wetted region of length {length} is degenerate")]
    DegenerateRegion {
        /// Wetted arclength in metres.
        length: f64,
    },
    /// A panel runs upstream, so its projection on the free surface is not positive.
    #[error("panel {panel} folds back on the free surface")]
    FoldedPanel {
        /// Index of the offending panel.
        panel: usize,
    },
    /// LU factorization of the influence matrix failed.
    #[error("influence matrix cannot be factorized")]
    Factorization,
    /// The solution contains NaN or infinite vortex strengths.
    #[error("vortex strengths are not finite")]
    NonFinite,
}

/// Error returned by the hydrodynamic pressure solver.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum HydroError {
    /// Returned when the discretized system is rank-deficient or degenerate.
    #[error("hydrodynamic system is singular: {0}")]
    SingularSystem(#[source] SingularCause),
}

/// Error returned when the structural equilibrium equations cannot be solved.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum StructuralError {
    /// Returned when the Newton iteration exhausts its iteration budget.
    #[error(
        "structural Newton iteration diverged in load step {load_step} after {iterations} iterations (residual {residual:.3e})"
    )]
    Divergence {
        /// One-based index of the load increment that failed.
        load_step: usize,
        /// Number of Newton iterations performed in that increment.
        iterations: usize,
        /// Infinity norm of the final out-of-balance force.
        residual: f64,
    },
    /// Returned when the tangent stiffness matrix cannot be factorized.
    #[error("stiffness matrix is singular; check end conditions and properties")]
    SingularStiffness,
    /// Returned when the displacement iterate stops being finite.
    #[error("structural displacements became non-finite")]
    NonFinite,
}

/// Error returned when a solve request carries physically meaningless values.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RequestError {
    /// Returned when a value that must be strictly positive is not.
    #[error("{field} must be positive and finite (received {value})")]
    NonPositive {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Returned when a value that must be non-negative is negative or not finite.
    #[error("{field} must be non-negative and finite (received {value})")]
    Negative {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Returned when a factor is outside its permitted interval.
    #[error("{field} must lie in ({min}, {max}] (received {value})")]
    OutOfRange {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Rejected value.
        value: f64,
        /// Exclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// Returned when a count is below its minimum.
    #[error("{field} must be at least {min} (received {value})")]
    TooSmall {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Rejected value.
        value: usize,
        /// Smallest accepted value.
        min: usize,
    },
    /// Returned when neither end of a flexible surface is restrained.
    #[error("a flexible surface needs at least one restrained end")]
    UnrestrainedStructure,
    /// Returned when a body free in draft or trim is asked to plane without any flow.
    #[error("a body free in draft or trim requires a positive flow speed")]
    FreeMotionWithoutFlow,
    /// Returned when the structure has no stiffness against transverse load.
    #[error("bending stiffness and pretension cannot both be zero")]
    NoTransverseStiffness,
    /// Returned when a point load is applied outside the surface.
    #[error("point load at s = {arclength} lies outside the surface [0, {length}]")]
    PointLoadOutsideSurface {
        /// Arclength of the load in metres.
        arclength: f64,
        /// Surface length in metres.
        length: f64,
    },
}

/// Error returned while reading or writing request and report files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Returned when a file cannot be read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Returned when a document is not valid JSON for the expected shape.
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    /// Returned when a request parses but fails validation.
    #[error("invalid request: {0}")]
    Invalid(#[from] RequestError),
}

/// Fault raised by one of the solver components during an outer iteration.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum ComponentFault {
    /// The hydrodynamic solver (or the tracker's trial solve) failed.
    #[error(transparent)]
    Hydro(#[from] HydroError),
    /// The structural solver failed.
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Reason the outer iteration was declared divergent.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum DivergenceReason {
    /// The iteration cap was reached before the residuals fell below tolerance.
    #[error("iteration cap of {cap} reached")]
    IterationCap {
        /// Configured maximum number of outer iterations.
        cap: usize,
    },
    /// The combined residual grew far beyond the best value seen so far.
    #[error("residual grew to {residual:.3e} (best {best:.3e})")]
    ResidualGrowth {
        /// Combined residual of the offending iteration.
        residual: f64,
        /// Smallest combined residual observed earlier.
        best: f64,
    },
    /// A residual became NaN or infinite.
    #[error("residuals became non-finite")]
    NonFinite,
}

/// Diagnostic returned when the outer iteration diverges.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("coupling diverged after {iterations} iterations: {reason}")]
pub struct Divergence {
    /// Why the iteration was stopped.
    pub reason: DivergenceReason,
    /// Number of outer iterations performed.
    pub iterations: usize,
    /// Full residual trace up to the point of divergence.
    pub history: ConvergenceHistory,
}

/// Diagnostic returned when a solver component fails fatally.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("outer iteration {iteration} failed on region {region}: {cause}")]
pub struct SolveFailure {
    /// One-based outer iteration in which the fault occurred (0 during initialization).
    pub iteration: usize,
    /// The component fault that could not be healed.
    #[source]
    pub cause: ComponentFault,
    /// Wetted region being evaluated when the fault occurred.
    pub region: WettedRegion,
    /// Whether the automatic local retry had already been spent.
    pub retried: bool,
    /// Residual trace up to the failure.
    pub history: ConvergenceHistory,
}

/// Error returned by [`solve`](crate::solve) and [`solve_from`](crate::solve_from).
///
/// Only a converged solve produces a result; every variant here is diagnostic.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SolveError {
    /// The surface definition or refinement policy is degenerate.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] MeshError),
    /// The request carries non-physical values.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    /// A component failed and could not be healed by a local retry.
    #[error("{0}")]
    Failed(Box<SolveFailure>),
    /// The outer iteration diverged or hit its iteration cap.
    #[error("{0}")]
    Diverged(Box<Divergence>),
    /// The caller requested cancellation between outer iterations.
    #[error("solve cancelled before outer iteration {iteration}")]
    Cancelled {
        /// One-based iteration that would have run next.
        iteration: usize,
    },
}

impl SolveError {
    /// Return the convergence history carried by a diagnostic variant.
    #[must_use]
    pub fn history(&self) -> Option<&ConvergenceHistory> {
        match self {
            Self::Failed(failure) => Some(&failure.history),
            Self::Diverged(divergence) => Some(&divergence.history),
            _ => None,
        }
    }
}
