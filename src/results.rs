//! Post-processed solve outcomes for export.

use serde::{Deserialize, Serialize};

use crate::controller::{ConvergenceHistory, Solution};
use crate::errors::{ConfigError, SolveError};
use crate::geometry::Point;
use crate::hydro::{ElementPressure, HydroForces, Panel};
use crate::structure::NodeDeflection;

/// How a solve ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// All residuals fell below their tolerances.
    Converged,
    /// The outer iteration diverged or hit its cap.
    Diverged,
    /// A component failed and could not be retried.
    Failed,
    /// The caller cancelled the solve.
    Cancelled,
    /// The request or its geometry was rejected before iterating.
    Rejected,
}

/// Flattened view of a converged state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionSnapshot {
    /// Node arclengths in metres.
    pub arclengths: Vec<f64>,
    /// Deformed node positions in the flow frame.
    pub positions: Vec<Point>,
    /// Nodal deflections.
    pub deflections: Vec<NodeDeflection>,
    /// Segment-averaged pressures.
    pub element_pressures: Vec<ElementPressure>,
    /// Hydrodynamic panels.
    pub panels: Vec<Panel>,
    /// Entry arclength, absent when dry.
    pub entry: Option<f64>,
    /// Separation arclength, absent when dry.
    pub separation: Option<f64>,
    /// Wetted arclength in metres.
    pub wetted_length: f64,
    /// Trailing edge draft in metres.
    pub draft: f64,
    /// Trim in degrees, positive bow up.
    pub trim_deg: f64,
    /// Hydrodynamic resultants.
    pub forces: HydroForces,
    /// Largest normal deflection magnitude in metres.
    pub max_deflection: f64,
}

impl SolutionSnapshot {
    /// Snapshot the state of `solution`.
    #[must_use]
    pub fn new(solution: &Solution) -> Self {
        let state = &solution.state;
        let bounds = state.region.bounds();
        Self {
            arclengths: state.mesh.arclengths(),
            positions: state.shape().node_positions(),
            deflections: state.deflection.nodes().to_vec(),
            element_pressures: state.pressure.element_pressures(&state.mesh, &state.region),
            panels: state.pressure.panels().to_vec(),
            entry: bounds.map(|(entry, _)| entry),
            separation: bounds.map(|(_, separation)| separation),
            wetted_length: state.region.length(),
            draft: state.draft,
            trim_deg: state.trim.to_degrees(),
            forces: state.forces,
            max_deflection: state.deflection.max_normal(),
        }
    }
}

/// Exportable summary of a solve.
///
/// A solution is only present for converged solves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Terminal status.
    pub status: SolveStatus,
    /// Outer iterations performed.
    pub iterations: usize,
    /// Whether the automatic retry was used.
    pub retried: bool,
    /// Residual trace.
    pub history: ConvergenceHistory,
    /// Converged state.
    pub solution: Option<SolutionSnapshot>,
    /// Error message for unsuccessful solves.
    pub diagnostic: Option<String>,
}

impl SolveReport {
    /// Summarize the outcome of [`solve`](crate::solve).
    #[must_use]
    pub fn from_outcome(outcome: &Result<Solution, SolveError>) -> Self {
        match outcome {
            Ok(solution) => Self {
                status: SolveStatus::Converged,
                iterations: solution.iterations,
                retried: solution.retried,
                history: solution.history.clone(),
                solution: Some(SolutionSnapshot::new(solution)),
                diagnostic: None,
            },
            Err(error) => {
                let (status, iterations, retried) = match error {
                    SolveError::InvalidGeometry(_) | SolveError::InvalidRequest(_) => {
                        (SolveStatus::Rejected, 0, false)
                    }
                    SolveError::Diverged(divergence) => {
                        (SolveStatus::Diverged, divergence.iterations, false)
                    }
                    SolveError::Failed(failure) => {
                        (SolveStatus::Failed, failure.iteration, failure.retried)
                    }
                    SolveError::Cancelled { iteration } => {
                        (SolveStatus::Cancelled, iteration.saturating_sub(1), false)
                    }
                };
                Self {
                    status,
                    iterations,
                    retried,
                    history: error.history().cloned().unwrap_or_default(),
                    solution: None,
                    diagnostic: Some(error.to_string()),
                }
            }
        }
    }

    /// Wetted length per outer iteration.
    #[must_use]
    pub fn wetted_length_trace(&self) -> WettedLengthTrace {
        WettedLengthTrace::from_history(&self.history)
    }

    /// Serialize the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a report from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed documents.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Wetted length of the region evaluated at each outer iteration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WettedLengthTrace {
    /// One-based iteration indices.
    pub iterations: Vec<usize>,
    /// Wetted arclength in metres.
    pub lengths: Vec<f64>,
}

impl WettedLengthTrace {
    /// Extract the trace from a convergence history.
    #[must_use]
    pub fn from_history(history: &ConvergenceHistory) -> Self {
        let (iterations, lengths) = history
            .records()
            .iter()
            .map(|record| (record.iteration, record.region.length()))
            .unzip();
        Self { iterations, lengths }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Divergence, DivergenceReason, RequestError};

    #[test]
    fn rejected_requests_carry_only_a_diagnostic() {
        let outcome = Err(SolveError::InvalidRequest(RequestError::FreeMotionWithoutFlow));
        let report = SolveReport::from_outcome(&outcome);
        assert_eq!(report.status, SolveStatus::Rejected);
        assert!(report.solution.is_none());
        assert!(report.history.is_empty());
        assert_eq!(
            report.diagnostic.as_deref(),
            Some("invalid request: a body free in draft or trim requires a positive flow speed")
        );
    }

    #[test]
    fn divergence_keeps_its_history() {
        let outcome = Err(SolveError::Diverged(Box::new(Divergence {
            reason: DivergenceReason::IterationCap { cap: 3 },
            iterations: 3,
            history: ConvergenceHistory::default(),
        })));
        let report = SolveReport::from_outcome(&outcome);
        assert_eq!(report.status, SolveStatus::Diverged);
        assert_eq!(report.iterations, 3);
        let text = report.to_json().expect("serializes");
        assert!(text.contains("\"status\": \"diverged\""));
        assert_eq!(SolveReport::from_json(&text).expect("parses"), report);
        assert!(report.wetted_length_trace().lengths.is_empty());
    }

    #[test]
    fn cancellation_counts_completed_iterations() {
        let report = SolveReport::from_outcome(&Err(SolveError::Cancelled { iteration: 5 }));
        assert_eq!(report.status, SolveStatus::Cancelled);
        assert_eq!(report.iterations, 4);
    }
}
