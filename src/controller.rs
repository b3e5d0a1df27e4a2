//! Outer fixed-point iteration coupling pressure, deflection, attitude and wetted region.
//!
//! Each outer iteration evaluates the state `(deflection, draft, trim, region)`
//! once: the pressure on the current region, the structural response to it, the
//! heave and trim balance of the relaxed shape and finally the damped region update. A state
//! whose evaluation moves nothing by more than the tolerances is returned
//! together with the pressure computed from it.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::SolveRequest;
use crate::errors::{
    ComponentFault, Divergence, DivergenceReason, HydroError, SolveError, SolveFailure,
};
use crate::geometry::Placement;
use crate::hydro::{solve_pressure, HydroForces, HydroSettings, PressureField};
use crate::loads::StructuralLoad;
use crate::mesh::{build_mesh, refine, Mesh};
use crate::region::WettedRegion;
use crate::rigid_body::{equilibrate_draft, equilibrate_trim, Attitude, TrialSurface};
use crate::shape::Shape;
use crate::structure::{solve_deflection, DeflectionField, StructuralProperties};
use crate::tracker::{target_region, trial_region, update_wetted_region};

/// Residual thresholds below which the coupled state is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Largest node displacement between iterations, relative to the length.
    pub shape: f64,
    /// Largest element pressure change, relative to the stagnation pressure.
    pub pressure: f64,
    /// Largest region endpoint movement, relative to the length.
    pub region: f64,
    /// Lift imbalance, relative to the stagnation pressure times the length.
    pub force: f64,
    /// Moment imbalance, relative to the stagnation pressure times the length squared.
    pub moment: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            shape: 1.0e-6,
            pressure: 1.0e-6,
            region: 1.0e-6,
            force: 1.0e-6,
            moment: 1.0e-6,
        }
    }
}

/// Under-relaxation factors, each in `(0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relaxation {
    /// Fraction of the structural update applied to the deflection.
    pub shape: f64,
    /// Fraction of the region endpoint movement applied.
    pub region: f64,
    /// Fraction of the balanced draft change applied.
    pub draft: f64,
    /// Fraction of the balanced trim change applied.
    pub trim: f64,
}

impl Default for Relaxation {
    fn default() -> Self {
        Self {
            shape: 1.0,
            region: 0.8,
            draft: 1.0,
            trim: 1.0,
        }
    }
}

impl Relaxation {
    fn scaled(self, scale: f64, floor: f64) -> Self {
        let apply = |factor: f64| (factor * scale).max(floor.min(factor));
        Self {
            shape: apply(self.shape),
            region: apply(self.region),
            draft: apply(self.draft),
            trim: apply(self.trim),
        }
    }
}

/// Controls of the outer iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingSettings {
    /// Outer iterations allowed before the solve is declared divergent.
    pub max_iterations: usize,
    /// Convergence thresholds.
    pub tolerances: Tolerances,
    /// Base relaxation factors.
    pub relaxation: Relaxation,
    /// Halve the relaxation factors whenever the combined residual grows.
    pub adaptive_relaxation: bool,
    /// Smallest factor adaptive relaxation may reach.
    pub min_relaxation: f64,
    /// Growth of the combined residual over its best value that counts as divergence.
    pub divergence_ratio: f64,
}

impl Default for CouplingSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerances: Tolerances::default(),
            relaxation: Relaxation::default(),
            adaptive_relaxation: false,
            min_relaxation: 0.05,
            divergence_ratio: 1.0e3,
        }
    }
}

/// Normalized residuals of one outer iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Residuals {
    /// Node position change over the surface length.
    pub shape: f64,
    /// Element pressure change over the stagnation pressure.
    pub pressure: f64,
    /// Region endpoint change over the surface length.
    pub region: f64,
    /// Lift imbalance over the stagnation pressure times the length.
    pub force: f64,
    /// Moment imbalance over the stagnation pressure times the length squared.
    pub moment: f64,
}

impl Residuals {
    /// Largest of the residuals.
    #[must_use]
    pub fn combined(&self) -> f64 {
        self.shape
            .max(self.pressure)
            .max(self.region)
            .max(self.force)
            .max(self.moment)
    }

    /// Return `true` when every residual is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        [self.shape, self.pressure, self.region, self.force, self.moment]
            .iter()
            .all(|value| value.is_finite())
    }

    /// Return `true` when every residual is within its tolerance.
    #[must_use]
    pub fn within(&self, tolerances: &Tolerances) -> bool {
        self.shape <= tolerances.shape
            && self.pressure <= tolerances.pressure
            && self.region <= tolerances.region
            && self.force <= tolerances.force
            && self.moment <= tolerances.moment
    }
}

/// Diagnostics of one outer iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    /// One-based iteration index.
    pub iteration: usize,
    /// Residuals of the iteration.
    pub residuals: Residuals,
    /// Relaxation factors in effect.
    pub relaxation: Relaxation,
    /// Region the pressure was evaluated on.
    pub region: WettedRegion,
    /// Draft the pressure was evaluated at.
    pub draft: f64,
    /// Trim in radians the pressure was evaluated at.
    pub trim: f64,
    /// Lift of the evaluated pressure.
    pub lift: f64,
}

/// Residual trace of a solve, one record per outer iteration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceHistory {
    records: Vec<ConvergenceRecord>,
}

impl ConvergenceHistory {
    /// Records in iteration order.
    #[must_use]
    pub fn records(&self) -> &[ConvergenceRecord] {
        &self.records
    }

    /// Number of recorded iterations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Return `true` when no iteration was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&ConvergenceRecord> {
        self.records.last()
    }

    fn push(&mut self, record: ConvergenceRecord) {
        self.records.push(record);
    }

    fn best(&self) -> Option<f64> {
        self.records
            .iter()
            .map(|record| record.residuals.combined())
            .reduce(f64::min)
    }
}

/// Everything that describes one iterate of the coupled problem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionState {
    /// Mesh the deflection is defined on.
    pub mesh: Mesh,
    /// Elastic deflection.
    pub deflection: DeflectionField,
    /// Trailing edge draft in metres.
    pub draft: f64,
    /// Trim in radians, positive bow up.
    pub trim: f64,
    /// Wetted region.
    pub region: WettedRegion,
    /// Most recently computed pressure; consistent with the state once converged.
    pub pressure: PressureField,
    /// Resultants of `pressure`.
    pub forces: HydroForces,
}

impl SolutionState {
    /// Rigid placement of the body.
    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement::new(self.draft, self.trim, self.mesh.chord())
    }

    /// Deformed surface of the state.
    #[must_use]
    pub fn shape(&self) -> Shape<'_> {
        Shape::new(&self.mesh, &self.deflection, self.placement())
    }
}

/// Converged solution of a solve request.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Converged state with its consistent pressure.
    pub state: SolutionState,
    /// Residual trace.
    pub history: ConvergenceHistory,
    /// Number of outer iterations performed.
    pub iterations: usize,
    /// Whether the automatic retry was used.
    pub retried: bool,
}

// Requests and outcomes cross thread boundaries in batch drivers.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SolveRequest>();
    assert_send_sync::<SolutionState>();
    assert_send_sync::<Solution>();
    assert_send_sync::<SolveError>();
};

/// Build the cold-start state of `request`.
///
/// A component fault while locating the initial region is handled by the same
/// single retry as the outer iteration.
///
/// # Errors
///
/// Returns [`SolveError::InvalidGeometry`] for a degenerate surface and
/// [`SolveError::Failed`] when the initial region cannot be located.
pub fn initial_state(request: &SolveRequest) -> Result<SolutionState, SolveError> {
    Coupling::new(request).initialize()
}

/// Solve `request` from a cold start.
///
/// `cancel` is polled before every outer iteration.
///
/// # Errors
///
/// Returns [`SolveError`] unless the outer iteration converges.
pub fn solve(request: &SolveRequest, cancel: &AtomicBool) -> Result<Solution, SolveError> {
    request.validate()?;
    let mut coupling = Coupling::new(request);
    let state = coupling.initialize()?;
    coupling.run(state, cancel)
}

/// Solve `request` starting from a previously computed state.
///
/// # Errors
///
/// Returns [`SolveError`] unless the outer iteration converges.
pub fn solve_from(
    request: &SolveRequest,
    initial: &SolutionState,
    cancel: &AtomicBool,
) -> Result<Solution, SolveError> {
    request.validate()?;
    initial.deflection.check(&initial.mesh)?;
    Coupling::new(request).run(initial.clone(), cancel)
}

/// Outcome of evaluating one state.
struct Evaluation {
    pressure: PressureField,
    forces: HydroForces,
    deflection: DeflectionField,
    attitude: Attitude,
    region: WettedRegion,
    residuals: Residuals,
}

/// Working settings of one solve; the retry may alter them.
struct Coupling<'a> {
    request: &'a SolveRequest,
    hydro: HydroSettings,
    structure: StructuralProperties,
    warm_start: bool,
    relaxation_scale: f64,
    retried: bool,
}

impl<'a> Coupling<'a> {
    fn new(request: &'a SolveRequest) -> Self {
        Self {
            request,
            hydro: request.hydro,
            structure: request.structure.clone(),
            warm_start: true,
            relaxation_scale: 1.0,
            retried: false,
        }
    }

    fn relaxation(&self) -> Relaxation {
        let coupling = &self.request.coupling;
        coupling
            .relaxation
            .scaled(self.relaxation_scale, coupling.min_relaxation)
    }

    /// Undeflected state at the requested draft and the surface trim, on its target region.
    fn initialize(&mut self) -> Result<SolutionState, SolveError> {
        let request = self.request;
        let mesh = build_mesh(&request.surface, &request.refinement)?;
        let mut state = SolutionState {
            deflection: DeflectionField::zeros(mesh.node_count()),
            draft: request.body.draft,
            trim: mesh.trim(),
            region: WettedRegion::Dry,
            pressure: PressureField::default(),
            forces: HydroForces::default(),
            mesh,
        };
        loop {
            let located = target_region(&state.shape(), &request.flow, &self.hydro, &request.tracker);
            match located {
                Ok(region) => return Ok(SolutionState { region, ..state }),
                Err(cause) => {
                    // Report the interval the trial solve ran on.
                    let region = trial_region(&state.shape(), &request.tracker);
                    if self.retried {
                        return Err(SolveError::Failed(Box::new(SolveFailure {
                            iteration: 0,
                            cause: cause.into(),
                            region,
                            retried: true,
                            history: ConvergenceHistory::default(),
                        })));
                    }
                    state = self.retry(SolutionState { region, ..state }, cause.into(), 0)?;
                }
            }
        }
    }

    fn run(mut self, mut state: SolutionState, cancel: &AtomicBool) -> Result<Solution, SolveError> {
        let settings = self.request.coupling;
        let mut history = ConvergenceHistory::default();
        let mut iteration = 1;
        while iteration <= settings.max_iterations {
            if cancel.load(Ordering::Relaxed) {
                log::debug!("solve cancelled before iteration {iteration}");
                return Err(SolveError::Cancelled { iteration });
            }

            let relaxation = self.relaxation();
            let evaluation = match self.evaluate(&state, relaxation) {
                Ok(evaluation) => evaluation,
                Err(cause) if !self.retried => {
                    state = self.retry(state, cause, iteration)?;
                    continue;
                }
                Err(cause) => {
                    return Err(SolveError::Failed(Box::new(SolveFailure {
                        iteration,
                        cause,
                        region: state.region,
                        retried: true,
                        history,
                    })));
                }
            };

            let residuals = evaluation.residuals;
            let best = history.best();
            history.push(ConvergenceRecord {
                iteration,
                residuals,
                relaxation,
                region: state.region,
                draft: state.draft,
                trim: state.trim,
                lift: evaluation.forces.lift,
            });
            log::debug!(
                "iteration {iteration}: shape {:.3e} pressure {:.3e} region {:.3e} force {:.3e} moment {:.3e} on {} at draft {:.6}, trim {:.4} deg",
                residuals.shape,
                residuals.pressure,
                residuals.region,
                residuals.force,
                residuals.moment,
                state.region,
                state.draft,
                state.trim.to_degrees(),
            );

            if residuals.is_finite() && residuals.within(&settings.tolerances) {
                log::info!(
                    "converged in {iteration} iterations: wetted {}, lift {:.3} N/m",
                    state.region,
                    evaluation.forces.lift
                );
                return Ok(Solution {
                    state: SolutionState {
                        pressure: evaluation.pressure,
                        forces: evaluation.forces,
                        ..state
                    },
                    history,
                    iterations: iteration,
                    retried: self.retried,
                });
            }

            let combined = residuals.combined();
            let reason = if !residuals.is_finite() {
                Some(DivergenceReason::NonFinite)
            } else {
                best.filter(|&best| combined > settings.divergence_ratio * best)
                    .map(|best| DivergenceReason::ResidualGrowth {
                        residual: combined,
                        best,
                    })
            };
            if let Some(reason) = reason {
                return Err(diverged(reason, iteration, history));
            }

            let grew = history
                .records()
                .iter()
                .rev()
                .nth(1)
                .is_some_and(|previous| combined > previous.residuals.combined());
            if settings.adaptive_relaxation && grew {
                self.relaxation_scale *= 0.5;
                log::debug!("residual grew; relaxation scaled by {}", self.relaxation_scale);
            }

            state = SolutionState {
                deflection: evaluation.deflection,
                draft: evaluation.attitude.draft,
                trim: evaluation.attitude.trim,
                region: evaluation.region,
                pressure: evaluation.pressure,
                forces: evaluation.forces,
                mesh: state.mesh,
            };
            iteration += 1;
        }
        Err(diverged(
            DivergenceReason::IterationCap {
                cap: settings.max_iterations,
            },
            settings.max_iterations,
            history,
        ))
    }

    /// Evaluate one outer iteration on `state`.
    fn evaluate(&self, state: &SolutionState, relaxation: Relaxation) -> Result<Evaluation, ComponentFault> {
        let request = self.request;
        let mesh = &state.mesh;
        let length = mesh.length();
        let shape = state.shape();

        let hydro = solve_pressure(
            &shape,
            &state.region,
            &request.flow,
            &self.hydro,
            request.body.pivot(&shape),
        )?;

        let load = StructuralLoad::new(
            &hydro.field,
            &self.structure,
            state.placement().gravity_direction(),
            request.flow.gravity,
        );
        let warm = self.warm_start.then_some(&state.deflection);
        let target = solve_deflection(mesh, &self.structure, &load, warm)?;
        let deflection = state.deflection.relax_toward(&target, relaxation.shape);

        let body = &request.body;
        let required_lift = body.required_lift(&self.structure, &request.flow, length);
        let current = Attitude {
            draft: state.draft,
            trim: state.trim,
        };
        let surface = TrialSurface {
            mesh,
            deflection: &deflection,
            trim: state.trim,
            flow: &request.flow,
            hydro: &self.hydro,
            tracker: &request.tracker,
        };
        let balanced = if body.free_in_trim {
            equilibrate_trim(&surface, body, &self.structure, current, required_lift)?.attitude
        } else if body.free_in_draft {
            Attitude {
                draft: equilibrate_draft(&surface, body, state.draft, required_lift)?.draft,
                ..current
            }
        } else {
            current
        };
        let attitude = body.relaxed_attitude(current, balanced, relaxation.draft, relaxation.trim);

        let relaxed = Shape::new(
            mesh,
            &deflection,
            Placement::new(attitude.draft, attitude.trim, mesh.chord()),
        );
        let region = update_wetted_region(
            &relaxed,
            &state.region,
            &request.flow,
            &self.hydro,
            &request.tracker,
            relaxation.region,
        )?;

        let shape_change = shape
            .node_positions()
            .iter()
            .zip(relaxed.node_positions())
            .map(|(before, after)| before.distance(after))
            .fold(0.0, f64::max);
        let stagnation = request.flow.dynamic_pressure().max(f64::MIN_POSITIVE);
        let previous = state.pressure.element_pressures(mesh, &state.pressure.region());
        let pressure_change = hydro
            .field
            .element_pressures(mesh, &state.region)
            .iter()
            .zip(&previous)
            .map(|(now, before)| (now.pressure - before.pressure).abs())
            .fold(0.0, f64::max);
        let force = if body.free_in_draft {
            (hydro.forces.lift - required_lift).abs() / (stagnation * length)
        } else {
            0.0
        };
        let moment = if body.free_in_trim {
            let required = body.required_moment(&shape, &self.structure, &request.flow);
            (hydro.forces.moment - required).abs() / (stagnation * length * length)
        } else {
            0.0
        };

        Ok(Evaluation {
            pressure: hydro.field,
            forces: hydro.forces,
            deflection,
            attitude,
            region,
            residuals: Residuals {
                shape: shape_change / length,
                pressure: pressure_change / stagnation,
                region: region.change_from(&state.region, length),
                force,
                moment,
            },
        })
    }

    /// Spend the single retry on a component fault and return the state to re-run.
    fn retry(
        &mut self,
        state: SolutionState,
        cause: ComponentFault,
        iteration: usize,
    ) -> Result<SolutionState, SolveError> {
        self.retried = true;
        match cause {
            ComponentFault::Hydro(HydroError::SingularSystem(reason)) => {
                let (start, end) = refinement_window(&state.mesh, &state.region);
                let mesh = refine(&state.mesh, start..=end)?;
                let deflection = state.deflection.project(&state.mesh, &mesh)?;
                self.hydro.panels = self.hydro.panels.max(1) * 2;
                self.hydro.regularization = self.hydro.regularization.max(self.hydro.retry_regularization);
                log::warn!(
                    "iteration {iteration}: {reason}; refining [{start:.4}, {end:.4}], {} panels, regularizing",
                    self.hydro.panels
                );
                Ok(SolutionState {
                    mesh,
                    deflection,
                    ..state
                })
            }
            ComponentFault::Structural(error) => {
                self.structure.load_steps = self.structure.load_steps.max(1) * 2;
                self.warm_start = false;
                log::warn!(
                    "iteration {iteration}: {error}; retrying with {} load steps and no warm start",
                    self.structure.load_steps
                );
                Ok(state)
            }
        }
    }
}

/// Arclength window around `region` widened by one segment on each side.
fn refinement_window(mesh: &Mesh, region: &WettedRegion) -> (f64, f64) {
    let Some((entry, separation)) = region.bounds() else {
        return (0.0, mesh.length());
    };
    let (first, _) = mesh.locate(entry);
    let (last, _) = mesh.locate(separation);
    let before = first.saturating_sub(1);
    let after = (last + 1).min(mesh.element_count() - 1);
    (mesh.segment_bounds(before).0, mesh.segment_bounds(after).1)
}

fn diverged(reason: DivergenceReason, iterations: usize, history: ConvergenceHistory) -> SolveError {
    log::warn!("coupling diverged after {iterations} iterations: {reason}");
    SolveError::Diverged(Box::new(Divergence {
        reason,
        iterations,
        history,
    }))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::analytical::speed_for_wetted_length;
    use crate::errors::{SingularCause, StructuralError};
    use crate::geometry::point;
    use crate::mesh::{Corner, RefinementPolicy, SurfaceDefinition};
    use crate::structure::{EndCondition, StructuralMode};

    fn rigid_request() -> SolveRequest {
        let mut request = SolveRequest::default();
        request.structure.mode = StructuralMode::Rigid;
        request.flow.speed = 6.042;
        request
    }

    #[test]
    fn residual_combination_takes_the_largest() {
        let residuals = Residuals {
            shape: 1e-7,
            pressure: 3e-6,
            region: 0.0,
            force: 2e-6,
            moment: 0.0,
        };
        assert_eq!(residuals.combined(), 3e-6);
        assert!(!residuals.within(&Tolerances::default()));
        assert!(residuals.within(&Tolerances {
            pressure: 5e-6,
            force: 5e-6,
            ..Tolerances::default()
        }));
        let broken = Residuals {
            force: f64::NAN,
            ..residuals
        };
        assert!(!broken.is_finite());
    }

    #[test]
    fn adaptive_relaxation_stops_at_the_floor() {
        let base = Relaxation::default();
        let halved = base.scaled(0.5, 0.05);
        assert_relative_eq!(halved.region, 0.4, epsilon = 1e-15);
        let floored = base.scaled(1.0 / 1024.0, 0.05);
        assert_relative_eq!(floored.shape, 0.05, epsilon = 1e-15);
        assert_relative_eq!(floored.draft, 0.05, epsilon = 1e-15);
        assert_relative_eq!(floored.trim, 0.05, epsilon = 1e-15);
    }

    #[test]
    fn initial_state_is_undeflected_with_its_target_region() {
        let request = rigid_request();
        let state = initial_state(&request).expect("valid request");
        assert_eq!(state.deflection.max_normal(), 0.0);
        assert_eq!(state.draft, request.body.draft);
        assert_eq!(state.trim, state.mesh.trim());
        assert!(state.pressure.panels().is_empty());
        let (entry, separation) = state.region.bounds().expect("initial draft submerges the plate");
        let expected = 1.0 - request.body.draft / state.mesh.trim().sin();
        assert_relative_eq!(entry, expected, epsilon = 1e-9);
        assert_eq!(separation, 1.0);
    }

    #[test]
    fn refinement_window_extends_one_segment_past_the_region() {
        let policy = RefinementPolicy {
            elements: 10,
            clustering: 0.0,
            corner_refinement: 0,
        };
        let mesh = build_mesh(&SurfaceDefinition::default(), &policy).expect("valid mesh");
        let (start, end) = refinement_window(&mesh, &WettedRegion::between(0.45, 0.72));
        assert_relative_eq!(start, 0.3, epsilon = 1e-12);
        assert_relative_eq!(end, 0.9, epsilon = 1e-12);
        assert_eq!(refinement_window(&mesh, &WettedRegion::Dry), (0.0, 1.0));
    }

    #[test]
    fn rigid_plate_converges_and_records_every_iteration() {
        let request = rigid_request();
        let solution = solve(&request, &AtomicBool::new(false)).expect("converges");
        assert_eq!(solution.history.len(), solution.iterations);
        assert!(!solution.retried);
        let last = solution.history.last().expect("at least one iteration");
        assert!(last.residuals.within(&request.coupling.tolerances));
        assert_relative_eq!(solution.state.forces.lift, request.body.weight, max_relative = 1e-4);
    }

    #[test]
    fn singular_pressure_retry_refines_the_mesh_and_doubles_the_panels() {
        let request = rigid_request();
        let mut coupling = Coupling::new(&request);
        let state = coupling.initialize().expect("valid request");
        let fault = ComponentFault::Hydro(HydroError::SingularSystem(SingularCause::Factorization));
        let refined = coupling.retry(state.clone(), fault, 1).expect("region lies on the mesh");
        assert!(coupling.retried);
        assert!(refined.mesh.node_count() > state.mesh.node_count());
        assert_eq!(coupling.hydro.panels, 2 * request.hydro.panels);
        assert_eq!(coupling.hydro.regularization, request.hydro.retry_regularization);

        let pivot = request.body.pivot(&state.shape());
        let coarse = solve_pressure(&state.shape(), &state.region, &request.flow, &request.hydro, pivot)
            .expect("regular system");
        let fine = solve_pressure(&refined.shape(), &refined.region, &request.flow, &coupling.hydro, pivot)
            .expect("regular system");
        assert_eq!(fine.field.panels().len(), 2 * coarse.field.panels().len());
        assert!(fine.field.max_pressure() > coarse.field.max_pressure());

        let solution = coupling
            .run(refined, &AtomicBool::new(false))
            .expect("converges after the retry");
        assert!(solution.retried);
        assert_relative_eq!(solution.state.forces.lift, request.body.weight, max_relative = 1e-4);
    }

    #[test]
    fn structural_retry_restarts_cold_with_more_load_steps() {
        let mut request = rigid_request();
        request.structure.mode = StructuralMode::Nonlinear;
        request.structure.bending_stiffness = 5.0e4;
        request.structure.leading_edge = EndCondition::Free;
        request.structure.trailing_edge = EndCondition::Clamped;
        let mut coupling = Coupling::new(&request);
        let state = coupling.initialize().expect("valid request");
        let fault = ComponentFault::Structural(StructuralError::Divergence {
            load_step: 1,
            iterations: request.structure.max_newton_iterations,
            residual: 1.0,
        });
        let state = coupling.retry(state, fault, 1).expect("mesh is kept");
        assert_eq!(coupling.structure.load_steps, 2 * request.structure.load_steps.max(1));
        assert!(!coupling.warm_start);

        let solution = coupling
            .run(state, &AtomicBool::new(false))
            .expect("converges after the retry");
        assert!(solution.retried);
        assert!(solution.history.last().is_some_and(|last| last.residuals.within(&request.coupling.tolerances)));
    }

    #[test]
    fn repeated_structural_fault_fails_after_one_retry() {
        let mut request = SolveRequest::default();
        request.structure.mode = StructuralMode::Nonlinear;
        request.structure.bending_stiffness = 1.0;
        request.structure.max_newton_iterations = 1;
        let initial = initial_state(&request).expect("valid request");
        let Err(SolveError::Failed(failure)) = solve(&request, &AtomicBool::new(false)) else {
            panic!("a single Newton iteration cannot carry the load");
        };
        assert_eq!(failure.iteration, 1);
        assert!(failure.retried);
        assert_eq!(failure.region, initial.region);
        assert!(matches!(failure.cause, ComponentFault::Structural(_)));
        assert!(failure.history.is_empty());
    }

    #[test]
    fn initial_region_fault_is_retried_and_reported_on_the_trial_interval() {
        let mut request = rigid_request();
        request.surface.corners.push(Corner {
            arclength: 0.8,
            angle_deg: 120.0,
        });
        let Err(SolveError::Failed(failure)) = solve(&request, &AtomicBool::new(false)) else {
            panic!("the surface folds back behind the knuckle");
        };
        assert_eq!(failure.iteration, 0);
        assert!(failure.retried);
        assert!(matches!(
            failure.cause,
            ComponentFault::Hydro(HydroError::SingularSystem(SingularCause::FoldedPanel { .. }))
        ));
        let (entry, end) = failure.region.bounds().expect("surface reaches the water");
        assert!(entry < 0.8);
        assert_relative_eq!(end, request.surface.length, epsilon = 1e-12);
        assert!(failure.history.is_empty());
    }

    #[test]
    fn free_trim_converges_to_the_moment_balance() {
        let mut request = rigid_request();
        request.surface.trim_deg = 3.0;
        request.body.free_in_trim = true;
        request.body.center_of_gravity = Some(point(0.625, 0.0));
        request.flow.speed = speed_for_wetted_length(
            request.body.weight,
            request.flow.density,
            4.0_f64.to_radians(),
            0.5,
        );
        let solution = solve(&request, &AtomicBool::new(false)).expect("converges");
        let state = &solution.state;
        assert_relative_eq!(state.trim, 4.0_f64.to_radians(), max_relative = 0.03);
        assert_relative_eq!(state.region.length(), 0.5, max_relative = 0.03);
        assert_relative_eq!(state.forces.lift, request.body.weight, max_relative = 1e-4);
        let last = solution.history.last().expect("at least one iteration");
        assert!(last.residuals.moment <= request.coupling.tolerances.moment);
        let trims: Vec<f64> = solution.history.records().iter().map(|record| record.trim).collect();
        let limit = request.body.max_trim_step_deg.to_radians();
        for pair in trims.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= limit + 1e-12);
        }
    }

    #[test]
    fn cancelled_solve_reports_the_pending_iteration() {
        let result = solve(&rigid_request(), &AtomicBool::new(true));
        assert_eq!(result, Err(SolveError::Cancelled { iteration: 1 }));
    }

    #[test]
    fn mismatched_warm_start_is_rejected() {
        let request = rigid_request();
        let mut state = initial_state(&request).expect("valid request");
        state.deflection = DeflectionField::zeros(3);
        let result = solve_from(&request, &state, &AtomicBool::new(false));
        assert!(matches!(result, Err(SolveError::InvalidGeometry(_))));
    }
}
