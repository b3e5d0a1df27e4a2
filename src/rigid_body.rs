//! Heave and trim balance of the planing body.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::errors::HydroError;
use crate::geometry::{Placement, Point};
use crate::hydro::{solve_pressure, FlowConditions, HydroForces, HydroSettings};
use crate::mesh::Mesh;
use crate::shape::Shape;
use crate::structure::{DeflectionField, StructuralProperties};
use crate::tracker::{target_region, TrackerSettings};

/// Rigid-body degrees of freedom and loading of the planing body.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBody {
    /// Solve for the draft that carries the weight; otherwise `draft` is held.
    pub free_in_draft: bool,
    /// Solve for the trim that balances the moment; otherwise the surface trim is held.
    pub free_in_trim: bool,
    /// Trailing edge draft in metres; the initial guess when free in draft.
    pub draft: f64,
    /// Weight per unit span carried by the surface in N/m, excluding the surface's own mass.
    pub weight: f64,
    /// Arclength of the moment reference point; mid-length when absent.
    pub pivot_arclength: Option<f64>,
    /// Body-frame centre of gravity `(ξ, η)`; the weight acts at the pivot when absent.
    pub center_of_gravity: Option<Point>,
    /// Largest draft change per outer iteration and per secant step in metres.
    pub max_draft_step: f64,
    /// Largest trim change per outer iteration and per secant step in degrees.
    pub max_trim_step_deg: f64,
    /// Force and moment imbalance accepted by the inner balances, relative to the weight.
    pub heave_tolerance: f64,
    /// Secant iterations allowed per balance.
    pub max_heave_iterations: usize,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            free_in_draft: true,
            free_in_trim: false,
            draft: 0.03,
            weight: 2000.0,
            pivot_arclength: None,
            center_of_gravity: None,
            max_draft_step: 0.05,
            max_trim_step_deg: 0.5,
            heave_tolerance: 1.0e-9,
            max_heave_iterations: 25,
        }
    }
}

/// Draft and trim of the body.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    /// Trailing edge draft in metres.
    pub draft: f64,
    /// Trim in radians, positive bow up.
    pub trim: f64,
}

impl RigidBody {
    /// Total lift the flow must supply, including the self-weight of the surface.
    #[must_use]
    pub fn required_lift(&self, structure: &StructuralProperties, flow: &FlowConditions, length: f64) -> f64 {
        self.weight + structure.mass_per_length * flow.gravity * length
    }

    /// Moment reference point on the deformed `shape`.
    #[must_use]
    pub fn pivot(&self, shape: &Shape<'_>) -> Point {
        shape.point(self.pivot_arclength.unwrap_or(0.5 * shape.length()))
    }

    /// Counter-clockwise moment about the pivot that the pressure must supply.
    ///
    /// This is the moment of the weight at the centre of gravity plus that of the
    /// surface mass distributed along the deformed `shape`.
    #[must_use]
    pub fn required_moment(
        &self,
        shape: &Shape<'_>,
        structure: &StructuralProperties,
        flow: &FlowConditions,
    ) -> f64 {
        let pivot = self.pivot(shape);
        let gravity_center = self
            .center_of_gravity
            .map_or(pivot, |body_point| shape.placement().place(body_point));
        let mesh = shape.mesh();
        let surface: f64 = shape
            .node_positions()
            .windows(2)
            .enumerate()
            .map(|(segment, pair)| mesh.segment_length(segment) * (0.5 * (pair[0].x + pair[1].x) - pivot.x))
            .sum();
        self.weight * (gravity_center.x - pivot.x) + structure.mass_per_length * flow.gravity * surface
    }

    /// Outer-iteration attitude update moving a relaxed fraction of the way to `balanced`.
    ///
    /// Held degrees of freedom do not move. When either step exceeds its limit,
    /// both are scaled by the same factor so the update keeps its direction.
    #[must_use]
    pub fn relaxed_attitude(
        &self,
        current: Attitude,
        balanced: Attitude,
        draft_relaxation: f64,
        trim_relaxation: f64,
    ) -> Attitude {
        let draft_step = if self.free_in_draft {
            draft_relaxation * (balanced.draft - current.draft)
        } else {
            0.0
        };
        let trim_step = if self.free_in_trim {
            trim_relaxation * (balanced.trim - current.trim)
        } else {
            0.0
        };
        let allowed = |step: f64, limit: f64| {
            if step.abs() > limit {
                limit / step.abs()
            } else {
                1.0
            }
        };
        let scale = allowed(draft_step, self.max_draft_step).min(allowed(trim_step, self.max_trim_step()));
        Attitude {
            draft: current.draft + scale * draft_step,
            trim: current.trim + scale * trim_step,
        }
    }

    fn max_trim_step(&self) -> f64 {
        self.max_trim_step_deg.to_radians()
    }
}

/// Result of one heave balance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeaveBalance {
    /// Draft at which the lift matches the required lift.
    pub draft: f64,
    /// Lift evaluated at `draft`.
    pub lift: f64,
    /// Secant iterations performed.
    pub iterations: usize,
    /// Whether the imbalance reached the tolerance.
    pub converged: bool,
}

/// Result of one trim balance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrimBalance {
    /// Attitude at which the moment balances; the draft is re-balanced when free.
    pub attitude: Attitude,
    /// Hydrodynamic moment about the pivot at `attitude`.
    pub moment: f64,
    /// Moment of the weight about the pivot at `attitude`.
    pub required_moment: f64,
    /// Secant iterations performed.
    pub iterations: usize,
    /// Whether the imbalance reached the tolerance.
    pub converged: bool,
}

/// A deflected surface whose attitude is still to be found.
#[derive(Clone, Copy, Debug)]
pub struct TrialSurface<'a> {
    /// Mesh of the surface.
    pub mesh: &'a Mesh,
    /// Current elastic deflection.
    pub deflection: &'a DeflectionField,
    /// Trim in radians the surface is placed at.
    pub trim: f64,
    /// Free stream.
    pub flow: &'a FlowConditions,
    /// Pressure discretization.
    pub hydro: &'a HydroSettings,
    /// Region criteria.
    pub tracker: &'a TrackerSettings,
}

impl<'a> TrialSurface<'a> {
    /// Deformed surface placed at `draft` and the trial trim.
    #[must_use]
    pub fn shape_at(&self, draft: f64) -> Shape<'a> {
        Shape::new(
            self.mesh,
            self.deflection,
            Placement::new(draft, self.trim, self.mesh.chord()),
        )
    }

    /// Force resultants over the undamped wetted region at `draft`, with the moment about the pivot of `body`.
    ///
    /// # Errors
    ///
    /// Propagates failures of the region and pressure solves.
    pub fn forces_at(&self, draft: f64, body: &RigidBody) -> Result<HydroForces, HydroError> {
        let shape = self.shape_at(draft);
        let region = target_region(&shape, self.flow, self.hydro, self.tracker)?;
        let solution = solve_pressure(&shape, &region, self.flow, self.hydro, body.pivot(&shape))?;
        Ok(solution.forces)
    }

    /// Lift carried over the undamped wetted region at `draft`.
    ///
    /// # Errors
    ///
    /// Propagates failures of the region and pressure solves.
    pub fn lift_at(&self, draft: f64) -> Result<f64, HydroError> {
        let shape = self.shape_at(draft);
        let region = target_region(&shape, self.flow, self.hydro, self.tracker)?;
        let solution = solve_pressure(&shape, &region, self.flow, self.hydro, Point::default())?;
        Ok(solution.forces.lift)
    }
}

/// Find the draft at which `surface` supports `required_lift`, starting from `draft`.
///
/// The first step uses the flat-plate heave stiffness `(π/2)ρU²`; later steps are
/// secant updates, each limited to `body.max_draft_step`.
///
/// # Errors
///
/// Propagates failures of the trial pressure solves.
pub fn equilibrate_draft(
    surface: &TrialSurface<'_>,
    body: &RigidBody,
    draft: f64,
    required_lift: f64,
) -> Result<HeaveBalance, HydroError> {
    let stiffness = 0.5 * PI * surface.flow.density * surface.flow.speed * surface.flow.speed;
    let tolerance = body.heave_tolerance * required_lift.abs().max(f64::MIN_POSITIVE);
    let limit = |step: f64| step.clamp(-body.max_draft_step, body.max_draft_step);

    let mut previous = draft;
    let mut lift = surface.lift_at(previous)?;
    let mut previous_imbalance = lift - required_lift;
    if previous_imbalance.abs() <= tolerance || !(stiffness > 0.0) {
        return Ok(HeaveBalance {
            draft,
            lift,
            iterations: 0,
            converged: previous_imbalance.abs() <= tolerance,
        });
    }

    let mut current = previous - limit(previous_imbalance / stiffness);
    for iteration in 1..=body.max_heave_iterations {
        lift = surface.lift_at(current)?;
        let imbalance = lift - required_lift;
        if imbalance.abs() <= tolerance {
            return Ok(HeaveBalance {
                draft: current,
                lift,
                iterations: iteration,
                converged: true,
            });
        }
        if imbalance == previous_imbalance {
            break;
        }
        let step = limit(imbalance * (current - previous) / (imbalance - previous_imbalance));
        previous = current;
        previous_imbalance = imbalance;
        current -= step;
    }
    log::debug!("heave balance stalled at draft {current:.6} (lift {lift:.3}, required {required_lift:.3})");
    Ok(HeaveBalance {
        draft: current,
        lift,
        iterations: body.max_heave_iterations,
        converged: false,
    })
}

/// Find the trim at which the pressure moment of `surface` balances the weight.
///
/// Every trial trim re-balances heave first when the body is free in draft. The
/// first step is a finite difference of one tenth of `body.max_trim_step_deg`;
/// later steps are secant updates limited to `body.max_trim_step_deg`.
///
/// # Errors
///
/// Propagates failures of the trial pressure solves.
pub fn equilibrate_trim(
    surface: &TrialSurface<'_>,
    body: &RigidBody,
    structure: &StructuralProperties,
    start: Attitude,
    required_lift: f64,
) -> Result<TrimBalance, HydroError> {
    let max_step = body.max_trim_step();
    let tolerance =
        body.heave_tolerance * (required_lift.abs() * surface.mesh.length()).max(f64::MIN_POSITIVE);
    let mut draft = start.draft;
    let mut balance_at = |trim: f64| -> Result<TrimBalance, HydroError> {
        let trial = TrialSurface { trim, ..*surface };
        if body.free_in_draft {
            draft = equilibrate_draft(&trial, body, draft, required_lift)?.draft;
        }
        Ok(TrimBalance {
            attitude: Attitude { draft, trim },
            moment: trial.forces_at(draft, body)?.moment,
            required_moment: body.required_moment(&trial.shape_at(draft), structure, surface.flow),
            iterations: 0,
            converged: false,
        })
    };
    let imbalance = |balance: &TrimBalance| balance.moment - balance.required_moment;

    let mut previous = balance_at(start.trim)?;
    if imbalance(&previous).abs() <= tolerance {
        return Ok(TrimBalance {
            converged: true,
            ..previous
        });
    }
    let mut current = balance_at(start.trim + 0.1 * max_step)?;
    for iteration in 1..=body.max_heave_iterations {
        let (before, now) = (imbalance(&previous), imbalance(&current));
        if now.abs() <= tolerance {
            return Ok(TrimBalance {
                iterations: iteration,
                converged: true,
                ..current
            });
        }
        if now == before {
            break;
        }
        let slope = (now - before) / (current.attitude.trim - previous.attitude.trim);
        let next = current.attitude.trim - (now / slope).clamp(-max_step, max_step);
        previous = current;
        current = balance_at(next)?;
    }
    log::debug!(
        "trim balance stalled at {:.4} deg (moment {:.3}, required {:.3})",
        current.attitude.trim.to_degrees(),
        current.moment,
        current.required_moment
    );
    Ok(TrimBalance {
        iterations: body.max_heave_iterations,
        ..current
    })
}
