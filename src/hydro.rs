//! Linearized planing-surface pressure over the wetted region.
//!
//! The wetted arclength is split into panels, each carrying a lumped vortex at
//! its quarter point and a collocation point at its three-quarter point. The
//! flow tangency condition at the collocation points gives a dense linear system
//! for the vortex strengths; the quarter/three-quarter placement makes the
//! pressure decay smoothly towards the separation edge without an extra
//! constraint row.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::errors::{HydroError, SingularCause};
use crate::geometry::Point;
use crate::mesh::Mesh;
use crate::region::WettedRegion;
use crate::shape::Shape;

/// Free stream and fluid properties.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConditions {
    /// Free-stream speed in m/s.
    pub speed: f64,
    /// Fluid density in kg/m³.
    pub density: f64,
    /// Gravitational acceleration in m/s².
    pub gravity: f64,
}

impl Default for FlowConditions {
    fn default() -> Self {
        Self {
            speed: 6.0,
            density: 1000.0,
            gravity: 9.81,
        }
    }
}

impl FlowConditions {
    /// Stagnation (dynamic) pressure `½ρU²`.
    #[must_use]
    pub fn dynamic_pressure(&self) -> f64 {
        0.5 * self.density * self.speed * self.speed
    }
}

/// Discretization controls for the pressure solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydroSettings {
    /// Number of panels over the wetted region.
    pub panels: usize,
    /// Tikhonov regularization weight relative to the mean diagonal of `AᵀA`.
    pub regularization: f64,
    /// Regularization switched on when a singular system is retried.
    pub retry_regularization: f64,
    /// Clamp pressures to the stagnation pressure.
    pub limit_to_stagnation: bool,
}

impl Default for HydroSettings {
    fn default() -> Self {
        Self {
            panels: 40,
            regularization: 0.0,
            retry_regularization: 1.0e-8,
            limit_to_stagnation: false,
        }
    }
}

/// One pressure panel of the wetted region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    /// Upstream arclength bound.
    pub start: f64,
    /// Downstream arclength bound.
    pub end: f64,
    /// Arclength of the vortex point the pressure is attributed to.
    pub vortex: f64,
    /// Panel pressure in Pa.
    pub pressure: f64,
}

/// Piecewise constant pressure on the wetted region.
///
/// An empty field means the surface is dry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureField {
    panels: Vec<Panel>,
}

/// Pressure averaged over one mesh segment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementPressure {
    /// Mean pressure over the segment in Pa; exactly zero when dry.
    pub pressure: f64,
    /// Whether any part of the segment lies inside the wetted region.
    pub wetted: bool,
}

impl PressureField {
    /// Create a field from panels ordered by arclength.
    #[must_use]
    pub fn new(panels: Vec<Panel>) -> Self {
        Self { panels }
    }

    /// Panels ordered from leading to trailing edge.
    #[must_use]
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Pressure at arclength `s`, zero outside the panels.
    #[must_use]
    pub fn pressure_at(&self, s: f64) -> f64 {
        self.panels
            .iter()
            .find(|panel| (panel.start..=panel.end).contains(&s))
            .map_or(0.0, |panel| panel.pressure)
    }

    /// Arclength interval covered by the panels.
    #[must_use]
    pub fn region(&self) -> WettedRegion {
        match (self.panels.first(), self.panels.last()) {
            (Some(first), Some(last)) => WettedRegion::between(first.start, last.end),
            _ => WettedRegion::Dry,
        }
    }

    /// Largest panel pressure.
    #[must_use]
    pub fn max_pressure(&self) -> f64 {
        self.panels
            .iter()
            .map(|panel| panel.pressure)
            .fold(0.0, f64::max)
    }

    /// Integral of the pressure along the arclength.
    #[must_use]
    pub fn resultant(&self) -> f64 {
        self.panels
            .iter()
            .map(|panel| panel.pressure * (panel.end - panel.start))
            .sum()
    }

    /// Average the panel pressures onto the segments of `mesh`.
    #[must_use]
    pub fn element_pressures(&self, mesh: &Mesh, region: &WettedRegion) -> Vec<ElementPressure> {
        (0..mesh.element_count())
            .map(|segment| {
                let (start, end) = mesh.segment_bounds(segment);
                let wetted = region.overlap(start, end) > 0.0;
                let force: f64 = self
                    .panels
                    .iter()
                    .map(|panel| panel.pressure * (panel.end.min(end) - panel.start.max(start)).max(0.0))
                    .sum();
                ElementPressure {
                    pressure: if wetted { force / (end - start) } else { 0.0 },
                    wetted,
                }
            })
            .collect()
    }
}

/// Hydrodynamic force resultants per unit span.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HydroForces {
    /// Vertical force in N/m.
    pub lift: f64,
    /// Horizontal (downstream) force in N/m.
    pub drag: f64,
    /// Counter-clockwise moment about the pivot in N·m/m.
    pub moment: f64,
}

/// Pressure field with its resultants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HydroSolution {
    /// Non-negative panel pressures.
    pub field: PressureField,
    /// Force resultants of `field`.
    pub forces: HydroForces,
}

/// Panel layout and unclamped pressures of one solve.
pub(crate) struct PanelSolution {
    /// `panels + 1` arclength bounds.
    pub bounds: Vec<f64>,
    /// Vortex point arclength of each panel.
    pub vortices: Vec<f64>,
    /// Signed pressure of each panel.
    pub pressures: Vec<f64>,
}

/// Solve for the pressure acting on `shape` over `region`.
///
/// A dry region yields an empty field and zero forces. The moment is taken about
/// `pivot`.
///
/// # Errors
///
/// Returns [`HydroError::SingularSystem`] when the region is degenerate, a panel
/// folds back or the influence system cannot be solved.
pub fn solve_pressure(
    shape: &Shape<'_>,
    region: &WettedRegion,
    flow: &FlowConditions,
    settings: &HydroSettings,
    pivot: Point,
) -> Result<HydroSolution, HydroError> {
    let Some((entry, separation)) = region.bounds() else {
        return Ok(HydroSolution::default());
    };
    let solution = solve_panels(shape, entry, separation, flow, settings)?;
    let ceiling = if settings.limit_to_stagnation {
        flow.dynamic_pressure()
    } else {
        f64::INFINITY
    };
    let panels = solution
        .bounds
        .windows(2)
        .zip(solution.vortices.iter().zip(&solution.pressures))
        .map(|(bounds, (&vortex, &pressure))| Panel {
            start: bounds[0],
            end: bounds[1],
            vortex,
            pressure: pressure.clamp(0.0, ceiling),
        })
        .collect();
    let field = PressureField::new(panels);
    let forces = integrate_forces(shape, &field, pivot);
    Ok(HydroSolution { field, forces })
}

/// Integrate the panel pressures of `field` into lift, drag and moment.
#[must_use]
pub fn integrate_forces(shape: &Shape<'_>, field: &PressureField, pivot: Point) -> HydroForces {
    field
        .panels()
        .iter()
        .fold(HydroForces::default(), |total, panel| {
            let upstream = shape.point(panel.start);
            let downstream = shape.point(panel.end);
            let middle = shape.point(0.5 * (panel.start + panel.end));
            let dx = downstream.x - upstream.x;
            let dy = downstream.y - upstream.y;
            let (fx, fy) = (-panel.pressure * dy, panel.pressure * dx);
            HydroForces {
                lift: total.lift + fy,
                drag: total.drag + fx,
                moment: total.moment + (middle.x - pivot.x) * fy - (middle.y - pivot.y) * fx,
            }
        })
}

/// Assemble and solve the influence system over `[entry, separation]`.
pub(crate) fn solve_panels(
    shape: &Shape<'_>,
    entry: f64,
    separation: f64,
    flow: &FlowConditions,
    settings: &HydroSettings,
) -> Result<PanelSolution, HydroError> {
    let span = separation - entry;
    if !(span > 1.0e-9 * shape.length()) {
        return Err(HydroError::SingularSystem(SingularCause::DegenerateRegion {
            length: span,
        }));
    }
    let count = settings.panels.max(1);
    #[allow(clippy::cast_precision_loss)]
    let width = span / count as f64;
    #[allow(clippy::cast_precision_loss)]
    let mut bounds: Vec<f64> = (0..=count).map(|k| entry + width * k as f64).collect();
    bounds[count] = separation;

    let vortices: Vec<f64> = bounds
        .windows(2)
        .map(|pair| pair[0] + 0.25 * (pair[1] - pair[0]))
        .collect();
    let collocation: Vec<f64> = bounds
        .windows(2)
        .map(|pair| pair[0] + 0.75 * (pair[1] - pair[0]))
        .collect();
    let vortex_x: Vec<f64> = vortices.iter().map(|&s| shape.point(s).x).collect();
    let mut projected = Vec::with_capacity(count);
    for (panel, pair) in bounds.windows(2).enumerate() {
        let dx = shape.point(pair[1]).x - shape.point(pair[0]).x;
        if !(dx > 0.0) {
            return Err(HydroError::SingularSystem(SingularCause::FoldedPanel { panel }));
        }
        projected.push(dx);
    }

    let influence = DMatrix::from_fn(count, count, |row, col| {
        let xc = shape.point(collocation[row]).x;
        1.0 / (PI * (xc - vortex_x[col]))
    });
    let tangency = DVector::from_iterator(count, collocation.iter().map(|&s| -shape.slope(s)));
    let strengths = solve_influence(influence, &tangency, settings.regularization)?;
    if !strengths.iter().all(|value| value.is_finite()) {
        return Err(HydroError::SingularSystem(SingularCause::NonFinite));
    }

    let head = flow.density * flow.speed * flow.speed;
    let pressures = strengths
        .iter()
        .zip(&projected)
        .map(|(strength, dx)| head * strength / dx)
        .collect();
    Ok(PanelSolution {
        bounds,
        vortices,
        pressures,
    })
}

fn solve_influence(
    influence: DMatrix<f64>,
    tangency: &DVector<f64>,
    regularization: f64,
) -> Result<DVector<f64>, HydroError> {
    let solution = if regularization > 0.0 {
        let transpose = influence.transpose();
        let mut normal = &transpose * &influence;
        #[allow(clippy::cast_precision_loss)]
        let shift = regularization * normal.trace() / normal.nrows() as f64;
        for i in 0..normal.nrows() {
            normal[(i, i)] += shift;
        }
        normal.lu().solve(&(transpose * tangency))
    } else {
        influence.lu().solve(tangency)
    };
    solution.ok_or(HydroError::SingularSystem(SingularCause::Factorization))
}
