//! Free-boundary tracking of the spray root and the separation point.

use serde::{Deserialize, Serialize};

use crate::errors::HydroError;
use crate::hydro::{solve_panels, FlowConditions, HydroSettings};
use crate::region::WettedRegion;
use crate::shape::Shape;

/// How the upstream end of the wetting is located.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryCondition {
    /// The flow attaches where the deformed surface crosses the free surface.
    #[default]
    FreeSurfaceIntersection,
    /// The flow always attaches at the leading edge.
    FixedLeadingEdge,
}

/// Controls for the region update.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Entry criterion.
    pub entry: EntryCondition,
    /// Regions shorter than this arclength are treated as dry.
    pub min_wetted_length: f64,
    /// Largest endpoint movement per update, as a fraction of the surface length.
    pub max_region_step: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            entry: EntryCondition::FreeSurfaceIntersection,
            min_wetted_length: 1.0e-3,
            max_region_step: 0.25,
        }
    }
}

/// Arclength at which the flow attaches, or `None` if the surface never reaches the water.
fn entry_point(shape: &Shape<'_>, condition: EntryCondition) -> Option<f64> {
    if condition == EntryCondition::FixedLeadingEdge {
        return Some(0.0);
    }
    let arclengths = shape.mesh().arclengths();
    let heights: Vec<f64> = shape.node_positions().iter().map(|point| point.y).collect();
    if heights[0] <= 0.0 {
        return Some(0.0);
    }
    heights
        .windows(2)
        .zip(arclengths.windows(2))
        .find(|(y, _)| y[1] <= 0.0)
        .map(|(y, s)| s[0] + (s[1] - s[0]) * y[0] / (y[0] - y[1]))
}

/// Interval `[entry, L]` on which [`target_region`] runs its trial solve.
#[must_use]
pub fn trial_region(shape: &Shape<'_>, tracker: &TrackerSettings) -> WettedRegion {
    entry_point(shape, tracker.entry)
        .map_or(WettedRegion::Dry, |entry| WettedRegion::between(entry, shape.length()))
}

/// Undamped wetted region implied by the current shape.
///
/// # Errors
///
/// Returns the [`HydroError`] of the trial pressure solve over `[entry, L]`.
pub fn target_region(
    shape: &Shape<'_>,
    flow: &FlowConditions,
    hydro: &HydroSettings,
    tracker: &TrackerSettings,
) -> Result<WettedRegion, HydroError> {
    let length = shape.length();
    let Some(entry) = entry_point(shape, tracker.entry) else {
        return Ok(WettedRegion::Dry);
    };
    if length - entry < tracker.min_wetted_length {
        return Ok(WettedRegion::Dry);
    }

    let trial = solve_panels(shape, entry, length, flow, hydro)?;
    if trial.pressures.first().map_or(true, |&pressure| pressure <= 0.0) {
        return Ok(WettedRegion::Dry);
    }
    let separation = trial
        .pressures
        .windows(2)
        .zip(trial.vortices.windows(2))
        .find(|(pressure, _)| pressure[1] <= 0.0)
        .map_or(length, |(pressure, vortex)| {
            vortex[0] + (vortex[1] - vortex[0]) * pressure[0] / (pressure[0] - pressure[1])
        });

    let region = WettedRegion::between(entry, separation);
    Ok(if region.length() < tracker.min_wetted_length {
        WettedRegion::Dry
    } else {
        region
    })
}

/// Move `previous` towards `target` by `relaxation`, limited per endpoint.
#[must_use]
pub fn damp_region(
    previous: &WettedRegion,
    target: &WettedRegion,
    relaxation: f64,
    tracker: &TrackerSettings,
    length: f64,
) -> WettedRegion {
    let (old, new) = match (previous.bounds(), target.bounds()) {
        (None, None) => return WettedRegion::Dry,
        (Some(old), Some(new)) => (old, new),
        (None, Some(new)) => ((new.1, new.1), new),
        (Some(old), None) => (old, (old.1, old.1)),
    };
    let limit = tracker.max_region_step * length;
    let step = |from: f64, to: f64| from + (relaxation * (to - from)).clamp(-limit, limit);
    let damped = WettedRegion::between(step(old.0, new.0), step(old.1, new.1));
    if damped.length() < tracker.min_wetted_length {
        *target
    } else {
        damped
    }
}

/// Damped wetted region for the next outer iteration.
///
/// # Errors
///
/// Propagates failures of the trial pressure solve.
pub fn update_wetted_region(
    shape: &Shape<'_>,
    previous: &WettedRegion,
    flow: &FlowConditions,
    hydro: &HydroSettings,
    tracker: &TrackerSettings,
    relaxation: f64,
) -> Result<WettedRegion, HydroError> {
    let target = target_region(shape, flow, hydro, tracker)?;
    if target.is_dry() && !previous.is_dry() {
        log::debug!("wetted region collapses from {:.4} m", previous.length());
    }
    Ok(damp_region(previous, &target, relaxation, tracker, shape.length()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::analytical::FlatPlate;
    use crate::geometry::Placement;
    use crate::mesh::{build_mesh, Mesh, RefinementPolicy, SurfaceDefinition};
    use crate::structure::DeflectionField;

    fn flat_mesh() -> Mesh {
        build_mesh(&SurfaceDefinition::default(), &RefinementPolicy::default()).expect("valid mesh")
    }

    fn flow() -> FlowConditions {
        FlowConditions::default()
    }

    #[test]
    fn rigid_plate_wets_aft_of_the_waterline() {
        let mesh = flat_mesh();
        let deflection = DeflectionField::zeros(mesh.node_count());
        let trim = mesh.trim();
        let draft = FlatPlate::new(&flow(), trim).draft(0.4);
        let shape = Shape::new(&mesh, &deflection, Placement::new(draft, trim, mesh.chord()));
        let region = target_region(&shape, &flow(), &HydroSettings::default(), &TrackerSettings::default())
            .expect("trial solve succeeds");
        let (entry, separation) = region.bounds().expect("plate is wetted");
        assert_relative_eq!(entry, 0.6, epsilon = 1e-9);
        assert_eq!(separation, 1.0);
    }

    #[test]
    fn trial_interval_runs_from_the_waterline_to_the_trailing_edge() {
        let mesh = flat_mesh();
        let deflection = DeflectionField::zeros(mesh.node_count());
        let trim = mesh.trim();
        let draft = FlatPlate::new(&flow(), trim).draft(0.4);
        let shape = Shape::new(&mesh, &deflection, Placement::new(draft, trim, mesh.chord()));
        let (entry, end) = trial_region(&shape, &TrackerSettings::default())
            .bounds()
            .expect("plate reaches the water");
        assert_relative_eq!(entry, 0.6, epsilon = 1e-9);
        assert_eq!(end, 1.0);
        let raised = Shape::new(&mesh, &deflection, Placement::new(-0.01, trim, mesh.chord()));
        assert!(trial_region(&raised, &TrackerSettings::default()).is_dry());
    }

    #[test]
    fn surface_above_the_water_is_dry() {
        let mesh = flat_mesh();
        let deflection = DeflectionField::zeros(mesh.node_count());
        let shape = Shape::new(&mesh, &deflection, Placement::new(-0.01, mesh.trim(), mesh.chord()));
        let region = target_region(&shape, &flow(), &HydroSettings::default(), &TrackerSettings::default())
            .expect("nothing to solve");
        assert!(region.is_dry());
    }

    #[test]
    fn still_water_separates_immediately() {
        let mesh = flat_mesh();
        let deflection = DeflectionField::zeros(mesh.node_count());
        let shape = Shape::new(&mesh, &deflection, Placement::new(0.02, mesh.trim(), mesh.chord()));
        let still = FlowConditions {
            speed: 0.0,
            ..flow()
        };
        let region = target_region(&shape, &still, &HydroSettings::default(), &TrackerSettings::default())
            .expect("trial solve succeeds");
        assert_eq!(region, WettedRegion::Dry);
    }

    #[test]
    fn fixed_leading_edge_wets_the_whole_surface() {
        let mesh = flat_mesh();
        let deflection = DeflectionField::zeros(mesh.node_count());
        let shape = Shape::new(&mesh, &deflection, Placement::new(0.1, mesh.trim(), mesh.chord()));
        let tracker = TrackerSettings {
            entry: EntryCondition::FixedLeadingEdge,
            ..TrackerSettings::default()
        };
        let region = target_region(&shape, &flow(), &HydroSettings::default(), &tracker)
            .expect("trial solve succeeds");
        assert_eq!(region, WettedRegion::between(0.0, 1.0));
    }

    #[test]
    fn hollow_surface_separates_before_the_trailing_edge() {
        let surface = SurfaceDefinition {
            camber: -0.05,
            trim_deg: 2.0,
            ..SurfaceDefinition::default()
        };
        let mesh = build_mesh(&surface, &RefinementPolicy::default()).expect("valid mesh");
        let deflection = DeflectionField::zeros(mesh.node_count());
        let shape = Shape::new(&mesh, &deflection, Placement::new(0.01, mesh.trim(), mesh.chord()));
        let region = target_region(&shape, &flow(), &HydroSettings::default(), &TrackerSettings::default())
            .expect("trial solve succeeds");
        let (entry, separation) = region.bounds().expect("wetted");
        assert!(entry > 0.0);
        assert!(separation < 1.0);
    }

    #[test]
    fn damping_bounds_every_endpoint_step() {
        let tracker = TrackerSettings {
            max_region_step: 0.1,
            ..TrackerSettings::default()
        };
        let previous = WettedRegion::between(0.5, 1.0);
        let target = WettedRegion::between(0.2, 0.96);
        let damped = damp_region(&previous, &target, 0.8, &tracker, 1.0);
        let (entry, separation) = damped.bounds().expect("still wetted");
        assert_relative_eq!(entry, 0.4, epsilon = 1e-12);
        assert_relative_eq!(separation, 0.968, epsilon = 1e-12);
    }

    #[test]
    fn damping_grows_a_region_out_of_the_dry_state() {
        let tracker = TrackerSettings::default();
        let target = WettedRegion::between(0.5, 1.0);
        let damped = damp_region(&WettedRegion::Dry, &target, 0.8, &tracker, 1.0);
        assert_eq!(damped, WettedRegion::between(0.75, 1.0));
        let unlimited = TrackerSettings {
            max_region_step: 1.0,
            ..tracker
        };
        let collapsed = damp_region(&target, &WettedRegion::Dry, 1.0, &unlimited, 1.0);
        assert_eq!(collapsed, WettedRegion::Dry);
    }
}
