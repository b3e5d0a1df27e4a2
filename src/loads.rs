//! Consistent nodal loads for the beam model.

use nalgebra::{DVector, Vector2};

use crate::element::{hermite, hermite_integral};
use crate::hydro::PressureField;
use crate::mesh::Mesh;
use crate::structure::{PointLoad, StructuralProperties, DOFS_PER_NODE};

/// Distributed and concentrated loads acting on the surface.
#[derive(Clone, Copy, Debug)]
pub struct StructuralLoad<'a> {
    /// Hydrodynamic pressure on the wetted side.
    pub pressure: &'a PressureField,
    /// Uniform pressure on the dry side, pushing towards the fluid.
    pub internal_pressure: f64,
    /// Concentrated loads.
    pub point_loads: &'a [PointLoad],
    /// Self-weight per unit length resolved into `(axial, normal)` body components.
    pub weight: Vector2<f64>,
}

impl<'a> StructuralLoad<'a> {
    /// Combine the hydrodynamic pressure with the external loads of `properties`.
    ///
    /// `gravity_direction` is the global downward unit vector expressed in the body
    /// frame and `gravity` the gravitational acceleration.
    #[must_use]
    pub fn new(
        pressure: &'a PressureField,
        properties: &'a StructuralProperties,
        gravity_direction: Vector2<f64>,
        gravity: f64,
    ) -> Self {
        Self {
            pressure,
            internal_pressure: properties.internal_pressure,
            point_loads: &properties.point_loads,
            weight: properties.mass_per_length * gravity * gravity_direction,
        }
    }

    /// Load made of the hydrodynamic pressure alone.
    #[must_use]
    pub fn pressure_only(pressure: &'a PressureField) -> Self {
        Self {
            pressure,
            internal_pressure: 0.0,
            point_loads: &[],
            weight: Vector2::zeros(),
        }
    }

    /// Assemble the global load vector on `mesh`.
    #[must_use]
    pub fn assemble(&self, mesh: &Mesh) -> DVector<f64> {
        let mut load = DVector::zeros(mesh.node_count() * DOFS_PER_NODE);
        let uniform_normal = self.weight.y - self.internal_pressure;
        for (index, segment) in mesh.segments().iter().enumerate() {
            let (start, end) = mesh.segment_bounds(index);
            let h = end - start;
            let transverse = [
                segment.start * DOFS_PER_NODE + 1,
                segment.start * DOFS_PER_NODE + 2,
                segment.end * DOFS_PER_NODE + 1,
                segment.end * DOFS_PER_NODE + 2,
            ];

            // Panels are piecewise constant, so each overlap integrates exactly.
            for panel in self.pressure.panels() {
                let from = panel.start.max(start);
                let to = panel.end.min(end);
                if to <= from || panel.pressure == 0.0 {
                    continue;
                }
                let lower = hermite_integral((from - start) / h, h);
                let upper = hermite_integral((to - start) / h, h);
                for (k, &dof) in transverse.iter().enumerate() {
                    load[dof] += panel.pressure * h * (upper[k] - lower[k]);
                }
            }

            let whole = hermite_integral(1.0, h);
            for (k, &dof) in transverse.iter().enumerate() {
                load[dof] += uniform_normal * h * whole[k];
            }
            load[segment.start * DOFS_PER_NODE] += 0.5 * self.weight.x * h;
            load[segment.end * DOFS_PER_NODE] += 0.5 * self.weight.x * h;
        }

        for point_load in self.point_loads {
            let (index, t) = mesh.locate(point_load.arclength);
            let segment = mesh.segments()[index];
            let h = mesh.segment_length(index);
            let shape = hermite(t, h);
            let start = segment.start * DOFS_PER_NODE;
            let end = segment.end * DOFS_PER_NODE;
            load[start] += (1.0 - t) * point_load.axial;
            load[end] += t * point_load.axial;
            for (value, dof) in shape.iter().zip([start + 1, start + 2, end + 1, end + 2]) {
                load[dof] += value * point_load.normal;
            }
        }
        load
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::hydro::Panel;
    use crate::mesh::{build_mesh, RefinementPolicy, SurfaceDefinition};

    fn mesh() -> Mesh {
        let policy = RefinementPolicy {
            elements: 4,
            clustering: 0.0,
            corner_refinement: 0,
        };
        build_mesh(&SurfaceDefinition::default(), &policy).expect("valid mesh")
    }

    fn total_normal(load: &DVector<f64>) -> f64 {
        load.iter().skip(1).step_by(DOFS_PER_NODE).sum()
    }

    #[test]
    fn panel_pressure_resultant_is_preserved() {
        let field = PressureField::new(vec![
            Panel {
                start: 0.1,
                end: 0.4,
                vortex: 0.175,
                pressure: 1_000.0,
            },
            Panel {
                start: 0.4,
                end: 0.7,
                vortex: 0.475,
                pressure: 500.0,
            },
        ]);
        let load = StructuralLoad::pressure_only(&field).assemble(&mesh());
        assert_relative_eq!(total_normal(&load), 450.0, epsilon = 1e-9);
        assert_eq!(load[0], 0.0);
        assert_eq!(load[12 + 1], 0.0);
    }

    #[test]
    fn self_weight_splits_along_the_chord() {
        let trim = 4.0_f64.to_radians();
        let properties = StructuralProperties {
            mass_per_length: 10.0,
            ..StructuralProperties::default()
        };
        let field = PressureField::default();
        let gravity = Vector2::new(trim.sin(), -trim.cos());
        let load = StructuralLoad::new(&field, &properties, gravity, 9.81).assemble(&mesh());
        assert_relative_eq!(total_normal(&load), -98.1 * trim.cos(), epsilon = 1e-9);
        let axial: f64 = load.iter().step_by(DOFS_PER_NODE).sum();
        assert_relative_eq!(axial, 98.1 * trim.sin(), epsilon = 1e-9);
    }

    #[test]
    fn point_load_is_shared_by_the_segment_nodes() {
        let properties = StructuralProperties {
            point_loads: vec![PointLoad {
                arclength: 0.375,
                normal: -8.0,
                axial: 4.0,
            }],
            ..StructuralProperties::default()
        };
        let field = PressureField::default();
        let load =
            StructuralLoad::new(&field, &properties, Vector2::zeros(), 9.81).assemble(&mesh());
        assert_relative_eq!(load[3 + 1], -4.0, epsilon = 1e-12);
        assert_relative_eq!(load[6 + 1], -4.0, epsilon = 1e-12);
        assert_relative_eq!(load[3], 2.0, epsilon = 1e-12);
        assert_relative_eq!(load[6], 2.0, epsilon = 1e-12);
    }
}
