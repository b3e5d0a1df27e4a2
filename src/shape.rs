//! Deformed surface placed in the flow.

use nalgebra::Vector2;

use crate::geometry::{Placement, Point};
use crate::mesh::Mesh;
use crate::structure::DeflectionField;

/// A mesh, a deflection defined on it and the rigid placement of the body.
///
/// Deflections are measured in the chord frame: axial along `ξ`, normal along `η`.
#[derive(Clone, Copy, Debug)]
pub struct Shape<'a> {
    mesh: &'a Mesh,
    deflection: &'a DeflectionField,
    placement: Placement,
}

impl<'a> Shape<'a> {
    /// Combine a mesh, its deflection and a placement.
    #[must_use]
    pub fn new(mesh: &'a Mesh, deflection: &'a DeflectionField, placement: Placement) -> Self {
        Self {
            mesh,
            deflection,
            placement,
        }
    }

    /// Mesh the shape is defined on.
    #[must_use]
    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    /// Rigid placement of the body.
    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Surface arclength.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.mesh.length()
    }

    /// Deformed position at arclength `s` in the body frame.
    #[must_use]
    pub fn body_point(&self, s: f64) -> Point {
        let reference = self.mesh.curve().position(s);
        let local = self.deflection.evaluate(self.mesh, s);
        Point::new(reference.x + local.axial, reference.y + local.normal)
    }

    /// Deformed position at arclength `s` in the flow frame.
    #[must_use]
    pub fn point(&self, s: f64) -> Point {
        self.placement.place(self.body_point(s))
    }

    /// Deformed tangent `d(x, y)/ds` in the flow frame.
    #[must_use]
    pub fn tangent(&self, s: f64) -> Vector2<f64> {
        let local = self.deflection.evaluate(self.mesh, s);
        let body = self.mesh.curve().tangent(s) + Vector2::new(local.axial_strain, local.slope);
        self.placement.rotate(body)
    }

    /// Slope `dy/dx` of the deformed surface in the flow frame.
    #[must_use]
    pub fn slope(&self, s: f64) -> f64 {
        let tangent = self.tangent(s);
        tangent.y / tangent.x
    }

    /// Deformed positions of all mesh nodes in the flow frame.
    #[must_use]
    pub fn node_positions(&self) -> Vec<Point> {
        self.mesh
            .nodes()
            .iter()
            .zip(self.deflection.nodes())
            .map(|(node, deflection)| {
                self.placement.place(Point::new(
                    node.reference.x + deflection.axial,
                    node.reference.y + deflection.normal,
                ))
            })
            .collect()
    }
}
