//! Fundamental geometric types for planing surface modelling.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Position in the two dimensional plane of the flow, measured in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Distance along the horizontal (downstream) axis.
    pub x: f64,
    /// Distance along the vertical axis, positive up from the free surface.
    pub y: f64,
}

impl Point {
    /// Create a [`Point`] with explicit coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Convert the point into an algebraic vector.
    #[must_use]
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (other.to_vector() - self.to_vector()).norm()
    }
}

impl From<Vector2<f64>> for Point {
    fn from(value: Vector2<f64>) -> Self {
        Self::new(value.x, value.y)
    }
}

impl From<Point> for Vector2<f64> {
    fn from(value: Point) -> Self {
        value.to_vector()
    }
}

/// Convenience helper for creating [`Point`] instances.
///
/// # Examples
/// ```
/// use flexplane::point;
///
/// let origin = point(0.0, 0.0);
/// assert_eq!(origin.x, 0.0);
/// ```
#[must_use]
pub const fn point(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

/// Rigid-body placement of the body frame in the flow.
///
/// The body frame has its `ξ` axis along the chord from the leading edge and its
/// `η` axis pointing away from the fluid. The trailing edge sits at
/// `(chord·cos α, −draft)` and the chord is pitched bow-up by the trim `α`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Depth of the trailing edge below the free surface in metres.
    pub draft: f64,
    /// Trim angle in radians, positive bow up.
    pub trim: f64,
    /// Straight-line distance between leading and trailing edge in metres.
    pub chord: f64,
}

impl Placement {
    /// Create a placement from draft, trim (radians) and chord length.
    #[must_use]
    pub const fn new(draft: f64, trim: f64, chord: f64) -> Self {
        Self { draft, trim, chord }
    }

    /// Global position of the trailing edge.
    #[must_use]
    pub fn trailing_edge(&self) -> Point {
        point(self.chord * self.trim.cos(), -self.draft)
    }

    /// Rotate a body-frame direction into the global frame.
    #[must_use]
    pub fn rotate(&self, direction: Vector2<f64>) -> Vector2<f64> {
        Rotation2::new(-self.trim) * direction
    }

    /// Map a body-frame point `(ξ, η)` into the global frame.
    ///
    /// # Examples
    /// ```
    /// use flexplane::{point, Placement};
    ///
    /// let placement = Placement::new(0.1, 0.0, 1.0);
    /// let leading_edge = placement.place(point(0.0, 0.0));
    /// assert!((leading_edge.x - 0.0).abs() < 1e-12);
    /// assert!((leading_edge.y + 0.1).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn place(&self, body: Point) -> Point {
        let offset = Vector2::new(body.x - self.chord, body.y);
        Point::from(self.trailing_edge().to_vector() + self.rotate(offset))
    }

    /// Body-frame components `(ξ, η)` of the global downward unit vector.
    #[must_use]
    pub fn gravity_direction(&self) -> Vector2<f64> {
        Rotation2::new(self.trim) * Vector2::new(0.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn point_to_vector_roundtrip() {
        let origin = Point::new(1.0, 2.0);
        let vector: Vector2<f64> = origin.into();
        assert_eq!(vector, Vector2::new(1.0, 2.0));
        assert_eq!(Point::from(vector), origin);
    }

    #[test]
    fn leading_edge_rises_with_trim() {
        let trim = 4.0_f64.to_radians();
        let placement = Placement::new(0.02, trim, 1.0);
        let leading_edge = placement.place(point(0.0, 0.0));
        assert_relative_eq!(leading_edge.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(leading_edge.y, trim.sin() - 0.02, epsilon = 1e-12);
        let trailing_edge = placement.place(point(1.0, 0.0));
        assert_relative_eq!(trailing_edge.x, trim.cos(), epsilon = 1e-12);
        assert_relative_eq!(trailing_edge.y, -0.02, epsilon = 1e-12);
    }

    #[test]
    fn body_normal_points_away_from_fluid() {
        let trim = 10.0_f64.to_radians();
        let normal = Placement::new(0.0, trim, 1.0).rotate(Vector2::new(0.0, 1.0));
        assert_relative_eq!(normal.x, trim.sin(), epsilon = 1e-12);
        assert_relative_eq!(normal.y, trim.cos(), epsilon = 1e-12);
    }

    #[test]
    fn gravity_resolves_into_chord_components() {
        let trim = 4.0_f64.to_radians();
        let gravity = Placement::new(0.0, trim, 1.0).gravity_direction();
        assert_relative_eq!(gravity.x, trim.sin(), epsilon = 1e-12);
        assert_relative_eq!(gravity.y, -trim.cos(), epsilon = 1e-12);
    }
}
