//! Shape functions and the geometrically nonlinear beam element.

use nalgebra::{SMatrix, SVector};

/// Local element vector ordered `[u1, w1, θ1, u2, w2, θ2]`.
pub(crate) type ElementVector = SVector<f64, 6>;
/// Local element matrix matching [`ElementVector`].
pub(crate) type ElementMatrix = SMatrix<f64, 6, 6>;

/// Four-point Gauss-Legendre rule mapped onto `[0, 1]` as `(t, weight)`.
pub(crate) const GAUSS: [(f64, f64); 4] = [
    (0.069_431_844_202_973_71, 0.173_927_422_568_726_93),
    (0.330_009_478_207_571_87, 0.326_072_577_431_273_07),
    (0.669_990_521_792_428_1, 0.326_072_577_431_273_07),
    (0.930_568_155_797_026_3, 0.173_927_422_568_726_93),
];

/// Hermite cubic shape functions for `[w1, θ1, w2, θ2]` on an element of length `h`.
pub(crate) fn hermite(t: f64, h: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        1.0 - 3.0 * t2 + 2.0 * t3,
        h * (t - 2.0 * t2 + t3),
        3.0 * t2 - 2.0 * t3,
        h * (t3 - t2),
    ]
}

/// Arclength derivative of [`hermite`].
pub(crate) fn hermite_slope(t: f64, h: f64) -> [f64; 4] {
    let t2 = t * t;
    [
        6.0 * (t2 - t) / h,
        1.0 - 4.0 * t + 3.0 * t2,
        6.0 * (t - t2) / h,
        3.0 * t2 - 2.0 * t,
    ]
}

/// Second arclength derivative of [`hermite`].
pub(crate) fn hermite_curvature(t: f64, h: f64) -> [f64; 4] {
    [
        (12.0 * t - 6.0) / (h * h),
        (6.0 * t - 4.0) / h,
        (6.0 - 12.0 * t) / (h * h),
        (6.0 * t - 2.0) / h,
    ]
}

/// `∫₀ᵗ H(τ) dτ` for each Hermite function, in units of the local coordinate.
pub(crate) fn hermite_integral(t: f64, h: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    [
        t - t3 + 0.5 * t4,
        h * (0.5 * t2 - 2.0 * t3 / 3.0 + 0.25 * t4),
        t3 - 0.5 * t4,
        h * (0.25 * t4 - t3 / 3.0),
    ]
}

/// Spread transverse Hermite coefficients into a full element vector.
fn transverse(values: [f64; 4]) -> ElementVector {
    ElementVector::from([0.0, values[0], values[1], 0.0, values[2], values[3]])
}

/// Internal force and consistent tangent of one element.
pub(crate) struct ElementResponse {
    /// Internal nodal forces.
    pub force: ElementVector,
    /// Tangent stiffness.
    pub stiffness: ElementMatrix,
}

/// Beam element joining two consecutive mesh nodes.
///
/// The membrane strain is averaged over the element, `ε = u' + ½⟨w'²⟩`, which keeps
/// the linear axial field consistent with the quadratic rotation term.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BeamElement {
    /// Index of the first global degree of freedom (`3 × start node`).
    pub first_dof: usize,
    /// Element length in metres.
    pub length: f64,
    /// Axial stiffness `EA` in N.
    pub axial_stiffness: f64,
    /// Bending stiffness `EI` in N·m².
    pub bending_stiffness: f64,
    /// Pretension carried by the supports in N.
    pub pretension: f64,
}

impl BeamElement {
    /// Evaluate the element at the local displacement vector.
    pub fn response(&self, local: &ElementVector, nonlinear: bool) -> ElementResponse {
        let h = self.length;
        let axial = ElementVector::from([-1.0 / h, 0.0, 0.0, 1.0 / h, 0.0, 0.0]);

        let mut rotation_force = ElementVector::zeros();
        let mut rotation_stiffness = ElementMatrix::zeros();
        let mut mean_square_slope = 0.0;
        let mut bending_force = ElementVector::zeros();
        let mut bending_stiffness = ElementMatrix::zeros();
        for (t, weight) in GAUSS {
            let slope_row = transverse(hermite_slope(t, h));
            let curvature_row = transverse(hermite_curvature(t, h));
            let slope = slope_row.dot(local);
            let curvature = curvature_row.dot(local);
            rotation_force += weight * slope * slope_row;
            rotation_stiffness += weight * slope_row * slope_row.transpose();
            mean_square_slope += weight * slope * slope;
            bending_force += weight * self.bending_stiffness * curvature * curvature_row;
            bending_stiffness +=
                weight * self.bending_stiffness * curvature_row * curvature_row.transpose();
        }

        let (strain, strain_row) = if nonlinear {
            (
                axial.dot(local) + 0.5 * mean_square_slope,
                axial + rotation_force,
            )
        } else {
            (axial.dot(local), axial)
        };
        let membrane = self.axial_stiffness * strain;
        let geometric = if nonlinear {
            self.pretension + membrane
        } else {
            self.pretension
        };

        ElementResponse {
            force: h * (membrane * strain_row + self.pretension * rotation_force + bending_force),
            stiffness: h
                * (self.axial_stiffness * strain_row * strain_row.transpose()
                    + geometric * rotation_stiffness
                    + bending_stiffness),
        }
    }
}
