//! Closed-form linearized solution for a rigid flat planing plate.

use std::f64::consts::PI;

use crate::hydro::FlowConditions;

/// Rigid flat plate planing at a fixed trim.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatPlate {
    /// Free-stream speed in m/s.
    pub speed: f64,
    /// Fluid density in kg/m³.
    pub density: f64,
    /// Trim angle in radians.
    pub trim: f64,
}

impl FlatPlate {
    /// Plate at `trim` radians in `flow`.
    #[must_use]
    pub fn new(flow: &FlowConditions, trim: f64) -> Self {
        Self {
            speed: flow.speed,
            density: flow.density,
            trim,
        }
    }

    fn head(&self) -> f64 {
        self.density * self.speed * self.speed
    }

    /// Lift per unit span carried by a wetted length `wetted`.
    #[must_use]
    pub fn lift(&self, wetted: f64) -> f64 {
        0.5 * PI * self.head() * self.trim.sin() * wetted
    }

    /// Wetted length that supports `weight` per unit span.
    #[must_use]
    pub fn wetted_length(&self, weight: f64) -> f64 {
        2.0 * weight / (PI * self.head() * self.trim.sin())
    }

    /// Trailing edge draft when the spray root sits on the free surface.
    #[must_use]
    pub fn draft(&self, wetted: f64) -> f64 {
        wetted * self.trim.sin()
    }

    /// Pressure at horizontal position `x` on a plate wetted over `[x_entry, x_separation]`.
    ///
    /// Zero outside the wetted interval; singular at the entry.
    #[must_use]
    pub fn pressure(&self, x: f64, x_entry: f64, x_separation: f64) -> f64 {
        if x <= x_entry || x >= x_separation {
            return 0.0;
        }
        self.head() * self.trim.tan() * ((x_separation - x) / (x - x_entry)).sqrt()
    }

    /// Distance of the centre of pressure behind the spray root.
    #[must_use]
    pub fn center_of_pressure(&self, wetted: f64) -> f64 {
        0.25 * wetted
    }
}

/// Free-stream speed at which a plate of weight `weight` at `trim` plans with
/// wetted length `wetted`.
#[must_use]
pub fn speed_for_wetted_length(weight: f64, density: f64, trim: f64, wetted: f64) -> f64 {
    (2.0 * weight / (PI * density * trim.sin() * wetted)).sqrt()
}
