//! The wetted region as an explicit interval value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Portion of the surface in contact with the fluid.
///
/// The region is recomputed every outer iteration instead of being stored as a
/// flag on mesh nodes, so it stays meaningful when the mesh is refined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WettedRegion {
    /// No part of the surface touches the fluid.
    #[default]
    Dry,
    /// The arclength interval `[entry, separation]` is wetted.
    Wetted {
        /// Arclength of the spray root or wetted leading edge.
        entry: f64,
        /// Arclength at which the flow separates from the surface.
        separation: f64,
    },
}

impl WettedRegion {
    /// Wetted interval, or `Dry` when the interval is empty or inverted.
    ///
    /// # Examples
    /// ```
    /// use flexplane::WettedRegion;
    ///
    /// assert!(WettedRegion::between(0.6, 0.6).is_dry());
    /// assert_eq!(WettedRegion::between(0.5, 1.0).length(), 0.5);
    /// ```
    #[must_use]
    pub fn between(entry: f64, separation: f64) -> Self {
        if separation > entry {
            Self::Wetted { entry, separation }
        } else {
            Self::Dry
        }
    }

    /// Return `true` when nothing is wetted.
    #[must_use]
    pub fn is_dry(&self) -> bool {
        matches!(self, Self::Dry)
    }

    /// Wetted arclength.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.bounds().map_or(0.0, |(entry, separation)| separation - entry)
    }

    /// Entry and separation arclengths.
    #[must_use]
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            Self::Dry => None,
            Self::Wetted { entry, separation } => Some((entry, separation)),
        }
    }

    /// Separation arclength, if wetted.
    #[must_use]
    pub fn separation(&self) -> Option<f64> {
        self.bounds().map(|(_, separation)| separation)
    }

    /// Length of the overlap between the region and `[start, end]`.
    #[must_use]
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        self.bounds().map_or(0.0, |(entry, separation)| {
            (separation.min(end) - entry.max(start)).max(0.0)
        })
    }

    /// Largest endpoint movement between two regions normalized by `length`.
    ///
    /// A change between dry and wetted counts as a full-length change.
    #[must_use]
    pub fn change_from(&self, previous: &Self, length: f64) -> f64 {
        match (self.bounds(), previous.bounds()) {
            (None, None) => 0.0,
            (Some((entry, separation)), Some((old_entry, old_separation))) => {
                (entry - old_entry).abs().max((separation - old_separation).abs()) / length
            }
            _ => 1.0,
        }
    }
}

impl fmt::Display for WettedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dry => write!(f, "dry"),
            Self::Wetted { entry, separation } => write!(f, "[{entry:.4}, {separation:.4}]"),
        }
    }
}
