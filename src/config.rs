//! Solve requests and their JSON representation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::controller::CouplingSettings;
use crate::errors::{ConfigError, RequestError};
use crate::hydro::{FlowConditions, HydroSettings};
use crate::mesh::{RefinementPolicy, SurfaceDefinition};
use crate::rigid_body::RigidBody;
use crate::structure::{EndCondition, StructuralMode, StructuralProperties};
use crate::tracker::TrackerSettings;

/// Complete description of one planing problem.
///
/// Every section falls back to its defaults when omitted from a JSON document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveRequest {
    /// Undeformed surface.
    pub surface: SurfaceDefinition,
    /// Mesh resolution.
    pub refinement: RefinementPolicy,
    /// Free stream.
    pub flow: FlowConditions,
    /// Elastic properties and supports.
    pub structure: StructuralProperties,
    /// Rigid-body loading.
    pub body: RigidBody,
    /// Pressure discretization.
    pub hydro: HydroSettings,
    /// Wetted region criteria.
    pub tracker: TrackerSettings,
    /// Outer iteration controls.
    pub coupling: CouplingSettings,
}

fn positive(field: &'static str, value: f64) -> Result<(), RequestError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(RequestError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), RequestError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(RequestError::Negative { field, value })
    }
}

fn fraction(field: &'static str, value: f64) -> Result<(), RequestError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(RequestError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn at_least(field: &'static str, value: usize, min: usize) -> Result<(), RequestError> {
    if value >= min {
        Ok(())
    } else {
        Err(RequestError::TooSmall { field, value, min })
    }
}

impl SolveRequest {
    /// Check that every value is physically meaningful.
    ///
    /// Geometry is checked separately when the mesh is built.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] found.
    pub fn validate(&self) -> Result<(), RequestError> {
        let flow = &self.flow;
        non_negative("flow.speed", flow.speed)?;
        positive("flow.density", flow.density)?;
        non_negative("flow.gravity", flow.gravity)?;

        self.validate_structure()?;

        let body = &self.body;
        if (body.free_in_draft || body.free_in_trim) && flow.speed == 0.0 {
            return Err(RequestError::FreeMotionWithoutFlow);
        }
        non_negative("body.weight", body.weight)?;
        positive("body.max_draft_step", body.max_draft_step)?;
        positive("body.max_trim_step_deg", body.max_trim_step_deg)?;
        positive("body.heave_tolerance", body.heave_tolerance)?;
        at_least("body.max_heave_iterations", body.max_heave_iterations, 1)?;

        at_least("hydro.panels", self.hydro.panels, 2)?;
        non_negative("hydro.regularization", self.hydro.regularization)?;
        positive("hydro.retry_regularization", self.hydro.retry_regularization)?;

        positive("tracker.min_wetted_length", self.tracker.min_wetted_length)?;
        fraction("tracker.max_region_step", self.tracker.max_region_step)?;

        let coupling = &self.coupling;
        at_least("coupling.max_iterations", coupling.max_iterations, 1)?;
        positive("coupling.tolerances.shape", coupling.tolerances.shape)?;
        positive("coupling.tolerances.pressure", coupling.tolerances.pressure)?;
        positive("coupling.tolerances.region", coupling.tolerances.region)?;
        positive("coupling.tolerances.force", coupling.tolerances.force)?;
        positive("coupling.tolerances.moment", coupling.tolerances.moment)?;
        fraction("coupling.relaxation.shape", coupling.relaxation.shape)?;
        fraction("coupling.relaxation.region", coupling.relaxation.region)?;
        fraction("coupling.relaxation.draft", coupling.relaxation.draft)?;
        fraction("coupling.relaxation.trim", coupling.relaxation.trim)?;
        fraction("coupling.min_relaxation", coupling.min_relaxation)?;
        if !(coupling.divergence_ratio > 1.0) {
            return Err(RequestError::OutOfRange {
                field: "coupling.divergence_ratio",
                value: coupling.divergence_ratio,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }

    fn validate_structure(&self) -> Result<(), RequestError> {
        let structure = &self.structure;
        positive("structure.axial_stiffness", structure.axial_stiffness)?;
        non_negative("structure.bending_stiffness", structure.bending_stiffness)?;
        non_negative("structure.pretension", structure.pretension)?;
        non_negative("structure.mass_per_length", structure.mass_per_length)?;
        if !structure.internal_pressure.is_finite() {
            return Err(RequestError::Negative {
                field: "structure.internal_pressure",
                value: structure.internal_pressure,
            });
        }
        if structure.mode != StructuralMode::Rigid {
            if structure.is_unrestrained() {
                return Err(RequestError::UnrestrainedStructure);
            }
            if structure.bending_stiffness == 0.0 && structure.pretension == 0.0 {
                return Err(RequestError::NoTransverseStiffness);
            }
        }
        for end in [structure.leading_edge, structure.trailing_edge] {
            if let EndCondition::TorsionalSpring { stiffness } = end {
                positive("structure.torsional_spring.stiffness", stiffness)?;
            }
        }
        let length = self.surface.length;
        if let Some(load) = structure
            .point_loads
            .iter()
            .find(|load| !(0.0..=length).contains(&load.arclength))
        {
            return Err(RequestError::PointLoadOutsideSurface {
                arclength: load.arclength,
                length,
            });
        }
        at_least("structure.load_steps", structure.load_steps, 1)?;
        at_least("structure.max_newton_iterations", structure.max_newton_iterations, 1)?;
        positive("structure.newton_tolerance", structure.newton_tolerance)
    }

    /// Parse and validate a request from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed documents and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let request: Self = serde_json::from_str(text)?;
        request.validate()?;
        Ok(request)
    }

    /// Serialize the request as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read and validate a request file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Write the request to a file as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::PointLoad;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SolveRequest::default().validate(), Ok(()));
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let request = SolveRequest::from_json(
            r#"{ "flow": { "speed": 7.5 }, "structure": { "mode": "rigid" } }"#,
        )
        .expect("valid document");
        assert_eq!(request.flow.speed, 7.5);
        assert_eq!(request.flow.density, 1000.0);
        assert_eq!(request.structure.mode, StructuralMode::Rigid);
        assert_eq!(request.coupling, CouplingSettings::default());
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let mut request = SolveRequest::default();
        request.structure.trailing_edge = EndCondition::TorsionalSpring { stiffness: 40.0 };
        request.body.pivot_arclength = Some(0.7);
        request.body.free_in_trim = true;
        request.body.center_of_gravity = Some(crate::geometry::point(0.6, 0.05));
        let text = request.to_json().expect("serializes");
        assert_eq!(SolveRequest::from_json(&text).expect("parses"), request);
    }

    #[test]
    fn non_physical_values_are_rejected() {
        let mut request = SolveRequest::default();
        request.structure.axial_stiffness = 0.0;
        assert_eq!(
            request.validate(),
            Err(RequestError::NonPositive {
                field: "structure.axial_stiffness",
                value: 0.0
            })
        );

        let mut request = SolveRequest::default();
        request.flow.speed = 0.0;
        assert_eq!(request.validate(), Err(RequestError::FreeMotionWithoutFlow));
        request.body.free_in_draft = false;
        assert_eq!(request.validate(), Ok(()));
        request.body.free_in_trim = true;
        assert_eq!(request.validate(), Err(RequestError::FreeMotionWithoutFlow));

        let mut request = SolveRequest::default();
        request.body.max_trim_step_deg = 0.0;
        assert_eq!(
            request.validate(),
            Err(RequestError::NonPositive {
                field: "body.max_trim_step_deg",
                value: 0.0
            })
        );

        let mut request = SolveRequest::default();
        request.structure.leading_edge = EndCondition::Free;
        request.structure.trailing_edge = EndCondition::Free;
        assert_eq!(request.validate(), Err(RequestError::UnrestrainedStructure));
        request.structure.mode = StructuralMode::Rigid;
        assert_eq!(request.validate(), Ok(()));

        let mut request = SolveRequest::default();
        request.structure.bending_stiffness = 0.0;
        assert_eq!(request.validate(), Err(RequestError::NoTransverseStiffness));

        let mut request = SolveRequest::default();
        request.structure.point_loads.push(PointLoad {
            arclength: 1.5,
            normal: 1.0,
            axial: 0.0,
        });
        assert!(matches!(
            request.validate(),
            Err(RequestError::PointLoadOutsideSurface { .. })
        ));

        let mut request = SolveRequest::default();
        request.coupling.relaxation.region = 1.5;
        assert!(matches!(request.validate(), Err(RequestError::OutOfRange { .. })));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            SolveRequest::from_json("{ \"flow\": 3 }"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            SolveRequest::from_json(r#"{ "flow": { "density": -1.0 } }"#),
            Err(ConfigError::Invalid(RequestError::NonPositive { .. }))
        ));
    }
}
