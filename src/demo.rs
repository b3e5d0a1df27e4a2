use flexplane::{speed_for_wetted_length, FlatPlate, SolveRequest, StructuralMode};

/// Wetted length the demonstration plate is tuned for, in surface lengths.
const TARGET_WETTED_FRACTION: f64 = 0.5;

/// Rigid flat plate at 4° trim, at the speed that wets half of its length.
#[must_use]
pub fn classic_plate() -> SolveRequest {
    let mut request = SolveRequest::default();
    request.surface.trim_deg = 4.0;
    request.structure.mode = StructuralMode::Rigid;
    request.flow.speed = speed_for_wetted_length(
        request.body.weight,
        request.flow.density,
        request.surface.trim_deg.to_radians(),
        TARGET_WETTED_FRACTION * request.surface.length,
    );
    request
}

/// Closed-form reference for `request`.
#[must_use]
pub fn reference(request: &SolveRequest) -> FlatPlate {
    FlatPlate::new(&request.flow, request.surface.trim_deg.to_radians())
}
