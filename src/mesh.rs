//! Discretization of the planing surface into beam elements along its arclength.

use std::ops::RangeInclusive;

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::errors::MeshError;
use crate::geometry::Point;

/// Sharp slope discontinuity (knuckle) on the undeformed surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Arclength of the corner measured from the leading edge in metres.
    pub arclength: f64,
    /// Change of the surface angle across the corner in degrees, positive away from the fluid.
    pub angle_deg: f64,
}

/// Parametric description of the undeformed planing surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceDefinition {
    /// Arclength of the surface in metres.
    pub length: f64,
    /// Prescribed trim of the chord line in degrees, positive bow up.
    pub trim_deg: f64,
    /// Rise of a circular-arc camber line at mid-length as a fraction of the length.
    pub camber: f64,
    /// Knuckles on the undeformed surface.
    pub corners: Vec<Corner>,
}

impl Default for SurfaceDefinition {
    fn default() -> Self {
        Self {
            length: 1.0,
            trim_deg: 4.0,
            camber: 0.0,
            corners: Vec::new(),
        }
    }
}

/// Controls how many elements are used and where they are concentrated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementPolicy {
    /// Target number of elements before corner refinement.
    pub elements: usize,
    /// Strength of the cosine clustering towards both edges, in `[0, 1)`.
    pub clustering: f64,
    /// Number of bisection passes applied to the segments adjacent to each corner.
    pub corner_refinement: usize,
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self {
            elements: 20,
            clustering: 0.0,
            corner_refinement: 1,
        }
    }
}

/// Undeformed surface shape, evaluable at any arclength.
///
/// The curve is a chain of constant-curvature arcs separated by corners, expressed
/// in the body frame so that the chord joining the edges lies on the `ξ` axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCurve {
    length: f64,
    curvature: f64,
    corners: Vec<(f64, f64)>,
    start_angle: f64,
    frame_angle: f64,
    chord: f64,
}

impl ReferenceCurve {
    fn new(length: f64, camber: f64, corners: &[Corner]) -> Self {
        let mut kinks: Vec<(f64, f64)> = corners
            .iter()
            .map(|corner| (corner.arclength, corner.angle_deg.to_radians()))
            .collect();
        kinks.sort_by(|a, b| a.0.total_cmp(&b.0));
        let curvature = 8.0 * camber / length;
        let mut curve = Self {
            length,
            curvature,
            corners: kinks,
            start_angle: 0.5 * curvature * length,
            frame_angle: 0.0,
            chord: length,
        };
        let trailing_edge = curve.raw_position(length);
        curve.frame_angle = trailing_edge.y.atan2(trailing_edge.x);
        curve.chord = trailing_edge.norm();
        curve
    }

    /// Surface angle relative to the chord line at arclength `s`.
    #[must_use]
    pub fn angle(&self, s: f64) -> f64 {
        let kinks: f64 = self
            .corners
            .iter()
            .take_while(|(at, _)| *at <= s)
            .map(|(_, kink)| kink)
            .sum();
        self.start_angle - self.curvature * s + kinks - self.frame_angle
    }

    /// Unit tangent of the undeformed surface in the body frame.
    #[must_use]
    pub fn tangent(&self, s: f64) -> Vector2<f64> {
        let angle = self.angle(s);
        Vector2::new(angle.cos(), angle.sin())
    }

    /// Body-frame position of the undeformed surface at arclength `s`.
    #[must_use]
    pub fn position(&self, s: f64) -> Point {
        Point::from(Rotation2::new(-self.frame_angle) * self.raw_position(s))
    }

    /// Distance between the leading and trailing edges.
    #[must_use]
    pub fn chord(&self) -> f64 {
        self.chord
    }

    fn raw_position(&self, s: f64) -> Vector2<f64> {
        let mut position = Vector2::zeros();
        let mut angle = self.start_angle;
        let mut from = 0.0;
        for &(at, kink) in self.corners.iter().take_while(|(at, _)| *at < s) {
            position += arc_chord(angle, self.curvature, at - from);
            angle += kink - self.curvature * (at - from);
            from = at;
        }
        position + arc_chord(angle, self.curvature, s - from)
    }
}

/// Chord vector of a circular arc of length `span` leaving at `angle`.
fn arc_chord(angle: f64, curvature: f64, span: f64) -> Vector2<f64> {
    let half = 0.5 * curvature * span;
    let length = if half.abs() < 1e-8 {
        span
    } else {
        span * half.sin() / half
    };
    let direction = angle - half;
    length * Vector2::new(direction.cos(), direction.sin())
}

/// Node of the surface mesh.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Arclength from the leading edge in metres.
    pub arclength: f64,
    /// Undeformed body-frame position.
    pub reference: Point,
}

/// Connectivity of a mesh segment (one beam element).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Index of the upstream node.
    pub start: usize,
    /// Index of the downstream node.
    pub end: usize,
}

/// Ordered chain of nodes along the surface arclength.
///
/// A mesh is immutable; [`refine`] builds a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    nodes: Vec<Node>,
    segments: Vec<Segment>,
    curve: ReferenceCurve,
    trim: f64,
}

impl Mesh {
    fn from_arclengths(curve: ReferenceCurve, trim: f64, arclengths: &[f64]) -> Self {
        let nodes = arclengths
            .iter()
            .map(|&arclength| Node {
                arclength,
                reference: curve.position(arclength),
            })
            .collect();
        Self::from_nodes(curve, trim, nodes)
    }

    fn from_nodes(curve: ReferenceCurve, trim: f64, nodes: Vec<Node>) -> Self {
        let segments = (1..nodes.len())
            .map(|end| Segment {
                start: end - 1,
                end,
            })
            .collect();
        Self {
            nodes,
            segments,
            curve,
            trim,
        }
    }

    /// Nodes ordered from leading to trailing edge.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Segment connectivity.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Return the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.segments.len()
    }

    /// Arclength of the surface.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.curve.length
    }

    /// Edge-to-edge chord of the undeformed surface.
    #[must_use]
    pub fn chord(&self) -> f64 {
        self.curve.chord
    }

    /// Prescribed trim in radians.
    #[must_use]
    pub fn trim(&self) -> f64 {
        self.trim
    }

    /// Undeformed surface shape.
    #[must_use]
    pub fn curve(&self) -> &ReferenceCurve {
        &self.curve
    }

    /// Node arclengths in order.
    #[must_use]
    pub fn arclengths(&self) -> Vec<f64> {
        self.nodes.iter().map(|node| node.arclength).collect()
    }

    /// Arclength bounds of a segment.
    #[must_use]
    pub fn segment_bounds(&self, segment: usize) -> (f64, f64) {
        let Segment { start, end } = self.segments[segment];
        (self.nodes[start].arclength, self.nodes[end].arclength)
    }

    /// Length of a segment.
    #[must_use]
    pub fn segment_length(&self, segment: usize) -> f64 {
        let (start, end) = self.segment_bounds(segment);
        end - start
    }

    /// Return the segment containing arclength `s` and the local coordinate in `[0, 1]`.
    ///
    /// Arclengths outside the surface are clamped to the nearest edge.
    #[must_use]
    pub fn locate(&self, s: f64) -> (usize, f64) {
        let s = s.clamp(0.0, self.length());
        let above = self.nodes.partition_point(|node| node.arclength <= s);
        let segment = above.saturating_sub(1).min(self.element_count() - 1);
        let (start, end) = self.segment_bounds(segment);
        (segment, ((s - start) / (end - start)).clamp(0.0, 1.0))
    }
}

/// Build the mesh of a surface under a refinement policy.
///
/// # Errors
///
/// Returns [`MeshError`] when the surface definition is degenerate or the policy
/// asks for fewer than two elements.
///
/// # Examples
/// ```
/// use flexplane::{build_mesh, RefinementPolicy, SurfaceDefinition};
///
/// let policy = RefinementPolicy { elements: 8, ..RefinementPolicy::default() };
/// let mesh = build_mesh(&SurfaceDefinition::default(), &policy).expect("valid surface");
/// assert_eq!(mesh.element_count(), 8);
/// ```
pub fn build_mesh(
    surface: &SurfaceDefinition,
    policy: &RefinementPolicy,
) -> Result<Mesh, MeshError> {
    validate_surface(surface)?;
    if policy.elements < 2 {
        return Err(MeshError::TooFewElements {
            elements: policy.elements,
        });
    }
    if !(0.0..1.0).contains(&policy.clustering) {
        return Err(MeshError::InvalidClustering(policy.clustering));
    }

    let length = surface.length;
    let beta = policy.clustering;
    #[allow(clippy::cast_precision_loss)]
    let count = policy.elements as f64;
    let mut arclengths: Vec<f64> = (0..=policy.elements)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 / count;
            length * ((1.0 - beta) * t + beta * 0.5 * (1.0 - (std::f64::consts::PI * t).cos()))
        })
        .collect();
    // Guard the end points against round-off.
    arclengths[0] = 0.0;
    arclengths[policy.elements] = length;

    for (index, corner) in surface.corners.iter().enumerate() {
        insert_corner(&mut arclengths, corner.arclength, &surface.corners[..index]);
    }
    for _ in 0..policy.corner_refinement {
        arclengths = bisect_where(&arclengths, |start, end| {
            surface
                .corners
                .iter()
                .any(|corner| corner.arclength == start || corner.arclength == end)
        });
    }

    let curve = ReferenceCurve::new(length, surface.camber, &surface.corners);
    Ok(Mesh::from_arclengths(
        curve,
        surface.trim_deg.to_radians(),
        &arclengths,
    ))
}

/// Build a new mesh in which every segment overlapping `interval` is bisected.
///
/// Nodes outside the refined segments keep their exact arclength and reference
/// position.
///
/// # Errors
///
/// Returns [`MeshError::IntervalOutsideMesh`] when no segment overlaps the interval.
pub fn refine(mesh: &Mesh, interval: RangeInclusive<f64>) -> Result<Mesh, MeshError> {
    let (lower, upper) = (*interval.start(), *interval.end());
    let overlaps = |start: f64, end: f64| {
        if upper > lower {
            end.min(upper) - start.max(lower) > 0.0
        } else {
            (start..=end).contains(&lower)
        }
    };
    let touched = (0..mesh.element_count())
        .filter(|&segment| {
            let (start, end) = mesh.segment_bounds(segment);
            overlaps(start, end)
        })
        .count();
    if touched == 0 {
        return Err(MeshError::IntervalOutsideMesh {
            start: lower,
            end: upper,
        });
    }

    let mut nodes = Vec::with_capacity(mesh.node_count() + touched);
    nodes.push(mesh.nodes[0]);
    for segment in 0..mesh.element_count() {
        let (start, end) = mesh.segment_bounds(segment);
        if overlaps(start, end) {
            let middle = 0.5 * (start + end);
            nodes.push(Node {
                arclength: middle,
                reference: mesh.curve.position(middle),
            });
        }
        nodes.push(mesh.nodes[mesh.segments[segment].end]);
    }
    Ok(Mesh::from_nodes(mesh.curve.clone(), mesh.trim, nodes))
}

fn validate_surface(surface: &SurfaceDefinition) -> Result<(), MeshError> {
    let length = surface.length;
    if !(length.is_finite() && length > 0.0) {
        return Err(MeshError::InvalidLength(length));
    }
    if !(surface.trim_deg.is_finite() && surface.trim_deg.abs() < 90.0) {
        return Err(MeshError::InvalidTrim(surface.trim_deg));
    }
    if !(surface.camber.is_finite() && surface.camber.abs() < 0.25) {
        return Err(MeshError::InvalidCamber(surface.camber));
    }
    for corner in &surface.corners {
        if !(corner.arclength > 0.0 && corner.arclength < length) {
            return Err(MeshError::CornerOutsideSurface {
                arclength: corner.arclength,
                length,
            });
        }
        if !corner.angle_deg.is_finite() {
            return Err(MeshError::InvalidCornerAngle {
                arclength: corner.arclength,
            });
        }
    }
    Ok(())
}

/// Place a node exactly on a corner, snapping a close interior node instead of
/// creating a sliver element.
/// Make `corner` a node, snapping a close interior node onto it unless that node
/// already holds one of the `placed` corners.
fn insert_corner(arclengths: &mut Vec<f64>, corner: f64, placed: &[Corner]) {
    let above = arclengths.partition_point(|&s| s < corner);
    if arclengths.get(above) == Some(&corner) {
        return;
    }
    let movable = |index: usize, s: f64| {
        index > 0
            && index < arclengths.len() - 1
            && !placed.iter().any(|other| other.arclength == s)
    };
    let (below_s, above_s) = (arclengths[above - 1], arclengths[above]);
    let snap_tolerance = 0.25 * (above_s - below_s);
    let snap_below = movable(above - 1, below_s) && corner - below_s < snap_tolerance;
    let snap_above = movable(above, above_s) && above_s - corner < snap_tolerance;
    if snap_below {
        arclengths[above - 1] = corner;
    } else if snap_above {
        arclengths[above] = corner;
    } else {
        arclengths.insert(above, corner);
    }
}

fn bisect_where(arclengths: &[f64], mut split: impl FnMut(f64, f64) -> bool) -> Vec<f64> {
    let mut refined = Vec::with_capacity(2 * arclengths.len());
    refined.push(arclengths[0]);
    for pair in arclengths.windows(2) {
        if split(pair[0], pair[1]) {
            refined.push(0.5 * (pair[0] + pair[1]));
        }
        refined.push(pair[1]);
    }
    refined
}
