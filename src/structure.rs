//! Elastic equilibrium of the planing surface as a beam with pretension.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::element::{hermite, hermite_slope, BeamElement, ElementVector};
use crate::errors::{MeshError, StructuralError};
use crate::loads::StructuralLoad;
use crate::mesh::Mesh;

/// Degrees of freedom carried by each node: axial, normal and rotation.
pub const DOFS_PER_NODE: usize = 3;

/// Which equilibrium equations are solved for the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralMode {
    /// Infinitely stiff surface; the deflection is identically zero.
    Rigid,
    /// Small-deflection beam, solved with one linear system.
    #[default]
    Linear,
    /// Moderate-rotation (von Kármán) beam, solved by Newton iteration.
    Nonlinear,
}

/// Support applied at one end of the surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCondition {
    /// Displacements and rotation fixed.
    Clamped,
    /// Displacements fixed, rotation free.
    Pinned,
    /// Unrestrained end.
    Free,
    /// Displacements fixed, rotation resisted by a spring.
    TorsionalSpring {
        /// Rotational stiffness in N·m/rad per unit span.
        stiffness: f64,
    },
}

impl EndCondition {
    fn restrained(self) -> [bool; 3] {
        match self {
            Self::Clamped => [true, true, true],
            Self::Pinned | Self::TorsionalSpring { .. } => [true, true, false],
            Self::Free => [false, false, false],
        }
    }

    fn rotational_spring(self) -> Option<f64> {
        match self {
            Self::TorsionalSpring { stiffness } => Some(stiffness),
            _ => None,
        }
    }
}

/// Concentrated external load, per unit span.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointLoad {
    /// Arclength at which the load acts in metres.
    pub arclength: f64,
    /// Component along the surface normal (away from the fluid) in N.
    #[serde(default)]
    pub normal: f64,
    /// Component along the chord (downstream) in N.
    #[serde(default)]
    pub axial: f64,
}

/// Stiffness, mass, supports and solver controls of the surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralProperties {
    /// Equilibrium formulation.
    pub mode: StructuralMode,
    /// Bending stiffness `EI` in N·m² per unit span.
    pub bending_stiffness: f64,
    /// Axial stiffness `EA` in N per unit span.
    pub axial_stiffness: f64,
    /// Pretension reacted by the supports in N per unit span.
    pub pretension: f64,
    /// Mass per unit area, i.e. per metre of arclength and span, in kg/m².
    pub mass_per_length: f64,
    /// Support at the leading edge.
    pub leading_edge: EndCondition,
    /// Support at the trailing edge.
    pub trailing_edge: EndCondition,
    /// Uniform pressure acting on the dry side of the surface in Pa.
    pub internal_pressure: f64,
    /// Concentrated loads.
    pub point_loads: Vec<PointLoad>,
    /// Number of load increments used by the nonlinear solver.
    pub load_steps: usize,
    /// Newton iterations allowed per load increment.
    pub max_newton_iterations: usize,
    /// Relative out-of-balance force accepted by the Newton iteration.
    pub newton_tolerance: f64,
}

impl Default for StructuralProperties {
    fn default() -> Self {
        Self {
            mode: StructuralMode::Linear,
            bending_stiffness: 200.0,
            axial_stiffness: 1.0e7,
            pretension: 0.0,
            mass_per_length: 0.0,
            leading_edge: EndCondition::Free,
            trailing_edge: EndCondition::Clamped,
            internal_pressure: 0.0,
            point_loads: Vec::new(),
            load_steps: 1,
            max_newton_iterations: 50,
            newton_tolerance: 1.0e-10,
        }
    }
}

impl StructuralProperties {
    /// Return `true` when a flexible surface would have an unrestrained rigid-body mode.
    #[must_use]
    pub fn is_unrestrained(&self) -> bool {
        self.mode != StructuralMode::Rigid
            && self.leading_edge == EndCondition::Free
            && self.trailing_edge == EndCondition::Free
    }

    fn restrained_dofs(&self, node_count: usize) -> Vec<bool> {
        let mut restrained = vec![false; node_count * DOFS_PER_NODE];
        let trailing = (node_count - 1) * DOFS_PER_NODE;
        for (axis, fixed) in self.leading_edge.restrained().into_iter().enumerate() {
            restrained[axis] |= fixed;
        }
        for (axis, fixed) in self.trailing_edge.restrained().into_iter().enumerate() {
            restrained[trailing + axis] |= fixed;
        }
        restrained
    }

    fn rotational_springs(&self, node_count: usize) -> Vec<(usize, f64)> {
        let trailing = (node_count - 1) * DOFS_PER_NODE + 2;
        self.leading_edge
            .rotational_spring()
            .map(|stiffness| (2, stiffness))
            .into_iter()
            .chain(
                self.trailing_edge
                    .rotational_spring()
                    .map(|stiffness| (trailing, stiffness)),
            )
            .collect()
    }

    fn elements(&self, mesh: &Mesh) -> Vec<BeamElement> {
        mesh.segments()
            .iter()
            .enumerate()
            .map(|(index, segment)| BeamElement {
                first_dof: segment.start * DOFS_PER_NODE,
                length: mesh.segment_length(index),
                axial_stiffness: self.axial_stiffness,
                bending_stiffness: self.bending_stiffness,
                pretension: self.pretension,
            })
            .collect()
    }
}

/// Displacement of one node relative to the undeformed surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDeflection {
    /// Displacement along the chord in metres.
    pub axial: f64,
    /// Displacement along the body normal, positive away from the fluid, in metres.
    pub normal: f64,
    /// Rotation `dw/ds` in radians.
    pub rotation: f64,
}

/// Deflection evaluated at an arbitrary arclength.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalDeflection {
    /// Axial displacement.
    pub axial: f64,
    /// Normal displacement.
    pub normal: f64,
    /// Slope of the normal displacement along the arclength.
    pub slope: f64,
    /// Derivative of the axial displacement along the arclength.
    pub axial_strain: f64,
}

/// Nodal deflection of the whole surface.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeflectionField {
    nodes: Vec<NodeDeflection>,
}

impl DeflectionField {
    /// Undeflected field with `node_count` nodes.
    #[must_use]
    pub fn zeros(node_count: usize) -> Self {
        Self {
            nodes: vec![NodeDeflection::default(); node_count],
        }
    }

    /// Build a field from a global degree-of-freedom vector.
    #[must_use]
    pub fn from_vector(vector: &DVector<f64>) -> Self {
        Self {
            nodes: vector
                .as_slice()
                .chunks_exact(DOFS_PER_NODE)
                .map(|dofs| NodeDeflection {
                    axial: dofs[0],
                    normal: dofs[1],
                    rotation: dofs[2],
                })
                .collect(),
        }
    }

    /// Flatten the field into a global degree-of-freedom vector.
    #[must_use]
    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.nodes.len() * DOFS_PER_NODE,
            self.nodes
                .iter()
                .flat_map(|node| [node.axial, node.normal, node.rotation]),
        )
    }

    /// Per-node deflections.
    #[must_use]
    pub fn nodes(&self) -> &[NodeDeflection] {
        &self.nodes
    }

    /// Largest normal displacement magnitude.
    #[must_use]
    pub fn max_normal(&self) -> f64 {
        self.nodes
            .iter()
            .map(|node| node.normal.abs())
            .fold(0.0, f64::max)
    }

    /// Confirm the field belongs to `mesh`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::FieldMismatch`] when the node counts differ.
    pub fn check(&self, mesh: &Mesh) -> Result<(), MeshError> {
        if self.nodes.len() == mesh.node_count() {
            Ok(())
        } else {
            Err(MeshError::FieldMismatch {
                expected: mesh.node_count(),
                found: self.nodes.len(),
            })
        }
    }

    /// Evaluate the field at arclength `s` with the element shape functions.
    #[must_use]
    pub fn evaluate(&self, mesh: &Mesh, s: f64) -> LocalDeflection {
        let (segment, t) = mesh.locate(s);
        let h = mesh.segment_length(segment);
        let start = self.nodes[mesh.segments()[segment].start];
        let end = self.nodes[mesh.segments()[segment].end];
        let transverse = [start.normal, start.rotation, end.normal, end.rotation];
        let dot = |basis: [f64; 4]| {
            basis
                .iter()
                .zip(transverse)
                .map(|(shape, value)| shape * value)
                .sum::<f64>()
        };
        LocalDeflection {
            axial: (1.0 - t) * start.axial + t * end.axial,
            normal: dot(hermite(t, h)),
            slope: dot(hermite_slope(t, h)),
            axial_strain: (end.axial - start.axial) / h,
        }
    }

    /// Move each nodal value a fraction `factor` of the way towards `target`.
    #[must_use]
    pub fn relax_toward(&self, target: &Self, factor: f64) -> Self {
        Self {
            nodes: self
                .nodes
                .iter()
                .zip(&target.nodes)
                .map(|(from, to)| NodeDeflection {
                    axial: from.axial + factor * (to.axial - from.axial),
                    normal: from.normal + factor * (to.normal - from.normal),
                    rotation: from.rotation + factor * (to.rotation - from.rotation),
                })
                .collect(),
        }
    }

    /// Interpolate the field from `from` onto the nodes of `to`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::FieldMismatch`] when the field does not belong to `from`.
    pub fn project(&self, from: &Mesh, to: &Mesh) -> Result<Self, MeshError> {
        self.check(from)?;
        Ok(Self {
            nodes: to
                .nodes()
                .iter()
                .map(|node| {
                    let local = self.evaluate(from, node.arclength);
                    NodeDeflection {
                        axial: local.axial,
                        normal: local.normal,
                        rotation: local.slope,
                    }
                })
                .collect(),
        })
    }
}

/// Solve the elastic equilibrium of the surface under `load`.
///
/// `initial` warm-starts the nonlinear Newton iteration; it is ignored by the
/// other modes.
///
/// # Errors
///
/// Returns [`StructuralError`] when the stiffness cannot be factorized, the Newton
/// iteration does not converge within its budget or the iterate stops being finite.
pub fn solve_deflection(
    mesh: &Mesh,
    properties: &StructuralProperties,
    load: &StructuralLoad<'_>,
    initial: Option<&DeflectionField>,
) -> Result<DeflectionField, StructuralError> {
    let node_count = mesh.node_count();
    match properties.mode {
        StructuralMode::Rigid => return Ok(DeflectionField::zeros(node_count)),
        _ if properties.is_unrestrained() => return Err(StructuralError::SingularStiffness),
        _ => {}
    }

    let external = load.assemble(mesh);
    let free_dofs: Vec<usize> = properties
        .restrained_dofs(node_count)
        .iter()
        .enumerate()
        .filter_map(|(dof, &fixed)| (!fixed).then_some(dof))
        .collect();
    let system = System {
        elements: properties.elements(mesh),
        springs: properties.rotational_springs(node_count),
        free_dofs,
    };

    let displacements = if properties.mode == StructuralMode::Linear {
        let zero = DVector::zeros(external.len());
        let (_, stiffness) = system.assemble(&zero, false);
        system.solve_increment(&stiffness, &external)?
    } else {
        let start = initial
            .filter(|field| field.check(mesh).is_ok())
            .map_or_else(|| DVector::zeros(external.len()), DeflectionField::to_vector);
        system.newton(properties, &external, start)?
    };
    if displacements.iter().all(|value| value.is_finite()) {
        Ok(DeflectionField::from_vector(&displacements))
    } else {
        Err(StructuralError::NonFinite)
    }
}

/// Assembled element chain with its supports.
struct System {
    elements: Vec<BeamElement>,
    springs: Vec<(usize, f64)>,
    free_dofs: Vec<usize>,
}

impl System {
    /// Assemble the global internal force vector and tangent stiffness.
    fn assemble(&self, displacements: &DVector<f64>, nonlinear: bool) -> (DVector<f64>, DMatrix<f64>) {
        let dof = displacements.len();
        let mut force = DVector::zeros(dof);
        let mut stiffness = DMatrix::zeros(dof, dof);
        for element in &self.elements {
            let base = element.first_dof;
            let local = ElementVector::from_iterator(displacements.rows(base, 6).iter().copied());
            let response = element.response(&local, nonlinear);
            for row in 0..6 {
                force[base + row] += response.force[row];
                for col in 0..6 {
                    stiffness[(base + row, base + col)] += response.stiffness[(row, col)];
                }
            }
        }
        for &(dof, spring) in &self.springs {
            force[dof] += spring * displacements[dof];
            stiffness[(dof, dof)] += spring;
        }
        (force, stiffness)
    }

    /// Solve the reduced system for the unconstrained degrees of freedom.
    fn solve_increment(
        &self,
        stiffness: &DMatrix<f64>,
        load: &DVector<f64>,
    ) -> Result<DVector<f64>, StructuralError> {
        let mut increment = DVector::zeros(load.len());
        let free_len = self.free_dofs.len();
        if free_len == 0 {
            return Ok(increment);
        }
        let mut k_ff = DMatrix::zeros(free_len, free_len);
        let mut f_f = DVector::zeros(free_len);
        for (row_idx, &row) in self.free_dofs.iter().enumerate() {
            f_f[row_idx] = load[row];
            for (col_idx, &col) in self.free_dofs.iter().enumerate() {
                k_ff[(row_idx, col_idx)] = stiffness[(row, col)];
            }
        }
        let solution = k_ff
            .lu()
            .solve(&f_f)
            .ok_or(StructuralError::SingularStiffness)?;
        for (idx, &dof) in self.free_dofs.iter().enumerate() {
            increment[dof] = solution[idx];
        }
        Ok(increment)
    }

    fn out_of_balance(&self, external: &DVector<f64>, internal: &DVector<f64>) -> (DVector<f64>, f64) {
        let mut residual = external - internal;
        let mut norm: f64 = 0.0;
        let mut free = self.free_dofs.iter().peekable();
        for dof in 0..residual.len() {
            if free.peek() == Some(&&dof) {
                free.next();
                norm = norm.max(residual[dof].abs());
            } else {
                residual[dof] = 0.0;
            }
        }
        (residual, norm)
    }

    /// Incremental Newton iteration on the nonlinear equilibrium equations.
    fn newton(
        &self,
        properties: &StructuralProperties,
        external: &DVector<f64>,
        mut displacements: DVector<f64>,
    ) -> Result<DVector<f64>, StructuralError> {
        let steps = properties.load_steps.max(1);
        let stiffness_scale = properties.axial_stiffness
            + properties.pretension
            + properties.bending_stiffness;
        for step in 1..=steps {
            #[allow(clippy::cast_precision_loss)]
            let target = external * (step as f64 / steps as f64);
            let force_scale = self
                .free_dofs
                .iter()
                .map(|&dof| target[dof].abs())
                .fold(1.0e-12 * stiffness_scale, f64::max);
            let mut iterations = 0;
            loop {
                let (internal, tangent) = self.assemble(&displacements, true);
                let (residual, norm) = self.out_of_balance(&target, &internal);
                if !norm.is_finite() {
                    return Err(StructuralError::NonFinite);
                }
                if norm <= properties.newton_tolerance * force_scale {
                    break;
                }
                if iterations == properties.max_newton_iterations {
                    return Err(StructuralError::Divergence {
                        load_step: step,
                        iterations,
                        residual: norm,
                    });
                }
                displacements += self.solve_increment(&tangent, &residual)?;
                iterations += 1;
            }
            log::trace!("load step {step}/{steps} converged in {iterations} Newton iterations");
        }
        Ok(displacements)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::hydro::{Panel, PressureField};
    use crate::mesh::{build_mesh, RefinementPolicy, SurfaceDefinition};

    fn mesh(elements: usize) -> Mesh {
        let policy = RefinementPolicy {
            elements,
            clustering: 0.0,
            corner_refinement: 0,
        };
        build_mesh(&SurfaceDefinition::default(), &policy).expect("valid mesh")
    }

    fn cantilever(mode: StructuralMode) -> StructuralProperties {
        StructuralProperties {
            mode,
            bending_stiffness: 100.0,
            axial_stiffness: 1.0e6,
            leading_edge: EndCondition::Clamped,
            trailing_edge: EndCondition::Free,
            ..StructuralProperties::default()
        }
    }

    fn uniform(pressure: f64) -> PressureField {
        PressureField::new(vec![Panel {
            start: 0.0,
            end: 1.0,
            vortex: 0.25,
            pressure,
        }])
    }

    #[test]
    fn uniform_load_matches_cantilever_formula() {
        let mesh = mesh(8);
        let properties = cantilever(StructuralMode::Linear);
        let pressure = uniform(10.0);
        let load = StructuralLoad::pressure_only(&pressure);
        let field = solve_deflection(&mesh, &properties, &load, None).expect("solves");
        let tip = field.nodes()[8];
        assert_relative_eq!(tip.normal, 10.0 / (8.0 * 100.0), epsilon = 1e-12);
        assert_relative_eq!(tip.rotation, 10.0 / (6.0 * 100.0), epsilon = 1e-12);
        assert_eq!(field.nodes()[0], NodeDeflection::default());
    }

    #[test]
    fn rigid_mode_never_deflects() {
        let mesh = mesh(4);
        let pressure = uniform(1.0e5);
        let load = StructuralLoad::pressure_only(&pressure);
        let field = solve_deflection(&mesh, &cantilever(StructuralMode::Rigid), &load, None)
            .expect("rigid surface solves");
        assert_eq!(field, DeflectionField::zeros(5));
    }

    #[test]
    fn torsional_spring_adds_root_rotation() {
        let mesh = mesh(4);
        let properties = StructuralProperties {
            leading_edge: EndCondition::TorsionalSpring { stiffness: 50.0 },
            point_loads: vec![PointLoad {
                arclength: 1.0,
                normal: 2.0,
                axial: 0.0,
            }],
            ..cantilever(StructuralMode::Linear)
        };
        let pressure = PressureField::default();
        let load = StructuralLoad::new(&pressure, &properties, nalgebra::Vector2::zeros(), 0.0);
        let field = solve_deflection(&mesh, &properties, &load, None).expect("solves");
        let expected = 2.0 / (3.0 * 100.0) + 2.0 / 50.0;
        assert_relative_eq!(field.nodes()[4].normal, expected, epsilon = 1e-12);
        assert_relative_eq!(field.nodes()[0].rotation, 2.0 / 50.0, epsilon = 1e-12);
    }

    #[test]
    fn free_free_surface_is_rejected() {
        let mesh = mesh(4);
        let properties = StructuralProperties {
            leading_edge: EndCondition::Free,
            trailing_edge: EndCondition::Free,
            ..StructuralProperties::default()
        };
        let pressure = uniform(1.0);
        let load = StructuralLoad::pressure_only(&pressure);
        assert_eq!(
            solve_deflection(&mesh, &properties, &load, None),
            Err(StructuralError::SingularStiffness)
        );
    }

    #[test]
    fn nonlinear_cantilever_shortens_without_stiffening() {
        let mesh = mesh(8);
        let properties = StructuralProperties {
            point_loads: vec![PointLoad {
                arclength: 1.0,
                normal: 30.0,
                axial: 0.0,
            }],
            ..cantilever(StructuralMode::Nonlinear)
        };
        let pressure = PressureField::default();
        let load = StructuralLoad::new(&pressure, &properties, nalgebra::Vector2::zeros(), 0.0);
        let field = solve_deflection(&mesh, &properties, &load, None).expect("converges");
        let tip = field.nodes()[8];
        assert_relative_eq!(tip.normal, 30.0 / 300.0, epsilon = 1e-8);
        let shortening = 30.0_f64.powi(2) / (15.0 * 100.0_f64.powi(2));
        assert_relative_eq!(tip.axial, -shortening, epsilon = 1e-8);
    }

    #[test]
    fn membrane_action_stiffens_pinned_plate() {
        let mesh = mesh(10);
        let linear = StructuralProperties {
            leading_edge: EndCondition::Pinned,
            trailing_edge: EndCondition::Pinned,
            bending_stiffness: 10.0,
            axial_stiffness: 1.0e5,
            ..cantilever(StructuralMode::Linear)
        };
        let nonlinear = StructuralProperties {
            mode: StructuralMode::Nonlinear,
            load_steps: 4,
            ..linear.clone()
        };
        let pressure = uniform(500.0);
        let load = StructuralLoad::pressure_only(&pressure);
        let small = solve_deflection(&mesh, &linear, &load, None).expect("linear solves");
        let large = solve_deflection(&mesh, &nonlinear, &load, None).expect("newton converges");
        let linear_mid = small.nodes()[5].normal;
        assert_relative_eq!(linear_mid, 5.0 * 500.0 / (384.0 * 10.0), epsilon = 1e-9);
        assert!(large.nodes()[5].normal > 0.0);
        assert!(large.nodes()[5].normal < 0.5 * linear_mid);
    }

    #[test]
    fn projection_preserves_shared_nodes() {
        let coarse = mesh(4);
        let fine = crate::mesh::refine(&coarse, 0.3..=0.6).expect("refined");
        let properties = cantilever(StructuralMode::Linear);
        let pressure = uniform(10.0);
        let load = StructuralLoad::pressure_only(&pressure);
        let field = solve_deflection(&coarse, &properties, &load, None).expect("solves");
        let projected = field.project(&coarse, &fine).expect("same mesh family");
        assert_eq!(projected.nodes().len(), fine.node_count());
        assert_eq!(projected.nodes()[0], field.nodes()[0]);
        assert_eq!(projected.nodes().last(), field.nodes().last());
        let middle = field.evaluate(&coarse, 0.375);
        assert_relative_eq!(projected.nodes()[2].normal, middle.normal, epsilon = 1e-15);
    }
}
