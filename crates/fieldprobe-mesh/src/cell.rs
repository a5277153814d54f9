//! Cell model: kinds, shape functions, and position evaluation.
//!
//! A [`Cell`] is a value type carrying its kind, vertex ids, and vertex
//! positions. The deep virtual cell hierarchy of classic visualization
//! toolkits is replaced by a [`CellKind`] tag plus shape-function tables
//! indexed by kind.

use glam::{DMat3, DVec3};

/// Iteration cap for the hexahedron's Newton solve.
const HEX_MAX_ITERATION: usize = 20;
/// Parametric convergence threshold for the Newton solve.
const HEX_CONVERGED: f64 = 1e-5;
/// Slack on parametric inside checks, to absorb roundoff on shared faces.
const PCOORD_EPS: f64 = 1e-10;

/// The kind of a cell, which fixes its vertex count and shape functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Linear triangle, 3 vertices, 2D.
    Triangle,
    /// Linear tetrahedron, 4 vertices.
    Tetra,
    /// Axis-aligned box, 8 vertices in lexicographic (x-fastest) order.
    Voxel,
    /// Trilinear hexahedron, 8 vertices, bottom face then top face.
    Hexahedron,
}

impl CellKind {
    /// Number of vertices for this kind.
    #[must_use]
    pub fn num_vertices(self) -> usize {
        match self {
            CellKind::Triangle => 3,
            CellKind::Tetra => 4,
            CellKind::Voxel | CellKind::Hexahedron => 8,
        }
    }

    /// Topological dimension.
    #[must_use]
    pub fn dimension(self) -> usize {
        match self {
            CellKind::Triangle => 2,
            _ => 3,
        }
    }

    /// Number of distinct kinds; sized for per-kind scratch caches.
    pub const COUNT: usize = 4;

    /// Dense index of this kind, in `0..COUNT`.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            CellKind::Triangle => 0,
            CellKind::Tetra => 1,
            CellKind::Voxel => 2,
            CellKind::Hexahedron => 3,
        }
    }
}

/// Result of evaluating a query position against a cell.
#[derive(Debug, Clone)]
pub struct PositionEval {
    /// True when the parametric coordinates fall inside the cell.
    pub inside: bool,
    /// Parametric coordinates of the query point.
    pub pcoords: DVec3,
    /// Interpolation weights, one per vertex; sum to 1 for valid pcoords.
    pub weights: Vec<f64>,
    /// Squared distance from the query point to the cell.
    ///
    /// Zero for points inside a 3D cell; for triangles this is the squared
    /// off-plane distance even when the projection lands inside.
    pub dist2: f64,
}

/// Where a query point sits relative to a cell, without the weights.
///
/// Returned by [`Cell::evaluate_position_into`], which writes the weights
/// into a caller-owned buffer instead of allocating per call.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    /// True when the parametric coordinates fall inside the cell.
    pub inside: bool,
    /// Parametric coordinates of the query point.
    pub pcoords: DVec3,
    /// Squared distance from the query point to the cell.
    pub dist2: f64,
}

/// A single cell of a source dataset.
#[derive(Debug, Clone)]
pub struct Cell {
    kind: CellKind,
    vertex_ids: Vec<u32>,
    points: Vec<DVec3>,
}

impl Cell {
    /// Creates a cell from its kind, global vertex ids, and positions.
    ///
    /// # Panics
    /// Panics if the vertex count does not match the kind.
    #[must_use]
    pub fn new(kind: CellKind, vertex_ids: Vec<u32>, points: Vec<DVec3>) -> Self {
        assert_eq!(vertex_ids.len(), kind.num_vertices());
        assert_eq!(points.len(), kind.num_vertices());
        Self {
            kind,
            vertex_ids,
            points,
        }
    }

    /// Returns the cell kind.
    #[must_use]
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Global ids of the cell's vertices.
    #[must_use]
    pub fn vertex_ids(&self) -> &[u32] {
        &self.vertex_ids
    }

    /// Vertex positions, parallel to `vertex_ids`.
    #[must_use]
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    /// Rebuilds this cell in place, reusing its buffers.
    ///
    /// `position_of` maps each global vertex id to its position. Scratch
    /// cells in hot probing loops are refilled through this instead of
    /// being reallocated per cell.
    ///
    /// # Panics
    /// Panics if the vertex count does not match the kind.
    pub fn assign(
        &mut self,
        kind: CellKind,
        vertex_ids: &[u32],
        mut position_of: impl FnMut(u32) -> DVec3,
    ) {
        assert_eq!(vertex_ids.len(), kind.num_vertices());
        self.kind = kind;
        self.vertex_ids.clear();
        self.vertex_ids.extend_from_slice(vertex_ids);
        self.points.clear();
        self.points.extend(vertex_ids.iter().map(|&id| position_of(id)));
    }

    /// Axis-aligned bounding box of the cell.
    #[must_use]
    pub fn bounding_box(&self) -> (DVec3, DVec3) {
        let mut min = self.points[0];
        let mut max = self.points[0];
        for p in &self.points[1..] {
            min = min.min(*p);
            max = max.max(*p);
        }
        (min, max)
    }

    /// Squared length of the bounding box diagonal.
    #[must_use]
    pub fn length_squared(&self) -> f64 {
        let (min, max) = self.bounding_box();
        (max - min).length_squared()
    }

    /// Shape-function weights at the given parametric coordinates.
    #[must_use]
    pub fn interpolation_weights(&self, pcoords: DVec3) -> Vec<f64> {
        let mut weights = Vec::with_capacity(self.points.len());
        self.interpolation_weights_into(pcoords, &mut weights);
        weights
    }

    /// Writes the shape-function weights into `out`, replacing its contents.
    pub fn interpolation_weights_into(&self, pcoords: DVec3, out: &mut Vec<f64>) {
        let (r, s, t) = (pcoords.x, pcoords.y, pcoords.z);
        out.clear();
        match self.kind {
            CellKind::Triangle => out.extend_from_slice(&[1.0 - r - s, r, s]),
            CellKind::Tetra => out.extend_from_slice(&[1.0 - r - s - t, r, s, t]),
            CellKind::Voxel => {
                let (rm, sm, tm) = (1.0 - r, 1.0 - s, 1.0 - t);
                out.extend_from_slice(&[
                    rm * sm * tm,
                    r * sm * tm,
                    rm * s * tm,
                    r * s * tm,
                    rm * sm * t,
                    r * sm * t,
                    rm * s * t,
                    r * s * t,
                ]);
            }
            CellKind::Hexahedron => {
                let (rm, sm, tm) = (1.0 - r, 1.0 - s, 1.0 - t);
                out.extend_from_slice(&[
                    rm * sm * tm,
                    r * sm * tm,
                    r * s * tm,
                    rm * s * tm,
                    rm * sm * t,
                    r * sm * t,
                    r * s * t,
                    rm * s * t,
                ]);
            }
        }
    }

    /// Shape-function parametric gradients at the given coordinates.
    #[must_use]
    pub fn interpolation_derivs(&self, pcoords: DVec3) -> Vec<DVec3> {
        let (r, s, t) = (pcoords.x, pcoords.y, pcoords.z);
        match self.kind {
            CellKind::Triangle => vec![
                DVec3::new(-1.0, -1.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
            CellKind::Tetra => vec![
                DVec3::new(-1.0, -1.0, -1.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(0.0, 0.0, 1.0),
            ],
            CellKind::Voxel => {
                let (rm, sm, tm) = (1.0 - r, 1.0 - s, 1.0 - t);
                vec![
                    DVec3::new(-sm * tm, -rm * tm, -rm * sm),
                    DVec3::new(sm * tm, -r * tm, -r * sm),
                    DVec3::new(-s * tm, rm * tm, -rm * s),
                    DVec3::new(s * tm, r * tm, -r * s),
                    DVec3::new(-sm * t, -rm * t, rm * sm),
                    DVec3::new(sm * t, -r * t, r * sm),
                    DVec3::new(-s * t, rm * t, rm * s),
                    DVec3::new(s * t, r * t, r * s),
                ]
            }
            CellKind::Hexahedron => {
                let (rm, sm, tm) = (1.0 - r, 1.0 - s, 1.0 - t);
                vec![
                    DVec3::new(-sm * tm, -rm * tm, -rm * sm),
                    DVec3::new(sm * tm, -r * tm, -r * sm),
                    DVec3::new(s * tm, r * tm, -r * s),
                    DVec3::new(-s * tm, rm * tm, -rm * s),
                    DVec3::new(-sm * t, -rm * t, rm * sm),
                    DVec3::new(sm * t, -r * t, r * sm),
                    DVec3::new(s * t, r * t, r * s),
                    DVec3::new(-s * t, rm * t, rm * s),
                ]
            }
        }
    }

    /// World position at the given parametric coordinates.
    #[must_use]
    pub fn world_position(&self, pcoords: DVec3) -> DVec3 {
        let weights = self.interpolation_weights(pcoords);
        let mut x = DVec3::ZERO;
        for (p, w) in self.points.iter().zip(&weights) {
            x += *p * *w;
        }
        x
    }

    /// Evaluates a query position against this cell.
    #[must_use]
    pub fn evaluate_position(&self, x: DVec3) -> PositionEval {
        let placement = self.place(x);
        PositionEval {
            inside: placement.inside,
            pcoords: placement.pcoords,
            weights: self.interpolation_weights(placement.pcoords),
            dist2: placement.dist2,
        }
    }

    /// Evaluates a query position, writing the weights into `weights`.
    ///
    /// Same result as [`Cell::evaluate_position`] without allocating; hot
    /// loops pass one buffer reused across calls.
    pub fn evaluate_position_into(&self, x: DVec3, weights: &mut Vec<f64>) -> Placement {
        let placement = self.place(x);
        self.interpolation_weights_into(placement.pcoords, weights);
        placement
    }

    fn place(&self, x: DVec3) -> Placement {
        match self.kind {
            CellKind::Triangle => self.evaluate_triangle(x),
            CellKind::Tetra => self.evaluate_tetra(x),
            CellKind::Voxel => self.evaluate_voxel(x),
            CellKind::Hexahedron => self.evaluate_hexahedron(x),
        }
    }

    fn evaluate_triangle(&self, x: DVec3) -> Placement {
        let (p0, p1, p2) = (self.points[0], self.points[1], self.points[2]);
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let n = e1.cross(e2);
        // Degenerate triangle: report a miss at infinite distance.
        if n.length_squared() == 0.0 {
            return Placement {
                inside: false,
                pcoords: DVec3::ZERO,
                dist2: f64::INFINITY,
            };
        }
        // x - p0 = r e1 + s e2 + h n, solved exactly; h n is the off-plane part.
        let m = DMat3::from_cols(e1, e2, n);
        let rsh = m.inverse() * (x - p0);
        let (r, s, h) = (rsh.x, rsh.y, rsh.z);
        let plane_dist2 = (h * n).length_squared();

        let pcoords = DVec3::new(r, s, 0.0);
        let inside =
            r >= -PCOORD_EPS && s >= -PCOORD_EPS && r + s <= 1.0 + PCOORD_EPS;
        let dist2 = if inside {
            plane_dist2
        } else {
            let clamped = clamp_simplex2(r, s);
            let cx = p0 + clamped.0 * e1 + clamped.1 * e2;
            (x - cx).length_squared()
        };
        Placement {
            inside,
            pcoords,
            dist2,
        }
    }

    fn evaluate_tetra(&self, x: DVec3) -> Placement {
        let p0 = self.points[0];
        let m = DMat3::from_cols(
            self.points[1] - p0,
            self.points[2] - p0,
            self.points[3] - p0,
        );
        if m.determinant().abs() == 0.0 {
            return Placement {
                inside: false,
                pcoords: DVec3::ZERO,
                dist2: f64::INFINITY,
            };
        }
        let pcoords = m.inverse() * (x - p0);
        let (r, s, t) = (pcoords.x, pcoords.y, pcoords.z);
        let inside = r >= -PCOORD_EPS
            && s >= -PCOORD_EPS
            && t >= -PCOORD_EPS
            && r + s + t <= 1.0 + PCOORD_EPS;
        let dist2 = if inside {
            0.0
        } else {
            let c = clamp_simplex3(r, s, t);
            (x - self.world_position(c)).length_squared()
        };
        Placement {
            inside,
            pcoords,
            dist2,
        }
    }

    fn evaluate_voxel(&self, x: DVec3) -> Placement {
        let min = self.points[0];
        let max = self.points[7];
        let ext = max - min;
        if ext.min_element() <= 0.0 {
            return Placement {
                inside: false,
                pcoords: DVec3::ZERO,
                dist2: f64::INFINITY,
            };
        }
        let pcoords = (x - min) / ext;
        let inside = pcoords.min_element() >= -PCOORD_EPS
            && pcoords.max_element() <= 1.0 + PCOORD_EPS;
        let dist2 = if inside {
            0.0
        } else {
            let clamped = pcoords.clamp(DVec3::ZERO, DVec3::ONE);
            (x - (min + clamped * ext)).length_squared()
        };
        Placement {
            inside,
            pcoords,
            dist2,
        }
    }

    fn evaluate_hexahedron(&self, x: DVec3) -> Placement {
        // Newton iteration on the trilinear map, seeded at the center.
        let mut pcoords = DVec3::splat(0.5);
        let mut converged = false;
        for _ in 0..HEX_MAX_ITERATION {
            let f = self.world_position(pcoords) - x;
            let derivs = self.interpolation_derivs(pcoords);
            let mut jac = DMat3::ZERO;
            for (p, d) in self.points.iter().zip(&derivs) {
                jac += DMat3::from_cols(*p * d.x, *p * d.y, *p * d.z);
            }
            if jac.determinant().abs() < 1e-20 {
                break;
            }
            let dp = jac.inverse() * f;
            pcoords -= dp;
            if dp.abs().max_element() < HEX_CONVERGED {
                converged = true;
                break;
            }
        }
        if !converged {
            // Distorted or degenerate geometry: report a miss.
            return Placement {
                inside: false,
                pcoords,
                dist2: f64::INFINITY,
            };
        }
        let inside = pcoords.min_element() >= -PCOORD_EPS
            && pcoords.max_element() <= 1.0 + PCOORD_EPS;
        let dist2 = if inside {
            0.0
        } else {
            let clamped = pcoords.clamp(DVec3::ZERO, DVec3::ONE);
            (x - self.world_position(clamped)).length_squared()
        };
        Placement {
            inside,
            pcoords,
            dist2,
        }
    }

    /// Derivative tensor of a 3-component field given at the cell corners.
    ///
    /// `values` holds one `[vx, vy, vz]` triple per vertex. The result is
    /// row-major `d v_i / d x_j`: `[dvx/dx, dvx/dy, dvx/dz, dvy/dx, ...]`.
    /// Corner-based (linear within the cell), which is what vorticity and
    /// rotation bookkeeping expect.
    #[must_use]
    pub fn derivatives(&self, pcoords: DVec3, values: &[f64]) -> [f64; 9] {
        assert_eq!(values.len(), 3 * self.points.len());
        let derivs = self.interpolation_derivs(pcoords);
        let mut out = [0.0; 9];

        if self.kind == CellKind::Triangle {
            return self.triangle_derivatives(values);
        }

        let mut jac = DMat3::ZERO;
        for (p, d) in self.points.iter().zip(&derivs) {
            jac += DMat3::from_cols(*p * d.x, *p * d.y, *p * d.z);
        }
        if jac.determinant().abs() < 1e-20 {
            return out;
        }
        // grad_x f = J^{-T} grad_r f
        let jinv_t = jac.inverse().transpose();
        for comp in 0..3 {
            let mut grad_r = DVec3::ZERO;
            for (i, d) in derivs.iter().enumerate() {
                grad_r += *d * values[i * 3 + comp];
            }
            let grad_x = jinv_t * grad_r;
            out[comp * 3] = grad_x.x;
            out[comp * 3 + 1] = grad_x.y;
            out[comp * 3 + 2] = grad_x.z;
        }
        out
    }

    fn triangle_derivatives(&self, values: &[f64]) -> [f64; 9] {
        // In-plane gradient from the two edge directions; the out-of-plane
        // derivative of a surface field is taken as zero.
        let e1 = self.points[1] - self.points[0];
        let e2 = self.points[2] - self.points[0];
        let n = e1.cross(e2);
        let mut out = [0.0; 9];
        if n.length_squared() == 0.0 {
            return out;
        }
        let m = DMat3::from_cols(e1, e2, n).inverse().transpose();
        for comp in 0..3 {
            // f(r, s) = f0 + r (f1 - f0) + s (f2 - f0), constant along n
            let g = DVec3::new(
                values[3 + comp] - values[comp],
                values[6 + comp] - values[comp],
                0.0,
            );
            let grad = m * g;
            out[comp * 3] = grad.x;
            out[comp * 3 + 1] = grad.y;
            out[comp * 3 + 2] = grad.z;
        }
        out
    }
}

/// Clamps 2D barycentric-style coordinates back onto the unit simplex.
fn clamp_simplex2(r: f64, s: f64) -> (f64, f64) {
    let r = r.max(0.0);
    let s = s.max(0.0);
    let sum = r + s;
    if sum > 1.0 {
        (r / sum, s / sum)
    } else {
        (r, s)
    }
}

/// Clamps 3D barycentric-style coordinates back onto the unit simplex.
fn clamp_simplex3(r: f64, s: f64, t: f64) -> DVec3 {
    let r = r.max(0.0);
    let s = s.max(0.0);
    let t = t.max(0.0);
    let sum = r + s + t;
    if sum > 1.0 {
        DVec3::new(r / sum, s / sum, t / sum)
    } else {
        DVec3::new(r, s, t)
    }
}
