//! Voxel-to-world affine transformation

use serde::{Deserialize, Serialize};

/// 3×4 affine transformation between voxel indices and world (scanner) millimetres.
///
/// ```text
/// x = m[0][0]*i + m[0][1]*j + m[0][2]*k + m[0][3]
/// y = m[1][0]*i + m[1][1]*j + m[1][2]*k + m[1][3]
/// z = m[2][0]*i + m[2][1]*j + m[2][2]*k + m[2][3]
/// ```
///
/// Voxel indices address voxel centres, as in the NIfTI sform convention.
/// The same type also serves as a world-to-world mapping for linear transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine3 {
    /// Rows of the upper 3×4 block of the homogeneous matrix
    pub matrix: [[f64; 4]; 3],
}

impl Affine3 {
    /// Create from the upper 3×4 block of a homogeneous matrix
    pub fn new(matrix: [[f64; 4]; 3]) -> Self {
        Self { matrix }
    }

    /// The identity transformation
    pub fn identity() -> Self {
        Self::from_spacing([1.0, 1.0, 1.0], [0.0, 0.0, 0.0])
    }

    /// Axis-aligned transformation with the given voxel spacing and origin
    pub fn from_spacing(spacing: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            matrix: [
                [spacing[0], 0.0, 0.0, origin[0]],
                [0.0, spacing[1], 0.0, origin[1]],
                [0.0, 0.0, spacing[2], origin[2]],
            ],
        }
    }

    /// Pure translation
    pub fn translation(offset: [f64; 3]) -> Self {
        Self::from_spacing([1.0, 1.0, 1.0], offset)
    }

    /// Apply to a point
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.matrix;
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2] + m[0][3],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2] + m[1][3],
            m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2] + m[2][3],
        ]
    }

    /// World coordinates of the centre of voxel (i, j, k)
    pub fn voxel_to_world(&self, ijk: [usize; 3]) -> [f64; 3] {
        self.apply([ijk[0] as f64, ijk[1] as f64, ijk[2] as f64])
    }

    /// Determinant of the linear part
    pub fn determinant(&self) -> f64 {
        let m = &self.matrix;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Inverse transformation, `None` if the linear part is singular
    pub fn inverse(&self) -> Option<Affine3> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }

        let m = &self.matrix;
        let inv_det = 1.0 / det;

        // Adjugate of the 3x3 linear part
        let a = [
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
            ],
        ];

        let t = [m[0][3], m[1][3], m[2][3]];
        let mut out = [[0.0; 4]; 3];
        for r in 0..3 {
            out[r][..3].copy_from_slice(&a[r]);
            out[r][3] = -(a[r][0] * t[0] + a[r][1] * t[1] + a[r][2] * t[2]);
        }

        Some(Affine3 { matrix: out })
    }

    /// Composition `self ∘ other`: applies `other` first, then `self`
    pub fn then_after(&self, other: &Affine3) -> Affine3 {
        let a = &self.matrix;
        let b = &other.matrix;
        let mut out = [[0.0; 4]; 3];
        for r in 0..3 {
            for c in 0..4 {
                let mut v = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c];
                if c == 3 {
                    v += a[r][3];
                }
                out[r][c] = v;
            }
        }
        Affine3 { matrix: out }
    }

    /// Voxel size along each index axis (column norms of the linear part)
    pub fn voxel_sizes(&self) -> [f64; 3] {
        let m = &self.matrix;
        let mut sizes = [0.0; 3];
        for (c, size) in sizes.iter_mut().enumerate() {
            *size = (m[0][c] * m[0][c] + m[1][c] * m[1][c] + m[2][c] * m[2][c]).sqrt();
        }
        sizes
    }

    /// Element-wise comparison within `tol`
    pub fn approx_eq(&self, other: &Affine3, tol: f64) -> bool {
        self.matrix
            .iter()
            .flatten()
            .zip(other.matrix.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for Affine3 {
    fn default() -> Self {
        Self::identity()
    }
}
