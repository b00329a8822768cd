use super::vector::{Point3, Ray, Vec3};

/// A row-major 4x4 matrix used for affine `model_to_world`/`world_to_model`
/// transforms. Only the affine subset (no projective divide) is needed by
/// any caller in this crate; the bottom row is always `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4 {
    pub m: [[f64; 4]; 4],
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(t: Vec3) -> Matrix4 {
        let mut m = Matrix4::IDENTITY;
        m.m[0][3] = t.x();
        m.m[1][3] = t.y();
        m.m[2][3] = t.z();
        m
    }

    pub fn scaling(s: Vec3) -> Matrix4 {
        let mut m = Matrix4::IDENTITY;
        m.m[0][0] = s.x();
        m.m[1][1] = s.y();
        m.m[2][2] = s.z();
        m
    }

    pub fn mul(&self, rhs: &Matrix4) -> Matrix4 {
        let mut out = [[0.0; 4]; 4];
        for r in 0..4 {
            for c in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += self.m[r][k] * rhs.m[k][c];
                }
                out[r][c] = sum;
            }
        }
        Matrix4 { m: out }
    }

    /// Transform a point (implicit homogeneous w = 1).
    pub fn transform_point(&self, p: Point3) -> Point3 {
        let x = self.m[0][0] * p.x() + self.m[0][1] * p.y() + self.m[0][2] * p.z() + self.m[0][3];
        let y = self.m[1][0] * p.x() + self.m[1][1] * p.y() + self.m[1][2] * p.z() + self.m[1][3];
        let z = self.m[2][0] * p.x() + self.m[2][1] * p.y() + self.m[2][2] * p.z() + self.m[2][3];
        Vec3::new(x, y, z)
    }

    /// Transform a free vector (implicit homogeneous w = 0, translation
    /// dropped).
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let x = self.m[0][0] * v.x() + self.m[0][1] * v.y() + self.m[0][2] * v.z();
        let y = self.m[1][0] * v.x() + self.m[1][1] * v.y() + self.m[1][2] * v.z();
        let z = self.m[2][0] * v.x() + self.m[2][1] * v.y() + self.m[2][2] * v.z();
        Vec3::new(x, y, z)
    }

    pub fn transform_ray(&self, r: &Ray) -> Ray {
        Ray::new(self.transform_point(r.origin()), self.transform_vector(r.direction()))
    }

    /// Transform a normal by the inverse-transpose (callers pass the
    /// `world_to_model` matrix here, i.e. this expects `self` to already be
    /// the inverse of the forward transform).
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        let x = self.m[0][0] * n.x() + self.m[1][0] * n.y() + self.m[2][0] * n.z();
        let y = self.m[0][1] * n.x() + self.m[1][1] * n.y() + self.m[2][1] * n.z();
        let z = self.m[0][2] * n.x() + self.m[1][2] * n.y() + self.m[2][2] * n.z();
        Vec3::new(x, y, z)
    }

    /// Gauss-Jordan inverse. Affine matrices built from translate/scale/rotate
    /// compositions are always invertible in this crate's usage; callers that
    /// hand in a singular matrix get `None`.
    pub fn inverse(&self) -> Option<Matrix4> {
        let mut a = self.m;
        let mut inv = Matrix4::IDENTITY.m;

        for col in 0..4 {
            let mut pivot_row = col;
            let mut pivot_val = a[col][col].abs();
            for r in (col + 1)..4 {
                if a[r][col].abs() > pivot_val {
                    pivot_val = a[r][col].abs();
                    pivot_row = r;
                }
            }
            if pivot_val < 1e-12 {
                return None;
            }
            a.swap(col, pivot_row);
            inv.swap(col, pivot_row);

            let pivot = a[col][col];
            for c in 0..4 {
                a[col][c] /= pivot;
                inv[col][c] /= pivot;
            }
            for r in 0..4 {
                if r == col {
                    continue;
                }
                let factor = a[r][col];
                for c in 0..4 {
                    a[r][c] -= factor * a[col][c];
                    inv[r][c] -= factor * inv[col][c];
                }
            }
        }
        Some(Matrix4 { m: inv })
    }
}
