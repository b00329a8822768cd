use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub};

/// A 3-component tuple used for both points and free vectors.
///
/// The distinction between "point" and "vector" is carried by the call site,
/// not the type, mirroring the teacher's `Vec3`/`Point` aliasing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub e: [f64; 3],
}

pub type Point3 = Vec3;

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { e: [0.0, 0.0, 0.0] };

    pub fn new(e0: f64, e1: f64, e2: f64) -> Vec3 {
        Vec3 { e: [e0, e1, e2] }
    }

    pub fn splat(v: f64) -> Vec3 {
        Vec3::new(v, v, v)
    }

    pub fn x(&self) -> f64 {
        self.e[0]
    }
    pub fn y(&self) -> f64 {
        self.e[1]
    }
    pub fn z(&self) -> f64 {
        self.e[2]
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(&self) -> f64 {
        self.e[0] * self.e[0] + self.e[1] * self.e[1] + self.e[2] * self.e[2]
    }

    pub fn dot(&self, rhs: &Vec3) -> f64 {
        self.e[0] * rhs.e[0] + self.e[1] * rhs.e[1] + self.e[2] * rhs.e[2]
    }

    pub fn cross(&self, rhs: &Vec3) -> Vec3 {
        Vec3::new(
            self.e[1] * rhs.e[2] - self.e[2] * rhs.e[1],
            self.e[2] * rhs.e[0] - self.e[0] * rhs.e[2],
            self.e[0] * rhs.e[1] - self.e[1] * rhs.e[0],
        )
    }

    pub fn unit_vector(&self) -> Vec3 {
        *self / self.length()
    }

    /// Returns the unit vector and the original length in one call, so
    /// callers that need both (e.g. PDF conversions) don't pay for `sqrt`
    /// twice.
    pub fn normalize(&self) -> (Vec3, f64) {
        let len = self.length();
        (*self / len, len)
    }

    /// Index of the largest-magnitude component.
    pub fn dominant_axis(&self) -> usize {
        let a = self.e.map(f64::abs);
        if a[0] >= a[1] && a[0] >= a[2] {
            0
        } else if a[1] >= a[2] {
            1
        } else {
            2
        }
    }

    /// Index of the smallest-magnitude component.
    pub fn diminished_axis(&self) -> usize {
        let a = self.e.map(f64::abs);
        if a[0] <= a[1] && a[0] <= a[2] {
            0
        } else if a[1] <= a[2] {
            1
        } else {
            2
        }
    }

    pub fn is_finite(&self) -> bool {
        self.e.iter().all(|c| c.is_finite())
    }

    pub fn near_zero(&self) -> bool {
        const S: f64 = 1e-8;
        self.e.iter().all(|c| c.abs() < S)
    }

    pub fn min(&self, rhs: &Vec3) -> Vec3 {
        Vec3::new(
            self.e[0].min(rhs.e[0]),
            self.e[1].min(rhs.e[1]),
            self.e[2].min(rhs.e[2]),
        )
    }

    pub fn max(&self, rhs: &Vec3) -> Vec3 {
        Vec3::new(
            self.e[0].max(rhs.e[0]),
            self.e[1].max(rhs.e[1]),
            self.e[2].max(rhs.e[2]),
        )
    }
}

/// Computes sine and cosine of the same angle in one call.
///
/// `f64::sin_cos` already shares the underlying table lookup on most
/// platforms; this wrapper exists so call sites never accidentally call
/// `.sin()` and `.cos()` separately.
#[inline]
pub fn sin_cos(radians: f64) -> (f64, f64) {
    radians.sin_cos()
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.e[i]
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.e[i]
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.e[0], -self.e[1], -self.e[2])
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.e[0] + rhs.e[0], self.e[1] + rhs.e[1], self.e[2] + rhs.e[2])
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.e[0] - rhs.e[0], self.e[1] - rhs.e[1], self.e[2] - rhs.e[2])
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, t: f64) -> Vec3 {
        Vec3::new(self.e[0] * t, self.e[1] * t, self.e[2] * t)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        v * self
    }
}

impl MulAssign<f64> for Vec3 {
    fn mul_assign(&mut self, t: f64) {
        *self = *self * t;
    }
}

impl Div<f64> for Vec3 {
    type Output = Vec3;
    fn div(self, t: f64) -> Vec3 {
        self * (1.0 / t)
    }
}

impl DivAssign<f64> for Vec3 {
    fn div_assign(&mut self, t: f64) {
        *self *= 1.0 / t;
    }
}

/// A ray: `origin + t * direction`, `t > 0` being "ahead" of the origin.
///
/// Direction need not be normalized at construction (matches the teacher's
/// `Ray`); intersection code is expected to normalize before use, per
/// spec.md §3.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    origin: Point3,
    direction: Vec3,
}

impl Ray {
    pub fn new(origin: Point3, direction: Vec3) -> Ray {
        Ray { origin, direction }
    }

    pub fn at(&self, t: f64) -> Point3 {
        self.origin + self.direction * t
    }

    pub fn origin(&self) -> Point3 {
        self.origin
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Returns an equivalent ray with a unit-length direction.
    pub fn normalized(&self) -> Ray {
        Ray::new(self.origin, self.direction.unit_vector())
    }
}

/// A primary ray plus two auxiliary rays offset by one pixel in x/y image
/// space, used downstream to estimate texture-filter footprints.
#[derive(Debug, Clone, Copy)]
pub struct RayDifferential {
    pub primary: Ray,
    pub rx: Ray,
    pub ry: Ray,
}

impl RayDifferential {
    pub fn new(primary: Ray, rx: Ray, ry: Ray) -> RayDifferential {
        RayDifferential { primary, rx, ry }
    }

    pub fn normalized(&self) -> RayDifferential {
        RayDifferential::new(self.primary.normalized(), self.rx.normalized(), self.ry.normalized())
    }
}
