//! Maps normalized image/lens UVs to a ray (differential) via a pluggable
//! ray-generation callback (spec.md §3/§4.4).
//!
//! Grounded on the teacher's `src/camera.rs` (`Camera::get_ray(u, v)`,
//! `origin`/`horizontal`/`vertical`/`lower_left_corner`), generalized from a
//! single hardcoded pinhole camera into the vtable + configurable-extent
//! shape spec.md asks for.

use crate::error::{Result, Status};
use crate::math::{Point3, Ray, RayDifferential, Vec3};

/// The pluggable ray-generation callback a concrete camera model
/// implements. `image_u`/`image_v` and `lens_u`/`lens_v` arrive already
/// remapped onto the camera's configured extents.
pub trait RayGenerator: Send + Sync {
    fn generate_ray(&self, image_u: f64, image_v: f64, lens_u: f64, lens_v: f64) -> Ray;
}

/// A rectangular extent `[min, max]` in one axis, used for both the image
/// UV domain and the lens UV domain.
#[derive(Debug, Clone, Copy)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

impl Extent {
    pub fn new(min: f64, max: f64) -> Result<Extent> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(Status::InvalidArgument("extent"));
        }
        Ok(Extent { min, max })
    }

    pub fn zero() -> Extent {
        Extent { min: 0.0, max: 0.0 }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    fn remap(&self, u: f64) -> f64 {
        self.min + u * self.width()
    }
}

/// Camera: a `RayGenerator` plus the four image-UV and four lens-UV extents
/// spec.md §3 describes. The driver remaps sampler UVs in `[0,1]` onto
/// these extents before invoking the callback.
pub struct Camera {
    generator: Box<dyn RayGenerator>,
    image_u: Extent,
    image_v: Extent,
    lens_u: Extent,
    lens_v: Extent,
}

impl Camera {
    pub fn new(generator: Box<dyn RayGenerator>, image_u: Extent, image_v: Extent, lens_u: Extent, lens_v: Extent) -> Camera {
        Camera { generator, image_u, image_v, lens_u, lens_v }
    }

    /// A pinhole-equivalent zero-area lens: callers must not pass lens UVs
    /// into `generate_ray_differential` for such a camera (spec.md §4.4,
    /// §8 property 9).
    pub fn has_lens(&self) -> bool {
        self.lens_u.width() > 0.0 || self.lens_v.width() > 0.0
    }

    /// Builds a ray differential by invoking `generate_ray` three times:
    /// the primary sample, and the same sample offset by one pixel's worth
    /// of footprint in each image axis (spec.md §4.4).
    pub fn generate_ray_differential(
        &self,
        pixel_u: f64,
        pixel_v: f64,
        dpixel_u: f64,
        dpixel_v: f64,
        lens_uv: Option<(f64, f64)>,
    ) -> RayDifferential {
        debug_assert_eq!(lens_uv.is_some(), self.has_lens(), "lens UV presence must match camera's lens extent");

        let (lens_u, lens_v) = lens_uv.map(|(u, v)| (self.lens_u.remap(u), self.lens_v.remap(v))).unwrap_or((0.0, 0.0));

        let image_u = self.image_u.remap(pixel_u);
        let image_v = self.image_v.remap(pixel_v);
        let primary = self.generator.generate_ray(image_u, image_v, lens_u, lens_v);

        let dx_u = self.image_u.remap((pixel_u + dpixel_u).min(1.0));
        let rx = self.generator.generate_ray(dx_u, image_v, lens_u, lens_v);

        let dy_v = self.image_v.remap((pixel_v + dpixel_v).min(1.0));
        let ry = self.generator.generate_ray(image_u, dy_v, lens_u, lens_v);

        RayDifferential::new(primary, rx, ry)
    }
}

/// A simple pinhole camera: rays from a single `origin` through a
/// view-plane rectangle, no lens sampling. Direct generalization of the
/// teacher's `Camera::get_ray`.
pub struct PinholeCamera {
    origin: Point3,
    lower_left_corner: Point3,
    horizontal: Vec3,
    vertical: Vec3,
}

impl PinholeCamera {
    pub fn new(origin: Point3, look_at: Point3, up: Vec3, vfov_degrees: f64, aspect_ratio: f64) -> PinholeCamera {
        let theta = vfov_degrees.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h;
        let viewport_width = aspect_ratio * viewport_height;

        let w = (origin - look_at).unit_vector();
        let u = up.cross(&w).unit_vector();
        let v = w.cross(&u);

        let horizontal = u * viewport_width;
        let vertical = v * viewport_height;

        PinholeCamera {
            origin,
            horizontal,
            vertical,
            lower_left_corner: origin - horizontal / 2.0 - vertical / 2.0 - w,
        }
    }
}

impl RayGenerator for PinholeCamera {
    fn generate_ray(&self, image_u: f64, image_v: f64, _lens_u: f64, _lens_v: f64) -> Ray {
        let target = self.lower_left_corner + self.horizontal * image_u + self.vertical * image_v;
        Ray::new(self.origin, target - self.origin)
    }
}

/// A thin-lens camera with a finite aperture, exercising the nontrivial
/// lens-UV path. Grounded on the teacher's depth-of-field example
/// (`raytracer/examples/depth_of_field_camera.rs` samples a unit disk for
/// the lens offset); generalized here to go through the shared `lens_u`/
/// `lens_v` extent instead of sampling a disk directly.
pub struct ThinLensCamera {
    origin: Point3,
    lower_left_corner: Point3,
    horizontal: Vec3,
    vertical: Vec3,
    u: Vec3,
    v: Vec3,
    lens_radius: f64,
}

impl ThinLensCamera {
    pub fn new(
        origin: Point3,
        look_at: Point3,
        up: Vec3,
        vfov_degrees: f64,
        aspect_ratio: f64,
        aperture: f64,
        focus_dist: f64,
    ) -> ThinLensCamera {
        let theta = vfov_degrees.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h;
        let viewport_width = aspect_ratio * viewport_height;

        let w = (origin - look_at).unit_vector();
        let u = up.cross(&w).unit_vector();
        let v = w.cross(&u);

        let horizontal = u * viewport_width * focus_dist;
        let vertical = v * viewport_height * focus_dist;

        ThinLensCamera {
            origin,
            horizontal,
            vertical,
            u,
            v,
            lens_radius: aperture / 2.0,
            lower_left_corner: origin - horizontal / 2.0 - vertical / 2.0 - w * focus_dist,
        }
    }
}

impl RayGenerator for ThinLensCamera {
    fn generate_ray(&self, image_u: f64, image_v: f64, lens_u: f64, lens_v: f64) -> Ray {
        // lens_u/lens_v arrive in [-1, 1] via the camera's lens extent;
        // reject outside the unit disk by rescaling radially (cheap, avoids
        // a rejection loop on the hot path).
        let r = (lens_u * lens_u + lens_v * lens_v).sqrt().min(1.0);
        let theta = lens_v.atan2(lens_u);
        let (s, c) = theta.sin_cos();
        let offset = (self.u * (r * c) + self.v * (r * s)) * self.lens_radius;

        let target = self.lower_left_corner + self.horizontal * image_u + self.vertical * image_v;
        Ray::new(self.origin + offset, target - self.origin - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_lens_extent_reports_no_lens() {
        let camera = Camera::new(
            Box::new(PinholeCamera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 1.0, 0.0), 90.0, 1.0)),
            Extent::new(0.0, 1.0).unwrap(),
            Extent::new(0.0, 1.0).unwrap(),
            Extent::zero(),
            Extent::zero(),
        );
        assert!(!camera.has_lens());
    }

    #[test]
    fn nonzero_lens_extent_reports_has_lens() {
        let camera = Camera::new(
            Box::new(PinholeCamera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 1.0, 0.0), 90.0, 1.0)),
            Extent::new(0.0, 1.0).unwrap(),
            Extent::new(0.0, 1.0).unwrap(),
            Extent::new(-1.0, 1.0).unwrap(),
            Extent::new(-1.0, 1.0).unwrap(),
        );
        assert!(camera.has_lens());
    }

    #[test]
    fn extent_rejects_min_greater_than_max() {
        assert!(Extent::new(1.0, 0.0).is_err());
        assert!(Extent::new(f64::NAN, 1.0).is_err());
        assert!(Extent::new(0.0, 1.0).is_ok());
    }

    #[test]
    fn pinhole_camera_center_pixel_points_at_look_at_direction() {
        let origin = Vec3::new(0.0, 0.0, 0.0);
        let look_at = Vec3::new(0.0, 0.0, -1.0);
        let camera = PinholeCamera::new(origin, look_at, Vec3::new(0.0, 1.0, 0.0), 90.0, 1.0);
        let ray = camera.generate_ray(0.5, 0.5, 0.0, 0.0);
        let dir = ray.direction().unit_vector();
        assert!(dir.z() < 0.0, "center ray should point roughly toward -z, got {:?}", dir);
        assert!(dir.x().abs() < 1e-9 && dir.y().abs() < 1e-9);
    }

    #[test]
    fn thin_lens_camera_with_zero_aperture_matches_pinhole_direction() {
        let origin = Vec3::new(0.0, 0.0, 0.0);
        let look_at = Vec3::new(0.0, 0.0, -1.0);
        let pinhole = PinholeCamera::new(origin, look_at, Vec3::new(0.0, 1.0, 0.0), 90.0, 1.0);
        let thin_lens = ThinLensCamera::new(origin, look_at, Vec3::new(0.0, 1.0, 0.0), 90.0, 1.0, 0.0, 1.0);

        let a = pinhole.generate_ray(0.3, 0.7, 0.0, 0.0).direction().unit_vector();
        let b = thin_lens.generate_ray(0.3, 0.7, 0.0, 0.0).direction().unit_vector();
        assert!((a.x() - b.x()).abs() < 1e-9 && (a.y() - b.y()).abs() < 1e-9 && (a.z() - b.z()).abs() < 1e-9);
    }
}
