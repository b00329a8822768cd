//! Surface scattering models (spec.md §4.7 steps 4-6).
//!
//! Grounded on the teacher's `materials::lambertian::Lambertian`,
//! `materials::metal::Metal` and `materials::dielectric::Dielectric`
//! (`scatter(ray, hit_record) -> Option<(Color, Ray)>`), reworked to operate
//! on `Reflector`/`ReflectorCompositor` handles instead of RGB `Color`, and
//! split into a BSDF-sample path (for continuing a path) and a separate
//! BSDF-evaluate path (for next-event / direct light sampling), which the
//! teacher's single `scatter` doesn't need since it has no light sampling.

use std::sync::Arc;

use crate::color::compositor::{ReflectorCompositor, ReflectorHandle};
use crate::color::reflector::ReflectorRef;
use crate::color::spectrum::SpectrumRef;
use crate::math::Vec3;
use crate::rng::Rng;

/// One BSDF sample: the outgoing direction, its reflector weight (already
/// divided by `pdf` is *not* assumed; callers divide explicitly per spec.md
/// §4.7 step 6), and the sampling PDF with respect to solid angle.
pub struct BsdfSample<'r> {
    pub outgoing: Vec3,
    pub reflector: ReflectorHandle<'r>,
    pub pdf: f64,
}

/// A surface scattering model. `normal` is always the geometric normal on
/// the incident side (callers flip it before calling in, matching the
/// teacher's `front_face` handling in `hit_record`).
pub trait Material: Send + Sync {
    /// Draws an outgoing direction and its reflector weight. Returns `None`
    /// for a pure absorber (and for emissive-only surfaces, which don't
    /// scatter further).
    fn sample_bsdf<'r>(
        &self,
        incoming: Vec3,
        normal: Vec3,
        rng: &mut Rng,
        reflectors: &'r ReflectorCompositor,
    ) -> Option<BsdfSample<'r>>;

    /// Evaluates the BSDF for an explicit `(incoming, outgoing)` pair, used
    /// by direct light sampling (spec.md §4.7 step 5). Materials with a
    /// delta component (mirrors, dielectrics) can never be hit by a
    /// continuous light-direction sample and return `None`.
    fn bsdf_reflect<'r>(
        &self,
        incoming: Vec3,
        outgoing: Vec3,
        normal: Vec3,
        reflectors: &'r ReflectorCompositor,
    ) -> ReflectorHandle<'r>;

    /// Constant emitted radiance, for materials attached via
    /// `Shape::emissive_material_of`. Non-emissive materials (including all
    /// scattering-only ones below) return `None`.
    fn emission(&self) -> Option<SpectrumRef> {
        None
    }
}

pub type MaterialRef = Arc<dyn Material>;

fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - n * (2.0 * v.dot(&n))
}

/// Snell's law refraction. `n` must point against `uv` (i.e. into the
/// incident medium); `etai_over_etat` is the ratio of the incident medium's
/// index of refraction to the transmitted medium's.
fn refract(uv: Vec3, n: Vec3, etai_over_etat: f64) -> Vec3 {
    let cos_theta = (-uv).dot(&n).min(1.0);
    let r_out_perp = (uv + n * cos_theta) * etai_over_etat;
    let r_out_parallel = n * -((1.0 - r_out_perp.length_squared()).abs().sqrt());
    r_out_perp + r_out_parallel
}

fn schlick_reflectance(cosine: f64, ref_idx: f64) -> f64 {
    let r0 = (1.0 - ref_idx) / (1.0 + ref_idx);
    let r0 = r0 * r0;
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

/// A sample on the cosine-weighted hemisphere about `normal`, built the way
/// the teacher builds diffuse scatter directions (`normal + random unit
/// vector`, `materials/lambertian.rs`) rather than via an explicit
/// orthonormal basis.
fn cosine_sample_about(normal: Vec3, rng: &mut Rng) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.uniform_float(-1.0, 1.0),
            rng.uniform_float(-1.0, 1.0),
            rng.uniform_float(-1.0, 1.0),
        );
        let lensq = p.length_squared();
        if lensq > 1e-12 && lensq <= 1.0 {
            let direction = normal + p / lensq.sqrt();
            if !direction.near_zero() {
                return direction.unit_vector();
            }
        }
    }
}

/// A perfectly diffuse (Lambertian) surface. Grounded on
/// `materials/lambertian.rs`: `albedo` there is an RGB `Color`; here it is a
/// spectral `Reflector`.
pub struct Lambertian {
    albedo: ReflectorRef,
}

impl Lambertian {
    pub fn new(albedo: ReflectorRef) -> Lambertian {
        Lambertian { albedo }
    }
}

impl Material for Lambertian {
    fn sample_bsdf<'r>(
        &self,
        _incoming: Vec3,
        normal: Vec3,
        rng: &mut Rng,
        reflectors: &'r ReflectorCompositor,
    ) -> Option<BsdfSample<'r>> {
        let outgoing = cosine_sample_about(normal, rng);
        let cos_theta = outgoing.dot(&normal).max(0.0);
        let pdf = cos_theta / std::f64::consts::PI;
        if pdf <= 0.0 {
            return None;
        }
        // Bare BSDF value f = albedo / pi; the caller applies cos(theta)
        // itself (spec.md §4.7 step 6), so it must not be folded in here.
        let leaf = reflectors.leaf(self.albedo.clone()).ok()?;
        let reflector = reflectors.attenuate(leaf, 1.0 / std::f64::consts::PI).ok()?;
        Some(BsdfSample { outgoing, reflector, pdf })
    }

    fn bsdf_reflect<'r>(
        &self,
        _incoming: Vec3,
        outgoing: Vec3,
        normal: Vec3,
        reflectors: &'r ReflectorCompositor,
    ) -> ReflectorHandle<'r> {
        if outgoing.dot(&normal) <= 0.0 {
            return None;
        }
        let leaf = reflectors.leaf(self.albedo.clone()).unwrap_or(None);
        reflectors.attenuate(leaf, 1.0 / std::f64::consts::PI).unwrap_or(None)
    }
}

/// A mirror with optional fuzz, grounded on `materials/metal.rs`. Fuzz
/// perturbs the reflected direction by a random vector scaled by `fuzz`;
/// `fuzz = 0` is a perfect mirror (a delta BSDF, so `bsdf_reflect` is always
/// zero since a continuous light direction almost never lands on the exact
/// reflection vector).
pub struct Metal {
    albedo: ReflectorRef,
    fuzz: f64,
}

impl Metal {
    pub fn new(albedo: ReflectorRef, fuzz: f64) -> Metal {
        Metal { albedo, fuzz: fuzz.clamp(0.0, 1.0) }
    }
}

impl Material for Metal {
    fn sample_bsdf<'r>(
        &self,
        incoming: Vec3,
        normal: Vec3,
        rng: &mut Rng,
        reflectors: &'r ReflectorCompositor,
    ) -> Option<BsdfSample<'r>> {
        let reflected = reflect(incoming.unit_vector(), normal);
        let fuzzed = if self.fuzz > 0.0 {
            (reflected + random_in_unit_sphere(rng) * self.fuzz).unit_vector()
        } else {
            reflected
        };
        let cos_theta = fuzzed.dot(&normal);
        if cos_theta <= 0.0 {
            return None;
        }
        // A delta BSDF's value is conventionally defined with the cosine
        // term pre-divided out, so that the caller's uniform
        // `reflector * cos(theta) / pdf` update (spec.md §4.7 step 6) still
        // recovers plain `albedo` with `pdf = 1`.
        let leaf = reflectors.leaf(self.albedo.clone()).ok()?;
        let reflector = reflectors.attenuate(leaf, 1.0 / cos_theta).ok()?;
        Some(BsdfSample { outgoing: fuzzed, reflector, pdf: 1.0 })
    }

    fn bsdf_reflect<'r>(
        &self,
        _incoming: Vec3,
        _outgoing: Vec3,
        _normal: Vec3,
        _reflectors: &'r ReflectorCompositor,
    ) -> ReflectorHandle<'r> {
        None
    }
}

fn random_in_unit_sphere(rng: &mut Rng) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.uniform_float(-1.0, 1.0),
            rng.uniform_float(-1.0, 1.0),
            rng.uniform_float(-1.0, 1.0),
        );
        if p.length_squared() <= 1.0 {
            return p;
        }
    }
}

/// A smooth dielectric (glass), grounded on `materials/dielectric.rs`:
/// Snell's law refraction with a total-internal-reflection check, and
/// Schlick's approximation to probabilistically pick between reflection and
/// transmission. A delta BSDF, same as `Metal`.
pub struct Dielectric {
    index_of_refraction: f64,
}

impl Dielectric {
    pub fn new(index_of_refraction: f64) -> Dielectric {
        Dielectric { index_of_refraction }
    }
}

impl Material for Dielectric {
    fn sample_bsdf<'r>(
        &self,
        incoming: Vec3,
        normal: Vec3,
        rng: &mut Rng,
        reflectors: &'r ReflectorCompositor,
    ) -> Option<BsdfSample<'r>> {
        let front_face = incoming.dot(&normal) < 0.0;
        let outward_normal = if front_face { normal } else { -normal };
        let refraction_ratio = if front_face { 1.0 / self.index_of_refraction } else { self.index_of_refraction };

        let unit_direction = incoming.unit_vector();
        let cos_theta = (-unit_direction).dot(&outward_normal).min(1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

        let cannot_refract = refraction_ratio * sin_theta > 1.0;
        let reflectance = schlick_reflectance(cos_theta, refraction_ratio);

        let outgoing = if cannot_refract || reflectance > rng.uniform_float(0.0, 1.0) {
            reflect(unit_direction, outward_normal)
        } else {
            refract(unit_direction, outward_normal, refraction_ratio)
        };

        // Glass is a perfect transmitter/reflector: no energy is absorbed.
        // As with `Metal`, the delta BSDF value is defined with the cosine
        // pre-divided out (using the geometric normal, not `outward_normal`,
        // since a refracted `outgoing` crosses to the far side of it) so the
        // caller's `reflector * cos(theta) / pdf` recovers unit transmittance.
        let cos_theta = outgoing.dot(&normal).abs();
        if cos_theta <= 1e-12 {
            return None;
        }
        let white = reflectors.white().ok()?;
        let reflector = reflectors.attenuate(white, 1.0 / cos_theta).ok()?;
        Some(BsdfSample { outgoing, reflector, pdf: 1.0 })
    }

    fn bsdf_reflect<'r>(
        &self,
        _incoming: Vec3,
        _outgoing: Vec3,
        _normal: Vec3,
        _reflectors: &'r ReflectorCompositor,
    ) -> ReflectorHandle<'r> {
        None
    }
}

/// A constant-radiance area emitter, grounded on
/// `materials/lights/diffuse_light.rs` (`DiffuseLight::emitted`). Never
/// scatters: attach it to a shape via `Shape::emissive_material_of` and
/// attach a separate `Material` (often `Lambertian`) for the reflective
/// side, as the teacher's single-material-per-shape model conflates the two
/// and spec.md §3 splits them back apart.
pub struct DiffuseLight {
    emission: SpectrumRef,
}

impl DiffuseLight {
    pub fn new(emission: SpectrumRef) -> DiffuseLight {
        DiffuseLight { emission }
    }
}

impl Material for DiffuseLight {
    fn sample_bsdf<'r>(
        &self,
        _incoming: Vec3,
        _normal: Vec3,
        _rng: &mut Rng,
        _reflectors: &'r ReflectorCompositor,
    ) -> Option<BsdfSample<'r>> {
        None
    }

    fn bsdf_reflect<'r>(
        &self,
        _incoming: Vec3,
        _outgoing: Vec3,
        _normal: Vec3,
        _reflectors: &'r ReflectorCompositor,
    ) -> ReflectorHandle<'r> {
        None
    }

    fn emission(&self) -> Option<SpectrumRef> {
        Some(self.emission.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::reflector::ConstantReflector;
    use crate::color::spectrum::ConstantSpectrum;

    #[test]
    fn lambertian_outgoing_direction_stays_in_upper_hemisphere() {
        let material = Lambertian::new(Arc::new(ConstantReflector::new(0.8)));
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let mut rng = Rng::new(11, 22);
        let reflectors = ReflectorCompositor::new();
        for _ in 0..200 {
            let sample = material.sample_bsdf(Vec3::new(0.0, -1.0, 0.0), normal, &mut rng, &reflectors).unwrap();
            assert!(sample.outgoing.dot(&normal) > 0.0);
            assert!(sample.pdf > 0.0);
        }
    }

    #[test]
    fn lambertian_bsdf_reflect_zero_below_horizon() {
        let material = Lambertian::new(Arc::new(ConstantReflector::white()));
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let reflectors = ReflectorCompositor::new();
        let below = Vec3::new(0.0, -1.0, 0.0);
        assert!(material.bsdf_reflect(Vec3::ZERO, below, normal, &reflectors).is_none());
    }

    #[test]
    fn metal_perfect_mirror_reflects_incoming_about_normal() {
        let material = Metal::new(Arc::new(ConstantReflector::new(0.9)), 0.0);
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let incoming = Vec3::new(1.0, -1.0, 0.0).unit_vector();
        let mut rng = Rng::new(1, 1);
        let reflectors = ReflectorCompositor::new();
        let sample = material.sample_bsdf(incoming, normal, &mut rng, &reflectors).unwrap();
        assert_eq!(sample.pdf, 1.0);
        assert!(sample.outgoing.y() > 0.0);
        // The reflector weight, pre-divided by cos(theta), should recover
        // plain albedo once the integrator multiplies back in cos(theta).
        let cos_theta = sample.outgoing.dot(&normal);
        let recovered = reflectors.sample(sample.reflector, 500.0, 1.0) * cos_theta;
        assert!((recovered - 0.9).abs() < 1e-9);
    }

    #[test]
    fn metal_fuzzed_below_horizon_returns_none() {
        // A fuzz of 1.0 with a grazing incoming ray can push the reflection
        // below the surface; the material must reject those samples rather
        // than returning a negative-cosine outgoing direction.
        let material = Metal::new(Arc::new(ConstantReflector::white()), 1.0);
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let incoming = Vec3::new(1.0, -0.001, 0.0).unit_vector();
        let mut rng = Rng::new(3, 4);
        let reflectors = ReflectorCompositor::new();
        for _ in 0..200 {
            if let Some(sample) = material.sample_bsdf(incoming, normal, &mut rng, &reflectors) {
                assert!(sample.outgoing.dot(&normal) > 0.0);
            }
        }
    }

    #[test]
    fn dielectric_transmittance_recovers_unit_albedo() {
        let material = Dielectric::new(1.5);
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let incoming = Vec3::new(0.0, -1.0, 0.0);
        let mut rng = Rng::new(5, 6);
        let reflectors = ReflectorCompositor::new();
        let sample = material.sample_bsdf(incoming, normal, &mut rng, &reflectors).unwrap();
        let cos_theta = sample.outgoing.dot(&normal).abs();
        let recovered = reflectors.sample(sample.reflector, 500.0, 1.0) * cos_theta;
        assert!((recovered - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dielectric_and_metal_have_no_continuous_bsdf_reflect() {
        let reflectors = ReflectorCompositor::new();
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let glass = Dielectric::new(1.5);
        let mirror = Metal::new(Arc::new(ConstantReflector::white()), 0.0);
        assert!(glass.bsdf_reflect(Vec3::ZERO, normal, normal, &reflectors).is_none());
        assert!(mirror.bsdf_reflect(Vec3::ZERO, normal, normal, &reflectors).is_none());
    }

    #[test]
    fn diffuse_light_emits_but_never_scatters() {
        let light = DiffuseLight::new(Arc::new(ConstantSpectrum::new(5.0)));
        let reflectors = ReflectorCompositor::new();
        let mut rng = Rng::new(1, 1);
        let normal = Vec3::new(0.0, 1.0, 0.0);
        assert!(light.sample_bsdf(Vec3::ZERO, normal, &mut rng, &reflectors).is_none());
        assert!(light.emission().is_some());
    }
}
