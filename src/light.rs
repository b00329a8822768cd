//! Light sampling and environmental (background) radiance (spec.md §3,
//! component 12: "collect candidate lights at a shading point with
//! per-sample probabilities; provide background radiance for escaping
//! rays").
//!
//! No direct teacher equivalent — the teacher's renderer carries a flat
//! `background_color: Color` instead of a light sampler, since its only
//! illumination comes from `DiffuseLight` materials hit by chance. Grounded
//! on that `background_color` field for `ConstantEnvironmentLight`, and
//! designed from spec.md §4.7 step 5 for everything else.

use std::sync::Arc;

use crate::color::spectrum::SpectrumRef;
use crate::math::{Point3, Vec3};
use crate::rng::Rng;

/// One drawn light sample: its spectrum, the direction and distance from
/// the shading point to the light (for the shadow ray), and the solid-angle
/// PDF of having drawn it.
pub struct LightSample {
    pub spectrum: SpectrumRef,
    pub direction: Vec3,
    pub distance: f64,
    pub pdf: f64,
}

/// A single light source.
pub trait Light: Send + Sync {
    fn sample(&self, at: Point3, rng: &mut Rng) -> Option<LightSample>;
}

pub type LightRef = Arc<dyn Light>;

/// An idealized point light: intensity falls off with inverse-square
/// distance, and the direction/distance are exact (no solid-angle
/// integration needed), so `pdf` is always `1` (a delta distribution).
pub struct PointLight {
    position: Point3,
    intensity: SpectrumRef,
}

impl PointLight {
    pub fn new(position: Point3, intensity: SpectrumRef) -> PointLight {
        PointLight { position, intensity }
    }
}

impl Light for PointLight {
    fn sample(&self, at: Point3, _rng: &mut Rng) -> Option<LightSample> {
        let to_light = self.position - at;
        let distance_sq = to_light.length_squared();
        if distance_sq < 1e-12 {
            return None;
        }
        let (direction, distance) = to_light.normalize();
        Some(LightSample {
            spectrum: Arc::new(FalloffSpectrum { base: self.intensity.clone(), inv_distance_sq: 1.0 / distance_sq }),
            direction,
            distance,
            pdf: 1.0,
        })
    }
}

struct FalloffSpectrum {
    base: SpectrumRef,
    inv_distance_sq: f64,
}

impl crate::color::spectrum::Spectrum for FalloffSpectrum {
    fn sample(&self, lambda: f64) -> f64 {
        self.base.sample(lambda) * self.inv_distance_sq
    }
}

/// Collects candidate lights at a shading point (spec.md §4.7 step 5).
pub trait LightSampler: Send + Sync {
    fn sample(&self, at: Point3, rng: &mut Rng) -> Option<LightSample>;
}

/// Picks uniformly among a fixed set of lights, dividing the chosen light's
/// PDF by the light count so the overall estimator stays unbiased.
pub struct UniformLightSampler {
    lights: Vec<LightRef>,
}

impl UniformLightSampler {
    pub fn new(lights: Vec<LightRef>) -> UniformLightSampler {
        UniformLightSampler { lights }
    }
}

impl LightSampler for UniformLightSampler {
    fn sample(&self, at: Point3, rng: &mut Rng) -> Option<LightSample> {
        if self.lights.is_empty() {
            return None;
        }
        let idx = rng.bounded_index(0, self.lights.len() as i64 - 1) as usize;
        let mut sample = self.lights[idx].sample(at, rng)?;
        sample.pdf /= self.lights.len() as f64;
        Some(sample)
    }
}

/// Background radiance for rays that escape all scene geometry.
pub trait EnvironmentLight: Send + Sync {
    fn radiance(&self, direction: Vec3) -> SpectrumRef;
}

/// A direction-independent background, grounded on the teacher's
/// `background_color` field.
pub struct ConstantEnvironmentLight {
    spectrum: SpectrumRef,
}

impl ConstantEnvironmentLight {
    pub fn new(spectrum: SpectrumRef) -> ConstantEnvironmentLight {
        ConstantEnvironmentLight { spectrum }
    }
}

impl EnvironmentLight for ConstantEnvironmentLight {
    fn radiance(&self, _direction: Vec3) -> SpectrumRef {
        self.spectrum.clone()
    }
}
