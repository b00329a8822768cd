//! Spectral path tracer (spec.md §4.7): the "Integrator" component that
//! turns a primary ray into a `Color3`.
//!
//! No teacher equivalent — the teacher's `Renderer::ray_color` is an RGB
//! recursive path tracer with no light sampler, no Russian roulette
//! parameters, and no compositor. Grounded directly on spec.md §4.7's
//! eight-step algorithm, reusing the teacher's overall "trace, shade,
//! recurse via a loop instead of actual recursion" shape (the teacher's own
//! `ray_color` is already iterative, bottoming out at a max-depth counter).
//!
//! Throughput `β` is conceptually a reflector (spec.md §4.7 step 1), but the
//! compositor's closed algebra (spec.md §4.2) has no reflector-times-reflector
//! combinator — only `add`, `attenuate` (by a scalar), and `reflect`
//! (spectrum × reflector). So rather than collapsing `β` into one handle
//! per bounce, each bounce's sampled reflector is kept in a small list and
//! replayed onto every emission/light/environment contribution via repeated
//! `reflect` calls when it is added to `L`; the purely scalar factors
//! (cos/pdf ratios, roulette compensation) are folded into a running `f64`
//! instead, since they don't depend on wavelength and so need no arena node
//! at all. Replaying the list costs `O(depth)` per contribution, which is
//! fine at the bounce counts spec.md's roulette parameters allow.

use std::sync::Arc;

use crate::color::cie::ColorIntegrator;
use crate::color::compositor::{ReflectorCompositor, ReflectorHandle, SpectrumCompositor, SpectrumHandle};
use crate::color::spectrum::SpectrumRef;
use crate::color::Color3;
use crate::light::LightSampler;
use crate::math::{Point3, Ray, RayDifferential, Vec3};
use crate::rng::Rng;
use crate::scene::{HitTester, Scene};

/// Bounce-count and Russian-roulette knobs (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
pub struct PathTracerConfig {
    /// Bounces below this are never subject to roulette.
    pub min_bounces: u32,
    /// Hard cap; the loop always terminates by this bounce.
    pub max_bounces: u32,
    /// Floor on roulette survival probability.
    pub min_termination_probability: f64,
    /// Albedo-weighted throughput magnitude below which roulette kicks in.
    pub roulette_threshold: f64,
}

/// Wraps an integrator so the render driver can stay independent of the
/// path algorithm (spec.md §3, component 11). Implementors must be
/// duplicable: the driver clones one instance per worker thread, each
/// getting its own compositor arenas.
pub trait SampleTracer: Send {
    fn integrate(&mut self, ray: &RayDifferential, rng: &mut Rng, epsilon: f64) -> Color3;

    fn duplicate(&self) -> Box<dyn SampleTracer>;
}

/// The path tracer described by spec.md §4.7.
pub struct PathTracer {
    scene: Arc<Scene>,
    lights: Arc<dyn LightSampler>,
    color_integrator: Arc<ColorIntegrator>,
    config: PathTracerConfig,
    spectra: SpectrumCompositor,
    reflectors: ReflectorCompositor,
}

impl PathTracer {
    pub fn new(
        scene: Arc<Scene>,
        lights: Arc<dyn LightSampler>,
        color_integrator: Arc<ColorIntegrator>,
        config: PathTracerConfig,
    ) -> PathTracer {
        PathTracer {
            scene,
            lights,
            color_integrator,
            config,
            spectra: SpectrumCompositor::new(),
            reflectors: ReflectorCompositor::new(),
        }
    }

    /// `from` is offset by `epsilon` along `direction` to dodge
    /// self-intersection; the shadow ray is tested up to just short of the
    /// light's distance.
    fn light_visible(&self, from: Point3, direction: Vec3, distance: f64, epsilon: f64) -> bool {
        let shadow_ray = Ray::new(from + direction * epsilon, direction);
        let mut tester = HitTester::new((distance - epsilon).max(0.0));
        self.scene.trace(&shadow_ray, &mut tester);
        tester.hit.is_none()
    }
}

/// Folds `base` through every reflector in `bounce_reflectors` (spectrum ×
/// reflector, repeated) and an optional extra reflector sampled at the
/// current bounce (used by direct light sampling's `bsdf_reflect`), scales
/// the result by `scale`, and adds it into `l`.
fn add_contribution<'s, 'r>(
    spectra: &'s SpectrumCompositor,
    l: SpectrumHandle<'s, 'r>,
    base: &SpectrumRef,
    bounce_reflectors: &[ReflectorHandle<'r>],
    extra_reflector: ReflectorHandle<'r>,
    scale: f64,
) -> SpectrumHandle<'s, 'r> {
    let mut node = spectra.leaf(base.clone()).ok().flatten();
    for &r in bounce_reflectors {
        node = spectra.reflect(node, r).ok().flatten();
    }
    if extra_reflector.is_some() {
        node = spectra.reflect(node, extra_reflector).ok().flatten();
    }
    node = spectra.attenuate(node, scale).ok().flatten();
    spectra.add(l, node).unwrap_or(l)
}

impl SampleTracer for PathTracer {
    fn integrate(&mut self, ray_diff: &RayDifferential, rng: &mut Rng, epsilon: f64) -> Color3 {
        self.spectra.reset();
        self.reflectors.reset();

        let mut ray = ray_diff.primary;
        let mut l: SpectrumHandle<'_, '_> = self.spectra.null();

        // Purely scalar part of beta (cos/pdf ratios, roulette compensation)
        // and the spectral part, kept separately per this module's doc
        // comment.
        let mut beta_scalar = 1.0f64;
        let mut beta_albedo = 1.0f64;
        let mut beta_reflectors: Vec<ReflectorHandle<'_>> = Vec::new();

        let mut bounce = 0u32;
        loop {
            let mut tester = HitTester::new(f64::INFINITY);
            self.scene.trace(&ray, &mut tester);

            let hit = match tester.hit {
                Some(h) => h,
                None => {
                    // Step 2: environmental-light contribution on a miss.
                    if let Some(env) = self.scene.environment() {
                        let radiance = env.radiance(ray.direction());
                        l = add_contribution(&self.spectra, l, &radiance, &beta_reflectors, None, beta_scalar);
                    }
                    break;
                }
            };

            // Materials expect the geometric normal flipped to the incident
            // side (material.rs's doc comment), matching the teacher's
            // `front_face` handling.
            let facing_normal =
                if ray.direction().dot(&hit.normal) < 0.0 { hit.normal } else { -hit.normal };

            // Step 3: emission only counts on the camera ray itself; any
            // light hit by a later bounce is only ever counted through
            // direct light sampling, avoiding double-counting without MIS.
            if bounce == 0 {
                if let Some(emissive) = self.scene.emissive_material_at(&hit) {
                    if let Some(emitted) = emissive.emission() {
                        l = add_contribution(&self.spectra, l, &emitted, &beta_reflectors, None, beta_scalar);
                    }
                }
            }

            let material = match self.scene.material_at(&hit) {
                Some(m) => m,
                None => break,
            };

            // Step 4.
            let sample = match material.sample_bsdf(ray.direction(), facing_normal, rng, &self.reflectors) {
                Some(s) if s.pdf > 0.0 => s,
                _ => break,
            };

            // Step 5: next-event estimation against one sampled light.
            if let Some(light_sample) = self.lights.sample(hit.point, rng) {
                let cos_theta = light_sample.direction.dot(&facing_normal);
                if cos_theta > 0.0 && light_sample.pdf > 0.0 {
                    let bsdf_val = material.bsdf_reflect(ray.direction(), light_sample.direction, facing_normal, &self.reflectors);
                    if bsdf_val.is_some() && self.light_visible(hit.point, light_sample.direction, light_sample.distance, epsilon) {
                        let scale = beta_scalar * cos_theta / light_sample.pdf;
                        l = add_contribution(&self.spectra, l, &light_sample.spectrum, &beta_reflectors, bsdf_val, scale);
                    }
                }
            }

            // Step 6.
            let cos_theta_bsdf = sample.outgoing.dot(&facing_normal).abs();
            beta_scalar *= cos_theta_bsdf / sample.pdf;
            beta_albedo *= self.reflectors.albedo(sample.reflector);
            beta_reflectors.push(sample.reflector);

            // Step 7: Russian roulette, only once past min_bounces.
            bounce += 1;
            if bounce >= self.config.min_bounces {
                let magnitude = beta_scalar * beta_albedo;
                if magnitude < self.config.roulette_threshold {
                    let survival = magnitude.max(self.config.min_termination_probability).min(1.0);
                    if rng.uniform_float(0.0, 1.0) >= survival {
                        break;
                    }
                    beta_scalar /= survival;
                }
            }
            if bounce >= self.config.max_bounces {
                break;
            }

            // Step 8: reconstruct the next ray, offset along the side the
            // outgoing direction actually leaves from.
            let offset = if sample.outgoing.dot(&facing_normal) >= 0.0 { facing_normal } else { -facing_normal };
            ray = Ray::new(hit.point + offset * epsilon, sample.outgoing);
        }

        let spectra = &self.spectra;
        let reflectors = &self.reflectors;
        self.color_integrator.integrate_fn(|lambda| spectra.sample(l, lambda, reflectors))
    }

    fn duplicate(&self) -> Box<dyn SampleTracer> {
        Box::new(PathTracer {
            scene: self.scene.clone(),
            lights: self.lights.clone(),
            color_integrator: self.color_integrator.clone(),
            config: self.config,
            spectra: SpectrumCompositor::new(),
            reflectors: ReflectorCompositor::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::reflector::ConstantReflector;
    use crate::color::spectrum::ConstantSpectrum;
    use crate::light::{ConstantEnvironmentLight, UniformLightSampler};
    use crate::material::Lambertian;
    use crate::scene::ShapePlacement;
    use crate::shape::Sphere;

    fn default_config() -> PathTracerConfig {
        PathTracerConfig { min_bounces: 3, max_bounces: 8, min_termination_probability: 0.05, roulette_threshold: 1.0 }
    }

    fn camera_ray() -> RayDifferential {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        RayDifferential::new(ray, ray, ray)
    }

    #[test]
    fn empty_scene_with_no_environment_integrates_to_black() {
        let scene = Arc::new(Scene::build(vec![], None).unwrap());
        let lights = Arc::new(UniformLightSampler::new(vec![]));
        let mut tracer = PathTracer::new(scene, lights, Arc::new(ColorIntegrator), default_config());
        let mut rng = Rng::new(1, 2);
        let color = tracer.integrate(&camera_ray(), &mut rng, 1e-4);
        assert_eq!(color.c, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_scene_with_constant_environment_integrates_to_its_radiance() {
        let scene = Arc::new(Scene::build(vec![], None).unwrap());
        let lights = Arc::new(UniformLightSampler::new(vec![]));
        let mut tracer = PathTracer::new(scene, lights, Arc::new(ColorIntegrator), default_config());
        let mut rng = Rng::new(1, 2);
        let background = tracer.integrate(&camera_ray(), &mut rng, 1e-4);
        assert_eq!(background.c, [0.0, 0.0, 0.0]);

        let scene_with_env =
            Arc::new(Scene::build(vec![], Some(Arc::new(ConstantEnvironmentLight::new(Arc::new(ConstantSpectrum::new(1.0)))))).unwrap());
        let lights = Arc::new(UniformLightSampler::new(vec![]));
        let mut tracer = PathTracer::new(scene_with_env, lights, Arc::new(ColorIntegrator), default_config());
        let color = tracer.integrate(&camera_ray(), &mut rng, 1e-4);
        assert!(color.c[1] > 0.0, "expected nonzero Y from a lit background, got {:?}", color.c);
    }

    #[test]
    fn camera_ray_hitting_an_emissive_sphere_head_on_returns_its_emission() {
        use crate::material::DiffuseLight;
        let emissive = Arc::new(DiffuseLight::new(Arc::new(ConstantSpectrum::new(2.0))));
        let placement = ShapePlacement {
            shape: Arc::new(Sphere::new_emissive(
                Vec3::new(0.0, 0.0, 5.0),
                1.0,
                Arc::new(Lambertian::new(Arc::new(ConstantReflector::white()))),
                emissive,
            )),
            transform: None,
            premultiplied: false,
        };
        let scene = Arc::new(Scene::build(vec![placement], None).unwrap());
        let lights = Arc::new(UniformLightSampler::new(vec![]));
        let mut tracer = PathTracer::new(scene, lights, Arc::new(ColorIntegrator), default_config());
        let mut rng = Rng::new(3, 4);
        let color = tracer.integrate(&camera_ray(), &mut rng, 1e-4);
        assert!(color.c[1] > 0.0, "expected nonzero emitted Y, got {:?}", color.c);
    }

    #[test]
    fn duplicate_produces_an_independent_tracer_with_fresh_arenas() {
        let scene = Arc::new(Scene::build(vec![], None).unwrap());
        let lights = Arc::new(UniformLightSampler::new(vec![]));
        let tracer = PathTracer::new(scene, lights, Arc::new(ColorIntegrator), default_config());
        let mut dup = tracer.duplicate();
        let mut rng = Rng::new(5, 6);
        let color = dup.integrate(&camera_ray(), &mut rng, 1e-4);
        assert_eq!(color.c, [0.0, 0.0, 0.0]);
    }
}
