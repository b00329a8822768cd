//! The chunked, multi-threaded render driver (spec.md §4.8).
//!
//! Grounded on the teacher's `renderer::render` (per-pixel sample loop,
//! `write_color`'s scale-then-write averaging, a progress callback invoked
//! every few pixels) but re-architected around spec.md §5's determinism
//! contract: the teacher hands pixels to `rayon`'s work-stealing
//! `par_chunks_mut`, whose scheduling order isn't reproducible and whose
//! per-pixel randomness comes from a thread-global RNG. Here, threads are
//! spawned explicitly (`crossbeam::thread::scope`), chunk ownership is
//! drained from one atomic counter, and every chunk's random stream is a
//! pre-replicated `Rng` that depends only on the base seed and the chunk's
//! index — so `T=1` and `T=N` produce bit-identical framebuffers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::camera::Camera;
use crate::color::{color_add, Color3, ColorSpace};
use crate::error::{Result, Status};
use crate::framebuffer::Framebuffer;
use crate::integrator::SampleTracer;
use crate::math::{Matrix4, RayDifferential};
use crate::rng::Rng;
use crate::sampler::ImageSampler;
use crate::scene::Scene;

/// Columns per chunk (spec.md §4.8).
pub const CHUNK_SIZE: u32 = 32;

/// Called on chunk boundaries by thread 0 only; an error cancels the render
/// (spec.md §4.8).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, num_pixels: u64, pixels_rendered: u64) -> Result<()>;
}

/// A `ProgressReporter` backed by an `indicatif` bar, grounded on the
/// teacher's `scenes::render_scene` (`ProgressBar::new`, a
/// spinner/bar/message template). Never errors: a progress bar can't fail in
/// a way that should cancel the render.
pub struct IndicatifProgressReporter {
    bar: indicatif::ProgressBar,
}

impl IndicatifProgressReporter {
    pub fn new(num_pixels: u64) -> IndicatifProgressReporter {
        let bar = indicatif::ProgressBar::new(num_pixels);
        bar.set_style(
            indicatif::ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("#>-"),
        );
        IndicatifProgressReporter { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report(&self, num_pixels: u64, pixels_rendered: u64) -> Result<()> {
        self.bar.set_length(num_pixels);
        self.bar.set_position(pixels_rendered);
        if pixels_rendered >= num_pixels {
            self.bar.finish();
        }
        Ok(())
    }
}

struct Shared<'a> {
    scene: &'a Scene,
    camera: &'a Camera,
    scene_to_world: Matrix4,
    framebuffer: &'a Framebuffer,
    epsilon: f64,
    rngs: Vec<Rng>,
    chunk_counter: AtomicU64,
    cancelled: AtomicBool,
    num_rows: u32,
    num_cols: u32,
    num_chunks: u64,
    pixels_per_chunk: u64,
    num_pixels: u64,
    progress: Option<Arc<dyn ProgressReporter>>,
}

/// Renders one pixel: draws `num_samples` from `sampler`, hands each to
/// `tracer`, and averages. Rows are flipped only for the sampler's y
/// argument (so low-discrepancy sequences and lens sampling see image space
/// with y increasing upward); the framebuffer itself is written in its own
/// native row order (spec.md §4.8).
fn render_pixel(
    shared: &Shared,
    col: u32,
    row: u32,
    rng: &mut Rng,
    sampler: &mut dyn ImageSampler,
    tracer: &mut dyn SampleTracer,
) {
    let flipped_row = shared.num_rows - 1 - row;
    let num_samples = sampler.start(col, flipped_row, shared.num_cols, shared.num_rows);

    let mut accumulator = Color3::black(ColorSpace::Xyz);
    for _ in 0..num_samples {
        if shared.cancelled.load(Ordering::Relaxed) {
            return;
        }
        let uv = sampler.next(rng);
        let camera_ray = shared.camera.generate_ray_differential(uv.pixel_u, uv.pixel_v, uv.dpixel_u, uv.dpixel_v, uv.lens_uv);
        let world_ray = RayDifferential::new(
            shared.scene_to_world.transform_ray(&camera_ray.primary).normalized(),
            shared.scene_to_world.transform_ray(&camera_ray.rx).normalized(),
            shared.scene_to_world.transform_ray(&camera_ray.ry).normalized(),
        );
        let sample_color = tracer.integrate(&world_ray, rng, shared.epsilon);
        accumulator = color_add(&accumulator, &sample_color);
    }

    if num_samples > 0 {
        let scale = 1.0 / num_samples as f64;
        let averaged = Color3 { c: [accumulator.c[0] * scale, accumulator.c[1] * scale, accumulator.c[2] * scale], space: accumulator.space };
        shared.framebuffer.write_pixel(col, row, averaged);
    }
}

/// Drains chunks from `shared.chunk_counter` until exhausted or cancelled.
/// `thread_id == 0` (the calling thread, never a spawned worker) is the only
/// one allowed to call the progress reporter (spec.md §4.8).
fn run_worker(
    thread_id: u32,
    shared: &Shared,
    mut tracer: Box<dyn SampleTracer>,
    mut sampler: Box<dyn ImageSampler>,
) -> Result<()> {
    loop {
        if shared.cancelled.load(Ordering::Relaxed) {
            return Ok(());
        }
        let chunk = shared.chunk_counter.fetch_add(1, Ordering::Relaxed);
        if chunk >= shared.num_chunks {
            return Ok(());
        }

        let row = (chunk % shared.num_rows as u64) as u32;
        let column_base = (chunk / shared.num_rows as u64) as u32 * CHUNK_SIZE;
        let mut chunk_rng = shared.rngs[chunk as usize].clone();

        for col in column_base..(column_base + CHUNK_SIZE).min(shared.num_cols) {
            if shared.cancelled.load(Ordering::Relaxed) {
                return Ok(());
            }
            render_pixel(shared, col, row, &mut chunk_rng, sampler.as_mut(), tracer.as_mut());
        }

        if thread_id == 0 {
            if let Some(reporter) = &shared.progress {
                let pixels_rendered = ((chunk + 1) * shared.pixels_per_chunk).min(shared.num_pixels);
                if let Err(status) = reporter.report(shared.num_pixels, pixels_rendered) {
                    shared.cancelled.store(true, Ordering::Relaxed);
                    return Err(status);
                }
            }
        }
    }
}

/// Renders `scene` through `camera` into `framebuffer` using `thread_count`
/// native OS threads (spec.md §4.8/§5). `base_sampler` is seeded with
/// `base_rng` once; per-chunk RNG replicas are then drawn from the same
/// stream, deterministically, before any worker starts.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip_all, fields(thread_count, num_pixels))]
pub fn render(
    scene: &Scene,
    camera: &Camera,
    scene_to_world: Matrix4,
    framebuffer: &Framebuffer,
    base_sampler: &dyn ImageSampler,
    base_tracer: &dyn SampleTracer,
    mut base_rng: Rng,
    thread_count: u32,
    epsilon: f64,
    progress: Option<Arc<dyn ProgressReporter>>,
) -> Result<()> {
    if thread_count < 1 {
        return Err(Status::InvalidArgument("thread_count"));
    }

    let num_cols = framebuffer.width();
    let num_rows = framebuffer.height();
    let chunk_cols = (num_cols as u64 + CHUNK_SIZE as u64 - 1) / CHUNK_SIZE as u64;
    let num_chunks = chunk_cols * num_rows as u64;
    let num_pixels = num_cols as u64 * num_rows as u64;
    tracing::Span::current().record("thread_count", thread_count).record("num_pixels", num_pixels);
    tracing::debug!(num_chunks, chunk_size = CHUNK_SIZE, "starting render");

    let mut seeded_sampler = base_sampler.duplicate();
    seeded_sampler.seed(&mut base_rng);

    // Deterministic, pre-allocated per-chunk RNG replicas (spec.md §4.8):
    // every replica is a function of only the base stream and its position
    // in this sequence, so the order chunks are later claimed in doesn't
    // matter.
    let rngs: Vec<Rng> = (0..num_chunks).map(|_| base_rng.replicate()).collect();

    let shared = Shared {
        scene,
        camera,
        scene_to_world,
        framebuffer,
        epsilon,
        rngs,
        chunk_counter: AtomicU64::new(0),
        cancelled: AtomicBool::new(false),
        num_rows,
        num_cols,
        num_chunks,
        pixels_per_chunk: CHUNK_SIZE as u64,
        num_pixels,
        progress,
    };

    let results: std::result::Result<Vec<Result<()>>, _> = crossbeam::thread::scope(|scope| {
        let mut handles = Vec::new();
        for thread_id in 1..thread_count {
            let tracer = base_tracer.duplicate();
            let sampler = seeded_sampler.duplicate();
            let shared_ref = &shared;
            handles.push(scope.spawn(move |_| run_worker(thread_id, shared_ref, tracer, sampler)));
        }

        // The calling thread drains chunks too, as thread 0.
        let mut results = vec![run_worker(0, &shared, base_tracer.duplicate(), seeded_sampler.duplicate())];
        for handle in handles {
            results.push(handle.join().unwrap_or_else(|_| {
                tracing::warn!("worker thread panicked");
                Err(Status::InvalidResult("worker thread panicked".to_string()))
            }));
        }
        results
    });

    let results = results.map_err(|_| Status::InvalidResult("render thread scope panicked".to_string()))?;
    let outcome = results.into_iter().find(Result::is_err).unwrap_or(Ok(()));
    match &outcome {
        Ok(()) => tracing::debug!("render finished"),
        Err(status) => tracing::warn!(%status, "render cancelled"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Extent, PinholeCamera};
    use crate::color::cie::ColorIntegrator;
    use crate::color::reflector::ConstantReflector;
    use crate::integrator::{PathTracer, PathTracerConfig};
    use crate::light::{ConstantEnvironmentLight, UniformLightSampler};
    use crate::material::Lambertian;
    use crate::math::Vec3;
    use crate::sampler::StratifiedSampler;
    use crate::scene::ShapePlacement;
    use crate::shape::Sphere;
    use std::sync::Arc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
    }

    fn test_scene() -> Scene {
        let placement = ShapePlacement {
            shape: Arc::new(Sphere::new(
                Vec3::new(0.0, 0.0, 5.0),
                1.0,
                Arc::new(Lambertian::new(Arc::new(ConstantReflector::white()))),
            )),
            transform: None,
            premultiplied: false,
        };
        Scene::build(
            vec![placement],
            Some(Arc::new(ConstantEnvironmentLight::new(Arc::new(crate::color::spectrum::ConstantSpectrum::new(1.0))))),
        )
        .unwrap()
    }

    fn test_camera() -> Camera {
        Camera::new(
            Box::new(PinholeCamera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0), 60.0, 1.0)),
            Extent::new(0.0, 1.0).unwrap(),
            Extent::new(0.0, 1.0).unwrap(),
            Extent::zero(),
            Extent::zero(),
        )
    }

    fn test_tracer() -> PathTracer {
        PathTracer::new(
            Arc::new(test_scene()),
            Arc::new(UniformLightSampler::new(vec![])),
            Arc::new(ColorIntegrator),
            PathTracerConfig { min_bounces: 2, max_bounces: 4, min_termination_probability: 0.1, roulette_threshold: 1.0 },
        )
    }

    fn render_into(width: u32, height: u32, thread_count: u32) -> Vec<Color3> {
        let scene = test_scene();
        let camera = test_camera();
        let framebuffer = Framebuffer::new(width, height, ColorSpace::Xyz).unwrap();
        let sampler = StratifiedSampler::new(2, true, false);
        let scene_arc = Arc::new(scene);
        let tracer = PathTracer::new(
            scene_arc.clone(),
            Arc::new(UniformLightSampler::new(vec![])),
            Arc::new(ColorIntegrator),
            PathTracerConfig { min_bounces: 2, max_bounces: 4, min_termination_probability: 0.1, roulette_threshold: 1.0 },
        );
        render(
            &scene_arc,
            &camera,
            Matrix4::IDENTITY,
            &framebuffer,
            &sampler,
            &tracer,
            Rng::new(42, 7),
            thread_count,
            1e-4,
            None,
        )
        .unwrap();

        let mut out = Vec::with_capacity((width * height) as usize);
        for row in 0..height {
            for col in 0..width {
                out.push(framebuffer.get_pixel(col, row).unwrap());
            }
        }
        out
    }

    #[test]
    fn single_threaded_and_multi_threaded_renders_are_bit_identical() {
        init_tracing();
        let single = render_into(8, 8, 1);
        let multi = render_into(8, 8, 3);
        assert_eq!(single.len(), multi.len());
        for (a, b) in single.iter().zip(multi.iter()) {
            assert_eq!(a.c, b.c);
        }
    }

    #[test]
    fn zero_thread_count_is_rejected() {
        let scene = test_scene();
        let camera = test_camera();
        let framebuffer = Framebuffer::new(4, 4, ColorSpace::Xyz).unwrap();
        let sampler = StratifiedSampler::new(1, false, false);
        let tracer = test_tracer();
        let result =
            render(&scene, &camera, Matrix4::IDENTITY, &framebuffer, &sampler, &tracer, Rng::new(1, 1), 0, 1e-4, None);
        assert!(result.is_err());
    }

    struct CountingProgress {
        calls: std::sync::atomic::AtomicU64,
    }

    impl ProgressReporter for CountingProgress {
        fn report(&self, _num_pixels: u64, _pixels_rendered: u64) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn progress_reporter_is_invoked_at_least_once_for_a_multi_chunk_render() {
        let scene = test_scene();
        let camera = test_camera();
        let framebuffer = Framebuffer::new(CHUNK_SIZE * 2, 2, ColorSpace::Xyz).unwrap();
        let sampler = StratifiedSampler::new(1, false, false);
        let tracer = test_tracer();
        let progress = Arc::new(CountingProgress { calls: std::sync::atomic::AtomicU64::new(0) });
        render(
            &scene,
            &camera,
            Matrix4::IDENTITY,
            &framebuffer,
            &sampler,
            &tracer,
            Rng::new(1, 1),
            1,
            1e-4,
            Some(progress.clone()),
        )
        .unwrap();
        assert!(progress.calls.load(Ordering::Relaxed) > 0);
    }

    struct FailingProgress;
    impl ProgressReporter for FailingProgress {
        fn report(&self, _num_pixels: u64, _pixels_rendered: u64) -> Result<()> {
            Err(Status::InvalidResult("test-forced cancellation".to_string()))
        }
    }

    #[test]
    fn indicatif_progress_reporter_never_errors_and_finishes_at_completion() {
        let reporter = IndicatifProgressReporter::new(100);
        assert!(reporter.report(100, 50).is_ok());
        assert!(reporter.report(100, 100).is_ok());
    }

    #[test]
    fn a_failing_progress_reporter_cancels_the_render_and_propagates_the_error() {
        let scene = test_scene();
        let camera = test_camera();
        let framebuffer = Framebuffer::new(CHUNK_SIZE * 4, 4, ColorSpace::Xyz).unwrap();
        let sampler = StratifiedSampler::new(1, false, false);
        let tracer = test_tracer();
        let result = render(
            &scene,
            &camera,
            Matrix4::IDENTITY,
            &framebuffer,
            &sampler,
            &tracer,
            Rng::new(1, 1),
            1,
            1e-4,
            Some(Arc::new(FailingProgress)),
        );
        assert!(result.is_err());
    }
}
