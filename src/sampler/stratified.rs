use super::{ImageSampler, SampleUv};
use crate::rng::Rng;

/// A stratified-grid sampler: `strata_per_axis^2` samples per pixel, each
/// drawn from its own cell of an evenly divided unit square, optionally
/// jittered within the cell.
pub struct StratifiedSampler {
    strata_per_axis: u32,
    jitter: bool,
    has_lens: bool,
    sample_index: u32,
}

impl StratifiedSampler {
    pub fn new(strata_per_axis: u32, jitter: bool, has_lens: bool) -> StratifiedSampler {
        StratifiedSampler { strata_per_axis: strata_per_axis.max(1), jitter, has_lens, sample_index: 0 }
    }

    fn sample_count(&self) -> u32 {
        self.strata_per_axis * self.strata_per_axis
    }
}

impl ImageSampler for StratifiedSampler {
    fn start(&mut self, _column: u32, _row: u32, _num_cols: u32, _num_rows: u32) -> u32 {
        self.sample_index = 0;
        self.sample_count()
    }

    fn next(&mut self, rng: &mut Rng) -> SampleUv {
        let n = self.strata_per_axis;
        let cell = self.sample_index.min(self.sample_count().saturating_sub(1));
        self.sample_index += 1;

        let cell_x = cell % n;
        let cell_y = cell / n;
        let step = 1.0 / n as f64;

        let (jx, jy) = if self.jitter { (rng.uniform_float(0.0, 1.0), rng.uniform_float(0.0, 1.0)) } else { (0.5, 0.5) };

        let pixel_u = (cell_x as f64 + jx) * step;
        let pixel_v = (cell_y as f64 + jy) * step;

        let lens_uv = if self.has_lens {
            Some((rng.uniform_float(0.0, 1.0), rng.uniform_float(0.0, 1.0)))
        } else {
            None
        };

        SampleUv { pixel_u, pixel_v, dpixel_u: step, dpixel_v: step, lens_uv }
    }

    fn duplicate(&self) -> Box<dyn ImageSampler> {
        Box::new(StratifiedSampler::new(self.strata_per_axis, self.jitter, self.has_lens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_lens_extent_never_produces_lens_uvs() {
        let mut sampler = StratifiedSampler::new(2, true, false);
        let mut rng = Rng::new(1, 1);
        let n = sampler.start(0, 0, 10, 10);
        for _ in 0..n {
            assert!(sampler.next(&mut rng).lens_uv.is_none());
        }
    }

    #[test]
    fn lens_sampler_always_produces_lens_uvs_in_unit_square() {
        let mut sampler = StratifiedSampler::new(2, true, true);
        let mut rng = Rng::new(1, 1);
        let n = sampler.start(0, 0, 10, 10);
        for _ in 0..n {
            let (lu, lv) = sampler.next(&mut rng).lens_uv.expect("lens uv expected");
            assert!((0.0..1.0).contains(&lu) && (0.0..1.0).contains(&lv));
        }
    }

    #[test]
    fn sample_count_is_strata_squared() {
        let mut sampler = StratifiedSampler::new(4, false, false);
        let mut rng = Rng::new(1, 1);
        assert_eq!(sampler.start(0, 0, 10, 10), 16);
        for _ in 0..16 {
            let uv = sampler.next(&mut rng);
            assert!((0.0..1.0).contains(&uv.pixel_u) && (0.0..1.0).contains(&uv.pixel_v));
        }
    }
}
