//! CIE 1931 2-degree standard observer color matching functions and the
//! color integrator that turns an accumulated radiance `Spectrum` into a
//! `Color3` (spec.md §4.7: "Integrator outputs a `Color3` via the
//! caller-provided color integrator, which evaluates the accumulated `L`
//! against a color matching function").
//!
//! The matching functions are the multi-lobe Gaussian fit of Wyman, Sloan &
//! Shirley (2013), which is accurate to within the tolerances spec.md §8
//! asks for without shipping a multi-hundred-entry sampled table.

use super::spectrum::Spectrum;
use super::{Color3, ColorSpace};

fn gaussian(x: f64, alpha: f64, mu: f64, sigma1: f64, sigma2: f64) -> f64 {
    let sigma = if x < mu { sigma1 } else { sigma2 };
    let t = (x - mu) / sigma;
    alpha * (-0.5 * t * t).exp()
}

fn x_bar(lambda: f64) -> f64 {
    gaussian(lambda, 1.056, 599.8, 37.9, 31.0)
        + gaussian(lambda, 0.362, 442.0, 16.0, 26.7)
        + gaussian(lambda, -0.065, 501.1, 20.4, 26.2)
}

fn y_bar(lambda: f64) -> f64 {
    gaussian(lambda, 0.821, 568.8, 46.9, 40.5) + gaussian(lambda, 0.286, 530.9, 16.3, 31.1)
}

fn z_bar(lambda: f64) -> f64 {
    gaussian(lambda, 1.217, 437.0, 11.8, 36.0) + gaussian(lambda, 0.681, 459.0, 26.0, 13.8)
}

/// Integration domain and step for the Riemann sum used by `ColorIntegrator`.
pub const LAMBDA_MIN: f64 = 380.0;
pub const LAMBDA_MAX: f64 = 780.0;
const STEP: f64 = 2.0;

/// Evaluates an accumulated radiance spectrum against the CIE matching
/// functions to produce a `Color3` in XYZ.
///
/// The normalization constant `CIE_Y_INTEGRAL` makes a spectrum that is
/// constant at 1.0 across the visible range integrate to `Y = 1`.
pub struct ColorIntegrator;

const CIE_Y_INTEGRAL: f64 = 106.857_f64;

impl ColorIntegrator {
    pub fn integrate(&self, spectrum: &dyn Spectrum) -> Color3 {
        self.integrate_fn(|lambda| spectrum.sample(lambda))
    }

    /// Same Riemann sum as `integrate`, against an arbitrary sampling
    /// closure rather than a `Spectrum` trait object. The integrator uses
    /// this to evaluate an accumulated compositor handle directly: such a
    /// handle borrows a shading event's bump arenas, which are `Send` but
    /// not `Sync`, so it cannot satisfy `Spectrum`'s `Send + Sync` bound.
    pub fn integrate_fn<F: FnMut(f64) -> f64>(&self, mut sample: F) -> Color3 {
        let mut xyz = [0.0f64; 3];
        let mut lambda = LAMBDA_MIN;
        while lambda <= LAMBDA_MAX {
            let intensity = sample(lambda);
            xyz[0] += intensity * x_bar(lambda);
            xyz[1] += intensity * y_bar(lambda);
            xyz[2] += intensity * z_bar(lambda);
            lambda += STEP;
        }
        let scale = STEP / CIE_Y_INTEGRAL;
        Color3 {
            c: [
                (xyz[0] * scale).max(0.0),
                (xyz[1] * scale).max(0.0),
                (xyz[2] * scale).max(0.0),
            ],
            space: ColorSpace::Xyz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatSpectrum(f64);
    impl Spectrum for FlatSpectrum {
        fn sample(&self, _lambda: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn unit_constant_spectrum_integrates_to_unit_luminance() {
        let integrator = ColorIntegrator;
        let xyz = integrator.integrate(&FlatSpectrum(1.0));
        assert!((xyz.c[1] - 1.0).abs() < 0.01, "Y={}", xyz.c[1]);
    }

    #[test]
    fn black_spectrum_integrates_to_zero() {
        let integrator = ColorIntegrator;
        let xyz = integrator.integrate(&FlatSpectrum(0.0));
        assert_eq!(xyz.c, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn integrate_fn_matches_integrate_for_equivalent_closure() {
        let integrator = ColorIntegrator;
        let via_trait = integrator.integrate(&FlatSpectrum(2.5));
        let via_closure = integrator.integrate_fn(|_lambda| 2.5);
        assert_eq!(via_trait.c, via_closure.c);
    }
}
