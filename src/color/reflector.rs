use std::sync::Arc;

/// An immutable, thread-shared mapping wavelength -> reflectance in `[0,1]`
/// (spec.md §3). `reflect(lambda, incoming)` must return a value in
/// `[0, incoming]` for any non-negative `incoming` — tested by property 2 in
/// spec.md §8 for every reflector built through `InterpolatedReflector::allocate`.
pub trait Reflector: Send + Sync {
    fn reflect(&self, lambda: f64, incoming: f64) -> f64;

    /// A single-number average reflectance, used by the integrator's
    /// roulette-throughput estimate (spec.md §4.7 step 7).
    fn albedo(&self) -> f64;
}

pub type ReflectorRef = Arc<dyn Reflector>;

/// A reflector with the same reflectance at every wavelength.
#[derive(Debug, Clone, Copy)]
pub struct ConstantReflector {
    reflectance: f64,
}

impl ConstantReflector {
    /// `reflectance` is clamped into `[0, 1]` so this constructor can never
    /// violate the reflectance-bound invariant.
    pub fn new(reflectance: f64) -> ConstantReflector {
        ConstantReflector { reflectance: reflectance.clamp(0.0, 1.0) }
    }

    pub fn white() -> ConstantReflector {
        ConstantReflector { reflectance: 1.0 }
    }

    pub fn black() -> ConstantReflector {
        ConstantReflector { reflectance: 0.0 }
    }
}

impl Reflector for ConstantReflector {
    fn reflect(&self, _lambda: f64, incoming: f64) -> f64 {
        self.reflectance * incoming
    }

    fn albedo(&self) -> f64 {
        self.reflectance
    }
}

/// A piecewise-linearly-interpolated reflector. Every sampled reflectance is
/// clamped into `[0,1]` at allocation time so the reflectance-bound
/// invariant (spec.md §8 property 2) holds unconditionally.
#[derive(Debug, Clone)]
pub struct InterpolatedReflector {
    samples: Vec<(f64, f64)>,
    mean: f64,
}

impl InterpolatedReflector {
    pub fn allocate(mut samples: Vec<(f64, f64)>) -> Option<InterpolatedReflector> {
        if samples.is_empty() {
            return None;
        }
        let mut prev_lambda = f64::NEG_INFINITY;
        for (lambda, reflectance) in samples.iter_mut() {
            if *lambda <= prev_lambda || !reflectance.is_finite() {
                return None;
            }
            *reflectance = reflectance.clamp(0.0, 1.0);
            prev_lambda = *lambda;
        }
        let mean = samples.iter().map(|&(_, r)| r).sum::<f64>() / samples.len() as f64;
        Some(InterpolatedReflector { samples, mean })
    }

    fn reflectance_at(&self, lambda: f64) -> f64 {
        let s = &self.samples;
        if lambda <= s[0].0 {
            return s[0].1;
        }
        if lambda >= s[s.len() - 1].0 {
            return s[s.len() - 1].1;
        }
        let idx = s.partition_point(|&(l, _)| l <= lambda);
        let (l0, v0) = s[idx - 1];
        let (l1, v1) = s[idx];
        let t = (lambda - l0) / (l1 - l0);
        v0 + t * (v1 - v0)
    }
}

impl Reflector for InterpolatedReflector {
    fn reflect(&self, lambda: f64, incoming: f64) -> f64 {
        self.reflectance_at(lambda) * incoming
    }

    fn albedo(&self) -> f64 {
        self.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_rejects_empty_or_unsorted_or_nonfinite() {
        assert!(InterpolatedReflector::allocate(vec![]).is_none());
        assert!(InterpolatedReflector::allocate(vec![(500.0, 0.5), (400.0, 0.2)]).is_none());
        assert!(InterpolatedReflector::allocate(vec![(400.0, f64::NAN)]).is_none());
        assert!(InterpolatedReflector::allocate(vec![(400.0, 0.2), (500.0, 0.5)]).is_some());
    }

    #[test]
    fn interpolated_reflectance_bound_holds_across_sweep() {
        let reflector = InterpolatedReflector::allocate(vec![
            (400.0, 0.1),
            (500.0, 1.4),  // out-of-range input, must be clamped at allocation.
            (600.0, -0.3), // likewise for negative input.
            (700.0, 0.6),
        ])
        .unwrap();

        let mut lambda = 350.0;
        while lambda <= 750.0 {
            let mut incoming = 0.0;
            while incoming <= 10.0 {
                let out = reflector.reflect(lambda, incoming);
                assert!(out >= 0.0 && out <= incoming + 1e-12, "lambda={lambda} incoming={incoming} out={out}");
                incoming += 0.5;
            }
            lambda += 10.0;
        }
    }

    #[test]
    fn constant_reflector_clamps_reflectance() {
        assert_eq!(ConstantReflector::new(5.0).albedo(), 1.0);
        assert_eq!(ConstantReflector::new(-5.0).albedo(), 0.0);
        assert_eq!(ConstantReflector::white().reflect(500.0, 2.0), 2.0);
        assert_eq!(ConstantReflector::black().reflect(500.0, 2.0), 0.0);
    }
}
