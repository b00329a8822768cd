//! Deterministic, replicable RNG streams (spec.md §4.3/§6).
//!
//! Grounded on the teacher's `src/rtweekend.rs` (`random`,
//! `random_in_unit_interval`), reimplemented around an explicit, seedable
//! PCG32 stream instead of `rand::thread_rng()` — a thread-global RNG cannot
//! satisfy spec.md's "output depends only on (seed, chunk)" determinism
//! contract. `rand_pcg` is the same 64-bit-state/32-bit-output PCG variant
//! spec.md §6 names, used the same way in
//! `examples/other_examples/manifests/mu-lambda-mu-lambda-raytracer`.

use rand::{Rng as _, SeedableRng};
use rand_pcg::Lcg64Xsh32;

/// A PRNG stream. Two 64-bit words — `initial_state` and
/// `initial_output_sequence` — parameterize the stream per spec.md §6.
#[derive(Clone)]
pub struct Rng {
    inner: Lcg64Xsh32,
}

impl Rng {
    pub fn new(initial_state: u64, initial_output_sequence: u64) -> Rng {
        Rng { inner: Lcg64Xsh32::new(initial_state, initial_output_sequence) }
    }

    pub fn uniform_float(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.inner.gen::<f64>()
    }

    /// A uniformly distributed index in `[min, max]` inclusive.
    pub fn bounded_index(&mut self, min: i64, max: i64) -> i64 {
        self.inner.gen_range(min..=max)
    }

    /// An independent stream. Replicas are deterministic functions of the
    /// parent stream's state at the moment of the call — the render driver
    /// uses this to pre-replicate one RNG per chunk before any worker
    /// starts (spec.md §4.8).
    pub fn replicate(&mut self) -> Rng {
        let state: u64 = self.inner.gen();
        let seq: u64 = self.inner.gen();
        Rng::new(state, seq)
    }
}
