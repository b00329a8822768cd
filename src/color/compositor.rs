//! Per-shading-event arena algebra over spectra and reflectors (spec.md
//! §4.2). Every simplification returns an existing handle or allocates
//! exactly one new node from a bump arena; the nodes themselves are plain
//! `Copy` data and run no destructor, and the arena is reset wholesale
//! between shading events. Leaf nodes reference their owning `Arc` only
//! through an index into a side table, which *is* dropped on reset — see
//! `ReflectorNode::Leaf`'s doc comment.
//!
//! No teacher equivalent exists for this subsystem — it is built directly
//! from spec.md's algebraic rules. The bump-arena mechanism itself is
//! grounded on `examples/akofke-raytracer`, which depends on `bumpalo` for
//! its own per-intersection scratch allocations.

use bumpalo::Bump;
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

use super::reflector::{ConstantReflector, Reflector, ReflectorRef};
use super::spectrum::{ConstantSpectrum, Spectrum, SpectrumRef};
use crate::error::{Result, Status};

fn white_reflector() -> ReflectorRef {
    static WHITE: OnceLock<ReflectorRef> = OnceLock::new();
    WHITE.get_or_init(|| Arc::new(ConstantReflector::white()) as ReflectorRef).clone()
}

fn black_spectrum() -> SpectrumRef {
    static BLACK: OnceLock<SpectrumRef> = OnceLock::new();
    BLACK.get_or_init(|| Arc::new(ConstantSpectrum::black()) as SpectrumRef).clone()
}

/// A leaf holds an index into the compositor's `leaves` table rather than
/// the `Arc` itself: `Bump::reset()` never runs `Drop`, so an owning `Arc`
/// inside an arena node would have its strong count leaked on every reset.
/// The index makes the node plain `Copy` data (spec.md §4.2's "all nodes
/// are trivially destructible"), and the owning `Arc`s live in a normal
/// `Vec` that gets cleared — dropping them for real — alongside the arena.
pub enum ReflectorNode<'r> {
    Leaf(usize),
    Attenuate(&'r ReflectorNode<'r>, f64),
    Add(&'r ReflectorNode<'r>, &'r ReflectorNode<'r>),
}

pub type ReflectorHandle<'r> = Option<&'r ReflectorNode<'r>>;

fn same_reflector<'r>(a: ReflectorHandle<'r>, b: ReflectorHandle<'r>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => std::ptr::eq(x, y),
        _ => false,
    }
}

/// Per-shading-event bump arena for reflector composition.
pub struct ReflectorCompositor {
    arena: Bump,
    leaves: RefCell<Vec<ReflectorRef>>,
}

impl Default for ReflectorCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReflectorCompositor {
    pub fn new() -> ReflectorCompositor {
        ReflectorCompositor { arena: Bump::new(), leaves: RefCell::new(Vec::new()) }
    }

    /// Resets the arena and drops every leaf `Arc` allocated since the last
    /// reset. Handles returned before the reset must not be used afterward
    /// (spec.md §4.2 / §8 property 4: doing so must not be memory unsafe,
    /// but is not required to produce defined values).
    pub fn reset(&mut self) {
        self.arena.reset();
        self.leaves.get_mut().clear();
    }

    pub fn null<'r>(&'r self) -> ReflectorHandle<'r> {
        None
    }

    pub fn leaf<'r>(&'r self, r: ReflectorRef) -> Result<ReflectorHandle<'r>> {
        let index = {
            let mut leaves = self.leaves.borrow_mut();
            leaves.push(r);
            leaves.len() - 1
        };
        let node: &ReflectorNode<'r> =
            self.arena.try_alloc(ReflectorNode::Leaf(index)).map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    pub fn white<'r>(&'r self) -> Result<ReflectorHandle<'r>> {
        self.leaf(white_reflector())
    }

    fn alloc_attenuate<'r>(&'r self, base: &'r ReflectorNode<'r>, scale: f64) -> Result<ReflectorHandle<'r>> {
        let node: &ReflectorNode<'r> = self
            .arena
            .try_alloc(ReflectorNode::Attenuate(base, scale))
            .map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    fn alloc_add<'r>(&'r self, a: &'r ReflectorNode<'r>, b: &'r ReflectorNode<'r>) -> Result<ReflectorHandle<'r>> {
        let node: &ReflectorNode<'r> = self
            .arena
            .try_alloc(ReflectorNode::Add(a, b))
            .map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    pub fn attenuate<'r>(&'r self, a: ReflectorHandle<'r>, scale: f64) -> Result<ReflectorHandle<'r>> {
        if !scale.is_finite() {
            return Err(Status::InvalidArgument("attenuate scale"));
        }
        let a = match a {
            None => return Ok(None),
            Some(n) => n,
        };
        if scale == 0.0 {
            return Ok(None);
        }
        if scale == 1.0 {
            return Ok(Some(a));
        }
        if let ReflectorNode::Attenuate(inner, s) = a {
            return self.attenuate(Some(inner), s * scale);
        }
        self.alloc_attenuate(a, scale)
    }

    /// Tries the pairwise fold rules (same node, attenuation-of, or
    /// matching-scale attenuations) without looking inside sum nodes.
    /// Returns `Ok(None)` when no pairwise rule applies.
    fn try_fold_pair<'r>(
        &'r self,
        x: ReflectorHandle<'r>,
        y: ReflectorHandle<'r>,
    ) -> Result<Option<ReflectorHandle<'r>>> {
        if same_reflector(x, y) {
            return Ok(Some(self.attenuate(x, 2.0)?));
        }
        if let Some(ReflectorNode::Attenuate(base, a)) = x {
            if same_reflector(Some(base), y) {
                return Ok(Some(self.attenuate(Some(base), a + 1.0)?));
            }
        }
        if let Some(ReflectorNode::Attenuate(base, b)) = y {
            if same_reflector(Some(base), x) {
                return Ok(Some(self.attenuate(Some(base), b + 1.0)?));
            }
        }
        if let (Some(ReflectorNode::Attenuate(bx, a)), Some(ReflectorNode::Attenuate(by, b))) = (x, y) {
            if same_reflector(Some(bx), Some(by)) {
                return Ok(Some(self.attenuate(Some(bx), a + b)?));
            }
            if (*a - *b).abs() < f64::EPSILON {
                let summed = self.add(Some(bx), Some(by))?;
                return Ok(Some(self.attenuate(summed, *a)?));
            }
        }
        Ok(None)
    }

    pub fn add<'r>(&'r self, a: ReflectorHandle<'r>, b: ReflectorHandle<'r>) -> Result<ReflectorHandle<'r>> {
        if a.is_none() {
            return Ok(b);
        }
        if b.is_none() {
            return Ok(a);
        }
        if let Some(folded) = self.try_fold_pair(a, b)? {
            return Ok(folded);
        }
        // Recognition inside sum nodes: fold b (or a) into an existing Add's child.
        if let Some(ReflectorNode::Add(l, r)) = a {
            if let Some(folded) = self.try_fold_pair(Some(l), b)? {
                return self.add(Some(r), folded);
            }
            if let Some(folded) = self.try_fold_pair(Some(r), b)? {
                return self.add(Some(l), folded);
            }
        }
        if let Some(ReflectorNode::Add(l, r)) = b {
            if let Some(folded) = self.try_fold_pair(a, Some(l))? {
                return self.add(folded, Some(r));
            }
            if let Some(folded) = self.try_fold_pair(a, Some(r))? {
                return self.add(folded, Some(l));
            }
        }
        self.alloc_add(a.unwrap(), b.unwrap())
    }

    pub fn attenuated_add<'r>(
        &'r self,
        a: ReflectorHandle<'r>,
        b: ReflectorHandle<'r>,
        scale: f64,
    ) -> Result<ReflectorHandle<'r>> {
        let scaled_b = self.attenuate(b, scale)?;
        self.add(a, scaled_b)
    }

    /// Evaluates `r(lambda)` alone (no incoming scale). Used both publicly
    /// and by `SpectrumCompositor::sample` to evaluate embedded `Reflect`
    /// nodes.
    pub fn reflectance<'r>(&self, h: ReflectorHandle<'r>, lambda: f64) -> f64 {
        match h {
            None => 0.0,
            Some(ReflectorNode::Leaf(idx)) => self.leaves.borrow()[*idx].reflect(lambda, 1.0),
            Some(ReflectorNode::Attenuate(n, a)) => a * self.reflectance(Some(n), lambda),
            Some(ReflectorNode::Add(l, r)) => self.reflectance(Some(l), lambda) + self.reflectance(Some(r), lambda),
        }
    }

    pub fn sample<'r>(&self, h: ReflectorHandle<'r>, lambda: f64, incoming: f64) -> f64 {
        incoming * self.reflectance(h, lambda)
    }

    /// Mean, wavelength-independent reflectance of a handle. The integrator
    /// uses this for its Russian-roulette throughput estimate (spec.md §4.7
    /// step 7), where a single magnitude rather than a full spectral
    /// evaluation is wanted.
    pub fn albedo<'r>(&self, h: ReflectorHandle<'r>) -> f64 {
        match h {
            None => 0.0,
            Some(ReflectorNode::Leaf(idx)) => self.leaves.borrow()[*idx].albedo(),
            Some(ReflectorNode::Attenuate(n, a)) => a * self.albedo(Some(n)),
            Some(ReflectorNode::Add(l, r)) => self.albedo(Some(l)) + self.albedo(Some(r)),
        }
    }
}

/// See `ReflectorNode::Leaf`'s doc comment: the index indirection is the
/// same fix for the same `Bump::reset()`-doesn't-`Drop` hazard.
pub enum SpectrumNode<'s, 'r> {
    Leaf(usize),
    Attenuate(&'s SpectrumNode<'s, 'r>, f64),
    Add(&'s SpectrumNode<'s, 'r>, &'s SpectrumNode<'s, 'r>),
    Reflect(&'s SpectrumNode<'s, 'r>, ReflectorHandle<'r>),
}

pub type SpectrumHandle<'s, 'r> = Option<&'s SpectrumNode<'s, 'r>>;

fn same_spectrum<'s, 'r>(a: SpectrumHandle<'s, 'r>, b: SpectrumHandle<'s, 'r>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => std::ptr::eq(x, y),
        _ => false,
    }
}

/// Per-shading-event bump arena for spectrum composition.
pub struct SpectrumCompositor {
    arena: Bump,
    leaves: RefCell<Vec<SpectrumRef>>,
}

impl Default for SpectrumCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumCompositor {
    pub fn new() -> SpectrumCompositor {
        SpectrumCompositor { arena: Bump::new(), leaves: RefCell::new(Vec::new()) }
    }

    pub fn reset(&mut self) {
        self.arena.reset();
        self.leaves.get_mut().clear();
    }

    pub fn null<'s, 'r>(&'s self) -> SpectrumHandle<'s, 'r> {
        None
    }

    pub fn leaf<'s, 'r>(&'s self, s: SpectrumRef) -> Result<SpectrumHandle<'s, 'r>> {
        let index = {
            let mut leaves = self.leaves.borrow_mut();
            leaves.push(s);
            leaves.len() - 1
        };
        let node: &SpectrumNode<'s, 'r> =
            self.arena.try_alloc(SpectrumNode::Leaf(index)).map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    pub fn black<'s, 'r>(&'s self) -> Result<SpectrumHandle<'s, 'r>> {
        self.leaf(black_spectrum())
    }

    fn alloc_attenuate<'s, 'r>(
        &'s self,
        base: &'s SpectrumNode<'s, 'r>,
        scale: f64,
    ) -> Result<SpectrumHandle<'s, 'r>> {
        let node: &SpectrumNode<'s, 'r> = self
            .arena
            .try_alloc(SpectrumNode::Attenuate(base, scale))
            .map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    fn alloc_add<'s, 'r>(
        &'s self,
        a: &'s SpectrumNode<'s, 'r>,
        b: &'s SpectrumNode<'s, 'r>,
    ) -> Result<SpectrumHandle<'s, 'r>> {
        let node: &SpectrumNode<'s, 'r> = self
            .arena
            .try_alloc(SpectrumNode::Add(a, b))
            .map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    pub fn attenuate<'s, 'r>(&'s self, a: SpectrumHandle<'s, 'r>, scale: f64) -> Result<SpectrumHandle<'s, 'r>> {
        if !scale.is_finite() {
            return Err(Status::InvalidArgument("attenuate scale"));
        }
        let a = match a {
            None => return Ok(None),
            Some(n) => n,
        };
        if scale == 0.0 {
            return Ok(None);
        }
        if scale == 1.0 {
            return Ok(Some(a));
        }
        if let SpectrumNode::Attenuate(inner, s) = a {
            return self.attenuate(Some(inner), s * scale);
        }
        self.alloc_attenuate(a, scale)
    }

    fn try_fold_pair<'s, 'r>(
        &'s self,
        x: SpectrumHandle<'s, 'r>,
        y: SpectrumHandle<'s, 'r>,
    ) -> Result<Option<SpectrumHandle<'s, 'r>>> {
        if same_spectrum(x, y) {
            return Ok(Some(self.attenuate(x, 2.0)?));
        }
        if let Some(SpectrumNode::Attenuate(base, a)) = x {
            if same_spectrum(Some(base), y) {
                return Ok(Some(self.attenuate(Some(base), a + 1.0)?));
            }
        }
        if let Some(SpectrumNode::Attenuate(base, b)) = y {
            if same_spectrum(Some(base), x) {
                return Ok(Some(self.attenuate(Some(base), b + 1.0)?));
            }
        }
        if let (Some(SpectrumNode::Attenuate(bx, a)), Some(SpectrumNode::Attenuate(by, b))) = (x, y) {
            if same_spectrum(Some(bx), Some(by)) {
                return Ok(Some(self.attenuate(Some(bx), a + b)?));
            }
            if (*a - *b).abs() < f64::EPSILON {
                let summed = self.add(Some(bx), Some(by))?;
                return Ok(Some(self.attenuate(summed, *a)?));
            }
        }
        Ok(None)
    }

    pub fn add<'s, 'r>(&'s self, a: SpectrumHandle<'s, 'r>, b: SpectrumHandle<'s, 'r>) -> Result<SpectrumHandle<'s, 'r>> {
        if a.is_none() {
            return Ok(b);
        }
        if b.is_none() {
            return Ok(a);
        }
        if let Some(folded) = self.try_fold_pair(a, b)? {
            return Ok(folded);
        }
        if let Some(SpectrumNode::Add(l, r)) = a {
            if let Some(folded) = self.try_fold_pair(Some(l), b)? {
                return self.add(Some(r), folded);
            }
            if let Some(folded) = self.try_fold_pair(Some(r), b)? {
                return self.add(Some(l), folded);
            }
        }
        if let Some(SpectrumNode::Add(l, r)) = b {
            if let Some(folded) = self.try_fold_pair(a, Some(l))? {
                return self.add(folded, Some(r));
            }
            if let Some(folded) = self.try_fold_pair(a, Some(r))? {
                return self.add(folded, Some(l));
            }
        }
        self.alloc_add(a.unwrap(), b.unwrap())
    }

    pub fn attenuated_add<'s, 'r>(
        &'s self,
        a: SpectrumHandle<'s, 'r>,
        b: SpectrumHandle<'s, 'r>,
        scale: f64,
    ) -> Result<SpectrumHandle<'s, 'r>> {
        let scaled_b = self.attenuate(b, scale)?;
        self.add(a, scaled_b)
    }

    pub fn reflect<'s, 'r>(
        &'s self,
        s: SpectrumHandle<'s, 'r>,
        r: ReflectorHandle<'r>,
    ) -> Result<SpectrumHandle<'s, 'r>> {
        if s.is_none() || r.is_none() {
            return Ok(None);
        }
        let node: &SpectrumNode<'s, 'r> = self
            .arena
            .try_alloc(SpectrumNode::Reflect(s.unwrap(), r))
            .map_err(|_| Status::AllocationFailed)?;
        Ok(Some(node))
    }

    pub fn attenuated_reflect<'s, 'r>(
        &'s self,
        s: SpectrumHandle<'s, 'r>,
        r: ReflectorHandle<'r>,
        scale: f64,
    ) -> Result<SpectrumHandle<'s, 'r>> {
        let reflected = self.reflect(s, r)?;
        self.attenuate(reflected, scale)
    }

    pub fn sample<'s, 'r>(&self, h: SpectrumHandle<'s, 'r>, lambda: f64, reflectors: &ReflectorCompositor) -> f64 {
        match h {
            None => 0.0,
            Some(SpectrumNode::Leaf(idx)) => self.leaves.borrow()[*idx].sample(lambda),
            Some(SpectrumNode::Attenuate(n, a)) => a * self.sample(Some(n), lambda, reflectors),
            Some(SpectrumNode::Add(l, r)) => {
                self.sample(Some(l), lambda, reflectors) + self.sample(Some(r), lambda, reflectors)
            }
            Some(SpectrumNode::Reflect(s, r)) => {
                self.sample(Some(s), lambda, reflectors) * reflectors.reflectance(*r, lambda)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::reflector::ConstantReflector;
    use crate::color::spectrum::ConstantSpectrum;

    #[test]
    fn same_reflector_add_folds_to_attenuate_by_two() {
        let reflectors = ReflectorCompositor::new();
        let r = reflectors.leaf(Arc::new(ConstantReflector::new(0.4))).unwrap();
        let folded = reflectors.add(r, r).unwrap();
        assert!(matches!(folded, Some(ReflectorNode::Attenuate(_, s)) if (*s - 2.0).abs() < 1e-12));
        assert!((reflectors.sample(folded, 500.0, 1.0) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn attenuate_of_attenuate_folds_scales() {
        let reflectors = ReflectorCompositor::new();
        let r = reflectors.leaf(Arc::new(ConstantReflector::new(0.25))).unwrap();
        let a = reflectors.attenuate(r, 2.0).unwrap();
        let b = reflectors.attenuate(a, 3.0).unwrap();
        // Folded into a single Attenuate(leaf, 6.0), not a nested chain.
        assert!(matches!(b, Some(ReflectorNode::Attenuate(inner, s)) if matches!(inner, ReflectorNode::Leaf(_)) && (*s - 6.0).abs() < 1e-12));
        assert!((reflectors.sample(b, 500.0, 1.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn algebraic_equivalence_against_naive_evaluation_sweep() {
        let reflectors = ReflectorCompositor::new();
        let r1 = reflectors.leaf(Arc::new(ConstantReflector::new(0.3))).unwrap();
        let r2 = reflectors.leaf(Arc::new(ConstantReflector::new(0.7))).unwrap();

        // Naive expression: 2*r1 + 3*(r1+r2) == 5*r1 + 3*r2.
        let composite = {
            let two_r1 = reflectors.attenuate(r1, 2.0).unwrap();
            let sum = reflectors.add(r1, r2).unwrap();
            let three_sum = reflectors.attenuate(sum, 3.0).unwrap();
            reflectors.add(two_r1, three_sum).unwrap()
        };

        for lambda in [380.0, 450.0, 550.0, 650.0, 720.0] {
            let naive = 5.0 * reflectors.reflectance(r1, lambda) + 3.0 * reflectors.reflectance(r2, lambda);
            let got = reflectors.reflectance(composite, lambda);
            assert!((got - naive).abs() <= naive.abs() * 1e-5 + 1e-12, "lambda={lambda} got={got} naive={naive}");
        }
    }

    #[test]
    fn spectrum_reflect_nests_multiplicatively() {
        let spectra = SpectrumCompositor::new();
        let reflectors = ReflectorCompositor::new();
        let s = spectra.leaf(Arc::new(ConstantSpectrum::new(2.0))).unwrap();
        let r1 = reflectors.leaf(Arc::new(ConstantReflector::new(0.5))).unwrap();
        let r2 = reflectors.leaf(Arc::new(ConstantReflector::new(0.25))).unwrap();

        let once = spectra.reflect(s, r1).unwrap();
        let twice = spectra.reflect(once, r2).unwrap();

        let got = spectra.sample(twice, 500.0, &reflectors);
        let naive = 2.0 * 0.5 * 0.25;
        assert!((got - naive).abs() <= 1e-9);
    }

    #[test]
    fn reset_many_cycles_does_not_panic() {
        let mut reflectors = ReflectorCompositor::new();
        for _ in 0..1000 {
            let r = reflectors.leaf(Arc::new(ConstantReflector::new(0.5))).unwrap();
            let _ = reflectors.attenuate(r, 2.0).unwrap();
            reflectors.reset();
        }
    }

    #[test]
    fn null_handles_are_absorbing_for_add_and_reflect() {
        let spectra = SpectrumCompositor::new();
        let reflectors = ReflectorCompositor::new();
        let s = spectra.leaf(Arc::new(ConstantSpectrum::new(3.0))).unwrap();
        assert!(std::ptr::eq(spectra.add(s, spectra.null()).unwrap().unwrap(), s.unwrap()));
        assert!(spectra.reflect(s, reflectors.null()).unwrap().is_none());
    }

    #[test]
    fn reset_drops_every_leaf_allocated_since_the_previous_reset() {
        // Regression test for the strong-count leak: `Bump::reset()` never
        // runs `Drop`, so a `Leaf` holding an owning `Arc` directly would
        // keep every allocated reflector alive forever. With the leaf table
        // cleared alongside the arena, the strong count must drop back to
        // one (the local `tracked` binding) after `reset()`.
        let mut reflectors = ReflectorCompositor::new();
        let tracked = Arc::new(ConstantReflector::new(0.5));
        assert_eq!(Arc::strong_count(&tracked), 1);
        for _ in 0..10 {
            let _ = reflectors.leaf(tracked.clone()).unwrap();
        }
        assert!(Arc::strong_count(&tracked) > 1);
        reflectors.reset();
        assert_eq!(Arc::strong_count(&tracked), 1);
    }

    #[test]
    fn leaf_reports_allocation_failure_the_same_way_as_attenuate_and_add() {
        let reflectors = ReflectorCompositor::new();
        let r = reflectors.leaf(Arc::new(ConstantReflector::new(0.4))).unwrap();
        // A leaf exhausting the arena must fail the same way pairwise ops
        // do, not abort the process.
        for _ in 0..100_000 {
            if reflectors.leaf(Arc::new(ConstantReflector::new(0.1))).is_err() {
                return;
            }
        }
        // An arena generous enough never to fail in this loop is also fine;
        // what matters is that `leaf` never aborts. Exercise the explicit
        // fallible path via a node allocation too, for symmetry.
        assert!(reflectors.attenuate(r, 2.0).is_ok());
    }
}
