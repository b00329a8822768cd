//! Shape intersection callback and per-face material/normal/emitter lookup
//! (spec.md §3).
//!
//! Grounded on the teacher's `objects::Hittable` trait (`hit`/`bounding_box`)
//! and `objects::sphere::Sphere`; generalized into the required/optional
//! capability split spec.md §3 lays out (a `Shape` need only answer
//! `intersect`, everything else defaults to "unsupported").

use std::sync::Arc;

use crate::material::MaterialRef;
use crate::math::{BoundingBox, Matrix4, Point3, Ray, Vec3};
use crate::rng::Rng;

pub type FaceId = u32;

/// Result of a successful `Shape::intersect`. `front_face_id`/`back_face_id`
/// let a single intersection test report different material/emitter slots
/// depending on which side of the surface was hit (spec.md §3); most shapes
/// use the same id for both.
#[derive(Debug, Clone, Copy)]
pub struct ShapeHit {
    pub distance: f64,
    pub front_face_id: FaceId,
    pub back_face_id: FaceId,
    /// Parametric/barycentric coordinates, shape-defined meaning.
    pub u: f64,
    pub v: f64,
}

/// One boundary crossing of a ray against a shape's enclosed volume: the
/// hit the shape itself would report there, plus whether the ray is
/// entering the volume at that point (`false` means exiting). Grounded on
/// `iris_physx_toolkit/shapes/constructive_solid_geometry.h`'s
/// `Difference`/`Intersection`/`UnionAllocate`, which combine two operand
/// shapes by their ray-volume membership rather than by surface alone; a
/// `Csg` operand must report every crossing along the ray, not just the
/// nearest one, for the boolean combination to be correct.
#[derive(Debug, Clone, Copy)]
pub struct Crossing {
    pub hit: ShapeHit,
    pub entering: bool,
}

/// Polymorphic scene geometry. Only `intersect` is required; every other
/// method is an "optional capability" per spec.md §3 and defaults to
/// reporting "unsupported" (`None`).
pub trait Shape: Send + Sync {
    /// Reports a hit at distance in `(0, t_max]`, or `None`. Rays handed to
    /// `intersect` are assumed already normalized (spec.md §3).
    fn intersect(&self, ray: &Ray, t_max: f64) -> Option<ShapeHit>;

    /// Every boundary crossing of `ray` against this shape's volume, sorted
    /// ascending by distance and alternating entering/exiting, restricted
    /// to `(0, t_max]`. Only shapes describing a closed volume need
    /// implement this; the default (empty) means "not usable as a `Csg`
    /// operand".
    fn all_crossings(&self, _ray: &Ray, _t_max: f64) -> Vec<Crossing> {
        Vec::new()
    }

    /// World-space bounds, optionally under a `model_to_world` transform.
    /// Shapes that are always premultiplied (already in world space) ignore
    /// the transform argument.
    fn bounds(&self, _model_to_world: Option<&Matrix4>) -> Option<BoundingBox> {
        None
    }

    fn normal_at(&self, _face_id: FaceId, _hit_point: Point3) -> Option<Vec3> {
        None
    }

    fn material_of(&self, _face_id: FaceId) -> Option<MaterialRef> {
        None
    }

    fn emissive_material_of(&self, _face_id: FaceId) -> Option<MaterialRef> {
        None
    }

    /// Uniform-area sample of a face's surface, for area-light sampling.
    fn sample_face(&self, _face_id: FaceId, _rng: &mut Rng) -> Option<Point3> {
        None
    }

    /// Solid-angle PDF of `sample_face`'s distribution as seen from the ray
    /// that reached this face at `distance`.
    fn pdf_by_solid_angle(&self, _face_id: FaceId, _to_shape_ray: &Ray, _distance: f64) -> Option<f64> {
        None
    }
}

pub type ShapeRef = Arc<dyn Shape>;

/// A sphere, ground on the teacher's `objects::sphere::Sphere` quadratic
/// solve. Single face (`face_id` is always 0); front/back face ids are
/// equal since a sphere has one material regardless of hit side.
pub struct Sphere {
    center: Point3,
    radius: f64,
    material: MaterialRef,
    emissive: Option<MaterialRef>,
}

impl Sphere {
    pub fn new(center: Point3, radius: f64, material: MaterialRef) -> Sphere {
        Sphere { center, radius, material, emissive: None }
    }

    pub fn new_emissive(center: Point3, radius: f64, material: MaterialRef, emissive: MaterialRef) -> Sphere {
        Sphere { center, radius, material, emissive: Some(emissive) }
    }

    pub fn outward_normal(&self, p: Point3) -> Vec3 {
        (p - self.center) / self.radius
    }
}

impl Shape for Sphere {
    fn intersect(&self, ray: &Ray, t_max: f64) -> Option<ShapeHit> {
        let oc = ray.origin() - self.center;
        let a = ray.direction().length_squared();
        let half_b = oc.dot(&ray.direction());
        let c = oc.length_squared() - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();

        let mut root = (-half_b - sqrt_d) / a;
        if root <= 0.0 || root > t_max {
            root = (-half_b + sqrt_d) / a;
            if root <= 0.0 || root > t_max {
                return None;
            }
        }

        let hit_point = ray.at(root);
        let n = self.outward_normal(hit_point);
        // Spherical (u, v) parametrization for texture lookups downstream.
        let theta = (-n.y()).acos();
        let phi = (-n.z()).atan2(n.x()) + std::f64::consts::PI;
        let u = phi / (2.0 * std::f64::consts::PI);
        let v = theta / std::f64::consts::PI;

        Some(ShapeHit { distance: root, front_face_id: 0, back_face_id: 0, u, v })
    }

    fn bounds(&self, model_to_world: Option<&Matrix4>) -> Option<BoundingBox> {
        let r = Vec3::splat(self.radius);
        let local = BoundingBox::new(self.center - r, self.center + r);
        Some(match model_to_world {
            None => local,
            Some(m) => {
                let a = m.transform_point(local.min());
                let b = m.transform_point(local.max());
                BoundingBox::new(a.min(&b), a.max(&b))
            }
        })
    }

    /// A sphere is convex, so a ray crosses its boundary at most twice: the
    /// near root (entering) and the far root (exiting). If the ray starts
    /// inside the sphere (`c < 0`), only the exit is ahead of the origin.
    fn all_crossings(&self, ray: &Ray, t_max: f64) -> Vec<Crossing> {
        let oc = ray.origin() - self.center;
        let a = ray.direction().length_squared();
        let half_b = oc.dot(&ray.direction());
        let c = oc.length_squared() - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return Vec::new();
        }
        let sqrt_d = discriminant.sqrt();
        let t_near = (-half_b - sqrt_d) / a;
        let t_far = (-half_b + sqrt_d) / a;

        let make_hit = |t: f64| -> ShapeHit {
            let p = ray.at(t);
            let n = self.outward_normal(p);
            let theta = (-n.y()).acos();
            let phi = (-n.z()).atan2(n.x()) + std::f64::consts::PI;
            ShapeHit {
                distance: t,
                front_face_id: 0,
                back_face_id: 0,
                u: phi / (2.0 * std::f64::consts::PI),
                v: theta / std::f64::consts::PI,
            }
        };

        let mut out = Vec::new();
        if c < 0.0 {
            if t_far > 0.0 && t_far <= t_max {
                out.push(Crossing { hit: make_hit(t_far), entering: false });
            }
        } else {
            // `t_near * t_far = c / a >= 0`, so both roots share a sign:
            // if `t_near` is behind the ray origin, so is `t_far`.
            if t_near > 0.0 && t_near <= t_max {
                out.push(Crossing { hit: make_hit(t_near), entering: true });
            }
            if t_far > 0.0 && t_far <= t_max {
                out.push(Crossing { hit: make_hit(t_far), entering: false });
            }
        }
        out
    }

    fn normal_at(&self, _face_id: FaceId, hit_point: Point3) -> Option<Vec3> {
        Some(self.outward_normal(hit_point))
    }

    fn material_of(&self, _face_id: FaceId) -> Option<MaterialRef> {
        Some(self.material.clone())
    }

    fn emissive_material_of(&self, _face_id: FaceId) -> Option<MaterialRef> {
        self.emissive.clone()
    }

    fn sample_face(&self, _face_id: FaceId, rng: &mut Rng) -> Option<Point3> {
        // Uniform point on the sphere via the standard normalized-Gaussian
        // trick: three independent uniforms pushed through an ad hoc
        // rejection-free map (rejection loops don't fit the hot-path
        // no-branching-surprise rule, so we use the polar method instead).
        let z = rng.uniform_float(-1.0, 1.0);
        let phi = rng.uniform_float(0.0, 2.0 * std::f64::consts::PI);
        let r = (1.0 - z * z).max(0.0).sqrt();
        let dir = Vec3::new(r * phi.cos(), r * phi.sin(), z);
        Some(self.center + dir * self.radius)
    }

    fn pdf_by_solid_angle(&self, _face_id: FaceId, to_shape_ray: &Ray, distance: f64) -> Option<f64> {
        let dist_sq = (self.center - to_shape_ray.origin()).length_squared();
        if dist_sq <= self.radius * self.radius {
            // Inside the sphere: fall back to a full-sphere solid angle.
            return Some(1.0 / (4.0 * std::f64::consts::PI));
        }
        let cos_theta_max = (1.0 - self.radius * self.radius / dist_sq).max(0.0).sqrt();
        let solid_angle = 2.0 * std::f64::consts::PI * (1.0 - cos_theta_max);
        let _ = distance;
        Some(1.0 / solid_angle.max(1e-12))
    }
}

/// A triangle mesh: vertex positions, optional per-vertex normals (smooth
/// shading) and per-triangle index triples, one face per triangle.
///
/// Front-face winding is explicit per SPEC_FULL.md §F.3: counter-clockwise
/// as viewed along the outward normal (right-hand rule) is the front face.
pub struct TriangleMesh {
    positions: Vec<Point3>,
    normals: Option<Vec<Vec3>>,
    indices: Vec<[u32; 3]>,
    material: MaterialRef,
    emissive: Option<MaterialRef>,
}

impl TriangleMesh {
    pub fn new(positions: Vec<Point3>, normals: Option<Vec<Vec3>>, indices: Vec<[u32; 3]>, material: MaterialRef) -> TriangleMesh {
        TriangleMesh { positions, normals, indices, material, emissive: None }
    }

    pub fn with_emissive(mut self, emissive: MaterialRef) -> TriangleMesh {
        self.emissive = Some(emissive);
        self
    }

    fn triangle(&self, face_id: FaceId) -> (Point3, Point3, Point3) {
        let [a, b, c] = self.indices[face_id as usize];
        (self.positions[a as usize], self.positions[b as usize], self.positions[c as usize])
    }

    fn geometric_normal(&self, face_id: FaceId) -> Vec3 {
        let (p0, p1, p2) = self.triangle(face_id);
        (p1 - p0).cross(&(p2 - p0)).unit_vector()
    }

    fn area(&self, face_id: FaceId) -> f64 {
        let (p0, p1, p2) = self.triangle(face_id);
        (p1 - p0).cross(&(p2 - p0)).length() * 0.5
    }
}

impl Shape for TriangleMesh {
    fn intersect(&self, ray: &Ray, t_max: f64) -> Option<ShapeHit> {
        let mut closest: Option<ShapeHit> = None;
        let mut bound = t_max;
        for (face_id, _) in self.indices.iter().enumerate() {
            let face_id = face_id as u32;
            let (p0, p1, p2) = self.triangle(face_id);

            // Moller-Trumbore.
            let e1 = p1 - p0;
            let e2 = p2 - p0;
            let pvec = ray.direction().cross(&e2);
            let det = e1.dot(&pvec);
            if det.abs() < 1e-12 {
                continue;
            }
            let inv_det = 1.0 / det;
            let tvec = ray.origin() - p0;
            let u = tvec.dot(&pvec) * inv_det;
            if !(0.0..=1.0).contains(&u) {
                continue;
            }
            let qvec = tvec.cross(&e1);
            let v = ray.direction().dot(&qvec) * inv_det;
            if v < 0.0 || u + v > 1.0 {
                continue;
            }
            let t = e2.dot(&qvec) * inv_det;
            if t <= 0.0 || t > bound {
                continue;
            }
            bound = t;
            closest = Some(ShapeHit { distance: t, front_face_id: face_id, back_face_id: face_id, u, v });
        }
        closest
    }

    fn bounds(&self, model_to_world: Option<&Matrix4>) -> Option<BoundingBox> {
        let mut bb = BoundingBox::empty();
        for &p in &self.positions {
            let p = match model_to_world {
                None => p,
                Some(m) => m.transform_point(p),
            };
            bb = bb.union_point(p);
        }
        Some(bb)
    }

    fn normal_at(&self, face_id: FaceId, hit_point: Point3) -> Option<Vec3> {
        match &self.normals {
            None => Some(self.geometric_normal(face_id)),
            Some(normals) => {
                let (p0, p1, p2) = self.triangle(face_id);
                let [i0, i1, i2] = self.indices[face_id as usize];
                // Barycentric interpolation of per-vertex normals.
                let area = (p1 - p0).cross(&(p2 - p0)).length();
                let w0 = (p1 - hit_point).cross(&(p2 - hit_point)).length() / area;
                let w1 = (p2 - hit_point).cross(&(p0 - hit_point)).length() / area;
                let w2 = 1.0 - w0 - w1;
                let n = normals[i0 as usize] * w0 + normals[i1 as usize] * w1 + normals[i2 as usize] * w2;
                Some(n.unit_vector())
            }
        }
    }

    fn material_of(&self, _face_id: FaceId) -> Option<MaterialRef> {
        Some(self.material.clone())
    }

    fn emissive_material_of(&self, _face_id: FaceId) -> Option<MaterialRef> {
        self.emissive.clone()
    }

    fn sample_face(&self, face_id: FaceId, rng: &mut Rng) -> Option<Point3> {
        let (p0, p1, p2) = self.triangle(face_id);
        let mut a = rng.uniform_float(0.0, 1.0);
        let mut b = rng.uniform_float(0.0, 1.0);
        if a + b > 1.0 {
            a = 1.0 - a;
            b = 1.0 - b;
        }
        Some(p0 + (p1 - p0) * a + (p2 - p0) * b)
    }

    fn pdf_by_solid_angle(&self, face_id: FaceId, to_shape_ray: &Ray, distance: f64) -> Option<f64> {
        let normal = self.geometric_normal(face_id);
        let cos_theta = normal.dot(&to_shape_ray.direction()).abs();
        if cos_theta < 1e-9 {
            return None;
        }
        let area = self.area(face_id);
        Some(distance * distance / (cos_theta * area))
    }
}

fn encode_face_id(source: u8, child_face_id: FaceId) -> FaceId {
    (child_face_id << 1) | (source as u32)
}

fn decode_face_id(face_id: FaceId) -> (u8, FaceId) {
    ((face_id & 1) as u8, face_id >> 1)
}

/// Which boolean combination a `Csg` shape performs. Grounded on
/// `iris_physx_toolkit/shapes/constructive_solid_geometry.h`'s three
/// allocators (`DifferenceAllocate`, `IntersectionAllocate`,
/// `UnionAllocate`), which are otherwise identical two-operand combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsgOp {
    Union,
    Intersection,
    /// `lhs` minus `rhs` (the header's `minuend`/`subtrahend`).
    Difference,
}

fn combine(op: CsgOp, inside_lhs: bool, inside_rhs: bool) -> bool {
    match op {
        CsgOp::Union => inside_lhs || inside_rhs,
        CsgOp::Intersection => inside_lhs && inside_rhs,
        CsgOp::Difference => inside_lhs && !inside_rhs,
    }
}

/// A constructive solid geometry combination of two shapes. No `.c`
/// implementation of the header above survives in the original source (only
/// the opaque `PSHAPE`-to-`PSHAPE` declarations do), so the traversal here
/// is the standard interval/crossing algorithm: each operand reports every
/// point where the ray crosses its volume's boundary
/// (`Shape::all_crossings`), the two sorted crossing lists are merged in
/// distance order tracking "currently inside lhs"/"currently inside rhs",
/// and a crossing is reported for the combination exactly where its boolean
/// membership function actually changes. The nearest such crossing is the
/// surface the ray sees.
///
/// Only operands that implement `all_crossings` (closed volumes - `Sphere`,
/// or another `Csg`) combine correctly; an operand that always reports no
/// crossings (the default, e.g. `TriangleMesh`) behaves as empty space to
/// both the union and intersection, which is a silent wrong answer rather
/// than a panic. Scene construction is expected to only ever build `Csg`
/// over `Sphere`/`Csg` operands, matching spec.md §8's CSG scenario.
pub struct Csg {
    op: CsgOp,
    lhs: ShapeRef,
    rhs: ShapeRef,
}

impl Csg {
    pub fn new(op: CsgOp, lhs: ShapeRef, rhs: ShapeRef) -> Csg {
        Csg { op, lhs, rhs }
    }

    pub fn union(lhs: ShapeRef, rhs: ShapeRef) -> Csg {
        Csg::new(CsgOp::Union, lhs, rhs)
    }

    pub fn intersection(lhs: ShapeRef, rhs: ShapeRef) -> Csg {
        Csg::new(CsgOp::Intersection, lhs, rhs)
    }

    pub fn difference(minuend: ShapeRef, subtrahend: ShapeRef) -> Csg {
        Csg::new(CsgOp::Difference, minuend, subtrahend)
    }

    /// Merges `lhs`/`rhs` crossings in distance order, emitting one event
    /// per crossing tagged with the child (0 = `lhs`, 1 = `rhs`) that
    /// produced it, wherever the combined boolean membership actually
    /// toggles.
    fn merged_crossings(&self, ray: &Ray, t_max: f64) -> Vec<(Crossing, u8)> {
        let a = self.lhs.all_crossings(ray, t_max);
        let b = self.rhs.all_crossings(ray, t_max);

        let mut ia = 0;
        let mut ib = 0;
        // A child whose first reported event is an *exit* started the ray
        // already inside its volume (see `Sphere::all_crossings`'s `c < 0`
        // branch); a child with no events at all is treated as never
        // entered within `t_max`.
        let mut inside_lhs = a.first().is_some_and(|e| !e.entering);
        let mut inside_rhs = b.first().is_some_and(|e| !e.entering);
        let mut prev = combine(self.op, inside_lhs, inside_rhs);
        let mut out = Vec::with_capacity(a.len() + b.len());

        while ia < a.len() || ib < b.len() {
            let take_lhs = match (a.get(ia), b.get(ib)) {
                (Some(ea), Some(eb)) => ea.hit.distance <= eb.hit.distance,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => unreachable!(),
            };
            let (event, source) = if take_lhs {
                let e = a[ia];
                ia += 1;
                inside_lhs = e.entering;
                (e, 0u8)
            } else {
                let e = b[ib];
                ib += 1;
                inside_rhs = e.entering;
                (e, 1u8)
            };
            let combined = combine(self.op, inside_lhs, inside_rhs);
            if combined != prev {
                out.push((Crossing { hit: event.hit, entering: combined }, source));
                prev = combined;
            }
        }
        out
    }
}

impl Shape for Csg {
    fn intersect(&self, ray: &Ray, t_max: f64) -> Option<ShapeHit> {
        let (crossing, source) = self.merged_crossings(ray, t_max).into_iter().next()?;
        Some(ShapeHit {
            distance: crossing.hit.distance,
            front_face_id: encode_face_id(source, crossing.hit.front_face_id),
            back_face_id: encode_face_id(source, crossing.hit.back_face_id),
            u: crossing.hit.u,
            v: crossing.hit.v,
        })
    }

    fn all_crossings(&self, ray: &Ray, t_max: f64) -> Vec<Crossing> {
        self.merged_crossings(ray, t_max)
            .into_iter()
            .map(|(crossing, source)| Crossing {
                hit: ShapeHit {
                    distance: crossing.hit.distance,
                    front_face_id: encode_face_id(source, crossing.hit.front_face_id),
                    back_face_id: encode_face_id(source, crossing.hit.back_face_id),
                    u: crossing.hit.u,
                    v: crossing.hit.v,
                },
                entering: crossing.entering,
            })
            .collect()
    }

    fn bounds(&self, model_to_world: Option<&Matrix4>) -> Option<BoundingBox> {
        let lhs = self.lhs.bounds(model_to_world)?;
        let rhs = self.rhs.bounds(model_to_world)?;
        Some(match self.op {
            CsgOp::Union => lhs.union(&rhs),
            CsgOp::Difference => lhs,
            CsgOp::Intersection => {
                let min = lhs.min().max(&rhs.min());
                let max = lhs.max().min(&rhs.max());
                if (0..3).all(|axis| min[axis] <= max[axis]) {
                    BoundingBox::new(min, max)
                } else {
                    BoundingBox::empty()
                }
            }
        })
    }

    fn normal_at(&self, face_id: FaceId, hit_point: Point3) -> Option<Vec3> {
        let (source, child_face_id) = decode_face_id(face_id);
        let child: &ShapeRef = if source == 0 { &self.lhs } else { &self.rhs };
        let normal = child.normal_at(child_face_id, hit_point)?;
        // Subtracting a volume exposes its inward-facing boundary: the
        // subtrahend's own outward normal points the wrong way for the
        // resulting solid.
        Some(if self.op == CsgOp::Difference && source == 1 { -normal } else { normal })
    }

    fn material_of(&self, face_id: FaceId) -> Option<MaterialRef> {
        let (source, child_face_id) = decode_face_id(face_id);
        if source == 0 {
            self.lhs.material_of(child_face_id)
        } else {
            self.rhs.material_of(child_face_id)
        }
    }

    fn emissive_material_of(&self, face_id: FaceId) -> Option<MaterialRef> {
        let (source, child_face_id) = decode_face_id(face_id);
        if source == 0 {
            self.lhs.emissive_material_of(child_face_id)
        } else {
            self.rhs.emissive_material_of(child_face_id)
        }
    }
}
