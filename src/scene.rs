//! Scene: shape handles, optional per-shape transforms, and the built
//! acceleration structure (spec.md §4.6).
//!
//! Grounded on the teacher's `raytracer::scene::Scene` (`world`, `camera`,
//! `background_color`), generalized from a flat `Hittable` list wrapped in
//! a `BVHNode` to the spec's per-shape transform/premultiplied model over a
//! k-d tree, and split three ways per spec.md §4.5's traversal-variant
//! requirement.

use std::sync::Arc;

use crate::accel::{KdPrimitive, KdTree};
use crate::light::EnvironmentLight;
use crate::material::MaterialRef;
use crate::math::{BoundingBox, Matrix4, Point3, Ray, Vec3};
use crate::shape::{FaceId, ShapeRef};

/// One resolved intersection against the scene, in world space.
pub struct SceneHit {
    pub shape_index: u32,
    pub face_id: FaceId,
    pub distance: f64,
    pub point: Point3,
    pub normal: Vec3,
    pub u: f64,
    pub v: f64,
}

/// Scratchpad owning the current closest-hit record and the farthest-allowed
/// distance, passed by the caller into `Scene::trace` (spec.md §4.6).
pub struct HitTester {
    pub farthest: f64,
    pub hit: Option<SceneHit>,
}

impl HitTester {
    pub fn new(farthest: f64) -> HitTester {
        HitTester { farthest, hit: None }
    }
}

struct ShapeEntry {
    shape: ShapeRef,
    transform: Option<Matrix4>,
    premultiplied: bool,
}

/// Intersects one shape, applying its transform per spec.md §4.6: a
/// premultiplied shape is already baked into world space and tested
/// directly; otherwise the ray is carried into object space by the inverse
/// transform, and the resulting hit point/normal are carried back out by the
/// forward transform. `t` is preserved across the transform because the ray
/// direction is transformed, not renormalized.
fn intersect_entry(entry: &ShapeEntry, ray: &Ray, t_max: f64) -> Option<(f64, SceneHit)> {
    match (&entry.transform, entry.premultiplied) {
        (None, _) | (Some(_), true) => {
            let hit = entry.shape.intersect(ray, t_max)?;
            let point = ray.at(hit.distance);
            let normal = entry.shape.normal_at(hit.front_face_id, point).unwrap_or(Vec3::ZERO);
            Some((
                hit.distance,
                SceneHit { shape_index: 0, face_id: hit.front_face_id, distance: hit.distance, point, normal, u: hit.u, v: hit.v },
            ))
        }
        (Some(m), false) => {
            let inv = m.inverse()?;
            let local_ray = inv.transform_ray(ray);
            let hit = entry.shape.intersect(&local_ray, t_max)?;
            let local_point = local_ray.at(hit.distance);
            let world_point = m.transform_point(local_point);
            let local_normal = entry.shape.normal_at(hit.front_face_id, local_point).unwrap_or(Vec3::ZERO);
            let world_normal = inv.transform_normal(local_normal).unit_vector();
            Some((
                hit.distance,
                SceneHit {
                    shape_index: 0,
                    face_id: hit.front_face_id,
                    distance: hit.distance,
                    point: world_point,
                    normal: world_normal,
                    u: hit.u,
                    v: hit.v,
                },
            ))
        }
    }
}

fn entry_bounds(entry: &ShapeEntry) -> BoundingBox {
    match (&entry.transform, entry.premultiplied) {
        (None, _) => entry.shape.bounds(None).unwrap_or_else(BoundingBox::empty),
        (Some(_), true) => entry.shape.bounds(None).unwrap_or_else(BoundingBox::empty),
        (Some(m), false) => entry.shape.bounds(Some(m)).unwrap_or_else(BoundingBox::empty),
    }
}

/// World-only primitive set: no shape carries a transform. Avoids the
/// transform branch entirely on the hot path.
struct WorldOnlyPrimitives {
    entries: Vec<ShapeEntry>,
}

impl KdPrimitive for WorldOnlyPrimitives {
    type Hit = SceneHit;

    fn bounds(&self, i: u32) -> BoundingBox {
        entry_bounds(&self.entries[i as usize])
    }

    fn intersect(&self, i: u32, ray: &Ray, t_max: f64) -> Option<(f64, SceneHit)> {
        let mut result = intersect_entry(&self.entries[i as usize], ray, t_max)?;
        result.1.shape_index = i;
        Some(result)
    }
}

/// Every shape carries a non-premultiplied transform: always transform into
/// object space before testing.
struct TransformedPrimitives {
    entries: Vec<ShapeEntry>,
}

impl KdPrimitive for TransformedPrimitives {
    type Hit = SceneHit;

    fn bounds(&self, i: u32) -> BoundingBox {
        entry_bounds(&self.entries[i as usize])
    }

    fn intersect(&self, i: u32, ray: &Ray, t_max: f64) -> Option<(f64, SceneHit)> {
        let mut result = intersect_entry(&self.entries[i as usize], ray, t_max)?;
        result.1.shape_index = i;
        Some(result)
    }
}

/// A mix of transformed, premultiplied, and untransformed shapes: checks
/// the per-shape flag on every intersect.
struct MixedPrimitives {
    entries: Vec<ShapeEntry>,
}

impl KdPrimitive for MixedPrimitives {
    type Hit = SceneHit;

    fn bounds(&self, i: u32) -> BoundingBox {
        entry_bounds(&self.entries[i as usize])
    }

    fn intersect(&self, i: u32, ray: &Ray, t_max: f64) -> Option<(f64, SceneHit)> {
        let mut result = intersect_entry(&self.entries[i as usize], ray, t_max)?;
        result.1.shape_index = i;
        Some(result)
    }
}

enum Accel {
    WorldOnly(KdTree<WorldOnlyPrimitives>),
    Transformed(KdTree<TransformedPrimitives>),
    Mixed(KdTree<MixedPrimitives>),
}

/// A complete scene: geometry, materials attached through the shapes
/// themselves, and an optional environmental light for rays that escape all
/// geometry.
pub struct Scene {
    shapes: Vec<ShapeRef>,
    accel: Accel,
    environment: Option<Arc<dyn EnvironmentLight>>,
}

pub struct ShapePlacement {
    pub shape: ShapeRef,
    pub transform: Option<Matrix4>,
    pub premultiplied: bool,
}

impl Scene {
    /// Builds the scene and its acceleration structure. The traversal
    /// variant (spec.md §4.5) is picked by scanning `placements` once: all
    /// `None` transforms selects world-only, all non-premultiplied
    /// transforms selects transformed, anything else selects mixed.
    pub fn build(placements: Vec<ShapePlacement>, environment: Option<Arc<dyn EnvironmentLight>>) -> crate::error::Result<Scene> {
        let shapes: Vec<ShapeRef> = placements.iter().map(|p| p.shape.clone()).collect();

        let all_untransformed = placements.iter().all(|p| p.transform.is_none());
        let all_transformed_unbaked = placements.iter().all(|p| p.transform.is_some() && !p.premultiplied);

        let entries: Vec<ShapeEntry> = placements
            .into_iter()
            .map(|p| ShapeEntry { shape: p.shape, transform: p.transform, premultiplied: p.premultiplied })
            .collect();
        let count = entries.len() as u32;

        let accel = if all_untransformed {
            Accel::WorldOnly(KdTree::build(count, WorldOnlyPrimitives { entries })?)
        } else if all_transformed_unbaked {
            Accel::Transformed(KdTree::build(count, TransformedPrimitives { entries })?)
        } else {
            Accel::Mixed(KdTree::build(count, MixedPrimitives { entries })?)
        };

        Ok(Scene { shapes, accel, environment })
    }

    pub fn environment(&self) -> Option<&Arc<dyn EnvironmentLight>> {
        self.environment.as_ref()
    }

    pub fn shape(&self, index: u32) -> &ShapeRef {
        &self.shapes[index as usize]
    }

    pub fn material_at(&self, hit: &SceneHit) -> Option<MaterialRef> {
        self.shapes[hit.shape_index as usize].material_of(hit.face_id)
    }

    pub fn emissive_material_at(&self, hit: &SceneHit) -> Option<MaterialRef> {
        self.shapes[hit.shape_index as usize].emissive_material_of(hit.face_id)
    }

    /// Traces `ray` against the scene, narrowing `hit_tester.farthest` and
    /// setting `hit_tester.hit` on success (spec.md §4.6).
    pub fn trace(&self, ray: &Ray, hit_tester: &mut HitTester) {
        let result = match &self.accel {
            Accel::WorldOnly(tree) => tree.intersect(ray, hit_tester.farthest),
            Accel::Transformed(tree) => tree.intersect(ray, hit_tester.farthest),
            Accel::Mixed(tree) => tree.intersect(ray, hit_tester.farthest),
        };
        if let Some((distance, hit)) = result {
            hit_tester.farthest = distance;
            hit_tester.hit = Some(hit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::reflector::ConstantReflector;
    use crate::material::Lambertian;
    use crate::shape::Sphere;

    fn white_material() -> MaterialRef {
        Arc::new(Lambertian::new(Arc::new(ConstantReflector::white())))
    }

    fn sphere_placement(center: Point3, radius: f64, transform: Option<Matrix4>, premultiplied: bool) -> ShapePlacement {
        ShapePlacement {
            shape: Arc::new(Sphere::new(center, radius, white_material())),
            transform,
            premultiplied,
        }
    }

    #[test]
    fn all_untransformed_shapes_select_world_only_accel() {
        let scene = Scene::build(
            vec![sphere_placement(Vec3::new(0.0, 0.0, 5.0), 1.0, None, false)],
            None,
        )
        .unwrap();
        assert!(matches!(scene.accel, Accel::WorldOnly(_)));
    }

    #[test]
    fn all_transformed_unbaked_shapes_select_transformed_accel() {
        let transform = Matrix4::translation(Vec3::new(0.0, 0.0, 5.0));
        let scene = Scene::build(
            vec![sphere_placement(Vec3::ZERO, 1.0, Some(transform), false)],
            None,
        )
        .unwrap();
        assert!(matches!(scene.accel, Accel::Transformed(_)));
    }

    #[test]
    fn mixed_transform_kinds_select_mixed_accel() {
        let transform = Matrix4::translation(Vec3::new(0.0, 0.0, 5.0));
        let scene = Scene::build(
            vec![
                sphere_placement(Vec3::new(0.0, 0.0, 5.0), 1.0, None, false),
                sphere_placement(Vec3::ZERO, 1.0, Some(transform), false),
            ],
            None,
        )
        .unwrap();
        assert!(matches!(scene.accel, Accel::Mixed(_)));
    }

    #[test]
    fn trace_finds_closest_of_two_overlapping_spheres_along_ray() {
        let scene = Scene::build(
            vec![
                sphere_placement(Vec3::new(0.0, 0.0, 5.0), 1.0, None, false),
                sphere_placement(Vec3::new(0.0, 0.0, 10.0), 1.0, None, false),
            ],
            None,
        )
        .unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let mut hit_tester = HitTester::new(f64::INFINITY);
        scene.trace(&ray, &mut hit_tester);
        let hit = hit_tester.hit.unwrap();
        assert_eq!(hit.shape_index, 0);
        assert!((hit.distance - 4.0).abs() < 1e-9);
    }

    #[test]
    fn trace_on_a_transformed_sphere_reports_world_space_hit_and_normal() {
        // Unit sphere at the origin, translated to world-space (0,0,5): a
        // +z ray should hit its world-space near face at distance 4.
        let transform = Matrix4::translation(Vec3::new(0.0, 0.0, 5.0));
        let scene = Scene::build(vec![sphere_placement(Vec3::ZERO, 1.0, Some(transform), false)], None).unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let mut hit_tester = HitTester::new(f64::INFINITY);
        scene.trace(&ray, &mut hit_tester);
        let hit = hit_tester.hit.unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-6);
        assert!((hit.point - Vec3::new(0.0, 0.0, 4.0)).length() < 1e-6);
        assert!((hit.normal - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);
    }

    #[test]
    fn trace_respects_hit_testers_initial_farthest_bound() {
        let scene = Scene::build(vec![sphere_placement(Vec3::new(0.0, 0.0, 5.0), 1.0, None, false)], None).unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let mut hit_tester = HitTester::new(2.0);
        scene.trace(&ray, &mut hit_tester);
        assert!(hit_tester.hit.is_none());
    }

    #[test]
    fn empty_scene_never_reports_a_hit() {
        let scene = Scene::build(vec![], None).unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let mut hit_tester = HitTester::new(f64::INFINITY);
        scene.trace(&ray, &mut hit_tester);
        assert!(hit_tester.hit.is_none());
        assert!(scene.environment().is_none());
    }

    #[test]
    fn material_at_resolves_through_shape_index_and_face_id() {
        let scene = Scene::build(vec![sphere_placement(Vec3::new(0.0, 0.0, 5.0), 1.0, None, false)], None).unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let mut hit_tester = HitTester::new(f64::INFINITY);
        scene.trace(&ray, &mut hit_tester);
        let hit = hit_tester.hit.unwrap();
        assert!(scene.material_at(&hit).is_some());
        assert!(scene.emissive_material_at(&hit).is_none());
    }
}
