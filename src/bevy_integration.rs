//! [Bevy](https://docs.rs/bevy/) game engine integrations.
//!
//! Adds the [Bevy](https://docs.rs/bevy/) game engine as a dependency.
//!
//! Bevy bounding volumes are single precision, they are widened on the way
//! in and narrowed on the way out.
//!
//! ```ignore
//! let ray: Ray = RayCast3d::new(Vec3A::splat(-1.0), Dir3A::new(Vec3A::ONE).unwrap(), 10.0).into();
//! let blocks = tree.containing_blocks_by_ray(&ray, 2);
//! ```

use bevy::math::{
    bounding::{Aabb3d, RayCast3d},
    Vec3A,
};
use glam::DVec3;

use crate::{bounding::Aabb, ray::Ray};

#[inline]
fn widen(v: Vec3A) -> DVec3 {
    DVec3::new(v.x as f64, v.y as f64, v.z as f64)
}

#[inline]
fn narrow(v: DVec3) -> Vec3A {
    Vec3A::new(v.x as f32, v.y as f32, v.z as f32)
}

/// The cast's `max` is dropped, [`Ray`]s are unbounded.
impl From<RayCast3d> for Ray {
    fn from(value: RayCast3d) -> Self {
        Ray::new(widen(value.origin), widen(*value.direction))
    }
}

impl From<Aabb> for Aabb3d {
    fn from(value: Aabb) -> Self {
        Aabb3d {
            min: narrow(value.min),
            max: narrow(value.max),
        }
    }
}

impl From<Aabb3d> for Aabb {
    fn from(value: Aabb3d) -> Self {
        Aabb::from_min_max(widen(value.min), widen(value.max))
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::{bounding::IntersectsVolume, Dir3A};

    use super::*;
    use crate::{config::OctreeConfig, heap_tree::HeapTree, BlockAddress};

    #[test]
    fn test_ray_conversion() {
        let config = OctreeConfig::default()
            .with_bounds(DVec3::splat(-1.0), DVec3::splat(1.0))
            .with_max_depth(2);
        let mut tree = HeapTree::new(config, []).unwrap();

        let cast = RayCast3d::new(Vec3A::splat(-1.0), Dir3A::new(Vec3A::ONE).unwrap(), 10.0);
        let ray: Ray = cast.into();
        assert_eq!(ray.origin, DVec3::splat(-1.0));

        let blocks = tree.containing_blocks_by_ray(&ray, 2);
        assert_eq!(blocks[0].address, BlockAddress(9));

        let aabb: Aabb3d = blocks[0].aabb.into();
        assert!(cast.intersects(&aabb));
    }

    #[test]
    fn test_aabb_conversion() {
        let aabb = Aabb::from_min_max(DVec3::new(0.5, -1.0, -0.5), DVec3::new(1.0, -0.5, 0.0));
        let bevy_aabb: Aabb3d = aabb.into();
        assert_eq!(bevy_aabb.min, Vec3A::new(0.5, -1.0, -0.5));
        assert_eq!(Aabb::from(bevy_aabb), aabb);
    }
}
