//! Ray primitive and the slab intersection test.

use glam::DVec3;

use crate::bounding::Aabb;

/// Half-line `origin + t * direction`, `t >= 0`.
///
/// The direction does not have to be normalized. Distances reported by
/// [`Ray::intersect`] are in units of the direction's length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
    inv_direction: DVec3,
}

/// Entry and exit parameters of a [`Ray`] crossing an [`Aabb`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub near: f64,
    pub far: f64,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Ray {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Ray starting at `from` and passing through `to`.
    pub fn through(from: DVec3, to: DVec3) -> Self {
        Ray::new(from, to - from)
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Slab test.
    ///
    /// Boxes merely touched by the ray count as hit. When the origin is
    /// inside the box `near` is clamped to `0`.
    pub fn intersect(&self, aabb: &Aabb) -> Option<RayHit> {
        let mut near = 0.0_f64;
        let mut far = f64::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let (min, max) = (aabb.min[axis], aabb.max[axis]);

            // Parallel to the slab, `0 * inf` would poison the interval.
            if self.direction[axis] == 0.0 {
                if origin < min || origin > max {
                    return None;
                }
                continue;
            }

            let t1 = (min - origin) * self.inv_direction[axis];
            let t2 = (max - origin) * self.inv_direction[axis];
            near = near.max(t1.min(t2));
            far = far.min(t1.max(t2));
        }

        if far >= near {
            Some(RayHit { near, far })
        } else {
            None
        }
    }

    #[inline]
    pub fn intersects(&self, aabb: &Aabb) -> bool {
        self.intersect(aabb).is_some()
    }

    /// Euclidean distance from the origin to `point`.
    #[inline]
    pub fn distance_to(&self, point: DVec3) -> f64 {
        self.origin.distance(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0))
    }

    #[test]
    fn test_ray_hit() {
        let ray = Ray::new(DVec3::new(-3.0, 0.0, 0.0), DVec3::X);
        assert_eq!(
            ray.intersect(&unit()),
            Some(RayHit {
                near: 2.0,
                far: 4.0
            })
        );

        // miss
        let ray = Ray::new(DVec3::new(-3.0, 2.0, 0.0), DVec3::X);
        assert_eq!(ray.intersect(&unit()), None);

        // behind the origin
        let ray = Ray::new(DVec3::new(-3.0, 0.0, 0.0), DVec3::NEG_X);
        assert_eq!(ray.intersect(&unit()), None);
    }

    #[test]
    fn test_ray_inside() {
        let ray = Ray::new(DVec3::ZERO, DVec3::Y);
        assert_eq!(
            ray.intersect(&unit()),
            Some(RayHit {
                near: 0.0,
                far: 1.0
            })
        );
    }

    #[test]
    fn test_ray_touch() {
        // Diagonal through the centre touches every octant at the origin.
        let ray = Ray::through(DVec3::splat(-1.0), DVec3::splat(1.0));
        for child in unit().split() {
            assert!(ray.intersects(&child));
        }

        let corner = Aabb::from_min_max(DVec3::new(0.0, -1.0, -1.0), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(
            ray.intersect(&corner),
            Some(RayHit {
                near: 0.5,
                far: 0.5
            })
        );
    }

    #[test]
    fn test_ray_on_split_plane() {
        // Axis aligned ray running along the x = 0 and z = 0 planes.
        let ray = Ray::new(DVec3::new(0.0, -3.0, 0.0), DVec3::Y);
        assert_eq!(
            ray.intersect(&unit()),
            Some(RayHit {
                near: 2.0,
                far: 4.0
            })
        );
        for child in unit().split() {
            assert!(ray.intersects(&child), "{child} missed");
        }

        let upper = Aabb::from_min_max(DVec3::ZERO, DVec3::ONE);
        assert_eq!(
            ray.intersect(&upper),
            Some(RayHit {
                near: 3.0,
                far: 4.0
            })
        );

        // Parallel outside the slab.
        let ray = Ray::new(DVec3::new(1.5, -3.0, 0.0), DVec3::Y);
        assert_eq!(ray.intersect(&unit()), None);
        for child in unit().split() {
            assert!(!ray.intersects(&child));
        }
    }

    #[test]
    fn test_ray_at() {
        let ray = Ray::through(DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(0.5), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(ray.distance_to(DVec3::new(0.0, 3.0, 4.0)), 5.0);
    }
}
