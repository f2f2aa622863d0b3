//! Bounding primitives.
//!
//! [`TUVec3`] for integer cell coordinates, [`Aabb`] for world space boxes.

use std::{
    array::from_fn,
    fmt::{Debug, Display},
    ops::{BitAnd, Shr},
};

use glam::DVec3;
use num::{Integer, NumCast, ToPrimitive, Unsigned as NumUnsigned};

use crate::TreeError;

pub trait Unsigned:
    Integer
    + NumUnsigned
    + NumCast
    + ToPrimitive
    + Shr<Self, Output = Self>
    + BitAnd<Self, Output = Self>
    + Copy
    + Display
    + Debug
    + Default
{
}
impl Unsigned for u8 {}
impl Unsigned for u16 {}
impl Unsigned for u32 {}
impl Unsigned for u64 {}
impl Unsigned for usize {}

/// Tree Unsigned Vec3
///
/// Cell coordinates of a block inside its level grid.
/// At level `l` every component lies in `[0, 2^l)`.
/// Inner type should be any [`Unsigned`](num::Unsigned):
/// `u8`, `u16`, `u32`, `u64`, `usize`.
#[derive(Default, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TUVec3<U: Unsigned> {
    pub x: U,
    pub y: U,
    pub z: U,
}

impl<U: Unsigned> Display for TUVec3<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uvec3: x: {}, y: {}, z: {}", self.x, self.y, self.z)
    }
}

impl<U: Unsigned> TUVec3<U> {
    pub fn new(x: U, y: U, z: U) -> Self {
        TUVec3 { x, y, z }
    }

    pub fn splat(size: U) -> Self {
        TUVec3 {
            x: size,
            y: size,
            z: size,
        }
    }

    pub fn zero() -> Self {
        TUVec3::splat(U::zero())
    }

    /// Widens every component to `u64`.
    ///
    /// Components that don't fit are saturated.
    #[inline]
    pub fn to_u64(&self) -> [u64; 3] {
        [
            self.x.to_u64().unwrap_or(u64::MAX),
            self.y.to_u64().unwrap_or(u64::MAX),
            self.z.to_u64().unwrap_or(u64::MAX),
        ]
    }

    /// Checks that every component lies in `[0, 2^level)`.
    pub fn fits_level(&self, level: u8) -> bool {
        match 1u64.checked_shl(level as u32) {
            Some(limit) => self.to_u64().iter().all(|&c| c < limit),
            None => true,
        }
    }
}

/// Axis Aligned Bounding Box in world coordinates.
///
/// Children are numbered by octant: bit 0 selects the upper half on `x`,
/// bit 1 on `y`, bit 2 on `z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: DVec3::ZERO,
            max: DVec3::ONE,
        }
    }
}

impl Display for Aabb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Aabb(min: {}, max: {})", self.min, self.max)
    }
}

impl Aabb {
    /// Creates a new [`Aabb`] object
    ///
    /// Checks that its dimensions are positive and finite.
    pub fn new(min: DVec3, max: DVec3) -> Result<Self, TreeError> {
        if !(min.is_finite() && max.is_finite()) || min.cmpge(max).any() {
            Err(TreeError::NotPositive(format!("min: {min}, max: {max}")))
        } else {
            Ok(Self::from_min_max(min, max))
        }
    }

    /// Creates a new [`Aabb`] object from a min and max without any checks
    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn half_size(&self) -> DVec3 {
        self.size() * 0.5
    }

    /// Box of the child in `octant`.
    #[inline]
    pub fn octant(&self, octant: usize) -> Aabb {
        debug_assert!(octant < 8, "Octant {octant} out of range");
        let center = self.center();

        let x_mask = (octant & 0b1) != 0;
        let y_mask = (octant & 0b10) != 0;
        let z_mask = (octant & 0b100) != 0;

        Aabb {
            min: DVec3::new(
                if x_mask { center.x } else { self.min.x },
                if y_mask { center.y } else { self.min.y },
                if z_mask { center.z } else { self.min.z },
            ),
            max: DVec3::new(
                if x_mask { self.max.x } else { center.x },
                if y_mask { self.max.y } else { center.y },
                if z_mask { self.max.z } else { center.z },
            ),
        }
    }

    #[inline]
    pub fn split(&self) -> [Aabb; 8] {
        from_fn(|i| self.octant(i))
    }

    /// Octant of the child holding `point`.
    ///
    /// Per axis `floor((p - min) / half_size)` clamped to `[0, 1]`,
    /// so points on the far face land in the upper child.
    pub fn octant_of(&self, point: DVec3) -> usize {
        let cell = ((point - self.min) / self.half_size())
            .floor()
            .clamp(DVec3::ZERO, DVec3::ONE);
        let x = cell.x as usize;
        let y = cell.y as usize;
        let z = cell.z as usize;

        x | y << 1 | z << 2
    }

    /// Box of grid `cell` at `level`, the root being `self`.
    pub fn cell<U: Unsigned>(&self, cell: TUVec3<U>, level: u8) -> Aabb {
        let step = self.size() / (1u64 << level) as f64;
        let [x, y, z] = cell.to_u64();
        let min = self.min + DVec3::new(x as f64, y as f64, z as f64) * step;
        let max = self.min
            + DVec3::new(
                (x + 1) as f64,
                (y + 1) as f64,
                (z + 1) as f64,
            ) * step;
        Aabb { min, max }
    }

    /// Checks if the aabb contains a `point`. Faces are inclusive.
    pub fn contains(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    /// Checks if `other` lies fully inside this box.
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Checks if this volume overlaps with another [`Aabb`].
    /// Boxes sharing only a face don't overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.max.x.min(other.max.x) > self.min.x.max(other.min.x)
            && self.max.y.min(other.max.y) > self.min.y.max(other.min.y)
            && self.max.z.min(other.max.z) > self.min.z.max(other.min.z)
    }

    pub fn volume(&self) -> f64 {
        let size = self.size();
        size.x * size.y * size.z
    }
}
