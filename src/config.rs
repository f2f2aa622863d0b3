//! Tree configuration and the per level neighbour budget.

use glam::DVec3;
use num::Integer;
use smallvec::SmallVec;

use crate::{bounding::Aabb, TreeError};

/// Construction parameters shared by both tree variants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OctreeConfig {
    /// Minimum corner of the root block.
    pub min: DVec3,
    /// Maximum corner of the root block.
    pub max: DVec3,
    /// Deepest level queries may reach, the root being level 0.
    pub max_depth: u8,
    /// Total neighbour budget spread over the levels,
    /// see [`FanOut`]. Only used by the [`HeapTree`](crate::heap_tree::HeapTree).
    pub fan_out: u32,
}

impl OctreeConfig {
    pub const DEFAULT: Self = Self {
        min: DVec3::ZERO,
        max: DVec3::ONE,
        max_depth: 4,
        fan_out: 64,
    };

    #[must_use]
    pub fn with_bounds(mut self, min: DVec3, max: DVec3) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_fan_out(mut self, fan_out: u32) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Root box, fails with [`TreeError::NotPositive`] on degenerate bounds.
    pub fn root_aabb(&self) -> Result<Aabb, TreeError> {
        Aabb::new(self.min, self.max)
    }

    /// Checks bounds and that `max_depth` does not exceed `limit`.
    pub fn validate(&self, limit: u8) -> Result<Aabb, TreeError> {
        if self.max_depth > limit {
            return Err(TreeError::DepthExceeded(format!(
                "max depth {} above {limit}",
                self.max_depth
            )));
        }
        self.root_aabb()
    }

    /// Clamps a requested level of detail to `max_depth`.
    #[inline]
    pub fn clamp_lod(&self, lod: u8) -> u8 {
        lod.min(self.max_depth)
    }
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Neighbour budget per level.
///
/// `budget[l] = ceil(total / (max_depth - l + 1))`: the coarse levels get
/// few neighbours, the finest level gets the whole `total`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanOut {
    per_level: SmallVec<[u32; 8]>,
}

impl FanOut {
    pub fn new(total: u32, max_depth: u8) -> Self {
        let per_level = (0..=max_depth)
            .map(|level| Integer::div_ceil(&total, &u32::from(max_depth - level + 1)))
            .collect();
        FanOut { per_level }
    }

    /// Budget of `level`, 0 beyond `max_depth`.
    #[inline]
    pub fn budget(&self, level: u8) -> u32 {
        self.per_level.get(level as usize).copied().unwrap_or(0)
    }

    pub fn levels(&self) -> usize {
        self.per_level.len()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.per_level
    }
}
