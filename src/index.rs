//! [`BlockIndex`], the surface both tree variants expose to the bridge.

use glam::DVec3;
use smallvec::SmallVec;

use crate::{
    block::{Block, BlockRecord},
    bounding::Aabb,
    BlockAddress, TreeError,
};

/// Containing blocks of a point, finest first. Depths rarely exceed 8.
pub type BlockPath = SmallVec<[Block; 8]>;

/// Common surface of [`Moctree`](crate::moctree::Moctree) and
/// [`HeapTree`](crate::heap_tree::HeapTree).
///
/// Addresses are whatever the implementation uses natively,
/// Morton codes or heap indices.
pub trait BlockIndex {
    fn max_depth(&self) -> u8;

    fn root_aabb(&self) -> Aabb;

    /// Block at `address`, synthesised when nothing is recorded for it.
    fn block(&self, address: BlockAddress) -> Result<Block, TreeError>;

    /// Blocks holding `point` from `lod` (clamped to [`max_depth`](Self::max_depth))
    /// up to level 1, finest first. Empty when `point` lies outside the root.
    fn containing_blocks(&self, point: DVec3, lod: u8) -> BlockPath;

    /// Record stored for `address`, if any.
    fn record(&self, address: BlockAddress) -> Option<&BlockRecord>;

    /// Marks a fetch in flight.
    fn mark_loading(&mut self, address: BlockAddress) -> Result<(), TreeError>;

    /// Records a fetched block with `points` points.
    fn add_block(&mut self, address: BlockAddress, points: u32) -> Result<(), TreeError>;

    /// Drops a block's payload association.
    fn delete_block(&mut self, address: BlockAddress) -> Result<(), TreeError>;

    /// Number of addresses currently known to hold points.
    fn known_non_empty_len(&self) -> usize;

    /// Is `address` known to hold points.
    fn known_non_empty(&self, address: BlockAddress) -> bool {
        self.record(address).is_some_and(BlockRecord::is_non_empty)
    }

    /// Treats every block as non-empty while nothing is known yet.
    fn passes_filter(&self, address: BlockAddress) -> bool {
        self.known_non_empty_len() == 0 || self.known_non_empty(address)
    }
}
