//! Octree block indexing for streamed point clouds.
//!
//! A point cloud far larger than memory is cut into a hierarchy of
//! axis-aligned blocks. This crate owns the addressing and query side of that
//! hierarchy: which blocks a [`ray`](ray::Ray) or point touches at a given
//! level of detail, which neighbouring blocks are worth prefetching around a
//! hit, and which loaded blocks should be evicted when the working set is full.
//!
//! Two tree variants are provided:
//!
//! - [`Moctree`](moctree::Moctree): sparse, addressed by [`Morton codes`](morton).
//!   Only blocks announced by the data source are stored, everything else is
//!   synthesised on demand.
//! - [`HeapTree`](heap_tree::HeapTree): dense, 8-ary heap addressed
//!   (`child = parent * 8 + 1 + octant`), with every bounding box precomputed.
//!   Supports [`ray queries`](heap_tree::HeapTree::containing_blocks_by_ray) and
//!   budgeted [`neighbour streaming`](heap_tree::HeapTree::neighbours).
//!
//! Both implement [`BlockIndex`](index::BlockIndex).
//!
//! ## Supporting containers
//!
//! - [`BoundedPriorityQueue`](queue::BoundedPriorityQueue): fixed capacity max-heap.
//! - [`FixedRingBuffer`](ring::FixedRingBuffer): fixed capacity FIFO.
//! - [`SparseBlockMap`](block_map::SparseBlockMap): array backed presence map.
//!
//! ## Optimizations:
//!
//! - Bit interleaving on `u64`, no big integers.
//! - Dense tree bounds live in one flat [`Vec`], parent/child links are arithmetic.
//! - Few memory allocations. [`smallvec`] and [`heapless`] structures are used.
//! - No smart pointers ([`Rc`](`std::rc::Rc`), [`RefCell`](std::cell::RefCell) e.t.c)
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use pointree::prelude::*;
//!
//! fn main() -> Result<(), TreeError> {
//!     let config = OctreeConfig::default()
//!         .with_bounds(DVec3::splat(-1.0), DVec3::splat(1.0))
//!         .with_max_depth(2)
//!         .with_fan_out(256);
//!     let mut tree = HeapTree::new(config, [])?;
//!
//!     let ray = Ray::through(DVec3::splat(-1.0), DVec3::splat(1.0));
//!     let blocks = tree.containing_blocks_by_ray(&ray, 2);
//!
//!     // Finest block first.
//!     assert_eq!(blocks[0].address, BlockAddress(9));
//!     assert_eq!(blocks[1].address, BlockAddress(1));
//!
//!     let around: Vec<Block> = tree.neighbours(1).collect();
//!     assert!(!around.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! To enable bevy conversions:
//!
//! ```toml
//! [dependencies]
//! pointree = { version = "0.1", features = ["bevy"] }
//! ```
//!
//! ## Check yourself list:
//!
//! - tests
//!
//!   ```sh
//!   cargo test --all-targets --all-features --release
//!   ```
//!
//! - benchmark
//!
//!   ```sh
//!   cargo bench
//!   ```

#[cfg(feature = "bevy")]
pub mod bevy_integration;
pub mod block;
pub mod block_map;
pub mod bounding;
pub mod bridge;
pub mod config;
pub mod heap_tree;
pub mod index;
pub mod moctree;
pub mod morton;
pub mod neighbours;
pub mod prelude;
pub mod queue;
pub mod ray;
pub mod ring;
pub mod working_set;

use std::{
    error::Error,
    fmt::{self},
};

/// Address of a block.
///
/// A [`Morton code`](morton) for the [`Moctree`](moctree::Moctree),
/// a heap index for the [`HeapTree`](heap_tree::HeapTree).
/// Use [`morton::to_heap_index`] and [`morton::from_heap_index`]
/// to move between the two.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockAddress(pub u64);

impl From<BlockAddress> for u64 {
    fn from(value: BlockAddress) -> Self {
        value.0
    }
}

impl From<BlockAddress> for usize {
    fn from(value: BlockAddress) -> Self {
        value.0 as usize
    }
}

impl From<u64> for BlockAddress {
    fn from(value: u64) -> Self {
        BlockAddress(value)
    }
}

impl From<usize> for BlockAddress {
    fn from(value: usize) -> Self {
        BlockAddress(value as u64)
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockAddress {}", self.0)
    }
}

/// Enum of all possible errors of the crate's operations.
#[derive(Debug, PartialEq)]
pub enum TreeError {
    /// A [`queue`](queue::BoundedPriorityQueue) or a
    /// [`ring buffer`](ring::FixedRingBuffer) was created with zero capacity.
    InvalidCapacity(String),

    /// Extracting from an empty [`queue`](queue::BoundedPriorityQueue).
    EmptyQueue(String),

    /// Inserting into a full [`queue`](queue::BoundedPriorityQueue).
    QueueFull(String),

    /// Queue slot index beyond the current length.
    IndexOutOfRange(String),

    /// [`BlockAddress`] is not addressable in the tree.
    AddressOutOfRange(String),

    /// Requested tree depth can't be represented.
    /// Queries never raise it, their depth is clamped.
    DepthExceeded(String),

    /// [`Aabb`](bounding::Aabb) bounds are not positive.
    NotPositive(String),

    /// [`Block state`](block::BlockState) can't move to the requested state.
    InvalidTransition(String),

    /// [`Point payload`](block::PointPayload) attribute arrays disagree in length.
    InvalidPayload(String),

    /// [`Bridge`](bridge::Bridge) received a request before initialization.
    NotInitialized(String),

    /// [`Block source`](block::BlockSource) failed to deliver a payload.
    Fetch(String),
}

impl Error for TreeError {}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::InvalidCapacity(info) => write!(f, "Capacity should be positive. {info}"),
            TreeError::EmptyQueue(info) => write!(f, "Queue is empty. {info}"),
            TreeError::QueueFull(info) => write!(f, "Queue is full. {info}"),
            TreeError::IndexOutOfRange(info) => write!(f, "Index out of range. {info}"),
            TreeError::AddressOutOfRange(info) => write!(f, "Address out of range. {info}"),
            TreeError::DepthExceeded(info) => write!(f, "Depth exceeded. {info}"),
            TreeError::NotPositive(info) => {
                write!(f, "All AABB dimensions should be positive. {info}")
            }
            TreeError::InvalidTransition(info) => write!(f, "Invalid block transition. {info}"),
            TreeError::InvalidPayload(info) => write!(f, "Invalid point payload. {info}"),
            TreeError::NotInitialized(info) => write!(f, "Octree is not initialized. {info}"),
            TreeError::Fetch(info) => write!(f, "Block fetch failed. {info}"),
        }
    }
}
