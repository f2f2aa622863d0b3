//! Crate's core types reimports.

pub use crate::{
    block::{AttributeBuffer, Block, BlockRecord, BlockSource, BlockState, PointPayload},
    block_map::SparseBlockMap,
    bounding::{Aabb, TUVec3, Unsigned},
    bridge::{Bridge, Request, Response},
    config::{FanOut, OctreeConfig},
    heap_tree::{HeapTree, MAX_HEAP_DEPTH},
    index::{BlockIndex, BlockPath},
    moctree::Moctree,
    neighbours::{NeighbourRing, Neighbours},
    queue::BoundedPriorityQueue,
    ray::{Ray, RayHit},
    ring::FixedRingBuffer,
    working_set::{Admission, WorkingSet},
    BlockAddress, TreeError,
};
