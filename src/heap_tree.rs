//! Dense octree laid out as an 8-ary heap.

use glam::DVec3;
use heapless::Vec as HVec;
use log::{debug, trace, warn};
use smallvec::{smallvec, SmallVec};

use crate::{
    block::{Block, BlockRecord},
    block_map::SparseBlockMap,
    bounding::Aabb,
    config::{FanOut, OctreeConfig},
    index::{BlockIndex, BlockPath},
    morton::{self, LEVEL_BOUNDS},
    neighbours::{NeighbourRing, Neighbours},
    ray::Ray,
    ring::FixedRingBuffer,
    BlockAddress, TreeError,
};

/// Deepest [`HeapTree`] that can be built. Depth 7 already holds
/// 2 396 745 precomputed boxes.
pub const MAX_HEAP_DEPTH: u8 = 7;

/// Dense octree.
///
/// Every node down to `max_depth` exists and is addressed by its heap index:
/// the root is `0`, children of `i` are `i * 8 + 1 + octant`.
/// Bounding boxes are computed once at construction and stored in a flat
/// [`Vec`], so a box lookup is a single index.
///
/// On top of point queries the tree answers
/// [`ray queries`](HeapTree::containing_blocks_by_ray) and streams
/// budgeted [`neighbours`](HeapTree::neighbours) around the last ray hit.
#[derive(Debug, Clone)]
pub struct HeapTree {
    config: OctreeConfig,
    bounds: Vec<Aabb>,
    known: SparseBlockMap<BlockRecord>,
    non_empty: usize,
    pub(crate) fan_out: FanOut,
    /// Rings recorded by the last ray query, one per level.
    pub(crate) rings: SmallVec<[NeighbourRing; 8]>,
    /// First ring not yet consumed by [`Neighbours`].
    pub(crate) cursor: usize,
    /// Neighbours emitted per level since the last ray query.
    pub(crate) emitted: SmallVec<[u32; 8]>,
}

impl HeapTree {
    /// Address of the root block.
    pub const ROOT: BlockAddress = BlockAddress(0);

    /// Builds a tree over `config`'s bounds with every box precomputed.
    ///
    /// `manifest` maps heap indices to known point counts.
    pub fn new<I>(config: OctreeConfig, manifest: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = (BlockAddress, u32)>,
    {
        let root = config.validate(MAX_HEAP_DEPTH)?;
        let node_count = LEVEL_BOUNDS[config.max_depth as usize] as usize;

        let mut bounds = Vec::with_capacity(node_count);
        bounds.push(root);

        // Parents leave the queue in ascending order and push their children
        // right behind each other, so boxes are appended at their own index.
        let mut queue = FixedRingBuffer::new(node_count)?;
        queue.push(0usize);
        while let Some(parent) = queue.pop() {
            let first = parent * 8 + 1;
            if first >= node_count {
                continue;
            }
            debug_assert_eq!(bounds.len(), first);
            let aabb = bounds[parent];
            for octant in 0..8 {
                bounds.push(aabb.octant(octant));
                queue.push(first + octant);
            }
        }

        let mut tree = HeapTree {
            config,
            bounds,
            known: SparseBlockMap::new(node_count),
            non_empty: 0,
            fan_out: FanOut::new(config.fan_out, config.max_depth),
            rings: SmallVec::new(),
            cursor: 0,
            emitted: smallvec![0; config.max_depth as usize + 1],
        };

        for (address, points) in manifest {
            let record = BlockRecord::announced(points);
            let old = match tree.known.set(address, record) {
                Ok(old) => old,
                Err(err) => {
                    warn!("Rejecting manifest entry {address}: {err}");
                    return Err(err);
                }
            };
            if old.is_some_and(|old| old.is_non_empty()) {
                tree.non_empty -= 1;
            }
            if record.is_non_empty() {
                tree.non_empty += 1;
            }
        }

        debug!(
            "HeapTree over {} with depth {}, {} nodes, {} known blocks ({} non-empty), fan out {:?}",
            root,
            config.max_depth,
            node_count,
            tree.known.len(),
            tree.non_empty,
            tree.fan_out.as_slice()
        );
        Ok(tree)
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    pub fn fan_out(&self) -> &FanOut {
        &self.fan_out
    }

    /// Total number of nodes, `(8^(max_depth + 1) - 1) / 7`.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.bounds.len()
    }

    fn check_address(&self, address: BlockAddress) -> Result<usize, TreeError> {
        let index = usize::from(address);
        if address.0 < self.bounds.len() as u64 {
            Ok(index)
        } else {
            Err(TreeError::AddressOutOfRange(format!(
                "{address}, node count {}",
                self.bounds.len()
            )))
        }
    }

    /// Bounding box of `address`.
    pub fn aabb(&self, address: BlockAddress) -> Result<Aabb, TreeError> {
        let index = self.check_address(address)?;
        Ok(self.bounds[index])
    }

    /// Level of `address`.
    pub fn level_of(&self, address: BlockAddress) -> Result<u8, TreeError> {
        self.check_address(address)?;
        morton::level_from_heap_index(address.0)
    }

    /// Addresses of the 8 children of `address`.
    pub fn children(&self, address: BlockAddress) -> Result<[BlockAddress; 8], TreeError> {
        let index = self.check_address(address)?;
        let first = index * 8 + 1;
        if first >= self.bounds.len() {
            return Err(TreeError::AddressOutOfRange(format!(
                "{address} is a leaf"
            )));
        }
        Ok(std::array::from_fn(|octant| {
            BlockAddress::from(first + octant)
        }))
    }

    /// Parent of `address`, [`None`] for the root.
    pub fn parent(&self, address: BlockAddress) -> Option<BlockAddress> {
        match address.0 {
            0 => None,
            index => Some(BlockAddress((index - 1) / 8)),
        }
    }

    /// Recorded blocks in ascending address order.
    pub fn records(&self) -> impl Iterator<Item = (BlockAddress, &BlockRecord)> {
        self.known.iter()
    }

    /// Rings recorded by the last ray query.
    pub fn rings(&self) -> &[NeighbourRing] {
        &self.rings
    }

    #[inline]
    pub(crate) fn block_at(&self, index: usize, level: u8) -> Block {
        let address = BlockAddress::from(index);
        Block::new(level, address, self.bounds[index], self.known.get(address))
    }

    /// Are the budgets of `level` and every deeper level spent.
    pub(crate) fn budgets_spent_from(&self, level: u8) -> bool {
        (level..=self.config.max_depth)
            .all(|l| self.emitted[l as usize] >= self.fan_out.budget(l))
    }

    /// Blocks crossed by `ray`, one per level from `lod` (clamped to
    /// `max_depth`) up to level 1, finest first.
    ///
    /// At every level the child chosen to descend into is the one whose min
    /// corner lies nearest to the ray origin, preferring blocks known to hold
    /// points. Only those are returned, as long as anything is known at all.
    /// The descent stops early when no child is crossed.
    ///
    /// The 7 siblings of every chosen child are recorded for
    /// [`neighbours`](HeapTree::neighbours), replacing the ones of the
    /// previous query along with the neighbour budgets.
    pub fn containing_blocks_by_ray(&mut self, ray: &Ray, lod: u8) -> Vec<Block> {
        let lod = self.config.clamp_lod(lod);
        self.rings.clear();
        self.cursor = 0;
        self.emitted.iter_mut().for_each(|count| *count = 0);

        let mut hits = Vec::with_capacity(lod as usize);
        if !ray.intersects(&self.bounds[0]) {
            trace!("{ray:?} misses the root");
            return hits;
        }

        let mut node = 0usize;
        for level in 1..=lod {
            let first = node * 8 + 1;

            let mut candidates = HVec::<(usize, f64), 8>::new();
            for child in first..first + 8 {
                let aabb = &self.bounds[child];
                if ray.intersects(aabb) {
                    // Never more than 8 children.
                    candidates.push((child, ray.distance_to(aabb.min))).ok();
                }
            }

            let nearest = |known_only: bool| {
                candidates
                    .iter()
                    .filter(|(child, _)| {
                        !known_only || self.passes_filter(BlockAddress::from(*child))
                    })
                    .fold(None, |best: Option<(usize, f64)>, &(child, distance)| match best {
                        Some((_, best_distance)) if best_distance <= distance => best,
                        _ => Some((child, distance)),
                    })
            };
            let Some((child, _)) = nearest(true).or_else(|| nearest(false)) else {
                break;
            };

            if self.passes_filter(BlockAddress::from(child)) {
                hits.push(self.block_at(child, level));
            }
            self.rings.push(NeighbourRing::around(BlockAddress::from(child), level));
            node = child;
        }

        hits.reverse();
        trace!(
            "{ray:?} at lod {lod} crosses {:?}",
            hits.iter().map(|b| b.address.0).collect::<Vec<_>>()
        );
        hits
    }

    /// Streams neighbour blocks around the last ray hit.
    ///
    /// Rings recorded for levels coarser than `seed_lod` (clamped to
    /// `1..=max_depth`) are skipped. Each remaining ring is expanded breadth
    /// first, a block is yielded when its level still has budget left
    /// (see [`FanOut`]) and it is known to hold points, or nothing is known
    /// yet.
    ///
    /// Budgets and consumed rings persist across calls until the next
    /// [`ray query`](HeapTree::containing_blocks_by_ray).
    pub fn neighbours(&mut self, seed_lod: u8) -> Neighbours<'_> {
        let seed = seed_lod.clamp(1, self.config.max_depth.max(1));
        while self
            .rings
            .get(self.cursor)
            .is_some_and(|ring| ring.level < seed)
        {
            self.cursor += 1;
        }
        Neighbours::new(self)
    }

    fn update<F>(&mut self, address: BlockAddress, update: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut BlockRecord) -> Result<(), TreeError>,
    {
        self.check_address(address)?;
        let mut record = self.known.get(address).copied().unwrap_or_default();
        let mut non_empty = self.non_empty;
        record.tracked(&mut non_empty, update)?;
        self.known.set(address, record)?;
        self.non_empty = non_empty;
        Ok(())
    }
}

impl BlockIndex for HeapTree {
    fn max_depth(&self) -> u8 {
        self.config.max_depth
    }

    fn root_aabb(&self) -> Aabb {
        self.bounds[0]
    }

    fn block(&self, address: BlockAddress) -> Result<Block, TreeError> {
        let level = self.level_of(address)?;
        Ok(self.block_at(usize::from(address), level))
    }

    fn containing_blocks(&self, point: DVec3, lod: u8) -> BlockPath {
        let lod = self.config.clamp_lod(lod);
        let mut path = BlockPath::new();

        if !self.bounds[0].contains(point) {
            trace!("{point} lies outside {}", self.bounds[0]);
            return path;
        }

        let mut node = 0usize;
        for level in 1..=lod {
            node = node * 8 + 1 + self.bounds[node].octant_of(point);
            path.push(self.block_at(node, level));
        }

        path.reverse();
        path
    }

    fn record(&self, address: BlockAddress) -> Option<&BlockRecord> {
        self.known.get(address)
    }

    fn mark_loading(&mut self, address: BlockAddress) -> Result<(), TreeError> {
        self.update(address, BlockRecord::mark_loading)
    }

    fn add_block(&mut self, address: BlockAddress, points: u32) -> Result<(), TreeError> {
        self.update(address, |record| record.load(points))
    }

    fn delete_block(&mut self, address: BlockAddress) -> Result<(), TreeError> {
        self.update(address, BlockRecord::delete)
    }

    fn known_non_empty_len(&self) -> usize {
        self.non_empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockState;
    use rand::Rng;

    fn config(depth: u8, fan_out: u32) -> OctreeConfig {
        OctreeConfig::default()
            .with_bounds(DVec3::splat(-1.0), DVec3::splat(1.0))
            .with_max_depth(depth)
            .with_fan_out(fan_out)
    }

    fn diagonal() -> Ray {
        Ray::through(DVec3::splat(-1.0), DVec3::splat(1.0))
    }

    #[test]
    fn test_two_levels() {
        let tree = HeapTree::new(config(1, 1), []).unwrap();
        assert_eq!(tree.node_count(), 9);
        assert_eq!(
            tree.aabb(BlockAddress(1)),
            Ok(Aabb::from_min_max(DVec3::splat(-1.0), DVec3::ZERO))
        );
        assert_eq!(
            tree.aabb(BlockAddress(8)),
            Ok(Aabb::from_min_max(DVec3::ZERO, DVec3::ONE))
        );
        assert!(matches!(
            tree.aabb(BlockAddress(9)),
            Err(TreeError::AddressOutOfRange(_))
        ));
    }

    #[test]
    fn test_bounds_tile_parents() {
        let tree = HeapTree::new(config(3, 8), []).unwrap();
        assert_eq!(tree.node_count(), 585);

        for parent in 0..LEVEL_BOUNDS[2] {
            let parent = BlockAddress(parent);
            let aabb = tree.aabb(parent).unwrap();
            let children = tree.children(parent).unwrap();

            let mut volume = 0.0;
            for (octant, child) in children.into_iter().enumerate() {
                let child_aabb = tree.aabb(child).unwrap();
                assert_eq!(child_aabb, aabb.octant(octant));
                assert!(aabb.contains_aabb(&child_aabb));
                assert_eq!(tree.parent(child), Some(parent));
                volume += child_aabb.volume();
            }
            assert_eq!(volume, aabb.volume());
        }
        assert!(tree.children(BlockAddress(73)).is_err());
        assert_eq!(tree.parent(HeapTree::ROOT), None);
    }

    #[test]
    fn test_depth_limit() {
        assert!(matches!(
            HeapTree::new(config(MAX_HEAP_DEPTH + 1, 8), []),
            Err(TreeError::DepthExceeded(_))
        ));
        assert!(matches!(
            HeapTree::new(config(2, 8), [(BlockAddress(73), 5)]),
            Err(TreeError::AddressOutOfRange(_))
        ));
    }

    #[test]
    fn test_level_of() {
        let tree = HeapTree::new(config(2, 8), []).unwrap();
        assert_eq!(tree.level_of(BlockAddress(0)), Ok(0));
        assert_eq!(tree.level_of(BlockAddress(8)), Ok(1));
        assert_eq!(tree.level_of(BlockAddress(72)), Ok(2));
        assert!(tree.level_of(BlockAddress(73)).is_err());
    }

    #[test]
    fn test_diagonal_ray() {
        let mut tree = HeapTree::new(config(2, 256), []).unwrap();
        let blocks = tree.containing_blocks_by_ray(&diagonal(), 2);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].address, BlockAddress(9));
        assert_eq!(blocks[0].lod, 2);
        assert_eq!(
            blocks[0].aabb,
            Aabb::from_min_max(DVec3::splat(-1.0), DVec3::splat(-0.5))
        );
        assert_eq!(blocks[1].address, BlockAddress(1));
        assert_eq!(blocks[1].lod, 1);

        assert_eq!(tree.rings().len(), 2);
        assert_eq!(tree.rings()[0].level, 1);
        assert_eq!(
            tree.rings()[0].addresses.map(|a| a.0),
            [2, 8, 3, 7, 4, 6, 5]
        );
        assert_eq!(
            tree.rings()[1].addresses.map(|a| a.0),
            [10, 16, 11, 15, 12, 14, 13]
        );

        // Deeper requests are clamped.
        assert_eq!(tree.containing_blocks_by_ray(&diagonal(), 9), blocks);
    }

    #[test]
    fn test_ray_miss() {
        let mut tree = HeapTree::new(config(2, 256), []).unwrap();
        let ray = Ray::new(DVec3::new(-3.0, 2.0, 0.0), DVec3::X);
        assert!(tree.containing_blocks_by_ray(&ray, 2).is_empty());
        assert!(tree.rings().is_empty());
        assert_eq!(tree.neighbours(1).count(), 0);
    }

    #[test]
    fn test_ray_along_split_planes() {
        let mut tree = HeapTree::new(config(2, 256), []).unwrap();
        // Straight up through the root centre.
        let ray = Ray::new(DVec3::new(0.0, -3.0, 0.0), DVec3::Y);
        let blocks = tree.containing_blocks_by_ray(&ray, 2);

        // Octant 5 has its min corner (0, -1, 0) closest to the origin.
        assert_eq!(
            blocks.iter().map(|b| b.address.0).collect::<Vec<_>>(),
            vec![49, 6]
        );
        assert_eq!(
            blocks[0].aabb,
            Aabb::from_min_max(DVec3::new(0.0, -1.0, 0.0), DVec3::new(0.5, -0.5, 0.5))
        );
        assert_eq!(tree.rings().len(), 2);
        assert!(tree.neighbours(1).count() > 0);
    }

    #[test]
    fn test_ray_prefers_known_blocks() {
        // Known point counts at the far end of the diagonal.
        let manifest = [(BlockAddress(8), 10), (BlockAddress(72), 3)];
        let mut tree = HeapTree::new(config(2, 256), manifest).unwrap();
        let blocks = tree.containing_blocks_by_ray(&diagonal(), 2);

        assert_eq!(
            blocks.iter().map(|b| b.address.0).collect::<Vec<_>>(),
            vec![72, 8]
        );
        assert_eq!(blocks[0].points, Some(3));
        assert_eq!(blocks[1].state, BlockState::Unknown);
    }

    #[test]
    fn test_ray_skips_unknown_blocks() {
        // Only a level 2 block under a level 1 block that is not announced.
        let mut tree = HeapTree::new(config(2, 256), [(BlockAddress(16), 7)]).unwrap();
        let blocks = tree.containing_blocks_by_ray(&diagonal(), 2);

        assert_eq!(
            blocks.iter().map(|b| b.address.0).collect::<Vec<_>>(),
            vec![16]
        );
        // The unannounced level 1 block was still descended through.
        assert_eq!(tree.rings().len(), 2);
    }

    #[test]
    fn test_neighbour_budget() {
        let mut tree = HeapTree::new(config(4, 30), []).unwrap();
        tree.containing_blocks_by_ray(&diagonal(), 4);

        let mut per_level = [0u32; 5];
        for block in tree.neighbours(1) {
            per_level[block.lod as usize] += 1;
        }
        assert_eq!(per_level, [0, 7, 10, 15, 30]);

        // Everything was consumed.
        assert_eq!(tree.neighbours(1).count(), 0);

        // A new ray query resets the budgets.
        tree.containing_blocks_by_ray(&diagonal(), 4);
        assert_eq!(tree.neighbours(1).count(), 62);
    }

    #[test]
    fn test_neighbour_seed() {
        let mut tree = HeapTree::new(config(4, 30), []).unwrap();
        tree.containing_blocks_by_ray(&diagonal(), 4);

        let blocks: Vec<Block> = tree.neighbours(3).collect();
        assert!(blocks.iter().all(|b| b.lod >= 3));

        // Ring 3 expands down to level 4 and fills both budgets.
        assert_eq!(blocks.iter().filter(|b| b.lod == 3).count(), 7);
        assert_eq!(blocks.iter().filter(|b| b.lod == 4).count(), 30);

        // Out of range seeds are clamped.
        tree.containing_blocks_by_ray(&diagonal(), 4);
        let clamped: Vec<Block> = tree.neighbours(0).collect();
        tree.containing_blocks_by_ray(&diagonal(), 4);
        let first: Vec<Block> = tree.neighbours(1).collect();
        assert_eq!(clamped, first);
    }

    #[test]
    fn test_neighbours_are_unique_and_off_path() {
        let mut tree = HeapTree::new(config(3, 1000), []).unwrap();
        let path = tree.containing_blocks_by_ray(&diagonal(), 3);

        let mut seen = std::collections::HashSet::new();
        for block in tree.neighbours(1) {
            assert!(seen.insert(block.address));
            assert!(path.iter().all(|b| b.address != block.address));
            assert_eq!(tree_level(block.address), block.lod);
        }
        // Budgets of 1000 cover every node of all three rings.
        assert_eq!(seen.len(), 7 + 56 + 448 + 7 + 56 + 7);
    }

    fn tree_level(address: BlockAddress) -> u8 {
        morton::level_from_heap_index(address.0).unwrap()
    }

    #[test]
    fn test_neighbour_filter() {
        let manifest = [
            (BlockAddress(1), 5),
            (BlockAddress(2), 10),
            (BlockAddress(3), 0),
            (BlockAddress(9), 4),
            (BlockAddress(10), 6),
            (BlockAddress(17), 4),
        ];
        let mut tree = HeapTree::new(config(2, 64), manifest).unwrap();
        let hits = tree.containing_blocks_by_ray(&diagonal(), 2);
        assert_eq!(
            hits.iter().map(|b| b.address.0).collect::<Vec<_>>(),
            vec![9, 1]
        );

        // Ring 1 and its subtrees first, then ring 2.
        let blocks: Vec<u64> = tree.neighbours(1).map(|b| b.address.0).collect();
        assert_eq!(blocks, vec![2, 17, 10]);
    }

    #[test]
    fn test_neighbours_dropped_early() {
        let mut tree = HeapTree::new(config(4, 30), []).unwrap();
        tree.containing_blocks_by_ray(&diagonal(), 4);

        let first: Vec<Block> = tree.neighbours(1).take(3).collect();
        assert_eq!(first.len(), 3);
        // Ring 1 was consumed, level 1 budget holds what was taken.
        let rest: Vec<Block> = tree.neighbours(1).collect();
        assert!(rest.iter().all(|b| b.lod >= 2));
        assert_eq!(rest.iter().filter(|b| b.lod == 4).count(), 30);
    }

    #[test]
    fn test_point_query() {
        let tree = HeapTree::new(config(3, 8), []).unwrap();
        let mut rnd = rand::thread_rng();

        for _ in 0..200 {
            let point = DVec3::new(
                rnd.gen_range(-1.0..1.0),
                rnd.gen_range(-1.0..1.0),
                rnd.gen_range(-1.0..1.0),
            );
            let path = tree.containing_blocks(point, 3);
            assert_eq!(path.len(), 3);
            for (block, level) in path.iter().zip([3u8, 2, 1]) {
                assert_eq!(block.lod, level);
                assert!(block.aabb.contains(point));
                assert_eq!(tree.level_of(block.address), Ok(level));
            }
            for pair in path.windows(2) {
                assert_eq!(tree.parent(pair[0].address), Some(pair[1].address));
            }
            assert_eq!(tree.containing_blocks(point, 11), path);
        }

        assert!(tree
            .containing_blocks(DVec3::new(0.0, 0.0, 1.5), 3)
            .is_empty());
    }

    #[test]
    fn test_add_delete() {
        let mut tree = HeapTree::new(config(2, 8), [(BlockAddress(1), 5)]).unwrap();
        assert_eq!(tree.known_non_empty_len(), 1);

        tree.mark_loading(BlockAddress(9)).unwrap();
        tree.add_block(BlockAddress(9), 0).unwrap();
        assert_eq!(tree.block(BlockAddress(9)).unwrap().state, BlockState::Empty);
        assert!(!tree.known_non_empty(BlockAddress(9)));

        tree.add_block(BlockAddress(1), 12).unwrap();
        assert_eq!(tree.block(BlockAddress(1)).unwrap().points, Some(12));
        assert_eq!(tree.known_non_empty_len(), 1);

        tree.delete_block(BlockAddress(1)).unwrap();
        assert_eq!(tree.known_non_empty_len(), 0);
        tree.add_block(BlockAddress(2), 1).unwrap();
        assert!(matches!(
            tree.add_block(BlockAddress(2), 1),
            Err(TreeError::InvalidTransition(_))
        ));
        assert!(matches!(
            tree.mark_loading(BlockAddress(73)),
            Err(TreeError::AddressOutOfRange(_))
        ));
        assert_eq!(
            tree.records().map(|(a, _)| a.0).collect::<Vec<_>>(),
            vec![1, 2, 9]
        );
    }

    #[test]
    fn test_failed_update_keeps_records() {
        let mut tree = HeapTree::new(config(2, 8), [(BlockAddress(1), 5)]).unwrap();

        assert!(matches!(
            tree.delete_block(BlockAddress(9)),
            Err(TreeError::InvalidTransition(_))
        ));
        // Announced but never loaded.
        assert!(matches!(
            tree.delete_block(BlockAddress(1)),
            Err(TreeError::InvalidTransition(_))
        ));
        assert_eq!(
            tree.records().map(|(a, _)| a.0).collect::<Vec<_>>(),
            vec![1]
        );
        assert!(tree.record(BlockAddress(9)).is_none());
        assert_eq!(
            tree.record(BlockAddress(1)),
            Some(&BlockRecord::announced(5))
        );
        assert_eq!(tree.known_non_empty_len(), 1);
    }
}
