//! Bounded set of loaded blocks with distance based eviction.

use glam::DVec3;
use log::{trace, warn};
use rustc_hash::FxHashMap;

use crate::{
    block::{Block, PointPayload},
    index::BlockIndex,
    queue::BoundedPriorityQueue,
    BlockAddress, TreeError,
};

/// Outcome of [`WorkingSet::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored, nothing had to go. Also returned when the address was already
    /// held, its payload and score are replaced then.
    Admitted,
    /// Stored in place of the farthest block.
    Replaced { evicted: BlockAddress },
    /// Farther than everything held by a full set, not stored.
    Rejected,
}

/// Score of `block` seen from `focus`: distance to the block centre,
/// larger is worse.
#[inline]
pub fn score(focus: DVec3, block: &Block) -> f64 {
    block.aabb.center().distance(focus)
}

/// Loaded payloads, at most `capacity` of them.
///
/// Blocks are ranked in a [`BoundedPriorityQueue`], the farthest one sits at
/// the top and is the first to go when room is needed.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    ranking: BoundedPriorityQueue<BlockAddress>,
    payloads: FxHashMap<BlockAddress, PointPayload>,
}

impl WorkingSet {
    pub fn new(capacity: usize) -> Result<Self, TreeError> {
        Ok(WorkingSet {
            ranking: BoundedPriorityQueue::new(capacity)?,
            payloads: FxHashMap::default(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranking.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranking.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ranking.capacity()
    }

    #[inline]
    pub fn contains(&self, address: BlockAddress) -> bool {
        self.payloads.contains_key(&address)
    }

    pub fn payload(&self, address: BlockAddress) -> Option<&PointPayload> {
        self.payloads.get(&address)
    }

    /// Farthest block held and its score.
    pub fn farthest(&self) -> Option<(f64, BlockAddress)> {
        self.ranking
            .peek_max()
            .ok()
            .map(|(score, address)| (score, *address))
    }

    /// Held addresses with their scores, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, BlockAddress)> + '_ {
        self.ranking.iter().map(|(score, address)| (score, *address))
    }

    /// Offers a loaded block.
    ///
    /// When the set is full the block only gets in by evicting a block with
    /// a strictly larger score.
    pub fn offer(
        &mut self,
        address: BlockAddress,
        score: f64,
        payload: PointPayload,
    ) -> Result<Admission, TreeError> {
        if let Some(slot) = self.ranking.position(|held| *held == address) {
            self.ranking.change_priority(slot, score)?;
            self.payloads.insert(address, payload);
            return Ok(Admission::Admitted);
        }

        if !self.ranking.is_full() {
            self.ranking.insert(score, address)?;
            self.payloads.insert(address, payload);
            trace!("{address} admitted with score {score}");
            return Ok(Admission::Admitted);
        }

        let (worst, _) = self.ranking.peek_max()?;
        if score >= worst {
            trace!("{address} rejected, score {score} against {worst}");
            return Ok(Admission::Rejected);
        }

        let (_, evicted) = self.ranking.extract_max()?;
        self.payloads.remove(&evicted);
        self.ranking.insert(score, address)?;
        self.payloads.insert(address, payload);
        warn!("{evicted} evicted for {address}");
        Ok(Admission::Replaced { evicted })
    }

    /// Recomputes every score against a new `focus`.
    pub fn rescore<I: BlockIndex>(&mut self, focus: DVec3, index: &I) -> Result<(), TreeError> {
        let held: Vec<BlockAddress> = self.ranking.iter().map(|(_, a)| *a).collect();
        for address in held {
            let block = index.block(address)?;
            let slot = self
                .ranking
                .position(|a| *a == address)
                .ok_or_else(|| TreeError::IndexOutOfRange(format!("{address} not held")))?;
            self.ranking.change_priority(slot, score(focus, &block))?;
        }
        Ok(())
    }

    /// Drops `address`, returning its payload.
    pub fn evict(&mut self, address: BlockAddress) -> Option<PointPayload> {
        let slot = self.ranking.position(|held| *held == address)?;
        self.ranking.remove(slot).ok()?;
        self.payloads.remove(&address)
    }

    pub fn clear(&mut self) {
        self.ranking.reset();
        self.payloads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::AttributeBuffer, config::OctreeConfig, heap_tree::HeapTree};

    fn payload(points: usize) -> PointPayload {
        PointPayload::new()
            .with_attribute("intensity", AttributeBuffer::U16(vec![0; points]))
            .unwrap()
    }

    #[test]
    fn test_offer() {
        let mut set = WorkingSet::new(2).unwrap();
        assert_eq!(set.offer(BlockAddress(1), 5.0, payload(1)), Ok(Admission::Admitted));
        assert_eq!(set.offer(BlockAddress(2), 3.0, payload(2)), Ok(Admission::Admitted));
        assert_eq!(set.len(), 2);

        // Farther than everything held.
        assert_eq!(set.offer(BlockAddress(3), 7.0, payload(3)), Ok(Admission::Rejected));
        assert!(!set.contains(BlockAddress(3)));

        assert_eq!(
            set.offer(BlockAddress(4), 1.0, payload(4)),
            Ok(Admission::Replaced {
                evicted: BlockAddress(1)
            })
        );
        assert!(!set.contains(BlockAddress(1)));
        assert_eq!(set.payload(BlockAddress(4)).map(PointPayload::point_count), Some(4));
        assert_eq!(set.farthest(), Some((3.0, BlockAddress(2))));
    }

    #[test]
    fn test_offer_held() {
        let mut set = WorkingSet::new(2).unwrap();
        set.offer(BlockAddress(1), 5.0, payload(1)).unwrap();
        set.offer(BlockAddress(2), 3.0, payload(2)).unwrap();

        assert_eq!(set.offer(BlockAddress(1), 1.0, payload(6)), Ok(Admission::Admitted));
        assert_eq!(set.len(), 2);
        assert_eq!(set.farthest(), Some((3.0, BlockAddress(2))));
        assert_eq!(set.payload(BlockAddress(1)).map(PointPayload::point_count), Some(6));
    }

    #[test]
    fn test_evict() {
        let mut set = WorkingSet::new(4).unwrap();
        for i in 0..4u64 {
            set.offer(BlockAddress(i), i as f64, payload(1)).unwrap();
        }
        assert!(set.evict(BlockAddress(1)).is_some());
        assert!(set.evict(BlockAddress(1)).is_none());
        assert_eq!(set.len(), 3);
        assert_eq!(set.farthest(), Some((3.0, BlockAddress(3))));

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.farthest(), None);
    }

    #[test]
    fn test_rescore() {
        let config = OctreeConfig::default()
            .with_bounds(DVec3::splat(-1.0), DVec3::splat(1.0))
            .with_max_depth(1);
        let tree = HeapTree::new(config, []).unwrap();

        let mut set = WorkingSet::new(8).unwrap();
        let near_min = DVec3::splat(-1.0);
        for address in [1u64, 8] {
            let block = tree.block(BlockAddress(address)).unwrap();
            set.offer(BlockAddress(address), score(near_min, &block), payload(1))
                .unwrap();
        }
        assert_eq!(set.farthest().map(|(_, a)| a), Some(BlockAddress(8)));

        set.rescore(DVec3::splat(1.0), &tree).unwrap();
        assert_eq!(set.farthest().map(|(_, a)| a), Some(BlockAddress(1)));

        assert!(set.rescore(DVec3::ZERO, &tree).is_ok());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        assert!(matches!(
            WorkingSet::new(0),
            Err(TreeError::InvalidCapacity(_))
        ));
    }
}
