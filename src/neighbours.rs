//! Budgeted neighbour streaming around a ray hit.

use crate::{block::Block, heap_tree::HeapTree, index::BlockIndex, BlockAddress};

/// Octant offsets of the ring around a chosen child, nearest siblings first:
/// `o + 1, o - 1, o + 2, o - 2, o + 3, o - 3, o + 4`, all modulo 8.
const RING_OFFSETS: [usize; 7] = [1, 7, 2, 6, 3, 5, 4];

/// The 7 siblings of a block a ray query descended through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourRing {
    pub level: u8,
    /// Heap addresses, nearest octant first.
    pub addresses: [BlockAddress; 7],
}

impl NeighbourRing {
    /// Ring around the heap `address`, which must not be the root.
    pub fn around(address: BlockAddress, level: u8) -> Self {
        debug_assert!(address.0 > 0, "The root has no siblings");
        let first = (address.0 - 1) / 8 * 8 + 1;
        let octant = (address.0 - 1) % 8;

        NeighbourRing {
            level,
            addresses: RING_OFFSETS.map(|offset| {
                BlockAddress(first + (octant + offset as u64) % 8)
            }),
        }
    }
}

/// First heap index `depth` levels below `index`.
///
/// Descendants of a node at a given depth are contiguous:
/// `index * 8^depth + (8^depth - 1) / 7` onwards, `8^depth` of them.
#[inline]
fn first_descendant(index: u64, depth: u8) -> u64 {
    let width = 1u64 << (3 * depth as u32);
    index * width + (width - 1) / 7
}

/// Lazy neighbour iterator, see [`HeapTree::neighbours`].
///
/// Walks one ring at a time, breadth first over the 7 subtrees: every node
/// of one level, ring member by ring member, before the next level.
/// The walk over a ring is pure index arithmetic, nothing is queued.
pub struct Neighbours<'a> {
    tree: &'a mut HeapTree,
    ring: Option<NeighbourRing>,
    /// Levels below the ring.
    depth: u8,
    /// Ring member being expanded.
    member: usize,
    /// Position inside the member's descendants at `depth`.
    offset: u64,
}

impl<'a> Neighbours<'a> {
    pub(crate) fn new(tree: &'a mut HeapTree) -> Self {
        Neighbours {
            tree,
            ring: None,
            depth: 0,
            member: 0,
            offset: 0,
        }
    }

    /// Takes the next unconsumed ring, [`None`] once nothing can be emitted anymore.
    fn next_ring(&mut self) -> Option<NeighbourRing> {
        let ring = *self.tree.rings.get(self.tree.cursor)?;
        self.tree.cursor += 1;

        // Rings get deeper and so does everything below them.
        if self.tree.budgets_spent_from(ring.level) {
            self.tree.cursor = self.tree.rings.len();
            return None;
        }
        Some(ring)
    }
}

impl Iterator for Neighbours<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let ring = match self.ring {
                Some(ring) => ring,
                None => {
                    let ring = self.next_ring()?;
                    self.ring = Some(ring);
                    self.depth = 0;
                    self.member = 0;
                    self.offset = 0;
                    ring
                }
            };

            let level = ring.level + self.depth;
            if level > self.tree.max_depth() || self.tree.budgets_spent_from(level) {
                self.ring = None;
                continue;
            }

            let width = 1u64 << (3 * self.depth as u32);
            let level_spent =
                self.tree.emitted[level as usize] >= self.tree.fan_out.budget(level);
            if self.member == ring.addresses.len() || level_spent {
                self.depth += 1;
                self.member = 0;
                self.offset = 0;
                continue;
            }
            if self.offset == width {
                self.member += 1;
                self.offset = 0;
                continue;
            }

            let index = first_descendant(ring.addresses[self.member].0, self.depth) + self.offset;
            self.offset += 1;

            if self.tree.passes_filter(BlockAddress(index)) {
                self.tree.emitted[level as usize] += 1;
                return Some(self.tree.block_at(index as usize, level));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring() {
        let ring = NeighbourRing::around(BlockAddress(1), 1);
        assert_eq!(ring.addresses.map(|a| a.0), [2, 8, 3, 7, 4, 6, 5]);

        // Octant 5 under node 2.
        let ring = NeighbourRing::around(BlockAddress(22), 2);
        assert_eq!(ring.level, 2);
        assert_eq!(ring.addresses.map(|a| a.0), [23, 21, 24, 20, 17, 19, 18]);
        assert!(!ring.addresses.contains(&BlockAddress(22)));
    }

    #[test]
    fn test_first_descendant() {
        assert_eq!(first_descendant(0, 0), 0);
        assert_eq!(first_descendant(0, 1), 1);
        assert_eq!(first_descendant(0, 2), 9);
        assert_eq!(first_descendant(3, 1), 25);
        // Children of the first child of 3.
        assert_eq!(first_descendant(3, 2), 25 * 8 + 1);
        assert_eq!(first_descendant(3, 3), (25 * 8 + 1) * 8 + 1);
    }
}
