//! Sparse octree addressed by Morton codes.

use glam::DVec3;
use log::{debug, trace, warn};
use rustc_hash::FxHashMap;

use crate::{
    block::{Block, BlockRecord},
    bounding::Aabb,
    config::OctreeConfig,
    index::{BlockIndex, BlockPath},
    morton::{self, MAX_LEVEL_3D},
    BlockAddress, TreeError,
};

/// Sparse octree.
///
/// Only addresses the data source told about are stored. Every other block
/// is synthesised from its [`Morton code`](morton) when asked for, queries
/// never materialise anything.
#[derive(Debug, Clone)]
pub struct Moctree {
    config: OctreeConfig,
    root: Aabb,
    records: FxHashMap<u64, BlockRecord>,
    non_empty: usize,
}

impl Moctree {
    /// Address of the root block.
    pub const ROOT: BlockAddress = BlockAddress(1);

    /// Builds a tree over `config`'s bounds.
    ///
    /// `manifest` maps Morton codes to known point counts. Entries that are
    /// not valid codes or lie below `max_depth` are rejected.
    pub fn new<I>(config: OctreeConfig, manifest: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = (BlockAddress, u32)>,
    {
        let root = config.validate(MAX_LEVEL_3D)?;
        let mut tree = Moctree {
            config,
            root,
            records: FxHashMap::default(),
            non_empty: 0,
        };

        for (address, points) in manifest {
            if let Err(err) = tree.check_address(address) {
                warn!("Rejecting manifest entry {address}: {err}");
                return Err(err);
            }
            let record = BlockRecord::announced(points);
            if record.is_non_empty() {
                tree.non_empty += 1;
            }
            if let Some(old) = tree.records.insert(address.0, record) {
                if old.is_non_empty() {
                    tree.non_empty -= 1;
                }
            }
        }

        debug!(
            "Moctree over {} with depth {}, {} known blocks ({} non-empty)",
            root,
            config.max_depth,
            tree.records.len(),
            tree.non_empty
        );
        Ok(tree)
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Level of `address`, failing for codes the tree can't hold.
    pub fn check_address(&self, address: BlockAddress) -> Result<u8, TreeError> {
        match morton::level_3d(address.0) {
            Some(level) if level <= self.config.max_depth => Ok(level),
            Some(level) => Err(TreeError::AddressOutOfRange(format!(
                "{address} at level {level}, max depth {}",
                self.config.max_depth
            ))),
            None => Err(TreeError::AddressOutOfRange(format!(
                "{address} is not a Morton code"
            ))),
        }
    }

    /// Bounding box of `address`.
    ///
    /// Halves the root along the code's octants, top level first, the same
    /// way [`containing_blocks`](BlockIndex::containing_blocks) descends.
    pub fn aabb(&self, address: BlockAddress) -> Result<Aabb, TreeError> {
        let level = self.check_address(address)?;
        Ok((0..level).rev().fold(self.root, |cell, shift| {
            cell.octant(morton::octant_of(address.0 >> (3 * shift)))
        }))
    }

    /// Addresses of the 8 children of `address`.
    pub fn children(&self, address: BlockAddress) -> Result<[BlockAddress; 8], TreeError> {
        let level = self.check_address(address)?;
        if level == self.config.max_depth {
            return Err(TreeError::AddressOutOfRange(format!(
                "{address} is a leaf at depth {level}"
            )));
        }
        Ok(std::array::from_fn(|octant| {
            BlockAddress(morton::child(address.0, octant))
        }))
    }

    /// Parent of `address`, [`None`] for the root.
    pub fn parent(&self, address: BlockAddress) -> Option<BlockAddress> {
        morton::parent(address.0).map(BlockAddress)
    }

    /// Recorded blocks, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = (BlockAddress, &BlockRecord)> {
        self.records
            .iter()
            .map(|(&code, record)| (BlockAddress(code), record))
    }

    fn update<F>(&mut self, address: BlockAddress, update: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut BlockRecord) -> Result<(), TreeError>,
    {
        self.check_address(address)?;
        let mut record = self.records.get(&address.0).copied().unwrap_or_default();
        let mut non_empty = self.non_empty;
        record.tracked(&mut non_empty, update)?;
        self.records.insert(address.0, record);
        self.non_empty = non_empty;
        Ok(())
    }
}

impl BlockIndex for Moctree {
    fn max_depth(&self) -> u8 {
        self.config.max_depth
    }

    fn root_aabb(&self) -> Aabb {
        self.root
    }

    fn block(&self, address: BlockAddress) -> Result<Block, TreeError> {
        let level = self.check_address(address)?;
        let aabb = self.aabb(address)?;
        Ok(Block::new(level, address, aabb, self.records.get(&address.0)))
    }

    /// Descends from the root, picking at each level the octant holding
    /// `point` and appending it to the code: `code = (code << 3) + octant`.
    fn containing_blocks(&self, point: DVec3, lod: u8) -> BlockPath {
        let lod = self.config.clamp_lod(lod);
        let mut path = BlockPath::new();

        if !self.root.contains(point) {
            trace!("{point} lies outside {}", self.root);
            return path;
        }

        let mut code = Self::ROOT.0;
        let mut cell = self.root;
        for level in 1..=lod {
            let octant = cell.octant_of(point);
            code = (code << 3) + octant as u64;
            cell = cell.octant(octant);
            path.push(Block::new(
                level,
                BlockAddress(code),
                cell,
                self.records.get(&code),
            ));
        }

        path.reverse();
        path
    }

    fn record(&self, address: BlockAddress) -> Option<&BlockRecord> {
        self.records.get(&address.0)
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
