//! Request/response surface a worker transport drives the tree through.
//!
//! The transport (a web worker, a thread with a channel, ...) owns a
//! [`Bridge`] and forwards every [`Request`] it receives to
//! [`Bridge::handle`], sending the [`Response`] back.

use glam::DVec3;
use log::{debug, warn};

use crate::{
    block::{Block, BlockSource, BlockState, PointPayload},
    config::OctreeConfig,
    heap_tree::HeapTree,
    index::BlockIndex,
    ray::Ray,
    working_set::{self, Admission, WorkingSet},
    BlockAddress, TreeError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Builds a new tree, dropping the previous one and every held payload.
    Initialize {
        config: OctreeConfig,
        manifest: Vec<(BlockAddress, u32)>,
    },
    /// Attaches a fetched payload. A payload the working set turns down, or
    /// one it evicts to make room, leaves its block `Deleted`.
    Add {
        address: BlockAddress,
        payload: PointPayload,
    },
    /// Drops a payload.
    Delete { address: BlockAddress },
    /// Ray query. With `prefetch` set, crossed blocks worth loading are
    /// fetched from the [`BlockSource`] before answering.
    Intersect { ray: Ray, lod: u8, prefetch: bool },
    /// Drains the neighbours of the last ray query.
    Neighbours { seed_lod: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Initialized { node_count: usize },
    Added {
        address: BlockAddress,
        admission: Admission,
    },
    Deleted { address: BlockAddress },
    Blocks(Vec<Block>),
}

/// Owns a [`HeapTree`], the [`WorkingSet`] of loaded payloads and the
/// [`BlockSource`] used to fetch missing ones.
pub struct Bridge<S: BlockSource> {
    source: S,
    tree: Option<HeapTree>,
    working_set: WorkingSet,
    /// Origin of the last ray, payloads are ranked by their distance to it.
    focus: DVec3,
}

impl<S: BlockSource> Bridge<S> {
    /// Bridge holding at most `capacity` payloads.
    pub fn new(source: S, capacity: usize) -> Result<Self, TreeError> {
        Ok(Bridge {
            source,
            tree: None,
            working_set: WorkingSet::new(capacity)?,
            focus: DVec3::ZERO,
        })
    }

    pub fn tree(&self) -> Option<&HeapTree> {
        self.tree.as_ref()
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn handle(&mut self, request: Request) -> Result<Response, TreeError> {
        match request {
            Request::Initialize { config, manifest } => {
                debug!("Initialize {config:?} with {} manifest entries", manifest.len());
                let tree = HeapTree::new(config, manifest)?;
                let node_count = tree.node_count();
                self.focus = tree.root_aabb().center();
                self.working_set.clear();
                self.tree = Some(tree);
                Ok(Response::Initialized { node_count })
            }
            Request::Add { address, payload } => {
                debug!("Add {address} with {} points", payload.point_count());
                let admission = self.add(address, payload)?;
                Ok(Response::Added { address, admission })
            }
            Request::Delete { address } => {
                debug!("Delete {address}");
                self.tree_mut()?.delete_block(address)?;
                self.working_set.evict(address);
                Ok(Response::Deleted { address })
            }
            Request::Intersect { ray, lod, prefetch } => {
                debug!("Intersect {ray:?} at lod {lod}, prefetch: {prefetch}");
                self.focus = ray.origin;
                let blocks = self.tree_mut()?.containing_blocks_by_ray(&ray, lod);
                if !prefetch {
                    return Ok(Response::Blocks(blocks));
                }

                for block in &blocks {
                    if matches!(block.state, BlockState::Unknown | BlockState::Deleted) {
                        self.fetch(block.address)?;
                    }
                }

                let tree = self.tree_ref()?;
                let blocks = blocks
                    .iter()
                    .map(|block| tree.block(block.address))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Response::Blocks(blocks))
            }
            Request::Neighbours { seed_lod } => {
                debug!("Neighbours from lod {seed_lod}");
                let blocks = self.tree_mut()?.neighbours(seed_lod).collect();
                Ok(Response::Blocks(blocks))
            }
        }
    }

    fn tree_ref(&self) -> Result<&HeapTree, TreeError> {
        self.tree
            .as_ref()
            .ok_or_else(|| TreeError::NotInitialized("no tree built yet".into()))
    }

    fn tree_mut(&mut self) -> Result<&mut HeapTree, TreeError> {
        self.tree
            .as_mut()
            .ok_or_else(|| TreeError::NotInitialized("no tree built yet".into()))
    }

    fn add(&mut self, address: BlockAddress, payload: PointPayload) -> Result<Admission, TreeError> {
        let tree = self.tree_mut()?;
        tree.add_block(address, payload.point_count())?;
        let block = tree.block(address)?;

        let score = working_set::score(self.focus, &block);
        let admission = self.working_set.offer(address, score, payload)?;
        // Dropped payloads must be fetched again.
        match admission {
            Admission::Admitted => (),
            Admission::Replaced { evicted } => self.tree_mut()?.delete_block(evicted)?,
            Admission::Rejected => self.tree_mut()?.delete_block(address)?,
        }
        Ok(admission)
    }

    fn fetch(&mut self, address: BlockAddress) -> Result<Admission, TreeError> {
        self.tree_mut()?.mark_loading(address)?;
        match self.source.fetch_block(address) {
            Ok(payload) => self.add(address, payload),
            Err(err) => {
                warn!("Fetching {address} failed: {err}");
                Err(err)
            }
        }
    }
}
