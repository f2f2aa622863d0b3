//! Block values, their loading state and point payloads.

use std::{collections::BTreeMap, fmt};

use crate::{bounding::Aabb, BlockAddress, TreeError};

/// Loading state of a block.
///
/// ```text
/// Unknown ──► Loading ──► Loaded ──┐
///    │           │                 ├──► Deleted ──► Loading
///    └───────────┴──────► Empty ───┘
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BlockState {
    /// Nothing fetched yet. The manifest may still know its point count.
    #[default]
    Unknown,
    /// A fetch is in flight.
    Loading,
    /// Payload with points attached.
    Loaded,
    /// Fetched, holds no points.
    Empty,
    /// Payload dropped.
    Deleted,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockState::Unknown => write!(f, "BlockState: Unknown"),
            BlockState::Loading => write!(f, "BlockState: Loading"),
            BlockState::Loaded => write!(f, "BlockState: Loaded"),
            BlockState::Empty => write!(f, "BlockState: Empty"),
            BlockState::Deleted => write!(f, "BlockState: Deleted"),
        }
    }
}

impl BlockState {
    pub fn can_transition_to(self, next: BlockState) -> bool {
        use BlockState::*;
        matches!(
            (self, next),
            (Unknown, Loading)
                | (Unknown, Loaded)
                | (Unknown, Empty)
                | (Loading, Loaded)
                | (Loading, Empty)
                | (Loaded, Deleted)
                | (Empty, Deleted)
                | (Deleted, Loading)
                | (Deleted, Loaded)
                | (Deleted, Empty)
        )
    }

    /// Moves to `next` or fails with [`TreeError::InvalidTransition`].
    pub fn transition(&mut self, next: BlockState) -> Result<(), TreeError> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(TreeError::InvalidTransition(format!("{self} -> {next}")))
        }
    }
}

/// What a tree remembers about an address.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockRecord {
    pub points: u32,
    pub state: BlockState,
}

impl BlockRecord {
    /// Record of a manifest entry, nothing fetched yet.
    pub fn announced(points: u32) -> Self {
        BlockRecord {
            points,
            state: BlockState::Unknown,
        }
    }

    /// Holds points and was not deleted.
    #[inline]
    pub fn is_non_empty(&self) -> bool {
        self.points > 0 && self.state != BlockState::Deleted
    }

    /// Runs `update` and keeps `non_empty`, the tree's count of
    /// non-empty records, in step with it.
    pub(crate) fn tracked<F>(&mut self, non_empty: &mut usize, update: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut BlockRecord) -> Result<(), TreeError>,
    {
        let before = self.is_non_empty();
        update(self)?;
        match (before, self.is_non_empty()) {
            (false, true) => *non_empty += 1,
            (true, false) => *non_empty -= 1,
            _ => (),
        }
        Ok(())
    }

    pub(crate) fn mark_loading(&mut self) -> Result<(), TreeError> {
        self.state.transition(BlockState::Loading)
    }

    pub(crate) fn load(&mut self, points: u32) -> Result<(), TreeError> {
        let next = if points > 0 {
            BlockState::Loaded
        } else {
            BlockState::Empty
        };
        self.state.transition(next)?;
        self.points = points;
        Ok(())
    }

    pub(crate) fn delete(&mut self) -> Result<(), TreeError> {
        self.state.transition(BlockState::Deleted)
    }
}

/// One octree node handed out by queries.
///
/// A plain value, blocks are synthesised from addresses and records
/// and never borrowed from the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub lod: u8,
    pub address: BlockAddress,
    pub aabb: Aabb,
    pub points: Option<u32>,
    pub state: BlockState,
}

impl Block {
    pub(crate) fn new(
        lod: u8,
        address: BlockAddress,
        aabb: Aabb,
        record: Option<&BlockRecord>,
    ) -> Self {
        Block {
            lod,
            address,
            aabb,
            points: record.map(|r| r.points),
            state: record.map(|r| r.state).unwrap_or_default(),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({}, lod: {}, {})", self.address, self.lod, self.aabb)
    }
}

/// Typed numeric array of one point attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl AttributeBuffer {
    pub fn len(&self) -> usize {
        match self {
            AttributeBuffer::U8(v) => v.len(),
            AttributeBuffer::U16(v) => v.len(),
            AttributeBuffer::U32(v) => v.len(),
            AttributeBuffer::I32(v) => v.len(),
            AttributeBuffer::F32(v) => v.len(),
            AttributeBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point data of one block, attribute arrays keyed by name.
///
/// Every array holds one entry per point.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PointPayload {
    attributes: BTreeMap<String, AttributeBuffer>,
}

impl PointPayload {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an attribute, its length has to match the ones already present.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        buffer: AttributeBuffer,
    ) -> Result<Self, TreeError> {
        let name = name.into();
        if let Some((other, existing)) = self.attributes.iter().next() {
            if existing.len() != buffer.len() {
                return Err(TreeError::InvalidPayload(format!(
                    "{name} holds {} points, {other} holds {}",
                    buffer.len(),
                    existing.len()
                )));
            }
        }
        self.attributes.insert(name, buffer);
        Ok(self)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeBuffer> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeBuffer)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn point_count(&self) -> u32 {
        self.attributes
            .values()
            .next()
            .map_or(0, |buffer| buffer.len() as u32)
    }
}

/// Fetch capability of the data layer.
///
/// Implementations are expected to be idempotent and cacheable by address.
pub trait BlockSource {
    fn fetch_block(&mut self, address: BlockAddress) -> Result<PointPayload, TreeError>;
}

impl<F> BlockSource for F
where
    F: FnMut(BlockAddress) -> Result<PointPayload, TreeError>,
{
    fn fetch_block(&mut self, address: BlockAddress) -> Result<PointPayload, TreeError> {
        self(address)
    }
}
