//! Morton (Z-order) block addressing.
//!
//! A code is the bit-interleaved cell coordinates of a block with a sentinel
//! bit set right above them, at position `dims * level`:
//!
//! ```text
//! level 2, cell (x: 0b10, y: 0b01, z: 0b11)
//!
//!   1 | z1 y1 x1 | z0 y0 x0
//!   1 |  1  0  1 |  1  1  0   = 0b1_101_110
//! ```
//!
//! The sentinel keeps codes of different levels apart: every level `l` code
//! of the 3D codec lies in `[8^l, 2 * 8^l)`. The root is code `1`.
//!
//! Interleaving is done on `u64`, 3D codes support levels up to
//! [`MAX_LEVEL_3D`], 2D codes up to [`MAX_LEVEL_2D`].

use crate::{
    bounding::{TUVec3, Unsigned},
    BlockAddress, TreeError,
};

/// Deepest level a 3D code can hold in 64 bits.
pub const MAX_LEVEL_3D: u8 = 21;

/// Deepest level a 2D code can hold in 64 bits.
pub const MAX_LEVEL_2D: u8 = 31;

/// Number of heap indices used by all levels up to and including `l`:
/// `(8^(l+1) - 1) / 7`.
pub const LEVEL_BOUNDS: [u64; MAX_LEVEL_3D as usize] = level_bounds();

const fn level_bounds() -> [u64; MAX_LEVEL_3D as usize] {
    let mut bounds = [0u64; MAX_LEVEL_3D as usize];
    let mut level = 0;
    let mut width = 1u64;
    let mut total = 0u64;
    while level < MAX_LEVEL_3D as usize {
        total += width;
        bounds[level] = total;
        width *= 8;
        level += 1;
    }
    bounds
}

/// Spread the lower 21 bits of `x` into every third bit.
#[inline]
fn spread_3(x: u64) -> u64 {
    let mut x = x & 0x1f_ffff;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// Inverse of [`spread_3`].
#[inline]
fn compact_3(x: u64) -> u32 {
    let mut x = x & 0x1249_2492_4924_9249;
    x = (x | (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x | (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x | (x >> 32)) & 0x1f_ffff;
    x as u32
}

/// Spread the lower 32 bits of `x` into the even bits.
#[inline]
fn spread_2(x: u64) -> u64 {
    let mut x = x & 0xffff_ffff;
    x = (x | (x << 16)) & 0x0000_ffff_0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_2`].
#[inline]
fn compact_2(x: u64) -> u32 {
    let mut x = x & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff_0000_ffff;
    x = (x | (x >> 16)) & 0x0000_0000_ffff_ffff;
    x as u32
}

/// Index of the highest set bit. `code` must not be zero.
#[inline]
fn top_bit(code: u64) -> u32 {
    63 - code.leading_zeros()
}

/// Encodes a 3D `cell` at `level`.
///
/// Components must lie in `[0, 2^level)` and `level <= MAX_LEVEL_3D`,
/// otherwise the code is garbage. Callers clamp before encoding.
pub fn encode_3d<U: Unsigned>(cell: TUVec3<U>, level: u8) -> u64 {
    debug_assert!(level <= MAX_LEVEL_3D, "Level {level} exceeds 3D codes");
    debug_assert!(cell.fits_level(level), "{cell} outside level {level}");

    let [x, y, z] = cell.to_u64();
    let mask = (1u64 << level) - 1;
    let sentinel = 1u64 << (3 * level as u32);

    sentinel | spread_3(x & mask) | spread_3(y & mask) << 1 | spread_3(z & mask) << 2
}

/// Decodes a 3D code into its cell and level.
///
/// Returns [`None`] for `0`, which carries no sentinel.
pub fn decode_3d(code: u64) -> Option<(TUVec3<u32>, u8)> {
    let level = level_3d(code)?;
    let payload = code & !(1u64 << (3 * level as u32));

    Some((
        TUVec3::new(
            compact_3(payload),
            compact_3(payload >> 1),
            compact_3(payload >> 2),
        ),
        level,
    ))
}

/// Encodes a 2D `cell` at `level`.
///
/// Same preconditions as [`encode_3d`] with `level <= MAX_LEVEL_2D`.
pub fn encode_2d((x, y): (u32, u32), level: u8) -> u64 {
    debug_assert!(level <= MAX_LEVEL_2D, "Level {level} exceeds 2D codes");

    let mask = (1u64 << level) - 1;
    let sentinel = 1u64 << (2 * level as u32);

    sentinel | spread_2(x as u64 & mask) | spread_2(y as u64 & mask) << 1
}

/// Decodes a 2D code into its cell and level.
pub fn decode_2d(code: u64) -> Option<((u32, u32), u8)> {
    if code == 0 {
        return None;
    }
    let level = (top_bit(code) / 2) as u8;
    let payload = code & !(1u64 << (2 * level as u32));

    Some(((compact_2(payload), compact_2(payload >> 1)), level))
}

/// Level of a 3D code, [`None`] for `0`.
#[inline]
pub fn level_3d(code: u64) -> Option<u8> {
    if code == 0 {
        None
    } else {
        Some((top_bit(code) / 3) as u8)
    }
}

/// Code of the child in `octant`.
#[inline]
pub fn child(code: u64, octant: usize) -> u64 {
    debug_assert!(octant < 8, "Octant {octant} out of range");
    code << 3 | octant as u64
}

/// Code of the parent, [`None`] for the root.
#[inline]
pub fn parent(code: u64) -> Option<u64> {
    match code {
        0 | 1 => None,
        code => Some(code >> 3),
    }
}

/// Octant a block occupies inside its parent.
#[inline]
pub fn octant_of(code: u64) -> usize {
    (code & 0b111) as usize
}

/// Level of a heap index.
///
/// Scans [`LEVEL_BOUNDS`] for the first boundary that exceeds `index`.
pub fn level_from_heap_index(index: u64) -> Result<u8, TreeError> {
    LEVEL_BOUNDS
        .iter()
        .position(|&bound| index < bound)
        .map(|level| level as u8)
        .ok_or_else(|| TreeError::AddressOutOfRange(format!("heap index {index}")))
}

/// Converts a 3D Morton code to the heap index of the same block.
///
/// Both orderings enumerate a level's blocks in the same order, so the
/// heap index is the code with its sentinel swapped for the level offset.
pub fn to_heap_index(code: BlockAddress) -> Result<BlockAddress, TreeError> {
    let level = level_3d(code.0)
        .ok_or_else(|| TreeError::AddressOutOfRange(format!("{code} has no level")))?;
    let first = if level == 0 {
        0
    } else {
        LEVEL_BOUNDS[level as usize - 1]
    };
    let offset = code.0 & !(1u64 << (3 * level as u32));
    Ok(BlockAddress(first + offset))
}

/// Converts a heap index to the 3D Morton code of the same block.
pub fn from_heap_index(index: BlockAddress) -> Result<BlockAddress, TreeError> {
    let level = level_from_heap_index(index.0)?;
    let first = if level == 0 {
        0
    } else {
        LEVEL_BOUNDS[level as usize - 1]
    };
    Ok(BlockAddress((1u64 << (3 * level as u32)) | (index.0 - first)))
}
