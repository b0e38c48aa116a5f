//! Morton encoding (Z-order curve), used to give octree nodes a stable
//! traversal order within a level.

use crate::core::types::IVec3;

/// Spread bits of a 21-bit integer into every third bit of a 64-bit integer
fn spread_bits(x: u32) -> u64 {
    let mut x = x as u64 & 0x1fffff;
    x = (x | (x << 32)) & 0x1f00000000ffff;
    x = (x | (x << 16)) & 0x1f0000ff0000ff;
    x = (x | (x << 8)) & 0x100f00f00f00f00f;
    x = (x | (x << 4)) & 0x10c30c30c30c30c3;
    x = (x | (x << 2)) & 0x1249249249249249;
    x
}

/// Encode 3D coordinates into Morton code (x in bit 0, y in bit 1, z in bit 2)
/// Each coordinate can be up to 21 bits (0..2097151)
pub fn encode_morton_3d(x: u32, y: u32, z: u32) -> u64 {
    spread_bits(x) | (spread_bits(y) << 1) | (spread_bits(z) << 2)
}

/// Morton code of a non-negative octree cell index.
///
/// The low three bits of a child's code are its slot within the parent, so
/// sorting siblings by code matches `CHILD_OFFSETS` order.
pub fn encode_index(index: IVec3) -> u64 {
    encode_morton_3d(index.x as u32, index.y as u32, index.z as u32)
}
