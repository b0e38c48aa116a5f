//! Binary index serialization and disk I/O
//!
//! Layout: one [`IndexHeader`] followed by `node_count` [`NodeRecord`]s in
//! native byte order. Records are sorted by level, then by Morton code of
//! the cell index, so every parent precedes its children and the
//! `parent_index` of a record always points backwards.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use log::info;

use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Vec3};
use crate::math::morton::encode_index as morton;
use super::index::SpatialIndex;
use super::node::{NodeKey, OctreeNode, MAX_LEVEL};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct IndexHeader {
    pub max_level: i32,
    /// Root edge length (a power of two, so always integral)
    pub size: i32,
    pub corner: [f32; 3],
    pub node_count: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct NodeRecord {
    pub center: [f32; 3],
    pub index: [i32; 3],
    pub level: i32,
    /// Position of the parent record; -1 for the root
    pub parent_index: i32,
    pub contains_collision: u8,
    pub in_bounds: u8,
    pub _pad: [u8; 2],
}

const HEADER_SIZE: usize = std::mem::size_of::<IndexHeader>();
const RECORD_SIZE: usize = std::mem::size_of::<NodeRecord>();

fn corrupt(reason: impl Into<String>) -> Error {
    Error::Persist(reason.into())
}

/// Serialize an index (uncompressed).
///
/// The header stores the root edge as an integer, so a root size that is
/// not a whole number of at least 1 is rejected rather than truncated.
pub fn encode_index(index: &SpatialIndex) -> Result<Vec<u8>> {
    let root_size = index.root_size();
    if !(root_size >= 1.0 && root_size.fract() == 0.0 && root_size <= i32::MAX as f32) {
        return Err(corrupt(format!("root size {} cannot be stored as a whole number", root_size)));
    }

    let mut keys = index.sorted_keys();
    keys.sort_by_key(|key| (key.level, morton(key.index())));

    let positions: HashMap<NodeKey, i32> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| (*key, i as i32))
        .collect();

    let header = IndexHeader {
        max_level: index.max_level() as i32,
        size: root_size as i32,
        corner: index.corner().to_array(),
        node_count: keys.len() as i32,
    };

    let records: Vec<NodeRecord> = keys
        .iter()
        .filter_map(|key| index.get(*key))
        .map(|node| NodeRecord {
            center: node.center.to_array(),
            index: node.key.index().to_array(),
            level: node.key.level as i32,
            parent_index: node.key.parent().and_then(|p| positions.get(&p).copied()).unwrap_or(-1),
            contains_collision: node.contains_collision as u8,
            in_bounds: node.in_bounds as u8,
            _pad: [0; 2],
        })
        .collect();

    let mut bytes = Vec::with_capacity(HEADER_SIZE + records.len() * RECORD_SIZE);
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(bytemuck::cast_slice(&records));
    Ok(bytes)
}

/// Deserialize an index (uncompressed).
///
/// `has_children` is rebuilt from the parent links: each non-root record's
/// offset `index - parent.index * 2` must be a corner of the unit cube.
pub fn decode_index(bytes: &[u8]) -> Result<SpatialIndex> {
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!("{} bytes is too short for a header", bytes.len())));
    }
    let header: IndexHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
    if header.max_level < 0 || header.max_level > MAX_LEVEL as i32 {
        return Err(corrupt(format!("max level {} out of range", header.max_level)));
    }
    if header.size <= 0 {
        return Err(corrupt(format!("root size {} is not positive", header.size)));
    }
    let count = usize::try_from(header.node_count)
        .map_err(|_| corrupt(format!("negative node count {}", header.node_count)))?;
    let body = &bytes[HEADER_SIZE..];
    if count == 0 || body.len() != count * RECORD_SIZE {
        return Err(corrupt(format!(
            "expected {} node records, found {} bytes",
            count,
            body.len()
        )));
    }

    let mut index = SpatialIndex::with_root(
        Vec3::from_array(header.corner),
        header.size as f32,
        header.max_level as u8,
    );
    let mut keys: Vec<NodeKey> = Vec::with_capacity(count);

    for (position, chunk) in body.chunks_exact(RECORD_SIZE).enumerate() {
        let record: NodeRecord = bytemuck::pod_read_unaligned(chunk);
        let level = u8::try_from(record.level)
            .ok()
            .filter(|level| *level <= MAX_LEVEL)
            .ok_or_else(|| corrupt(format!("record {}: level {} out of range", position, record.level)))?;
        let key = NodeKey::new(IVec3::from_array(record.index), level);

        if record.parent_index < 0 {
            if key != NodeKey::ROOT || position != 0 {
                return Err(corrupt(format!("record {}: parentless node {} is not the root", position, key)));
            }
        } else {
            let parent = usize::try_from(record.parent_index)
                .ok()
                .filter(|p| *p < position)
                .and_then(|p| keys.get(p).copied())
                .ok_or_else(|| corrupt(format!(
                    "record {}: parent {} does not precede it",
                    position, record.parent_index
                )))?;
            let offset = key.index() - parent.index() * 2;
            let unit = offset.cmpge(IVec3::ZERO).all() && offset.cmple(IVec3::ONE).all();
            if !unit || key.level != parent.level + 1 {
                return Err(corrupt(format!(
                    "record {}: {} is not a child of {} (offset {:?})",
                    position, key, parent, offset
                )));
            }
            if let Some(parent_node) = index.get_mut(parent) {
                parent_node.has_children = true;
            }
        }

        if position > 0 && index.contains(key) {
            return Err(corrupt(format!("record {}: duplicate node {}", position, key)));
        }
        let mut node = OctreeNode::new(key, index.level_size(level), index.node_center(key));
        node.contains_collision = record.contains_collision != 0;
        node.in_bounds = record.in_bounds != 0;
        if let Some(existing) = index.get(key) {
            node.has_children = existing.has_children;
        }
        index.put(node);
        keys.push(key);
    }

    index.validate().map_err(|err| corrupt(err.to_string()))?;
    index.update_subtree_flags();
    Ok(index)
}

/// Serialize and LZ4-compress an index
pub fn compress(index: &SpatialIndex) -> Result<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(&encode_index(index)?))
}

/// Decompress and deserialize an index
pub fn decompress(data: &[u8]) -> Result<SpatialIndex> {
    let bytes = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| corrupt(format!("LZ4 decompression failed: {}", e)))?;
    decode_index(&bytes)
}

/// Save an index to disk (compressed)
pub async fn save_index(path: &Path, index: &SpatialIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let compressed = compress(index)?;
    tokio::fs::write(path, &compressed).await?;
    info!(
        "Saved {} nodes to {} ({} bytes)",
        index.len(),
        path.display(),
        compressed.len()
    );
    Ok(())
}

/// Load an index saved by [`save_index`]
pub async fn load_index(path: &Path) -> Result<SpatialIndex> {
    let compressed = tokio::fs::read(path).await.map_err(|e| {
        Error::Io(io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    })?;
    let index = decompress(&compressed)?;
    info!("Loaded {} nodes from {}", index.len(), path.display());
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleMesh;
    use crate::octree::voxelizer::voxelize;

    fn sample_index() -> SpatialIndex {
        let triangles = TriangleMesh::cuboid("block", Vec3::new(1.0, 0.0, 1.0), Vec3::new(3.0, 2.0, 6.0))
            .world_triangles()
            .unwrap();
        let mut index = SpatialIndex::with_root(Vec3::new(-4.0, 0.0, -4.0), 16.0, 3);
        voxelize(&triangles, 3, &mut index);
        let open = index.sorted_leaf_keys()[3];
        index.get_mut(open).unwrap().in_bounds = true;
        index.update_subtree_flags();
        index
    }

    fn assert_same(a: &SpatialIndex, b: &SpatialIndex) {
        assert_eq!(a.corner(), b.corner());
        assert_eq!(a.root_size(), b.root_size());
        assert_eq!(a.max_level(), b.max_level());
        assert_eq!(a.sorted_keys(), b.sorted_keys());
        for key in a.sorted_keys() {
            assert_eq!(a.get(key), b.get(key), "node {}", key);
        }
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(HEADER_SIZE, 24);
        assert_eq!(RECORD_SIZE, 36);
    }

    #[test]
    fn test_roundtrip_restores_flags() {
        let index = sample_index();
        let bytes = encode_index(&index).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + index.len() * RECORD_SIZE);
        assert_same(&index, &decode_index(&bytes).unwrap());
    }

    #[test]
    fn test_records_in_level_then_morton_order() {
        let index = sample_index();
        let bytes = encode_index(&index).unwrap();
        let records: Vec<NodeRecord> = bytes[HEADER_SIZE..]
            .chunks_exact(RECORD_SIZE)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(records[0].parent_index, -1);
        for (i, pair) in records.windows(2).enumerate() {
            let a = (pair[0].level, morton(IVec3::from_array(pair[0].index)));
            let b = (pair[1].level, morton(IVec3::from_array(pair[1].index)));
            assert!(a < b);
            assert!(pair[1].parent_index <= i as i32);
        }
    }

    #[test]
    fn test_rejects_bad_child_offset() {
        let index = sample_index();
        let mut bytes = encode_index(&index).unwrap();
        // Push the second record (a level-1 child of the root) out to x = 2
        let at = HEADER_SIZE + RECORD_SIZE + 12;
        bytes[at..at + 4].copy_from_slice(&2i32.to_ne_bytes());
        assert!(matches!(decode_index(&bytes), Err(Error::Persist(_))));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let bytes = encode_index(&sample_index()).unwrap();
        assert!(decode_index(&bytes[..bytes.len() - 5]).is_err());
        assert!(decode_index(&bytes[..10]).is_err());
    }

    /// Record `i` of an encoded index, for in-place corruption
    fn record_offset(i: usize) -> usize {
        HEADER_SIZE + i * RECORD_SIZE
    }

    fn overwrite_record(bytes: &mut [u8], i: usize, record: &NodeRecord) {
        let at = record_offset(i);
        bytes[at..at + RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(record));
    }

    fn read_record(bytes: &[u8], i: usize) -> NodeRecord {
        bytemuck::pod_read_unaligned(&bytes[record_offset(i)..record_offset(i + 1)])
    }

    #[test]
    fn test_rejects_forward_parent_link() {
        let mut bytes = encode_index(&sample_index()).unwrap();
        let mut record = read_record(&bytes, 1);
        record.parent_index = 5;
        overwrite_record(&mut bytes, 1, &record);
        let err = decode_index(&bytes).unwrap_err();
        assert!(matches!(&err, Error::Persist(msg) if msg.contains("does not precede")), "{}", err);
    }

    #[test]
    fn test_rejects_duplicate_node() {
        let mut bytes = encode_index(&sample_index()).unwrap();
        let first_child = read_record(&bytes, 1);
        overwrite_record(&mut bytes, 2, &first_child);
        let err = decode_index(&bytes).unwrap_err();
        assert!(matches!(&err, Error::Persist(msg) if msg.contains("duplicate")), "{}", err);
    }

    #[test]
    fn test_rejects_parentless_non_root() {
        let mut bytes = encode_index(&sample_index()).unwrap();
        let mut record = read_record(&bytes, 1);
        record.parent_index = -1;
        overwrite_record(&mut bytes, 1, &record);
        let err = decode_index(&bytes).unwrap_err();
        assert!(matches!(&err, Error::Persist(msg) if msg.contains("not the root")), "{}", err);
    }

    #[test]
    fn test_rejects_fractional_root_size() {
        for size in [2.5, 0.5] {
            let mut index = SpatialIndex::with_root(Vec3::ZERO, size, 2);
            index.subdivide(NodeKey::ROOT);
            assert!(matches!(encode_index(&index), Err(Error::Persist(_))), "size {}", size);
            assert!(compress(&index).is_err());
        }
    }

    #[tokio::test]
    async fn test_save_rejects_fractional_root_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.nav");
        let index = SpatialIndex::with_root(Vec3::ZERO, 2.5, 1);
        assert!(save_index(&path, &index).await.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_compressed_roundtrip() {
        let index = sample_index();
        let restored = decompress(&compress(&index).unwrap()).unwrap();
        assert_same(&index, &restored);
        assert!(decompress(&[1, 2, 3]).is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("levels").join("arena.nav");
        let index = sample_index();

        save_index(&path, &index).await.unwrap();
        let loaded = load_index(&path).await.unwrap();
        assert_same(&index, &loaded);

        let missing = load_index(&dir.path().join("nope.nav")).await;
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
