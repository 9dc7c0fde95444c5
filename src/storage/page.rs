// ┌─────────────────────────────────────────────────────────────────────────┐
// │ Offset            │ Length      │ Description                           │
// │───────────────────┼─────────────┼───────────────────────────────────────│
// │ 0                 │ 2           │ NODE_TYPE (u16 LE, 0=internal 1=leaf) │
// │ 2                 │ 2           │ NKEYS     (u16 LE)                    │
// │ 4                 │ 8 * nkeys   │ POINTERS  (u64 LE child page ids,     │
// │                   │             │            zero-filled in leaves)     │
// │ 4 + 8n            │ 2 * nkeys   │ OFFSETS   (u16 LE, offset[1..=n])     │
// │ 4 + 10n           │ ...         │ RECORDS                               │
// └─────────────────────────────────────────────────────────────────────────┘
//
// Record: [klen u16][vlen u16][key bytes][value bytes], packed in key order.
// offset[i] is the byte length of records 0..i; offset[0] is implicitly 0
// and never stored. Internal-node records carry an empty value.

use crate::error::{TreeError, TreeResult};
use crate::storage::pager::PageId;

pub const HEADER_SIZE: usize = 4;
pub const POINTER_SIZE: usize = 8;
pub const OFFSET_SIZE: usize = 2;
pub const KLEN_SIZE: usize = 2;
pub const VLEN_SIZE: usize = 2;
pub const RECORD_HEADER_SIZE: usize = KLEN_SIZE + VLEN_SIZE;

/// Per-key cost of the pointer and offset arrays.
pub const SLOT_SIZE: usize = POINTER_SIZE + OFFSET_SIZE;

pub const NODE_INTERNAL: u16 = 0;
pub const NODE_LEAF: u16 = 1;

/// Whether a page holds routing entries or key/value records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal,
    Leaf,
}

impl NodeType {
    pub fn tag(self) -> u16 {
        match self {
            NodeType::Internal => NODE_INTERNAL,
            NodeType::Leaf => NODE_LEAF,
        }
    }
}

impl TryFrom<u16> for NodeType {
    type Error = TreeError;

    fn try_from(tag: u16) -> TreeResult<Self> {
        match tag {
            NODE_INTERNAL => Ok(NodeType::Internal),
            NODE_LEAF => Ok(NodeType::Leaf),
            other => Err(TreeError::CorruptNode(format!("unknown node type tag {other}"))),
        }
    }
}

fn read_u16(page: &[u8], pos: usize) -> TreeResult<u16> {
    page.get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| TreeError::CorruptNode(format!("u16 read at {pos} past end of page")))
}

fn write_u16(page: &mut [u8], pos: usize, value: u16) -> TreeResult<()> {
    let len = page.len();
    let slot = page
        .get_mut(pos..pos + 2)
        .ok_or(TreeError::PageOverflow { used: pos + 2, page_size: len })?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Bytes taken by the header and the pointer/offset arrays of an `nkeys` node.
pub fn arrays_end(nkeys: usize) -> usize {
    HEADER_SIZE + SLOT_SIZE * nkeys
}

/// Read the node type tag.
pub fn node_type(page: &[u8]) -> TreeResult<NodeType> {
    NodeType::try_from(read_u16(page, 0)?)
}

/// Read the number of keys in this node.
pub fn key_count(page: &[u8]) -> TreeResult<u16> {
    read_u16(page, 2)
}

/// Key count, checked against the space the pointer and offset arrays need.
fn checked_nkeys(page: &[u8]) -> TreeResult<usize> {
    let nkeys = key_count(page)? as usize;
    if arrays_end(nkeys) > page.len() {
        return Err(TreeError::CorruptNode(format!(
            "{nkeys} keys do not fit a {} byte page",
            page.len()
        )));
    }
    Ok(nkeys)
}

/// Write both header fields. Must precede any pointer, offset or record write
/// so the bounds checks below see the final key count.
pub fn set_header(page: &mut [u8], node_type: NodeType, nkeys: u16) -> TreeResult<()> {
    let needed = arrays_end(nkeys as usize);
    if needed > page.len() {
        return Err(TreeError::PageOverflow { used: needed, page_size: page.len() });
    }
    write_u16(page, 0, node_type.tag())?;
    write_u16(page, 2, nkeys)
}

fn pointer_pos(page: &[u8], idx: usize) -> TreeResult<usize> {
    let nkeys = checked_nkeys(page)?;
    if idx >= nkeys {
        return Err(TreeError::IndexOutOfRange { index: idx, nkeys });
    }
    Ok(HEADER_SIZE + POINTER_SIZE * idx)
}

/// Child page id stored at `idx`.
pub fn pointer_at(page: &[u8], idx: usize) -> TreeResult<PageId> {
    let pos = pointer_pos(page, idx)?;
    let mut raw = [0u8; POINTER_SIZE];
    raw.copy_from_slice(&page[pos..pos + POINTER_SIZE]);
    Ok(PageId::from_le_bytes(raw))
}

pub fn set_pointer(page: &mut [u8], idx: usize, id: PageId) -> TreeResult<()> {
    let pos = pointer_pos(page, idx)?;
    page[pos..pos + POINTER_SIZE].copy_from_slice(&id.to_le_bytes());
    Ok(())
}

/// Position of the stored offset for `idx`, which must be in `1..=nkeys`.
fn offset_pos(page: &[u8], idx: usize) -> TreeResult<usize> {
    let nkeys = checked_nkeys(page)?;
    if idx == 0 || idx > nkeys {
        return Err(TreeError::IndexOutOfRange { index: idx, nkeys });
    }
    Ok(HEADER_SIZE + POINTER_SIZE * nkeys + OFFSET_SIZE * (idx - 1))
}

/// Start of record `idx` relative to the record region. `idx == nkeys` gives
/// the end of the last record.
pub fn offset_at(page: &[u8], idx: usize) -> TreeResult<u16> {
    if idx == 0 {
        checked_nkeys(page)?;
        return Ok(0);
    }
    let pos = offset_pos(page, idx)?;
    read_u16(page, pos)
}

pub fn set_offset(page: &mut [u8], idx: usize, offset: u16) -> TreeResult<()> {
    let pos = offset_pos(page, idx)?;
    write_u16(page, pos, offset)
}

/// Absolute byte position of record `idx` within the page.
pub fn record_position(page: &[u8], idx: usize) -> TreeResult<usize> {
    let nkeys = checked_nkeys(page)?;
    if idx > nkeys {
        return Err(TreeError::IndexOutOfRange { index: idx, nkeys });
    }
    let pos = arrays_end(nkeys) + offset_at(page, idx)? as usize;
    if pos > page.len() {
        return Err(TreeError::CorruptNode(format!(
            "record {idx} starts at {pos}, past the {} byte page",
            page.len()
        )));
    }
    Ok(pos)
}

/// Locate record `idx`: returns (start of key, key length, value length).
fn record_bounds(page: &[u8], idx: usize) -> TreeResult<(usize, usize, usize)> {
    let nkeys = checked_nkeys(page)?;
    if idx >= nkeys {
        return Err(TreeError::IndexOutOfRange { index: idx, nkeys });
    }
    let pos = record_position(page, idx)?;
    let klen = read_u16(page, pos)? as usize;
    let vlen = read_u16(page, pos + KLEN_SIZE)? as usize;
    let end = pos + RECORD_HEADER_SIZE + klen + vlen;
    let limit = used_bytes(page)? as usize;
    if end > limit {
        return Err(TreeError::CorruptNode(format!(
            "record {idx} ends at {end} but node data ends at {limit}"
        )));
    }
    Ok((pos + RECORD_HEADER_SIZE, klen, vlen))
}

pub fn key_at(page: &[u8], idx: usize) -> TreeResult<&[u8]> {
    let (start, klen, _) = record_bounds(page, idx)?;
    Ok(&page[start..start + klen])
}

pub fn value_at(page: &[u8], idx: usize) -> TreeResult<&[u8]> {
    let (start, klen, vlen) = record_bounds(page, idx)?;
    Ok(&page[start + klen..start + klen + vlen])
}

/// Number of meaningful bytes; everything after is page padding.
pub fn used_bytes(page: &[u8]) -> TreeResult<u16> {
    let nkeys = checked_nkeys(page)?;
    let end = record_position(page, nkeys)?;
    u16::try_from(end).map_err(|_| TreeError::CorruptNode(format!("node size {end} exceeds u16")))
}

/// Write one record at absolute position `pos`; returns the position after it.
pub fn write_record(page: &mut [u8], pos: usize, key: &[u8], value: &[u8]) -> TreeResult<usize> {
    let end = pos + RECORD_HEADER_SIZE + key.len() + value.len();
    if end > page.len() {
        return Err(TreeError::PageOverflow { used: end, page_size: page.len() });
    }
    let klen = u16::try_from(key.len())
        .map_err(|_| TreeError::KeyTooLarge { len: key.len(), max: u16::MAX as usize })?;
    let vlen = u16::try_from(value.len())
        .map_err(|_| TreeError::ValueTooLarge { len: value.len(), max: u16::MAX as usize })?;
    write_u16(page, pos, klen)?;
    write_u16(page, pos + KLEN_SIZE, vlen)?;
    let key_start = pos + RECORD_HEADER_SIZE;
    page[key_start..key_start + key.len()].copy_from_slice(key);
    page[key_start + key.len()..end].copy_from_slice(value);
    Ok(end)
}
