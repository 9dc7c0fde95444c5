use std::fmt;
use std::sync::Arc;

use crate::error::{TreeError, TreeResult};
use crate::storage::page::{self, NodeType};
use crate::storage::pager::PageId;

/// One record staged for a node build. Leaves carry `value`; internal nodes
/// carry `pointer` and an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub pointer: PageId,
}

impl Entry {
    pub fn leaf(key: &[u8], value: &[u8]) -> Self {
        Entry { key: key.to_vec(), value: value.to_vec(), pointer: 0 }
    }

    pub fn child(key: &[u8], pointer: PageId) -> Self {
        Entry { key: key.to_vec(), value: Vec::new(), pointer }
    }
}

/// A complete, validated page. Immutable: there is no way to get a mutable
/// view of the bytes, so a node handed to a page store stays frozen and can
/// be shared by readers of older roots.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Arc<[u8]>,
    kind: NodeType,
    nkeys: usize,
}

impl Node {
    /// Validate raw page bytes: known type tag, arrays in bounds, offsets
    /// non-decreasing and every record contiguous and inside the page.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> TreeResult<Node> {
        let data: Arc<[u8]> = bytes.into();
        let kind = page::node_type(&data)?;
        let nkeys = page::key_count(&data)? as usize;
        page::used_bytes(&data)?;
        for i in 0..nkeys {
            let start = page::record_position(&data, i)?;
            let next = page::record_position(&data, i + 1)?;
            if next < start {
                return Err(TreeError::CorruptNode(format!(
                    "offset {} is below offset {i}",
                    i + 1
                )));
            }
            let key = page::key_at(&data, i)?;
            let value = page::value_at(&data, i)?;
            if start + page::RECORD_HEADER_SIZE + key.len() + value.len() != next {
                return Err(TreeError::CorruptNode(format!(
                    "record {i} does not end where record {} begins",
                    i + 1
                )));
            }
        }
        Ok(Node { data, kind, nkeys })
    }

    pub fn node_type(&self) -> NodeType {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeType::Leaf
    }

    pub fn key_count(&self) -> usize {
        self.nkeys
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn pointer_at(&self, idx: usize) -> TreeResult<PageId> {
        page::pointer_at(&self.data, idx)
    }

    pub fn offset_at(&self, idx: usize) -> TreeResult<u16> {
        page::offset_at(&self.data, idx)
    }

    pub fn record_position(&self, idx: usize) -> TreeResult<usize> {
        page::record_position(&self.data, idx)
    }

    pub fn key_at(&self, idx: usize) -> TreeResult<&[u8]> {
        page::key_at(&self.data, idx)
    }

    pub fn value_at(&self, idx: usize) -> TreeResult<&[u8]> {
        page::value_at(&self.data, idx)
    }

    pub fn used_bytes(&self) -> TreeResult<usize> {
        page::used_bytes(&self.data).map(usize::from)
    }

    /// The verbatim page, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Record `idx` as an owned entry.
    pub fn entry_at(&self, idx: usize) -> TreeResult<Entry> {
        Ok(Entry {
            key: self.key_at(idx)?.to_vec(),
            value: self.value_at(idx)?.to_vec(),
            pointer: self.pointer_at(idx)?,
        })
    }

    pub fn entries(&self) -> TreeResult<Vec<Entry>> {
        (0..self.nkeys).map(|i| self.entry_at(i)).collect()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("nkeys", &self.nkeys)
            .field("used", &page::used_bytes(&self.data).ok())
            .field("page_size", &self.data.len())
            .finish()
    }
}

/// Page-sized scratch buffer a node is written into before it is frozen.
pub struct NodeBuf {
    data: Vec<u8>,
}

impl NodeBuf {
    pub fn new(page_size: usize) -> Self {
        NodeBuf { data: vec![0u8; page_size] }
    }

    pub fn set_header(&mut self, kind: NodeType, nkeys: u16) -> TreeResult<()> {
        page::set_header(&mut self.data, kind, nkeys)
    }

    pub fn set_pointer(&mut self, idx: usize, id: PageId) -> TreeResult<()> {
        page::set_pointer(&mut self.data, idx, id)
    }

    pub fn set_offset(&mut self, idx: usize, offset: u16) -> TreeResult<()> {
        page::set_offset(&mut self.data, idx, offset)
    }

    pub fn write_record(&mut self, pos: usize, key: &[u8], value: &[u8]) -> TreeResult<usize> {
        page::write_record(&mut self.data, pos, key, value)
    }

    /// Consume the buffer; after this the bytes can no longer change.
    pub fn freeze(self) -> TreeResult<Node> {
        Node::from_bytes(self.data)
    }
}
