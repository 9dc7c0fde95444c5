use crate::error::{TreeError, TreeResult};
use crate::storage::page::{HEADER_SIZE, OFFSET_SIZE, POINTER_SIZE, RECORD_HEADER_SIZE, SLOT_SIZE};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_MAX_KEY_SIZE: usize = 1000;
pub const DEFAULT_MAX_VALUE_SIZE: usize = 3000;

/// Fixed cost of a node holding a single record: header, one pointer, one
/// offset and the record's two length prefixes.
pub const SINGLE_ENTRY_OVERHEAD: usize = HEADER_SIZE + POINTER_SIZE + OFFSET_SIZE + RECORD_HEADER_SIZE;

const _: () = assert!(
    SINGLE_ENTRY_OVERHEAD + DEFAULT_MAX_KEY_SIZE + DEFAULT_MAX_VALUE_SIZE <= DEFAULT_PAGE_SIZE
);

/// Page geometry shared by every node of a tree.
///
/// The key and value limits are chosen so that a node holding one record of
/// maximum size still fits in a page; that is what bounds a split to at most
/// three nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    pub page_size: usize,
    pub max_key_size: usize,
    pub max_value_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            page_size: DEFAULT_PAGE_SIZE,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl TreeConfig {
    pub fn new(page_size: usize, max_key_size: usize, max_value_size: usize) -> TreeResult<Self> {
        let config = TreeConfig { page_size, max_key_size, max_value_size };
        config.validate()?;
        Ok(config)
    }

    /// Derive limits for `page_size`: a quarter of the record budget goes to
    /// keys, the rest to values.
    pub fn with_page_size(page_size: usize) -> TreeResult<Self> {
        let budget = page_size.saturating_sub(SINGLE_ENTRY_OVERHEAD);
        let max_key_size = budget / 4;
        Self::new(page_size, max_key_size, budget - max_key_size)
    }

    pub fn validate(&self) -> TreeResult<()> {
        if self.page_size > u16::MAX as usize {
            return Err(TreeError::Config(format!(
                "page size {} exceeds the u16 offset range",
                self.page_size
            )));
        }
        if self.max_key_size == 0 {
            return Err(TreeError::Config("max key size must be at least 1".into()));
        }
        let single = SINGLE_ENTRY_OVERHEAD + self.max_key_size + self.max_value_size;
        if single > self.page_size {
            return Err(TreeError::Config(format!(
                "a node with one maximum-size record needs {single} bytes, page size is {}",
                self.page_size
            )));
        }
        // otherwise a root split can never be folded back into one node
        let internal_pair = HEADER_SIZE + 2 * (SLOT_SIZE + RECORD_HEADER_SIZE + self.max_key_size);
        if internal_pair > self.page_size {
            return Err(TreeError::Config(format!(
                "an internal node with two maximum-size keys needs {internal_pair} bytes, page size is {}",
                self.page_size
            )));
        }
        Ok(())
    }

    /// Nodes below this many used bytes are underfull.
    pub fn min_fill(&self) -> usize {
        self.page_size / 2
    }
}
