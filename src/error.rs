use thiserror::Error;

use crate::storage::pager::PageId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("index {index} out of range for node with {nkeys} keys")]
    IndexOutOfRange { index: usize, nkeys: usize },
    #[error("corrupt node: {0}")]
    CorruptNode(String),
    #[error("node needs {used} bytes but a page holds {page_size}")]
    PageOverflow { used: usize, page_size: usize },
    #[error("page {0} not found")]
    PageNotFound(PageId),
    #[error("key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLarge { len: usize, max: usize },
    #[error("value of {len} bytes exceeds the {max} byte limit")]
    ValueTooLarge { len: usize, max: usize },
    #[error("invalid tree configuration: {0}")]
    Config(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
