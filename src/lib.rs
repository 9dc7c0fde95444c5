//! Node-level engine of a copy-on-write, disk-oriented B+tree.
//!
//! Nodes are page-sized byte buffers with a fixed little-endian layout (see
//! [`storage::page`]) that can be persisted verbatim. Tree operations never
//! modify a page in place; they build replacement nodes and hand them to a
//! [`PageStore`].

pub mod config;
pub mod error;
pub mod storage;

pub use config::TreeConfig;
pub use error::{TreeError, TreeResult};
pub use storage::btree::{BTree, Cursor, lookup};
pub use storage::node::{Entry, Node};
pub use storage::page::NodeType;
pub use storage::pager::{MemPager, PageId, PageStore};
