use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::error::{TreeError, TreeResult};
use crate::storage::node::Node;

pub type PageId = u64;

/// Page storage the tree runs on.
///
/// Pages are immutable once allocated. `commit_root` must swap the root in a
/// single step so readers never see a half-applied operation, and `free` is
/// only called for pages unreachable from the committed root.
pub trait PageStore {
    /// Fetch a node by id, failing with `PageNotFound` for unknown ids.
    fn fetch(&self, id: PageId) -> TreeResult<Node>;

    /// Stage a new page and return its id.
    fn allocate(&mut self, node: Node) -> TreeResult<PageId>;

    /// Mark a page eligible for reclamation.
    fn free(&mut self, id: PageId) -> TreeResult<()>;

    /// Publish `id` as the tree's root.
    fn commit_root(&mut self, id: PageId) -> TreeResult<()>;

    /// The last committed root, if any.
    fn root(&self) -> Option<PageId>;
}

/// In-memory page store. Page ids start at 1 and are never reused.
///
/// Freed pages remain readable until `reclaim` is called, so a reader that
/// still holds an older root keeps a consistent view.
pub struct MemPager {
    page_size: usize,
    pages: HashMap<PageId, Node>,
    next_id: PageId,
    root: Option<PageId>,
    pending_free: BTreeSet<PageId>,
}

impl MemPager {
    pub fn new(page_size: usize) -> Self {
        MemPager {
            page_size,
            pages: HashMap::new(),
            next_id: 1,
            root: None,
            pending_free: BTreeSet::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages currently held, freed-but-unreclaimed ones included.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Pages freed since the last `reclaim`.
    pub fn pending_free(&self) -> Vec<PageId> {
        self.pending_free.iter().copied().collect()
    }

    /// Drop every freed page. Returns how many were released.
    pub fn reclaim(&mut self) -> usize {
        let freed = std::mem::take(&mut self.pending_free);
        for id in &freed {
            self.pages.remove(id);
        }
        trace!("reclaimed {} pages", freed.len());
        freed.len()
    }
}

impl PageStore for MemPager {
    fn fetch(&self, id: PageId) -> TreeResult<Node> {
        self.pages.get(&id).cloned().ok_or(TreeError::PageNotFound(id))
    }

    fn allocate(&mut self, node: Node) -> TreeResult<PageId> {
        if node.page_size() != self.page_size {
            return Err(TreeError::CorruptNode(format!(
                "node of {} bytes offered to a store of {} byte pages",
                node.page_size(),
                self.page_size
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        trace!("allocate page {} ({:?})", id, node);
        self.pages.insert(id, node);
        Ok(id)
    }

    fn free(&mut self, id: PageId) -> TreeResult<()> {
        if !self.pages.contains_key(&id) {
            return Err(TreeError::PageNotFound(id));
        }
        trace!("free page {}", id);
        self.pending_free.insert(id);
        Ok(())
    }

    fn commit_root(&mut self, id: PageId) -> TreeResult<()> {
        if !self.pages.contains_key(&id) {
            return Err(TreeError::PageNotFound(id));
        }
        self.root = Some(id);
        Ok(())
    }

    fn root(&self) -> Option<PageId> {
        self.root
    }
}
