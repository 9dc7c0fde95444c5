use std::borrow::Cow;

use log::{debug, trace, warn};

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::storage::builder::{build_leaf, build_split, merge_range};
use crate::storage::node::{Entry, Node};
use crate::storage::page::{NodeType, HEADER_SIZE};
use crate::storage::pager::{PageId, PageStore};
use crate::storage::search::{child_index, search};

/// A copy-on-write B+tree over a `PageStore`.
///
/// Leaves hold the key/value records; internal nodes hold one pointer per
/// separator key, where `key[i]` is a lower bound for every key stored under
/// child `i`. Keys below `key[0]` route to child 0 and lower `key[0]` on the
/// way back up. No page is modified after it is allocated: every insert or
/// delete builds a new path from leaf to root, commits the new root, and only
/// then frees the replaced pages.
///
///—————————————————————————————————————————————————————————————————————————————
/// On insert:
///   1. Descend from the root, picking the child with the largest key ≤ target.
///   2. In the leaf, replace the record if the key exists, else add it in order.
///   3. Rebuild the leaf; if it overflows, split it into two or three nodes.
///   4. Each parent swaps its pointer to the old child for pointers to the new
///      node(s) and is rebuilt the same way, possibly splitting too.
///   5. If the root comes back as several nodes, a new internal root is built
///      over them (the only place the tree gets taller).
///
/// On delete:
///   1. Descend as above; a missing key leaves the tree untouched.
///   2. Rebuild the leaf without the record.
///   3. A child left with no keys is dropped from its parent.
///   4. A child left under half a page, or an internal child with a single
///      pointer, is combined with a sibling: merged with the left one if the
///      pair fits a page, else with the right one if that pair fits, else
///      redistributed with the left one into two balanced nodes.
///   5. While the root is internal with a single child, that child becomes
///      the root (the only place the tree gets shorter).
///—————————————————————————————————————————————————————————————————————————————
pub struct BTree<S: PageStore> {
    store: S,
    config: TreeConfig,
    root: PageId,
    // allocated by the running operation, released if it fails
    staged: Vec<PageId>,
}

fn show(key: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key)
}

impl<S: PageStore> BTree<S> {
    /// Start a new tree: an empty leaf becomes the committed root.
    pub fn create(mut store: S, config: TreeConfig) -> TreeResult<Self> {
        config.validate()?;
        let leaf = build_leaf(&config, &[])?;
        let root = store.allocate(leaf)?;
        store.commit_root(root)?;
        debug!("create() → empty leaf root at page {}", root);
        Ok(BTree { store, config, root, staged: Vec::new() })
    }

    /// Adopt the store's committed root, or create a tree if there is none.
    pub fn open(store: S, config: TreeConfig) -> TreeResult<Self> {
        config.validate()?;
        let Some(root) = store.root() else {
            return Self::create(store, config);
        };
        let node = store.fetch(root)?;
        if node.page_size() != config.page_size {
            return Err(TreeError::Config(format!(
                "root page {} is {} bytes, configured page size is {}",
                root,
                node.page_size(),
                config.page_size
            )));
        }
        debug!("open() → existing root at page {}", root);
        Ok(BTree { store, config, root, staged: Vec::new() })
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn get(&self, key: &[u8]) -> TreeResult<Option<Vec<u8>>> {
        lookup(&self.store, self.root, key)
    }

    /// Number of levels; a lone leaf root is height 1.
    pub fn height(&self) -> TreeResult<usize> {
        let mut node = self.store.fetch(self.root)?;
        let mut height = 1;
        while !node.is_leaf() {
            node = self.store.fetch(node.pointer_at(0)?)?;
            height += 1;
        }
        Ok(height)
    }

    pub fn is_empty(&self) -> TreeResult<bool> {
        let root = self.store.fetch(self.root)?;
        Ok(root.is_leaf() && root.key_count() == 0)
    }

    /// Every record in key order.
    pub fn scan(&self) -> Cursor<'_, S> {
        Cursor::new(&self.store, self.root)
    }

    /// Records with `start <= key < end`; `end = None` runs to the last key.
    pub fn range(&self, start: &[u8], end: Option<&[u8]>) -> Cursor<'_, S> {
        Cursor::seek(&self.store, self.root, start, end)
    }

    /// Insert or replace. Returns the previous value for an existing key.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> TreeResult<Option<Vec<u8>>> {
        if key.len() > self.config.max_key_size {
            return Err(TreeError::KeyTooLarge { len: key.len(), max: self.config.max_key_size });
        }
        if value.len() > self.config.max_value_size {
            return Err(TreeError::ValueTooLarge {
                len: value.len(),
                max: self.config.max_value_size,
            });
        }
        debug!("insert() → starting at root {} for key={}", self.root, show(key));
        let result = self.insert_path(key, value);
        if result.is_err() {
            self.discard_staged();
        }
        result
    }

    fn insert_path(&mut self, key: &[u8], value: &[u8]) -> TreeResult<Option<Vec<u8>>> {
        let mut freed = Vec::new();
        let root = self.store.fetch(self.root)?;
        let (mut nodes, previous) = self.insert_into(root, key, value, &mut freed)?;
        freed.push(self.root);

        while nodes.len() > 1 {
            debug!("  → root split into {} nodes, adding a level", nodes.len());
            let first = nodes[0].key_at(0)?.to_vec();
            let children = self.allocate_children(nodes, &first)?;
            nodes = build_split(&self.config, NodeType::Internal, children)?;
        }
        let new_root = match nodes.pop() {
            Some(node) => self.stage(node)?,
            None => return Err(TreeError::CorruptNode("insert produced no root".into())),
        };
        self.commit(new_root, freed)?;
        Ok(previous)
    }

    /// Remove `key`. Returns `false`, touching nothing, when it is absent.
    pub fn delete(&mut self, key: &[u8]) -> TreeResult<bool> {
        debug!("delete() → starting at root {} for key={}", self.root, show(key));
        let result = self.delete_path(key);
        if result.is_err() {
            self.discard_staged();
        }
        result
    }

    fn delete_path(&mut self, key: &[u8]) -> TreeResult<bool> {
        let mut freed = Vec::new();
        let root = self.store.fetch(self.root)?;
        let Some(mut nodes) = self.delete_from(root, key, &mut freed)? else {
            debug!("  → key={} not found", show(key));
            return Ok(false);
        };
        freed.push(self.root);

        // A rebalance can promote a longer separator and overflow the root.
        while nodes.len() > 1 {
            let first = nodes[0].key_at(0)?.to_vec();
            let children = self.allocate_children(nodes, &first)?;
            nodes = build_split(&self.config, NodeType::Internal, children)?;
        }
        let Some(mut root) = nodes.pop() else {
            return Err(TreeError::CorruptNode("delete produced no root".into()));
        };
        if !root.is_leaf() && root.key_count() == 0 {
            debug!("  → every child emptied, root becomes an empty leaf");
            root = build_leaf(&self.config, &[])?;
        }

        let mut adopted = None;
        while !root.is_leaf() && root.key_count() == 1 {
            let child = root.pointer_at(0)?;
            debug!("  → root has a single child {}, removing a level", child);
            if let Some(collapsed) = adopted {
                freed.push(collapsed);
            }
            root = self.store.fetch(child)?;
            adopted = Some(child);
        }
        let new_root = match adopted {
            Some(id) => id,
            None => self.stage(root)?,
        };
        self.commit(new_root, freed)?;
        Ok(true)
    }

    /// Publish `root`, then release the pages it no longer reaches.
    fn commit(&mut self, root: PageId, freed: Vec<PageId>) -> TreeResult<()> {
        self.store.commit_root(root)?;
        self.staged.clear();
        debug!("  → committed root {} ({} pages released)", root, freed.len());
        self.root = root;
        for id in freed {
            self.store.free(id)?;
        }
        Ok(())
    }

    fn stage(&mut self, node: Node) -> TreeResult<PageId> {
        let id = self.store.allocate(node)?;
        self.staged.push(id);
        Ok(id)
    }

    /// Release the pages of an operation that never committed.
    fn discard_staged(&mut self) {
        for id in std::mem::take(&mut self.staged) {
            if let Err(e) = self.store.free(id) {
                warn!("failed to release staged page {}: {}", id, e);
            }
        }
    }

    /// Allocate replacement children and pair each with its separator. The
    /// first keeps `first_separator`; the rest are keyed by their first key.
    fn allocate_children(&mut self, nodes: Vec<Node>, first_separator: &[u8]) -> TreeResult<Vec<Entry>> {
        let mut entries = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.into_iter().enumerate() {
            let key = if i == 0 {
                first_separator.to_vec()
            } else {
                node.key_at(0)?.to_vec()
            };
            let id = self.stage(node)?;
            entries.push(Entry::child(&key, id));
        }
        Ok(entries)
    }

    fn fetch_child(&self, node: &Node, idx: usize) -> TreeResult<(PageId, Node)> {
        let id = node.pointer_at(idx)?;
        let child = self.store.fetch(id).inspect_err(|e| {
            warn!("failed to load child {} of internal node: {}", id, e);
        })?;
        if child.page_size() != self.config.page_size {
            return Err(TreeError::CorruptNode(format!(
                "page {} is {} bytes, expected {}",
                id,
                child.page_size(),
                self.config.page_size
            )));
        }
        Ok((id, child))
    }

    /// Recursive helper: returns the node(s) replacing `node` and the value
    /// the key previously had.
    fn insert_into(
        &mut self,
        node: Node,
        key: &[u8],
        value: &[u8],
        freed: &mut Vec<PageId>,
    ) -> TreeResult<(Vec<Node>, Option<Vec<u8>>)> {
        let n = node.key_count();
        let mut entries = Vec::with_capacity(n + 2);

        if node.is_leaf() {
            let previous = match search(&node, key)? {
                Ok(i) => {
                    trace!("  → replacing key at slot {} of leaf", i);
                    let old = node.value_at(i)?.to_vec();
                    merge_range(&mut entries, &node, 0, i)?;
                    entries.push(Entry::leaf(key, value));
                    merge_range(&mut entries, &node, i + 1, n)?;
                    Some(old)
                }
                Err(i) => {
                    trace!("  → inserting key at slot {} of leaf", i);
                    merge_range(&mut entries, &node, 0, i)?;
                    entries.push(Entry::leaf(key, value));
                    merge_range(&mut entries, &node, i, n)?;
                    None
                }
            };
            let nodes = build_split(&self.config, NodeType::Leaf, entries)?;
            return Ok((nodes, previous));
        }

        let idx = child_index(&node, key)?;
        let (child_id, child) = self.fetch_child(&node, idx)?;
        trace!("  → descending into child {} (slot {})", child_id, idx);
        let (children, previous) = self.insert_into(child, key, value, freed)?;
        freed.push(child_id);

        let old = node.key_at(idx)?;
        let separator = if key < old { key.to_vec() } else { old.to_vec() };
        merge_range(&mut entries, &node, 0, idx)?;
        entries.extend(self.allocate_children(children, &separator)?);
        merge_range(&mut entries, &node, idx + 1, n)?;
        let nodes = build_split(&self.config, NodeType::Internal, entries)?;
        Ok((nodes, previous))
    }

    /// Recursive helper: `None` when the key is absent, else the node(s)
    /// replacing `node`. An internal node whose children all emptied comes
    /// back with no keys and is dropped by its parent.
    fn delete_from(&mut self, node: Node, key: &[u8], freed: &mut Vec<PageId>) -> TreeResult<Option<Vec<Node>>> {
        let n = node.key_count();
        let mut entries = Vec::with_capacity(n + 1);

        if node.is_leaf() {
            let Ok(i) = search(&node, key)? else {
                return Ok(None);
            };
            trace!("  → removing slot {} of leaf", i);
            merge_range(&mut entries, &node, 0, i)?;
            merge_range(&mut entries, &node, i + 1, n)?;
            return Ok(Some(vec![build_leaf(&self.config, &entries)?]));
        }

        let idx = child_index(&node, key)?;
        let (child_id, child) = self.fetch_child(&node, idx)?;
        let Some(mut updated) = self.delete_from(child, key, freed)? else {
            return Ok(None);
        };
        freed.push(child_id);

        let single = updated.len() == 1;
        if single && updated[0].key_count() == 0 {
            debug!("  → dropping emptied child {} (slot {})", child_id, idx);
            merge_range(&mut entries, &node, 0, idx)?;
            merge_range(&mut entries, &node, idx + 1, n)?;
            // the new first child inherits the old lower bound
            if idx == 0 {
                if let Some(first) = entries.first_mut() {
                    first.key = node.key_at(0)?.to_vec();
                }
            }
        } else if n > 1 && single && self.is_underfull(&updated[0])? {
            let part = updated.swap_remove(0);
            let (sibling_idx, sibling_id, sibling) = self.merge_partner(&node, idx, &part)?;
            freed.push(sibling_id);

            let kind = part.node_type();
            if sibling.node_type() != kind {
                return Err(TreeError::CorruptNode(format!(
                    "sibling {} is {:?} but its neighbour is {:?}",
                    sibling_id,
                    sibling.node_type(),
                    kind
                )));
            }
            let lo = idx.min(sibling_idx);
            let (left, right) = if sibling_idx < idx { (&sibling, &part) } else { (&part, &sibling) };
            let mut combined = Vec::with_capacity(left.key_count() + right.key_count());
            merge_range(&mut combined, left, 0, left.key_count())?;
            merge_range(&mut combined, right, 0, right.key_count())?;
            let merged = build_split(&self.config, kind, combined)?;
            if merged.len() == 1 {
                debug!("  → merged child {} with sibling {}", child_id, sibling_id);
            } else {
                debug!("  → rebalanced child {} with sibling {}", child_id, sibling_id);
            }

            let separator = node.key_at(lo)?.to_vec();
            merge_range(&mut entries, &node, 0, lo)?;
            entries.extend(self.allocate_children(merged, &separator)?);
            merge_range(&mut entries, &node, lo + 2, n)?;
        } else {
            let separator = node.key_at(idx)?.to_vec();
            merge_range(&mut entries, &node, 0, idx)?;
            entries.extend(self.allocate_children(updated, &separator)?);
            merge_range(&mut entries, &node, idx + 1, n)?;
        }

        let nodes = build_split(&self.config, NodeType::Internal, entries)?;
        Ok(Some(nodes))
    }

    /// Under half a page, or an internal node routing to a single child. The
    /// latter has no sibling of its own to merge with, so its parent merges it.
    fn is_underfull(&self, node: &Node) -> TreeResult<bool> {
        if !node.is_leaf() && node.key_count() == 1 {
            return Ok(true);
        }
        Ok(node.used_bytes()? < self.config.min_fill())
    }

    /// Sibling of child `idx` to combine `part` with: the left one, unless
    /// only the right one forms a single page with it.
    fn merge_partner(&self, node: &Node, idx: usize, part: &Node) -> TreeResult<(usize, PageId, Node)> {
        if idx == 0 {
            let (id, right) = self.fetch_child(node, 1)?;
            return Ok((1, id, right));
        }
        let (left_id, left) = self.fetch_child(node, idx - 1)?;
        if idx + 1 < node.key_count() && !self.fits_together(&left, part)? {
            let (right_id, right) = self.fetch_child(node, idx + 1)?;
            if self.fits_together(part, &right)? {
                return Ok((idx + 1, right_id, right));
            }
        }
        Ok((idx - 1, left_id, left))
    }

    fn fits_together(&self, a: &Node, b: &Node) -> TreeResult<bool> {
        Ok(a.used_bytes()? + b.used_bytes()? - HEADER_SIZE <= self.config.page_size)
    }

    /// Walk the whole tree and verify its structural invariants: keys strictly
    /// ascending, separators bounding their subtrees, no empty node below the
    /// root, every leaf at the same depth. Returns the height.
    pub fn check(&self) -> TreeResult<usize> {
        let mut leaf_depth = None;
        self.check_node(self.root, None, None, 1, &mut leaf_depth)?;
        Ok(leaf_depth.unwrap_or(1))
    }

    fn check_node(
        &self,
        id: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> TreeResult<()> {
        let node = self.store.fetch(id)?;
        let corrupt = |msg: String| TreeError::CorruptNode(format!("page {id}: {msg}"));
        if node.used_bytes()? > self.config.page_size {
            return Err(corrupt("node larger than a page".into()));
        }

        let n = node.key_count();
        let mut prev: Option<&[u8]> = None;
        for i in 0..n {
            let key = node.key_at(i)?;
            if prev.is_some_and(|p| p >= key) {
                return Err(corrupt(format!("key {i} is not above its predecessor")));
            }
            // separators may outlive the keys they were copied from, so only
            // stored records are held to the parent's bounds
            if node.is_leaf() {
                if lower.is_some_and(|lo| key < lo) {
                    return Err(corrupt(format!("key {i} below the parent's separator")));
                }
                if upper.is_some_and(|hi| key >= hi) {
                    return Err(corrupt(format!("key {i} not below the next separator")));
                }
            }
            prev = Some(key);
        }

        if node.is_leaf() {
            if n == 0 && depth > 1 {
                return Err(corrupt("empty leaf below the root".into()));
            }
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(corrupt(format!("leaf at depth {depth}, expected {d}")));
                }
                Some(_) => {}
            }
            return Ok(());
        }

        if n == 0 {
            return Err(corrupt("internal node without children".into()));
        }
        for i in 0..n {
            // a record must satisfy every separator on its path
            let sep = node.key_at(i)?;
            let child_lower = Some(lower.map_or(sep, |lo| lo.max(sep)));
            let child_upper = if i + 1 < n {
                let next = node.key_at(i + 1)?;
                Some(upper.map_or(next, |hi| hi.min(next)))
            } else {
                upper
            };
            self.check_node(node.pointer_at(i)?, child_lower, child_upper, depth + 1, leaf_depth)?;
        }
        Ok(())
    }
}

/// Point lookup from an explicit root. Readers holding an older committed
/// root keep seeing that version as long as its pages are not reclaimed.
pub fn lookup<S: PageStore + ?Sized>(store: &S, root: PageId, key: &[u8]) -> TreeResult<Option<Vec<u8>>> {
    let mut node = store.fetch(root)?;
    while !node.is_leaf() {
        let idx = child_index(&node, key)?;
        node = store.fetch(node.pointer_at(idx)?)?;
    }
    match search(&node, key)? {
        Ok(i) => Ok(Some(node.value_at(i)?.to_vec())),
        Err(_) => Ok(None),
    }
}

/// In-order cursor over the records below a root, driven by an explicit
/// stack of (node, next slot). Yields an error at most once, then stops.
pub struct Cursor<'a, S: PageStore + ?Sized> {
    store: &'a S,
    stack: Vec<(Node, usize)>,
    end: Option<Vec<u8>>,
    pending: Option<TreeError>,
}

impl<'a, S: PageStore + ?Sized> Cursor<'a, S> {
    /// Cursor over every record reachable from `root`.
    pub fn new(store: &'a S, root: PageId) -> Self {
        match store.fetch(root) {
            Ok(node) => Cursor { store, stack: vec![(node, 0)], end: None, pending: None },
            Err(e) => Cursor { store, stack: Vec::new(), end: None, pending: Some(e) },
        }
    }

    /// Cursor positioned at the first key `>= start`, stopping before `end`.
    pub fn seek(store: &'a S, root: PageId, start: &[u8], end: Option<&[u8]>) -> Self {
        let mut cursor = Cursor {
            store,
            stack: Vec::new(),
            end: end.map(<[u8]>::to_vec),
            pending: None,
        };
        if let Err(e) = cursor.descend(root, start) {
            cursor.stack.clear();
            cursor.pending = Some(e);
        }
        cursor
    }

    fn descend(&mut self, root: PageId, start: &[u8]) -> TreeResult<()> {
        let mut node = self.store.fetch(root)?;
        while !node.is_leaf() {
            let idx = child_index(&node, start)?;
            let child = self.store.fetch(node.pointer_at(idx)?)?;
            self.stack.push((node, idx + 1));
            node = child;
        }
        let slot = match search(&node, start)? {
            Ok(i) | Err(i) => i,
        };
        self.stack.push((node, slot));
        Ok(())
    }

    fn advance(&mut self) -> TreeResult<Option<(Vec<u8>, Vec<u8>)>> {
        while let Some((node, slot)) = self.stack.last_mut() {
            if *slot >= node.key_count() {
                self.stack.pop();
                continue;
            }
            let idx = *slot;
            *slot += 1;
            if node.is_leaf() {
                let key = node.key_at(idx)?;
                if self.end.as_deref().is_some_and(|end| key >= end) {
                    self.stack.clear();
                    return Ok(None);
                }
                return Ok(Some((key.to_vec(), node.value_at(idx)?.to_vec())));
            }
            let child = self.store.fetch(node.pointer_at(idx)?)?;
            self.stack.push((child, 0));
        }
        Ok(None)
    }
}

impl<S: PageStore + ?Sized> Iterator for Cursor<'_, S> {
    type Item = TreeResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        match self.advance() {
            Ok(item) => item.map(Ok),
            Err(e) => {
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pager::MemPager;

    /// Store whose root swaps can be switched off.
    struct CommitGate {
        pages: MemPager,
        closed: bool,
    }

    impl PageStore for CommitGate {
        fn fetch(&self, id: PageId) -> TreeResult<Node> {
            self.pages.fetch(id)
        }

        fn allocate(&mut self, node: Node) -> TreeResult<PageId> {
            self.pages.allocate(node)
        }

        fn free(&mut self, id: PageId) -> TreeResult<()> {
            self.pages.free(id)
        }

        fn commit_root(&mut self, id: PageId) -> TreeResult<()> {
            if self.closed {
                return Err(TreeError::CorruptNode(format!("commit of root {id} refused")));
            }
            self.pages.commit_root(id)
        }

        fn root(&self) -> Option<PageId> {
            self.pages.root()
        }
    }

    fn small_tree() -> BTree<MemPager> {
        let config = TreeConfig::with_page_size(200).unwrap();
        BTree::create(MemPager::new(200), config).unwrap()
    }

    #[test]
    fn empty_tree_is_a_single_leaf() {
        let tree = small_tree();
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.height().unwrap(), 1);
        assert_eq!(tree.get(b"a").unwrap(), None);
        assert_eq!(tree.scan().count(), 0);
    }

    #[test]
    fn insert_replaces_existing_values() {
        let mut tree = small_tree();
        assert_eq!(tree.insert(b"k", b"one").unwrap(), None);
        assert_eq!(tree.insert(b"k", b"two").unwrap(), Some(b"one".to_vec()));
        assert_eq!(tree.get(b"k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(tree.scan().count(), 1);
    }

    #[test]
    fn oversized_records_are_rejected_up_front() {
        let mut tree = small_tree();
        let root = tree.root();
        assert_eq!(
            tree.insert(&[0; 46], b"v"),
            Err(TreeError::KeyTooLarge { len: 46, max: 45 })
        );
        assert_eq!(
            tree.insert(b"k", &[0; 138]),
            Err(TreeError::ValueTooLarge { len: 138, max: 137 })
        );
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn keys_below_the_first_separator_route_left() {
        let mut tree = small_tree();
        for i in 10..60u8 {
            tree.insert(&[i], b"xxxxxxxx").unwrap();
        }
        assert!(tree.height().unwrap() > 1);
        tree.insert(&[1], b"low").unwrap();
        assert_eq!(tree.get(&[1]).unwrap(), Some(b"low".to_vec()));
        assert_eq!(tree.check().unwrap(), tree.height().unwrap());
        assert_eq!(tree.scan().next().unwrap().unwrap().0, vec![1]);
    }

    #[test]
    fn missing_delete_touches_nothing() {
        let mut tree = small_tree();
        tree.insert(b"a", b"1").unwrap();
        let root = tree.root();
        let pages = tree.store().page_count();
        assert!(!tree.delete(b"b").unwrap());
        assert_eq!(tree.root(), root);
        assert_eq!(tree.store().page_count(), pages);
    }

    #[test]
    fn open_adopts_the_committed_root() {
        let mut tree = small_tree();
        tree.insert(b"a", b"1").unwrap();
        let config = *tree.config();
        let store = tree.into_store();
        let reopened = BTree::open(store, config).unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), Some(b"1".to_vec()));

        let wrong = TreeConfig::default();
        assert!(matches!(BTree::open(reopened.into_store(), wrong), Err(TreeError::Config(_))));
    }

    #[test]
    fn failed_operations_release_their_pages() {
        let config = TreeConfig::with_page_size(200).unwrap();
        let store = CommitGate { pages: MemPager::new(200), closed: false };
        let mut tree = BTree::create(store, config).unwrap();
        for i in 10..60u8 {
            tree.insert(&[i], b"xxxxxxxx").unwrap();
        }
        assert!(tree.height().unwrap() > 1);
        tree.store.pages.reclaim();
        let root = tree.root();
        let pages = tree.store.pages.page_count();

        tree.store.closed = true;
        assert!(tree.insert(&[5], b"new").is_err());
        assert!(tree.delete(&[30]).unwrap_err().to_string().contains("refused"));
        assert_eq!(tree.root(), root);
        assert!(tree.staged.is_empty());
        // only pages written by the failed operations are pending
        assert!(!tree.store.pages.pending_free().is_empty());
        tree.store.pages.reclaim();
        assert_eq!(tree.store.pages.page_count(), pages);

        tree.store.closed = false;
        assert_eq!(tree.get(&[30]).unwrap(), Some(b"xxxxxxxx".to_vec()));
        assert!(tree.delete(&[30]).unwrap());
        assert_eq!(tree.check().unwrap(), tree.height().unwrap());
    }

    #[test]
    fn emptied_children_are_dropped() {
        let mut tree = small_tree();
        for i in 0..60u8 {
            tree.insert(&[i], b"xxxxxxxx").unwrap();
        }
        for i in 0..60u8 {
            assert!(tree.delete(&[i]).unwrap());
            // check() rejects empty leaves below the root
            assert_eq!(tree.check().unwrap(), tree.height().unwrap());
        }
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.height().unwrap(), 1);
    }
}
