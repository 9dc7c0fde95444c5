//! Helpers shared by the integration tests.

#![allow(dead_code)]

use bptree::{BTree, MemPager, Node, PageId, PageStore, TreeConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn tree_with_page_size(page_size: usize) -> BTree<MemPager> {
    init_logging();
    let config = TreeConfig::with_page_size(page_size).unwrap();
    BTree::create(MemPager::new(page_size), config).unwrap()
}

/// Big-endian so byte order matches numeric order.
pub fn key(i: u32) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

pub fn value(i: u32) -> Vec<u8> {
    format!("value-{}-{}", i, "x".repeat((i % 23) as usize)).into_bytes()
}

pub fn keys_in_order(tree: &BTree<MemPager>) -> Vec<Vec<u8>> {
    tree.scan().map(|r| r.unwrap().0).collect()
}

/// Leaves from left to right.
pub fn leaves(store: &MemPager, root: PageId) -> Vec<Node> {
    let node = store.fetch(root).unwrap();
    if node.is_leaf() {
        return vec![node];
    }
    (0..node.key_count())
        .flat_map(|i| leaves(store, node.pointer_at(i).unwrap()))
        .collect()
}

pub fn reachable_pages(store: &MemPager, root: PageId) -> usize {
    let node = store.fetch(root).unwrap();
    if node.is_leaf() {
        return 1;
    }
    1 + (0..node.key_count())
        .map(|i| reachable_pages(store, node.pointer_at(i).unwrap()))
        .sum::<usize>()
}
