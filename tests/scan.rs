mod common;

use bptree::{lookup, BTree, Cursor, MemPager, PageStore, TreeError};
use common::*;

fn even_keys(n: u32) -> BTree<MemPager> {
    let mut tree = tree_with_page_size(200);
    for i in (0..n).map(|i| i * 2) {
        tree.insert(&key(i), &value(i)).unwrap();
    }
    tree
}

fn range_keys(tree: &BTree<MemPager>, start: u32, end: Option<u32>) -> Vec<u32> {
    let end = end.map(key);
    tree.range(&key(start), end.as_deref())
        .map(|r| {
            let (k, _) = r.unwrap();
            u32::from_be_bytes(k.try_into().unwrap())
        })
        .collect()
}

#[test]
fn scan_visits_every_record_in_order() {
    let tree = even_keys(300);
    assert!(tree.height().unwrap() > 1);
    let scanned: Vec<(Vec<u8>, Vec<u8>)> = tree.scan().map(|r| r.unwrap()).collect();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = (0..300).map(|i| (key(i * 2), value(i * 2))).collect();
    assert_eq!(scanned, expected);
}

#[test]
fn range_is_half_open() {
    let tree = even_keys(300);
    assert_eq!(range_keys(&tree, 10, Some(20)), vec![10, 12, 14, 16, 18]);
    assert_eq!(range_keys(&tree, 11, Some(21)), vec![12, 14, 16, 18, 20]);
    assert_eq!(range_keys(&tree, 590, None), vec![590, 592, 594, 596, 598]);
    assert_eq!(range_keys(&tree, 0, Some(5)), vec![0, 2, 4]);
}

#[test]
fn empty_ranges_yield_nothing() {
    let tree = even_keys(300);
    assert!(range_keys(&tree, 600, None).is_empty());
    assert!(range_keys(&tree, 40, Some(40)).is_empty());
    assert!(range_keys(&tree, 50, Some(30)).is_empty());
    assert!(range_keys(&tree, 41, Some(42)).is_empty());
}

#[test]
fn range_crosses_leaf_boundaries() {
    let tree = even_keys(300);
    let got = range_keys(&tree, 101, Some(401));
    let expected: Vec<u32> = (51..=200).map(|i| i * 2).collect();
    assert_eq!(got, expected);
    assert!(leaves(tree.store(), tree.root()).len() > 10);
}

#[test]
fn old_roots_keep_their_snapshot_until_reclaimed() {
    let mut tree = even_keys(100);
    let old_root = tree.root();

    for i in 0..50 {
        tree.delete(&key(i * 2)).unwrap();
    }
    tree.insert(&key(1), b"new").unwrap();

    assert_eq!(tree.get(&key(0)).unwrap(), None);
    assert_eq!(lookup(tree.store(), old_root, &key(0)).unwrap(), Some(value(0)));
    assert_eq!(lookup(tree.store(), old_root, &key(1)).unwrap(), None);
    assert_eq!(Cursor::new(tree.store(), old_root).count(), 100);
    assert_eq!(tree.scan().count(), 51);

    let config = *tree.config();
    let mut store = tree.into_store();
    assert!(store.pending_free().contains(&old_root));
    store.reclaim();
    assert_eq!(lookup(&store, old_root, &key(0)), Err(TreeError::PageNotFound(old_root)));

    let tree = BTree::open(store, config).unwrap();
    assert_eq!(tree.get(&key(1)).unwrap(), Some(b"new".to_vec()));
    assert_eq!(tree.check().unwrap(), tree.height().unwrap());
}

#[test]
fn cursor_reports_a_missing_root_once() {
    let tree = even_keys(10);
    let mut cursor = Cursor::new(tree.store(), 999);
    assert_eq!(cursor.next(), Some(Err(TreeError::PageNotFound(999))));
    assert_eq!(cursor.next(), None);

    let mut seek = Cursor::seek(tree.store(), 999, b"", None);
    assert!(matches!(seek.next(), Some(Err(TreeError::PageNotFound(999)))));
    assert!(seek.next().is_none());
    assert!(tree.store().fetch(999).is_err());
}
