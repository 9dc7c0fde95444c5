use log::debug;

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::storage::node::{Entry, Node, NodeBuf};
use crate::storage::page::{self, NodeType, HEADER_SIZE, RECORD_HEADER_SIZE, SLOT_SIZE};
use crate::storage::pager::PageId;

/// Encoded cost of one entry: its pointer slot, offset slot and record.
pub fn entry_size(entry: &Entry) -> usize {
    SLOT_SIZE + RECORD_HEADER_SIZE + entry.key.len() + entry.value.len()
}

/// Exact `used_bytes` of a node built from `entries`.
pub fn node_size(entries: &[Entry]) -> usize {
    HEADER_SIZE + entries.iter().map(entry_size).sum::<usize>()
}

/// Encode `entries` into a fresh page. Fails with `PageOverflow` before
/// writing anything when the result would not fit.
pub fn build(config: &TreeConfig, kind: NodeType, entries: &[Entry]) -> TreeResult<Node> {
    let used = node_size(entries);
    if used > config.page_size {
        return Err(TreeError::PageOverflow { used, page_size: config.page_size });
    }
    let nkeys = u16::try_from(entries.len())
        .map_err(|_| TreeError::PageOverflow { used, page_size: config.page_size })?;

    let mut buf = NodeBuf::new(config.page_size);
    buf.set_header(kind, nkeys)?;
    let base = page::arrays_end(entries.len());
    let mut pos = base;
    for (i, entry) in entries.iter().enumerate() {
        buf.set_pointer(i, entry.pointer)?;
        pos = buf.write_record(pos, &entry.key, &entry.value)?;
        let offset = u16::try_from(pos - base).map_err(|_| {
            TreeError::Config(format!("page size {} exceeds the u16 offset range", config.page_size))
        })?;
        buf.set_offset(i + 1, offset)?;
    }
    buf.freeze()
}

pub fn build_leaf(config: &TreeConfig, entries: &[Entry]) -> TreeResult<Node> {
    build(config, NodeType::Leaf, entries)
}

/// Internal node routing `keys[i]` and up to `keys[i + 1]` to `pointers[i]`.
pub fn build_internal(config: &TreeConfig, pointers: &[PageId], keys: &[Vec<u8>]) -> TreeResult<Node> {
    if pointers.len() != keys.len() {
        return Err(TreeError::CorruptNode(format!(
            "{} pointers for {} keys",
            pointers.len(),
            keys.len()
        )));
    }
    let entries: Vec<Entry> = keys
        .iter()
        .zip(pointers)
        .map(|(key, &pointer)| Entry::child(key, pointer))
        .collect();
    build(config, NodeType::Internal, &entries)
}

/// Append copies of entries `[lo, hi)` of `src` to `dest`.
pub fn merge_range(dest: &mut Vec<Entry>, src: &Node, lo: usize, hi: usize) -> TreeResult<()> {
    let nkeys = src.key_count();
    if hi > nkeys {
        return Err(TreeError::IndexOutOfRange { index: hi, nkeys });
    }
    if lo > hi {
        return Err(TreeError::IndexOutOfRange { index: lo, nkeys: hi });
    }
    dest.reserve(hi - lo);
    for i in lo..hi {
        dest.push(src.entry_at(i)?);
    }
    Ok(())
}

/// Number of entries for the left half of a two-way split. Starts balanced,
/// shrinks until the left half fits, then grows while the right half still
/// overflows and the left half has room.
fn split_point(entries: &[Entry], page_size: usize) -> usize {
    let n = entries.len();
    let mut nleft = n / 2;
    while nleft > 1 && node_size(&entries[..nleft]) > page_size {
        nleft -= 1;
    }
    while nleft + 1 < n
        && node_size(&entries[nleft..]) > page_size
        && node_size(&entries[..nleft + 1]) <= page_size
    {
        nleft += 1;
    }
    nleft
}

/// Partition `entries` into ordered, contiguous, non-empty groups that each
/// fit in a page. Concatenating the groups gives back the input.
pub fn split_entries(config: &TreeConfig, entries: Vec<Entry>) -> Vec<Vec<Entry>> {
    let mut groups = Vec::new();
    let mut rest = entries;
    while rest.len() > 1 && node_size(&rest) > config.page_size {
        let nleft = split_point(&rest, config.page_size);
        let right = rest.split_off(nleft);
        groups.push(rest);
        rest = right;
    }
    groups.push(rest);
    groups
}

/// Build one node from `entries`, or several when they overflow a page.
pub fn build_split(config: &TreeConfig, kind: NodeType, entries: Vec<Entry>) -> TreeResult<Vec<Node>> {
    match build(config, kind, &entries) {
        Ok(node) => Ok(vec![node]),
        Err(TreeError::PageOverflow { used, .. }) => {
            let count = entries.len();
            let groups = split_entries(config, entries);
            debug!(
                "split {:?} node of {} entries ({} bytes) into {} nodes",
                kind,
                count,
                used,
                groups.len()
            );
            groups.iter().map(|group| build(config, kind, group)).collect()
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TreeConfig {
        TreeConfig::with_page_size(200).unwrap()
    }

    fn leaf_entries(n: u8) -> Vec<Entry> {
        (0..n).map(|i| Entry::leaf(&[b'a' + i], &[i; 3])).collect()
    }

    #[test]
    fn built_leaf_decodes_to_its_entries() {
        let entries = leaf_entries(5);
        let node = build_leaf(&config(), &entries).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.key_count(), 5);
        assert_eq!(node.used_bytes().unwrap(), node_size(&entries));
        assert_eq!(node.entries().unwrap(), entries);
        assert_eq!(node.as_bytes().len(), 200);
        // leaves keep a zero-filled pointer region
        assert!(node.as_bytes()[HEADER_SIZE..HEADER_SIZE + 40].iter().all(|&b| b == 0));
    }

    #[test]
    fn rebuilding_decoded_entries_is_byte_identical() {
        let node = build_leaf(&config(), &leaf_entries(7)).unwrap();
        let again = build_leaf(&config(), &node.entries().unwrap()).unwrap();
        assert_eq!(node.as_bytes(), again.as_bytes());

        let keys = vec![b"a".to_vec(), b"m".to_vec(), b"t".to_vec()];
        let internal = build_internal(&config(), &[3, 9, 27], &keys).unwrap();
        assert_eq!(internal.pointer_at(2).unwrap(), 27);
        assert_eq!(internal.key_at(1).unwrap(), b"m");
        assert_eq!(internal.value_at(1).unwrap(), b"");
        let again = build(&config(), NodeType::Internal, &internal.entries().unwrap()).unwrap();
        assert_eq!(internal.as_bytes(), again.as_bytes());
    }

    #[test]
    fn overflow_is_reported_not_truncated() {
        let big = vec![Entry::leaf(&[1; 45], &[2; 137]), Entry::leaf(&[3], &[4])];
        let err = build_leaf(&config(), &big).unwrap_err();
        assert!(matches!(err, TreeError::PageOverflow { page_size: 200, .. }));
    }

    #[test]
    fn internal_build_requires_matching_arity() {
        let err = build_internal(&config(), &[1, 2], &[b"a".to_vec()]).unwrap_err();
        assert!(matches!(err, TreeError::CorruptNode(_)));
    }

    #[test]
    fn merge_range_copies_a_slice() {
        let node = build_leaf(&config(), &leaf_entries(6)).unwrap();
        let mut staged = vec![Entry::leaf(b"0", b"zero")];
        merge_range(&mut staged, &node, 2, 5).unwrap();
        assert_eq!(staged.len(), 4);
        assert_eq!(staged[1].key, b"c");
        assert_eq!(staged[3].key, b"e");
        assert!(merge_range(&mut staged, &node, 4, 7).is_err());
        assert!(merge_range(&mut staged, &node, 5, 4).is_err());
    }

    #[test]
    fn split_groups_fit_and_preserve_order() {
        let entries: Vec<Entry> = (0..40u8).map(|i| Entry::leaf(&[i], &[i; 9])).collect();
        let groups = split_entries(&config(), entries.clone());
        assert!(groups.len() >= 2);
        for group in &groups {
            assert!(!group.is_empty());
            assert!(node_size(group) <= 200);
        }
        let flat: Vec<Entry> = groups.into_iter().flatten().collect();
        assert_eq!(flat, entries);
    }

    #[test]
    fn one_huge_record_forces_a_three_way_split() {
        let entries = vec![
            Entry::leaf(b"a", &[0; 80]),
            Entry::leaf(b"b", &[0; 137]),
            Entry::leaf(b"c", &[0; 80]),
        ];
        let nodes = build_split(&config(), NodeType::Leaf, entries).unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| n.used_bytes().unwrap() <= 200));
    }

    #[test]
    fn near_full_leaf_plus_one_record_splits_in_two() {
        // 13 records of 15 bytes: 4 + 195 = page_size - 1
        let mut entries: Vec<Entry> = (0..13u8).map(|i| Entry::leaf(&[b'a' + i], b"")).collect();
        assert_eq!(build_leaf(&config(), &entries).unwrap().used_bytes().unwrap(), 199);
        entries.push(Entry::leaf(b"zz", b"!"));
        let nodes = build_split(&config(), NodeType::Leaf, entries).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.used_bytes().unwrap() <= 200));
    }
}
