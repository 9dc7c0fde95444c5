use std::cmp::Ordering;

use crate::error::TreeResult;
use crate::storage::node::Node;

/// Binary search over the node's keys in raw byte order.
///
/// `Ok(i)` when key `i` equals `key`, otherwise `Err(i)` with `i` the first
/// index whose key is greater than `key` (where it would be inserted).
pub fn search(node: &Node, key: &[u8]) -> TreeResult<Result<usize, usize>> {
    let mut lo = 0;
    let mut hi = node.key_count();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match node.key_at(mid)?.cmp(key) {
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
            Ordering::Equal => return Ok(Ok(mid)),
        }
    }
    Ok(Err(lo))
}

/// Child of an internal node whose subtree may hold `key`: the largest key
/// not greater than `key`, or the first child when `key` sorts before all.
pub fn child_index(node: &Node, key: &[u8]) -> TreeResult<usize> {
    Ok(match search(node, key)? {
        Ok(i) => i,
        Err(0) => 0,
        Err(i) => i - 1,
    })
}
