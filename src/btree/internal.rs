//! Copy-on-write insert/delete for internal pages (spec §4.3.3).

use std::sync::Arc;

use crate::btree::comparator::Comparator;
use crate::btree::page::{search_slice, DeleteResult, InsertResult, InternalNode, Node, SearchResult};

/// Index of the child that owns `key`: duplicate keys are not permitted, so
/// a match in an internal node means the value belongs in the right child.
fn child_index<K, V, C: Comparator<K>>(node: &InternalNode<K, V>, key: &K, comparator: &C) -> usize {
    match search_slice(&node.keys, key, comparator) {
        SearchResult::Found(i) => i + 1,
        SearchResult::NotFound(i) => i,
    }
}

/// Inserts `(key, value)` at `revision`, recursing into the owning child.
pub fn insert<K, V, C>(
    node: &InternalNode<K, V>,
    revision: u64,
    key: K,
    value: V,
    comparator: &C,
    page_size: usize,
) -> InsertResult<K, V>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    let idx = child_index(node, &key, comparator);
    let child_result = match &*node.children[idx] {
        Node::Leaf(l) => crate::btree::leaf::insert(l, revision, key, value, comparator, page_size),
        Node::Internal(n) => insert(n, revision, key, value, comparator, page_size),
    };
    match child_result {
        InsertResult::Modified { new_page, old_value } => {
            let mut children = node.children.clone();
            children[idx] = new_page;
            InsertResult::Modified {
                new_page: Arc::new(Node::Internal(InternalNode {
                    revision,
                    keys: node.keys.clone(),
                    children,
                })),
                old_value,
            }
        }
        InsertResult::Split { pivot, left, right } => {
            if node.keys.len() < page_size {
                let mut keys = Vec::with_capacity(node.keys.len() + 1);
                keys.extend_from_slice(&node.keys[..idx]);
                keys.push(pivot);
                keys.extend_from_slice(&node.keys[idx..]);
                let mut children = Vec::with_capacity(node.children.len() + 1);
                children.extend_from_slice(&node.children[..idx]);
                children.push(left);
                children.push(right);
                children.extend_from_slice(&node.children[idx + 1..]);
                InsertResult::Modified {
                    new_page: Arc::new(Node::Internal(InternalNode { revision, keys, children })),
                    old_value: None,
                }
            } else {
                split_with_promoted_child(node, revision, idx, pivot, left, right, page_size)
            }
        }
    }
}

/// Splits a full internal node after logically inserting `pivot`/`left`/
/// `right` at `idx`: builds the combined (N+1 key, N+2 child) array and cuts
/// it at its midpoint, which reproduces each of spec §4.3.3's three cases
/// (`pos < m`, `pos == m`, `pos > m`) uniformly.
fn split_with_promoted_child<K, V>(
    node: &InternalNode<K, V>,
    revision: u64,
    idx: usize,
    pivot: K,
    left_child: Arc<Node<K, V>>,
    right_child: Arc<Node<K, V>>,
    page_size: usize,
) -> InsertResult<K, V>
where
    K: Clone,
    V: Clone,
{
    let mut combined_keys = Vec::with_capacity(node.keys.len() + 1);
    combined_keys.extend_from_slice(&node.keys[..idx]);
    combined_keys.push(pivot);
    combined_keys.extend_from_slice(&node.keys[idx..]);

    let mut combined_children = Vec::with_capacity(node.children.len() + 1);
    combined_children.extend_from_slice(&node.children[..idx]);
    combined_children.push(left_child);
    combined_children.push(right_child);
    combined_children.extend_from_slice(&node.children[idx + 1..]);

    let m = page_size / 2;
    let new_pivot = combined_keys[m].clone();
    let left_keys = combined_keys[..m].to_vec();
    let right_keys = combined_keys[m + 1..].to_vec();
    let left_children = combined_children[..=m].to_vec();
    let right_children = combined_children[m + 1..].to_vec();

    InsertResult::Split {
        pivot: new_pivot,
        left: Arc::new(Node::Internal(InternalNode {
            revision,
            keys: left_keys,
            children: left_children,
        })),
        right: Arc::new(Node::Internal(InternalNode {
            revision,
            keys: right_keys,
            children: right_children,
        })),
    }
}

/// Recurses a delete into the owning child and folds the child's result
/// into a new version of `node` (spec §4.3.3). If the child underflows,
/// `crate::btree::maintenance::fold_child_removed` resolves it immediately
/// against a sibling of `node`, so the result reaching our own caller is
/// always a plain `Removed` — the caller applies the same fold for `node`
/// itself if `node` in turn underflows (root is exempt; see `BTree::delete`).
pub fn delete<K, V, C>(
    node: &InternalNode<K, V>,
    revision: u64,
    key: &K,
    comparator: &C,
    page_size: usize,
) -> DeleteResult<K, V>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    let idx = child_index(node, key, comparator);
    let child_result = match &*node.children[idx] {
        Node::Leaf(l) => crate::btree::leaf::delete(l, revision, key, comparator),
        Node::Internal(n) => delete(n, revision, key, comparator, page_size),
    };
    match child_result {
        DeleteResult::NotPresent => DeleteResult::NotPresent,
        DeleteResult::Removed {
            new_page,
            removed,
            new_leftmost,
        } => {
            let mut fixed = crate::btree::maintenance::fold_child_removed(node, idx, new_page, revision, page_size);
            if let Some(leftmost) = new_leftmost {
                if idx > 0 && idx - 1 < fixed.keys.len() {
                    fixed.keys[idx - 1] = leftmost;
                }
            }
            DeleteResult::Removed {
                new_page: Arc::new(Node::Internal(fixed)),
                removed,
                new_leftmost: None,
            }
        }
        DeleteResult::BorrowedFromSibling { .. } | DeleteResult::MergedWithSibling { .. } => {
            unreachable!("leaf/internal delete never emits these; underflow is resolved by the parent")
        }
    }
}

/// Moves one child across the separator between `target` and `sibling`
/// (spec §4.3.3 borrow). Returns `(new_target, new_sibling, new_separator)`.
pub fn borrow<K, V>(
    target: &InternalNode<K, V>,
    sibling: &InternalNode<K, V>,
    separator: K,
    revision: u64,
    from_right: bool,
) -> (Arc<Node<K, V>>, Arc<Node<K, V>>, K)
where
    K: Clone,
    V: Clone,
{
    let mut target_keys = target.keys.clone();
    let mut target_children = target.children.clone();
    let mut sib_keys = sibling.keys.clone();
    let mut sib_children = sibling.children.clone();
    let new_sep;
    if from_right {
        target_keys.push(separator);
        target_children.push(sib_children.remove(0));
        new_sep = sib_keys.remove(0);
    } else {
        target_keys.insert(0, separator);
        target_children.insert(0, sib_children.pop().expect("sibling has at least min_fill+1 children"));
        new_sep = sib_keys.pop().expect("sibling has at least min_fill+1 keys");
    }
    (
        Arc::new(Node::Internal(InternalNode {
            revision,
            keys: target_keys,
            children: target_children,
        })),
        Arc::new(Node::Internal(InternalNode {
            revision,
            keys: sib_keys,
            children: sib_children,
        })),
        new_sep,
    )
}

/// Merges `target` and `sibling` through `separator` into one node (spec
/// §4.3.3 merge). `target_is_left` tells which side `target` was on.
pub fn merge<K, V>(
    target: &InternalNode<K, V>,
    sibling: &InternalNode<K, V>,
    separator: K,
    revision: u64,
    target_is_left: bool,
) -> Arc<Node<K, V>>
where
    K: Clone,
    V: Clone,
{
    let (keys, children) = if target_is_left {
        let mut keys = target.keys.clone();
        keys.push(separator);
        keys.extend(sibling.keys.iter().cloned());
        let mut children = target.children.clone();
        children.extend(sibling.children.iter().cloned());
        (keys, children)
    } else {
        let mut keys = sibling.keys.clone();
        keys.push(separator);
        keys.extend(target.keys.iter().cloned());
        let mut children = sibling.children.clone();
        children.extend(target.children.iter().cloned());
        (keys, children)
    };
    Arc::new(Node::Internal(InternalNode { revision, keys, children }))
}
