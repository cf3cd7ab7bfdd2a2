//! Copy-on-write insert/delete for leaf pages (spec §4.3.2).

use std::sync::Arc;

use crate::btree::comparator::Comparator;
use crate::btree::page::{search_slice, DeleteResult, InsertResult, LeafNode, Node, SearchResult};

/// Inserts `(key, value)` at `revision` into `leaf`, splitting at
/// `page_size` elements.
pub fn insert<K, V, C>(
    leaf: &LeafNode<K, V>,
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
    match search_slice(&leaf.keys, &key, comparator) {
        SearchResult::Found(i) => {
            let mut keys = leaf.keys.clone();
            let mut values = leaf.values.clone();
            let old = std::mem::replace(&mut values[i], value);
            keys[i] = key;
            InsertResult::Modified {
                new_page: Arc::new(Node::Leaf(LeafNode { revision, keys, values })),
                old_value: Some(old),
            }
        }
        SearchResult::NotFound(i) if leaf.keys.len() < page_size => {
            let mut keys = Vec::with_capacity(leaf.keys.len() + 1);
            let mut values = Vec::with_capacity(leaf.values.len() + 1);
            keys.extend_from_slice(&leaf.keys[..i]);
            keys.push(key);
            keys.extend_from_slice(&leaf.keys[i..]);
            values.extend_from_slice(&leaf.values[..i]);
            values.push(value);
            values.extend_from_slice(&leaf.values[i..]);
            InsertResult::Modified {
                new_page: Arc::new(Node::Leaf(LeafNode { revision, keys, values })),
                old_value: None,
            }
        }
        SearchResult::NotFound(i) => split_insert(leaf, revision, i, key, value, page_size),
    }
}

fn split_insert<K, V>(
    leaf: &LeafNode<K, V>,
    revision: u64,
    i: usize,
    key: K,
    value: V,
    page_size: usize,
) -> InsertResult<K, V>
where
    K: Clone,
    V: Clone,
{
    let m = page_size / 2;
    let (mut left_keys, mut left_values, mut right_keys, mut right_values);
    if i <= m {
        left_keys = Vec::with_capacity(m + 1);
        left_values = Vec::with_capacity(m + 1);
        left_keys.extend_from_slice(&leaf.keys[..i]);
        left_keys.push(key);
        left_keys.extend_from_slice(&leaf.keys[i..m]);
        left_values.extend_from_slice(&leaf.values[..i]);
        left_values.push(value);
        left_values.extend_from_slice(&leaf.values[i..m]);
        right_keys = leaf.keys[m..].to_vec();
        right_values = leaf.values[m..].to_vec();
    } else {
        left_keys = leaf.keys[..m].to_vec();
        left_values = leaf.values[..m].to_vec();
        let local = i - m;
        right_keys = Vec::with_capacity(page_size - m + 1);
        right_values = Vec::with_capacity(page_size - m + 1);
        right_keys.extend_from_slice(&leaf.keys[m..i]);
        right_keys.push(key);
        right_keys.extend_from_slice(&leaf.keys[i..]);
        right_values.extend_from_slice(&leaf.values[m..i]);
        right_values.push(value);
        right_values.extend_from_slice(&leaf.values[i..]);
    }
    let pivot = right_keys[0].clone();
    InsertResult::Split {
        pivot,
        left: Arc::new(Node::Leaf(LeafNode {
            revision,
            keys: left_keys,
            values: left_values,
        })),
        right: Arc::new(Node::Leaf(LeafNode {
            revision,
            keys: right_keys,
            values: right_values,
        })),
    }
}

/// Deletes `key` at `revision` from `leaf`. Does not perform borrow/merge —
/// that is decided by the caller once it knows whether `leaf` is the root
/// (spec §4.3.2 steps 3-4, implemented in `crate::btree::maintenance`).
pub fn delete<K, V, C>(leaf: &LeafNode<K, V>, revision: u64, key: &K, comparator: &C) -> DeleteResult<K, V>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    match search_slice(&leaf.keys, key, comparator) {
        SearchResult::NotFound(_) => DeleteResult::NotPresent,
        SearchResult::Found(i) => {
            let removed = (leaf.keys[i].clone(), leaf.values[i].clone());
            let mut keys = leaf.keys.clone();
            let mut values = leaf.values.clone();
            keys.remove(i);
            values.remove(i);
            let new_leftmost = if i == 0 { keys.first().cloned() } else { None };
            DeleteResult::Removed {
                new_page: Arc::new(Node::Leaf(LeafNode { revision, keys, values })),
                removed,
                new_leftmost,
            }
        }
    }
}

/// Borrows one element from `sibling` (the larger neighbor) into a copy of
/// `self_leaf` that already had `removed_index` removed.
pub fn borrow<K, V>(
    self_after_removal_keys: Vec<K>,
    self_after_removal_values: Vec<V>,
    sibling: &LeafNode<K, V>,
    revision: u64,
    from_right: bool,
) -> (Arc<Node<K, V>>, Arc<Node<K, V>>)
where
    K: Clone,
    V: Clone,
{
    let mut self_keys = self_after_removal_keys;
    let mut self_values = self_after_removal_values;
    let mut sib_keys = sibling.keys.clone();
    let mut sib_values = sibling.values.clone();
    if from_right {
        self_keys.push(sib_keys.remove(0));
        self_values.push(sib_values.remove(0));
    } else {
        let k = sib_keys.pop().unwrap();
        let v = sib_values.pop().unwrap();
        self_keys.insert(0, k);
        self_values.insert(0, v);
    }
    (
        Arc::new(Node::Leaf(LeafNode {
            revision,
            keys: self_keys,
            values: self_values,
        })),
        Arc::new(Node::Leaf(LeafNode {
            revision,
            keys: sib_keys,
            values: sib_values,
        })),
    )
}

/// Merges `self` (already missing `removed_index`) with `sibling`,
/// preserving key order (`self` first if it is the left sibling).
pub fn merge<K, V>(
    self_after_removal_keys: Vec<K>,
    self_after_removal_values: Vec<V>,
    sibling: &LeafNode<K, V>,
    revision: u64,
    self_is_left: bool,
) -> Arc<Node<K, V>>
where
    K: Clone,
    V: Clone,
{
    let mut keys;
    let mut values;
    if self_is_left {
        keys = self_after_removal_keys;
        values = self_after_removal_values;
        keys.extend(sibling.keys.iter().cloned());
        values.extend(sibling.values.iter().cloned());
    } else {
        keys = sibling.keys.clone();
        values = sibling.values.clone();
        keys.extend(self_after_removal_keys);
        values.extend(self_after_removal_values);
    }
    Arc::new(Node::Leaf(LeafNode { revision, keys, values }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::comparator::NaturalOrder;

    fn leaf(keys: Vec<i32>, values: Vec<i32>) -> LeafNode<i32, i32> {
        LeafNode {
            revision: 0,
            keys,
            values,
        }
    }

    #[test]
    fn insert_into_non_full_leaf_shifts_elements() {
        let l = leaf(vec![1, 3], vec![10, 30]);
        let cmp = NaturalOrder::<i32>::new();
        match insert(&l, 1, 2, 20, &cmp, 4) {
            InsertResult::Modified { new_page, old_value } => {
                assert_eq!(old_value, None);
                assert_eq!(new_page.keys(), &[1, 2, 3]);
            }
            _ => panic!("expected Modified"),
        }
    }

    #[test]
    fn insert_existing_key_overwrites_value() {
        let l = leaf(vec![1, 2, 3], vec![10, 20, 30]);
        let cmp = NaturalOrder::<i32>::new();
        match insert(&l, 1, 2, 99, &cmp, 4) {
            InsertResult::Modified { new_page, old_value } => {
                assert_eq!(old_value, Some(20));
                if let Node::Leaf(l) = &*new_page {
                    assert_eq!(l.values, vec![10, 99, 30]);
                } else {
                    panic!();
                }
            }
            _ => panic!("expected Modified"),
        }
    }

    #[test]
    fn insert_into_full_leaf_splits_with_pivot_at_median() {
        let l = leaf(vec![1, 2, 3, 4], vec![1, 2, 3, 4]);
        let cmp = NaturalOrder::<i32>::new();
        match insert(&l, 1, 5, 5, &cmp, 4) {
            InsertResult::Split { pivot, left, right } => {
                assert_eq!(pivot, 3);
                assert_eq!(left.keys(), &[1, 2]);
                assert_eq!(right.keys(), &[3, 4, 5]);
            }
            _ => panic!("expected Split"),
        }
    }

    #[test]
    fn split_inserting_below_median_grows_left_half() {
        let l = leaf(vec![3, 4, 5, 6], vec![3, 4, 5, 6]);
        let cmp = NaturalOrder::<i32>::new();
        match insert(&l, 1, 2, 2, &cmp, 4) {
            InsertResult::Split { pivot, left, right } => {
                assert_eq!(left.keys(), &[2, 3]);
                assert_eq!(right.keys(), &[4, 5, 6]);
                assert_eq!(pivot, 4);
            }
            _ => panic!("expected Split"),
        }
    }

    #[test]
    fn delete_absent_key_is_not_present() {
        let l = leaf(vec![1, 2], vec![1, 2]);
        let cmp = NaturalOrder::<i32>::new();
        assert!(matches!(delete(&l, 1, &9, &cmp), DeleteResult::NotPresent));
    }

    #[test]
    fn delete_present_key_removes_and_reports_new_leftmost() {
        let l = leaf(vec![1, 2, 3], vec![1, 2, 3]);
        let cmp = NaturalOrder::<i32>::new();
        match delete(&l, 1, &1, &cmp) {
            DeleteResult::Removed {
                new_page,
                removed,
                new_leftmost,
            } => {
                assert_eq!(removed, (1, 1));
                assert_eq!(new_page.keys(), &[2, 3]);
                assert_eq!(new_leftmost, Some(2));
            }
            _ => panic!("expected Removed"),
        }
    }
}
