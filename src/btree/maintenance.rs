//! Sibling selection and borrow/merge folding shared by the delete paths
//! (spec §4.3.2 steps 3-4, §4.3.3 sibling selection, §9 underflow handling).
//!
//! An internal node resolves an underflowing child immediately, using that
//! child's sibling (which it holds directly), rather than bubbling a
//! separate `BorrowedFromSibling`/`MergedWithSibling` result up through an
//! extra level of indirection — the parent already *is* the only place with
//! access to both the child and its sibling, so the fix is applied exactly
//! once, at the point it is detected, and the result folds back into a
//! plain `Removed` (see DESIGN.md).

use std::sync::Arc;

use crate::btree::page::{InternalNode, Node};

/// Minimum fill for any non-root page (spec §3: "between ⌈pageSize/2⌉ and
/// pageSize keys").
pub fn min_fill(page_size: usize) -> usize {
    page_size.div_ceil(2)
}

/// Picks the sibling to borrow from or merge with when the child at `idx`
/// underflows: the larger of the two neighbors, preferring the left one on
/// a tie (spec §4.3.3 "Sibling selection").
///
/// Returns `(sibling_idx, sibling_is_to_the_right)`.
pub fn choose_sibling<K, V>(children: &[Arc<Node<K, V>>], idx: usize) -> (usize, bool) {
    let has_left = idx > 0;
    let has_right = idx + 1 < children.len();
    match (has_left, has_right) {
        (false, false) => panic!("a single-child node should never underflow-check its only child"),
        (true, false) => (idx - 1, false),
        (false, true) => (idx + 1, true),
        (true, true) => {
            let left_len = children[idx - 1].nb_elems();
            let right_len = children[idx + 1].nb_elems();
            if right_len > left_len {
                (idx + 1, true)
            } else {
                (idx - 1, false)
            }
        }
    }
}

/// Resolves an underflowing child at `idx` (already missing its deleted
/// element) against its sibling, producing `node`'s own updated state. If
/// the child did not underflow, this is just a plain child replacement.
pub fn fold_child_removed<K, V>(
    node: &InternalNode<K, V>,
    idx: usize,
    new_child: Arc<Node<K, V>>,
    revision: u64,
    page_size: usize,
) -> InternalNode<K, V>
where
    K: Clone,
    V: Clone,
{
    if node.children.len() == 1 || new_child.nb_elems() >= min_fill(page_size) {
        let mut children = node.children.clone();
        children[idx] = new_child;
        return InternalNode {
            revision,
            keys: node.keys.clone(),
            children,
        };
    }

    let (sibling_idx, from_right) = choose_sibling(&node.children, idx);
    let sibling = node.children[sibling_idx].clone();
    let sep_idx = if from_right { idx } else { idx - 1 };
    let separator = node.keys[sep_idx].clone();

    if sibling.nb_elems() > min_fill(page_size) {
        let (new_target, new_sibling, new_sep) = borrow_across(&new_child, &sibling, separator, revision, from_right);
        let mut children = node.children.clone();
        let mut keys = node.keys.clone();
        children[idx] = new_target;
        children[sibling_idx] = new_sibling;
        keys[sep_idx] = new_sep;
        InternalNode { revision, keys, children }
    } else {
        let merged = merge_across(&new_child, &sibling, separator, revision, from_right);
        let mut children = node.children.clone();
        let mut keys = node.keys.clone();
        keys.remove(sep_idx);
        if from_right {
            children[idx] = merged;
            children.remove(sibling_idx);
        } else {
            children[sibling_idx] = merged;
            children.remove(idx);
        }
        InternalNode { revision, keys, children }
    }
}

fn borrow_across<K, V>(
    target: &Arc<Node<K, V>>,
    sibling: &Arc<Node<K, V>>,
    separator: K,
    revision: u64,
    from_right: bool,
) -> (Arc<Node<K, V>>, Arc<Node<K, V>>, K)
where
    K: Clone,
    V: Clone,
{
    match (&**target, &**sibling) {
        (Node::Leaf(t), Node::Leaf(s)) => {
            let (new_target, new_sibling) =
                crate::btree::leaf::borrow(t.keys.clone(), t.values.clone(), s, revision, from_right);
            let new_sep = if from_right {
                new_sibling.leftmost_key().unwrap().clone()
            } else {
                new_target.leftmost_key().unwrap().clone()
            };
            (new_target, new_sibling, new_sep)
        }
        (Node::Internal(t), Node::Internal(s)) => crate::btree::internal::borrow(t, s, separator, revision, from_right),
        _ => unreachable!("siblings at the same tree level always share a kind"),
    }
}

fn merge_across<K, V>(
    target: &Arc<Node<K, V>>,
    sibling: &Arc<Node<K, V>>,
    separator: K,
    revision: u64,
    from_right: bool,
) -> Arc<Node<K, V>>
where
    K: Clone,
    V: Clone,
{
    match (&**target, &**sibling) {
        (Node::Leaf(t), Node::Leaf(s)) => {
            crate::btree::leaf::merge(t.keys.clone(), t.values.clone(), s, revision, from_right)
        }
        (Node::Internal(t), Node::Internal(s)) => crate::btree::internal::merge(t, s, separator, revision, from_right),
        _ => unreachable!("siblings at the same tree level always share a kind"),
    }
}

/// If `root` collapsed to a single child after a merge at the top level,
/// unwraps it — spec §4.3.3: "If self is root and has zero keys, the merged
/// child becomes the new root."
pub fn collapse_root<K, V>(root: Arc<Node<K, V>>) -> Arc<Node<K, V>> {
    match &*root {
        Node::Internal(n) if n.keys.is_empty() && n.children.len() == 1 => n.children[0].clone(),
        _ => root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::page::LeafNode as L;

    fn leaf(keys: Vec<i32>) -> Arc<Node<i32, i32>> {
        let values = keys.clone();
        Arc::new(Node::Leaf(L { revision: 0, keys, values }))
    }

    #[test]
    fn choose_sibling_prefers_left_on_tie() {
        let children = vec![leaf(vec![1, 2]), leaf(vec![3, 4]), leaf(vec![5, 6])];
        assert_eq!(choose_sibling(&children, 1), (0, false));
    }

    #[test]
    fn choose_sibling_picks_larger_right_neighbor() {
        let children = vec![leaf(vec![1, 2]), leaf(vec![3, 4]), leaf(vec![5, 6, 7])];
        assert_eq!(choose_sibling(&children, 1), (2, true));
    }

    #[test]
    fn choose_sibling_at_edges_has_only_one_option() {
        let children = vec![leaf(vec![1, 2]), leaf(vec![3, 4])];
        assert_eq!(choose_sibling(&children, 0), (1, true));
        assert_eq!(choose_sibling(&children, 1), (0, false));
    }

    #[test]
    fn collapse_root_unwraps_single_remaining_child() {
        let child = leaf(vec![1, 2]);
        let root: Arc<Node<i32, i32>> = Arc::new(Node::Internal(InternalNode {
            revision: 1,
            keys: vec![],
            children: vec![child.clone()],
        }));
        let collapsed = collapse_root(root);
        assert!(Arc::ptr_eq(&collapsed, &child));
    }
}
