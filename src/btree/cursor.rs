//! Bidirectional, stack-of-frames cursor over a pinned snapshot (spec §4.5).
//!
//! Grounded in the general shape of the teacher's range `Cursor` in
//! `storage/btree/cursor.rs` (a struct borrowing a transaction, lazily
//! seeded, `next() -> Result<Option<_>>`), reimplemented here for
//! `prev`/`nextKey`/`prevKey` and an explicit stack of `(page, pos)` frames
//! rather than a single forward-only range bound, since spec §4.5 requires
//! walking back up past page boundaries in both directions.

use std::sync::Arc;

use crate::btree::comparator::Comparator;
use crate::btree::page::{search_slice, InternalNode, LeafNode, Node, SearchResult};
use crate::btree::transaction::Transaction;
use crate::error::{Result, StrataError};

/// Sentinel position before the first element of a page.
pub const BEFORE_FIRST: i64 = -1;

struct Frame<K, V> {
    page: Arc<Node<K, V>>,
    /// For a leaf frame: index into `keys`/`values`, or `BEFORE_FIRST`/`N`.
    /// For an internal frame: index of the child currently descended into.
    pos: i64,
}

impl<K, V> Clone for Frame<K, V> {
    fn clone(&self) -> Self {
        Self { page: self.page.clone(), pos: self.pos }
    }
}

/// A read cursor over one pinned transaction's snapshot.
pub struct Cursor<K, V, C> {
    tx: Arc<Transaction<K, V>>,
    comparator: C,
    stack: Vec<Frame<K, V>>,
}

impl<K, V, C> Cursor<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K> + Clone,
{
    /// Seeds a cursor positioned at `BEFORE_FIRST`, i.e. the first `next()`
    /// call returns the smallest key in the tree.
    pub(crate) fn at_before_first(tx: Arc<Transaction<K, V>>, comparator: C) -> Self {
        let stack = descend_leftmost(tx.root().clone());
        Self { tx, comparator, stack }
    }

    /// Seeds a cursor positioned at `AFTER_LAST`, i.e. the first `prev()`
    /// call returns the largest key in the tree.
    pub(crate) fn at_after_last(tx: Arc<Transaction<K, V>>, comparator: C) -> Self {
        let stack = descend_rightmost(tx.root().clone());
        Self { tx, comparator, stack }
    }

    /// Seeds a cursor so the first `next()` returns `key` if present, else
    /// the smallest key greater than `key`.
    pub(crate) fn seeked(tx: Arc<Transaction<K, V>>, key: &K, comparator: C) -> Self {
        let mut stack = Vec::new();
        let mut page = tx.root().clone();
        loop {
            let next_child = match &*page {
                Node::Internal(n) => {
                    let idx = child_descend_index(n, key, &comparator);
                    stack.push(Frame { page: page.clone(), pos: idx as i64 });
                    Some(n.children[idx].clone())
                }
                Node::Leaf(l) => {
                    let pos = search_slice(&l.keys, key, &comparator).index() as i64 - 1;
                    stack.push(Frame { page: page.clone(), pos });
                    None
                }
            };
            match next_child {
                Some(child) => page = child,
                None => break,
            }
        }
        Self { tx, comparator, stack }
    }

    fn check_open(&self) -> Result<()> {
        if self.tx.is_closed() {
            return Err(StrataError::TransactionClosed);
        }
        Ok(())
    }

    /// Advances and returns the next `(key, value)` in ascending order, or
    /// `None` once the traversal is exhausted (spec §4.5 `next()`).
    pub fn next(&mut self) -> Result<Option<(K, V)>> {
        self.check_open()?;
        loop {
            let frame = self.stack.last_mut().expect("cursor stack always has a leaf frame");
            let leaf = leaf_of(&frame.page);
            let nb = leaf.keys.len() as i64;
            if frame.pos >= nb {
                return Ok(None);
            }
            let candidate = if frame.pos < 0 { 0 } else { frame.pos + 1 };
            if candidate < nb {
                frame.pos = candidate;
                let leaf = leaf_of(&self.stack.last().unwrap().page);
                let i = candidate as usize;
                return Ok(Some((leaf.keys[i].clone(), leaf.values[i].clone())));
            }
            frame.pos = nb;
            if !self.advance_to_sibling_leaf(true) {
                return Ok(None);
            }
        }
    }

    /// Mirror of [`Cursor::next`] walking in descending order.
    pub fn prev(&mut self) -> Result<Option<(K, V)>> {
        self.check_open()?;
        loop {
            let frame = self.stack.last_mut().expect("cursor stack always has a leaf frame");
            let leaf = leaf_of(&frame.page);
            let nb = leaf.keys.len() as i64;
            if frame.pos <= BEFORE_FIRST {
                return Ok(None);
            }
            let candidate = if frame.pos >= nb { nb - 1 } else { frame.pos - 1 };
            if candidate >= 0 {
                frame.pos = candidate;
                let leaf = leaf_of(&self.stack.last().unwrap().page);
                let i = candidate as usize;
                return Ok(Some((leaf.keys[i].clone(), leaf.values[i].clone())));
            }
            frame.pos = BEFORE_FIRST;
            if !self.advance_to_sibling_leaf(false) {
                return Ok(None);
            }
        }
    }

    /// Non-consuming check for whether [`Cursor::next`] would yield a value.
    pub fn has_next(&self) -> Result<bool> {
        self.check_open()?;
        Ok(self.clone_state().next()?.is_some())
    }

    /// Non-consuming check for whether [`Cursor::prev`] would yield a value.
    pub fn has_prev(&self) -> Result<bool> {
        self.check_open()?;
        Ok(self.clone_state().prev()?.is_some())
    }

    /// Like [`Cursor::next`] but yields only the key.
    pub fn next_key(&mut self) -> Result<Option<K>> {
        Ok(self.next()?.map(|(k, _)| k))
    }

    /// Like [`Cursor::prev`] but yields only the key.
    pub fn prev_key(&mut self) -> Result<Option<K>> {
        Ok(self.prev()?.map(|(k, _)| k))
    }

    /// Closes the backing transaction; further operations fail.
    pub fn close(&self) {
        self.tx.close();
    }

    fn clone_state(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            comparator: self.comparator.clone(),
            stack: self.stack.clone(),
        }
    }

    /// Walks up the stack looking for an ancestor with a next (`forward`)
    /// or previous (`!forward`) child, then rebuilds the path down to a
    /// fresh leaf frame (spec §4.5 `find_next_leaf_frame`).
    fn advance_to_sibling_leaf(&mut self, forward: bool) -> bool {
        let mut i = self.stack.len() as isize - 2;
        while i >= 0 {
            let idx = i as usize;
            let nb_children = match &*self.stack[idx].page {
                Node::Internal(n) => n.children.len() as i64,
                Node::Leaf(_) => unreachable!("only the bottom frame is a leaf"),
            };
            let candidate = if forward { self.stack[idx].pos + 1 } else { self.stack[idx].pos - 1 };
            if candidate >= 0 && candidate < nb_children {
                self.stack[idx].pos = candidate;
                self.stack.truncate(idx + 1);
                let child = match &*self.stack[idx].page {
                    Node::Internal(n) => n.children[candidate as usize].clone(),
                    Node::Leaf(_) => unreachable!(),
                };
                let rest = if forward { descend_leftmost(child) } else { descend_rightmost(child) };
                self.stack.extend(rest);
                return true;
            }
            i -= 1;
        }
        false
    }
}

fn leaf_of<K, V>(page: &Arc<Node<K, V>>) -> &LeafNode<K, V> {
    match &**page {
        Node::Leaf(l) => l,
        Node::Internal(_) => unreachable!("bottom frame is always a leaf"),
    }
}

/// Index of the child `key` falls under, matching `internal::child_index`'s
/// convention (a match belongs to the right child).
fn child_descend_index<K, V, C: Comparator<K>>(node: &InternalNode<K, V>, key: &K, comparator: &C) -> usize {
    match search_slice(&node.keys, key, comparator) {
        SearchResult::Found(i) => i + 1,
        SearchResult::NotFound(i) => i,
    }
}

fn descend_leftmost<K, V>(mut page: Arc<Node<K, V>>) -> Vec<Frame<K, V>> {
    let mut stack = Vec::new();
    loop {
        match &*page.clone() {
            Node::Leaf(_) => {
                stack.push(Frame { page, pos: BEFORE_FIRST });
                return stack;
            }
            Node::Internal(n) => {
                let child = n.children[0].clone();
                stack.push(Frame { page, pos: 0 });
                page = child;
            }
        }
    }
}

fn descend_rightmost<K, V>(mut page: Arc<Node<K, V>>) -> Vec<Frame<K, V>> {
    let mut stack = Vec::new();
    loop {
        match &*page.clone() {
            Node::Leaf(l) => {
                let nb = l.keys.len() as i64;
                stack.push(Frame { page, pos: nb });
                return stack;
            }
            Node::Internal(n) => {
                let last = n.children.len() - 1;
                let child = n.children[last].clone();
                stack.push(Frame { page, pos: last as i64 });
                page = child;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::comparator::NaturalOrder;
    use crate::btree::transaction::TransactionRegistry;
    use std::time::Duration;

    fn two_leaf_tree() -> (Arc<Transaction<i32, i32>>, Arc<TransactionRegistry<i32, i32>>) {
        let left = Arc::new(Node::Leaf(LeafNode {
            revision: 1,
            keys: vec![1, 2],
            values: vec![10, 20],
        }));
        let right = Arc::new(Node::Leaf(LeafNode {
            revision: 1,
            keys: vec![3, 4, 5],
            values: vec![30, 40, 50],
        }));
        let root = Arc::new(Node::Internal(InternalNode {
            revision: 1,
            keys: vec![3],
            children: vec![left, right],
        }));
        let registry = TransactionRegistry::new(Duration::from_secs(10));
        let tx = registry.open(root, 1);
        (tx, registry)
    }

    #[test]
    fn forward_traversal_visits_every_key_in_order() {
        let (tx, _registry) = two_leaf_tree();
        let mut cursor = Cursor::at_before_first(tx, NaturalOrder::<i32>::new());
        let mut seen = Vec::new();
        while let Some((k, _)) = cursor.next().unwrap() {
            seen.push(k);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn backward_traversal_visits_every_key_in_reverse() {
        let (tx, _registry) = two_leaf_tree();
        let mut cursor = Cursor::at_after_last(tx, NaturalOrder::<i32>::new());
        let mut seen = Vec::new();
        while let Some((k, _)) = cursor.prev().unwrap() {
            seen.push(k);
        }
        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn seeked_cursor_positions_at_existing_key() {
        let (tx, _registry) = two_leaf_tree();
        let mut cursor = Cursor::seeked(tx, &3, NaturalOrder::<i32>::new());
        assert_eq!(cursor.next().unwrap(), Some((3, 30)));
        assert_eq!(cursor.next().unwrap(), Some((4, 40)));
    }

    #[test]
    fn seeked_cursor_lands_on_next_greater_key_when_absent() {
        let (tx, _registry) = two_leaf_tree();
        let mut cursor = Cursor::seeked(tx, &0, NaturalOrder::<i32>::new());
        assert_eq!(cursor.next().unwrap(), Some((1, 10)));
    }

    #[test]
    fn closing_the_cursor_fails_subsequent_operations() {
        let (tx, _registry) = two_leaf_tree();
        let mut cursor = Cursor::at_before_first(tx, NaturalOrder::<i32>::new());
        cursor.close();
        assert!(matches!(cursor.next(), Err(StrataError::TransactionClosed)));
    }

    #[test]
    fn has_next_does_not_consume() {
        let (tx, _registry) = two_leaf_tree();
        let mut cursor = Cursor::at_before_first(tx, NaturalOrder::<i32>::new());
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap(), Some((1, 10)));
    }
}
