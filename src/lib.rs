//! # Strata
//!
//! Strata is an embeddable, copy-on-write B+Tree storage engine with
//! multi-version concurrency control: every successful mutation publishes a
//! new immutable revision of the tree, readers already in flight keep
//! seeing the revision they started with, and there is no crash-atomic
//! commit log (WAL/journal) — that is left to the caller.
//!
//! ## Quick start
//!
//! ```rust
//! use strata::btree::{BTree, BTreeOptions};
//!
//! let tree: BTree<i64, String> = BTree::new(BTreeOptions::with_page_size(64));
//! tree.insert(1, "alice".to_string());
//! tree.insert(2, "bob".to_string());
//! assert_eq!(tree.find(&1), Some("alice".to_string()));
//!
//! let mut cursor = tree.browse();
//! while let Some((id, name)) = cursor.next().unwrap() {
//!     println!("{id}: {name}");
//! }
//! ```
//!
//! ## Layout
//!
//! - [`btree`]: the public `BTree`/`Cursor`/`Transaction` contract, codecs,
//!   and the comparator plug-in point.
//! - [`pager`]: the on-disk file format — fixed-size pages, logical record
//!   chaining, free-page reclamation, and the managed-tree registry.
//! - [`primitives`]: positioned file I/O and the order-preserving byte
//!   encodings the built-in codecs are built from.
//! - [`error`]: the crate-wide error type and propagation policy.

pub mod btree;
pub mod error;
pub mod pager;
pub mod persist;
pub mod primitives;

pub use crate::btree::{BTree, BTreeOptions, Comparator, Cursor, KeyCodec, NaturalOrder, Transaction, ValCodec};
pub use crate::error::{Result, StrataError};
pub use crate::pager::{PageCache, RecordManager, TreeHandle};
