//! Copy-on-write MVCC B+Tree (spec §3, §4).
//!
//! Module layout mirrors the teacher's `storage/btree/` split of concerns:
//! `page` (the in-memory node representation and binary search), `leaf`/
//! `internal` (per-page COW insert/delete), `maintenance` (sibling
//! selection and underflow resolution), `tree` (the public `BTree` type),
//! `cursor` (bidirectional traversal), `transaction` (reader pinning and
//! the idle-timeout sweeper), `stats` (operation counters), `codec` (the
//! key/value wire format), and `comparator` (the ordering contract).

pub mod codec;
pub mod comparator;
pub mod cursor;
pub mod internal;
pub mod leaf;
pub mod maintenance;
pub mod page;
pub mod stats;
pub mod transaction;
pub mod tree;

pub use codec::{KeyCodec, ValCodec};
pub use comparator::{Comparator, NaturalOrder};
pub use cursor::Cursor;
pub use page::{DeleteResult, InsertResult, InternalNode, LeafNode, Node, SearchResult};
pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use transaction::{ReaderSnapshot, Transaction, TransactionRegistry};
pub use tree::{normalize_page_size, BTree, BTreeOptions};
