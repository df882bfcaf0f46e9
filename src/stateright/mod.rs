//! Stateright models of the lock-free protocols.
//!
//! The models are small enough to check exhaustively but the runs are
//! still too slow for every `cargo test`, so the full checks are ignored:
//!
//! ```bash
//! cargo test stateright -- --ignored --nocapture
//! ```
//!
//! | Model | Protocol | Key properties |
//! |-------|----------|----------------|
//! | `union_find::UnionFindModel` | `SharedUnionFind::unite` splicing busy lists, racing `remove_from_list` and `pick_from_list` | acyclic parents, lists match sets, dead sets are done, one finalizer |

mod union_find;
