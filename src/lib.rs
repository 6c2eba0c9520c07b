// Copyright (c) 2026-present, skipstore
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An ordered, in-memory key→value index built on a probabilistic skip
//! list.
//!
//! Two variants share one algorithmic shape:
//!
//! * [`SkipList`] is the sequential index; mutations take `&mut self`
//!   and nothing is safe to share across threads.
//! * [`LockedSkipList`] is the concurrent index: every node carries its
//!   own lock and traversals lock hand-over-hand, so any number of
//!   readers and writers may run at once without whole-list exclusion.
//!
//! Both variants can serialize their entries to a plain-text snapshot
//! (one `key:value` line per entry) and restore from one with
//! insert-and-skip-duplicates merge semantics.

#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![warn(clippy::needless_lifetimes)]

mod error;
mod level;
mod locked;
mod skiplist;
mod snapshot;

pub use error::{Error, Result};
pub use level::LevelGenerator;
pub use locked::LockedSkipList;
pub use skiplist::SkipList;
