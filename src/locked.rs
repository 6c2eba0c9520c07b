// Copyright (c) 2026-present, skipstore
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![allow(unsafe_code)]

//! The concurrent index variant.
//!
//! Every node owns a raw mutex and traversals lock hand-over-hand: a
//! rightward move locks the successor before the current node is
//! released, so a non-empty chain of locks always connects the header to
//! the position of interest and no traversed node can be freed mid-walk.
//! Mutating operations additionally retain the pivot lock of every level
//! they descend through, which is exactly the set of nodes whose forward
//! pointers the splice rewrites.
//!
//! Locks are only ever acquired in header→ascending-key order, and the
//! snapshot mutex is always taken before any node lock, so every mix of
//! concurrent operations is deadlock-free.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
    ptr,
    str::FromStr,
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use crossbeam_utils::CachePadded;
use parking_lot::{lock_api::RawMutex as _, Mutex, RawMutex};

use crate::{level::LevelGenerator, snapshot};

struct Node<K, V> {
    lock: RawMutex,
    // `None` only for the sentinel; every traversal starts from the
    // sentinel's forward pointers, never its entry.
    entry: Option<(K, V)>,
    // Forward pointers are written only under the owning node's lock
    // while it is held as a pivot. The atomics make unlocked reads of
    // the scalars in Drop and the integrity checks tear-free.
    forward: Box<[AtomicPtr<Node<K, V>>]>,
}

impl<K, V> Node<K, V> {
    fn alloc(entry: Option<(K, V)>, level: usize) -> *mut Self {
        let forward = (0..=level)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Box::into_raw(Box::new(Self {
            lock: RawMutex::INIT,
            entry,
            forward,
        }))
    }

    fn key(&self) -> &K {
        match &self.entry {
            Some((key, _)) => key,
            None => unreachable!("sentinel entry is never read"),
        }
    }

    fn next(&self, level: usize) -> *mut Self {
        self.forward[level].load(Ordering::Acquire)
    }

    fn set_next(&self, level: usize, node: *mut Self) {
        self.forward[level].store(node, Ordering::Release);
    }
}

// Pivots retained across adjacent levels occupy consecutive slots, so a
// top-down release that skips repeats unlocks each node exactly once.
unsafe fn unlock_pivots<K, V>(pivots: &[*mut Node<K, V>]) {
    let mut released: *mut Node<K, V> = ptr::null_mut();
    for &node in pivots.iter().rev() {
        if node != released {
            (*node).lock.unlock();
            released = node;
        }
    }
}

#[derive(Default)]
struct HotData {
    level: AtomicUsize,
    len: AtomicUsize,
}

/// The concurrent counterpart of [`crate::SkipList`].
///
/// Operations take `&self` and are safe under any interleaving of reader
/// and writer threads; per-node locks and hand-over-hand traversal stand
/// in for whole-list exclusion. Lookups clone the value out under the
/// matched node's lock so callers observe a consistent entry.
///
/// Dropping the index presumes quiescence: `&mut self` already proves no
/// other thread still holds a reference.
pub struct LockedSkipList<K, V> {
    head: *mut Node<K, V>,
    max_level: usize,
    levels: LevelGenerator,
    hot: CachePadded<HotData>,
    snapshot_lock: Mutex<()>,
    snapshot_path: PathBuf,
}

unsafe impl<K: Send, V: Send> Send for LockedSkipList<K, V> {}
unsafe impl<K: Send, V: Send> Sync for LockedSkipList<K, V> {}

impl<K, V> LockedSkipList<K, V> {
    /// Creates an empty index whose nodes never exceed `max_level`.
    ///
    /// Snapshots go to `store/dumpFile` until [`Self::with_snapshot_path`]
    /// reconfigures the path.
    ///
    /// # Panics
    ///
    /// Panics if `max_level` is zero.
    pub fn new(max_level: usize) -> Self {
        assert!(max_level >= 1, "max_level must be positive");
        Self {
            head: Node::alloc(None, max_level),
            max_level,
            levels: LevelGenerator::new(),
            hot: CachePadded::new(HotData::default()),
            snapshot_lock: Mutex::new(()),
            snapshot_path: PathBuf::from(snapshot::DEFAULT_SNAPSHOT_PATH),
        }
    }

    /// Like [`Self::new`], but with a fixed seed for the level generator
    /// so node heights are deterministic.
    pub fn with_seed(max_level: usize, seed: u32) -> Self {
        let mut list = Self::new(max_level);
        list.levels = LevelGenerator::with_seed(seed);
        list
    }

    /// Sets the path [`Self::dump`] and [`Self::load`] operate on.
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// The number of entries in the index. May be stale by the time the
    /// caller looks at it, but never torn.
    pub fn len(&self) -> usize {
        self.hot.len.load(Ordering::Relaxed)
    }

    /// The index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The currently highest populated level.
    pub fn height(&self) -> usize {
        self.hot.level.load(Ordering::Relaxed)
    }

    /// The level cap fixed at construction.
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    fn head_ref(&self) -> &Node<K, V> {
        unsafe { &*self.head }
    }

    fn lower_level(&self) {
        let mut level = self.hot.level.load(Ordering::Acquire);
        while level > 0 && self.head_ref().next(level).is_null() {
            match self.hot.level.compare_exchange(
                level,
                level - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => level -= 1,
                Err(current) => level = current,
            }
        }
    }
}

impl<K, V> LockedSkipList<K, V>
where
    K: Ord,
{
    /// Inserts an entry, rejecting duplicate keys.
    ///
    /// On a duplicate the index is unchanged and the rejected pair is
    /// handed back to the caller.
    pub fn insert(&self, key: K, value: V) -> Result<(), (K, V)> {
        // Drawn before any lock: whether the header must stay locked for
        // the whole descent depends on whether this insert may raise the
        // list level.
        let node_level = self.levels.random_level(self.max_level);
        unsafe {
            self.head_ref().lock.lock();
            let descent_level = self.hot.level.load(Ordering::Acquire);
            let release_top = descent_level.max(node_level);
            // Levels above the descent are pivoted on the header; the
            // pre-fill makes both the splice and the release below cover
            // them without a separate path.
            let mut update = vec![self.head; self.max_level + 1];
            let mut hold_lock = node_level > descent_level;
            let mut current = self.head;
            for i in (0..=descent_level).rev() {
                loop {
                    let next = (*current).next(i);
                    if next.is_null() || (*next).key() >= &key {
                        break;
                    }
                    (*next).lock.lock();
                    if hold_lock {
                        hold_lock = false;
                    } else {
                        (*current).lock.unlock();
                    }
                    current = next;
                }
                update[i] = current;
                // Keep the level-i pivot while the walk continues below.
                hold_lock = true;
            }

            let candidate = (*current).next(0);
            if !candidate.is_null() && (*candidate).key() == &key {
                unlock_pivots(&update[..=release_top]);
                return Err((key, value));
            }

            let node = Node::alloc(Some((key, value)), node_level);
            for i in 0..=node_level {
                (*node).set_next(i, (*update[i]).next(i));
                (*update[i]).set_next(i, node);
            }
            // Raised only after the splice, so a populated level is never
            // observed above the current one; serialized by the header
            // lock whenever it actually raises.
            self.hot.level.fetch_max(node_level, Ordering::AcqRel);
            self.hot.len.fetch_add(1, Ordering::Relaxed);
            unlock_pivots(&update[..=release_top]);
        }
        Ok(())
    }

    /// Looks up `key`, cloning the value out under the matched node's
    /// lock on a hit.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        unsafe {
            self.head_ref().lock.lock();
            let descent_level = self.hot.level.load(Ordering::Acquire);
            let mut current = self.head;
            for i in (0..=descent_level).rev() {
                loop {
                    let next = (*current).next(i);
                    if next.is_null() || (*next).key() >= key {
                        break;
                    }
                    (*next).lock.lock();
                    (*current).lock.unlock();
                    current = next;
                }
            }

            let candidate = (*current).next(0);
            if candidate.is_null() {
                (*current).lock.unlock();
                return None;
            }
            (*candidate).lock.lock();
            (*current).lock.unlock();
            let value = match &(*candidate).entry {
                Some((k, v)) if k == key => Some(v.clone()),
                _ => None,
            };
            (*candidate).lock.unlock();
            value
        }
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    pub fn remove(&self, key: &K) -> Option<V> {
        loop {
            if let Some(removed) = self.try_remove(key) {
                return removed;
            }
        }
    }

    // One removal attempt. Returns `None` when the matched node is taller
    // than the level the descent started from: a concurrent insert raised
    // the list mid-operation and the upper pivots are not locked, so the
    // caller must start over from the raised level.
    fn try_remove(&self, key: &K) -> Option<Option<V>> {
        unsafe {
            self.head_ref().lock.lock();
            let descent_level = self.hot.level.load(Ordering::Acquire);
            let mut update = vec![self.head; self.max_level + 1];
            let mut hold_lock = false;
            let mut current = self.head;
            for i in (0..=descent_level).rev() {
                loop {
                    let next = (*current).next(i);
                    if next.is_null() || (*next).key() >= key {
                        break;
                    }
                    (*next).lock.lock();
                    if hold_lock {
                        hold_lock = false;
                    } else {
                        (*current).lock.unlock();
                    }
                    current = next;
                }
                update[i] = current;
                hold_lock = true;
            }

            let candidate = (*current).next(0);
            if candidate.is_null() {
                unlock_pivots(&update[..=descent_level]);
                return Some(None);
            }
            (*candidate).lock.lock();
            if (*candidate).key() != key {
                (*candidate).lock.unlock();
                unlock_pivots(&update[..=descent_level]);
                return Some(None);
            }
            if (&(*candidate).forward).len() - 1 > descent_level {
                (*candidate).lock.unlock();
                unlock_pivots(&update[..=descent_level]);
                return None;
            }

            for i in 0..=descent_level {
                // The node's height bounds the levels it appears on, so
                // the first level where it is not directly ahead ends the
                // splice.
                if (*update[i]).next(i) != candidate {
                    break;
                }
                (*update[i]).set_next(i, (*candidate).next(i));
            }
            self.lower_level();
            self.hot.len.fetch_sub(1, Ordering::Relaxed);

            // The node is unlinked and every predecessor lock is still
            // held, so no thread can be parked on its lock.
            (*candidate).lock.unlock();
            let mut node = Box::from_raw(candidate);
            let value = node.entry.take().map(|(_, value)| value);
            unlock_pivots(&update[..=descent_level]);
            Some(value)
        }
    }

    /// Serializes the level-0 chain to the snapshot path, truncating any
    /// previous snapshot.
    ///
    /// The walk locks hand-over-hand, so it serializes against mutators
    /// node by node: the result is a prefix-consistent snapshot, not a
    /// point-in-time one. Concurrent dumps and restores are serialized
    /// by a codec-level mutex.
    pub fn dump(&self) -> crate::Result<()>
    where
        K: fmt::Display,
        V: fmt::Display,
    {
        let _guard = self.snapshot_lock.lock();
        log::trace!("writing snapshot to {:?}", self.snapshot_path);
        let mut writer = BufWriter::new(File::create(&self.snapshot_path)?);
        unsafe {
            self.head_ref().lock.lock();
            let mut current = self.head;
            let mut result = Ok(());
            loop {
                let next = (*current).next(0);
                if next.is_null() {
                    break;
                }
                (*next).lock.lock();
                (*current).lock.unlock();
                current = next;
                if let Some((key, value)) = &(*current).entry {
                    if let Err(e) = writeln!(writer, "{key}{}{value}", snapshot::DELIMITER) {
                        result = Err(e);
                        break;
                    }
                }
            }
            (*current).lock.unlock();
            result?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Restores entries from the snapshot path by inserting each parsed
    /// line. Entries already present keep their value; malformed lines
    /// are dropped.
    pub fn load(&self) -> crate::Result<()>
    where
        K: FromStr,
        V: FromStr,
    {
        let _guard = self.snapshot_lock.lock();
        log::trace!("restoring snapshot from {:?}", self.snapshot_path);
        let reader = BufReader::new(File::open(&self.snapshot_path)?);
        let mut restored = 0_usize;
        for line in reader.lines() {
            let Some((key, value)) = snapshot::parse_line(&line?) else {
                continue;
            };
            if self.insert(key, value).is_ok() {
                restored += 1;
            }
        }
        log::debug!("restored {restored} entries from {:?}", self.snapshot_path);
        Ok(())
    }
}

impl<K, V> Drop for LockedSkipList<K, V> {
    fn drop(&mut self) {
        // Quiescence is a precondition of drop; `&mut self` proves no
        // other thread still touches the list, so no locks are taken.
        let mut node = self.head;
        while !node.is_null() {
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.forward[0].load(Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
impl<K, V> LockedSkipList<K, V>
where
    K: Ord,
{
    pub(crate) fn check_integrity(&mut self) {
        let level = self.hot.level.load(Ordering::Relaxed);
        let len = self.hot.len.load(Ordering::Relaxed);
        unsafe {
            let mut count = 0;
            let mut node = (*self.head).forward[0].load(Ordering::Relaxed);
            let mut prev_key: Option<&K> = None;
            while !node.is_null() {
                let key = (*node).key();
                if let Some(prev) = prev_key {
                    assert!(prev < key, "level-0 keys out of order");
                }
                prev_key = Some(key);
                count += 1;
                node = (*node).forward[0].load(Ordering::Relaxed);
            }
            assert_eq!(count, len, "level-0 chain length");

            for i in 1..=self.max_level {
                let mut upper = (*self.head).forward[i].load(Ordering::Relaxed);
                let mut lower = (*self.head).forward[i - 1].load(Ordering::Relaxed);
                while !upper.is_null() {
                    while !lower.is_null() && lower != upper {
                        lower = (*lower).forward[i - 1].load(Ordering::Relaxed);
                    }
                    assert!(
                        !lower.is_null(),
                        "level {i} is not a subsequence of level {}",
                        i - 1
                    );
                    upper = (*upper).forward[i].load(Ordering::Relaxed);
                }
            }

            for i in 1..=level {
                assert!(
                    !(*self.head).forward[i].load(Ordering::Relaxed).is_null(),
                    "empty level {i} at or below the current level"
                );
            }
            for i in level + 1..=self.max_level {
                assert!(
                    (*self.head).forward[i].load(Ordering::Relaxed).is_null(),
                    "populated level {i} above the current level"
                );
            }
        }
    }

    pub(crate) fn collect(&mut self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::new();
        unsafe {
            let mut node = (*self.head).forward[0].load(Ordering::Relaxed);
            while !node.is_null() {
                if let Some((key, value)) = &(*node).entry {
                    entries.push((key.clone(), value.clone()));
                }
                node = (*node).forward[0].load(Ordering::Relaxed);
            }
        }
        entries
    }
}
