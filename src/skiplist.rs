// Copyright (c) 2026-present, skipstore
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![allow(unsafe_code)]

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    marker::PhantomData,
    path::PathBuf,
    ptr,
    str::FromStr,
};

use crate::{level::LevelGenerator, snapshot};

struct Node<K, V> {
    // `None` only for the sentinel; every traversal starts from the
    // sentinel's forward pointers, never its entry.
    entry: Option<(K, V)>,
    forward: Box<[*mut Node<K, V>]>,
}

impl<K, V> Node<K, V> {
    fn alloc(entry: Option<(K, V)>, level: usize) -> *mut Self {
        Box::into_raw(Box::new(Self {
            entry,
            forward: vec![ptr::null_mut(); level + 1].into_boxed_slice(),
        }))
    }

    fn key(&self) -> &K {
        match &self.entry {
            Some((key, _)) => key,
            None => unreachable!("sentinel entry is never read"),
        }
    }
}

/// An ordered key→value index on a probabilistic skip list.
///
/// This is the sequential variant: lookups take `&self`, mutations take
/// `&mut self`, and nothing here is safe to call from multiple threads
/// at once. [`crate::LockedSkipList`] has the same semantics under any
/// interleaving of callers.
///
/// Keys are unique and ordered by `Ord`. Expected cost of search, insert
/// and delete is O(log n).
pub struct SkipList<K, V> {
    head: *mut Node<K, V>,
    max_level: usize,
    level: usize,
    len: usize,
    levels: LevelGenerator,
    snapshot_path: PathBuf,
}

unsafe impl<K: Send, V: Send> Send for SkipList<K, V> {}

impl<K, V> SkipList<K, V> {
    /// Creates an empty index whose nodes never exceed `max_level`.
    ///
    /// `max_level` must be at least 1; values around log₂ of the expected
    /// element count are sensible. Snapshots go to `store/dumpFile` until
    /// [`Self::with_snapshot_path`] reconfigures the path.
    ///
    /// # Panics
    ///
    /// Panics if `max_level` is zero.
    pub fn new(max_level: usize) -> Self {
        assert!(max_level >= 1, "max_level must be positive");
        Self {
            head: Node::alloc(None, max_level),
            max_level,
            level: 0,
            len: 0,
            levels: LevelGenerator::new(),
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

    /// The number of entries in the index.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The index is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The currently highest populated level.
    pub fn height(&self) -> usize {
        self.level
    }

    /// The level cap fixed at construction.
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            node: unsafe { (*self.head).forward[0] },
            _marker: PhantomData,
        }
    }
}

impl<K, V> SkipList<K, V>
where
    K: Ord,
{
    /// Inserts an entry, rejecting duplicate keys.
    ///
    /// On a duplicate the index is unchanged and the rejected pair is
    /// handed back to the caller.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), (K, V)> {
        // update[i] is the last node whose level-i forward pointer the
        // splice must rewrite. Levels the list does not reach yet are
        // pivoted on the header, which the vec is pre-filled with.
        let mut update = vec![self.head; self.max_level + 1];
        let mut current = self.head;
        unsafe {
            for i in (0..=self.level).rev() {
                loop {
                    let next = (*current).forward[i];
                    if next.is_null() || (*next).key() >= &key {
                        break;
                    }
                    current = next;
                }
                update[i] = current;
            }

            let candidate = (*current).forward[0];
            if !candidate.is_null() && (*candidate).key() == &key {
                return Err((key, value));
            }

            let node_level = self.levels.random_level(self.max_level);
            if node_level > self.level {
                self.level = node_level;
            }

            let node = Node::alloc(Some((key, value)), node_level);
            for i in 0..=node_level {
                (*node).forward[i] = (*update[i]).forward[i];
                (*update[i]).forward[i] = node;
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Looks up `key`, returning a reference to its value on a hit.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut current = self.head;
        unsafe {
            for i in (0..=self.level).rev() {
                loop {
                    let next = (*current).forward[i];
                    if next.is_null() || (*next).key() >= key {
                        break;
                    }
                    current = next;
                }
            }
            let candidate = (*current).forward[0];
            if candidate.is_null() {
                return None;
            }
            match &(*candidate).entry {
                Some((k, v)) if k == key => Some(v),
                _ => None,
            }
        }
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let mut update = vec![self.head; self.max_level + 1];
        let mut current = self.head;
        unsafe {
            for i in (0..=self.level).rev() {
                loop {
                    let next = (*current).forward[i];
                    if next.is_null() || (*next).key() >= key {
                        break;
                    }
                    current = next;
                }
                update[i] = current;
            }

            let candidate = (*current).forward[0];
            if candidate.is_null() || (*candidate).key() != key {
                return None;
            }

            for i in 0..=self.level {
                // The node's height bounds the levels it appears on, so
                // the first level where it is not directly ahead ends the
                // splice.
                if (*update[i]).forward[i] != candidate {
                    break;
                }
                (*update[i]).forward[i] = (*candidate).forward[i];
            }

            while self.level > 0 && (*self.head).forward[self.level].is_null() {
                self.level -= 1;
            }

            self.len -= 1;
            let node = Box::from_raw(candidate);
            node.entry.map(|(_, value)| value)
        }
    }

    /// Serializes the level-0 chain to the snapshot path, truncating any
    /// previous snapshot.
    pub fn dump(&self) -> crate::Result<()>
    where
        K: fmt::Display,
        V: fmt::Display,
    {
        log::trace!("writing snapshot to {:?}", self.snapshot_path);
        let mut writer = BufWriter::new(File::create(&self.snapshot_path)?);
        for (key, value) in self.iter() {
            writeln!(writer, "{key}{}{value}", snapshot::DELIMITER)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Restores entries from the snapshot path by inserting each parsed
    /// line. Entries already present keep their value; malformed lines
    /// are dropped.
    pub fn load(&mut self) -> crate::Result<()>
    where
        K: FromStr,
        V: FromStr,
    {
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

impl<K, V> SkipList<K, V>
where
    K: fmt::Display,
    V: fmt::Display,
{
    /// Prints the per-level chains to stdout.
    pub fn display(&self) {
        print!("{self}");
    }
}

impl<K, V> fmt::Display for SkipList<K, V>
where
    K: fmt::Display,
    V: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..=self.level {
            write!(f, "level {i}:")?;
            let mut node = unsafe { (*self.head).forward[i] };
            while !node.is_null() {
                let n = unsafe { &*node };
                if let Some((key, value)) = &n.entry {
                    write!(f, " {key}:{value}")?;
                }
                node = n.forward[i];
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<K, V> Drop for SkipList<K, V> {
    fn drop(&mut self) {
        // Iterative walk along level 0; recursion depth would be O(len).
        let mut node = self.head;
        while !node.is_null() {
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.forward[0];
        }
    }
}

pub(crate) struct Iter<'a, K, V> {
    node: *mut Node<K, V>,
    _marker: PhantomData<&'a SkipList<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        let node: &'a Node<K, V> = unsafe { &*self.node };
        self.node = node.forward[0];
        node.entry.as_ref().map(|(k, v)| (k, v))
    }
}

#[cfg(test)]
impl<K, V> SkipList<K, V>
where
    K: Ord,
{
    pub(crate) fn check_integrity(&self) {
        unsafe {
            let mut count = 0;
            let mut node = (*self.head).forward[0];
            let mut prev_key: Option<&K> = None;
            while !node.is_null() {
                let key = (*node).key();
                if let Some(prev) = prev_key {
                    assert!(prev < key, "level-0 keys out of order");
                }
                prev_key = Some(key);
                count += 1;
                node = (*node).forward[0];
            }
            assert_eq!(count, self.len, "level-0 chain length");

            for i in 1..=self.max_level {
                let mut upper = (*self.head).forward[i];
                let mut lower = (*self.head).forward[i - 1];
                while !upper.is_null() {
                    while !lower.is_null() && lower != upper {
                        lower = (*lower).forward[i - 1];
                    }
                    assert!(
                        !lower.is_null(),
                        "level {i} is not a subsequence of level {}",
                        i - 1
                    );
                    upper = (*upper).forward[i];
                }
            }

            for i in 1..=self.level {
                assert!(
                    !(*self.head).forward[i].is_null(),
                    "empty level {i} at or below the current level"
                );
            }
            for i in self.level + 1..=self.max_level {
                assert!(
                    (*self.head).forward[i].is_null(),
                    "populated level {i} above the current level"
                );
            }
        }
    }
}
