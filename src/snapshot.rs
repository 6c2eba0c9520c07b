// Copyright (c) 2026-present, skipstore
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The snapshot line format shared by both index variants.
//!
//! A snapshot is UTF-8 text, one `key:value` entry per line. The split
//! point is the *first* colon, so values may contain further colons but
//! never newlines.

use std::str::FromStr;

pub(crate) const DEFAULT_SNAPSHOT_PATH: &str = "store/dumpFile";

pub(crate) const DELIMITER: char = ':';

/// Parses one snapshot line into an entry.
///
/// Lines without a delimiter, with an empty side, or whose sides fail to
/// parse are rejected with `None`; restore drops them silently.
pub(crate) fn parse_line<K, V>(line: &str) -> Option<(K, V)>
where
    K: FromStr,
    V: FromStr,
{
    let (key, value) = line.split_once(DELIMITER)?;
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.parse().ok()?, value.parse().ok()?))
}
