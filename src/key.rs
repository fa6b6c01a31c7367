// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request fingerprints used as cache keys.

use crate::validator::{DiscussionQuery, RequestKind};
use std::fmt;

/// Prefix shared by every cache key, in both backends.
pub const CACHE_KEY_PREFIX: &str = "discussions_";

/// Hex characters of the digest kept in a key.
const HASH_PREFIX_LEN: usize = 16;

/// Deterministic key for a `(kind, query, cursor)` triple.
///
/// Rendered as `discussions_<kind>_<hash>`; the string is used verbatim as a
/// Redis key and as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: RequestKind, query: Option<&str>, cursor: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        // Tagged and length-prefixed: absent != empty, ("a", "bc") != ("ab", "c")
        for part in [query, cursor] {
            match part {
                Some(value) => {
                    hasher.update(&[1]);
                    hasher.update(&(value.len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        let digest = hasher.finalize().to_hex();
        Self(format!(
            "{CACHE_KEY_PREFIX}{}_{}",
            kind.as_str(),
            &digest[..HASH_PREFIX_LEN]
        ))
    }

    pub fn for_query(query: &DiscussionQuery) -> Self {
        Self::new(query.kind, query.query.as_deref(), query.cursor.as_deref())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
