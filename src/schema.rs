// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::FlatKey;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;

/// The shared flat key schema
///
/// Maps every flat key to a dense column index in `[0, N)`, insertion-order
/// stable and shared across all locales of one index instance. Frozen by
/// moving it into the finalized index; rebuilding is the only way to grow
/// it afterwards.
#[derive(Debug, Default)]
pub struct KeySchema {
    map: IndexMap<FlatKey, u32, FxBuildHasher>,
}

impl KeySchema {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the column index for `key`, interning it if unseen.
    pub(crate) fn intern(&mut self, key: &str) -> u32 {
        if let Some(index) = self.map.get(key) {
            return *index;
        }

        let index = u32::try_from(self.map.len()).unwrap_or_else(|_| {
            panic!("key schema exceeds u32 column indices");
        });
        self.map.insert(Arc::from(key), index);
        index
    }

    /// Returns the column index for `key`, if interned.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u32> {
        self.map.get(key).copied()
    }

    /// Returns the flat key occupying column `index`.
    #[must_use]
    pub fn key_at(&self, index: u32) -> Option<&FlatKey> {
        self.map.get_index(index as usize).map(|(key, _)| key)
    }

    /// Number of interned keys.
    #[must_use]
    pub fn len(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        {
            self.map.len() as u32
        }
    }

    /// Whether the schema is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates `(flat key, column index)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&FlatKey, u32)> {
        self.map.iter().map(|(key, index)| (key, *index))
    }

    pub(crate) fn insert_raw(&mut self, key: FlatKey, index: u32) {
        self.map.insert(key, index);
    }
}
