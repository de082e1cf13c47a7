// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{schema::KeySchema, FlatKey};
use rustc_hash::FxHashMap;

/// Maps every interior flat key to its direct children
///
/// Built once from the finalized schema; child lists preserve schema
/// insertion order, which makes subtree reconstruction deterministic.
#[derive(Debug, Default)]
pub struct ChildIndex {
    map: FxHashMap<FlatKey, Vec<FlatKey>>,
}

impl ChildIndex {
    /// Scans the schema and groups each key under its immediate parent.
    pub(crate) fn build(schema: &KeySchema, separator: &str) -> Self {
        let mut map: FxHashMap<FlatKey, Vec<FlatKey>> = FxHashMap::default();

        for (key, _) in schema.iter() {
            if let Some(split_at) = key.rfind(separator) {
                #[allow(clippy::indexing_slicing)]
                let parent = &key[..split_at];

                if let Some(children) = map.get_mut(parent) {
                    children.push(key.clone());
                } else {
                    // Share the parent's Arc with the schema when it is
                    // itself an interned key
                    let parent: FlatKey = schema
                        .get(parent)
                        .and_then(|idx| schema.key_at(idx))
                        .cloned()
                        .unwrap_or_else(|| FlatKey::from(parent));

                    map.insert(parent, vec![key.clone()]);
                }
            }
        }

        Self { map }
    }

    pub(crate) fn from_map(map: FxHashMap<FlatKey, Vec<FlatKey>>) -> Self {
        Self { map }
    }

    /// The direct children of `parent`, in schema insertion order.
    #[must_use]
    pub fn children(&self, parent: &str) -> Option<&[FlatKey]> {
        self.map.get(parent).map(Vec::as_slice)
    }

    /// Number of interior keys with at least one child.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no key has children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&FlatKey, &Vec<FlatKey>)> {
        self.map.iter()
    }
}
