// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{column::Column, CompactedIndex, Value, ValueTree};
use std::sync::Arc;

impl CompactedIndex {
    /// Resolves a flat key for one locale.
    ///
    /// Leaf lookups are O(1): one schema probe, one column read, one arena
    /// slice copy. Interior keys trigger subtree reconstruction, which is
    /// linear in the size of the subtree. Returns `None` for unknown keys
    /// and for keys the locale does not define.
    ///
    /// Symbol-links are returned as [`Value::Link`]; transitive resolution
    /// is the caller's concern since it may cross into non-compacted
    /// representations.
    #[must_use]
    pub fn lookup(&self, locale: &str, flat_key: &str) -> Option<Value> {
        let index = self.schema.get(flat_key)?;
        let column = self.column(locale)?;

        let slot = column.get(index);
        if slot.is_nil() {
            return None;
        }

        if slot.is_subtree() {
            return Some(Value::Map(self.reconstruct_subtree(column, flat_key)));
        }

        Some(self.decode_leaf(slot))
    }

    /// Rebuilds the nested map under `parent` from its compacted columns.
    ///
    /// Children with nil values are omitted. Child order follows schema
    /// insertion order, so reconstruction is deterministic.
    pub(crate) fn reconstruct_subtree(&self, column: &Column, parent: &str) -> ValueTree {
        let children = self.children.children(parent).unwrap_or(&[]);

        let mut tree = ValueTree::with_capacity(children.len());
        let prefix_len = parent.len() + self.separator.len();

        for child in children {
            let Some(index) = self.schema.get(child) else {
                continue;
            };

            let slot = column.get(index);
            if slot.is_nil() {
                continue;
            }

            #[allow(clippy::indexing_slicing)]
            let local = &child[prefix_len..];

            let value = if slot.is_subtree() {
                Value::Map(self.reconstruct_subtree(column, child))
            } else {
                self.decode_leaf(slot)
            };

            tree.insert(Arc::from(local), value);
        }

        tree
    }
}

/// Builds the flat key for a `(locale, key, scope)` request.
///
/// Scope components are joined in front of the key with the separator, and
/// a leading `<locale><separator>` prefix is stripped.
pub(crate) fn normalize_flat_key(
    locale: &str,
    key: &str,
    scope: &[&str],
    separator: &str,
) -> String {
    let mut out = String::with_capacity(
        scope.iter().map(|part| part.len() + separator.len()).sum::<usize>() + key.len(),
    );

    for part in scope {
        out.push_str(part);
        out.push_str(separator);
    }
    out.push_str(key);

    let prefix_len = locale.len() + separator.len();
    if out.len() > prefix_len
        && out.starts_with(locale)
        && out.get(locale.len()..prefix_len) == Some(separator)
    {
        out.drain(..prefix_len);
    }

    out
}
