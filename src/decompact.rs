// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{CompactedIndex, Value, ValueTree};
use std::sync::Arc;

impl CompactedIndex {
    /// Reverts one locale to its nested tree form.
    ///
    /// The locale's value column is removed from the index; arena, schema,
    /// object table and the other locales stay intact. Returns `None` when
    /// the locale has no compacted column.
    pub(crate) fn decompact_locale(&mut self, locale: &str) -> Option<ValueTree> {
        let column = self.columns.remove(locale)?;

        let mut tree = ValueTree::new();

        // Schema order is a preorder walk of the source trees, so parents
        // are visited before their children and sibling order is restored.
        for (key, index) in self.schema.iter() {
            let slot = column.get(index);
            if slot.is_nil() || slot.is_subtree() {
                continue;
            }

            let parts: Vec<&str> = key.split(self.separator.as_ref()).collect();
            insert_at_path(&mut tree, &parts, self.decode_leaf(slot));
        }

        for positions in self.rule_positions.values_mut() {
            positions.retain(|(rule_locale, _)| rule_locale.as_ref() != locale);
        }
        self.rule_positions
            .retain(|_, positions| !positions.is_empty());

        log::debug!("decompacted locale {locale:?}");

        Some(tree)
    }
}

fn insert_at_path(tree: &mut ValueTree, parts: &[&str], value: Value) {
    let [head, rest @ ..] = parts else {
        return;
    };

    if rest.is_empty() {
        tree.insert(Arc::from(*head), value);
        return;
    }

    let entry = tree
        .entry(Arc::from(*head))
        .or_insert_with(|| Value::Map(ValueTree::new()));

    // A leaf and an interior node may collide at the same key when two
    // locales disagree about the shape; the interior node wins here
    if !matches!(entry, Value::Map(_)) {
        *entry = Value::Map(ValueTree::new());
    }

    if let Value::Map(sub) = entry {
        insert_at_path(sub, rest, value);
    }
}
