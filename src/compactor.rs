// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    arena::ArenaBuilder,
    child_index::ChildIndex,
    column::Column,
    object_table::ObjectTableBuilder,
    schema::KeySchema,
    CompactedIndex, FlatKey, Locale, Slot, Value, ValueTree, MAX_PACKED_STR_LEN,
};
use rustc_hash::FxHashMap;

/// Flattens nested translation trees into the columnar representation
///
/// One compactor builds one index: feed it every locale, then call
/// [`Compactor::finish`]. The schema, arena and object table are shared
/// across locales; columns are per-locale.
pub(crate) struct Compactor {
    separator: Box<str>,
    schema: KeySchema,
    arena: ArenaBuilder,
    objects: ObjectTableBuilder,
    columns: FxHashMap<Locale, Column>,
    rule_positions: FxHashMap<u32, Vec<(Locale, FlatKey)>>,
}

impl Compactor {
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.into(),
            schema: KeySchema::new(),
            arena: ArenaBuilder::new(),
            objects: ObjectTableBuilder::new(),
            columns: FxHashMap::default(),
            rule_positions: FxHashMap::default(),
        }
    }

    /// Flattens one locale's tree into a fresh value column.
    pub fn add_locale(&mut self, locale: Locale, tree: ValueTree) -> crate::Result<()> {
        let mut column = Column::new();
        self.walk(&locale, None, tree, &mut column)?;
        column.trim_tail();
        self.columns.insert(locale, column);
        Ok(())
    }

    /// Depth-first walk: interior maps get the subtree marker, packable
    /// strings go to the arena, everything else spills to the object table.
    fn walk(
        &mut self,
        locale: &Locale,
        prefix: Option<&str>,
        tree: ValueTree,
        column: &mut Column,
    ) -> crate::Result<()> {
        for (key, value) in tree {
            let flat = match prefix {
                Some(prefix) => format!("{prefix}{}{key}", self.separator),
                None => key.to_string(),
            };
            let index = self.schema.intern(&flat);

            match value {
                Value::Map(sub) => {
                    column.set(index, Slot::SUBTREE);
                    self.walk(locale, Some(&flat), sub, column)?;
                }
                Value::Str(text) if text.len() <= MAX_PACKED_STR_LEN => {
                    let slot = self.arena.intern(text.bytes(), text.encoding())?;
                    column.set(index, slot);
                }
                Value::Rule(_) => {
                    let object = self.objects.push(value);

                    #[allow(clippy::expect_used)]
                    let flat_key = self
                        .schema
                        .key_at(index)
                        .expect("key was just interned")
                        .clone();

                    self.rule_positions
                        .entry(object)
                        .or_default()
                        .push((locale.clone(), flat_key));
                    column.set(index, Slot::object(object));
                }
                // Arrays, links, numbers, booleans, explicit nils and
                // oversize strings are kept whole as side objects
                other => {
                    column.set(index, Slot::object(self.objects.push(other)));
                }
            }
        }

        Ok(())
    }

    /// Freezes everything and builds the subtree child index.
    pub fn finish(self) -> CompactedIndex {
        let children = ChildIndex::build(&self.schema, &self.separator);

        let arena = self.arena.finalize();
        let objects = self.objects.finalize();

        log::debug!(
            "compacted {} locale(s): {} keys, {} arena bytes, {} side objects",
            self.columns.len(),
            self.schema.len(),
            arena.len(),
            objects.len(),
        );

        CompactedIndex {
            separator: self.separator,
            schema: self.schema,
            columns: self.columns,
            arena,
            objects,
            children,
            rule_positions: self.rule_positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::PackedRef;
    use std::sync::Arc;
    use test_log::test;

    fn leaf_tree(pairs: &[(&str, &str)]) -> ValueTree {
        pairs
            .iter()
            .map(|(k, v)| (Arc::from(*k), Value::from(*v)))
            .collect()
    }

    #[test]
    fn flatten_writes_sentinels_and_leaves() -> crate::Result<()> {
        let mut inner = leaf_tree(&[("bar", "baz")]);
        inner.insert(Arc::from("n"), Value::Int(7));

        let mut tree = ValueTree::new();
        tree.insert(Arc::from("foo"), Value::Map(inner));
        tree.insert(Arc::from("top"), Value::from("level"));

        let mut compactor = Compactor::new(".");
        compactor.add_locale(Arc::from("en"), tree)?;
        let index = compactor.finish();

        index.verify().expect("invariants hold");

        let column = index.column("en").expect("column exists");

        let foo = index.schema().get("foo").expect("interned");
        assert!(column.get(foo).is_subtree());

        let bar = index.schema().get("foo.bar").expect("interned");
        assert!(matches!(column.get(bar).unpack(), PackedRef::Str { .. }));

        let n = index.schema().get("foo.n").expect("interned");
        assert!(matches!(column.get(n).unpack(), PackedRef::Object(_)));

        assert_eq!(None, index.schema().get("foo.missing"));
        Ok(())
    }

    #[test]
    fn schema_is_shared_across_locales() -> crate::Result<()> {
        let mut compactor = Compactor::new(".");
        compactor.add_locale(Arc::from("en"), leaf_tree(&[("greeting", "Hi")]))?;
        compactor.add_locale(Arc::from("de"), leaf_tree(&[("greeting", "Hallo")]))?;

        let index = compactor.finish();
        assert_eq!(1, index.schema().len());
        assert_eq!(2, index.stats().locale_count);
        Ok(())
    }

    #[test]
    fn rule_positions_are_recorded() -> crate::Result<()> {
        let mut tree = ValueTree::new();
        tree.insert(
            Arc::from("plural"),
            Value::Rule(crate::Rule::new(|_| Value::Nil)),
        );

        let mut compactor = Compactor::new(".");
        compactor.add_locale(Arc::from("en"), tree)?;
        let index = compactor.finish();

        assert_eq!(1, index.rule_positions.len());
        let positions = index.rule_positions.get(&0).expect("rule at object 0");
        assert_eq!(1, positions.len());
        assert_eq!("en", positions.first().expect("one position").0.as_ref());
        assert_eq!("plural", positions.first().expect("one position").1.as_ref());
        Ok(())
    }
}
