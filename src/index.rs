// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    arena::StringArena,
    child_index::ChildIndex,
    column::Column,
    object_table::ObjectTable,
    schema::KeySchema,
    slot::{PackedRef, Slot},
    Encoding, FlatKey, Locale, Text, Value,
};
use rustc_hash::FxHashMap;

/// Size figures of a finalized index
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IndexStats {
    /// Number of compacted locales
    pub locale_count: usize,

    /// Number of interned flat keys
    pub key_count: u32,

    /// Total byte length of the string arena
    pub arena_bytes: u64,

    /// Number of entries in the object side table
    pub object_count: u32,
}

/// The finalized, immutable compacted index
///
/// Everything in here is frozen after compaction; the only mutation is
/// removing a whole locale column during decompaction. Readers may share
/// the index freely.
pub struct CompactedIndex {
    pub(crate) separator: Box<str>,
    pub(crate) schema: KeySchema,
    pub(crate) columns: FxHashMap<Locale, Column>,
    pub(crate) arena: StringArena,
    pub(crate) objects: ObjectTable,
    pub(crate) children: ChildIndex,

    /// Object table indices that hold executable rules, with the
    /// `(locale, flat key)` positions that reference them
    pub(crate) rule_positions: FxHashMap<u32, Vec<(Locale, FlatKey)>>,
}

impl std::fmt::Debug for CompactedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        write!(
            f,
            "CompactedIndex(locales={}, keys={}, arena={}B, objects={})",
            stats.locale_count, stats.key_count, stats.arena_bytes, stats.object_count,
        )
    }
}

impl CompactedIndex {
    /// The separator the index was built with.
    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// The shared flat key schema.
    #[must_use]
    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    /// Whether `locale` has a compacted value column.
    #[must_use]
    pub fn has_locale(&self, locale: &str) -> bool {
        self.columns.contains_key(locale)
    }

    /// Iterates the compacted locales (in no particular order).
    pub fn locales(&self) -> impl Iterator<Item = &Locale> {
        self.columns.keys()
    }

    /// Returns size figures for diagnostics and tests.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            locale_count: self.columns.len(),
            key_count: self.schema.len(),
            arena_bytes: self.arena.len(),
            object_count: self.objects.len(),
        }
    }

    pub(crate) fn column(&self, locale: &str) -> Option<&Column> {
        self.columns.get(locale)
    }

    /// Decodes a leaf slot into an owned value.
    ///
    /// String slots copy their arena bytes into a fresh allocation, so the
    /// caller may freely mutate the result (e.g. for interpolation).
    pub(crate) fn decode_leaf(&self, slot: Slot) -> Value {
        match slot.unpack() {
            PackedRef::Str {
                encoding,
                offset,
                len,
            } => Value::Str(Text::new(self.arena.slice(offset, len).to_vec(), encoding)),
            PackedRef::Object(index) => self.objects.get(index).clone(),
            PackedRef::Subtree | PackedRef::Nil => {
                panic!("decode_leaf called on sentinel slot {slot:?}")
            }
        }
    }

    /// Checks the structural invariants, returning the first violation.
    ///
    /// Covered: every slot references into bounds; a key with descendants
    /// never holds a leaf; the arena holds at most one copy per
    /// `(bytes, encoding)` pair; schema indices are contiguous.
    pub fn verify(&self) -> Result<(), String> {
        for (index, (key, mapped)) in self.schema.iter().enumerate() {
            let index = u32::try_from(index).map_err(|e| e.to_string())?;
            if mapped != index {
                return Err(format!(
                    "schema index for {key:?} is {mapped}, expected {index}",
                ));
            }
        }

        let arena_len = self.arena.len();
        let object_count = self.objects.len();

        for (locale, column) in &self.columns {
            if column.len() > self.schema.len() {
                return Err(format!(
                    "column for {locale:?} has {} slots but schema has {} keys",
                    column.len(),
                    self.schema.len(),
                ));
            }

            for (index, slot) in column.iter().enumerate() {
                if Slot::try_from_raw(slot.raw(), arena_len, object_count).is_err() {
                    return Err(format!(
                        "column for {locale:?} holds out-of-bounds slot {slot:?} at {index}",
                    ));
                }
            }
        }

        for (parent, _) in self.children.iter() {
            let Some(index) = self.schema.get(parent) else {
                continue;
            };

            for (locale, column) in &self.columns {
                let slot = column.get(index);
                if !slot.is_nil() && !slot.is_subtree() {
                    return Err(format!(
                        "{parent:?} has descendants but holds leaf {slot:?} in {locale:?}",
                    ));
                }
            }
        }

        let mut seen: FxHashMap<(Vec<u8>, Encoding), u64> = FxHashMap::default();
        for column in self.columns.values() {
            for slot in column.iter() {
                let PackedRef::Str {
                    encoding,
                    offset,
                    len,
                } = slot.unpack()
                else {
                    continue;
                };

                let bytes = self.arena.slice(offset, len).to_vec();
                if let Some(first) = seen.get(&(bytes.clone(), encoding)) {
                    if *first != offset {
                        return Err(format!(
                            "duplicate arena entry for {:?} at offsets {first} and {offset}",
                            String::from_utf8_lossy(&bytes),
                        ));
                    }
                } else {
                    seen.insert((bytes, encoding), offset);
                }
            }
        }

        Ok(())
    }
}
