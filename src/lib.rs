// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A compacted, columnar index for translation messages.
//!
//! Deeply nested key/value trees of translation messages are memory-hungry:
//! hundreds of thousands of keys across tens of locales mean millions of
//! small allocations. This crate flattens those trees into a handful of
//! large ones:
//!
//! - a **string arena**: one big byte buffer holding every distinct
//!   `(bytes, encoding)` pair exactly once,
//! - a shared **key schema** mapping each dotted flat key to a dense column
//!   index,
//! - one **value column** per locale: a plain `i64` sequence whose entries
//!   pack a string reference, an object table index, or a subtree marker
//!   into a single machine word,
//! - a small **object side table** for the rare non-string leaves (arrays,
//!   numbers, links, executable rules, …).
//!
//! Leaf lookups are O(1); interior keys are reconstructed on demand from a
//! parent-to-children index. A single locale can be decompacted again when
//! it has to be mutated, without disturbing the others.
//!
//! The index can be persisted to a cache file (magic `I18NC`) that is
//! invalidated by a SHA-256 fingerprint over the source file list and
//! written atomically. The cache is purely advisory: any corruption,
//! version bump or fingerprint mismatch falls back to compacting from
//! scratch.
//!
//! # Example usage
//!
//! ```
//! use i18n_compact::{
//!     CompactOptions, LookupOptions, StoreOptions, TranslationStore, Value, ValueTree,
//! };
//!
//! let mut store = TranslationStore::new();
//!
//! let mut greetings = ValueTree::new();
//! greetings.insert("hello".into(), Value::from("Hello!"));
//!
//! let mut tree = ValueTree::new();
//! tree.insert("greetings".into(), Value::Map(greetings));
//!
//! store.store_translations("en", tree, &StoreOptions::new());
//! store.compact(&CompactOptions::new())?;
//!
//! // O(1) leaf lookup against the compacted column
//! let value = store.lookup("en", "greetings.hello", &[], &LookupOptions::new());
//! assert_eq!(Some("Hello!"), value.as_ref().and_then(Value::as_str));
//!
//! // subtree reconstruction
//! let value = store.lookup("en", "greetings", &[], &LookupOptions::new());
//! assert!(matches!(value, Some(Value::Map(_))));
//! #
//! # Ok::<(), i18n_compact::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod arena;
mod cache;
mod child_index;
mod coding;
mod column;
mod compactor;
mod decompact;
mod encoding;
mod error;
mod file;
mod fingerprint;
mod index;
mod lookup;
mod object_table;
mod schema;
mod slot;
mod store;
mod value;

pub use {
    coding::{DecodeError, EncodeError},
    encoding::Encoding,
    error::{Error, Result},
    file::{FORMAT_VERSION, MAGIC_BYTES},
    fingerprint::{fingerprint, FingerprintMode},
    index::{CompactedIndex, IndexStats},
    schema::KeySchema,
    slot::{PackedRef, Slot, MAX_PACKED_STR_LEN, SUBTREE_SENTINEL},
    store::{CompactOptions, LookupOptions, SourceLoader, StoreOptions, TranslationStore},
    value::{deep_merge, expand_keys, FlatKey, Locale, Rule, Text, Value, ValueTree},
};
