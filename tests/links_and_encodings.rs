mod common;

use common::{s, tree};
use i18n_compact::{
    CompactOptions, Encoding, LookupOptions, StoreOptions, Text, TranslationStore, Value,
};
use std::sync::Arc;
use test_log::test;

fn opts() -> LookupOptions {
    LookupOptions::new()
}

#[test]
fn symbol_links_resolve_transitively() -> i18n_compact::Result<()> {
    let mut store = TranslationStore::new();
    store.store_translations(
        "en",
        tree(&[
            (
                "errors",
                Value::Map(tree(&[("blank", s("can't be blank"))])),
            ),
            ("alias", Value::Link(Arc::from("errors.blank"))),
            ("alias_of_alias", Value::Link(Arc::from("alias"))),
        ]),
        &StoreOptions::new(),
    );
    store.compact(&CompactOptions::new())?;

    assert_eq!(
        Some(s("can't be blank")),
        store.lookup("en", "alias", &[], &opts()),
    );
    assert_eq!(
        Some(s("can't be blank")),
        store.lookup("en", "alias_of_alias", &[], &opts()),
    );

    Ok(())
}

#[test]
fn dangling_link_is_a_miss() -> i18n_compact::Result<()> {
    let mut store = TranslationStore::new();
    store.store_translations(
        "en",
        tree(&[("alias", Value::Link(Arc::from("nowhere")))]),
        &StoreOptions::new(),
    );
    store.compact(&CompactOptions::new())?;

    assert_eq!(None, store.lookup("en", "alias", &[], &opts()));
    Ok(())
}

#[test]
fn cyclic_links_terminate() -> i18n_compact::Result<()> {
    let mut store = TranslationStore::new();
    store.store_translations(
        "en",
        tree(&[
            ("a", Value::Link(Arc::from("b"))),
            ("b", Value::Link(Arc::from("a"))),
        ]),
        &StoreOptions::new(),
    );
    store.compact(&CompactOptions::new())?;

    assert_eq!(None, store.lookup("en", "a", &[], &opts()));
    Ok(())
}

#[test]
fn links_work_before_compaction_too() {
    let mut store = TranslationStore::new();
    store.store_translations(
        "en",
        tree(&[
            ("target", s("value")),
            ("alias", Value::Link(Arc::from("target"))),
        ]),
        &StoreOptions::new(),
    );

    assert_eq!(Some(s("value")), store.lookup("en", "alias", &[], &opts()));
}

#[test]
fn non_utf8_strings_roundtrip() -> i18n_compact::Result<()> {
    let latin1 = Text::new(vec![0x47, 0x72, 0xFC, 0xDF, 0x65], Encoding::Other);
    let binary = Text::new(vec![0x00, 0xFF, 0x10], Encoding::Binary);

    let mut store = TranslationStore::new();
    store.store_translations(
        "de",
        tree(&[
            ("greeting", Value::Str(latin1.clone())),
            ("blob", Value::Str(binary.clone())),
        ]),
        &StoreOptions::new(),
    );
    store.compact(&CompactOptions::new())?;

    assert_eq!(
        Some(Value::Str(latin1)),
        store.lookup("de", "greeting", &[], &opts()),
    );
    assert_eq!(
        Some(Value::Str(binary)),
        store.lookup("de", "blob", &[], &opts()),
    );

    Ok(())
}

#[test]
fn same_bytes_different_encoding_are_distinct() -> i18n_compact::Result<()> {
    let as_utf8 = Text::new(b"abc".to_vec(), Encoding::Utf8);
    let as_binary = Text::new(b"abc".to_vec(), Encoding::Binary);

    let mut store = TranslationStore::new();
    store.store_translations(
        "en",
        tree(&[
            ("text", Value::Str(as_utf8.clone())),
            ("blob", Value::Str(as_binary.clone())),
        ]),
        &StoreOptions::new(),
    );
    store.compact(&CompactOptions::new())?;

    let index = store.compacted_index().expect("compacted");

    // the bytes exist twice, once per encoding
    assert_eq!(6, index.stats().arena_bytes);

    assert_eq!(
        Some(Value::Str(as_utf8)),
        store.lookup("en", "text", &[], &opts()),
    );
    assert_eq!(
        Some(Value::Str(as_binary)),
        store.lookup("en", "blob", &[], &opts()),
    );

    Ok(())
}
