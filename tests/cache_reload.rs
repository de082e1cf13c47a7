mod common;

use common::{s, tree};
use i18n_compact::{
    CompactOptions, FlatKey, Locale, LookupOptions, Rule, SourceLoader, StoreOptions,
    TranslationStore, Value,
};
use std::path::PathBuf;
use std::sync::Arc;
use test_log::test;

fn opts() -> LookupOptions {
    LookupOptions::new()
}

/// Stands in for the framework's file parsing layer.
struct FakeLoader {
    file: PathBuf,
    with_rule: bool,
}

impl SourceLoader for FakeLoader {
    fn file_paths(&self) -> Vec<PathBuf> {
        vec![self.file.clone()]
    }

    fn load_into(&self, store: &mut TranslationStore) -> i18n_compact::Result<()> {
        let mut pairs = vec![("msg", s("x")), ("other", s("y"))];
        if self.with_rule {
            pairs.push(("plural", Value::Rule(Rule::new(|_| s("many")))));
        }

        store.store_translations("en", tree(&pairs), &StoreOptions::new());
        Ok(())
    }

    fn reload_rules(&self) -> i18n_compact::Result<Vec<(Locale, FlatKey, Rule)>> {
        if self.with_rule {
            Ok(vec![(
                Arc::from("en"),
                Arc::from("plural"),
                Rule::new(|_| s("many")),
            )])
        } else {
            Ok(Vec::new())
        }
    }
}

#[test]
fn cache_hit_roundtrip() -> i18n_compact::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("en.yml");
    std::fs::write(&source, "msg: x")?;

    let cache = dir.path().join("i18n.cache");
    let options = CompactOptions::new()
        .cache_path(&cache)
        .source_paths(vec![source.clone()]);

    let arena_bytes = {
        let mut store = TranslationStore::new();
        store.store_translations("en", tree(&[("msg", s("x"))]), &StoreOptions::new());
        store.compact(&options)?;

        assert!(cache.exists(), "compaction should write the cache");
        assert_eq!(Some(s("x")), store.lookup("en", "msg", &[], &opts()));

        store.compacted_index().expect("compacted").stats().arena_bytes
    };

    // a fresh store loads everything from the cache, no data stored
    let mut store = TranslationStore::new();
    store.compact(&options)?;

    assert!(store.is_compacted("en"));
    assert_eq!(Some(s("x")), store.lookup("en", "msg", &[], &opts()));

    let index = store.compacted_index().expect("compacted");
    index.verify().expect("invariants hold");
    assert_eq!(arena_bytes, index.stats().arena_bytes);

    Ok(())
}

#[test]
fn changed_sources_invalidate_the_cache() -> i18n_compact::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("en.yml");
    std::fs::write(&source, "msg: x")?;

    let cache = dir.path().join("i18n.cache");
    let options = CompactOptions::new()
        .cache_path(&cache)
        .cache_digest(true)
        .source_paths(vec![source.clone()]);

    {
        let mut store = TranslationStore::new();
        store.store_translations("en", tree(&[("msg", s("x"))]), &StoreOptions::new());
        store.compact(&options)?;
    }

    std::fs::write(&source, "msg: y")?;

    // the stale cache must not be installed
    let mut store = TranslationStore::new();
    store.store_translations("en", tree(&[("msg", s("y"))]), &StoreOptions::new());
    store.compact(&options)?;

    assert_eq!(Some(s("y")), store.lookup("en", "msg", &[], &opts()));

    Ok(())
}

#[test]
fn corrupt_cache_is_a_miss() -> i18n_compact::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("en.yml");
    std::fs::write(&source, "msg: x")?;

    let cache = dir.path().join("i18n.cache");
    let options = CompactOptions::new()
        .cache_path(&cache)
        .source_paths(vec![source.clone()]);

    {
        let mut store = TranslationStore::new();
        store.store_translations("en", tree(&[("msg", s("x"))]), &StoreOptions::new());
        store.compact(&options)?;
    }

    // clobber the file body
    let mut bytes = std::fs::read(&cache)?;
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&cache, &bytes)?;

    let mut store = TranslationStore::new();
    store.store_translations("en", tree(&[("msg", s("x"))]), &StoreOptions::new());
    store.compact(&options)?;

    assert_eq!(Some(s("x")), store.lookup("en", "msg", &[], &opts()));

    Ok(())
}

#[test]
fn unwritable_cache_path_is_swallowed() -> i18n_compact::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("en.yml");
    std::fs::write(&source, "msg: x")?;

    // cache inside a directory that does not exist
    let cache = dir.path().join("missing").join("i18n.cache");
    let options = CompactOptions::new()
        .cache_path(&cache)
        .source_paths(vec![source.clone()]);

    let mut store = TranslationStore::new();
    store.store_translations("en", tree(&[("msg", s("x"))]), &StoreOptions::new());
    store.compact(&options)?;

    assert!(!cache.exists());
    assert_eq!(Some(s("x")), store.lookup("en", "msg", &[], &opts()));

    Ok(())
}

#[test]
fn eager_load_skips_loading_on_cache_hit() -> i18n_compact::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("en.rb");
    std::fs::write(&source, "plural rule source")?;

    let cache = dir.path().join("i18n.cache");
    let options = CompactOptions::new().cache_path(&cache);
    let loader = FakeLoader {
        file: source,
        with_rule: true,
    };

    {
        let mut store = TranslationStore::new();
        store.eager_load(&loader, &options)?;

        let Some(Value::Rule(rule)) = store.lookup("en", "plural", &[], &opts()) else {
            panic!("expected a rule before caching");
        };
        assert_eq!(s("many"), rule.call(&[]));
    }

    // fresh store: cache hit, rules patched back via reload_rules
    let mut store = TranslationStore::new();
    store.eager_load(&loader, &options)?;

    assert_eq!(Some(s("x")), store.lookup("en", "msg", &[], &opts()));

    let Some(Value::Rule(rule)) = store.lookup("en", "plural", &[], &opts()) else {
        panic!("expected the re-extracted rule after a cache hit");
    };
    assert_eq!(s("many"), rule.call(&[]));

    Ok(())
}

#[test]
fn unmatched_rules_stay_placeholders() -> i18n_compact::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("en.rb");
    std::fs::write(&source, "plural rule source")?;

    let cache = dir.path().join("i18n.cache");
    let options = CompactOptions::new()
        .cache_path(&cache)
        .source_paths(vec![source.clone()]);

    {
        let mut store = TranslationStore::new();
        store.store_translations(
            "en",
            tree(&[("plural", Value::Rule(Rule::new(|_| s("many"))))]),
            &StoreOptions::new(),
        );
        store.compact(&options)?;
    }

    // plain compact has no loader, so nothing can be re-extracted
    let mut store = TranslationStore::new();
    store.compact(&options)?;

    assert_eq!(
        Some(Value::RulePlaceholder),
        store.lookup("en", "plural", &[], &opts()),
    );

    Ok(())
}

#[test]
fn reload_drops_all_state() -> i18n_compact::Result<()> {
    let mut store = TranslationStore::new();
    store.store_translations("en", tree(&[("msg", s("x"))]), &StoreOptions::new());
    store.compact(&CompactOptions::new())?;

    store.reload();

    assert!(!store.is_compacted("en"));
    assert_eq!(None, store.lookup("en", "msg", &[], &opts()));
    assert!(store.locales().is_empty());

    Ok(())
}
