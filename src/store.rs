// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    cache::{self, CachePayload},
    compactor::Compactor,
    fingerprint::{fingerprint, FingerprintMode},
    lookup::normalize_flat_key,
    value::{deep_merge, expand_keys},
    CompactedIndex, FlatKey, Locale, Rule, Value, ValueTree,
};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Transitive symbol-link resolution gives up after this many hops, so a
/// cyclic link set cannot hang a lookup
const MAX_LINK_HOPS: usize = 64;

const DEFAULT_SEPARATOR: &str = ".";

type LocaleMap = IndexMap<Locale, ValueTree, FxBuildHasher>;

/// The framework side of the index: file discovery, parsing and rule
/// re-extraction
///
/// The store never parses source files itself; it calls back through this
/// trait. `file_paths` feeds the cache fingerprint, `load_into` populates
/// the nested trees on a cache miss, and `reload_rules` recovers
/// executable rules after a cache hit (rules cannot be serialized).
pub trait SourceLoader {
    /// Ordered list of source files the framework will load.
    fn file_paths(&self) -> Vec<PathBuf>;

    /// Parses every source file and stores its trees into the store.
    fn load_into(&self, store: &mut TranslationStore) -> crate::Result<()>;

    /// Re-evaluates the sources that can produce executable rules and
    /// returns their leaves by `(locale, flat key)`.
    ///
    /// The default returns nothing; cached rule positions then surface as
    /// [`Value::RulePlaceholder`].
    fn reload_rules(&self) -> crate::Result<Vec<(Locale, FlatKey, Rule)>> {
        Ok(Vec::new())
    }
}

/// Options for [`TranslationStore::compact`] and
/// [`TranslationStore::eager_load`]
#[derive(Clone, Debug)]
pub struct CompactOptions {
    cache_path: Option<PathBuf>,
    cache_digest: bool,
    separator: String,
    source_paths: Vec<PathBuf>,
}

impl CompactOptions {
    /// Creates options with the default separator and no cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_path: None,
            cache_digest: false,
            separator: DEFAULT_SEPARATOR.to_string(),
            source_paths: Vec::new(),
        }
    }

    /// Backs the index with a cache file at `path`.
    #[must_use]
    pub fn cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Fingerprints source files by content digest instead of mtime.
    ///
    /// Slower, but robust across touch-based redeploys.
    #[must_use]
    pub fn cache_digest(mut self, digest: bool) -> Self {
        self.cache_digest = digest;
        self
    }

    /// Overrides the flat key separator (default `.`).
    #[must_use]
    pub fn separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = separator.into();
        self
    }

    /// Ordered source file list for the cache fingerprint.
    ///
    /// [`TranslationStore::eager_load`] fills this from the loader; set it
    /// manually when calling [`TranslationStore::compact`] directly with a
    /// cache path.
    #[must_use]
    pub fn source_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.source_paths = paths;
        self
    }

    fn fingerprint_mode(&self) -> FingerprintMode {
        if self.cache_digest {
            FingerprintMode::Digest
        } else {
            FingerprintMode::Mtime
        }
    }
}

impl Default for CompactOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`TranslationStore::lookup`]
#[derive(Clone, Debug, Default)]
pub struct LookupOptions {
    separator: Option<String>,
}

impl LookupOptions {
    /// Creates default lookup options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the flat key separator for this lookup.
    ///
    /// Must match the separator the index was compacted with; a mismatch
    /// cannot address the schema and is rejected as a miss.
    #[must_use]
    pub fn separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

/// Options for [`TranslationStore::store_translations`]
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    separator: Option<String>,
}

impl StoreOptions {
    /// Creates default store options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands keys containing `separator` in the incoming data into
    /// nested maps before merging.
    #[must_use]
    pub fn separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

/// Translation storage with a compacted fast path
///
/// Holds mutable nested trees per locale plus, after [`compact`], the
/// frozen columnar index. Lookups route to the compacted representation
/// when the locale has one and to the nested tree otherwise.
///
/// The store is single-writer/many-reader: all mutation goes through
/// `&mut self`, everything reachable from `&self` is immutable, so the
/// caller can wrap the store in its own lock or copy-on-write cell.
///
/// [`compact`]: TranslationStore::compact
#[derive(Default)]
pub struct TranslationStore {
    nested: LocaleMap,
    compacted: Option<CompactedIndex>,
}

impl TranslationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `data` into the nested tree of `locale`.
    ///
    /// If the locale is compacted it is decompacted first; other locales
    /// stay compacted. Existing keys are deep-merged, with `data` winning
    /// on conflicts.
    pub fn store_translations(&mut self, locale: &str, data: ValueTree, options: &StoreOptions) {
        if let Some(index) = &mut self.compacted {
            if index.has_locale(locale) {
                if let Some(tree) = index.decompact_locale(locale) {
                    let entry = self.nested.entry(Arc::from(locale)).or_default();
                    deep_merge(entry, tree);
                }
            }
        }

        let data = match &options.separator {
            Some(separator) => expand_keys(data, separator),
            None => data,
        };

        let entry = self.nested.entry(Arc::from(locale)).or_default();
        deep_merge(entry, data);
    }

    /// Finalizes the index for all currently stored locales.
    ///
    /// Idempotent: with every locale already compacted this is a no-op.
    /// With a mixed state (compacted index plus pending locales) the whole
    /// index is rebuilt from scratch. When a cache path is set, a valid
    /// cache short-circuits the rebuild, and a rebuild refreshes the
    /// cache; every cache failure just degrades to building in memory.
    pub fn compact(&mut self, options: &CompactOptions) -> crate::Result<()> {
        if self.nested.is_empty() && self.compacted.is_some() {
            return Ok(());
        }

        if self.compacted.is_none() {
            if let Some(payload) = self.load_cache(options) {
                self.install(payload.into_index(&[]));

                if self.nested.is_empty() {
                    return Ok(());
                }
                log::debug!("pending locales remain after cache load, rebuilding");
            }
        }

        self.rebuild(options)
    }

    /// Loads all sources through `loader`, then compacts.
    ///
    /// On a cache hit the load step is skipped entirely; only
    /// [`SourceLoader::reload_rules`] runs, to patch executable rules back
    /// into the object table.
    pub fn eager_load(
        &mut self,
        loader: &dyn SourceLoader,
        options: &CompactOptions,
    ) -> crate::Result<()> {
        if self.nested.is_empty() && self.compacted.is_some() {
            return Ok(());
        }

        let options = options.clone().source_paths(loader.file_paths());

        if self.compacted.is_none() {
            if let Some(payload) = self.load_cache(&options) {
                let rules = loader.reload_rules()?;
                self.install(payload.into_index(&rules));

                if self.nested.is_empty() {
                    return Ok(());
                }
            }
        }

        loader.load_into(self)?;
        self.rebuild(&options)
    }

    /// Drops every piece of state, compacted or nested.
    pub fn reload(&mut self) {
        self.nested.clear();
        self.compacted = None;
    }

    /// Resolves `(locale, key, scope)` to a value.
    ///
    /// Returns `None` for unknown keys, keys the locale does not define,
    /// and nil values. Symbol-links are followed transitively.
    #[must_use]
    pub fn lookup(
        &self,
        locale: &str,
        key: &str,
        scope: &[&str],
        options: &LookupOptions,
    ) -> Option<Value> {
        let separator = self.lookup_separator(locale, options)?;

        let mut flat_key = normalize_flat_key(locale, key, scope, separator);

        for _ in 0..MAX_LINK_HOPS {
            match self.lookup_once(locale, &flat_key, separator)? {
                Value::Link(target) => {
                    flat_key = normalize_flat_key(locale, &target, &[], separator);
                }
                // An explicit nil leaf answers like an absent key
                Value::Nil => return None,
                value => return Some(value),
            }
        }

        log::warn!("symbol-link chain exceeded {MAX_LINK_HOPS} hops at {flat_key:?}");
        None
    }

    /// Whether `locale` is currently served from the compacted index.
    #[must_use]
    pub fn is_compacted(&self, locale: &str) -> bool {
        self.compacted
            .as_ref()
            .is_some_and(|index| index.has_locale(locale))
    }

    /// Every locale the store knows, compacted or nested.
    #[must_use]
    pub fn locales(&self) -> Vec<Locale> {
        let mut locales: Vec<Locale> = self.nested.keys().cloned().collect();

        if let Some(index) = &self.compacted {
            for locale in index.locales() {
                if !locales.contains(locale) {
                    locales.push(locale.clone());
                }
            }
        }

        locales
    }

    /// Borrows the compacted index, if any.
    #[must_use]
    pub fn compacted_index(&self) -> Option<&CompactedIndex> {
        self.compacted.as_ref()
    }

    fn lookup_separator<'a>(
        &'a self,
        locale: &str,
        options: &'a LookupOptions,
    ) -> Option<&'a str> {
        let requested = options.separator.as_deref();

        if self.is_compacted(locale) {
            #[allow(clippy::expect_used)]
            let compacted = self
                .compacted
                .as_ref()
                .expect("checked by is_compacted")
                .separator();

            // A different separator cannot address the schema; treat the
            // request as unanswerable rather than mis-splitting keys
            if let Some(requested) = requested {
                if requested != compacted {
                    log::warn!(
                        "lookup separator {requested:?} does not match compacted separator {compacted:?}",
                    );
                    debug_assert!(false, "separator mismatch against compacted index");
                    return None;
                }
            }

            return Some(compacted);
        }

        Some(requested.unwrap_or(DEFAULT_SEPARATOR))
    }

    fn lookup_once(&self, locale: &str, flat_key: &str, separator: &str) -> Option<Value> {
        if let Some(index) = &self.compacted {
            if index.has_locale(locale) {
                return index.lookup(locale, flat_key);
            }
        }

        nested_lookup(self.nested.get(locale)?, flat_key, separator)
    }

    fn load_cache(&self, options: &CompactOptions) -> Option<CachePayload> {
        let path = options.cache_path.as_deref()?;
        let fingerprint = self.cache_fingerprint(options, path)?;
        cache::load(path, &fingerprint)
    }

    fn cache_fingerprint(&self, options: &CompactOptions, path: &Path) -> Option<String> {
        match fingerprint(&options.source_paths, options.fingerprint_mode()) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                log::warn!("cannot fingerprint sources for cache {path:?}: {e}");
                None
            }
        }
    }

    /// Installs a freshly built or loaded index, dropping the nested trees
    /// it covers.
    fn install(&mut self, index: CompactedIndex) {
        for locale in index.locales() {
            self.nested.shift_remove(locale);
        }
        self.compacted = Some(index);
    }

    /// Decompacts everything, compacts all nested trees, refreshes the
    /// cache file.
    fn rebuild(&mut self, options: &CompactOptions) -> crate::Result<()> {
        if let Some(mut index) = self.compacted.take() {
            let locales: Vec<Locale> = index.locales().cloned().collect();
            for locale in locales {
                if let Some(tree) = index.decompact_locale(&locale) {
                    let entry = self.nested.entry(locale).or_default();
                    deep_merge(entry, tree);
                }
            }
        }

        let mut compactor = Compactor::new(&options.separator);
        for (locale, tree) in self.nested.drain(..) {
            compactor.add_locale(locale, tree)?;
        }

        let index = compactor.finish();

        if let Some(path) = options.cache_path.as_deref() {
            if let Some(fingerprint) = self.cache_fingerprint(options, path) {
                cache::save(&index, path, &fingerprint);
            }
        }

        self.compacted = Some(index);
        Ok(())
    }
}

impl std::fmt::Debug for TranslationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TranslationStore(nested={:?}, compacted={:?})",
            self.nested.keys().collect::<Vec<_>>(),
            self.compacted,
        )
    }
}

fn nested_lookup(tree: &ValueTree, flat_key: &str, separator: &str) -> Option<Value> {
    let mut current = tree;
    let mut parts = flat_key.split(separator).peekable();

    while let Some(part) = parts.next() {
        let value = current.get(part)?;

        if parts.peek().is_none() {
            return Some(value.clone());
        }

        current = value.as_map()?;
    }

    None
}
