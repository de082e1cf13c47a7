// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    arena::StringArena,
    child_index::ChildIndex,
    coding::{Decode, DecodeError, Encode, EncodeError},
    column::Column,
    file::{rewrite_atomic, FORMAT_VERSION, MAGIC_BYTES},
    object_table::ObjectTable,
    schema::KeySchema,
    value::{read_bytes, read_key, write_bytes},
    CompactedIndex, FlatKey, Locale, Rule, Slot, Value,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::{
    io::{Read, Write},
    path::Path,
};
use varint_rs::{VarintReader, VarintWriter};

/// Trailing xxh3-128 checksum over the payload
const CHECKSUM_LEN: usize = 16;

/// A decoded cache file, not yet promoted to a [`CompactedIndex`]
///
/// The object table stays mutable here so re-extracted executable rules
/// can be patched back in before everything freezes.
pub(crate) struct CachePayload {
    separator: Box<str>,
    schema: KeySchema,
    columns: FxHashMap<Locale, Column>,
    arena: StringArena,
    objects: Vec<Value>,
    children: ChildIndex,
    rule_positions: FxHashMap<u32, Vec<(Locale, FlatKey)>>,
}

impl CachePayload {
    /// Patches re-extracted rules into their recorded positions and
    /// freezes the index.
    ///
    /// Positions without a matching rule keep the placeholder; consumers
    /// see a no-op value.
    pub fn into_index(self, rules: &[(Locale, FlatKey, Rule)]) -> CompactedIndex {
        let mut objects = self.objects;
        let mut patched = 0_usize;

        for (object, positions) in &self.rule_positions {
            let found = positions.iter().find_map(|(locale, key)| {
                rules
                    .iter()
                    .find(|(rule_locale, rule_key, _)| rule_locale == locale && rule_key == key)
                    .map(|(_, _, rule)| rule)
            });

            if let Some(rule) = found {
                if let Some(slot) = objects.get_mut(*object as usize) {
                    *slot = Value::Rule(rule.clone());
                    patched += 1;
                }
            }
        }

        if !self.rule_positions.is_empty() {
            log::debug!(
                "restored {patched}/{} executable rule(s) from re-extraction",
                self.rule_positions.len(),
            );
        }

        CompactedIndex {
            separator: self.separator,
            schema: self.schema,
            columns: self.columns,
            arena: self.arena,
            objects: ObjectTable::from_items(objects),
            children: self.children,
            rule_positions: self.rule_positions,
        }
    }
}

/// Serializes the index and atomically writes it to `path`.
///
/// The cache is advisory: any failure is logged and swallowed, the caller
/// keeps its in-memory index either way.
pub(crate) fn save(index: &CompactedIndex, path: &Path, fingerprint: &str) {
    let bytes = match encode(index, fingerprint) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("failed to serialize translation cache: {e}");
            return;
        }
    };

    match rewrite_atomic(path, &bytes) {
        Ok(()) => log::debug!("wrote translation cache to {path:?} ({} bytes)", bytes.len()),
        Err(e) => log::warn!("failed to write translation cache to {path:?}: {e}"),
    }
}

/// Loads a cache file, returning `None` on any kind of miss: absent file,
/// corrupt frame, version or fingerprint mismatch.
pub(crate) fn load(path: &Path, expected_fingerprint: &str) -> Option<CachePayload> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            log::debug!("cannot read translation cache at {path:?}: {e}");
            return None;
        }
    };

    match decode(&bytes, expected_fingerprint) {
        Ok(Some(payload)) => {
            log::debug!("loaded translation cache from {path:?}");
            Some(payload)
        }
        Ok(None) => {
            log::debug!("translation cache at {path:?} is stale (fingerprint mismatch)");
            None
        }
        Err(e) => {
            log::warn!("discarding corrupt translation cache at {path:?}: {e}");
            None
        }
    }
}

fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<(), EncodeError> {
    write_bytes(writer, s.as_bytes())
}

fn read_str<R: Read>(reader: &mut R) -> Result<String, DecodeError> {
    let bytes = read_bytes(reader)?;
    Ok(std::str::from_utf8(&bytes)?.to_string())
}

fn encode(index: &CompactedIndex, fingerprint: &str) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::with_capacity(1024);

    write_str(&mut payload, fingerprint)?;
    write_str(&mut payload, &index.separator)?;

    payload.write_u32_varint(index.schema.len())?;
    for (key, column_index) in index.schema.iter() {
        write_str(&mut payload, key)?;
        payload.write_u32_varint(column_index)?;
    }

    #[allow(clippy::cast_possible_truncation)]
    payload.write_u32_varint(index.columns.len() as u32)?;
    for (locale, column) in &index.columns {
        write_str(&mut payload, locale)?;
        payload.write_u32_varint(column.len())?;
        for slot in column.iter() {
            payload.write_i64::<BigEndian>(slot.raw())?;
        }
    }

    payload.write_u64_varint(index.arena.len())?;
    payload.write_all(index.arena.as_bytes())?;

    payload.write_u32_varint(index.objects.len())?;
    for value in index.objects.iter() {
        value.encode_into(&mut payload)?;
    }

    #[allow(clippy::cast_possible_truncation)]
    payload.write_u32_varint(index.children.len() as u32)?;
    for (parent, children) in index.children.iter() {
        write_str(&mut payload, parent)?;
        #[allow(clippy::cast_possible_truncation)]
        payload.write_u32_varint(children.len() as u32)?;
        for child in children {
            write_str(&mut payload, child)?;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    payload.write_u32_varint(index.rule_positions.len() as u32)?;
    for (object, positions) in &index.rule_positions {
        payload.write_u32_varint(*object)?;
        #[allow(clippy::cast_possible_truncation)]
        payload.write_u32_varint(positions.len() as u32)?;
        for (locale, key) in positions {
            write_str(&mut payload, locale)?;
            write_str(&mut payload, key)?;
        }
    }

    let mut out = Vec::with_capacity(MAGIC_BYTES.len() + 1 + payload.len() + CHECKSUM_LEN);
    out.write_all(&MAGIC_BYTES)?;
    out.write_u8(FORMAT_VERSION)?;
    out.write_all(&payload)?;
    out.write_u128::<BigEndian>(xxhash_rust::xxh3::xxh3_128(&payload))?;

    Ok(out)
}

/// `Ok(None)` is a fingerprint mismatch; hard decode failures are `Err`.
fn decode(bytes: &[u8], expected_fingerprint: &str) -> Result<Option<CachePayload>, DecodeError> {
    let header_len = MAGIC_BYTES.len() + 1;
    if bytes.len() < header_len + CHECKSUM_LEN {
        return Err(DecodeError::InvalidHeader("cache file truncated"));
    }

    if bytes.get(..MAGIC_BYTES.len()) != Some(MAGIC_BYTES.as_slice()) {
        return Err(DecodeError::InvalidHeader("bad magic"));
    }

    let version = bytes.get(MAGIC_BYTES.len()).copied().unwrap_or(0);
    if version != FORMAT_VERSION {
        return Err(DecodeError::InvalidVersion(version));
    }

    let Some(payload) = bytes.get(header_len..bytes.len() - CHECKSUM_LEN) else {
        return Err(DecodeError::InvalidHeader("cache file truncated"));
    };
    let Some(mut trailer) = bytes.get(bytes.len() - CHECKSUM_LEN..) else {
        return Err(DecodeError::InvalidHeader("cache file truncated"));
    };

    let expected_checksum = trailer.read_u128::<BigEndian>()?;
    if xxhash_rust::xxh3::xxh3_128(payload) != expected_checksum {
        return Err(DecodeError::ChecksumMismatch);
    }

    let mut reader = payload;

    let fingerprint = read_str(&mut reader)?;
    if fingerprint != expected_fingerprint {
        return Ok(None);
    }

    let separator: Box<str> = read_str(&mut reader)?.into();

    let mut schema = KeySchema::new();
    let schema_len = reader.read_u32_varint()?;
    for position in 0..schema_len {
        let key = read_key(&mut reader)?;
        let index = reader.read_u32_varint()?;
        if index != position {
            return Err(DecodeError::InvalidHeader("schema indices not contiguous"));
        }
        schema.insert_raw(key, index);
    }

    let mut raw_columns: Vec<(Locale, Vec<i64>)> = Vec::new();
    let column_count = reader.read_u32_varint()?;
    for _ in 0..column_count {
        let locale = read_key(&mut reader)?;
        let len = reader.read_u32_varint()?;
        if len > schema_len {
            return Err(DecodeError::InvalidHeader("column longer than schema"));
        }

        let mut slots = Vec::with_capacity(len as usize);
        for _ in 0..len {
            slots.push(reader.read_i64::<BigEndian>()?);
        }
        raw_columns.push((locale, slots));
    }

    let arena_len = reader.read_u64_varint()?;
    let arena_len_usize =
        usize::try_from(arena_len).map_err(|_| DecodeError::InvalidHeader("arena too large"))?;
    let mut arena_bytes = vec![0; arena_len_usize];
    reader.read_exact(&mut arena_bytes)?;
    let arena = StringArena::from_bytes(arena_bytes);

    let object_count = reader.read_u32_varint()?;
    let mut objects = Vec::with_capacity(object_count as usize);
    for _ in 0..object_count {
        objects.push(Value::decode_from(&mut reader)?);
    }

    let mut children_map: FxHashMap<FlatKey, Vec<FlatKey>> = FxHashMap::default();
    let parent_count = reader.read_u32_varint()?;
    for _ in 0..parent_count {
        let parent = read_key(&mut reader)?;
        let child_count = reader.read_u32_varint()?;
        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            children.push(read_key(&mut reader)?);
        }
        children_map.insert(parent, children);
    }

    let mut rule_positions: FxHashMap<u32, Vec<(Locale, FlatKey)>> = FxHashMap::default();
    let rule_count = reader.read_u32_varint()?;
    for _ in 0..rule_count {
        let object = reader.read_u32_varint()?;
        if object >= object_count {
            return Err(DecodeError::InvalidReference(i64::from(object)));
        }

        let position_count = reader.read_u32_varint()?;
        let mut positions = Vec::with_capacity(position_count as usize);
        for _ in 0..position_count {
            let locale = read_key(&mut reader)?;
            let key = read_key(&mut reader)?;
            positions.push((locale, key));
        }
        rule_positions.insert(object, positions);
    }

    // Slot validation needs the arena and object table bounds, which are
    // only known now
    let mut columns: FxHashMap<Locale, Column> = FxHashMap::default();
    for (locale, slots) in raw_columns {
        let mut column = Vec::with_capacity(slots.len());
        for raw in slots {
            column.push(Slot::try_from_raw(raw, arena_len, object_count)?);
        }
        columns.insert(locale, Column::from_slots(column));
    }

    Ok(Some(CachePayload {
        separator,
        schema,
        columns,
        arena,
        objects,
        children: ChildIndex::from_map(children_map),
        rule_positions,
    }))
}
