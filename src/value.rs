// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    Encoding,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use std::{
    io::{Read, Write},
    sync::Arc,
};
use varint_rs::{VarintReader, VarintWriter};

/// A dotted flat key (nested map keys joined with a separator)
pub type FlatKey = Arc<str>;

/// Name under which a translation tree is registered
pub type Locale = Arc<str>;

/// An insertion-ordered nested translation tree
pub type ValueTree = IndexMap<Arc<str>, Value>;

/// A string payload together with its character encoding
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Text {
    bytes: Vec<u8>,
    encoding: Encoding,
}

impl Text {
    /// Creates a text value from raw bytes and an encoding tag.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>, encoding: Encoding) -> Self {
        Self {
            bytes: bytes.into(),
            encoding,
        }
    }

    /// The raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The character encoding tag.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Byte length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the text as `&str` if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}[{}]",
            String::from_utf8_lossy(&self.bytes),
            self.encoding,
        )
    }
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes(), Encoding::Utf8)
    }
}

impl From<String> for Text {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes(), Encoding::Utf8)
    }
}

/// An executable translation rule (e.g. a custom pluralizer)
///
/// Rules cannot be serialized into the cache file; their positions are
/// recorded instead and re-extracted rules are patched back in on load.
#[derive(Clone)]
pub struct Rule(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Rule {
    /// Wraps a callable as a rule.
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the rule.
    #[must_use]
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Rule(..)")
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A single translation value
///
/// Interior nodes of a translation tree are [`Value::Map`]; everything else
/// is a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Explicit nil (distinct from an absent key)
    Nil,

    /// Boolean
    Bool(bool),

    /// Integer
    Int(i64),

    /// Floating point number
    Float(f64),

    /// String with encoding
    Str(Text),

    /// Ordered array; elements may be any value, including nested maps
    Array(Vec<Value>),

    /// Nested map
    Map(ValueTree),

    /// Symbol-link to another flat key, resolved transitively by lookups
    Link(FlatKey),

    /// Executable rule
    Rule(Rule),

    /// Stand-in for a rule that could not be recovered from the cache
    ///
    /// Surfaces from lookups when post-load re-extraction found no matching
    /// rule; consumers expecting callable values must check for it.
    RulePlaceholder,
}

impl Value {
    /// Returns the value as `&str` if it is valid UTF-8 text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => text.as_str(),
            _ => None,
        }
    }

    /// Returns the nested tree if this is an interior node.
    #[must_use]
    pub fn as_map(&self) -> Option<&ValueTree> {
        match self {
            Self::Map(tree) => Some(tree),
            _ => None,
        }
    }

    /// Whether this is the explicit nil value.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl From<ValueTree> for Value {
    fn from(value: ValueTree) -> Self {
        Self::Map(value)
    }
}

/// Merges `src` into `dst`, recursing into maps that exist on both sides.
///
/// Non-map values (and mismatched shapes) are overwritten by `src`. Key
/// order is preserved: existing keys keep their position, new keys append.
pub fn deep_merge(dst: &mut ValueTree, src: ValueTree) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Map(dst_sub)), Value::Map(src_sub)) => {
                deep_merge(dst_sub, src_sub);
            }
            (_, value) => {
                dst.insert(key, value);
            }
        }
    }
}

/// Expands keys containing `separator` into nested maps.
///
/// `{"a.b": v}` becomes `{"a": {"b": v}}` for separator `"."`. Values are
/// deep-merged, so dotted and nested spellings of the same path coexist.
pub fn expand_keys(tree: ValueTree, separator: &str) -> ValueTree {
    let mut out = ValueTree::new();

    for (key, value) in tree {
        let value = match value {
            Value::Map(sub) => Value::Map(expand_keys(sub, separator)),
            other => other,
        };

        let mut parts = key.rsplit(separator);

        #[allow(clippy::expect_used)]
        let leaf = parts.next().expect("split yields at least one part");

        let mut nested = value;
        for part in parts {
            let mut map = ValueTree::new();
            map.insert(Arc::from(part), nested);
            nested = Value::Map(map);
        }

        let mut wrapper = ValueTree::new();
        wrapper.insert(Arc::from(leaf), nested);
        deep_merge(&mut out, wrapper);
    }

    out
}

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_MAP: u8 = 6;
const TAG_LINK: u8 = 7;
const TAG_PLACEHOLDER: u8 = 8;

pub(crate) fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), EncodeError> {
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u32_varint(bytes.len() as u32)?;
    writer.write_all(bytes)?;
    Ok(())
}

pub(crate) fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, DecodeError> {
    let len = reader.read_u32_varint()? as usize;
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_key<R: Read>(reader: &mut R) -> Result<Arc<str>, DecodeError> {
    let bytes = read_bytes(reader)?;
    Ok(Arc::from(std::str::from_utf8(&bytes)?))
}

impl Encode for Value {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::Nil => writer.write_u8(TAG_NIL)?,
            Self::Bool(b) => {
                writer.write_u8(TAG_BOOL)?;
                writer.write_u8(u8::from(*b))?;
            }
            Self::Int(i) => {
                writer.write_u8(TAG_INT)?;
                writer.write_i64::<BigEndian>(*i)?;
            }
            Self::Float(x) => {
                writer.write_u8(TAG_FLOAT)?;
                writer.write_u64::<BigEndian>(x.to_bits())?;
            }
            Self::Str(text) => {
                writer.write_u8(TAG_STR)?;
                writer.write_u8(u8::from(text.encoding()))?;
                write_bytes(writer, text.bytes())?;
            }
            Self::Array(items) => {
                writer.write_u8(TAG_ARRAY)?;
                #[allow(clippy::cast_possible_truncation)]
                writer.write_u32_varint(items.len() as u32)?;
                for item in items {
                    item.encode_into(writer)?;
                }
            }
            Self::Map(tree) => {
                writer.write_u8(TAG_MAP)?;
                #[allow(clippy::cast_possible_truncation)]
                writer.write_u32_varint(tree.len() as u32)?;
                for (key, value) in tree {
                    write_bytes(writer, key.as_bytes())?;
                    value.encode_into(writer)?;
                }
            }
            Self::Link(target) => {
                writer.write_u8(TAG_LINK)?;
                write_bytes(writer, target.as_bytes())?;
            }
            // Rules cannot cross the serialization boundary
            Self::Rule(_) | Self::RulePlaceholder => writer.write_u8(TAG_PLACEHOLDER)?,
        }

        Ok(())
    }
}

impl Decode for Value {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;

        Ok(match tag {
            TAG_NIL => Self::Nil,
            TAG_BOOL => Self::Bool(reader.read_u8()? != 0),
            TAG_INT => Self::Int(reader.read_i64::<BigEndian>()?),
            TAG_FLOAT => Self::Float(f64::from_bits(reader.read_u64::<BigEndian>()?)),
            TAG_STR => {
                let enc = reader.read_u8()?;
                let encoding = Encoding::try_from(enc)
                    .map_err(|()| DecodeError::InvalidTag(("Encoding", enc)))?;
                Self::Str(Text::new(read_bytes(reader)?, encoding))
            }
            TAG_ARRAY => {
                let len = reader.read_u32_varint()? as usize;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Self::decode_from(reader)?);
                }
                Self::Array(items)
            }
            TAG_MAP => {
                let len = reader.read_u32_varint()? as usize;
                let mut tree = ValueTree::with_capacity(len);
                for _ in 0..len {
                    let key = read_key(reader)?;
                    tree.insert(key, Self::decode_from(reader)?);
                }
                Self::Map(tree)
            }
            TAG_LINK => Self::Link(read_key(reader)?),
            TAG_PLACEHOLDER => Self::RulePlaceholder,
            _ => return Err(DecodeError::InvalidTag(("Value", tag))),
        })
    }
}
