// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Encoding, Error, Slot, MAX_PACKED_STR_LEN};
use rustc_hash::FxHashMap;

/// Hard cap on total arena size; offsets are packed into 36 bits
const MAX_ARENA_LEN: u64 = 1 << 36;

/// Append-only builder for the string arena
///
/// Deduplicates on `(bytes, encoding)`: interning the same pair twice
/// returns a bit-identical packed reference.
pub struct ArenaBuilder {
    buf: Vec<u8>,
    dedup: FxHashMap<(Box<[u8]>, Encoding), Slot>,
}

impl ArenaBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64 * 1024),
            dedup: FxHashMap::default(),
        }
    }

    /// Interns a string, returning its packed reference.
    ///
    /// Strings longer than [`MAX_PACKED_STR_LEN`] cannot be packed; the
    /// caller must route them through the object side table.
    pub fn intern(&mut self, bytes: &[u8], encoding: Encoding) -> crate::Result<Slot> {
        if bytes.len() > MAX_PACKED_STR_LEN {
            return Err(Error::StringTooLarge(bytes.len()));
        }

        let key = (Box::from(bytes), encoding);
        if let Some(slot) = self.dedup.get(&key) {
            return Ok(*slot);
        }

        let offset = self.buf.len() as u64;
        assert!(
            offset + bytes.len() as u64 <= MAX_ARENA_LEN,
            "string arena exceeds 2^36 bytes",
        );

        self.buf.extend_from_slice(bytes);

        #[allow(clippy::cast_possible_truncation)]
        let slot = Slot::string(encoding, offset, bytes.len() as u16);

        self.dedup.insert(key, slot);

        Ok(slot)
    }

    /// Current byte length of the buffer.
    pub(crate) fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Freezes the buffer; the dedup map is dropped.
    pub fn finalize(self) -> StringArena {
        StringArena {
            bytes: self.buf.into_boxed_slice(),
        }
    }
}

impl Default for ArenaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The frozen string arena: one large immutable byte buffer
#[derive(Debug)]
pub struct StringArena {
    bytes: Box<[u8]>,
}

impl StringArena {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Total byte length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the arena holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrows the byte range of a packed string reference.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the arena. References are validated at
    /// build and load time, so this means the index was corrupted.
    #[must_use]
    pub fn slice(&self, offset: u64, len: u16) -> &[u8] {
        let start = usize::try_from(offset).unwrap_or_else(|_| {
            panic!("arena offset {offset} exceeds address space");
        });
        let end = start + usize::from(len);

        assert!(
            end <= self.bytes.len(),
            "packed reference [{offset}..{end}] escapes arena of length {}",
            self.bytes.len(),
        );

        #[allow(clippy::indexing_slicing)]
        &self.bytes[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::PackedRef;
    use test_log::test;

    #[test]
    fn intern_and_slice() -> crate::Result<()> {
        let mut builder = ArenaBuilder::new();

        let hello = builder.intern(b"hello", Encoding::Utf8)?;
        let world = builder.intern(b"world", Encoding::Utf8)?;
        assert_ne!(hello, world);
        assert_eq!(10, builder.len());

        let arena = builder.finalize();

        let PackedRef::Str { offset, len, .. } = hello.unpack() else {
            panic!("expected string ref");
        };
        assert_eq!(b"hello", arena.slice(offset, len));

        let PackedRef::Str { offset, len, .. } = world.unpack() else {
            panic!("expected string ref");
        };
        assert_eq!(b"world", arena.slice(offset, len));

        Ok(())
    }

    #[test]
    fn dedup_returns_identical_refs() -> crate::Result<()> {
        let mut builder = ArenaBuilder::new();

        let a = builder.intern(b"hello", Encoding::Utf8)?;
        let b = builder.intern(b"hello", Encoding::Utf8)?;
        assert_eq!(a.raw(), b.raw());
        assert_eq!(5, builder.len(), "no second copy may be appended");

        Ok(())
    }

    #[test]
    fn dedup_distinguishes_encodings() -> crate::Result<()> {
        let mut builder = ArenaBuilder::new();

        let utf8 = builder.intern(b"hello", Encoding::Utf8)?;
        let binary = builder.intern(b"hello", Encoding::Binary)?;
        assert_ne!(utf8.raw(), binary.raw());

        Ok(())
    }

    #[test]
    fn boundary_string_lengths() -> crate::Result<()> {
        let mut builder = ArenaBuilder::new();

        let max = vec![b'x'; MAX_PACKED_STR_LEN];
        assert!(builder.intern(&max, Encoding::Utf8).is_ok());

        let too_large = vec![b'x'; MAX_PACKED_STR_LEN + 1];
        assert!(matches!(
            builder.intern(&too_large, Encoding::Utf8),
            Err(Error::StringTooLarge(_)),
        ));

        Ok(())
    }

    #[test]
    fn empty_string_is_internable() -> crate::Result<()> {
        let mut builder = ArenaBuilder::new();

        let empty = builder.intern(b"", Encoding::Utf8)?;
        let arena = builder.finalize();

        let PackedRef::Str { offset, len, .. } = empty.unpack() else {
            panic!("expected string ref");
        };
        assert_eq!(b"", arena.slice(offset, len));

        Ok(())
    }
}
