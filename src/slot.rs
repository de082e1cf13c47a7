// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{coding::DecodeError, Encoding};

/// Reserved slot value marking an interior node whose children live at
/// longer flat keys
pub const SUBTREE_SENTINEL: i64 = -(1 << 62);

/// Reserved slot value for "this locale does not define this key"
///
/// Stored inline so a column stays a plain `i64` sequence instead of
/// doubling in size with an `Option` per slot. `i64::MIN` is not reachable
/// as an object reference (it would need 2^63 side objects) and is distinct
/// from [`SUBTREE_SENTINEL`].
const NIL_SLOT: i64 = i64::MIN;

const LEN_BITS: u32 = 16;
const OFFSET_BITS: u32 = 36;
const ENC_SHIFT: u32 = OFFSET_BITS + LEN_BITS;

const MAX_OFFSET: u64 = (1 << OFFSET_BITS) - 1;

/// Largest string byte length that can be packed into a slot
///
/// Longer strings spill to the object side table.
pub const MAX_PACKED_STR_LEN: usize = u16::MAX as usize;

/// A single machine-word packed reference inside a value column
///
/// Non-negative values are string references with bit layout
/// `[enc_id:4 | offset:36 | length:16]`. Negative values other than the
/// reserved sentinels reference the object side table at index `-(v + 1)`.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct Slot(i64);

/// Decoded form of a [`Slot`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PackedRef {
    /// A byte range of the string arena
    Str {
        /// Character encoding of the referenced bytes
        encoding: Encoding,

        /// Byte offset into the arena
        offset: u64,

        /// Byte length of the string
        len: u16,
    },

    /// An index into the object side table
    Object(u32),

    /// An interior node; children live at longer flat keys
    Subtree,

    /// The locale does not define this key
    Nil,
}

impl Slot {
    /// The nil slot.
    pub const NIL: Self = Self(NIL_SLOT);

    /// The subtree marker slot.
    pub const SUBTREE: Self = Self(SUBTREE_SENTINEL);

    /// Packs a string reference.
    ///
    /// # Panics
    ///
    /// Panics if the offset exceeds 36 bits. The arena caps its total size
    /// below that, so a larger offset means the builder is broken.
    #[must_use]
    pub fn string(encoding: Encoding, offset: u64, len: u16) -> Self {
        assert!(offset <= MAX_OFFSET, "arena offset exceeds 36 bits");

        #[allow(clippy::cast_possible_wrap)]
        Self(
            (i64::from(u8::from(encoding)) << ENC_SHIFT)
                | ((offset as i64) << LEN_BITS)
                | i64::from(len),
        )
    }

    /// Packs an object side table reference.
    ///
    /// The index is incremented before negation so that index 0 does not
    /// collide with a zero-valued string reference.
    #[must_use]
    pub fn object(index: u32) -> Self {
        Self(-(i64::from(index) + 1))
    }

    /// Returns the raw packed integer.
    #[must_use]
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Whether this slot is nil.
    #[must_use]
    pub fn is_nil(self) -> bool {
        self.0 == NIL_SLOT
    }

    /// Whether this slot marks an interior node.
    #[must_use]
    pub fn is_subtree(self) -> bool {
        self.0 == SUBTREE_SENTINEL
    }

    /// Unpacks the slot into its tagged form.
    ///
    /// # Panics
    ///
    /// Panics on an encoding id outside the encoding table. Slots loaded
    /// from a cache file are validated up front, so hitting this means the
    /// index was corrupted in memory.
    #[must_use]
    pub fn unpack(self) -> PackedRef {
        match self.0 {
            NIL_SLOT => PackedRef::Nil,
            SUBTREE_SENTINEL => PackedRef::Subtree,
            v if v < 0 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                PackedRef::Object((-(v + 1)) as u32)
            }
            v => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let encoding = ((v >> ENC_SHIFT) & 0xF) as u8;
                let encoding = Encoding::try_from(encoding)
                    .unwrap_or_else(|()| panic!("invalid encoding id in packed reference {v}"));

                #[allow(clippy::cast_sign_loss)]
                let offset = ((v >> LEN_BITS) as u64) & MAX_OFFSET;

                #[allow(clippy::cast_possible_truncation)]
                let len = (v & i64::from(u16::MAX)) as u16;

                PackedRef::Str {
                    encoding,
                    offset,
                    len,
                }
            }
        }
    }

    /// Validates a raw integer read from a cache file.
    ///
    /// `arena_len` and `object_count` bound the reference targets.
    pub fn try_from_raw(
        value: i64,
        arena_len: u64,
        object_count: u32,
    ) -> Result<Self, DecodeError> {
        match value {
            NIL_SLOT | SUBTREE_SENTINEL => Ok(Self(value)),
            // index < count ⇔ v > -1 - count; avoids negating values near
            // i64::MIN that a hostile cache file could carry
            v if v < 0 => {
                if v > -1 - i64::from(object_count) {
                    Ok(Self(v))
                } else {
                    Err(DecodeError::InvalidReference(v))
                }
            }
            v => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let enc_id = ((v >> ENC_SHIFT) & 0xF) as u8;

                if v >> (ENC_SHIFT + 4) != 0 || Encoding::try_from(enc_id).is_err() {
                    return Err(DecodeError::InvalidReference(v));
                }

                #[allow(clippy::cast_sign_loss)]
                let offset = ((v >> LEN_BITS) as u64) & MAX_OFFSET;
                let len = (v & i64::from(u16::MAX)) as u64;

                if offset + len <= arena_len {
                    Ok(Self(v))
                } else {
                    Err(DecodeError::InvalidReference(v))
                }
            }
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Slot({:?})", self.unpack())
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::NIL
    }
}
