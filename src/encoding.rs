// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Character encoding of a packed string
///
/// The encoding id is stored in the top payload bits of a packed string
/// reference, so only a small, fixed table is representable.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum Encoding {
    /// UTF-8
    #[default]
    Utf8,

    /// US-ASCII
    Ascii,

    /// Raw bytes without a character encoding
    Binary,

    /// Any other encoding
    ///
    /// Kept as an opaque fallback; the bytes round-trip unchanged.
    Other,
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "US-ASCII",
            Self::Binary => "binary",
            Self::Other => "other",
        })
    }
}

impl From<Encoding> for u8 {
    fn from(value: Encoding) -> Self {
        match value {
            Encoding::Utf8 => 0,
            Encoding::Ascii => 1,
            Encoding::Binary => 2,
            Encoding::Other => 3,
        }
    }
}

impl TryFrom<u8> for Encoding {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Utf8),
            1 => Ok(Self::Ascii),
            2 => Ok(Self::Binary),
            3 => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn encoding_u8_roundtrip() {
        for enc in [
            Encoding::Utf8,
            Encoding::Ascii,
            Encoding::Binary,
            Encoding::Other,
        ] {
            assert_eq!(Ok(enc), Encoding::try_from(u8::from(enc)));
        }
        assert_eq!(Err(()), Encoding::try_from(4));
    }
}
