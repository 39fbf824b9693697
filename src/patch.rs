use std::fmt;
use thiserror::Error;

/// Width in bytes of a little-endian `u32` patch site.
pub const U32_WIDTH: usize = 4;

/// The fundamental patch primitive: a fixed-offset byte replacement with a
/// required prior value.
///
/// A descriptor never changes the length of the image it is applied to, so
/// every other offset in the executable stays valid after patching.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchDescriptor does nothing until planned and applied"]
pub struct PatchDescriptor {
    offset: usize,
    expected: Vec<u8>,
    replacement: Vec<u8>,
    description: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error(
        "expected and replacement lengths differ at 0x{offset:08X}: {expected} vs {replacement} bytes"
    )]
    LengthMismatch {
        offset: usize,
        expected: usize,
        replacement: usize,
    },

    #[error("descriptor at 0x{offset:08X} has no bytes to compare")]
    Empty { offset: usize },
}

impl PatchDescriptor {
    /// Create a descriptor, rejecting byte sequences of unequal or zero length.
    pub fn new(
        offset: usize,
        expected: impl Into<Vec<u8>>,
        replacement: impl Into<Vec<u8>>,
        description: impl Into<String>,
    ) -> Result<Self, DescriptorError> {
        let expected = expected.into();
        let replacement = replacement.into();

        if expected.is_empty() {
            return Err(DescriptorError::Empty { offset });
        }
        if expected.len() != replacement.len() {
            return Err(DescriptorError::LengthMismatch {
                offset,
                expected: expected.len(),
                replacement: replacement.len(),
            });
        }

        Ok(Self {
            offset,
            expected,
            replacement,
            description: description.into(),
        })
    }

    /// Create a descriptor for a little-endian `u32` immediate or table field.
    pub fn u32_le(
        offset: usize,
        expected: u32,
        replacement: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            offset,
            expected: expected.to_le_bytes().to_vec(),
            replacement: replacement.to_le_bytes().to_vec(),
            description: description.into(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn expected(&self) -> &[u8] {
        &self.expected
    }

    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Number of bytes covered by this descriptor.
    pub fn len(&self) -> usize {
        self.expected.len()
    }

    /// Always false: empty descriptors are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    /// End of the covered range (exclusive), or `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.len())
    }

    /// Whether the byte ranges of two descriptors intersect.
    pub fn overlaps(&self, other: &PatchDescriptor) -> bool {
        let (Some(end), Some(other_end)) = (self.end(), other.end()) else {
            return true;
        };
        self.offset < other_end && other.offset < end
    }
}

/// Display helper for raw patch bytes.
///
/// Four-byte values render as little-endian `u32` decimals, since every
/// resolution site is a 32-bit integer. Anything else renders as spaced hex.
#[derive(Debug, Clone, Copy)]
pub struct Value<'a>(pub &'a [u8]);

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match decode_u32_le(self.0) {
            Some(value) => write!(f, "{value}"),
            None => write!(f, "{}", Hex(self.0)),
        }
    }
}

/// Spaced uppercase hex, e.g. `40 0F 00 00`.
#[derive(Debug, Clone, Copy)]
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, byte) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

pub fn decode_u32_le(bytes: &[u8]) -> Option<u32> {
    let bytes: [u8; U32_WIDTH] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Parse a hex byte string such as `"40 0F 00 00"` or `"400f0000"`.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}
