//! Primitive wire field kinds and entity layouts.
//!
//! Every entity is described by a type sequence such as `["int16"]` or
//! `["str", "uint8"]`. The sequence is parsed once, at definition time, into
//! an [`EntityLayout`] so the codec never compares type names at runtime.

use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;

/// Descriptor that marks an entity as a length-prefixed UTF-8 string.
pub const STR_MARKER: &str = "str";

/// Fixed-width big-endian integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Unsigned 8-bit.
    Uint8,
    /// Signed 8-bit, two's complement.
    Int8,
    /// Unsigned 16-bit, big-endian.
    Uint16,
    /// Signed 16-bit, big-endian two's complement.
    Int16,
    /// Unsigned 32-bit, big-endian.
    Uint32,
    /// Signed 32-bit, big-endian two's complement.
    Int32,
}

impl FieldType {
    /// Number of bytes the field occupies on the wire.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 => 4,
        }
    }

    /// Smallest and largest value representable by the field.
    #[must_use]
    pub const fn range(self) -> (i64, i64) {
        match self {
            Self::Uint8 => (0, u8::MAX as i64),
            Self::Int8 => (i8::MIN as i64, i8::MAX as i64),
            Self::Uint16 => (0, u16::MAX as i64),
            Self::Int16 => (i16::MIN as i64, i16::MAX as i64),
            Self::Uint32 => (0, u32::MAX as i64),
            Self::Int32 => (i32::MIN as i64, i32::MAX as i64),
        }
    }

    /// Returns `true` if `value` fits in this field.
    #[must_use]
    pub const fn accepts(self, value: i64) -> bool {
        let (min, max) = self.range();
        value >= min && value <= max
    }

    /// The descriptor string used in schemas (e.g. `"uint16"`).
    #[must_use]
    pub const fn descriptor(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

impl FromStr for FieldType {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint8" => Ok(Self::Uint8),
            "int8" => Ok(Self::Int8),
            "uint16" => Ok(Self::Uint16),
            "int16" => Ok(Self::Int16),
            "uint32" => Ok(Self::Uint32),
            "int32" => Ok(Self::Int32),
            other => Err(LinkError::InvalidSchema(format!(
                "unrecognized type descriptor '{other}'"
            ))),
        }
    }
}

/// Parsed shape of an entity's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityLayout {
    /// One or more integers packed back to back.
    Numeric(Vec<FieldType>),
    /// A UTF-8 string preceded by its byte length.
    Text {
        /// Field that carries the string's byte length.
        length_prefix: FieldType,
    },
}

impl EntityLayout {
    /// Parses a type sequence such as `["uint8", "int16"]` or `["str", "uint8"]`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSchema`] for an empty sequence, an
    /// unrecognized descriptor, or a `"str"` marker that is not paired with
    /// exactly one numeric descriptor.
    pub fn parse<S: AsRef<str>>(descriptors: &[S]) -> Result<Self, LinkError> {
        if descriptors.is_empty() {
            return Err(LinkError::InvalidSchema("empty type sequence".to_string()));
        }

        let mut markers = 0usize;
        let mut fields = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let descriptor = descriptor.as_ref();
            if descriptor == STR_MARKER {
                markers += 1;
            } else {
                fields.push(descriptor.parse::<FieldType>()?);
            }
        }

        match (markers, fields.as_slice()) {
            (0, _) => Ok(Self::Numeric(fields)),
            (1, [length_prefix]) => Ok(Self::Text {
                length_prefix: *length_prefix,
            }),
            (1, _) => Err(LinkError::InvalidSchema(
                "a 'str' entity needs exactly one numeric length descriptor".to_string(),
            )),
            _ => Err(LinkError::InvalidSchema(
                "'str' may appear only once in a type sequence".to_string(),
            )),
        }
    }

    /// Fixed part of the payload in bytes.
    ///
    /// For text entities this is the width of the length prefix only; the
    /// string bytes that follow it are not counted.
    #[must_use]
    pub fn byte_length(&self) -> usize {
        match self {
            Self::Numeric(fields) => fields.iter().map(|f| f.width()).sum(),
            Self::Text { length_prefix } => length_prefix.width(),
        }
    }

    /// Number of numbers a value for this layout must carry, or `None` for text.
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Numeric(fields) => Some(fields.len()),
            Self::Text { .. } => None,
        }
    }

    /// Descriptor strings, in the canonical order (`"str"` first for text).
    #[must_use]
    pub fn descriptors(&self) -> Vec<&'static str> {
        match self {
            Self::Numeric(fields) => fields.iter().map(|f| f.descriptor()).collect(),
            Self::Text { length_prefix } => vec![STR_MARKER, length_prefix.descriptor()],
        }
    }
}
