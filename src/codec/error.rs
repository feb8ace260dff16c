//! Codec error type.

use crate::domain::{EntityId, FieldType};

/// Errors raised while encoding or decoding an entity frame.
///
/// Every decode error rejects the whole frame; no partial data is ever
/// returned alongside one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the smallest possible frame.
    #[error("frame too short: {0} bytes (minimum 6)")]
    FrameTooShort(usize),

    /// START or END sentinel missing.
    #[error("bad frame sentinels: start {start:#04x}, end {end:#04x}")]
    FramingError {
        /// First byte of the frame.
        start: u8,
        /// Last byte of the frame.
        end: u8,
    },

    /// The LEN byte disagrees with the record section's actual size.
    #[error("length mismatch: header declares {declared} record bytes, frame carries {actual}")]
    LengthMismatch {
        /// Value of the LEN byte.
        declared: usize,
        /// Bytes between CHECKSUM and END.
        actual: usize,
    },

    /// The XOR over the record section disagrees with the CHECKSUM byte.
    #[error("checksum mismatch: header {declared:#04x}, computed {computed:#04x}")]
    ChecksumError {
        /// Value of the CHECKSUM byte.
        declared: u8,
        /// XOR recomputed over the record section.
        computed: u8,
    },

    /// A known entity's record runs past the end of the record section.
    #[error("record for entity {id} runs past the end of the frame")]
    TruncatedRecord {
        /// Entity whose record is incomplete.
        id: EntityId,
    },

    /// Record for an id that is not registered, under the reject policy.
    #[error("unknown entity id {0}")]
    UnknownEntityId(EntityId),

    /// A text entity's payload is not valid UTF-8.
    #[error("entity {id} carries invalid UTF-8")]
    Utf8Error {
        /// Entity whose payload failed to decode.
        id: EntityId,
    },

    /// The value variant cannot be expressed by the entity's layout.
    #[error("value of entity '{entity}' cannot be encoded with its layout")]
    UnsupportedType {
        /// Entity name.
        entity: String,
    },

    /// A numeric value carries the wrong number of fields.
    #[error("entity '{entity}' expects {expected} numbers, got {actual}")]
    ValueArity {
        /// Entity name.
        entity: String,
        /// Fields in the layout.
        expected: usize,
        /// Numbers in the value.
        actual: usize,
    },

    /// A number (or string length) does not fit its wire field.
    #[error("value {value} of entity '{entity}' does not fit {field}")]
    ValueOutOfRange {
        /// Entity name.
        entity: String,
        /// Offending number.
        value: i64,
        /// Field it was packed into.
        field: FieldType,
    },

    /// The record section exceeds what the one-byte LEN field can describe.
    #[error("record section of {0} bytes exceeds the 255-byte frame limit")]
    FrameTooLarge(usize),
}
