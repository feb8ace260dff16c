//! Entity frame layout, encoder and decoder.
//!
//! ```text
//! +-------+-----+----------+------------------------+-----+
//! | START | LEN | CHECKSUM | entity records ...     | END |
//! | 0xA0  | 1 B | 1 B      | LEN bytes              | 0xA1|
//! +-------+-----+----------+------------------------+-----+
//! ```
//!
//! An entity record is the entity id followed by its payload. Numeric
//! payloads are the fields packed big-endian in layout order; text payloads
//! are the length prefix followed by that many UTF-8 bytes.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::error::FrameError;
use super::pack::{get_field, put_field};
use crate::domain::{Entity, EntityId, EntityLayout, EntityValue, SnapshotEntry};

/// First byte of every frame.
pub const START: u8 = 0xA0;

/// Last byte of every frame.
pub const END: u8 = 0xA1;

/// START + LEN + CHECKSUM.
pub const HEADER_LEN: usize = 3;

/// START + LEN + CHECKSUM + one id byte + one data byte + END.
pub const MIN_FRAME_LEN: usize = 6;

/// Largest record section the one-byte LEN field can describe.
pub const MAX_RECORD_SECTION: usize = u8::MAX as usize;

/// Resolves wire ids to entity definitions during decode.
pub trait EntityLookup {
    /// Returns the entity registered under `id`, if any.
    fn entity(&self, id: EntityId) -> Option<&Entity>;
}

impl EntityLookup for [Entity] {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.iter().find(|e| e.id == id)
    }
}

/// What the decoder does with a record whose id is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownEntityPolicy {
    /// Skip the id byte and keep scanning. Can desynchronize on a payload
    /// byte that happens to look like a registered id.
    #[default]
    Skip,
    /// Reject the whole frame.
    Reject,
}

impl FromStr for UnknownEntityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown entity policy '{other}'")),
        }
    }
}

/// One entity value recovered from a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEntity {
    /// Wire tag.
    pub id: EntityId,
    /// Registered name.
    pub name: String,
    /// Decoded value.
    pub value: EntityValue,
}

/// Result of a successful decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Decoded entities in wire order.
    pub entities: Vec<DecodedEntity>,
    /// Unregistered ids that were skipped.
    pub skipped: Vec<EntityId>,
}

impl DecodedFrame {
    /// Name → value mapping of the decoded entities.
    ///
    /// If an entity appears twice in one frame, the later record wins.
    #[must_use]
    pub fn to_named(&self) -> HashMap<String, EntityValue> {
        self.entities
            .iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    }

    /// Returns `true` if no entity was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// XOR of every byte in `records`.
///
/// Any single flipped bit changes the result, but an even number of flips
/// in the same bit position (across one or several bytes) cancels out and
/// goes undetected.
#[must_use]
pub fn checksum(records: &[u8]) -> u8 {
    records.iter().fold(0, |acc, b| acc ^ b)
}

/// Encodes captured values into one frame.
///
/// Returns an empty buffer when `entries` is empty: there is nothing to send
/// and no empty frame is ever produced.
///
/// # Errors
///
/// Returns [`FrameError::UnsupportedType`] or [`FrameError::ValueArity`] when
/// a value does not match its layout, [`FrameError::ValueOutOfRange`] when
/// a number or string length does not fit its field, and
/// [`FrameError::FrameTooLarge`] when the records exceed 255 bytes.
pub fn encode(entries: &[SnapshotEntry]) -> Result<Bytes, FrameError> {
    if entries.is_empty() {
        return Ok(Bytes::new());
    }

    let mut records = BytesMut::new();
    for entry in entries {
        encode_record(&mut records, &entry.entity, &entry.value)?;
    }

    if records.len() > MAX_RECORD_SECTION {
        return Err(FrameError::FrameTooLarge(records.len()));
    }
    Ok(seal(&records))
}

/// Frames produced from one snapshot by [`encode_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedBatch {
    /// Frames in snapshot order.
    pub frames: Vec<Bytes>,
    /// Entries left out, by entity name, with the reason.
    pub rejected: Vec<(String, FrameError)>,
}

impl EncodedBatch {
    /// Returns `true` if there is no frame to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Encodes a snapshot into as many frames as its records need.
///
/// Records are packed in order and a new frame starts whenever the next
/// record would push the section past 255 bytes. An entry that cannot be
/// encoded, including a single record larger than 255 bytes, is left out
/// and reported in [`EncodedBatch::rejected`]; its siblings are unaffected.
#[must_use]
pub fn encode_batch(entries: &[SnapshotEntry]) -> EncodedBatch {
    let mut batch = EncodedBatch::default();
    let mut records = BytesMut::new();
    let mut record = BytesMut::new();

    for entry in entries {
        record.clear();
        if let Err(err) = encode_record(&mut record, &entry.entity, &entry.value) {
            batch.rejected.push((entry.entity.name.clone(), err));
            continue;
        }
        if record.len() > MAX_RECORD_SECTION {
            batch
                .rejected
                .push((entry.entity.name.clone(), FrameError::FrameTooLarge(record.len())));
            continue;
        }
        if records.len() + record.len() > MAX_RECORD_SECTION {
            batch.frames.push(seal(&records));
            records.clear();
        }
        records.extend_from_slice(&record);
    }

    if !records.is_empty() {
        batch.frames.push(seal(&records));
    }
    batch
}

/// Wraps a record section of at most 255 bytes in header and END.
fn seal(records: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(records.len() + HEADER_LEN + 1);
    frame.put_u8(START);
    frame.put_u8(records.len() as u8);
    frame.put_u8(checksum(records));
    frame.put_slice(records);
    frame.put_u8(END);
    frame.freeze()
}

fn encode_record(
    buf: &mut BytesMut,
    entity: &Entity,
    value: &EntityValue,
) -> Result<(), FrameError> {
    let out_of_range = |value: i64, field| FrameError::ValueOutOfRange {
        entity: entity.name.clone(),
        value,
        field,
    };

    match (&entity.layout, value) {
        (EntityLayout::Numeric(fields), EntityValue::Numbers(numbers)) => {
            if fields.len() != numbers.len() {
                return Err(FrameError::ValueArity {
                    entity: entity.name.clone(),
                    expected: fields.len(),
                    actual: numbers.len(),
                });
            }
            buf.put_u8(entity.id.get());
            for (field, number) in fields.iter().zip(numbers) {
                if !field.accepts(*number) {
                    return Err(out_of_range(*number, *field));
                }
                put_field(buf, *field, *number);
            }
        }
        (EntityLayout::Text { length_prefix }, EntityValue::Text(text)) => {
            let len = i64::try_from(text.len()).unwrap_or(i64::MAX);
            if !length_prefix.accepts(len) {
                return Err(out_of_range(len, *length_prefix));
            }
            buf.put_u8(entity.id.get());
            put_field(buf, *length_prefix, len);
            buf.put_slice(text.as_bytes());
        }
        _ => {
            return Err(FrameError::UnsupportedType {
                entity: entity.name.clone(),
            });
        }
    }
    Ok(())
}

/// Decodes one frame against `schema`.
///
/// Validation happens before any record is read: size, sentinels, LEN and
/// checksum. Decoding is all-or-nothing.
///
/// # Errors
///
/// Returns the first [`FrameError`] found; see the variants for details.
pub fn decode<L>(
    schema: &L,
    frame: &[u8],
    policy: UnknownEntityPolicy,
) -> Result<DecodedFrame, FrameError>
where
    L: EntityLookup + ?Sized,
{
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::FrameTooShort(frame.len()));
    }

    let (Some(&start), Some(&end)) = (frame.first(), frame.last()) else {
        return Err(FrameError::FrameTooShort(frame.len()));
    };
    if start != START || end != END {
        return Err(FrameError::FramingError { start, end });
    }

    let (Some(&declared_len), Some(&declared_sum), Some(records)) = (
        frame.get(1),
        frame.get(2),
        frame.get(HEADER_LEN..frame.len() - 1),
    ) else {
        return Err(FrameError::FrameTooShort(frame.len()));
    };

    if usize::from(declared_len) != records.len() {
        return Err(FrameError::LengthMismatch {
            declared: usize::from(declared_len),
            actual: records.len(),
        });
    }

    let computed = checksum(records);
    if computed != declared_sum {
        return Err(FrameError::ChecksumError {
            declared: declared_sum,
            computed,
        });
    }

    let mut decoded = DecodedFrame::default();
    let mut cursor = records;
    while cursor.has_remaining() {
        let id = EntityId::new(cursor.get_u8());
        let Some(entity) = schema.entity(id) else {
            match policy {
                UnknownEntityPolicy::Skip => {
                    decoded.skipped.push(id);
                    continue;
                }
                UnknownEntityPolicy::Reject => return Err(FrameError::UnknownEntityId(id)),
            }
        };

        let value = decode_payload(&mut cursor, entity)?;
        decoded.entities.push(DecodedEntity {
            id,
            name: entity.name.clone(),
            value,
        });
    }

    Ok(decoded)
}

fn decode_payload(cursor: &mut &[u8], entity: &Entity) -> Result<EntityValue, FrameError> {
    let truncated = || FrameError::TruncatedRecord { id: entity.id };

    match &entity.layout {
        EntityLayout::Numeric(fields) => {
            let numbers = fields
                .iter()
                .map(|field| get_field(cursor, *field).ok_or_else(truncated))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(EntityValue::Numbers(numbers))
        }
        EntityLayout::Text { length_prefix } => {
            let len = get_field(cursor, *length_prefix).ok_or_else(truncated)?;
            let len = usize::try_from(len).map_err(|_| truncated())?;
            let bytes = cursor.get(..len).ok_or_else(truncated)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| FrameError::Utf8Error { id: entity.id })?
                .to_string();
            cursor.advance(len);
            Ok(EntityValue::Text(text))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::FieldType;

    fn entity(id: u8, name: &str, types: &[&str]) -> Entity {
        let Ok(layout) = EntityLayout::parse(types) else {
            panic!("valid layout for {name}");
        };
        Entity {
            id: EntityId::new(id),
            name: name.to_string(),
            layout,
        }
    }

    fn schema() -> Vec<Entity> {
        vec![
            entity(1, "temp", &["int16"]),
            entity(2, "label", &["str", "uint8"]),
        ]
    }

    fn entry(entity: &Entity, value: impl Into<EntityValue>) -> SnapshotEntry {
        SnapshotEntry {
            entity: Arc::new(entity.clone()),
            value: value.into(),
        }
    }

    fn reference_frame() -> Bytes {
        let schema = schema();
        let entries = [entry(&schema[0], -5), entry(&schema[1], "ok")];
        assert_ok!(encode(&entries))
    }

    #[test]
    fn reference_frame_is_byte_exact() {
        let records = [0x01, 0xFF, 0xFB, 0x02, 0x02, 0x6F, 0x6B];
        let sum = checksum(&records);
        assert_eq!(sum, 0x01);

        let frame = reference_frame();
        assert_eq!(
            frame.as_ref(),
            &[0xA0, 0x07, sum, 0x01, 0xFF, 0xFB, 0x02, 0x02, 0x6F, 0x6B, 0xA1]
        );
    }

    #[test]
    fn empty_snapshot_encodes_to_nothing() {
        let frame = assert_ok!(encode(&[]));
        assert!(frame.is_empty());
    }

    #[test]
    fn reference_frame_decodes_by_name() {
        let frame = reference_frame();
        let decoded = assert_ok!(decode(
            schema().as_slice(),
            &frame,
            UnknownEntityPolicy::Skip
        ));
        let named = decoded.to_named();
        assert_eq!(named.get("temp"), Some(&EntityValue::Numbers(vec![-5])));
        assert_eq!(named.get("label"), Some(&EntityValue::from("ok")));
        assert!(decoded.skipped.is_empty());
    }

    #[test]
    fn short_input_is_rejected_regardless_of_content() {
        let inputs: [&[u8]; 4] = [&[], &[0xA0], &[0xA0, 0x01, 0x01, 0xA1], &[0xFF; 5]];
        for input in inputs {
            let err = assert_err!(decode(schema().as_slice(), input, UnknownEntityPolicy::Skip));
            assert_eq!(err, FrameError::FrameTooShort(input.len()));
        }
    }

    #[test]
    fn bad_sentinels_are_rejected() {
        let mut frame = reference_frame().to_vec();
        frame[0] = 0x00;
        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert!(matches!(err, FrameError::FramingError { start: 0x00, .. }));

        let mut frame = reference_frame().to_vec();
        let last = frame.len() - 1;
        frame[last] = 0xA0;
        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert!(matches!(err, FrameError::FramingError { end: 0xA0, .. }));
    }

    #[test]
    fn declared_length_must_match() {
        let mut frame = reference_frame().to_vec();
        frame[1] = 0x06;
        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                declared: 6,
                actual: 7
            }
        );
    }

    #[test]
    fn any_single_bit_flip_in_records_fails_checksum() {
        let frame = reference_frame().to_vec();
        for index in HEADER_LEN..frame.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[index] ^= 1 << bit;
                let result = decode(schema().as_slice(), &corrupted, UnknownEntityPolicy::Skip);
                assert!(
                    matches!(result, Err(FrameError::ChecksumError { .. })),
                    "byte {index} bit {bit}: {result:?}"
                );
            }
        }
    }

    #[test]
    fn unknown_id_is_skipped_under_skip_policy() {
        // id 9 is not registered; the following byte 0x01 is read as temp's id.
        let records = [0x09, 0x01, 0x00, 0x2A];
        let mut frame = vec![START, records.len() as u8, checksum(&records)];
        frame.extend_from_slice(&records);
        frame.push(END);

        let decoded = assert_ok!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert_eq!(decoded.skipped, vec![EntityId::new(9)]);
        assert_eq!(decoded.entities.len(), 1);
        assert_eq!(decoded.entities[0].value, EntityValue::Numbers(vec![42]));
    }

    #[test]
    fn unknown_id_fails_frame_under_reject_policy() {
        let records = [0x09, 0x01, 0x00, 0x2A];
        let mut frame = vec![START, records.len() as u8, checksum(&records)];
        frame.extend_from_slice(&records);
        frame.push(END);

        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Reject));
        assert_eq!(err, FrameError::UnknownEntityId(EntityId::new(9)));
    }

    #[test]
    fn truncated_record_is_rejected() {
        let records = [0x01, 0xFF];
        let mut frame = vec![START, records.len() as u8, checksum(&records)];
        frame.extend_from_slice(&records);
        frame.push(END);

        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert_eq!(
            err,
            FrameError::TruncatedRecord {
                id: EntityId::new(1)
            }
        );
    }

    #[test]
    fn string_longer_than_section_is_truncated() {
        let records = [0x02, 0x05, 0x6F, 0x6B];
        let mut frame = vec![START, records.len() as u8, checksum(&records)];
        frame.extend_from_slice(&records);
        frame.push(END);

        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert!(matches!(err, FrameError::TruncatedRecord { .. }));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let records = [0x02, 0x02, 0xC3, 0x28];
        let mut frame = vec![START, records.len() as u8, checksum(&records)];
        frame.extend_from_slice(&records);
        frame.push(END);

        let err = assert_err!(decode(schema().as_slice(), &frame, UnknownEntityPolicy::Skip));
        assert_eq!(
            err,
            FrameError::Utf8Error {
                id: EntityId::new(2)
            }
        );
    }

    #[test]
    fn encode_checks_ranges_and_shapes() {
        let schema = schema();

        let err = assert_err!(encode(&[entry(&schema[0], 40_000)]));
        assert!(matches!(
            err,
            FrameError::ValueOutOfRange {
                field: FieldType::Int16,
                ..
            }
        ));

        let err = assert_err!(encode(&[entry(&schema[0], "text")]));
        assert!(matches!(err, FrameError::UnsupportedType { .. }));

        let err = assert_err!(encode(&[entry(&schema[1], vec![1, 2])]));
        assert!(matches!(err, FrameError::UnsupportedType { .. }));

        let err = assert_err!(encode(&[entry(&schema[0], vec![1, 2])]));
        assert!(matches!(err, FrameError::ValueArity { expected: 1, actual: 2, .. }));

        let long = "x".repeat(256);
        let err = assert_err!(encode(&[entry(&schema[1], long)]));
        assert!(matches!(err, FrameError::ValueOutOfRange { value: 256, .. }));
    }

    #[test]
    fn oversized_record_section_is_rejected() {
        let wide = entity(3, "blob", &["str", "uint16"]);
        let err = assert_err!(encode(&[entry(&wide, "y".repeat(300))]));
        assert!(matches!(err, FrameError::FrameTooLarge(_)));
    }

    #[test]
    fn batch_splits_at_record_boundaries() {
        let counters: Vec<Entity> = (1..=60)
            .map(|id| entity(id, &format!("c{id}"), &["uint32"]))
            .collect();
        let entries: Vec<SnapshotEntry> = counters
            .iter()
            .map(|e| entry(e, i64::from(e.id.get()) * 1000))
            .collect();

        let batch = encode_batch(&entries);
        assert!(batch.rejected.is_empty());
        // 60 records of 5 bytes: 51 fill the first frame, 9 go to the second.
        assert_eq!(batch.frames.len(), 2);
        assert_eq!(batch.frames[0][1], 255);
        assert_eq!(batch.frames[1][1], 45);

        let mut seen = 0;
        for frame in &batch.frames {
            let decoded = assert_ok!(decode(
                counters.as_slice(),
                frame,
                UnknownEntityPolicy::Reject
            ));
            for item in &decoded.entities {
                let expected = i64::from(item.id.get()) * 1000;
                assert_eq!(item.value, EntityValue::Numbers(vec![expected]));
                seen += 1;
            }
        }
        assert_eq!(seen, 60);
    }

    #[test]
    fn batch_drops_only_the_bad_entry() {
        let schema = schema();
        let hum = entity(3, "hum", &["uint8"]);
        let entries = [
            entry(&schema[0], -5),
            entry(&hum, 1000),
            entry(&schema[1], "ok"),
        ];

        let batch = encode_batch(&entries);
        assert_eq!(batch.frames.len(), 1);
        assert_eq!(batch.frames[0], reference_frame());
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, "hum");
        assert!(matches!(
            batch.rejected[0].1,
            FrameError::ValueOutOfRange { value: 1000, .. }
        ));
    }

    #[test]
    fn batch_rejects_a_single_oversized_record() {
        let schema = schema();
        let wide = entity(3, "blob", &["str", "uint16"]);
        let entries = [entry(&wide, "y".repeat(300)), entry(&schema[0], 7)];

        let batch = encode_batch(&entries);
        assert_eq!(batch.frames.len(), 1);
        assert_eq!(batch.frames[0].as_ref(), &[0xA0, 0x03, 0x06, 0x01, 0x00, 0x07, 0xA1]);
        assert!(matches!(
            batch.rejected.as_slice(),
            [(name, FrameError::FrameTooLarge(303))] if name == "blob"
        ));
    }

    #[test]
    fn empty_batch_has_no_frames() {
        let batch = encode_batch(&[]);
        assert!(batch.is_empty());
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(
            "Reject".parse::<UnknownEntityPolicy>(),
            Ok(UnknownEntityPolicy::Reject)
        );
        assert_eq!(
            "skip".parse::<UnknownEntityPolicy>(),
            Ok(UnknownEntityPolicy::Skip)
        );
        assert!("drop".parse::<UnknownEntityPolicy>().is_err());
    }
}
