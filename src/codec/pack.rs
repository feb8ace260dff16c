//! Big-endian packing of single integer fields.

use bytes::{Buf, BufMut, BytesMut};

use crate::domain::FieldType;

/// Appends `value` as `field`. The caller has already range-checked it.
pub(crate) fn put_field(buf: &mut BytesMut, field: FieldType, value: i64) {
    match field {
        FieldType::Uint8 => buf.put_u8(value as u8),
        FieldType::Int8 => buf.put_i8(value as i8),
        FieldType::Uint16 => buf.put_u16(value as u16),
        FieldType::Int16 => buf.put_i16(value as i16),
        FieldType::Uint32 => buf.put_u32(value as u32),
        FieldType::Int32 => buf.put_i32(value as i32),
    }
}

/// Reads one `field` from the front of `cursor`, or `None` if too few bytes remain.
pub(crate) fn get_field(cursor: &mut &[u8], field: FieldType) -> Option<i64> {
    if cursor.remaining() < field.width() {
        return None;
    }
    let value = match field {
        FieldType::Uint8 => i64::from(cursor.get_u8()),
        FieldType::Int8 => i64::from(cursor.get_i8()),
        FieldType::Uint16 => i64::from(cursor.get_u16()),
        FieldType::Int16 => i64::from(cursor.get_i16()),
        FieldType::Uint32 => i64::from(cursor.get_u32()),
        FieldType::Int32 => i64::from(cursor.get_i32()),
    };
    Some(value)
}
