//! Shared byte encoding for [`Value`], used by both the node column store
//! and the rel-table property store to give their page-serialized forms one
//! common representation (spec §4.3 durability).

use vxdb_types::{InternalId, LogicalTypeID, Value};

fn logical_type_tag(t: LogicalTypeID) -> u8 {
    match t {
        LogicalTypeID::Int16 => 0,
        LogicalTypeID::Int32 => 1,
        LogicalTypeID::Int64 => 2,
        LogicalTypeID::Float => 3,
        LogicalTypeID::Double => 4,
        LogicalTypeID::String => 5,
        LogicalTypeID::Serial => 6,
        LogicalTypeID::InternalId => 7,
    }
}

pub fn logical_type_from_tag(tag: u8) -> LogicalTypeID {
    match tag {
        0 => LogicalTypeID::Int16,
        1 => LogicalTypeID::Int32,
        2 => LogicalTypeID::Int64,
        3 => LogicalTypeID::Float,
        4 => LogicalTypeID::Double,
        5 => LogicalTypeID::String,
        6 => LogicalTypeID::Serial,
        7 => LogicalTypeID::InternalId,
        other => panic!("unknown logical type tag {other}"),
    }
}

pub fn encode_logical_type(buf: &mut Vec<u8>, t: LogicalTypeID) {
    buf.push(logical_type_tag(t));
}

pub fn decode_logical_type(bytes: &[u8], pos: &mut usize) -> LogicalTypeID {
    let tag = bytes[*pos];
    *pos += 1;
    logical_type_from_tag(tag)
}

/// Append `value`'s page-serialized form to `buf`: a tag byte, then a fixed
/// payload (or a `u32` length prefix plus bytes for `String`).
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.push(0),
        Value::Int16(v) => {
            buf.push(1);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Int32(v) => {
            buf.push(2);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Int64(v) => {
            buf.push(3);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float(v) => {
            buf.push(4);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Double(v) => {
            buf.push(5);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::String(bytes) => {
            buf.push(6);
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        Value::Serial(v) => {
            buf.push(7);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::InternalId(id) => {
            buf.push(8);
            buf.extend_from_slice(&id.table_id.to_le_bytes());
            buf.extend_from_slice(&id.offset.to_le_bytes());
        }
    }
}

/// Decode a value previously written by [`encode_value`], advancing `pos`
/// past the bytes consumed.
pub fn decode_value(bytes: &[u8], pos: &mut usize) -> Value {
    let tag = bytes[*pos];
    *pos += 1;
    match tag {
        0 => Value::Null,
        1 => {
            let v = i16::from_le_bytes(bytes[*pos..*pos + 2].try_into().unwrap());
            *pos += 2;
            Value::Int16(v)
        }
        2 => {
            let v = i32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            Value::Int32(v)
        }
        3 => {
            let v = i64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Value::Int64(v)
        }
        4 => {
            let v = f32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            Value::Float(v)
        }
        5 => {
            let v = f64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Value::Double(v)
        }
        6 => {
            let len = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            let v = bytes[*pos..*pos + len].to_vec();
            *pos += len;
            Value::String(v)
        }
        7 => {
            let v = i64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Value::Serial(v)
        }
        8 => {
            let table_id = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            let offset = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Value::InternalId(InternalId::new(table_id, offset))
        }
        other => panic!("unknown value tag {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_value_variant_round_trips() {
        let values = vec![
            Value::Null,
            Value::Int16(-7),
            Value::Int32(1234),
            Value::Int64(-99999),
            Value::Float(1.5),
            Value::Double(-2.25),
            Value::String(b"hello".to_vec()),
            Value::Serial(42),
            Value::InternalId(InternalId::new(3, 9)),
        ];
        let mut buf = Vec::new();
        for v in &values {
            encode_value(&mut buf, v);
        }
        let mut pos = 0;
        for v in &values {
            assert_eq!(&decode_value(&buf, &mut pos), v);
        }
        assert_eq!(pos, buf.len());
    }
}
