//! NPY v1.0 header parsing (spec §6).
//!
//! The header is a Python dict literal; rather than pull in a general
//! Python-literal parser for three fixed keys, this hand-rolls the narrow
//! grammar the format actually uses (`descr`, `fortran_order`, `shape`).

use vxdb_error::{Result, VxError};
use vxdb_types::LogicalTypeID;

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Clone, Debug)]
pub struct NpyHeader {
    pub logical_type: LogicalTypeID,
    pub shape: Vec<usize>,
    pub data_offset: usize,
}

impl NpyHeader {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

fn dtype_to_logical_type(descr: &str) -> Result<LogicalTypeID> {
    let host_is_little_endian = cfg!(target_endian = "little");
    let (byte_order, code) = descr.split_at(1);
    match byte_order {
        "<" if !host_is_little_endian => {
            return Err(VxError::malformed(format!(
                "dtype {descr:?} is little-endian but host is big-endian"
            )))
        }
        ">" if host_is_little_endian => {
            return Err(VxError::malformed(format!(
                "dtype {descr:?} is big-endian but host is little-endian"
            )))
        }
        "<" | ">" | "|" | "=" => {}
        _ => return Err(VxError::malformed(format!("unrecognized dtype prefix in {descr:?}"))),
    }
    match code {
        "f8" => Ok(LogicalTypeID::Double),
        "f4" => Ok(LogicalTypeID::Float),
        "i8" => Ok(LogicalTypeID::Int64),
        "i4" => Ok(LogicalTypeID::Int32),
        "i2" => Ok(LogicalTypeID::Int16),
        other => Err(VxError::malformed(format!("unsupported dtype code {other:?}"))),
    }
}

fn extract_quoted_value(dict: &str, key: &str) -> Result<String> {
    let marker = format!("'{key}'");
    let key_pos = dict
        .find(&marker)
        .ok_or_else(|| VxError::malformed(format!("header missing key {key:?}")))?;
    let after_key = &dict[key_pos + marker.len()..];
    let colon = after_key
        .find(':')
        .ok_or_else(|| VxError::malformed(format!("malformed entry for key {key:?}")))?;
    let after_colon = after_key[colon + 1..].trim_start();
    let quote = after_colon
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| VxError::malformed(format!("expected quoted string value for key {key:?}")))?;
    let rest = &after_colon[1..];
    let end = rest
        .find(quote)
        .ok_or_else(|| VxError::malformed(format!("unterminated string value for key {key:?}")))?;
    Ok(rest[..end].to_owned())
}

fn extract_bool_value(dict: &str, key: &str) -> Result<bool> {
    let marker = format!("'{key}'");
    let key_pos = dict
        .find(&marker)
        .ok_or_else(|| VxError::malformed(format!("header missing key {key:?}")))?;
    let after_key = &dict[key_pos + marker.len()..];
    let colon = after_key
        .find(':')
        .ok_or_else(|| VxError::malformed(format!("malformed entry for key {key:?}")))?;
    let after_colon = after_key[colon + 1..].trim_start();
    if let Some(rest) = after_colon.strip_prefix("True") {
        let _ = rest;
        Ok(true)
    } else if let Some(rest) = after_colon.strip_prefix("False") {
        let _ = rest;
        Ok(false)
    } else {
        Err(VxError::malformed(format!("expected True/False for key {key:?}")))
    }
}

fn extract_shape(dict: &str) -> Result<Vec<usize>> {
    let marker = "'shape'";
    let key_pos = dict
        .find(marker)
        .ok_or_else(|| VxError::malformed("header missing key \"shape\""))?;
    let after_key = &dict[key_pos + marker.len()..];
    let colon = after_key
        .find(':')
        .ok_or_else(|| VxError::malformed("malformed shape entry"))?;
    let after_colon = after_key[colon + 1..].trim_start();
    let open = after_colon
        .find('(')
        .ok_or_else(|| VxError::malformed("shape value is not a tuple literal"))?;
    let close = after_colon[open..]
        .find(')')
        .map(|p| p + open)
        .ok_or_else(|| VxError::malformed("unterminated shape tuple"))?;
    let inner = &after_colon[open + 1..close];
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| VxError::malformed(format!("non-integer shape component {s:?}")))
        })
        .collect()
}

/// Parse the fixed NPY v1.0 preamble and header dict, returning the typed
/// interpretation this crate cares about plus the byte offset data starts
/// at.
pub fn parse_header(bytes: &[u8]) -> Result<NpyHeader> {
    if bytes.len() < 10 || &bytes[0..6] != MAGIC {
        return Err(VxError::malformed("missing \\x93NUMPY magic"));
    }
    let major = bytes[6];
    let minor = bytes[7];
    if major != 1 || minor != 0 {
        return Err(VxError::malformed(format!(
            "unsupported NPY version {major}.{minor}; only v1.0 is supported"
        )));
    }
    let raw_len = [bytes[8], bytes[9]];
    let header_len = u16::from_le_bytes(raw_len) as usize;

    let dict_start = 10;
    let dict_end = dict_start + header_len;
    if bytes.len() < dict_end {
        return Err(VxError::malformed("header length exceeds file size"));
    }
    let dict = std::str::from_utf8(&bytes[dict_start..dict_end])
        .map_err(|_| VxError::malformed("header dict is not valid UTF-8"))?;

    let descr = extract_quoted_value(dict, "descr")?;
    let fortran_order = extract_bool_value(dict, "fortran_order")?;
    if fortran_order {
        return Err(VxError::malformed("fortran_order=True is not supported"));
    }
    let shape = extract_shape(dict)?;
    let logical_type = dtype_to_logical_type(&descr)?;

    Ok(NpyHeader {
        logical_type,
        shape,
        data_offset: dict_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_file(descr: &str, fortran_order: bool, shape: &str, data: &[u8]) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '{descr}', 'fortran_order': {}, 'shape': {shape}, }}",
            if fortran_order { "True" } else { "False" }
        );
        let mut header = dict.into_bytes();
        // Pad so (10 + header_len) is a multiple of 64, NumPy-style, then
        // terminate with a newline as real NPY files do.
        header.push(b'\n');
        let total_preamble = 10 + header.len();
        let pad = (64 - total_preamble % 64) % 64;
        header.extend(std::iter::repeat(b' ').take(pad));
        if let Some(last) = header.last_mut() {
            *last = b'\n';
        }
        let header_len = header.len() as u16;

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(1);
        out.push(0);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn happy_path_int64() {
        let data: Vec<u8> = [10_i64, 20, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
        let file = build_file("<i8", false, "(3,)", &data);
        let header = parse_header(&file).unwrap();
        assert_eq!(header.logical_type, LogicalTypeID::Int64);
        assert_eq!(header.shape, vec![3]);
        let row_bytes = &file[header.data_offset..];
        let values: Vec<i64> = row_bytes
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn fortran_order_is_rejected() {
        let file = build_file("<i8", true, "(3,)", &[]);
        let err = parse_header(&file).unwrap_err();
        assert!(matches!(err, VxError::MalformedInput { .. }));
    }

    #[test]
    fn endianness_mismatch_is_rejected_on_little_endian_host() {
        if cfg!(target_endian = "little") {
            let file = build_file(">f8", false, "(1,)", &[0; 8]);
            let err = parse_header(&file).unwrap_err();
            assert!(matches!(err, VxError::MalformedInput { .. }));
        }
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut file = build_file("<i8", false, "(1,)", &[0; 8]);
        file[6] = 2; // major version 2
        let err = parse_header(&file).unwrap_err();
        assert!(matches!(err, VxError::MalformedInput { .. }));
    }
}
