//! Self-describing row blobs.
//!
//! Layout: `utf row_key`, `i32 count`, then `count` entries of
//! `utf name, i32 wire_id, payload`, then an optional `utf type_tag`.
//! Tombstones are never written.

use crate::codec::data::{DataRead, DataWrite};
use crate::error::SparseError;
use crate::types::payload::{self, CodecContext};
use crate::types::registry::{TypeRegistry, type_by_id};
use crate::types::value::PropertyMap;
use std::io::{Cursor, Read, Write};
use tracing::debug;

/// Streams one row. The tag is written when given; framed streams such as the
/// redo log always pass one.
pub fn write_row<W: Write + ?Sized>(
    w: &mut W,
    ctx: &CodecContext<'_>,
    row_key: &str,
    map: &PropertyMap,
    type_tag: Option<&str>,
) -> Result<(), SparseError> {
    let registry = TypeRegistry::global();
    let live = map.values().filter(|v| !v.is_removed()).count();
    w.write_utf(row_key)?;
    w.write_len(live)?;
    for (name, value) in map {
        if value.is_removed() {
            continue;
        }
        let type_id = ctx.type_of(value)?;
        w.write_utf(name)?;
        w.write_i32_be(registry.wire_id(type_id))?;
        payload::save(w, type_id, value, ctx)?;
    }
    if let Some(tag) = type_tag {
        w.write_utf(tag)?;
    }
    Ok(())
}

pub fn encode_row(
    ctx: &CodecContext<'_>,
    row_key: &str,
    map: &PropertyMap,
    type_tag: Option<&str>,
) -> Result<Vec<u8>, SparseError> {
    let mut out = Vec::with_capacity(64 + map.len() * 32);
    write_row(&mut out, ctx, row_key, map, type_tag)?;
    Ok(out)
}

fn read_body<R: Read + ?Sized>(
    r: &mut R,
    ctx: &CodecContext<'_>,
    row_key: &str,
) -> Result<PropertyMap, SparseError> {
    let actual = r.read_utf()?;
    if actual != row_key {
        return Err(SparseError::RowKeyMismatch {
            expected: row_key.to_string(),
            actual,
        });
    }
    let count = r.read_len()?;
    let mut map = PropertyMap::new();
    for _ in 0..count {
        let name = r.read_utf()?;
        let type_id = type_by_id(r.read_i32_be()?);
        let value = payload::load(r, type_id, ctx)?;
        map.insert(name, value);
    }
    Ok(map)
}

fn check_tag(expected: Option<&str>, actual: String) -> Result<String, SparseError> {
    match expected {
        Some(expected) if expected != actual => Err(SparseError::TypeTagMismatch {
            expected: expected.to_string(),
            actual,
        }),
        _ => Ok(actual),
    }
}

/// Reads one row from a framed stream where the trailing tag is always
/// present. Returns the map and the tag that was read.
pub fn read_row<R: Read + ?Sized>(
    r: &mut R,
    ctx: &CodecContext<'_>,
    row_key: &str,
    expected_tag: Option<&str>,
) -> Result<(PropertyMap, String), SparseError> {
    let map = read_body(r, ctx, row_key)?;
    let tag = check_tag(expected_tag, r.read_utf()?)?;
    Ok((map, tag))
}

/// Decodes a stand-alone blob. Blobs written without a tag are accepted.
pub fn decode_row(
    ctx: &CodecContext<'_>,
    row_key: &str,
    bytes: &[u8],
    expected_tag: Option<&str>,
) -> Result<PropertyMap, SparseError> {
    let mut cursor = Cursor::new(bytes);
    let map = read_body(&mut cursor, ctx, row_key)?;
    if cursor.position() as usize == bytes.len() {
        debug!(row_key, "row blob has no trailing type tag");
        return Ok(map);
    }
    check_tag(expected_tag, cursor.read_utf()?)?;
    if (cursor.position() as usize) < bytes.len() {
        return Err(SparseError::Decode(format!(
            "{} trailing bytes after row '{row_key}'",
            bytes.len() - cursor.position() as usize
        )));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::{decode_row, encode_row, read_row, write_row};
    use crate::codec::data::DataWrite;
    use crate::types::payload::CodecContext;
    use crate::types::value::{PropertyMap, Value};
    use std::io::Cursor;

    fn sample() -> PropertyMap {
        let mut map = PropertyMap::new();
        map.insert("title".into(), Value::from("Hello"));
        map.insert("count".into(), Value::Long(i64::MAX));
        map.insert("tags".into(), Value::from(&["a", "b"][..]));
        map
    }

    #[test]
    fn blob_round_trips_with_and_without_tag() {
        let ctx = CodecContext::inline_only();
        let map = sample();
        let tagged = encode_row(&ctx, "row-1", &map, Some("cn")).expect("encode");
        assert_eq!(decode_row(&ctx, "row-1", &tagged, Some("cn")).expect("decode"), map);

        let untagged = encode_row(&ctx, "row-1", &map, None).expect("encode");
        assert_eq!(decode_row(&ctx, "row-1", &untagged, Some("cn")).expect("decode"), map);
        assert!(untagged.len() < tagged.len());
    }

    #[test]
    fn tombstones_are_not_counted_or_written() {
        let ctx = CodecContext::inline_only();
        let mut map = sample();
        map.insert("gone".into(), Value::Removed);
        let bytes = encode_row(&ctx, "k", &map, None).expect("encode");
        // utf "k" is 3 bytes, then the count
        assert_eq!(&bytes[3..7], &3i32.to_be_bytes());
        let decoded = decode_row(&ctx, "k", &bytes, None).expect("decode");
        assert!(!decoded.contains_key("gone"));
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn wrong_row_key_is_rejected() {
        let ctx = CodecContext::inline_only();
        let bytes = encode_row(&ctx, "row-1", &sample(), Some("cn")).expect("encode");
        let err = decode_row(&ctx, "row-2", &bytes, Some("cn")).expect_err("mismatch");
        assert_eq!(err.code_str(), "row_key_mismatch");
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn wrong_type_tag_is_rejected() {
        let ctx = CodecContext::inline_only();
        let bytes = encode_row(&ctx, "row-1", &sample(), Some("cn")).expect("encode");
        let err = decode_row(&ctx, "row-1", &bytes, Some("ac")).expect_err("mismatch");
        assert_eq!(err.code_str(), "type_tag_mismatch");
        // no expectation means any tag is fine
        decode_row(&ctx, "row-1", &bytes, None).expect("any tag");
    }

    #[test]
    fn wire_layout_is_stable() {
        let ctx = CodecContext::inline_only();
        let mut map = PropertyMap::new();
        map.insert("n".into(), Value::Integer(7));
        let bytes = encode_row(&ctx, "r", &map, Some("t")).expect("encode");
        let expected: Vec<u8> = vec![
            0, 1, b'r', // row key
            0, 0, 0, 1, // count
            0, 1, b'n', // name
            0, 0, 0, 1, // integer wire id
            0, 0, 0, 7, // payload
            0, 1, b't', // tag
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn streamed_rows_read_back_in_sequence() {
        let ctx = CodecContext::inline_only();
        let mut out = Vec::new();
        write_row(&mut out, &ctx, "a", &sample(), Some("cn")).expect("a");
        write_row(&mut out, &ctx, "b", &PropertyMap::new(), Some("ac")).expect("b");
        let mut cursor = Cursor::new(out);
        let (first, tag) = read_row(&mut cursor, &ctx, "a", None).expect("a");
        assert_eq!((first, tag.as_str()), (sample(), "cn"));
        let (second, tag) = read_row(&mut cursor, &ctx, "b", Some("ac")).expect("b");
        assert!(second.is_empty());
        assert_eq!(tag, "ac");
    }

    #[test]
    fn garbage_after_tag_is_corruption() {
        let ctx = CodecContext::inline_only();
        let mut bytes = encode_row(&ctx, "r", &sample(), Some("cn")).expect("encode");
        bytes.write_i32_be(0).expect("junk");
        let err = decode_row(&ctx, "r", &bytes, Some("cn")).expect_err("junk");
        assert_eq!(err.code_str(), "decode");
    }
}
