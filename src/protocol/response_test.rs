use crate::Buffer;
use crate::constant::{IPROTO_TYPE_ERROR, body, field, mp_error, sql_info};
use crate::error::Error;
use crate::msgpack::{Encode, Encoder};

use super::response::{decode_response, take_frame};

fn build_frame(f: impl FnOnce(&mut Encoder<'_>)) -> Vec<u8> {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    f(&mut enc);
    buf.readable().to_vec()
}

fn ok_header(enc: &mut Encoder<'_>, sync: u64) {
    enc.write_map(3);
    enc.write_uint(0);
    enc.write_uint(0);
    enc.write_uint(1);
    enc.write_uint(sync);
    enc.write_uint(5);
    enc.write_uint(77);
}

#[test]
fn test_ok_response_without_payload() {
    let frame = build_frame(|enc| {
        ok_header(enc, 5);
        enc.write_map(0);
    });

    let response = decode_response(frame).expect("decode");
    assert_eq!(response.header.code, 0);
    assert!(!response.header.is_error());
    assert_eq!(response.header.sync, 5);
    assert_eq!(response.header.schema_version, 77);
    assert!(response.body.data.is_none());
    assert!(response.body.error_stack.is_none());
}

#[test]
fn test_data_tuples_stay_views() {
    let frame = build_frame(|enc| {
        ok_header(enc, 1);
        enc.write_map(1);
        enc.write_uint(body::DATA as u64);
        enc.write_array(2);
        (666u32, "111", 1.01f64).encode(enc);
        (777u32, "asd", 2.02f64).encode(enc);
    });

    let response = decode_response(frame).expect("decode");
    let data = response.body.data.as_ref().expect("data");
    assert_eq!(data.dimension, 2);
    assert_eq!(data.tuples.len(), 2);
    assert!(data.sql_data.is_none());

    // Each view covers one whole tuple, starting at its array header.
    let first = response.tuple_bytes(data.tuples[0]);
    assert_eq!(first[0], 0x93);
    let second = response.tuple_bytes(data.tuples[1]);
    assert_eq!(second[0], 0x93);
    assert!(second.windows(3).any(|w| w == b"asd"));
}

#[test]
fn test_sql_metadata_columns() {
    let columns = [("COLUMN1", "unsigned"), ("COLUMN2", "string"), ("COLUMN3", "double")];
    let frame = build_frame(|enc| {
        ok_header(enc, 2);
        enc.write_map(1);
        enc.write_uint(body::METADATA as u64);
        enc.write_array(columns.len() as u32);
        for (name, ty) in columns {
            enc.write_map(2);
            enc.write_uint(field::NAME as u64);
            enc.write_str(name);
            enc.write_uint(field::TYPE as u64);
            enc.write_str(ty);
        }
    });

    let response = decode_response(frame).expect("decode");
    let data = response.body.data.as_ref().expect("data");
    let metadata = data
        .sql_data
        .as_ref()
        .and_then(|sql| sql.metadata.as_ref())
        .expect("metadata");

    assert_eq!(metadata.dimension, 3);
    assert_eq!(metadata.column_maps.len(), 3);
    for (map, (name, ty)) in metadata.column_maps.iter().zip(columns) {
        assert_eq!(response.str(map.field_name).expect("name"), name);
        assert_eq!(response.str(map.field_type).expect("type"), ty);
        assert!(!map.is_nullable);
        assert!(!map.is_autoincrement);
    }
}

#[test]
fn test_sql_metadata_flags_and_collation() {
    let frame = build_frame(|enc| {
        ok_header(enc, 3);
        enc.write_map(1);
        enc.write_uint(body::METADATA as u64);
        enc.write_array(1);
        enc.write_map(5);
        enc.write_uint(field::NAME as u64);
        enc.write_str("COLUMN2");
        enc.write_uint(field::TYPE as u64);
        enc.write_str("string");
        enc.write_uint(field::COLLATION as u64);
        enc.write_str("unicode_ci");
        enc.write_uint(field::IS_NULLABLE as u64);
        enc.write_bool(true);
        enc.write_uint(field::IS_AUTOINCREMENT as u64);
        enc.write_bool(true);
    });

    let response = decode_response(frame).expect("decode");
    let metadata = response
        .body
        .data
        .as_ref()
        .and_then(|d| d.sql_data.as_ref())
        .and_then(|s| s.metadata.as_ref())
        .expect("metadata");
    let map = &metadata.column_maps[0];
    assert_eq!(
        response.str(map.collation.expect("collation")).expect("str"),
        "unicode_ci"
    );
    assert!(map.is_nullable);
    assert!(map.is_autoincrement);
}

#[test]
fn test_sql_info_row_count_and_autoincrement() {
    let frame = build_frame(|enc| {
        ok_header(enc, 4);
        enc.write_map(1);
        enc.write_uint(body::SQL_INFO as u64);
        enc.write_map(2);
        enc.write_uint(sql_info::ROW_COUNT as u64);
        enc.write_uint(3);
        enc.write_uint(sql_info::AUTOINCREMENT_IDS as u64);
        enc.write_array(3);
        enc.write_uint(1);
        enc.write_uint(2);
        enc.write_uint(3);
    });

    let response = decode_response(frame).expect("decode");
    let info = response
        .body
        .data
        .as_ref()
        .and_then(|d| d.sql_data.as_ref())
        .and_then(|s| s.sql_info.as_ref())
        .expect("sql info");
    assert_eq!(info.row_count, 3);
    assert_eq!(info.autoincrement_ids, [1, 2, 3]);
}

#[test]
fn test_prepare_response() {
    let frame = build_frame(|enc| {
        ok_header(enc, 5);
        enc.write_map(2);
        enc.write_uint(body::STMT_ID as u64);
        enc.write_uint(42);
        enc.write_uint(body::BIND_COUNT as u64);
        enc.write_uint(9);
    });

    let response = decode_response(frame).expect("decode");
    let sql = response
        .body
        .data
        .as_ref()
        .and_then(|d| d.sql_data.as_ref())
        .expect("sql data");
    assert_eq!(sql.stmt_id, Some(42));
    assert_eq!(sql.bind_count, Some(9));
}

#[test]
fn test_error_stack() {
    let frame = build_frame(|enc| {
        enc.write_map(2);
        enc.write_uint(0);
        enc.write_uint((IPROTO_TYPE_ERROR | 3) as u64);
        enc.write_uint(1);
        enc.write_uint(7);

        enc.write_map(2);
        enc.write_uint(body::ERROR_24 as u64);
        enc.write_str("Duplicate key exists");
        enc.write_uint(body::ERROR as u64);
        enc.write_map(1);
        enc.write_uint(mp_error::STACK as u64);
        enc.write_array(1);
        enc.write_map(6);
        enc.write_uint(mp_error::TYPE as u64);
        enc.write_str("ClientError");
        enc.write_uint(mp_error::FILE as u64);
        enc.write_str("memtx_tree.cc");
        enc.write_uint(mp_error::LINE as u64);
        enc.write_uint(1442);
        enc.write_uint(mp_error::MESSAGE as u64);
        enc.write_str("Duplicate key exists");
        enc.write_uint(mp_error::ERRNO as u64);
        enc.write_uint(0);
        enc.write_uint(mp_error::ERRCODE as u64);
        enc.write_uint(3);
    });

    let response = decode_response(frame).expect("decode");
    assert!(response.header.is_error());
    assert_eq!(response.header.error_code(), 3);
    assert!(response.body.data.is_none());

    let stack = response.body.error_stack.as_ref().expect("stack");
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].msg, "Duplicate key exists");
    assert_eq!(stack[0].type_name, "ClientError");
    assert_eq!(stack[0].file, "memtx_tree.cc");
    assert_eq!(stack[0].line, 1442);
    assert_eq!(stack[0].errcode, 3);
}

#[test]
fn test_error24_synthesizes_stack() {
    let frame = build_frame(|enc| {
        enc.write_map(2);
        enc.write_uint(0);
        enc.write_uint((IPROTO_TYPE_ERROR | 10) as u64);
        enc.write_uint(1);
        enc.write_uint(8);
        enc.write_map(1);
        enc.write_uint(body::ERROR_24 as u64);
        enc.write_str("Space '666' does not exist");
    });

    let response = decode_response(frame).expect("decode");
    let stack = response.body.error_stack.as_ref().expect("stack");
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].msg, "Space '666' does not exist");
    assert_eq!(stack[0].errcode, 10);
}

#[test]
fn test_unknown_body_keys_skipped() {
    let frame = build_frame(|enc| {
        ok_header(enc, 9);
        enc.write_map(2);
        enc.write_uint(0x77);
        enc.write_map(2);
        enc.write_str("nested");
        enc.write_array(2);
        enc.write_uint(1);
        enc.write_uint(2);
        enc.write_str("more");
        enc.write_nil();
        enc.write_uint(body::DATA as u64);
        enc.write_array(1);
        (1u32,).encode(enc);
    });

    let response = decode_response(frame).expect("decode");
    let data = response.body.data.as_ref().expect("data");
    assert_eq!(data.dimension, 1);
}

#[test]
fn test_take_frame() {
    let mut wire = Buffer::new();
    let payload = build_frame(|enc| {
        ok_header(enc, 1);
        enc.write_map(0);
    });
    wire.write(&[0xce]);
    wire.write(&(payload.len() as u32).to_be_bytes());
    wire.write(&payload);

    let frame = take_frame(&mut wire, 1 << 20).expect("ok").expect("complete");
    assert_eq!(frame, payload);
    assert!(wire.is_empty());
}

#[test]
fn test_take_frame_prefix_needs_more() {
    let mut wire = Buffer::new();
    wire.write(&[0xce, 0, 0]);
    assert!(take_frame(&mut wire, 1 << 20).expect("ok").is_none());
    assert_eq!(wire.size(), 3);

    wire.write(&[0, 8, 0x82]);
    // Length arrived but the body is incomplete.
    assert!(take_frame(&mut wire, 1 << 20).expect("ok").is_none());
    assert_eq!(wire.size(), 6);
}

#[test]
fn test_take_frame_too_large() {
    let mut wire = Buffer::new();
    wire.write(&[0xce, 0xff, 0xff, 0xff, 0xff]);
    match take_frame(&mut wire, 1 << 20) {
        Err(Error::FrameTooLarge(len)) => assert_eq!(len, 0xffff_ffff),
        other => panic!("expected FrameTooLarge, got {:?}", other),
    }
}

#[test]
fn test_truncated_frame_is_bad_msgpack() {
    // Header map claims two entries but the frame ends early.
    let frame = vec![0x82, 0x00, 0x00];
    assert!(matches!(decode_response(frame), Err(Error::BadMsgpack)));
}
