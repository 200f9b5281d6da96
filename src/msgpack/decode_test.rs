use crate::Buffer;

use super::{DecodeError, Decoder, Encode, Encoder, Family, ReadResult, Reader, Value};

fn encoded(f: impl FnOnce(&mut Encoder<'_>)) -> Vec<u8> {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    f(&mut enc);
    buf.readable().to_vec()
}

/// Collects every scalar it sees, recursing into containers.
#[derive(Default)]
struct Collect {
    values: Vec<Value>,
}

impl Reader for Collect {
    fn on_nil(&mut self) -> ReadResult {
        self.values.push(Value::Nil);
        Ok(())
    }
    fn on_bool(&mut self, v: bool) -> ReadResult {
        self.values.push(Value::Bool(v));
        Ok(())
    }
    fn on_uint(&mut self, v: u64) -> ReadResult {
        self.values.push(Value::Uint(v));
        Ok(())
    }
    fn on_int(&mut self, v: i64) -> ReadResult {
        self.values.push(Value::Int(v));
        Ok(())
    }
    fn on_float(&mut self, v: f32) -> ReadResult {
        self.values.push(Value::Float(v));
        Ok(())
    }
    fn on_double(&mut self, v: f64) -> ReadResult {
        self.values.push(Value::Double(v));
        Ok(())
    }
    fn on_str(&mut self, view: super::StrView, _data: &[u8]) -> ReadResult {
        self.values.push(Value::Str(view));
        Ok(())
    }
    fn on_array(&mut self, dec: &mut Decoder<'_>, count: u32) -> ReadResult {
        for _ in 0..count {
            dec.decode(self)?;
        }
        Ok(())
    }
    fn on_map(&mut self, dec: &mut Decoder<'_>, count: u32) -> ReadResult {
        for _ in 0..count as u64 * 2 {
            dec.decode(self)?;
        }
        Ok(())
    }
}

#[test]
fn test_roundtrip_scalars() {
    let bytes = encoded(|e| {
        e.write_array(7);
        e.write_nil();
        e.write_bool(true);
        e.write_uint(777);
        e.write_int(-5);
        e.write_float(1.5);
        e.write_double(2.022);
        e.write_str("insert");
    });

    let mut dec = Decoder::new(&bytes);
    let mut collect = Collect::default();
    assert_eq!(dec.decode(&mut collect), Ok(()));
    assert!(dec.is_empty());

    assert_eq!(collect.values.len(), 7);
    assert_eq!(collect.values[0], Value::Nil);
    assert_eq!(collect.values[1], Value::Bool(true));
    assert_eq!(collect.values[2], Value::Uint(777));
    assert_eq!(collect.values[3], Value::Int(-5));
    assert_eq!(collect.values[4], Value::Float(1.5));
    assert_eq!(collect.values[5], Value::Double(2.022));
    match collect.values[6] {
        Value::Str(view) => assert_eq!(view.bytes(&bytes), b"insert"),
        other => panic!("expected str, got {:?}", other),
    }
}

#[test]
fn test_need_more_consumes_nothing() {
    let bytes = encoded(|e| {
        e.write_array(2);
        e.write_uint(1);
        e.write_str("truncated payload");
    });

    // Every proper prefix must report NeedMore and leave the cursor alone.
    for cut in 0..bytes.len() {
        let mut dec = Decoder::new(&bytes[..cut]);
        let mut collect = Collect::default();
        assert_eq!(dec.decode(&mut collect), Err(DecodeError::NeedMore), "cut at {cut}");
        assert_eq!(dec.position(), 0, "cut at {cut}");
    }

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.decode(&mut Collect::default()), Ok(()));
}

#[test]
fn test_wrong_type() {
    struct IntOnly;
    impl Reader for IntOnly {
        fn allowed(&self) -> Family {
            Family::INT
        }
    }

    let bytes = encoded(|e| e.write_str("nope"));
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.decode(&mut IntOnly), Err(DecodeError::WrongType));
    assert_eq!(dec.position(), 0);

    let bytes = encoded(|e| e.write_uint(9));
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.decode(&mut IntOnly), Ok(()));
}

#[test]
fn test_invalid_type_byte() {
    let mut dec = Decoder::new(&[0xc1]);
    assert_eq!(
        dec.decode(&mut Collect::default()),
        Err(DecodeError::BadMsgpack)
    );
}

#[test]
fn test_max_depth() {
    // 200 nested single-element arrays around one integer.
    let mut bytes = vec![0x91u8; 200];
    bytes.push(0x00);

    let mut dec = Decoder::new(&bytes);
    assert_eq!(
        dec.decode(&mut Collect::default()),
        Err(DecodeError::MaxDepthReached)
    );

    // Shallow nesting passes.
    let mut bytes = vec![0x91u8; 100];
    bytes.push(0x00);
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.decode(&mut Collect::default()), Ok(()));
}

#[test]
fn test_skip_value() {
    let bytes = encoded(|e| {
        e.write_map(2);
        e.write_uint(1);
        e.write_array(3);
        e.write_str("a");
        e.write_str("b");
        e.write_str("c");
        e.write_uint(2);
        e.write_nil();
        e.write_uint(42);
    });

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.skip_value(), Ok(()));
    assert_eq!(dec.expect_uint(), Ok(42));
    assert!(dec.is_empty());
}

#[test]
fn test_value_span_covers_whole_tuple() {
    let bytes = encoded(|e| {
        (666u32, "111", 1.01f64).encode(e);
        e.write_uint(9);
    });

    let mut dec = Decoder::new(&bytes);
    let (offset, size) = dec.value_span().expect("span");
    assert_eq!(offset, 0);
    assert_eq!(&bytes[offset as usize..(offset + size) as usize], &bytes[..size as usize]);
    assert_eq!(dec.expect_uint(), Ok(9));
}

#[test]
fn test_ext_surfaced_raw() {
    let bytes = encoded(|e| e.write_ext(-4, &[1, 2, 3, 4, 5]));
    let mut dec = Decoder::new(&bytes);
    match dec.value().expect("ext") {
        Value::Ext(view) => {
            assert_eq!(view.ext_type, -4);
            assert_eq!(view.bytes(&bytes), &[1, 2, 3, 4, 5]);
        }
        other => panic!("expected ext, got {:?}", other),
    }
}

#[test]
fn test_cursor_reads() {
    let bytes = encoded(|e| {
        e.write_map(1);
        e.write_uint(48);
        e.write_array(2);
        e.write_uint(10);
        e.write_uint(20);
    });

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.expect_map(), Ok(1));
    assert_eq!(dec.expect_uint(), Ok(48));
    assert_eq!(dec.expect_array(), Ok(2));
    assert_eq!(dec.expect_uint(), Ok(10));
    assert_eq!(dec.expect_uint(), Ok(20));
    assert!(dec.is_empty());
}

#[test]
fn test_negative_fixint_family() {
    let mut dec = Decoder::new(&[0xe0]);
    assert_eq!(dec.value(), Ok(Value::Int(-32)));
}
