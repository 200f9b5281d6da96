use crate::Buffer;

#[test]
fn test_buffer_new() {
    let buf = Buffer::new();
    assert_eq!(buf.size(), 0);
    assert!(buf.is_empty());
}

#[test]
fn test_reserve_and_advance() {
    let mut buf = Buffer::new();
    let window = buf.reserve(4);
    assert_eq!(window.len(), 4);
    window.copy_from_slice(b"ping");
    buf.advance_write(4);

    assert_eq!(buf.size(), 4);
    assert_eq!(buf.readable(), b"ping");
}

#[test]
fn test_read_and_consume() {
    let mut buf = Buffer::new();
    buf.write(b"hello world");

    assert_eq!(buf.read(5), Some(&b"hello"[..]));
    buf.consume(5);
    assert_eq!(buf.size(), 6);
    assert_eq!(buf.readable(), b" world");

    // Asking for more than is buffered reports insufficiency, not a panic.
    assert_eq!(buf.read(7), None);
}

#[test]
fn test_save_rewind() {
    let mut buf = Buffer::new();
    buf.write(b"keep");
    let cursor = buf.save();
    buf.write(b"drop me");
    buf.rewind(cursor);

    assert_eq!(buf.readable(), b"keep");
    buf.write(b"!");
    assert_eq!(buf.readable(), b"keep!");
}

#[test]
fn test_patch() {
    let mut buf = Buffer::new();
    let at = buf.save();
    buf.write(&[0, 0, 0, 0]);
    buf.write(b"body");
    buf.patch(at.0, &[9, 9, 9, 9]);

    assert_eq!(buf.readable(), &[9, 9, 9, 9, b'b', b'o', b'd', b'y'][..]);
}

#[test]
fn test_logical_positions_survive_reclaim() {
    let mut buf = Buffer::new();
    buf.write(&[1u8; 1000]);
    buf.consume(900);
    let pos = buf.write_pos();
    buf.write(&[2u8; 8]);

    // Trigger internal compaction via a growing reserve.
    let _ = buf.reserve(4096);

    assert_eq!(buf.slice(pos, 8), &[2u8; 8]);
    assert_eq!(buf.size(), 100 + 8);
}

#[test]
fn test_write_pos_monotonic() {
    let mut buf = Buffer::new();
    let first = buf.write_pos();
    buf.write(b"abc");
    assert_eq!(buf.write_pos(), first + 3);
    buf.consume(3);
    buf.write(b"d");
    assert_eq!(buf.write_pos(), first + 4);
}
