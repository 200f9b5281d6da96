use crate::buffer::{Buffer, WriteCursor};

/// Typed MsgPack encoder writing into a [`Buffer`].
///
/// Numeric writers always pick the narrowest wire form. Container headers
/// take the final element count up front; when the count is only known after
/// the elements are written, reserve a fixed-width header with
/// [`Encoder::write_array_reserved`] / [`Encoder::write_map_reserved`] and
/// patch it on close.
pub struct Encoder<'a> {
    buf: &'a mut Buffer,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut Buffer) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn buffer(&mut self) -> &mut Buffer {
        self.buf
    }

    pub fn write_nil(&mut self) {
        self.buf.write(&[0xc0]);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.write(&[if value { 0xc3 } else { 0xc2 }]);
    }

    pub fn write_uint(&mut self, value: u64) {
        if value < 0x80 {
            self.buf.write(&[value as u8]);
        } else if value <= u8::MAX as u64 {
            self.buf.write(&[0xcc, value as u8]);
        } else if value <= u16::MAX as u64 {
            let b = (value as u16).to_be_bytes();
            self.buf.write(&[0xcd, b[0], b[1]]);
        } else if value <= u32::MAX as u64 {
            let mut frame = [0xce, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&(value as u32).to_be_bytes());
            self.buf.write(&frame);
        } else {
            let mut frame = [0xcf, 0, 0, 0, 0, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&value.to_be_bytes());
            self.buf.write(&frame);
        }
    }

    pub fn write_int(&mut self, value: i64) {
        if value >= 0 {
            self.write_uint(value as u64);
        } else if value >= -32 {
            self.buf.write(&[value as u8]);
        } else if value >= i8::MIN as i64 {
            self.buf.write(&[0xd0, value as u8]);
        } else if value >= i16::MIN as i64 {
            let b = (value as i16).to_be_bytes();
            self.buf.write(&[0xd1, b[0], b[1]]);
        } else if value >= i32::MIN as i64 {
            let mut frame = [0xd2, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&(value as i32).to_be_bytes());
            self.buf.write(&frame);
        } else {
            let mut frame = [0xd3, 0, 0, 0, 0, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&value.to_be_bytes());
            self.buf.write(&frame);
        }
    }

    pub fn write_float(&mut self, value: f32) {
        let mut frame = [0xca, 0, 0, 0, 0];
        frame[1..].copy_from_slice(&value.to_bits().to_be_bytes());
        self.buf.write(&frame);
    }

    pub fn write_double(&mut self, value: f64) {
        let mut frame = [0xcb, 0, 0, 0, 0, 0, 0, 0, 0];
        frame[1..].copy_from_slice(&value.to_bits().to_be_bytes());
        self.buf.write(&frame);
    }

    pub fn write_str(&mut self, value: &str) {
        let len = value.len();
        if len < 32 {
            self.buf.write(&[0xa0 | len as u8]);
        } else if len <= u8::MAX as usize {
            self.buf.write(&[0xd9, len as u8]);
        } else if len <= u16::MAX as usize {
            let b = (len as u16).to_be_bytes();
            self.buf.write(&[0xda, b[0], b[1]]);
        } else {
            let mut frame = [0xdb, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&(len as u32).to_be_bytes());
            self.buf.write(&frame);
        }
        self.buf.write(value.as_bytes());
    }

    pub fn write_bin(&mut self, value: &[u8]) {
        let len = value.len();
        if len <= u8::MAX as usize {
            self.buf.write(&[0xc4, len as u8]);
        } else if len <= u16::MAX as usize {
            let b = (len as u16).to_be_bytes();
            self.buf.write(&[0xc5, b[0], b[1]]);
        } else {
            let mut frame = [0xc6, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&(len as u32).to_be_bytes());
            self.buf.write(&frame);
        }
        self.buf.write(value);
    }

    pub fn write_array(&mut self, count: u32) {
        if count < 16 {
            self.buf.write(&[0x90 | count as u8]);
        } else if count <= u16::MAX as u32 {
            let b = (count as u16).to_be_bytes();
            self.buf.write(&[0xdc, b[0], b[1]]);
        } else {
            let mut frame = [0xdd, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&count.to_be_bytes());
            self.buf.write(&frame);
        }
    }

    pub fn write_map(&mut self, count: u32) {
        if count < 16 {
            self.buf.write(&[0x80 | count as u8]);
        } else if count <= u16::MAX as u32 {
            let b = (count as u16).to_be_bytes();
            self.buf.write(&[0xde, b[0], b[1]]);
        } else {
            let mut frame = [0xdf, 0, 0, 0, 0];
            frame[1..].copy_from_slice(&count.to_be_bytes());
            self.buf.write(&frame);
        }
    }

    pub fn write_ext(&mut self, ext_type: i8, data: &[u8]) {
        match data.len() {
            1 => self.buf.write(&[0xd4, ext_type as u8]),
            2 => self.buf.write(&[0xd5, ext_type as u8]),
            4 => self.buf.write(&[0xd6, ext_type as u8]),
            8 => self.buf.write(&[0xd7, ext_type as u8]),
            16 => self.buf.write(&[0xd8, ext_type as u8]),
            len if len <= u8::MAX as usize => {
                self.buf.write(&[0xc7, len as u8, ext_type as u8]);
            }
            len if len <= u16::MAX as usize => {
                let b = (len as u16).to_be_bytes();
                self.buf.write(&[0xc8, b[0], b[1], ext_type as u8]);
            }
            len => {
                let mut frame = [0xc9, 0, 0, 0, 0, 0];
                frame[1..5].copy_from_slice(&(len as u32).to_be_bytes());
                frame[5] = ext_type as u8;
                self.buf.write(&frame);
            }
        }
        self.buf.write(data);
    }

    /// Append pre-encoded MsgPack bytes verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.write(bytes);
    }

    /// Write a fixed-width arr32 header with a zero count, returning a cursor
    /// to patch via [`Encoder::patch_array`] once the count is known.
    pub fn write_array_reserved(&mut self) -> WriteCursor {
        let at = self.buf.save();
        self.buf.write(&[0xdd, 0, 0, 0, 0]);
        at
    }

    pub fn patch_array(&mut self, at: WriteCursor, count: u32) {
        let mut frame = [0xdd, 0, 0, 0, 0];
        frame[1..].copy_from_slice(&count.to_be_bytes());
        self.buf.patch(at.0, &frame);
    }

    /// Write a fixed-width map32 header with a zero count, to be patched via
    /// [`Encoder::patch_map`].
    pub fn write_map_reserved(&mut self) -> WriteCursor {
        let at = self.buf.save();
        self.buf.write(&[0xdf, 0, 0, 0, 0]);
        at
    }

    pub fn patch_map(&mut self, at: WriteCursor, count: u32) {
        let mut frame = [0xdf, 0, 0, 0, 0];
        frame[1..].copy_from_slice(&count.to_be_bytes());
        self.buf.patch(at.0, &frame);
    }
}

/// Binary payload wrapper: `Bin(&bytes)` encodes as MsgPack bin, while plain
/// byte slices encode as arrays of integers like any other slice.
pub struct Bin<'a>(pub &'a [u8]);

/// A value that knows its own MsgPack form.
///
/// Implemented for scalars, strings, options, slices and tuples up to arity
/// ten, so application tuples, keys and update op lists encode directly.
pub trait Encode {
    fn encode(&self, enc: &mut Encoder<'_>);
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, enc: &mut Encoder<'_>) {
        (**self).encode(enc);
    }
}

macro_rules! impl_encode_uint {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            fn encode(&self, enc: &mut Encoder<'_>) {
                enc.write_uint(*self as u64);
            }
        }
    )*};
}

macro_rules! impl_encode_int {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            fn encode(&self, enc: &mut Encoder<'_>) {
                enc.write_int(*self as i64);
            }
        }
    )*};
}

impl_encode_uint!(u8, u16, u32, u64);
impl_encode_int!(i8, i16, i32, i64);

impl Encode for bool {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_bool(*self);
    }
}

impl Encode for f32 {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_float(*self);
    }
}

impl Encode for f64 {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_double(*self);
    }
}

impl Encode for str {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_str(self);
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_str(self);
    }
}

impl Encode for Bin<'_> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_bin(self.0);
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        match self {
            Some(value) => value.encode(enc),
            None => enc.write_nil(),
        }
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_array(self.len() as u32);
        for item in self {
            item.encode(enc);
        }
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self[..].encode(enc);
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self[..].encode(enc);
    }
}

impl Encode for () {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.write_array(0);
    }
}

macro_rules! impl_encode_tuple {
    ($count:literal; $($name:ident : $idx:tt),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, enc: &mut Encoder<'_>) {
                enc.write_array($count);
                $(self.$idx.encode(enc);)+
            }
        }
    };
}

impl_encode_tuple!(1; A:0);
impl_encode_tuple!(2; A:0, B:1);
impl_encode_tuple!(3; A:0, B:1, C:2);
impl_encode_tuple!(4; A:0, B:1, C:2, D:3);
impl_encode_tuple!(5; A:0, B:1, C:2, D:3, E:4);
impl_encode_tuple!(6; A:0, B:1, C:2, D:3, E:4, F:5);
impl_encode_tuple!(7; A:0, B:1, C:2, D:3, E:4, F:5, G:6);
impl_encode_tuple!(8; A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7);
impl_encode_tuple!(9; A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8);
impl_encode_tuple!(10; A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7, I:8, J:9);
