use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{U16 as U16BE, U32 as U32BE, U64 as U64BE};

use super::value::{ArrView, BinView, ExtView, Family, MapView, StrView, Value};

/// Nesting limit guarding against adversarially deep containers.
pub const MAX_DEPTH: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ends inside a value. Nothing has been consumed by the
    /// top-level [`Decoder::decode`]; retry once more bytes arrive.
    NeedMore,
    /// Invalid type byte or inconsistent framing. The source connection must
    /// be torn down.
    BadMsgpack,
    /// The decoded family is not in the active reader's `allowed` mask.
    WrongType,
    MaxDepthReached,
    /// A reader hook refused the value.
    Aborted,
}

pub type ReadResult = core::result::Result<(), DecodeError>;

/// Shape-directed visitor for [`Decoder::decode`].
///
/// Each hook covers one family; the default implementations accept and
/// discard, so a reader only implements the hooks it cares about. Container
/// hooks receive the decoder positioned at the first element and must consume
/// exactly `count` values (`2 * count` for maps), typically by recursing with
/// sub-readers or [`Decoder::skip_value`].
pub trait Reader {
    /// Families this reader accepts; anything else decodes to `WrongType`.
    fn allowed(&self) -> Family {
        Family::ANY
    }

    fn on_nil(&mut self) -> ReadResult {
        Ok(())
    }

    fn on_bool(&mut self, _value: bool) -> ReadResult {
        Ok(())
    }

    fn on_uint(&mut self, _value: u64) -> ReadResult {
        Ok(())
    }

    fn on_int(&mut self, _value: i64) -> ReadResult {
        Ok(())
    }

    fn on_float(&mut self, _value: f32) -> ReadResult {
        Ok(())
    }

    fn on_double(&mut self, _value: f64) -> ReadResult {
        Ok(())
    }

    fn on_str(&mut self, _view: StrView, _data: &[u8]) -> ReadResult {
        Ok(())
    }

    fn on_bin(&mut self, _view: BinView, _data: &[u8]) -> ReadResult {
        Ok(())
    }

    fn on_ext(&mut self, _view: ExtView, _data: &[u8]) -> ReadResult {
        Ok(())
    }

    fn on_array(&mut self, dec: &mut Decoder<'_>, count: u32) -> ReadResult {
        for _ in 0..count {
            dec.skip_value()?;
        }
        Ok(())
    }

    fn on_map(&mut self, dec: &mut Decoder<'_>, count: u32) -> ReadResult {
        for _ in 0..count as u64 * 2 {
            dec.skip_value()?;
        }
        Ok(())
    }
}

/// Streaming MsgPack decoder over a byte slice.
///
/// Offers two styles: visitor dispatch via [`Decoder::decode`] and cursor
/// reads via [`Decoder::value`] and the typed `expect_*` helpers. Both share
/// a position; views are offsets into the slice handed to [`Decoder::new`].
pub struct Decoder<'b> {
    buf: &'b [u8],
    pos: usize,
    depth: u32,
    max_depth: u32,
}

impl<'b> Decoder<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(buf: &'b [u8], max_depth: u32) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The full backing slice views were produced against.
    #[inline]
    pub fn backing(&self) -> &'b [u8] {
        self.buf
    }

    /// Decode exactly one value through `reader`.
    ///
    /// On `NeedMore` (and every error other than `BadMsgpack`) the position
    /// is rolled back so the call is idempotent; after `Ok` exactly one whole
    /// value has been consumed.
    pub fn decode<R: Reader + ?Sized>(&mut self, reader: &mut R) -> ReadResult {
        let start = self.pos;
        let start_depth = self.depth;
        let result = self.dispatch(reader);
        if let Err(e) = result {
            self.depth = start_depth;
            if e != DecodeError::BadMsgpack {
                self.pos = start;
            }
        }
        result
    }

    fn dispatch<R: Reader + ?Sized>(&mut self, reader: &mut R) -> ReadResult {
        let type_byte = self.peek_u8()?;
        let family = family_of(type_byte)?;
        if !reader.allowed().contains(family) {
            return Err(DecodeError::WrongType);
        }

        // Scalars and blobs are fully consumed here; containers hand the
        // element region to the reader's hook.
        match self.read_one(type_byte)? {
            Value::Nil => reader.on_nil(),
            Value::Bool(v) => reader.on_bool(v),
            Value::Uint(v) => reader.on_uint(v),
            Value::Int(v) => reader.on_int(v),
            Value::Float(v) => reader.on_float(v),
            Value::Double(v) => reader.on_double(v),
            Value::Str(view) => {
                let backing = self.buf;
                reader.on_str(view, backing)
            }
            Value::Bin(view) => {
                let backing = self.buf;
                reader.on_bin(view, backing)
            }
            Value::Ext(view) => {
                let backing = self.buf;
                reader.on_ext(view, backing)
            }
            Value::Arr(view) => {
                self.enter()?;
                let result = reader.on_array(self, view.count);
                self.leave();
                result
            }
            Value::Map(view) => {
                self.enter()?;
                let result = reader.on_map(self, view.count);
                self.leave();
                result
            }
        }
    }

    /// Read one value cursor-style.
    ///
    /// Scalars, strings, binaries and extensions are consumed whole. For
    /// arrays and maps only the header is consumed: the position is left at
    /// the first element and the caller iterates `count` (or `2 * count`)
    /// values itself.
    pub fn value(&mut self) -> Result<Value, DecodeError> {
        let type_byte = self.peek_u8()?;
        self.read_one(type_byte)
    }

    /// Skip one whole value, containers included, without visiting it.
    /// Iterative, so the depth limit does not apply here.
    pub fn skip_value(&mut self) -> ReadResult {
        let mut outstanding: u64 = 1;
        while outstanding > 0 {
            outstanding -= 1;
            let type_byte = self.peek_u8()?;
            match self.read_one(type_byte)? {
                Value::Arr(view) => outstanding += view.count as u64,
                Value::Map(view) => outstanding += view.count as u64 * 2,
                _ => {}
            }
        }
        Ok(())
    }

    /// Consume one value and return its byte span `(offset, len)`. Used to
    /// keep tuples as raw views for later application-side decoding.
    pub fn value_span(&mut self) -> Result<(u32, u32), DecodeError> {
        let start = self.pos;
        self.skip_value()?;
        Ok((start as u32, (self.pos - start) as u32))
    }

    pub fn expect_uint(&mut self) -> Result<u64, DecodeError> {
        match self.value()? {
            Value::Uint(v) => Ok(v),
            Value::Int(v) if v >= 0 => Ok(v as u64),
            _ => Err(DecodeError::WrongType),
        }
    }

    pub fn expect_str(&mut self) -> Result<StrView, DecodeError> {
        match self.value()? {
            Value::Str(view) => Ok(view),
            _ => Err(DecodeError::WrongType),
        }
    }

    pub fn expect_array(&mut self) -> Result<u32, DecodeError> {
        match self.value()? {
            Value::Arr(view) => Ok(view.count),
            _ => Err(DecodeError::WrongType),
        }
    }

    pub fn expect_map(&mut self) -> Result<u32, DecodeError> {
        match self.value()? {
            Value::Map(view) => Ok(view.count),
            _ => Err(DecodeError::WrongType),
        }
    }

    pub fn expect_bool(&mut self) -> Result<bool, DecodeError> {
        match self.value()? {
            Value::Bool(v) => Ok(v),
            _ => Err(DecodeError::WrongType),
        }
    }

    fn read_one(&mut self, type_byte: u8) -> Result<Value, DecodeError> {
        self.pos += 1;
        let value = match type_byte {
            0x00..=0x7f => Value::Uint(type_byte as u64),
            0x80..=0x8f => Value::Map(MapView {
                offset: self.pos as u32,
                count: (type_byte & 0x0f) as u32,
            }),
            0x90..=0x9f => Value::Arr(ArrView {
                offset: self.pos as u32,
                count: (type_byte & 0x0f) as u32,
            }),
            0xa0..=0xbf => {
                let len = (type_byte & 0x1f) as usize;
                Value::Str(self.take_str(len)?)
            }
            0xc0 => Value::Nil,
            0xc1 => return Err(DecodeError::BadMsgpack),
            0xc2 => Value::Bool(false),
            0xc3 => Value::Bool(true),
            0xc4 => {
                let len = self.take_u8()? as usize;
                Value::Bin(self.take_bin(len)?)
            }
            0xc5 => {
                let len = self.take_u16()? as usize;
                Value::Bin(self.take_bin(len)?)
            }
            0xc6 => {
                let len = self.take_u32()? as usize;
                Value::Bin(self.take_bin(len)?)
            }
            0xc7 => {
                let len = self.take_u8()? as usize;
                Value::Ext(self.take_ext(len)?)
            }
            0xc8 => {
                let len = self.take_u16()? as usize;
                Value::Ext(self.take_ext(len)?)
            }
            0xc9 => {
                let len = self.take_u32()? as usize;
                Value::Ext(self.take_ext(len)?)
            }
            0xca => Value::Float(f32::from_bits(self.take_u32()?)),
            0xcb => Value::Double(f64::from_bits(self.take_u64()?)),
            0xcc => Value::Uint(self.take_u8()? as u64),
            0xcd => Value::Uint(self.take_u16()? as u64),
            0xce => Value::Uint(self.take_u32()? as u64),
            0xcf => Value::Uint(self.take_u64()?),
            0xd0 => Value::Int(self.take_u8()? as i8 as i64),
            0xd1 => Value::Int(self.take_u16()? as i16 as i64),
            0xd2 => Value::Int(self.take_u32()? as i32 as i64),
            0xd3 => Value::Int(self.take_u64()? as i64),
            0xd4 => Value::Ext(self.take_ext(1)?),
            0xd5 => Value::Ext(self.take_ext(2)?),
            0xd6 => Value::Ext(self.take_ext(4)?),
            0xd7 => Value::Ext(self.take_ext(8)?),
            0xd8 => Value::Ext(self.take_ext(16)?),
            0xd9 => {
                let len = self.take_u8()? as usize;
                Value::Str(self.take_str(len)?)
            }
            0xda => {
                let len = self.take_u16()? as usize;
                Value::Str(self.take_str(len)?)
            }
            0xdb => {
                let len = self.take_u32()? as usize;
                Value::Str(self.take_str(len)?)
            }
            0xdc => {
                let count = self.take_u16()? as u32;
                Value::Arr(ArrView {
                    offset: self.pos as u32,
                    count,
                })
            }
            0xdd => {
                let count = self.take_u32()?;
                Value::Arr(ArrView {
                    offset: self.pos as u32,
                    count,
                })
            }
            0xde => {
                let count = self.take_u16()? as u32;
                Value::Map(MapView {
                    offset: self.pos as u32,
                    count,
                })
            }
            0xdf => {
                let count = self.take_u32()?;
                Value::Map(MapView {
                    offset: self.pos as u32,
                    count,
                })
            }
            0xe0..=0xff => Value::Int(type_byte as i8 as i64),
        };
        Ok(value)
    }

    #[inline]
    fn enter(&mut self) -> ReadResult {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(DecodeError::MaxDepthReached);
        }
        Ok(())
    }

    #[inline]
    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    #[inline]
    fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.buf.get(self.pos).copied().ok_or(DecodeError::NeedMore)
    }

    #[inline]
    fn take_u8(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::NeedMore);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(U16BE::ref_from_bytes(bytes)
            .map_err(|_| DecodeError::BadMsgpack)?
            .get())
    }

    fn take_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(U32BE::ref_from_bytes(bytes)
            .map_err(|_| DecodeError::BadMsgpack)?
            .get())
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(U64BE::ref_from_bytes(bytes)
            .map_err(|_| DecodeError::BadMsgpack)?
            .get())
    }

    fn take_str(&mut self, len: usize) -> Result<StrView, DecodeError> {
        let offset = self.pos as u32;
        self.take(len)?;
        Ok(StrView {
            offset,
            size: len as u32,
        })
    }

    fn take_bin(&mut self, len: usize) -> Result<BinView, DecodeError> {
        let offset = self.pos as u32;
        self.take(len)?;
        Ok(BinView {
            offset,
            size: len as u32,
        })
    }

    fn take_ext(&mut self, len: usize) -> Result<ExtView, DecodeError> {
        let ext_type = self.take_u8()? as i8;
        let offset = self.pos as u32;
        self.take(len)?;
        Ok(ExtView {
            ext_type,
            offset,
            size: len as u32,
        })
    }
}

fn family_of(type_byte: u8) -> Result<Family, DecodeError> {
    Ok(match type_byte {
        0x00..=0x7f | 0xcc..=0xcf | 0xd0..=0xd3 | 0xe0..=0xff => Family::INT,
        0x80..=0x8f | 0xde | 0xdf => Family::MAP,
        0x90..=0x9f | 0xdc | 0xdd => Family::ARR,
        0xa0..=0xbf | 0xd9..=0xdb => Family::STR,
        0xc0 => Family::NIL,
        0xc1 => return Err(DecodeError::BadMsgpack),
        0xc2 | 0xc3 => Family::BOOL,
        0xc4..=0xc6 => Family::BIN,
        0xc7..=0xc9 | 0xd4..=0xd8 => Family::EXT,
        0xca | 0xcb => Family::FLT,
    })
}
