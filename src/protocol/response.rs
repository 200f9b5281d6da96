use std::fmt;

use crate::buffer::Buffer;
use crate::constant::{IPROTO_TYPE_ERROR, body, field, header, mp_error, sql_info};
use crate::error::{Error, Result};
use crate::msgpack::{DecodeError, Decoder, StrView, Value};

/// Parsed response header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// Raw code: 0 for success, `IPROTO_TYPE_ERROR | errcode` otherwise.
    pub code: u32,
    pub sync: u64,
    pub schema_version: u32,
}

impl Header {
    pub fn is_error(&self) -> bool {
        self.code & IPROTO_TYPE_ERROR != 0
    }

    /// Server error code with the error bit stripped.
    pub fn error_code(&self) -> u32 {
        self.code & !IPROTO_TYPE_ERROR
    }
}

/// Byte span of one tuple inside the response frame, left undecoded for the
/// application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleView {
    pub offset: u32,
    pub size: u32,
}

/// One column descriptor from SQL metadata. String fields are views into the
/// response frame.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub field_name: StrView,
    pub field_type: StrView,
    pub collation: Option<StrView>,
    pub span: Option<StrView>,
    pub is_nullable: bool,
    pub is_autoincrement: bool,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    /// Number of columns.
    pub dimension: u32,
    pub column_maps: Vec<ColumnMap>,
}

#[derive(Debug, Clone, Default)]
pub struct SqlInfo {
    pub row_count: u64,
    pub autoincrement_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct SqlData {
    pub metadata: Option<Metadata>,
    pub sql_info: Option<SqlInfo>,
    pub stmt_id: Option<u64>,
    pub bind_count: Option<u64>,
}

impl SqlData {
    fn is_empty(&self) -> bool {
        self.metadata.is_none()
            && self.sql_info.is_none()
            && self.stmt_id.is_none()
            && self.bind_count.is_none()
    }
}

/// Successful response payload.
#[derive(Debug, Clone, Default)]
pub struct Data {
    pub tuples: Vec<TupleView>,
    /// Number of top-level elements in the DATA array.
    pub dimension: u32,
    pub sql_data: Option<SqlData>,
}

/// One entry of a server-side error stack.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub msg: String,
    pub type_name: String,
    pub file: String,
    pub line: u32,
    pub saved_errno: i32,
    pub errcode: u32,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) at {}:{}: {}",
            self.type_name, self.errcode, self.file, self.line, self.msg
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    pub data: Option<Data>,
    /// Most recent error first, exactly as the server stacked them.
    pub error_stack: Option<Vec<ServerError>>,
}

/// A fully parsed reply frame.
///
/// The frame bytes are owned by the response, so every view (tuples, column
/// names) stays valid for as long as the caller keeps the response, and the
/// connection's input buffer is free to reclaim space.
#[derive(Debug)]
pub struct Response {
    pub header: Header,
    pub body: Body,
    frame: Vec<u8>,
}

impl Response {
    /// The raw frame (header map + body map, without the length prefix).
    pub fn bytes(&self) -> &[u8] {
        &self.frame
    }

    /// Resolve a string view against this response's frame.
    pub fn str(&self, view: StrView) -> Result<&str> {
        simdutf8::basic::from_utf8(view.bytes(&self.frame)).map_err(|_| Error::BadMsgpack)
    }

    /// Raw MsgPack bytes of one tuple.
    pub fn tuple_bytes(&self, view: TupleView) -> &[u8] {
        &self.frame[view.offset as usize..(view.offset + view.size) as usize]
    }
}

impl From<DecodeError> for Error {
    fn from(_: DecodeError) -> Self {
        // Frames are parsed only once complete, so even NeedMore means the
        // frame lied about its own extent.
        Error::BadMsgpack
    }
}

/// Split one complete frame off the input buffer.
///
/// Returns `Ok(None)` when the buffer holds only a prefix. The length prefix
/// is any MsgPack unsigned int; a length beyond `high_water` is fatal.
pub fn take_frame(in_buf: &mut Buffer, high_water: usize) -> Result<Option<Vec<u8>>> {
    let readable = in_buf.readable();
    if readable.is_empty() {
        return Ok(None);
    }

    let mut dec = Decoder::new(readable);
    let len = match dec.value() {
        Ok(Value::Uint(len)) => len,
        Err(DecodeError::NeedMore) => return Ok(None),
        _ => return Err(Error::UnexpectedFrame("length prefix is not an unsigned int")),
    };
    if len > high_water as u64 {
        return Err(Error::FrameTooLarge(len));
    }

    let prefix_size = dec.position();
    if readable.len() - prefix_size < len as usize {
        return Ok(None);
    }

    let frame = readable[prefix_size..prefix_size + len as usize].to_vec();
    in_buf.consume(prefix_size + len as usize);
    Ok(Some(frame))
}

/// Parse a complete frame into a typed [`Response`].
pub fn decode_response(frame: Vec<u8>) -> Result<Response> {
    let mut dec = Decoder::new(&frame);

    let mut code = None;
    let mut sync = None;
    let mut schema_version = 0u32;

    let entries = dec.expect_map()?;
    for _ in 0..entries {
        let key = dec.expect_uint()?;
        match key as u8 {
            header::REQUEST_TYPE => code = Some(dec.expect_uint()? as u32),
            header::SYNC => sync = Some(dec.expect_uint()?),
            header::SCHEMA_VERSION => schema_version = dec.expect_uint()? as u32,
            _ => dec.skip_value()?,
        }
    }

    let header = Header {
        code: code.ok_or(Error::UnexpectedFrame("header without a code"))?,
        sync: sync.ok_or(Error::UnexpectedFrame("header without a sync"))?,
        schema_version,
    };

    let body = if dec.is_empty() {
        Body::default()
    } else {
        decode_body(&mut dec, &header)?
    };

    Ok(Response {
        header,
        body,
        frame,
    })
}

fn decode_body(dec: &mut Decoder<'_>, header: &Header) -> Result<Body> {
    let mut body = Body::default();
    let mut tuples = Vec::new();
    let mut dimension = 0u32;
    let mut has_data = false;
    let mut sql = SqlData::default();
    let mut error_24: Option<String> = None;

    let entries = dec.expect_map()?;
    for _ in 0..entries {
        let key = dec.expect_uint()?;
        match key as u8 {
            body::DATA => {
                has_data = true;
                dimension = dec.expect_array()?;
                tuples.reserve(dimension as usize);
                for _ in 0..dimension {
                    let (offset, size) = dec.value_span()?;
                    tuples.push(TupleView { offset, size });
                }
            }
            body::METADATA => sql.metadata = Some(decode_metadata(dec)?),
            body::SQL_INFO => sql.sql_info = Some(decode_sql_info(dec)?),
            body::STMT_ID => sql.stmt_id = Some(dec.expect_uint()?),
            body::BIND_COUNT => sql.bind_count = Some(dec.expect_uint()?),
            body::ERROR_24 => {
                let view = dec.expect_str()?;
                error_24 = Some(str_owned(dec, view)?);
            }
            body::ERROR => body.error_stack = Some(decode_error_stack(dec, header)?),
            _ => dec.skip_value()?,
        }
    }

    // Old servers only send the plain ERROR_24 message; synthesize a
    // single-entry stack so callers see one shape.
    if body.error_stack.is_none()
        && let Some(msg) = error_24
    {
        body.error_stack = Some(vec![ServerError {
            msg,
            type_name: String::new(),
            file: String::new(),
            line: 0,
            saved_errno: 0,
            errcode: header.error_code(),
        }]);
    }

    if has_data || !sql.is_empty() {
        body.data = Some(Data {
            tuples,
            dimension,
            sql_data: if sql.is_empty() { None } else { Some(sql) },
        });
    }

    Ok(body)
}

fn decode_metadata(dec: &mut Decoder<'_>) -> Result<Metadata> {
    let dimension = dec.expect_array()?;
    let mut column_maps = Vec::with_capacity(dimension as usize);

    for _ in 0..dimension {
        let mut field_name = None;
        let mut field_type = None;
        let mut collation = None;
        let mut span = None;
        let mut is_nullable = false;
        let mut is_autoincrement = false;

        let entries = dec.expect_map()?;
        for _ in 0..entries {
            let key = dec.expect_uint()?;
            match key as u8 {
                field::NAME => field_name = Some(dec.expect_str()?),
                field::TYPE => field_type = Some(dec.expect_str()?),
                field::COLLATION => collation = Some(dec.expect_str()?),
                field::SPAN => {
                    // SPAN is nil when the column has no expression.
                    span = match dec.value()? {
                        Value::Str(view) => Some(view),
                        Value::Nil => None,
                        _ => return Err(Error::BadMsgpack),
                    };
                }
                field::IS_NULLABLE => is_nullable = dec.expect_bool()?,
                field::IS_AUTOINCREMENT => is_autoincrement = dec.expect_bool()?,
                _ => dec.skip_value()?,
            }
        }

        column_maps.push(ColumnMap {
            field_name: field_name.ok_or(Error::UnexpectedFrame("column map without a name"))?,
            field_type: field_type.ok_or(Error::UnexpectedFrame("column map without a type"))?,
            collation,
            span,
            is_nullable,
            is_autoincrement,
        });
    }

    Ok(Metadata {
        dimension,
        column_maps,
    })
}

fn decode_sql_info(dec: &mut Decoder<'_>) -> Result<SqlInfo> {
    let mut info = SqlInfo::default();

    let entries = dec.expect_map()?;
    for _ in 0..entries {
        let key = dec.expect_uint()?;
        match key as u8 {
            sql_info::ROW_COUNT => info.row_count = dec.expect_uint()?,
            sql_info::AUTOINCREMENT_IDS => {
                let count = dec.expect_array()?;
                info.autoincrement_ids.reserve(count as usize);
                for _ in 0..count {
                    info.autoincrement_ids.push(dec.expect_uint()?);
                }
            }
            _ => dec.skip_value()?,
        }
    }

    Ok(info)
}

fn decode_error_stack(dec: &mut Decoder<'_>, header: &Header) -> Result<Vec<ServerError>> {
    let mut stack = Vec::new();

    let entries = dec.expect_map()?;
    for _ in 0..entries {
        let key = dec.expect_uint()?;
        if key as u8 != mp_error::STACK {
            dec.skip_value()?;
            continue;
        }

        let count = dec.expect_array()?;
        stack.reserve(count as usize);
        for _ in 0..count {
            let mut err = ServerError {
                msg: String::new(),
                type_name: String::new(),
                file: String::new(),
                line: 0,
                saved_errno: 0,
                errcode: header.error_code(),
            };

            let fields = dec.expect_map()?;
            for _ in 0..fields {
                let key = dec.expect_uint()?;
                match key as u8 {
                    mp_error::TYPE => {
                        let view = dec.expect_str()?;
                        err.type_name = str_owned(dec, view)?;
                    }
                    mp_error::FILE => {
                        let view = dec.expect_str()?;
                        err.file = str_owned(dec, view)?;
                    }
                    mp_error::LINE => err.line = dec.expect_uint()? as u32,
                    mp_error::MESSAGE => {
                        let view = dec.expect_str()?;
                        err.msg = str_owned(dec, view)?;
                    }
                    mp_error::ERRNO => err.saved_errno = dec.expect_uint()? as i32,
                    mp_error::ERRCODE => err.errcode = dec.expect_uint()? as u32,
                    _ => dec.skip_value()?,
                }
            }
            stack.push(err);
        }
    }

    Ok(stack)
}

fn str_owned(dec: &Decoder<'_>, view: StrView) -> Result<String> {
    simdutf8::basic::from_utf8(view.bytes(dec.backing()))
        .map(str::to_owned)
        .map_err(|_| Error::BadMsgpack)
}
