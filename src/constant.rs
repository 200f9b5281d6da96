//! iproto wire constants.

/// Request and response type codes carried under [`header::REQUEST_TYPE`].
///
/// A response whose code has [`IPROTO_TYPE_ERROR`] set is an error reply; the
/// low 15 bits are the server error code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Eval = 8,
    Upsert = 9,
    Call = 10,
    Execute = 11,
    Nop = 12,
    Prepare = 13,
    Begin = 14,
    Commit = 15,
    Rollback = 16,
    Ping = 64,
}

/// Error bit in a response header code.
pub const IPROTO_TYPE_ERROR: u32 = 1 << 15;

/// Header map keys.
pub mod header {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_VERSION: u8 = 0x05;
}

/// Body map keys, shared between requests and responses.
pub mod body {
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const INDEX_BASE: u8 = 0x15;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const USER_NAME: u8 = 0x23;
    pub const EXPR: u8 = 0x27;
    pub const OPS: u8 = 0x28;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
    pub const METADATA: u8 = 0x32;
    pub const BIND_METADATA: u8 = 0x33;
    pub const BIND_COUNT: u8 = 0x34;
    pub const SQL_TEXT: u8 = 0x40;
    pub const SQL_BIND: u8 = 0x41;
    pub const SQL_INFO: u8 = 0x42;
    pub const STMT_ID: u8 = 0x43;
    pub const ERROR: u8 = 0x52;
    pub const TIMEOUT: u8 = 0x56;
}

/// Keys inside a `SQL_INFO` map.
pub mod sql_info {
    pub const ROW_COUNT: u8 = 0x00;
    pub const AUTOINCREMENT_IDS: u8 = 0x01;
}

/// Keys inside each `METADATA` column map.
pub mod field {
    pub const NAME: u8 = 0x00;
    pub const TYPE: u8 = 0x01;
    pub const COLLATION: u8 = 0x02;
    pub const IS_NULLABLE: u8 = 0x03;
    pub const IS_AUTOINCREMENT: u8 = 0x04;
    pub const SPAN: u8 = 0x05;
}

/// Keys inside an `ERROR` body value and its stack entries.
pub mod mp_error {
    pub const STACK: u8 = 0x00;

    pub const TYPE: u8 = 0x00;
    pub const FILE: u8 = 0x01;
    pub const LINE: u8 = 0x02;
    pub const MESSAGE: u8 = 0x03;
    pub const ERRNO: u8 = 0x04;
    pub const ERRCODE: u8 = 0x05;
    pub const FIELDS: u8 = 0x06;
}

/// Server-side scan mode for select.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorType {
    #[default]
    Eq = 0,
    Req = 1,
    All = 2,
    Lt = 3,
    Le = 4,
    Ge = 5,
    Gt = 6,
    BitsAllSet = 7,
    BitsAnySet = 8,
    BitsAllNotSet = 9,
    Overlaps = 10,
    Neighbor = 11,
}

/// MsgPack extension types the server emits; surfaced to the application as
/// raw `Ext` values.
pub mod ext_type {
    pub const DECIMAL: i8 = -1;
    pub const UUID: i8 = -2;
    pub const ERROR: i8 = -4;
}

/// Greeting is two fixed 64-byte lines: version banner, then base64 salt.
pub const GREETING_SIZE: usize = 128;
/// Decoded salt length; only the first [`SCRAMBLE_SIZE`] bytes are used.
pub const SALT_SIZE: usize = 44;
/// Length of a chap-sha1 scramble.
pub const SCRAMBLE_SIZE: usize = 20;

/// Default cap for both the output buffer and an incomplete input frame.
pub const DEFAULT_HIGH_WATER: usize = 16 * 1024 * 1024;
