use crate::buffer::{Buffer, WriteCursor};
use crate::constant::{IteratorType, RequestType, SCRAMBLE_SIZE, body, header};
use crate::msgpack::{Encode, Encoder};

/// Byte width of the frame length placeholder: uint32 in its fixed 5-byte
/// MsgPack form, patched once the body is written.
const LEN_PREFIX_SIZE: u64 = 5;

/// Statement selector for execute: raw SQL text, or the id returned by a
/// prior prepare.
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    Text(&'a str),
    Id(u64),
}

impl<'a> From<&'a str> for Statement<'a> {
    fn from(text: &'a str) -> Self {
        Statement::Text(text)
    }
}

impl<'a> From<u64> for Statement<'a> {
    fn from(id: u64) -> Self {
        Statement::Id(id)
    }
}

/// Builds complete request frames on an output buffer.
///
/// Every frame is `length placeholder || header map || body map`; the header
/// carries the request type and the sync (request id) chosen by the caller.
pub struct RequestEncoder<'a> {
    buf: &'a mut Buffer,
}

impl<'a> RequestEncoder<'a> {
    pub fn new(buf: &'a mut Buffer) -> Self {
        Self { buf }
    }

    fn begin(&mut self, ty: RequestType, sync: u64, body_keys: u32) -> WriteCursor {
        let frame_start = self.buf.save();
        self.buf.write(&[0xce, 0, 0, 0, 0]);

        let mut enc = Encoder::new(self.buf);
        enc.write_map(2);
        enc.write_uint(header::REQUEST_TYPE as u64);
        enc.write_uint(ty as u64);
        enc.write_uint(header::SYNC as u64);
        enc.write_uint(sync);
        enc.write_map(body_keys);
        frame_start
    }

    fn finish(&mut self, frame_start: WriteCursor) {
        let total = self.buf.write_pos() - frame_start.0 - LEN_PREFIX_SIZE;
        let mut prefix = [0xce, 0, 0, 0, 0];
        prefix[1..].copy_from_slice(&(total as u32).to_be_bytes());
        self.buf.patch(frame_start.0, &prefix);
    }

    #[inline]
    fn enc(&mut self) -> Encoder<'_> {
        Encoder::new(self.buf)
    }

    pub fn encode_ping(&mut self, sync: u64) {
        let at = self.begin(RequestType::Ping, sync, 0);
        self.finish(at);
    }

    pub fn encode_auth(&mut self, sync: u64, user: &str, scramble: &[u8; SCRAMBLE_SIZE]) {
        let at = self.begin(RequestType::Auth, sync, 2);
        let mut enc = self.enc();
        enc.write_uint(body::USER_NAME as u64);
        enc.write_str(user);
        enc.write_uint(body::TUPLE as u64);
        enc.write_array(2);
        enc.write_str("chap-sha1");
        // The scramble travels in a str frame even though it is raw bytes.
        enc.write_raw(&[0xa0 | SCRAMBLE_SIZE as u8]);
        enc.write_raw(scramble);
        self.finish(at);
    }

    pub fn encode_replace<T: Encode>(&mut self, sync: u64, space_id: u32, tuple: &T) {
        self.encode_store(RequestType::Replace, sync, space_id, tuple);
    }

    pub fn encode_insert<T: Encode>(&mut self, sync: u64, space_id: u32, tuple: &T) {
        self.encode_store(RequestType::Insert, sync, space_id, tuple);
    }

    fn encode_store<T: Encode>(&mut self, ty: RequestType, sync: u64, space_id: u32, tuple: &T) {
        let at = self.begin(ty, sync, 2);
        let mut enc = self.enc();
        enc.write_uint(body::SPACE_ID as u64);
        enc.write_uint(space_id as u64);
        enc.write_uint(body::TUPLE as u64);
        tuple.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_delete<K: Encode>(&mut self, sync: u64, space_id: u32, index_id: u32, key: &K) {
        let at = self.begin(RequestType::Delete, sync, 3);
        let mut enc = self.enc();
        enc.write_uint(body::SPACE_ID as u64);
        enc.write_uint(space_id as u64);
        enc.write_uint(body::INDEX_ID as u64);
        enc.write_uint(index_id as u64);
        enc.write_uint(body::KEY as u64);
        key.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_update<K: Encode, O: Encode>(
        &mut self,
        sync: u64,
        space_id: u32,
        index_id: u32,
        key: &K,
        ops: &O,
    ) {
        let at = self.begin(RequestType::Update, sync, 4);
        let mut enc = self.enc();
        enc.write_uint(body::SPACE_ID as u64);
        enc.write_uint(space_id as u64);
        enc.write_uint(body::INDEX_ID as u64);
        enc.write_uint(index_id as u64);
        enc.write_uint(body::KEY as u64);
        key.encode(&mut enc);
        enc.write_uint(body::TUPLE as u64);
        ops.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_upsert<T: Encode, O: Encode>(
        &mut self,
        sync: u64,
        space_id: u32,
        tuple: &T,
        ops: &O,
    ) {
        let at = self.begin(RequestType::Upsert, sync, 4);
        let mut enc = self.enc();
        enc.write_uint(body::SPACE_ID as u64);
        enc.write_uint(space_id as u64);
        enc.write_uint(body::INDEX_BASE as u64);
        enc.write_uint(0);
        enc.write_uint(body::OPS as u64);
        ops.encode(&mut enc);
        enc.write_uint(body::TUPLE as u64);
        tuple.encode(&mut enc);
        self.finish(at);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn encode_select<K: Encode>(
        &mut self,
        sync: u64,
        space_id: u32,
        index_id: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: &K,
    ) {
        let at = self.begin(RequestType::Select, sync, 6);
        let mut enc = self.enc();
        enc.write_uint(body::SPACE_ID as u64);
        enc.write_uint(space_id as u64);
        enc.write_uint(body::INDEX_ID as u64);
        enc.write_uint(index_id as u64);
        enc.write_uint(body::LIMIT as u64);
        enc.write_uint(limit as u64);
        enc.write_uint(body::OFFSET as u64);
        enc.write_uint(offset as u64);
        enc.write_uint(body::ITERATOR as u64);
        enc.write_uint(iterator as u64);
        enc.write_uint(body::KEY as u64);
        key.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_call<T: Encode>(&mut self, sync: u64, function: &str, args: &T) {
        let at = self.begin(RequestType::Call, sync, 2);
        let mut enc = self.enc();
        enc.write_uint(body::FUNCTION_NAME as u64);
        enc.write_str(function);
        enc.write_uint(body::TUPLE as u64);
        args.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_eval<T: Encode>(&mut self, sync: u64, expression: &str, args: &T) {
        let at = self.begin(RequestType::Eval, sync, 2);
        let mut enc = self.enc();
        enc.write_uint(body::EXPR as u64);
        enc.write_str(expression);
        enc.write_uint(body::TUPLE as u64);
        args.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_execute<T: Encode>(&mut self, sync: u64, stmt: Statement<'_>, binds: &T) {
        let at = self.begin(RequestType::Execute, sync, 2);
        let mut enc = self.enc();
        match stmt {
            Statement::Text(text) => {
                enc.write_uint(body::SQL_TEXT as u64);
                enc.write_str(text);
            }
            Statement::Id(id) => {
                enc.write_uint(body::STMT_ID as u64);
                enc.write_uint(id);
            }
        }
        enc.write_uint(body::SQL_BIND as u64);
        binds.encode(&mut enc);
        self.finish(at);
    }

    pub fn encode_prepare(&mut self, sync: u64, text: &str) {
        let at = self.begin(RequestType::Prepare, sync, 1);
        let mut enc = self.enc();
        enc.write_uint(body::SQL_TEXT as u64);
        enc.write_str(text);
        self.finish(at);
    }

    /// `timeout` is the server-side transaction timeout in seconds.
    pub fn encode_begin(&mut self, sync: u64, timeout: Option<f64>) {
        let keys = if timeout.is_some() { 1 } else { 0 };
        let at = self.begin(RequestType::Begin, sync, keys);
        if let Some(secs) = timeout {
            let mut enc = self.enc();
            enc.write_uint(body::TIMEOUT as u64);
            enc.write_double(secs);
        }
        self.finish(at);
    }

    pub fn encode_commit(&mut self, sync: u64) {
        let at = self.begin(RequestType::Commit, sync, 0);
        self.finish(at);
    }

    pub fn encode_rollback(&mut self, sync: u64) {
        let at = self.begin(RequestType::Rollback, sync, 0);
        self.finish(at);
    }
}
