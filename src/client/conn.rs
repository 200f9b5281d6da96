use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::rc::Rc;

use tracing::debug;

use crate::buffer::Buffer;
use crate::constant::{IteratorType, SCRAMBLE_SIZE};
use crate::error::{Error, Result};
use crate::msgpack::Encode;
use crate::opts::Opts;
use crate::protocol::request::{RequestEncoder, Statement};
use crate::protocol::response::Response;

use super::stream::Stream;

/// Request id; unique within one connection's lifetime, also the sync field
/// of the wire frame it produced.
pub type Rid = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    New,
    /// TLS handshake in flight, driven by the readiness loop.
    TlsHandshake,
    /// Transport up, waiting for the 128-byte server greeting.
    Greeting,
    Ready,
    Error,
    Closed,
}

/// Per-rid completion slot: `None` while awaiting the reply.
type Completion = Option<Response>;

pub(crate) struct ConnCore {
    pub(crate) stream: Option<Stream>,
    pub(crate) state: ConnState,
    pub(crate) in_buf: Buffer,
    pub(crate) out_buf: Buffer,
    pub(crate) pending: HashMap<Rid, Completion>,
    pub(crate) next_sync: Rid,
    pub(crate) error: Option<Error>,
    pub(crate) salt: Option<[u8; SCRAMBLE_SIZE]>,
    pub(crate) banner: String,
    pub(crate) high_water: usize,
}

impl ConnCore {
    fn new() -> Self {
        Self {
            stream: None,
            state: ConnState::New,
            in_buf: Buffer::new(),
            out_buf: Buffer::new(),
            pending: HashMap::new(),
            next_sync: 0,
            error: None,
            salt: None,
            banner: String::new(),
            high_water: crate::constant::DEFAULT_HIGH_WATER,
        }
    }

    /// Record a fatal error: tear the transport down, drop every awaiting
    /// completion, and fail all later submits and waits fast. Responses that
    /// already arrived stay fetchable.
    pub(crate) fn fail(&mut self, err: Error) {
        debug!(error = %err, "connection failed");
        if self.error.is_none() {
            self.error = Some(err);
        }
        self.state = ConnState::Error;
        self.pending.retain(|_, slot| slot.is_some());
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.pending.values().filter(|slot| slot.is_some()).count()
    }

    fn next_rid(&mut self) -> Result<Rid> {
        if self.next_sync == Rid::MAX {
            self.fail(Error::RidOverflow);
            return Err(Error::RidOverflow);
        }
        let rid = self.next_sync;
        self.next_sync += 1;
        Ok(rid)
    }
}

/// One connection to the server: a transport endpoint bound to input/output
/// buffers and a map from request id to its pending completion.
///
/// The handle is a cheap clone; the connector and the net provider share the
/// same underlying state. Submission only writes to the output buffer, the
/// actual flush happens inside the connector's wait calls.
#[derive(Clone)]
pub struct Connection {
    pub(crate) core: Rc<RefCell<ConnCore>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(ConnCore::new())),
        }
    }

    /// Open the transport and enter the greeting exchange. Driven to
    /// completion by `Connector::connect`.
    pub(crate) fn start_connect(&self, opts: &Opts) -> Result<()> {
        let mut core = self.core.borrow_mut();
        if matches!(core.state, ConnState::Ready | ConnState::Greeting) {
            return Err(Error::BadConfig("connection is already established".to_string()));
        }

        let stream = Stream::connect(opts)?;
        core.state = if stream.is_handshaking() {
            ConnState::TlsHandshake
        } else {
            ConnState::Greeting
        };
        core.stream = Some(stream);
        core.in_buf = Buffer::new();
        core.out_buf = Buffer::new();
        core.pending.clear();
        core.error = None;
        core.salt = None;
        core.high_water = opts.high_water;
        Ok(())
    }

    fn submit<F>(&self, encode: F) -> Result<Rid>
    where
        F: FnOnce(&mut RequestEncoder<'_>, Rid),
    {
        let mut core = self.core.borrow_mut();
        let core = &mut *core;

        if let Some(err) = &core.error {
            return Err(err.clone());
        }
        if core.state == ConnState::Closed {
            return Err(Error::Closed);
        }
        if core.out_buf.size() > core.high_water {
            return Err(Error::WouldBlock);
        }

        let rid = core.next_rid()?;
        let mut enc = RequestEncoder::new(&mut core.out_buf);
        encode(&mut enc, rid);
        core.pending.insert(rid, None);
        Ok(rid)
    }

    pub fn ping(&self) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_ping(sync))
    }

    pub fn call<T: Encode>(&self, function: &str, args: &T) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_call(sync, function, args))
    }

    pub fn eval<T: Encode>(&self, expression: &str, args: &T) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_eval(sync, expression, args))
    }

    pub fn execute<'s, S, T>(&self, stmt: S, binds: &T) -> Result<Rid>
    where
        S: Into<Statement<'s>>,
        T: Encode,
    {
        let stmt = stmt.into();
        self.submit(|enc, sync| enc.encode_execute(sync, stmt, binds))
    }

    pub fn prepare(&self, text: &str) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_prepare(sync, text))
    }

    /// `timeout` is the server-side transaction timeout in seconds.
    pub fn begin(&self, timeout: Option<f64>) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_begin(sync, timeout))
    }

    pub fn commit(&self) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_commit(sync))
    }

    pub fn rollback(&self) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_rollback(sync))
    }

    pub(crate) fn submit_auth(&self, user: &str, scramble: &[u8; SCRAMBLE_SIZE]) -> Result<Rid> {
        self.submit(|enc, sync| enc.encode_auth(sync, user, scramble))
    }

    /// Per-space request sugar.
    pub fn space(&self, space_id: u32) -> Space {
        Space {
            conn: self.clone(),
            space_id,
        }
    }

    /// Non-blocking readiness check; false for unknown rids.
    pub fn future_is_ready(&self, rid: Rid) -> bool {
        matches!(self.core.borrow().pending.get(&rid), Some(Some(_)))
    }

    /// Return and remove the response for `rid`, or `None` while it is still
    /// in flight (or was never submitted here).
    pub fn get_response(&self, rid: Rid) -> Option<Response> {
        let mut core = self.core.borrow_mut();
        match core.pending.get(&rid) {
            Some(Some(_)) => core.pending.remove(&rid).flatten(),
            _ => None,
        }
    }

    /// The sticky transport/protocol error, if any.
    pub fn get_error(&self) -> Option<Error> {
        self.core.borrow().error.clone()
    }

    /// Server version banner from the greeting.
    pub fn server_banner(&self) -> String {
        self.core.borrow().banner.clone()
    }

    /// Cancel all pending requests and close the transport. Replies still in
    /// flight are discarded.
    pub fn close(&self) {
        let mut core = self.core.borrow_mut();
        core.pending.clear();
        core.state = ConnState::Closed;
        if let Some(mut stream) = core.stream.take() {
            stream.close();
        }
    }

    pub(crate) fn fd(&self) -> Option<RawFd> {
        self.core.borrow().stream.as_ref().map(|s| s.fd())
    }

    pub(crate) fn state(&self) -> ConnState {
        self.core.borrow().state
    }

    pub(crate) fn salt(&self) -> Option<[u8; SCRAMBLE_SIZE]> {
        self.core.borrow().salt
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.core.borrow().ready_count()
    }
}

/// Request sugar scoped to one space. Obtained via [`Connection::space`].
#[derive(Clone)]
pub struct Space {
    conn: Connection,
    space_id: u32,
}

impl Space {
    pub fn id(&self) -> u32 {
        self.space_id
    }

    pub fn index(&self, index_id: u32) -> Index {
        Index {
            conn: self.conn.clone(),
            space_id: self.space_id,
            index_id,
        }
    }

    pub fn replace<T: Encode>(&self, tuple: &T) -> Result<Rid> {
        self.conn
            .submit(|enc, sync| enc.encode_replace(sync, self.space_id, tuple))
    }

    pub fn insert<T: Encode>(&self, tuple: &T) -> Result<Rid> {
        self.conn
            .submit(|enc, sync| enc.encode_insert(sync, self.space_id, tuple))
    }

    /// Delete by primary key.
    pub fn delete<K: Encode>(&self, key: &K) -> Result<Rid> {
        self.index(0).delete(key)
    }

    /// Update by primary key; `ops` is a tuple of update operation triplets.
    pub fn update<K: Encode, O: Encode>(&self, key: &K, ops: &O) -> Result<Rid> {
        self.index(0).update(key, ops)
    }

    pub fn upsert<T: Encode, O: Encode>(&self, tuple: &T, ops: &O) -> Result<Rid> {
        self.conn
            .submit(|enc, sync| enc.encode_upsert(sync, self.space_id, tuple, ops))
    }

    /// Select by primary key with an EQ scan and no offset.
    pub fn select<K: Encode>(&self, key: &K) -> Result<Rid> {
        self.index(0).select(key)
    }

    pub fn select_with<K: Encode>(
        &self,
        key: &K,
        index_id: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
    ) -> Result<Rid> {
        self.index(index_id).select_with(key, limit, offset, iterator)
    }
}

/// Request sugar scoped to one index of one space.
#[derive(Clone)]
pub struct Index {
    conn: Connection,
    space_id: u32,
    index_id: u32,
}

impl Index {
    pub fn delete<K: Encode>(&self, key: &K) -> Result<Rid> {
        self.conn
            .submit(|enc, sync| enc.encode_delete(sync, self.space_id, self.index_id, key))
    }

    pub fn update<K: Encode, O: Encode>(&self, key: &K, ops: &O) -> Result<Rid> {
        self.conn
            .submit(|enc, sync| enc.encode_update(sync, self.space_id, self.index_id, key, ops))
    }

    pub fn select<K: Encode>(&self, key: &K) -> Result<Rid> {
        self.select_with(key, u32::MAX, 0, IteratorType::Eq)
    }

    pub fn select_with<K: Encode>(
        &self,
        key: &K,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
    ) -> Result<Rid> {
        self.conn.submit(|enc, sync| {
            enc.encode_select(
                sync,
                self.space_id,
                self.index_id,
                limit,
                offset,
                iterator,
                key,
            )
        })
    }
}
