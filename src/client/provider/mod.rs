use std::io;
use std::time::Duration;

use tracing::debug;

use crate::constant::GREETING_SIZE;
use crate::error::{Error, Result};
use crate::protocol::greeting::Greeting;
use crate::protocol::response::{decode_response, take_frame};

use super::conn::{ConnCore, ConnState, Connection};

mod poll;
mod reactor;

pub use poll::PollNet;
pub use reactor::MioNet;

/// Bytes asked of the transport per recv call.
const RECV_CHUNK: usize = 16 * 1024;

/// Event-loop driver for a set of connections.
///
/// Implementations differ only in how readiness is discovered; the byte
/// shuffling, frame decoding and completion bookkeeping are shared. `step`
/// returns the number of connections that produced at least one completed
/// response.
pub trait NetProvider {
    fn register(&mut self, conn: &Connection) -> Result<()>;

    fn unregister(&mut self, conn: &Connection) -> Result<()>;

    /// Poll readiness once and dispatch reads/writes. `None` blocks without
    /// bound, `Some(Duration::ZERO)` is a single non-blocking pass.
    fn step(&mut self, conns: &[Connection], timeout: Option<Duration>) -> Result<usize>;
}

/// Readiness the connection should currently subscribe to, or `None` when it
/// has no live transport.
pub(crate) fn interest_of(conn: &Connection) -> Option<(bool, bool)> {
    let core = conn.core.borrow();
    let stream = core.stream.as_ref()?;
    match core.state {
        ConnState::TlsHandshake | ConnState::Greeting | ConnState::Ready => Some((
            stream.wants_read(),
            stream.wants_write(!core.out_buf.is_empty()),
        )),
        _ => None,
    }
}

/// React to one readiness report: drive the TLS handshake if pending, flush
/// the output buffer, pull bytes in and decode complete frames. Any fatal
/// error is recorded on the connection. Returns completed-response count.
pub(crate) fn handle_readiness(conn: &Connection, readable: bool, writable: bool) -> usize {
    let mut core = conn.core.borrow_mut();
    let core = &mut *core;

    if !matches!(
        core.state,
        ConnState::TlsHandshake | ConnState::Greeting | ConnState::Ready
    ) {
        return 0;
    }

    if core.state == ConnState::TlsHandshake {
        let Some(stream) = core.stream.as_mut() else {
            return 0;
        };
        match stream.handshake_step() {
            Ok(true) => core.state = ConnState::Greeting,
            Ok(false) => return 0,
            Err(e) => {
                core.fail(e);
                return 0;
            }
        }
    }

    if writable
        && let Err(e) = flush_out(core)
    {
        core.fail(e);
        return 0;
    }

    if !readable {
        return 0;
    }

    // Drain the socket first, then decode: an EOF may still arrive together
    // with the last complete replies.
    let fill_result = fill_in(core);
    let completed = match process_input(core) {
        Ok(n) => n,
        Err(e) => {
            core.fail(e);
            return 0;
        }
    };
    if let Err(e) = fill_result {
        core.fail(e);
    }
    completed
}

fn flush_out(core: &mut ConnCore) -> Result<()> {
    let ConnCore {
        stream, out_buf, ..
    } = core;
    let Some(stream) = stream.as_mut() else {
        return Ok(());
    };

    while !out_buf.is_empty() {
        match stream.send(out_buf.readable()) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => out_buf.consume(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn fill_in(core: &mut ConnCore) -> Result<()> {
    let ConnCore { stream, in_buf, .. } = core;
    let Some(stream) = stream.as_mut() else {
        return Ok(());
    };

    loop {
        let window = in_buf.reserve(RECV_CHUNK);
        match stream.recv(window) {
            Ok(0) => {
                return Err(Error::Io {
                    kind: io::ErrorKind::UnexpectedEof,
                    errno: None,
                    msg: "peer closed the connection".to_string(),
                });
            }
            Ok(n) => in_buf.advance_write(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn process_input(core: &mut ConnCore) -> Result<usize> {
    if core.state == ConnState::Greeting && core.in_buf.size() >= GREETING_SIZE {
        let greeting = match core.in_buf.read(GREETING_SIZE) {
            Some(raw) => Greeting::parse(raw)?,
            None => return Ok(0),
        };
        core.in_buf.consume(GREETING_SIZE);
        debug!(banner = %greeting.banner, "greeting received");
        core.salt = Some(greeting.salt);
        core.banner = greeting.banner;
        core.state = ConnState::Ready;
    }
    if core.state != ConnState::Ready {
        return Ok(0);
    }

    let mut completed = 0;
    while let Some(frame) = take_frame(&mut core.in_buf, core.high_water)? {
        let response = decode_response(frame)?;
        let sync = response.header.sync;
        match core.pending.get_mut(&sync) {
            Some(slot) if slot.is_none() => {
                *slot = Some(response);
                completed += 1;
            }
            // A reply the client never asked for, or a duplicate: the stream
            // can no longer be trusted.
            _ => return Err(Error::SyncMismatch(sync)),
        }
    }

    if core.in_buf.size() > core.high_water {
        return Err(Error::FrameTooLarge(core.in_buf.size() as u64));
    }
    Ok(completed)
}
