use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::client::conn::Connection;
use crate::error::Result;

use super::{NetProvider, handle_readiness, interest_of};

/// Reactor-backed provider on top of `mio`.
///
/// Connection fds are registered as raw sources; the token is the fd itself.
/// mio reports edge-triggered on most platforms, which is compatible with
/// the shared readiness handler because it always drains reads and writes
/// down to `WouldBlock`.
pub struct MioNet {
    poll: Poll,
    events: Events,
    registered: HashMap<RawFd, Interest>,
}

impl MioNet {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            registered: HashMap::new(),
        })
    }

    fn desired_interest(conn: &Connection) -> Option<Interest> {
        let (readable, writable) = interest_of(conn)?;
        match (readable, writable) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl NetProvider for MioNet {
    fn register(&mut self, conn: &Connection) -> Result<()> {
        let Some(fd) = conn.fd() else {
            return Ok(());
        };
        let interest =
            Self::desired_interest(conn).unwrap_or(Interest::READABLE | Interest::WRITABLE);
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(fd as usize), interest)?;
        self.registered.insert(fd, interest);
        Ok(())
    }

    fn unregister(&mut self, conn: &Connection) -> Result<()> {
        let Some(fd) = conn.fd() else {
            return Ok(());
        };
        if self.registered.remove(&fd).is_some() {
            let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
        }
        Ok(())
    }

    fn step(&mut self, conns: &[Connection], timeout: Option<Duration>) -> Result<usize> {
        // Interest follows the output buffer: writable is armed only while
        // bytes are queued (or a TLS handshake is in flight).
        for conn in conns {
            let Some(fd) = conn.fd() else {
                continue;
            };
            let Some(&current) = self.registered.get(&fd) else {
                continue;
            };
            let Some(desired) = Self::desired_interest(conn) else {
                continue;
            };
            if desired != current {
                self.poll.registry().reregister(
                    &mut SourceFd(&fd),
                    Token(fd as usize),
                    desired,
                )?;
                self.registered.insert(fd, desired);
            }
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e.into()),
        }

        let mut completions = 0;
        for event in self.events.iter() {
            let fd = event.token().0 as RawFd;
            let Some(conn) = conns.iter().find(|c| c.fd() == Some(fd)) else {
                continue;
            };
            let readable = event.is_readable() || event.is_read_closed() || event.is_error();
            let writable = event.is_writable() || event.is_error();
            if handle_readiness(conn, readable, writable) > 0 {
                completions += 1;
            }
        }
        Ok(completions)
    }
}
