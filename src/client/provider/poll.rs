use std::io;
use std::time::Duration;

use crate::client::conn::Connection;
use crate::error::Result;

use super::{NetProvider, handle_readiness, interest_of};

/// Level-triggered multiplexer over `poll(2)`.
///
/// The fd set is rebuilt from the registered connections on every step, so
/// registration itself carries no state.
#[derive(Debug, Default)]
pub struct PollNet;

impl PollNet {
    pub fn new() -> Self {
        Self
    }
}

impl NetProvider for PollNet {
    fn register(&mut self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    fn unregister(&mut self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    fn step(&mut self, conns: &[Connection], timeout: Option<Duration>) -> Result<usize> {
        let mut fds = Vec::with_capacity(conns.len());
        let mut owners = Vec::with_capacity(conns.len());

        for conn in conns {
            let Some((readable, writable)) = interest_of(conn) else {
                continue;
            };
            let Some(fd) = conn.fd() else {
                continue;
            };
            let mut events: libc::c_short = 0;
            if readable {
                events |= libc::POLLIN;
            }
            if writable {
                events |= libc::POLLOUT;
            }
            fds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
            owners.push(conn);
        }

        if fds.is_empty() {
            // Nothing to poll; burn at most a small slice of the deadline so
            // callers looping on dead connections notice their error slots.
            if let Some(d) = timeout {
                std::thread::sleep(d.min(Duration::from_millis(10)));
            }
            return Ok(0);
        }

        let timeout_ms: libc::c_int = match timeout {
            None => -1,
            Some(d) => d.as_millis().try_into().unwrap_or(libc::c_int::MAX),
        };

        // SAFETY: fds points at a live array of fds.len() pollfd entries.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err.into());
        }

        let mut completions = 0;
        for (pollfd, conn) in fds.iter().zip(owners) {
            let readable = pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
            let writable = pollfd.revents & (libc::POLLOUT | libc::POLLERR) != 0;
            if (readable || writable) && handle_readiness(conn, readable, writable) > 0 {
                completions += 1;
            }
        }
        Ok(completions)
    }
}
