use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::greeting::scramble;

use super::conn::{ConnState, Connection, Rid};
use super::provider::{MioNet, NetProvider, PollNet};

/// User-facing façade: owns a net provider and the set of connections it
/// drives. All wait primitives suspend inside [`NetProvider::step`]; nothing
/// else in the crate blocks.
///
/// A connector and its connections form one single-threaded domain. For
/// parallelism, run one connector per thread.
pub struct Connector<P: NetProvider = PollNet> {
    provider: P,
    conns: Vec<Connection>,
}

impl Connector<PollNet> {
    pub fn new() -> Self {
        Self::with_provider(PollNet::new())
    }
}

impl Default for Connector<PollNet> {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector<MioNet> {
    /// A connector driven by the mio reactor instead of raw `poll(2)`.
    pub fn reactor() -> Result<Self> {
        Ok(Self::with_provider(MioNet::new()?))
    }
}

impl<P: NetProvider> Connector<P> {
    pub fn with_provider(provider: P) -> Self {
        Self {
            provider,
            conns: Vec::new(),
        }
    }

    /// Establish `conn` per `opts`: transport connect (and TLS handshake),
    /// greeting exchange, then a synchronous auth round-trip when
    /// credentials are present. Returns once the connection is ready for
    /// requests or the connect timeout expires.
    pub fn connect(&mut self, conn: &Connection, opts: &Opts) -> Result<()> {
        let deadline = Instant::now() + opts.connect_timeout;

        conn.start_connect(opts)?;
        if !self.conns.contains(conn) {
            self.conns.push(conn.clone());
        }
        self.provider.register(conn)?;

        while conn.state() != ConnState::Ready {
            if let Some(err) = conn.get_error() {
                return Err(err);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                conn.core.borrow_mut().fail(Error::Timeout);
                return Err(Error::Timeout);
            }
            self.provider.step(&self.conns, Some(remaining))?;
        }

        if opts.user.is_empty() {
            return Ok(());
        }

        let Some(salt) = conn.salt() else {
            return Err(Error::NotConnected);
        };
        let proof = scramble(opts.password.as_deref().unwrap_or(""), &salt);
        let rid = conn.submit_auth(&opts.user, &proof)?;
        self.wait_deadline(conn, rid, Some(deadline))?;

        let Some(response) = conn.get_response(rid) else {
            return Err(Error::Timeout);
        };
        if response.header.is_error() {
            let err = response
                .body
                .error_stack
                .as_ref()
                .and_then(|stack| stack.first())
                .cloned()
                .map(Error::Server)
                .unwrap_or(Error::UnexpectedFrame("auth rejected"));
            conn.core.borrow_mut().fail(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Cancel all pendings on `conn` and drop it from the loop.
    pub fn close(&mut self, conn: &Connection) {
        let _ = self.provider.unregister(conn);
        self.conns.retain(|c| c != conn);
        conn.close();
    }

    /// Step until `rid` is ready. `Some(Duration::ZERO)` performs one
    /// non-blocking pass; `None` waits without bound. A timeout does not
    /// cancel the request: the rid stays pending and the wait may be
    /// retried.
    pub fn wait(&mut self, conn: &Connection, rid: Rid, timeout: Option<Duration>) -> Result<()> {
        self.wait_deadline(conn, rid, timeout.map(|t| Instant::now() + t))
    }

    fn wait_deadline(
        &mut self,
        conn: &Connection,
        rid: Rid,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let watched = conn.clone();
        self.drive(Some(conn), deadline, move || watched.future_is_ready(rid))
    }

    /// Step until every rid in `rids` is ready.
    pub fn wait_all(
        &mut self,
        conn: &Connection,
        rids: &[Rid],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let watched = conn.clone();
        let rids = rids.to_vec();
        self.drive(Some(conn), deadline, move || {
            rids.iter().all(|rid| watched.future_is_ready(*rid))
        })
    }

    /// Step until `conn` holds at least `count` ready responses.
    pub fn wait_count(
        &mut self,
        conn: &Connection,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let watched = conn.clone();
        self.drive(Some(conn), deadline, move || watched.ready_count() >= count)
    }

    /// Step until any registered connection holds a ready response, and
    /// return it.
    pub fn wait_any(&mut self, timeout: Option<Duration>) -> Result<Connection> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut stepped = false;
        loop {
            if let Some(conn) = self.conns.iter().find(|c| c.ready_count() > 0) {
                return Ok(conn.clone());
            }
            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let r = d.saturating_duration_since(Instant::now());
                    if r.is_zero() && stepped {
                        return Err(Error::Timeout);
                    }
                    Some(r)
                }
            };
            self.provider.step(&self.conns, remaining)?;
            stepped = true;
        }
    }

    fn drive<F>(&mut self, watch: Option<&Connection>, deadline: Option<Instant>, mut done: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        let mut stepped = false;
        loop {
            if done() {
                return Ok(());
            }
            if let Some(conn) = watch {
                if let Some(err) = conn.get_error() {
                    return Err(err);
                }
                match conn.state() {
                    ConnState::Closed => return Err(Error::Closed),
                    ConnState::New => return Err(Error::NotConnected),
                    _ => {}
                }
            }
            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let r = d.saturating_duration_since(Instant::now());
                    if r.is_zero() && stepped {
                        return Err(Error::Timeout);
                    }
                    Some(r)
                }
            };
            self.provider.step(&self.conns, remaining)?;
            stepped = true;
        }
    }
}
