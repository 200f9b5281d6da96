use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};
use crate::opts::{Opts, Transport};

#[cfg(feature = "tls")]
use native_tls::{HandshakeError, MidHandshakeTlsStream, TlsStream};

/// One transport endpoint in non-blocking mode.
///
/// Plain TCP, UNIX socket and TLS all satisfy the same send/recv contract;
/// the net provider only ever talks to this type. The TCP connect itself is
/// performed with `connect_timeout`; the TLS handshake is driven from the
/// event loop through [`Stream::handshake_step`].
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
    #[cfg(feature = "tls")]
    TlsMid(Option<Box<MidHandshakeTlsStream<TcpStream>>>),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    pub fn connect(opts: &Opts) -> Result<Self> {
        if opts.is_unix() {
            let stream = UnixStream::connect(&opts.address)?;
            stream.set_nonblocking(true)?;
            return Ok(Stream::Unix(stream));
        }

        let addrs: Vec<SocketAddr> = (opts.address.as_str(), opts.port)
            .to_socket_addrs()
            .map_err(|e| Error::Dns(format!("{}: {}", opts.address, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Dns(opts.address.clone()));
        }

        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, opts.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(opts.tcp_nodelay)?;
                    match opts.transport {
                        Transport::Plain => {
                            stream.set_nonblocking(true)?;
                            return Ok(Stream::Tcp(stream));
                        }
                        Transport::Ssl => return Self::start_tls(stream, opts),
                    }
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(Error::from)
            .unwrap_or_else(|| Error::Dns(opts.address.clone())))
    }

    #[cfg(feature = "tls")]
    fn start_tls(stream: TcpStream, opts: &Opts) -> Result<Self> {
        let mut builder = native_tls::TlsConnector::builder();
        match &opts.ca_file {
            Some(path) => {
                let pem = std::fs::read(path)?;
                let cert = native_tls::Certificate::from_pem(&pem)
                    .map_err(|e| Error::TlsHandshake(e.to_string()))?;
                builder.add_root_certificate(cert);
            }
            // Servers in this protocol family routinely run self-signed.
            None => {
                builder.danger_accept_invalid_certs(true);
                builder.danger_accept_invalid_hostnames(true);
            }
        }
        if let (Some(cert_path), Some(key_path)) = (&opts.cert_file, &opts.key_file) {
            let cert = std::fs::read(cert_path)?;
            let key = std::fs::read(key_path)?;
            let identity = native_tls::Identity::from_pkcs8(&cert, &key)
                .map_err(|e| Error::TlsHandshake(e.to_string()))?;
            builder.identity(identity);
        }
        let connector = builder
            .build()
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;

        stream.set_nonblocking(true)?;
        match connector.connect(&opts.address, stream) {
            Ok(tls) => Ok(Stream::Tls(Box::new(tls))),
            Err(HandshakeError::WouldBlock(mid)) => Ok(Stream::TlsMid(Some(Box::new(mid)))),
            Err(HandshakeError::Failure(e)) => Err(Error::TlsHandshake(e.to_string())),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn start_tls(_stream: TcpStream, _opts: &Opts) -> Result<Self> {
        Err(Error::BadConfig(
            "SSL transport requested but the tls feature is not enabled".to_string(),
        ))
    }

    /// True while the TLS handshake has not completed; the readiness loop
    /// keeps calling [`Stream::handshake_step`] until this turns false.
    pub fn is_handshaking(&self) -> bool {
        #[cfg(feature = "tls")]
        if matches!(self, Stream::TlsMid(_)) {
            return true;
        }
        false
    }

    /// Drive the TLS handshake one step; `Ok(true)` once the stream is
    /// established. A no-op for plain transports.
    pub fn handshake_step(&mut self) -> Result<bool> {
        #[cfg(feature = "tls")]
        if let Stream::TlsMid(slot) = self {
            let Some(mid) = slot.take() else {
                return Err(Error::TlsHandshake("handshake state lost".to_string()));
            };
            return match mid.handshake() {
                Ok(tls) => {
                    *self = Stream::Tls(Box::new(tls));
                    Ok(true)
                }
                Err(HandshakeError::WouldBlock(again)) => {
                    *slot = Some(Box::new(again));
                    Ok(false)
                }
                Err(HandshakeError::Failure(e)) => Err(Error::TlsHandshake(e.to_string())),
            };
        }
        Ok(true)
    }

    /// Readiness the stream currently cares about. Mid-handshake TLS cannot
    /// tell whether it wants to read or write next, so it subscribes to both.
    pub fn wants_read(&self) -> bool {
        true
    }

    pub fn wants_write(&self, out_pending: bool) -> bool {
        if self.is_handshaking() {
            return true;
        }
        out_pending
    }

    pub fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Stream::TlsMid(_) => Err(std::io::ErrorKind::WouldBlock.into()),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.write(buf),
        }
    }

    pub fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Stream::TlsMid(_) => Err(std::io::ErrorKind::WouldBlock.into()),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.read(buf),
        }
    }

    pub fn fd(&self) -> RawFd {
        match self {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Unix(s) => s.as_raw_fd(),
            #[cfg(feature = "tls")]
            Stream::TlsMid(slot) => slot
                .as_ref()
                .map(|mid| mid.get_ref().as_raw_fd())
                .unwrap_or(-1),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.get_ref().as_raw_fd(),
        }
    }

    pub fn close(&mut self) {
        match self {
            Stream::Tcp(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            Stream::Unix(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            #[cfg(feature = "tls")]
            Stream::TlsMid(slot) => {
                if let Some(mid) = slot {
                    let _ = mid.get_ref().shutdown(Shutdown::Both);
                }
            }
            #[cfg(feature = "tls")]
            Stream::Tls(s) => {
                let _ = s.shutdown();
            }
        }
    }
}
