use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use log::{debug, error, info};
use serde_json::Deserializer;

use crate::common::Request;
use crate::engines::StorageEngine;
use crate::service::KvsService;
use crate::thread_pool::ThreadPool;
use crate::{KvError, Result};

/// Address the server listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddr {
    /// A TCP address. Port 0 picks a free port.
    Tcp(String, u16),
    /// A unix domain socket path.
    Unix(PathBuf),
}

impl BindAddr {
    /// Parses `HOST[:PORT]` or `unix:PATH`.
    ///
    /// `*` as host binds every local IPv4 address; an omitted port picks one
    /// automatically. IPv6 hosts go in brackets: `[::1]:4000`.
    pub fn parse(addr: &str) -> Result<Self> {
        if let Some(path) = addr.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(KvError::InvalidAddress(addr.to_owned()));
            }
            return Ok(BindAddr::Unix(PathBuf::from(path)));
        }

        let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| KvError::InvalidAddress(addr.to_owned()))?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(KvError::InvalidAddress(addr.to_owned())),
                },
            }
        } else {
            match addr.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (addr, None),
            }
        };

        if host.is_empty() {
            return Err(KvError::InvalidAddress(addr.to_owned()));
        }
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| KvError::InvalidAddress(addr.to_owned()))?,
            None => 0,
        };
        let host = if host == "*" { "0.0.0.0" } else { host };
        Ok(BindAddr::Tcp(host.to_owned(), port))
    }
}

/// A bound listening socket.
pub enum Listener {
    /// TCP listener.
    Tcp(TcpListener),
    /// Unix domain socket listener, with the path it is bound to.
    Unix(UnixListener, PathBuf),
}

impl Listener {
    /// Returns the TCP address bound, if this is a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Unix(..) => None,
        }
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => write!(f, "port {}", addr.port()),
                Err(_) => write!(f, "port ?"),
            },
            Listener::Unix(_, path) => write!(f, "unix socket [{}]", path.display()),
        }
    }
}

/// The RPC server.
///
/// Generic over both the storage engine `E` and the thread pool `P`.
/// Each accepted connection is handled on the pool; all connections share
/// one [`KvsService`].
pub struct KvsServer<E: StorageEngine, P: ThreadPool> {
    service: KvsService<E>,
    pool: P,
}

impl<E: StorageEngine + Sync, P: ThreadPool> KvsServer<E, P> {
    /// Creates a `KvsServer` with a given service and thread pool.
    pub fn new(service: KvsService<E>, pool: P) -> Self {
        Self { service, pool }
    }

    /// Binds a listener without accepting connections yet.
    ///
    /// A stale socket file at a unix socket path is removed first.
    pub fn bind(&self, addr: &BindAddr) -> Result<Listener> {
        match addr {
            BindAddr::Tcp(host, port) => {
                Ok(Listener::Tcp(TcpListener::bind((host.as_str(), *port))?))
            }
            BindAddr::Unix(path) => {
                if path.exists() {
                    fs::remove_file(path)?;
                }
                Ok(Listener::Unix(UnixListener::bind(path)?, path.clone()))
            }
        }
    }

    /// Accepts connections forever, dispatching each one to the pool.
    pub fn serve(&self, listener: Listener) -> Result<()> {
        info!("Serving on {}", listener);
        match listener {
            Listener::Tcp(listener) => {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let peer = stream
                                .peer_addr()
                                .map(|a| a.to_string())
                                .unwrap_or_else(|_| "unknown".to_owned());
                            let reader = stream.try_clone();
                            self.accept(peer, stream, reader);
                        }
                        Err(e) => error!("Connection failed: {}", e),
                    }
                }
            }
            Listener::Unix(listener, _) => {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let reader = stream.try_clone();
                            self.accept("unix peer".to_owned(), stream, reader);
                        }
                        Err(e) => error!("Connection failed: {}", e),
                    }
                }
            }
        }

        Ok(())
    }

    /// Hands one accepted connection to the pool. A connection whose read
    /// half could not be cloned is dropped; the listener keeps going.
    fn accept<S>(&self, peer: String, stream: S, reader: io::Result<S>)
    where
        S: Read + Write + Send + 'static,
    {
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                error!("Cannot serve {}: {}", peer, e);
                return;
            }
        };
        let service = self.service.clone();
        self.pool.spawn(move || {
            if let Err(e) = handle_connection(&service, &peer, reader, stream) {
                error!("Error handling connection from {}: {}", peer, e);
            }
        });
    }
}

/// Serves one client: one response per request, in order, until the client
/// hangs up.
fn handle_connection<E: StorageEngine>(
    service: &KvsService<E>,
    peer: &str,
    reader: impl Read,
    writer: impl Write,
) -> Result<()> {
    debug!("Accepted connection from {}", peer);

    let mut writer = BufWriter::new(writer);
    let requests = Deserializer::from_reader(reader).into_iter::<Request>();

    for request in requests {
        let request = request?;
        debug!("Received request from {}: {:?}", peer, request);

        let response = service.handle_request(request);

        serde_json::to_writer(&mut writer, &response)?;
        writer.flush()?;
    }

    debug!("Connection from {} closed", peer);
    Ok(())
}
