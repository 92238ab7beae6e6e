//! Listening socket and accept loop.
//!
//! The gateway listens either on a TCP port or on a Unix-domain socket.
//! Every accepted connection is served by its own task; at most
//! `max_connections` are in flight; further connections wait in the
//! listen backlog until a slot frees up. Failing to accept is fatal.

use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};
use crate::config::{Endpoint, GatewayConfig};
use crate::scgi::connection::handle_connection;
use crate::scgi::defs;

#[derive(Debug, Error)]
pub enum ListenerError
{
    #[error("failed to bind socket: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Source of client connections
#[async_trait]
pub trait Acceptor: Send
{
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection. Returns the stream and a peer
    /// description for logging.
    async fn accept_connection(&mut self) -> io::Result<(Self::Stream, String)>;
}

#[async_trait]
impl Acceptor for TcpListener
{
    type Stream = TcpStream;

    async fn accept_connection(&mut self) -> io::Result<(TcpStream, String)>
    {
        let (stream, addr) = self.accept().await?;
        Ok((stream, addr.to_string()))
    }
}

#[async_trait]
impl Acceptor for UnixListener
{
    type Stream = UnixStream;

    async fn accept_connection(&mut self) -> io::Result<(UnixStream, String)>
    {
        let (stream, addr) = self.accept().await?;
        let peer = match addr.as_pathname() {
            Some(path) => path.display().to_string(),
            None => "local".to_string()
        };
        Ok((stream, peer))
    }
}

/// A bound, listening socket
pub enum BoundListener
{
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf)
}

fn bind_tcp(port: u16) -> io::Result<TcpListener>
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(defs::LISTEN_BACKLOG)
}

fn bind_unix(path: &Path) -> io::Result<UnixListener>
{
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(
        path, std::fs::Permissions::from_mode(defs::UNIX_SOCKET_MODE))?;
    Ok(listener)
}

/// Bind the configured endpoint. Must be called from within a Tokio
/// runtime.
pub fn bind(endpoint: &Endpoint) -> Result<BoundListener, ListenerError>
{
    match endpoint {
        Endpoint::Tcp(port) => {
            let listener = bind_tcp(*port).map_err(ListenerError::Bind)?;
            info!(port, "Listening on TCP port");
            Ok(BoundListener::Tcp(listener))
        },
        Endpoint::Unix(path) => {
            let listener = bind_unix(path).map_err(ListenerError::Bind)?;
            info!(path = %path.display(), "Listening on Unix socket");
            Ok(BoundListener::Unix(listener, path.clone()))
        }
    }
}

impl BoundListener
{
    /// Path of the socket file, for Unix-domain listeners
    pub fn socket_path(&self) -> Option<&Path>
    {
        match self {
            BoundListener::Tcp(_) => None,
            BoundListener::Unix(_, path) => Some(path)
        }
    }

    pub async fn serve(self, config: Arc<GatewayConfig>) -> Result<(), ListenerError>
    {
        match self {
            BoundListener::Tcp(listener) => serve(listener, config).await,
            BoundListener::Unix(listener, _) => serve(listener, config).await
        }
    }
}

/// Accept connections until accepting fails.
pub async fn serve<A>(mut acceptor: A, config: Arc<GatewayConfig>)
                      -> Result<(), ListenerError>
    where A: Acceptor
{
    let limit = Arc::new(Semaphore::new(config.max_connections));
    loop {
        let permit = match limit.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Ok(())
        };
        let (stream, peer) = match acceptor.accept_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("failed to accept connection: {}", e);
                return Err(ListenerError::Accept(e));
            }
        };
        debug!(peer = %peer, "Connection accepted");
        let config = config.clone();
        tokio::spawn(async move {
            handle_connection(stream, config, peer).await;
            drop(permit);
        });
    }
}

#[cfg(test)]
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
#[cfg(test)]
use tokio::runtime::Runtime;

/// Hands out queued in-memory connections, then fails
#[cfg(test)]
struct QueuedAcceptor
{
    pending: Vec<DuplexStream>
}

#[cfg(test)]
#[async_trait]
impl Acceptor for QueuedAcceptor
{
    type Stream = DuplexStream;

    async fn accept_connection(&mut self) -> io::Result<(DuplexStream, String)>
    {
        match self.pending.pop() {
            Some(stream) => Ok((stream, "memory".to_string())),
            None => Err(io::Error::new(io::ErrorKind::Other,
                                       "too many open files"))
        }
    }
}

#[test]
fn test_accept_failure_is_fatal()
{
    let rt = Runtime::new().unwrap();
    let acceptor = QueuedAcceptor{pending: Vec::new()};
    match rt.block_on(serve(acceptor, Arc::new(GatewayConfig::default()))) {
        Err(ListenerError::Accept(e)) =>
            assert_eq!(e.kind(), io::ErrorKind::Other),
        other => panic!("Unexpected result {:?}", other)
    }
}

#[test]
fn test_accept_failure_after_connection()
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (mut client, server) = tokio::io::duplex(1024);
        let acceptor = QueuedAcceptor{pending: vec![server]};
        let res = serve(acceptor, Arc::new(GatewayConfig::default())).await;
        assert!(matches!(res, Err(ListenerError::Accept(_))));
        // The accepted connection is still served
        client.write_all(b"0:,").await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.ends_with(b"Message size is unknown\n"));
    });
}
