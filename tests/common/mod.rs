//! Shared helpers for the gateway integration tests.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use scgi_gateway::config::GatewayConfig;
use scgi_gateway::listener;
use scgi_gateway::scgi::encode::encode_request;

/// Write an executable shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf
{
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .unwrap();
    path
}

/// Start a gateway on an ephemeral local port.
pub async fn start_gateway(config: GatewayConfig) -> SocketAddr
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener::serve(listener, Arc::new(config)).await;
    });
    addr
}

/// Encode a request from string pairs.
pub fn request(pairs: &[(&str, &str)], body: &[u8]) -> BytesMut
{
    encode_request(pairs.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())),
                   body)
}

/// Send raw bytes, half-close, and collect the whole response.
pub async fn send(addr: SocketAddr, data: &[u8]) -> Vec<u8>
{
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(data).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

pub async fn send_text(addr: SocketAddr, data: &[u8]) -> String
{
    String::from_utf8(send(addr, data).await).unwrap()
}

/// First of `candidates` that exists on this system.
pub fn system_binary(candidates: &[&str]) -> String
{
    candidates.iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
        .unwrap_or_else(|| panic!("None of {:?} found", candidates))
}
