use std::marker::Unpin;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tracing::{debug, error, info, warn, Level};
use super::output::ResponseOutput;
use crate::gateway_error::GatewayError;

const ERROR_HEAD: &'static str =
    "Status: 500 Internal Error\r\nContent-Type: text/plain\r\n\r\n";

/// The diagnostic response sent instead of script output
pub fn error_response(message: &str) -> Bytes
{
    let mut reply = BytesMut::with_capacity(ERROR_HEAD.len() + message.len() + 1);
    reply.put_slice(ERROR_HEAD.as_bytes());
    reply.put_slice(message.as_bytes());
    reply.put_u8(b'\n');
    reply.freeze()
}

pub fn log_error(err: &GatewayError, peer: &str)
{
    let level = err.severity();
    if level == Level::ERROR {
        error!(peer, "{}", err);
    } else if level == Level::WARN {
        warn!(peer, "{}", err);
    } else if level == Level::INFO {
        info!(peer, "{}", err);
    } else {
        debug!(peer, "{}", err);
    }
}

/// Log `err` and, if the connection can still carry it, send the
/// diagnostic response. Must only be used before any script output has
/// been written.
pub async fn report<O>(output: &mut ResponseOutput<O>, err: &GatewayError,
                       peer: &str)
    where O: AsyncWrite + Unpin
{
    log_error(err, peer);
    if let Some(msg) = err.client_message() {
        if let Err(e) = output.write(&error_response(&msg)).await {
            debug!(peer, "Failed to send error reply: {}", e);
        }
    }
}

#[cfg(test)]
use tokio::runtime::Runtime;
#[cfg(test)]
use crate::gateway_error::{ExecutionError, ProtocolError};

#[test]
fn test_error_response()
{
    assert_eq!(&error_response("Headers are too big")[..],
               &b"Status: 500 Internal Error\r\nContent-Type: text/plain\r\n\r\nHeaders are too big\n"[..]);
}

#[test]
fn test_report()
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut output = ResponseOutput::new(Vec::new(), 8192);
        let err = GatewayError::from(ExecutionError::PrimaryScriptUnknown);
        report(&mut output, &err, "test").await;
        let sent = String::from_utf8(output.into_inner()).unwrap();
        assert!(sent.starts_with("Status: 500 Internal Error\r\n"));
        assert!(sent.ends_with("\r\n\r\nPrimary script is unknown\n"));

        let mut output = ResponseOutput::new(Vec::new(), 8192);
        let err = GatewayError::from(ProtocolError::MessageSizeUnknown);
        report(&mut output, &err, "test").await;
        let sent = String::from_utf8(output.into_inner()).unwrap();
        assert!(sent.ends_with("Message size is unknown\n"));
    });
}
