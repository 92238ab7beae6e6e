use bytes::{Buf, BytesMut};
use std::marker::Unpin;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use super::decode::{self, HeaderSpan, TerminatorPolicy};
use super::request::Request;
use crate::gateway_error::{GatewayError, ProtocolError};

/// Reads one request from a connection into a buffer of fixed capacity.
///
/// Reading continues across as many reads as the transport needs until
/// the length prefix, the declared header block and (depending on the
/// policy) the terminator have arrived.
pub struct RequestReader
{
    capacity: usize,
    policy: TerminatorPolicy
}

impl RequestReader
{
    pub fn new(capacity: usize, policy: TerminatorPolicy) -> RequestReader
    {
        RequestReader{capacity, policy}
    }

    /// Returns `None` if the peer closed the connection without sending
    /// anything.
    pub async fn read<I>(&self, input: &mut I)
                         -> Result<Option<Request>, GatewayError>
        where I: AsyncRead + Unpin
    {
        let mut buffer = BytesMut::zeroed(self.capacity);
        let mut filled = 0;
        let mut span: Option<HeaderSpan> = None;
        let mut eof = false;
        loop {
            if span.is_none() {
                span = decode::decode_header_length(&buffer[..filled],
                                                    self.capacity)?;
                if let Some(s) = span {
                    debug!(length = s.length, "request length");
                    if self.policy == TerminatorPolicy::Strict
                        && s.end() >= self.capacity
                    {
                        return Err(ProtocolError::HeadersTooBig.into());
                    }
                }
            }
            if let Some(s) = span {
                if filled >= s.end() {
                    let skip = decode::check_terminator(
                        &buffer[s.end()..filled], eof, self.policy)?;
                    if let Some(skip) = skip {
                        let terminator_pending = skip == 0 && !eof
                            && filled == s.end();
                        buffer.truncate(filled);
                        let mut head = buffer.split_to(s.end());
                        buffer.advance(skip);
                        let block = head.split_off(s.start).freeze();
                        let pairs = decode::decode_pairs(block)?;
                        return Ok(Some(Request{pairs,
                                               body_prefix: buffer.freeze(),
                                               terminator_pending}));
                    }
                }
            }
            if eof {
                let err = if span.is_some() {
                    ProtocolError::MessageSizeOutOfRange
                } else {
                    ProtocolError::MessageSizeUnknown
                };
                return Err(err.into());
            }
            if filled == self.capacity {
                return Err(ProtocolError::MessageSizeOutOfRange.into());
            }
            let n = input.read(&mut buffer[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                eof = true;
            }
            filled += n;
        }
    }
}

#[cfg(test)]
use tokio::runtime::Runtime;
#[cfg(test)]
use tokio::io::AsyncWriteExt;
#[cfg(test)]
use bytes::Bytes;

#[cfg(test)]
fn read_fragments(reader: RequestReader, fragments: Vec<&'static [u8]>)
                  -> Result<Option<Request>, GatewayError>
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            for f in fragments {
                if client.write_all(f).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });
        let res = reader.read(&mut server).await;
        drop(server);
        writer.await.unwrap();
        res
    })
}

#[cfg(test)]
fn protocol_error(res: Result<Option<Request>, GatewayError>) -> ProtocolError
{
    match res {
        Err(GatewayError::Protocol(e)) => e,
        other => panic!("Expected protocol error, got {:?}", other)
    }
}

#[test]
fn test_read_fragmented()
{
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    let req = read_fragments(reader, vec![
        &b"2"[..], b"4:CONTENT_", b"LENGTH\x005\x00SC", b"GI\x001\x00", b",he", b"llo"
    ]).unwrap().unwrap();
    assert_eq!(req.pairs.len(), 2);
    assert_eq!(req.pairs[0].name, Bytes::from_static(b"CONTENT_LENGTH"));
    assert_eq!(req.pairs[1].value, Bytes::from_static(b"1"));
    // The body may or may not have arrived with the terminator
    assert!(b"he".starts_with(&req.body_prefix)
            || req.body_prefix.starts_with(b"he"));
}

#[test]
fn test_read_empty_connection()
{
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert!(read_fragments(reader, vec![]).unwrap().is_none());
}

#[test]
fn test_read_zero_length()
{
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"0:,"[..]])),
               ProtocolError::MessageSizeUnknown);
}

#[test]
fn test_read_truncated()
{
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"10:A\x00B\x00"[..]])),
               ProtocolError::MessageSizeOutOfRange);
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"10"[..]])),
               ProtocolError::MessageSizeUnknown);
}

#[test]
fn test_read_too_big()
{
    let reader = RequestReader::new(16, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"17:"[..]])),
               ProtocolError::HeadersTooBig);
    // No room left for the terminator
    let reader = RequestReader::new(16, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"13:"[..]])),
               ProtocolError::HeadersTooBig);
}

#[test]
fn test_read_no_colon_fills_buffer()
{
    let reader = RequestReader::new(8, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"00000000000"[..]])),
               ProtocolError::MessageSizeOutOfRange);
}

#[test]
fn test_read_terminator_policy()
{
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"4:A\x00B\x00"[..]])),
               ProtocolError::TerminatorMissing);
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"4:A\x00B\x00;"[..]])),
               ProtocolError::TerminatorMissing);

    let reader = RequestReader::new(8192, TerminatorPolicy::Tolerant);
    let req = read_fragments(reader, vec![&b"4:A\x00B\x00"[..]]).unwrap().unwrap();
    assert_eq!(req.pairs.len(), 1);
    assert!(req.body_prefix.is_empty());
    // The ',' may still follow in a later read
    assert!(req.terminator_pending);

    let reader = RequestReader::new(8192, TerminatorPolicy::Tolerant);
    let req = read_fragments(reader, vec![&b"4:A\x00B\x00,ab"[..]]).unwrap().unwrap();
    assert_eq!(req.body_prefix, Bytes::from_static(b"ab"));
    assert!(!req.terminator_pending);

    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    let req = read_fragments(reader, vec![&b"4:A\x00B\x00"[..], b","]).unwrap().unwrap();
    assert!(!req.terminator_pending);
}

#[test]
fn test_read_malformed_block()
{
    let reader = RequestReader::new(8192, TerminatorPolicy::Strict);
    assert_eq!(protocol_error(read_fragments(reader, vec![&b"6:A\x001\x00B\x00,"[..]])),
               ProtocolError::MalformedHeaders);
}
