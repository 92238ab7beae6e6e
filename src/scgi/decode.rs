use bytes::{Buf, Bytes};
use super::defs;
use super::request::NameValuePair;
use crate::gateway_error::ProtocolError;

/// How to treat the byte following the header block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorPolicy
{
    /// The block must be followed by a comma.
    Strict,
    /// A comma is skipped if present, its absence is accepted.
    Tolerant
}

/// Location of the header block inside the request buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSpan
{
    pub start: usize,
    pub length: usize
}

impl HeaderSpan
{
    pub fn end(&self) -> usize
    {
        self.start + self.length
    }
}

/// Decode the decimal length prefix at the start of `buf`.
/// Returns `None` if the colon has not been received yet.
pub fn decode_header_length(buf: &[u8], capacity: usize)
                            -> Result<Option<HeaderSpan>, ProtocolError>
{
    let mut length: usize = 0;
    for (pos, &b) in buf.iter().enumerate() {
        match b {
            b'0'..=b'9' => {
                length = match length.checked_mul(10)
                    .and_then(|l| l.checked_add(usize::from(b - b'0')))
                {
                    Some(l) if l <= capacity => l,
                    _ => return Err(ProtocolError::HeadersTooBig)
                };
            },
            defs::SCGI_LENGTH_SEPARATOR => {
                if length == 0 {
                    return Err(ProtocolError::MessageSizeUnknown);
                }
                let start = pos + 1;
                if length > capacity.saturating_sub(start) {
                    return Err(ProtocolError::HeadersTooBig);
                }
                return Ok(Some(HeaderSpan{start, length}));
            },
            _ => return Err(ProtocolError::HeaderLengthUnknown)
        }
    }
    Ok(None)
}

/// Check the bytes following the header block.
/// Returns the number of bytes to skip, or `None` if more input is needed.
pub fn check_terminator(rest: &[u8], eof: bool, policy: TerminatorPolicy)
                        -> Result<Option<usize>, ProtocolError>
{
    match (rest.first(), policy) {
        (Some(&defs::SCGI_TERMINATOR), _) => Ok(Some(1)),
        (Some(_), TerminatorPolicy::Strict) =>
            Err(ProtocolError::TerminatorMissing),
        (None, TerminatorPolicy::Strict) if eof =>
            Err(ProtocolError::TerminatorMissing),
        (None, TerminatorPolicy::Strict) => Ok(None),
        (_, TerminatorPolicy::Tolerant) => Ok(Some(0))
    }
}

fn split_string(block: &mut Bytes) -> Result<Bytes, ProtocolError>
{
    let end = block.iter()
        .position(|&b| b == defs::SCGI_PAIR_SEPARATOR)
        .ok_or(ProtocolError::MalformedHeaders)?;
    let s = block.split_to(end);
    block.advance(1);
    Ok(s)
}

/// Split a header block into its key/value pairs.
pub fn decode_pairs(mut block: Bytes)
                    -> Result<Vec<NameValuePair>, ProtocolError>
{
    let mut pairs = Vec::new();
    while !block.is_empty() {
        let name = split_string(&mut block)?;
        let value = split_string(&mut block)?;
        if name.is_empty() || name.contains(&b'=') {
            return Err(ProtocolError::MalformedHeaders);
        }
        pairs.push(NameValuePair::new(name, value));
    }
    Ok(pairs)
}

#[test]
fn test_decode_header_length()
{
    let span = decode_header_length(b"24:CONTENT_LENGTH\0", 8192).unwrap();
    assert_eq!(span, Some(HeaderSpan{start: 3, length: 24}));
    assert_eq!(span.unwrap().end(), 27);
}

#[test]
fn test_decode_header_length_incomplete()
{
    assert_eq!(decode_header_length(b"", 8192), Ok(None));
    assert_eq!(decode_header_length(b"12", 8192), Ok(None));
}

#[test]
fn test_decode_header_length_zero()
{
    assert_eq!(decode_header_length(b"0:", 8192),
               Err(ProtocolError::MessageSizeUnknown));
    assert_eq!(decode_header_length(b":abc", 8192),
               Err(ProtocolError::MessageSizeUnknown));
}

#[test]
fn test_decode_header_length_not_digit()
{
    assert_eq!(decode_header_length(b"1a:", 8192),
               Err(ProtocolError::HeaderLengthUnknown));
    assert_eq!(decode_header_length(b"GET / HTTP/1.0", 8192),
               Err(ProtocolError::HeaderLengthUnknown));
}

#[test]
fn test_decode_header_length_too_big()
{
    // Rejected while the digits are still arriving
    assert_eq!(decode_header_length(b"8193", 8192),
               Err(ProtocolError::HeadersTooBig));
    // Fits the buffer only without the prefix
    assert_eq!(decode_header_length(b"8190:", 8192),
               Err(ProtocolError::HeadersTooBig));
    assert_eq!(decode_header_length(b"8187:", 8192),
               Ok(Some(HeaderSpan{start: 5, length: 8187})));
    // Too many digits for any capacity
    assert_eq!(decode_header_length(b"99999999999999999999999:", usize::MAX),
               Err(ProtocolError::HeadersTooBig));
}

#[test]
fn test_check_terminator()
{
    use TerminatorPolicy::*;
    assert_eq!(check_terminator(b",body", false, Strict), Ok(Some(1)));
    assert_eq!(check_terminator(b"", false, Strict), Ok(None));
    assert_eq!(check_terminator(b"", true, Strict),
               Err(ProtocolError::TerminatorMissing));
    assert_eq!(check_terminator(b"x", false, Strict),
               Err(ProtocolError::TerminatorMissing));
    assert_eq!(check_terminator(b",", false, Tolerant), Ok(Some(1)));
    assert_eq!(check_terminator(b"", false, Tolerant), Ok(Some(0)));
    assert_eq!(check_terminator(b"x", true, Tolerant), Ok(Some(0)));
}

#[test]
fn test_decode_pairs()
{
    let block = Bytes::from_static(
        b"CONTENT_LENGTH\09\0SCRIPT_FILENAME\0/usr/bin/true\0EMPTY\0\0");
    let pairs = decode_pairs(block).unwrap();
    assert_eq!(pairs, vec![
        NameValuePair::new(Bytes::from_static(b"CONTENT_LENGTH"),
                           Bytes::from_static(b"9")),
        NameValuePair::new(Bytes::from_static(b"SCRIPT_FILENAME"),
                           Bytes::from_static(b"/usr/bin/true")),
        NameValuePair::new(Bytes::from_static(b"EMPTY"),
                           Bytes::new()),
    ]);
}

#[test]
fn test_decode_pairs_empty_block()
{
    assert_eq!(decode_pairs(Bytes::new()), Ok(vec![]));
}

#[test]
fn test_decode_pairs_malformed()
{
    // Key without value
    assert_eq!(decode_pairs(Bytes::from_static(b"A\01\0B\0")),
               Err(ProtocolError::MalformedHeaders));
    // Value without NUL
    assert_eq!(decode_pairs(Bytes::from_static(b"A\01")),
               Err(ProtocolError::MalformedHeaders));
    assert_eq!(decode_pairs(Bytes::from_static(b"\0value\0")),
               Err(ProtocolError::MalformedHeaders));
    assert_eq!(decode_pairs(Bytes::from_static(b"A=B\0value\0")),
               Err(ProtocolError::MalformedHeaders));
}
