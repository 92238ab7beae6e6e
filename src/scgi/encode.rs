use bytes::{BufMut, BytesMut};
use super::defs;

/// Write one key/value pair of a header block
pub fn encode_name_value_pair(buf: &mut dyn BufMut, name: &[u8], value: &[u8])
{
    buf.put_slice(name);
    buf.put_u8(defs::SCGI_PAIR_SEPARATOR);
    buf.put_slice(value);
    buf.put_u8(defs::SCGI_PAIR_SEPARATOR);
}

/// Build a complete request: length prefix, header block, terminator
/// and body.
pub fn encode_request<'a, I>(pairs: I, body: &[u8]) -> BytesMut
    where I: IntoIterator<Item = (&'a [u8], &'a [u8])>
{
    let mut block = BytesMut::new();
    for (name, value) in pairs {
        encode_name_value_pair(&mut block, name, value);
    }
    let mut req = BytesMut::new();
    req.put_slice(block.len().to_string().as_bytes());
    req.put_u8(defs::SCGI_LENGTH_SEPARATOR);
    req.put(block);
    req.put_u8(defs::SCGI_TERMINATOR);
    req.put_slice(body);
    req
}

#[test]
fn test_encode_request()
{
    let pairs: Vec<(&[u8], &[u8])> = vec![
        (b"CONTENT_LENGTH", b"5"),
        (b"SCGI", b"1"),
    ];
    let req = encode_request(pairs, b"hello");
    assert_eq!(&req[..], &b"24:CONTENT_LENGTH\x005\x00SCGI\x001\x00,hello"[..]);
}
