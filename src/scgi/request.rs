use bytes::Bytes;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

/// One key/value string from the header block, without the NUL bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValuePair
{
    pub name: Bytes,
    pub value: Bytes
}

impl NameValuePair {
    pub fn new(name: Bytes, value: Bytes) -> NameValuePair
    {
        NameValuePair{name, value}
    }

    pub fn name_os(&self) -> &OsStr
    {
        OsStr::from_bytes(&self.name)
    }

    pub fn value_os(&self) -> &OsStr
    {
        OsStr::from_bytes(&self.value)
    }
}

/// A decoded request: the header pairs in the order they were received
/// and whatever part of the body arrived together with the headers.
#[derive(Debug)]
pub struct Request
{
    pub pairs: Vec<NameValuePair>,
    pub body_prefix: Bytes,
    /// The header block ended a read and a terminator was not required.
    /// A ',' at the start of the body still belongs to the header.
    pub terminator_pending: bool
}
