/// Capacity of the buffer holding one request (length prefix, header
/// block and terminator).
pub const SCGI_MSG_SZ: usize = 8192;

/// Bounds for a configured request buffer capacity
pub const SCGI_MIN_MSG_SZ: usize = 16;
pub const SCGI_MAX_MSG_SZ: usize = 1 << 20;

/// Size of the chunks relayed from the script to the client.
pub const SCGI_CHUNK_SZ: usize = 8192;

/// Separates the decimal length prefix from the header block
pub const SCGI_LENGTH_SEPARATOR: u8 = b':';

/// Terminates key and value strings inside the header block
pub const SCGI_PAIR_SEPARATOR: u8 = 0;

/// Follows the header block in a conforming request
pub const SCGI_TERMINATOR: u8 = b',';

/// Variable always passed to the script, identifying the protocol.
pub const SCGI_MARKER: &'static str = "SCGI";
pub const SCGI_MARKER_VALUE: &'static str = "1";

/// Variable naming the script to execute
pub const SCRIPT_FILENAME: &'static str = "SCRIPT_FILENAME";

/// Variable giving the size of the request body
pub const CONTENT_LENGTH: &'static str = "CONTENT_LENGTH";

/// Listening defaults
pub const DEF_PORT: u16 = 9000;
pub const LISTEN_BACKLOG: u32 = 128;
pub const UNIX_SOCKET_MODE: u32 = 0o666;
pub const DEF_MAX_CONNECTIONS: usize = 32;
pub const MAX_CONNECTIONS_LIMIT: usize = 65536;
