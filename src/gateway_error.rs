use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;

/// Malformed or oversized request.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolError
{
    #[error("header length is unknown")]
    HeaderLengthUnknown,
    #[error("message size is unknown")]
    MessageSizeUnknown,
    #[error("headers are too big")]
    HeadersTooBig,
    #[error("message size is out of range")]
    MessageSizeOutOfRange,
    #[error("headers are malformed")]
    MalformedHeaders,
    #[error("header terminator is missing")]
    TerminatorMissing,
}

/// The script could not be located or started.
#[derive(Debug, Error)]
pub enum ExecutionError
{
    #[error("primary script is unknown")]
    PrimaryScriptUnknown,
    #[error("file is not found: {}", .path.display())]
    FileNotFound { path: PathBuf, source: io::Error },
    #[error("file is not executable: {}", .path.display())]
    FileNotExecutable { path: PathBuf },
    #[error("child process terminated abnormally: {}", .path.display())]
    SpawnFailed { path: PathBuf, source: io::Error },
}

/// Anything that ends the processing of one request.
#[derive(Debug, Error)]
pub enum GatewayError
{
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError
{
    pub fn client_message(&self) -> String
    {
        match self {
            ProtocolError::HeaderLengthUnknown => "Header length is unknown",
            ProtocolError::MessageSizeUnknown => "Message size is unknown",
            ProtocolError::HeadersTooBig => "Headers are too big",
            ProtocolError::MessageSizeOutOfRange => "Message size is out of range",
            ProtocolError::MalformedHeaders => "Headers are malformed",
            ProtocolError::TerminatorMissing => "Header terminator is missing",
        }.to_string()
    }
}

impl ExecutionError
{
    pub fn client_message(&self) -> String
    {
        match self {
            ExecutionError::PrimaryScriptUnknown =>
                "Primary script is unknown".to_string(),
            ExecutionError::FileNotFound { path, .. } =>
                format!("File is not found: {}", path.display()),
            ExecutionError::FileNotExecutable { path } =>
                format!("File is not executable: {}", path.display()),
            ExecutionError::SpawnFailed { .. } =>
                "Child process terminated abnormally".to_string(),
        }
    }

    pub fn severity(&self) -> Level
    {
        match self {
            ExecutionError::PrimaryScriptUnknown
                | ExecutionError::FileNotFound { .. } => Level::WARN,
            ExecutionError::FileNotExecutable { .. }
                | ExecutionError::SpawnFailed { .. } => Level::ERROR,
        }
    }
}

impl GatewayError
{
    /// Text sent to the client in the diagnostic response, if the
    /// connection is still usable.
    pub fn client_message(&self) -> Option<String>
    {
        match self {
            GatewayError::Protocol(e) => Some(e.client_message()),
            GatewayError::Execution(e) => Some(e.client_message()),
            GatewayError::Io(_) => None
        }
    }

    pub fn severity(&self) -> Level
    {
        match self {
            GatewayError::Protocol(_) => Level::ERROR,
            GatewayError::Execution(e) => e.severity(),
            GatewayError::Io(_) => Level::WARN
        }
    }
}

#[test]
fn test_protocol_messages()
{
    let err = GatewayError::from(ProtocolError::MessageSizeUnknown);
    assert_eq!(err.to_string(), "message size is unknown");
    assert_eq!(err.client_message().as_deref(), Some("Message size is unknown"));
    assert_eq!(err.severity(), Level::ERROR);
}

#[test]
fn test_execution_messages()
{
    let err = GatewayError::from(ExecutionError::FileNotExecutable {
        path: PathBuf::from("/srv/app.cgi")
    });
    assert_eq!(err.to_string(), "file is not executable: /srv/app.cgi");
    assert_eq!(err.client_message().as_deref(),
               Some("File is not executable: /srv/app.cgi"));
    assert_eq!(err.severity(), Level::ERROR);

    let err = GatewayError::from(ExecutionError::PrimaryScriptUnknown);
    assert_eq!(err.severity(), Level::WARN);
}

#[test]
fn test_io_has_no_client_message()
{
    let err = GatewayError::from(io::Error::new(io::ErrorKind::ConnectionReset,
                                                "reset"));
    assert!(err.client_message().is_none());
}
