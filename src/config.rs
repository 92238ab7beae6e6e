use std::path::PathBuf;
use clap::Parser;
use crate::scgi::decode::TerminatorPolicy;
use crate::scgi::defs;

/// Where the gateway accepts connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint
{
    /// TCP port on all IPv4 interfaces
    Tcp(u16),
    /// Unix-domain socket at the given path
    Unix(PathBuf)
}

#[derive(Debug, Clone)]
pub struct GatewayConfig
{
    pub endpoint: Endpoint,
    /// Capacity of the request buffer
    pub max_message_size: usize,
    /// Largest write of script output to the client
    pub chunk_size: usize,
    pub terminator: TerminatorPolicy,
    /// Connections processed at the same time
    pub max_connections: usize,
    pub debug: bool
}

impl Default for GatewayConfig
{
    fn default() -> Self
    {
        GatewayConfig{
            endpoint: Endpoint::Tcp(defs::DEF_PORT),
            max_message_size: defs::SCGI_MSG_SZ,
            chunk_size: defs::SCGI_CHUNK_SZ,
            terminator: TerminatorPolicy::Strict,
            max_connections: defs::DEF_MAX_CONNECTIONS,
            debug: false
        }
    }
}

fn parse_in_range<const MIN: usize, const MAX: usize>(s: &str)
                                                      -> Result<usize, String>
{
    let v: usize = s.parse().map_err(|e| format!("{}", e))?;
    if v < MIN || v > MAX {
        return Err(format!("must be between {} and {}", MIN, MAX));
    }
    Ok(v)
}

/// Runs the script named by SCRIPT_FILENAME for every SCGI request
#[derive(Debug, Parser)]
#[command(name = "scgi_gateway", version, about)]
pub struct Args
{
    /// TCP port to listen on (0 selects the default)
    #[arg(short = 'p', long, default_value_t = defs::DEF_PORT)]
    pub port: u16,

    /// Listen on a Unix-domain socket at this path instead of TCP
    #[arg(short = 's', long = "sock", value_name = "PATH")]
    pub sock: Option<PathBuf>,

    /// Largest accepted request header, including the length prefix
    #[arg(long, value_name = "BYTES", default_value_t = defs::SCGI_MSG_SZ,
          value_parser = parse_in_range::<{defs::SCGI_MIN_MSG_SZ},
                                         {defs::SCGI_MAX_MSG_SZ}>)]
    pub max_message_size: usize,

    /// Accept requests without the ',' after the header block
    #[arg(long)]
    pub allow_missing_terminator: bool,

    /// Connections served concurrently; 1 serves them one at a time
    #[arg(long, value_name = "N", default_value_t = defs::DEF_MAX_CONNECTIONS,
          value_parser = parse_in_range::<1, {defs::MAX_CONNECTIONS_LIMIT}>)]
    pub max_connections: usize,

    /// Log debug messages
    #[arg(short, long)]
    pub debug: bool
}

impl Args
{
    pub fn into_config(self) -> GatewayConfig
    {
        let endpoint = match self.sock {
            Some(path) => Endpoint::Unix(path),
            None if self.port == 0 => Endpoint::Tcp(defs::DEF_PORT),
            None => Endpoint::Tcp(self.port)
        };
        let terminator = if self.allow_missing_terminator {
            TerminatorPolicy::Tolerant
        } else {
            TerminatorPolicy::Strict
        };
        GatewayConfig{
            endpoint,
            max_message_size: self.max_message_size,
            chunk_size: defs::SCGI_CHUNK_SZ,
            terminator,
            max_connections: self.max_connections,
            debug: self.debug
        }
    }
}

#[test]
fn test_default_args()
{
    let config = Args::try_parse_from(&["scgi_gateway"]).unwrap().into_config();
    assert_eq!(config.endpoint, Endpoint::Tcp(9000));
    assert_eq!(config.max_message_size, 8192);
    assert_eq!(config.terminator, TerminatorPolicy::Strict);
    assert!(!config.debug);
}

#[test]
fn test_port_args()
{
    let config = Args::try_parse_from(&["scgi_gateway", "-p", "4000"])
        .unwrap().into_config();
    assert_eq!(config.endpoint, Endpoint::Tcp(4000));
    let config = Args::try_parse_from(&["scgi_gateway", "--port", "0"])
        .unwrap().into_config();
    assert_eq!(config.endpoint, Endpoint::Tcp(9000));
}

#[test]
fn test_sock_args()
{
    let config = Args::try_parse_from(&["scgi_gateway", "-p", "4000",
                                        "--sock", "/run/scgi.sock",
                                        "--allow-missing-terminator",
                                        "--max-connections", "1", "-d"])
        .unwrap().into_config();
    assert_eq!(config.endpoint, Endpoint::Unix(PathBuf::from("/run/scgi.sock")));
    assert_eq!(config.terminator, TerminatorPolicy::Tolerant);
    assert_eq!(config.max_connections, 1);
    assert!(config.debug);
}

#[test]
fn test_invalid_args()
{
    assert!(Args::try_parse_from(&["scgi_gateway", "--max-connections", "0"])
            .is_err());
    assert!(Args::try_parse_from(&["scgi_gateway", "--max-message-size", "4"])
            .is_err());
    assert!(Args::try_parse_from(&["scgi_gateway", "--port", "70000"])
            .is_err());
    assert!(Args::try_parse_from(&["scgi_gateway", "--max-message-size",
                                   "18446744073709551615"]).is_err());
    assert!(Args::try_parse_from(&["scgi_gateway", "--max-connections",
                                   "100000"]).is_err());
}

#[test]
fn test_message_size_bounds()
{
    let config = Args::try_parse_from(&["scgi_gateway", "--max-message-size",
                                        "1048576"]).unwrap().into_config();
    assert_eq!(config.max_message_size, 1 << 20);
    assert!(Args::try_parse_from(&["scgi_gateway", "--max-message-size",
                                   "1048577"]).is_err());
    let config = Args::try_parse_from(&["scgi_gateway", "--max-message-size",
                                        "16"]).unwrap().into_config();
    assert_eq!(config.max_message_size, 16);
}
