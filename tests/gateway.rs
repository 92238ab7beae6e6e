//! End-to-end tests: requests over a socket, scripts run for real.

use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

use scgi_gateway::config::{Endpoint, GatewayConfig};
use scgi_gateway::listener;
use scgi_gateway::scgi::decode::TerminatorPolicy;

mod common;
use common::{request, send, send_text, start_gateway, system_binary, write_script};

const ERROR_HEAD: &str = "Status: 500 Internal Error\r\nContent-Type: text/plain\r\n\r\n";

#[tokio::test]
async fn test_true_script()
{
    let addr = start_gateway(GatewayConfig::default()).await;
    let true_bin = system_binary(&["/usr/bin/true", "/bin/true"]);
    let req = request(&[("CONTENT_LENGTH", "0"), ("SCRIPT_FILENAME", true_bin.as_str())],
                      b"");
    assert!(send(addr, &req).await.is_empty());
}

#[tokio::test]
async fn test_environment_is_exactly_the_headers()
{
    let addr = start_gateway(GatewayConfig::default()).await;
    let env_bin = system_binary(&["/usr/bin/env", "/bin/env"]);
    let req = request(&[("REQUEST_METHOD", "GET"),
                        ("QUERY_STRING", "a=1&b=2"),
                        ("REQUEST_METHOD", "POST"),
                        ("SCRIPT_FILENAME", env_bin.as_str())],
                      b"");
    let response = send_text(addr, &req).await;
    let lines: BTreeSet<&str> = response.lines().collect();
    let script_line = format!("SCRIPT_FILENAME={}", env_bin);
    let expected: BTreeSet<&str> = vec!["REQUEST_METHOD=POST",
                                        "QUERY_STRING=a=1&b=2",
                                        script_line.as_str(),
                                        "SCGI=1"].into_iter().collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_zero_length()
{
    let addr = start_gateway(GatewayConfig::default()).await;
    let response = send_text(addr, b"0:,").await;
    assert_eq!(response, format!("{}Message size is unknown\n", ERROR_HEAD));
}

#[tokio::test]
async fn test_not_a_length()
{
    let addr = start_gateway(GatewayConfig::default()).await;
    let response = send_text(addr, b"GET / HTTP/1.0\r\n\r\n").await;
    assert_eq!(response, format!("{}Header length is unknown\n", ERROR_HEAD));
}

#[tokio::test]
async fn test_headers_too_big()
{
    let addr = start_gateway(GatewayConfig::default()).await;
    let response = send_text(addr, b"9000:").await;
    assert_eq!(response, format!("{}Headers are too big\n", ERROR_HEAD));
}

#[tokio::test]
async fn test_truncated_request()
{
    let addr = start_gateway(GatewayConfig::default()).await;
    let response = send_text(addr, b"100:SCRIPT_FILENAME\0/bin/true\0").await;
    assert_eq!(response, format!("{}Message size is out of range\n", ERROR_HEAD));
}

#[tokio::test]
async fn test_requests_do_not_share_environment()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "x.cgi", "printf '%s' \"${X-unset}\"\n");
    let script = script.to_str().unwrap();
    let addr = start_gateway(GatewayConfig::default()).await;

    let first = send_text(addr, &request(&[("X", "1"), ("SCRIPT_FILENAME", script)],
                                         b"")).await;
    assert_eq!(first, "1");
    let second = send_text(addr, &request(&[("SCRIPT_FILENAME", script)],
                                          b"")).await;
    assert_eq!(second, "unset");
}

#[tokio::test]
async fn test_missing_script_then_next_request()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "ok.cgi",
                              "printf 'Status: 200 OK\\r\\n\\r\\nok'\n");
    let addr = start_gateway(GatewayConfig::default()).await;

    let response = send_text(addr, &request(&[("CONTENT_LENGTH", "0")], b"")).await;
    assert_eq!(response, format!("{}Primary script is unknown\n", ERROR_HEAD));

    let response = send_text(addr, &request(&[("SCRIPT_FILENAME",
                                               script.to_str().unwrap())],
                                            b"")).await;
    assert_eq!(response, "Status: 200 OK\r\n\r\nok");
}

#[tokio::test]
async fn test_script_not_executable()
{
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let script = write_script(dir.path(), "noexec.cgi",
                              &format!("touch {}\n", marker.display()));
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644))
        .unwrap();
    let addr = start_gateway(GatewayConfig::default()).await;

    let response = send_text(addr, &request(&[("SCRIPT_FILENAME",
                                               script.to_str().unwrap())],
                                            b"")).await;
    assert_eq!(response, format!("{}File is not executable: {}\n",
                                 ERROR_HEAD, script.display()));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_script_not_found()
{
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("missing.cgi");
    let addr = start_gateway(GatewayConfig::default()).await;

    let response = send_text(addr, &request(&[("SCRIPT_FILENAME",
                                               script.to_str().unwrap())],
                                            b"")).await;
    assert_eq!(response, format!("{}File is not found: {}\n",
                                 ERROR_HEAD, script.display()));
}

#[tokio::test]
async fn test_large_output_is_relayed_intact()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "big.cgi",
                              "i=0\nwhile [ $i -lt 3000 ]; do printf '%05d\\n' $i; i=$((i+1)); done\n");
    let addr = start_gateway(GatewayConfig::default()).await;

    let response = send_text(addr, &request(&[("SCRIPT_FILENAME",
                                               script.to_str().unwrap())],
                                            b"")).await;
    let expected: String = (0..3000).map(|i| format!("{:05}\n", i)).collect();
    assert_eq!(response.len(), 18000);
    assert_eq!(response, expected);
}

#[tokio::test]
async fn test_request_body_reaches_script()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "echo.cgi",
                              "IFS= read -r line\nprintf '[%s]' \"$line\"\n");
    let addr = start_gateway(GatewayConfig::default()).await;

    let response = send_text(addr, &request(&[("CONTENT_LENGTH", "12"),
                                              ("SCRIPT_FILENAME",
                                               script.to_str().unwrap())],
                                            b"hello world\n")).await;
    assert_eq!(response, "[hello world]");
}

#[tokio::test]
async fn test_terminator_policy()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "t.cgi", "printf 'done'\n");
    let script = script.to_str().unwrap();
    let mut req = request(&[("SCRIPT_FILENAME", script)], b"");
    // Drop the ','
    req.truncate(req.len() - 1);

    let strict = start_gateway(GatewayConfig::default()).await;
    let response = send_text(strict, &req).await;
    assert_eq!(response, format!("{}Header terminator is missing\n", ERROR_HEAD));

    let mut config = GatewayConfig::default();
    config.terminator = TerminatorPolicy::Tolerant;
    let tolerant = start_gateway(config).await;
    assert_eq!(send_text(tolerant, &req).await, "done");
}

#[tokio::test]
async fn test_late_terminator_is_not_body()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "echo.cgi",
                              "IFS= read -r line\nprintf '[%s]' \"$line\"\n");
    let mut req = request(&[("CONTENT_LENGTH", "4"),
                            ("SCRIPT_FILENAME", script.to_str().unwrap())],
                          b"");
    // The ',' is sent separately, after the headers
    req.truncate(req.len() - 1);
    let mut config = GatewayConfig::default();
    config.terminator = TerminatorPolicy::Tolerant;
    let addr = start_gateway(config).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&req).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    stream.write_all(b",abc\n").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"[abc]");
}

#[tokio::test]
async fn test_unsent_body_does_not_hold_connection()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "done.cgi", "printf 'done'\n");
    let addr = start_gateway(GatewayConfig::default()).await;

    // Announce a body but never send it, and keep the connection open
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request(&[("CONTENT_LENGTH", "10"),
                                ("SCRIPT_FILENAME", script.to_str().unwrap())],
                              b"")).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10),
                         stream.read_to_end(&mut response)).await
        .expect("connection was not closed")
        .unwrap();
    assert_eq!(response, b"done");
}

#[tokio::test]
async fn test_slow_script_does_not_block_others()
{
    let dir = tempfile::tempdir().unwrap();
    let slow = write_script(dir.path(), "slow.cgi",
                            "IFS= read -r line\nprintf 'slow %s' \"$line\"\n");
    let fast = write_script(dir.path(), "fast.cgi", "printf 'fast'\n");
    let addr = start_gateway(GatewayConfig::default()).await;

    // Headers only; the script waits for the body
    let mut pending = TcpStream::connect(addr).await.unwrap();
    pending.write_all(&request(&[("CONTENT_LENGTH", "3"),
                                 ("SCRIPT_FILENAME", slow.to_str().unwrap())],
                               b"")).await.unwrap();

    let req = request(&[("SCRIPT_FILENAME", fast.to_str().unwrap())], b"");
    let response = tokio::time::timeout(Duration::from_secs(10),
                                        send_text(addr, &req)).await.unwrap();
    assert_eq!(response, "fast");

    pending.write_all(b"ab\n").await.unwrap();
    pending.shutdown().await.unwrap();
    let mut rest = Vec::new();
    pending.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, b"slow ab");
}

#[tokio::test]
async fn test_unix_socket()
{
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "u.cgi", "printf 'unix'\n");
    let sock = dir.path().join("gateway.sock");
    // A stale file is replaced
    std::fs::write(&sock, b"").unwrap();

    let mut config = GatewayConfig::default();
    config.endpoint = Endpoint::Unix(sock.clone());
    let bound = listener::bind(&config.endpoint).unwrap();
    assert_eq!(bound.socket_path(), Some(sock.as_path()));
    let mode = std::fs::metadata(&sock).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o666);
    tokio::spawn(bound.serve(Arc::new(config)));

    let mut stream = UnixStream::connect(&sock).await.unwrap();
    stream.write_all(&request(&[("SCRIPT_FILENAME", script.to_str().unwrap())],
                              b"")).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"unix");
}
