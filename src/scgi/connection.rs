use std::io;
use std::marker::Unpin;
use std::sync::Arc;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use super::defs;
use super::environment::Environment;
use super::error_reply;
use super::executor;
use super::input::RequestReader;
use super::output::ResponseOutput;
use crate::config::GatewayConfig;
use crate::gateway_error::GatewayError;

/// Serve one request on `stream` and close it, whatever the outcome.
pub async fn handle_connection<S>(stream: S, config: Arc<GatewayConfig>,
                                  peer: String)
    where S: AsyncRead + AsyncWrite + Unpin + Send
{
    let (mut input, output) = tokio::io::split(stream);
    let mut output = ResponseOutput::new(output, config.chunk_size);

    if let Err(e) = process(&mut input, &mut output, &config, &peer).await {
        error_reply::report(&mut output, &e, &peer).await;
    }

    let mut stream = input.unsplit(output.into_inner());
    if let Err(e) = stream.shutdown().await {
        debug!(peer = %peer, "Failed to shut down connection: {}", e);
    }
}

/// Returns an error only while a diagnostic response can still be sent,
/// that is before the script has been started.
async fn process<I, O>(input: &mut I, output: &mut ResponseOutput<O>,
                       config: &GatewayConfig, peer: &str)
                       -> Result<(), GatewayError>
    where I: AsyncRead + Unpin,
          O: AsyncWrite + Unpin
{
    let reader = RequestReader::new(config.max_message_size, config.terminator);
    let request = match reader.read(input).await? {
        Some(request) => request,
        None => {
            debug!(peer, "Connection closed without a request");
            return Ok(());
        }
    };
    let env = Environment::build(&request.pairs)?;
    let content_length = env.content_length();
    let mut script = executor::spawn_script(&env, content_length.is_some()).await?;

    // The response is committed from here on
    let stdin = script.take_stdin();
    let body = RequestBody{prefix: request.body_prefix,
                           skip_terminator: request.terminator_pending,
                           length: content_length.unwrap_or(0)};
    let relayed = {
        let feed = feed_body(stdin, body, input, peer);
        let relay = output.relay(script.stdout());
        tokio::pin!(feed);
        tokio::pin!(relay);
        // Once the script's output has ended nothing more is read from
        // the client
        tokio::select! {
            relayed = &mut relay => relayed,
            () = &mut feed => relay.await
        }
    };
    let bytes = match relayed {
        Ok(n) => n,
        Err(e) => {
            warn!(peer, script = %script.path().display(),
                  "Failed to relay script output: {}", e);
            0
        }
    };

    let path = script.path().to_path_buf();
    match script.wait().await {
        Ok(status) if status.success() => {
            debug!(peer, script = %path.display(), bytes, status = %status,
                   "child process finished");
        },
        Ok(status) => {
            warn!(peer, script = %path.display(), bytes, status = %status,
                  "child process exited unsuccessfully");
        },
        Err(e) => {
            warn!(peer, script = %path.display(),
                  "Failed to reap child process: {}", e);
        }
    }
    Ok(())
}

struct RequestBody
{
    /// Body bytes buffered along with the headers
    prefix: Bytes,
    /// Drop a leading ',' that arrives after the headers
    skip_terminator: bool,
    length: u64
}

/// Pass `body.length` bytes of request body to the script, starting with
/// what was buffered along with the headers.
async fn feed_body<I, W>(stdin: Option<W>, body: RequestBody, input: &mut I,
                         peer: &str)
    where I: AsyncRead + Unpin,
          W: AsyncWrite + Unpin
{
    let mut stdin = match stdin {
        Some(stdin) => stdin,
        None => return
    };
    let length = body.length;
    let res = async {
        let mut prefix = body.prefix;
        if body.skip_terminator && prefix.is_empty() {
            let mut first = [0u8; 1];
            let n = input.read(&mut first).await?;
            if n == 1 && first[0] != defs::SCGI_TERMINATOR {
                prefix = Bytes::copy_from_slice(&first);
            }
        }
        let buffered = prefix.len().min(length as usize);
        stdin.write_all(&prefix[..buffered]).await?;
        let rest = length - buffered as u64;
        let copied = tokio::io::copy(&mut (&mut *input).take(rest),
                                     &mut stdin).await?;
        Ok::<u64, io::Error>(buffered as u64 + copied)
    }.await;
    match res {
        Ok(n) if n < length => debug!(peer, expected = length, received = n,
                                      "request body ended early"),
        Ok(_) => {},
        Err(e) => debug!(peer, "Script did not consume the request body: {}", e)
    }
}

#[cfg(test)]
use tokio::runtime::Runtime;

#[cfg(test)]
fn feed_from(prefix: &'static [u8], skip_terminator: bool, rest: &'static [u8],
        length: u64) -> Vec<u8>
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut stdin = Vec::new();
        let mut input = rest;
        let body = RequestBody{prefix: Bytes::from_static(prefix),
                               skip_terminator, length};
        feed_body(Some(&mut stdin), body, &mut input, "test").await;
        stdin
    })
}

#[test]
fn test_feed_body()
{
    assert_eq!(feed_from(b"he", false, b"llo world", 5), b"hello");
    assert_eq!(feed_from(b"hello world", false, b"", 5), b"hello");
    assert_eq!(feed_from(b"", false, b"abc", 10), b"abc");
}

#[test]
fn test_feed_body_late_terminator()
{
    assert_eq!(feed_from(b"", true, b",abcd", 4), b"abcd");
    // No terminator after all
    assert_eq!(feed_from(b"", true, b"abcd", 4), b"abcd");
    // Kept as body when the terminator was already consumed
    assert_eq!(feed_from(b"", false, b",abc", 4), b",abc");
}

#[test]
fn test_feed_body_without_stdin()
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut input = &b"abc"[..];
        let body = RequestBody{prefix: Bytes::new(), skip_terminator: true,
                               length: 3};
        feed_body(None::<Vec<u8>>, body, &mut input, "test").await;
        assert_eq!(input, b"abc");
    });
}
