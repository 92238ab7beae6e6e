use std::marker::Unpin;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::io::Error;

/// Writes the response to the client.
///
/// Script output is passed through untouched, one bounded chunk at a
/// time; nothing is added and nothing is held back.
pub struct ResponseOutput<O>
    where O: AsyncWrite + Unpin
{
    output: O,
    chunk_size: usize
}

impl<O> ResponseOutput<O>
    where O: AsyncWrite + Unpin
{
    pub fn new(output: O, chunk_size: usize) -> ResponseOutput<O>
    {
        ResponseOutput{output, chunk_size}
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error>
    {
        self.output.write_all(data).await?;
        self.output.flush().await
    }

    /// Copy `source` to the client until end of stream.
    /// Returns the number of bytes relayed.
    pub async fn relay<R>(&mut self, source: &mut R) -> Result<u64, Error>
        where R: AsyncRead + Unpin
    {
        let mut chunk = BytesMut::with_capacity(self.chunk_size);
        let mut total: u64 = 0;
        loop {
            chunk.clear();
            let n = source.read_buf(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.output.write_all(&chunk).await?;
            total += n as u64;
        }
        self.output.flush().await?;
        Ok(total)
    }

    pub fn into_inner(self) -> O
    {
        self.output
    }
}

#[cfg(test)]
use tokio::runtime::Runtime;
#[cfg(test)]
use core::pin::Pin;
#[cfg(test)]
use core::task::{Context, Poll};

/// Keeps every write separately
#[cfg(test)]
struct WriteLog
{
    writes: Vec<Vec<u8>>
}

#[cfg(test)]
impl AsyncWrite for WriteLog
{
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8])
                  -> Poll<Result<usize, Error>>
    {
        self.get_mut().writes.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>)
                  -> Poll<Result<(), Error>>
    {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>)
                     -> Poll<Result<(), Error>>
    {
        Poll::Ready(Ok(()))
    }
}

#[test]
fn test_relay_chunks()
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 251) as u8).collect();
        let mut source: &[u8] = &data;
        let mut output = ResponseOutput::new(WriteLog{writes: Vec::new()}, 8192);
        let total = output.relay(&mut source).await.unwrap();
        assert_eq!(total, 20000);

        let log = output.into_inner();
        assert_eq!(log.writes.len(), 3);
        assert!(log.writes.iter().all(|w| w.len() <= 8192));
        assert_eq!(log.writes.concat(), data);
    });
}

#[test]
fn test_relay_empty()
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut source: &[u8] = b"";
        let mut output = ResponseOutput::new(Vec::new(), 8192);
        assert_eq!(output.relay(&mut source).await.unwrap(), 0);
        assert!(output.into_inner().is_empty());
    });
}
