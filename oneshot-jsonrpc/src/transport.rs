//! Stream transport for the single-shot request cycle.
//!
//! Unlike line-delimited JSON RPC transports, the message boundary here is end of stream:
//! the host writes one request document to the worker's input, closes it, and reads one
//! response document back.  There is no framing and no second request.

use crate::server::JsonRpcServer;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::*;

/// A transport over two async streams, one for reading and one for writing.
///
/// This is used to implement the stdio transport, and also is useful for creating tests
/// that simulate a host and worker communicating in memory.
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the request document, accumulating input chunks in arrival order until the
    /// peer closes the stream.
    ///
    /// An immediately-closed stream yields an empty string.  The input must be UTF-8;
    /// anything else is a fault of the cycle machinery, not an RPC-level error.
    pub async fn read_request(&mut self) -> Result<String> {
        let mut request = String::new();
        self.reader
            .read_to_string(&mut request)
            .await
            .context("reading request from input stream")?;

        Ok(request)
    }

    /// Write the response document followed by a newline, then flush.
    pub async fn write_response(&mut self, response: &str) -> Result<()> {
        self.writer
            .write_all(response.as_bytes())
            .await
            .context("writing response to output stream")?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Run exactly one request cycle over this transport: read the request document to end
    /// of stream, dispatch it through `server`, and write back the response, if there is
    /// one.
    ///
    /// An RPC-level failure still completes the cycle successfully, delivered to the peer
    /// as a JSON-RPC error response.  `Err` means the cycle machinery itself broke: the
    /// input stream could not be read, or the response could not be serialized or written.
    /// Nothing is written to the output stream in that case.
    pub async fn serve_once(&mut self, server: &JsonRpcServer) -> Result<()> {
        let request = self.read_request().await?;
        debug!(request_len = request.len(), "Received request document");

        match server.handle_request(&request).await? {
            Some(response) => self.write_response(&response).await,
            None => {
                // The request was a notification; per the spec no response may be sent,
                // not even an empty document
                debug!("Request was a notification; no response");
                Ok(())
            }
        }
    }
}

/// The common case: a worker subprocess talking to its host over stdin/stdout.
pub type StdioTransport =
    StreamTransport<BufReader<tokio::io::Stdin>, BufWriter<tokio::io::Stdout>>;

impl StdioTransport {
    pub fn stdio(stdin: tokio::io::Stdin, stdout: tokio::io::Stdout) -> Self {
        Self::new(BufReader::new(stdin), BufWriter::new(stdout))
    }
}
