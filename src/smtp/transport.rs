use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

use crate::error::TransportError;

use super::response::Response;

/// Line-oriented view of one connection.
///
/// Every read is bounded by `max_line` bytes and by `idle_timeout`.
pub struct LineTransport<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    max_line: usize,
    idle_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite> LineTransport<S> {
    pub fn new(stream: S, max_line: usize, idle_timeout: Duration) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            max_line,
            idle_timeout,
        }
    }

    /// Read one line, terminator included.
    ///
    /// A line that ends at EOF without a newline is treated as a closed
    /// connection.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        let n = self.read_bounded(&mut line).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }

        if !line.ends_with(b"\n") {
            if n < self.max_line {
                return Err(TransportError::Closed);
            }

            let mut rest = Vec::new();
            loop {
                rest.clear();
                if self.read_bounded(&mut rest).await? == 0 {
                    return Err(TransportError::Closed);
                }
                if rest.ends_with(b"\n") {
                    break;
                }
            }
            return Err(TransportError::LineTooLong { max: self.max_line });
        }

        tracing::trace!("<< {:?}", String::from_utf8_lossy(&line));
        Ok(line)
    }

    async fn read_bounded(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        let mut limited = (&mut self.reader).take(self.max_line as u64);
        match tokio::time::timeout(self.idle_timeout, limited.read_until(b'\n', buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout(self.idle_timeout)),
        }
    }

    /// Write a response and flush it immediately.
    pub async fn write_response(&mut self, response: &Response) -> Result<(), TransportError> {
        let formatted = response.format();
        tracing::trace!(">> {:?}", formatted);
        self.writer.write_all(formatted.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
