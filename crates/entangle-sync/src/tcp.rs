//! Newline-delimited JSON over TCP.
//!
//! URLs take the form `tcp://host:port`. Each frame is one line.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::transport::{Connection, Connector};

const SCHEME: &str = "tcp://";

/// Connects to `tcp://host:port` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

fn parse_url(url: &str) -> Result<&str> {
    url.strip_prefix(SCHEME)
        .map(|addr| addr.trim_end_matches('/'))
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| SyncError::InvalidUrl(url.to_string()))
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let addr = parse_url(url)?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SyncError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| SyncError::ConnectionFailed(e.to_string()))?;
        debug!(%addr, "tcp connection established");

        let (read, write) = stream.into_split();
        Ok(Box::new(TcpConnection {
            lines: BufReader::new(read).lines(),
            writer: write,
        }))
    }
}

struct TcpConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, mut frame: String) -> Result<()> {
        frame.push('\n');
        self.writer
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| SyncError::TransportError(e.to_string()))?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                other => return Ok(other),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))
    }
}
