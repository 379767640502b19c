use crate::spider::config::defaults;
use crate::spider::error::CrawlError;
use log::debug;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

/// Raw HTTP/1.1 client for single-page fetches
///
/// Every fetch opens its own TCP connection, sends one GET with
/// `Connection: close`, and reads until the peer closes the stream. There is
/// no TLS, no redirect handling, and no response framing beyond peer close.
pub struct HttpClient {
    /// Applied independently to connect, send, and each read
    io_timeout: Duration,
}

/// A fetched page body together with its timing measurement
pub struct FetchedPage {
    /// Raw response bytes, status line and headers included
    pub body: Vec<u8>,

    /// Milliseconds from just before connect to the first read return
    pub elapsed_ms: f64,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(defaults::SOCKET_TIMEOUT_SECS))
    }
}

impl HttpClient {
    /// Create a client with the given per-operation socket timeout
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    /// Resolve a hostname to its first IPv4 address
    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, CrawlError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| CrawlError::Dns(format!("{}: {}", host, e)))?;

        addrs
            .into_iter()
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| CrawlError::Dns(format!("{}: no IPv4 address", host)))
    }

    /// Fetch one page and time the exchange.
    ///
    /// The measurement starts just before connect and ends when the first
    /// read returns, so it covers connect, send, and time-to-first-byte.
    /// Resolve, connect, and send failures are errors; a read error or
    /// timeout merely ends the body, since `Connection: close` is the only
    /// framing in use.
    pub async fn fetch(
        &self,
        host: &str,
        port: u16,
        path: &str,
    ) -> Result<FetchedPage, CrawlError> {
        let addr = self.resolve(host, port).await?;

        let started = Instant::now();
        let mut stream = match timeout(self.io_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(CrawlError::Connect(format!("{}:{}: {}", host, port, e)));
            }
            Err(_) => {
                return Err(CrawlError::Connect(format!("{}:{}: timed out", host, port)));
            }
        };

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, host
        );
        match timeout(self.io_timeout, stream.write_all(request.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(CrawlError::Send(format!("{}{}: {}", host, path, e)));
            }
            Err(_) => {
                return Err(CrawlError::Send(format!("{}{}: timed out", host, path)));
            }
        }

        let mut body = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut elapsed_ms = -1.0;

        loop {
            let read = timeout(self.io_timeout, stream.read(&mut chunk)).await;

            if elapsed_ms < 0.0 {
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            }

            match read {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => body.extend_from_slice(&chunk[..n]),
                Ok(Err(_)) | Err(_) => break,
            }
        }

        debug!("fetched {}{}: {} bytes in {:.2}ms", host, path, body.len(), elapsed_ms);

        Ok(FetchedPage { body, elapsed_ms })
    }
}
