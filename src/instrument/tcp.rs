use crate::domain::data_format::{ByteOrder, DataFormat, DataFormatError, decode_block};
use crate::instrument::connection::{ConnectionError, MessageResource};
use crate::session::take_message;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    pub initial_delay_ms: u64,
    pub max_delay: Duration,
    pub attempts: usize,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            initial_delay_ms: 100,
            max_delay: Duration::from_secs(2),
            attempts: 5,
        }
    }
}

/// A raw socket connection to an instrument, e.g. a `TCPIP::<host>::<port>::SOCKET` resource.
#[derive(Debug)]
pub struct TcpConnection {
    address: String,
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
    write_termination: String,
    read_termination: String,
    timeout: Option<Duration>,
}

impl TcpConnection {
    #[instrument(skip(retry))]
    pub async fn connect(address: &str, retry: RetryOptions) -> Result<TcpConnection, ConnectionError> {
        let strategy = ExponentialBackoff::from_millis(retry.initial_delay_ms)
            .factor(2)
            .max_delay(retry.max_delay)
            .map(jitter)
            .take(retry.attempts);

        info!("Connecting to {}...", address);
        let stream = Retry::spawn(strategy, move || async move {
            TcpStream::connect(address).await.inspect_err(|e| warn!("⚠️ Connecting to {} failed: {}. Retrying...", address, e))
        })
        .await
        .map_err(|source| ConnectionError::Connect {
            address: address.to_string(),
            source,
        })?;
        info!("Connecting to {}... OK", address);

        Ok(TcpConnection {
            address: address.to_string(),
            stream: Some(stream),
            buffer: vec![],
            write_termination: "\n".to_string(),
            read_termination: "\n".to_string(),
            timeout: Some(Duration::from_secs(5)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn stream(&mut self) -> Result<&mut TcpStream, ConnectionError> {
        self.stream.as_mut().ok_or(ConnectionError::Closed)
    }

    async fn read_chunk(&mut self) -> Result<(), ConnectionError> {
        let read_timeout = self.timeout;
        let mut chunk = [0u8; 4096];

        let stream = self.stream()?;
        let read = match read_timeout {
            Some(duration) => timeout(duration, stream.read(&mut chunk))
                .await
                .map_err(|_| ConnectionError::Timeout(read_timeout))??,
            None => stream.read(&mut chunk).await?,
        };
        if read == 0 {
            self.stream = None;
            return Err(ConnectionError::Closed);
        }
        self.buffer.extend_from_slice(&chunk[..read]);
        Ok(())
    }

    async fn fill(&mut self, length: usize) -> Result<(), ConnectionError> {
        while self.buffer.len() < length {
            self.read_chunk().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageResource for TcpConnection {
    async fn write(&mut self, message: &str) -> Result<(), ConnectionError> {
        debug!("Writing to {}: {}", self.address, message);
        let data = format!("{}{}", message, self.write_termination);
        self.stream()?.write_all(data.as_bytes()).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<String, ConnectionError> {
        let terminator = self.read_termination.as_bytes().to_vec();
        loop {
            if let Some(message) = take_message(&mut self.buffer, &terminator) {
                let reply = String::from_utf8(message).map_err(|_| ConnectionError::InvalidUtf8)?;
                debug!("Read from {}: {}", self.address, reply);
                return Ok(reply);
            }
            self.read_chunk().await?;
        }
    }

    async fn query_binary_values(&mut self, message: &str, format: DataFormat, byte_order: ByteOrder) -> Result<Vec<f64>, ConnectionError> {
        self.write(message).await?;

        self.fill(2).await?;
        if self.buffer[0] != b'#' {
            return Err(DataFormatError::MissingBlockHeader.into());
        }
        let digits = (self.buffer[1] as char).to_digit(10).ok_or(DataFormatError::MalformedBlockHeader)? as usize;

        let block = if digits == 0 {
            let terminator = self.read_termination.as_bytes().to_vec();
            loop {
                if let Some(block) = take_message(&mut self.buffer, &terminator) {
                    break block;
                }
                self.read_chunk().await?;
            }
        } else {
            self.fill(2 + digits).await?;
            let length: usize = std::str::from_utf8(&self.buffer[2..2 + digits])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(DataFormatError::MalformedBlockHeader)?;
            let total = 2 + digits + length;
            self.fill(total + self.read_termination.len()).await?;
            let block = self.buffer.drain(..total).collect::<Vec<_>>();
            if self.buffer.starts_with(self.read_termination.as_bytes()) {
                self.buffer.drain(..self.read_termination.len());
            }
            block
        };

        Ok(decode_block(&block, format, byte_order)?)
    }

    async fn clear(&mut self) -> Result<(), ConnectionError> {
        self.buffer.clear();
        Ok(())
    }

    fn read_termination(&self) -> &str {
        &self.read_termination
    }

    fn write_termination(&self) -> &str {
        &self.write_termination
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.read_termination = terminator.to_string();
        self.write_termination = terminator.to_string();
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
