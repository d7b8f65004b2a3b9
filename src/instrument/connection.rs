use crate::domain::data_format::{ByteOrder, DataFormat, DataFormatError};
use crate::session::{Session, SessionError};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// A message-based connection to an instrument: text goes out with the write termination, replies come back
/// without the read termination.
#[async_trait]
pub trait MessageResource: Send {
    async fn write(&mut self, message: &str) -> Result<(), ConnectionError>;

    async fn read(&mut self) -> Result<String, ConnectionError>;

    async fn query(&mut self, message: &str) -> Result<String, ConnectionError> {
        self.write(message).await?;
        self.read().await
    }

    /// Queries numbers sent back as an IEEE 488.2 binary block.
    async fn query_binary_values(&mut self, message: &str, format: DataFormat, byte_order: ByteOrder) -> Result<Vec<f64>, ConnectionError>;

    /// Drops buffered input and output.
    async fn clear(&mut self) -> Result<(), ConnectionError>;

    fn read_termination(&self) -> &str;

    fn write_termination(&self) -> &str;

    /// Sets both the read and the write termination.
    fn set_terminator(&mut self, terminator: &str);

    fn timeout(&self) -> Option<Duration>;

    fn set_timeout(&mut self, timeout: Option<Duration>);

    fn is_simulated(&self) -> bool {
        false
    }

    async fn close(&mut self) -> Result<(), ConnectionError>;
}

#[async_trait]
impl MessageResource for Session {
    async fn write(&mut self, message: &str) -> Result<(), ConnectionError> {
        Session::write(self, message).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<String, ConnectionError> {
        Ok(Session::read(self)?)
    }

    async fn query_binary_values(&mut self, message: &str, format: DataFormat, byte_order: ByteOrder) -> Result<Vec<f64>, ConnectionError> {
        Ok(Session::query_binary_values(self, message, format, byte_order).await?)
    }

    async fn clear(&mut self) -> Result<(), ConnectionError> {
        Ok(Session::clear(self)?)
    }

    fn read_termination(&self) -> &str {
        Session::read_termination(self)
    }

    fn write_termination(&self) -> &str {
        Session::write_termination(self)
    }

    fn set_terminator(&mut self, terminator: &str) {
        Session::set_terminator(self, terminator)
    }

    fn timeout(&self) -> Option<Duration> {
        Session::timeout(self)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        Session::set_timeout(self, timeout)
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        Ok(Session::close(self).await?)
    }
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("could not connect to '{address}': {source}")]
    Connect { address: String, source: io::Error },
    #[error("timeout expired before a reply was available (timeout {0:?})")]
    Timeout(Option<Duration>),
    #[error("the connection is closed")]
    Closed,
    #[error("reply is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    DataFormat(#[from] DataFormatError),
}
