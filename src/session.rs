use crate::domain::data_format::{ByteOrder, DataFormat, DataFormatError, decode_block};
use crate::domain::device::Eom;
use crate::domain::events::{Event, SessionId, SessionInfo, StoreError};
use crate::domain::resource_name::ResourceName;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// An open connection to one simulated resource.
///
/// Writes are split into messages on the query terminator of the device and answered immediately, replies queue
/// up until they are read. Reading with nothing queued fails the way a real instrument read times out.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    resource: ResourceName,
    device: String,
    eom: Eom,
    tx: Sender<Event>,
    write_termination: String,
    read_termination: String,
    timeout: Option<Duration>,
    input: Vec<u8>,
    output: VecDeque<Vec<u8>>,
    closed: bool,
}

impl Session {
    pub(crate) fn new(info: SessionInfo, tx: Sender<Event>) -> Self {
        Session {
            id: info.id,
            resource: info.resource,
            device: info.device,
            write_termination: info.eom.query.clone(),
            read_termination: info.eom.response.clone(),
            eom: info.eom,
            tx,
            timeout: Some(DEFAULT_TIMEOUT),
            input: vec![],
            output: VecDeque::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn write_termination(&self) -> &str {
        &self.write_termination
    }

    pub fn read_termination(&self) -> &str {
        &self.read_termination
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// `None` waits forever, which the simulated backend never has to.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn set_write_termination(&mut self, termination: impl Into<String>) {
        self.write_termination = termination.into();
    }

    pub fn set_read_termination(&mut self, termination: impl Into<String>) {
        self.read_termination = termination.into();
    }

    /// Sets both the write and the read termination.
    pub fn set_terminator(&mut self, terminator: &str) {
        self.set_write_termination(terminator);
        self.set_read_termination(terminator);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[instrument(skip(self, data), fields(resource = %self.resource))]
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.input.extend_from_slice(data);

        let terminator = self.eom.query.as_bytes().to_vec();
        while let Some(message) = take_message(&mut self.input, &terminator) {
            let message = String::from_utf8_lossy(&message).into_owned();
            if let Some(mut reply) = self.send_message(message).await? {
                reply.extend_from_slice(self.eom.response.as_bytes());
                self.output.push_back(reply);
            }
        }
        Ok(data.len())
    }

    /// Writes a message followed by the write termination.
    pub async fn write(&mut self, message: &str) -> Result<usize, SessionError> {
        debug!("Writing to {}: {}", self.resource, message);
        let mut data = message.as_bytes().to_vec();
        data.extend_from_slice(self.write_termination.as_bytes());
        self.write_raw(&data).await
    }

    /// Returns the oldest queued reply, including its terminator.
    pub fn read_raw(&mut self) -> Result<Vec<u8>, SessionError> {
        self.ensure_open()?;
        self.output.pop_front().ok_or(SessionError::Timeout(self.timeout))
    }

    /// Returns the oldest queued reply as text, without the read termination.
    pub fn read(&mut self) -> Result<String, SessionError> {
        let mut reply = self.read_raw()?;
        if !self.read_termination.is_empty() && reply.ends_with(self.read_termination.as_bytes()) {
            reply.truncate(reply.len() - self.read_termination.len());
        }
        let reply = String::from_utf8(reply).map_err(|_| SessionError::InvalidUtf8)?;
        debug!("Read from {}: {}", self.resource, reply);
        Ok(reply)
    }

    /// Removes every queued reply, in the order they were produced.
    pub fn take_replies(&mut self) -> Vec<Vec<u8>> {
        self.output.drain(..).collect()
    }

    pub async fn query(&mut self, message: &str) -> Result<String, SessionError> {
        self.write(message).await?;
        self.read()
    }

    /// Queries a comma separated list of numbers.
    pub async fn query_ascii_values(&mut self, message: &str) -> Result<Vec<f64>, SessionError> {
        let reply = self.query(message).await?;
        reply
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f64>().map_err(|_| SessionError::InvalidNumber(part.to_string())))
            .collect()
    }

    /// Queries numbers sent as an IEEE 488.2 binary block.
    pub async fn query_binary_values(&mut self, message: &str, format: DataFormat, byte_order: ByteOrder) -> Result<Vec<f64>, SessionError> {
        self.write(message).await?;
        let reply = self.read_raw()?;
        Ok(decode_block(&reply, format, byte_order)?)
    }

    /// Drops every partial message and unread reply.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.input.clear();
        self.output.clear();
        Ok(())
    }

    #[instrument(skip(self), fields(resource = %self.resource))]
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::Close {
                session: self.id,
                reply: Some(reply),
            })
            .await
            .map_err(|_| SessionError::StoreUnavailable)?;
        response.await.map_err(|_| SessionError::StoreUnavailable)??;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed { Err(SessionError::Closed) } else { Ok(()) }
    }

    async fn send_message(&self, message: String) -> Result<Option<Vec<u8>>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::Message {
                session: self.id,
                message,
                reply,
            })
            .await
            .map_err(|_| SessionError::StoreUnavailable)?;
        Ok(response.await.map_err(|_| SessionError::StoreUnavailable)??)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            self.tx
                .try_send(Event::Close {
                    session: self.id,
                    reply: None,
                })
                .unwrap_or_else(|e| debug!("Could not close session {} on drop: {}", self.id, e));
        }
    }
}

pub(crate) fn take_message(buffer: &mut Vec<u8>, terminator: &[u8]) -> Option<Vec<u8>> {
    if terminator.is_empty() {
        return (!buffer.is_empty()).then(|| std::mem::take(buffer));
    }
    let position = buffer.windows(terminator.len()).position(|window| window == terminator)?;
    let message = buffer[..position].to_vec();
    buffer.drain(..position + terminator.len());
    Some(message)
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum SessionError {
    #[error("timeout expired before a reply was available (timeout {0:?})")]
    Timeout(Option<Duration>),
    #[error("the session is closed")]
    Closed,
    #[error("the simulator is not running")]
    StoreUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("reply is not valid UTF-8")]
    InvalidUtf8,
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error(transparent)]
    DataFormat(#[from] DataFormatError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"*IDN?\n".to_vec(), b"\n".to_vec(), Some(b"*IDN?".to_vec()), b"".to_vec())]
    #[case(b"A\nB".to_vec(), b"\n".to_vec(), Some(b"A".to_vec()), b"B".to_vec())]
    #[case(b"A\r\nB\r\n".to_vec(), b"\r\n".to_vec(), Some(b"A".to_vec()), b"B\r\n".to_vec())]
    #[case(b"partial".to_vec(), b"\n".to_vec(), None, b"partial".to_vec())]
    #[case(b"whole".to_vec(), b"".to_vec(), Some(b"whole".to_vec()), b"".to_vec())]
    fn take_message_splits_on_the_terminator(
        #[case] mut buffer: Vec<u8>,
        #[case] terminator: Vec<u8>,
        #[case] expected: Option<Vec<u8>>,
        #[case] rest: Vec<u8>,
    ) {
        assert_eq!(take_message(&mut buffer, &terminator), expected);
        assert_eq!(buffer, rest);
    }
}
