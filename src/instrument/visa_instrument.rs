use crate::domain::Value;
use crate::instrument::connection::{ConnectionError, MessageResource};
use crate::instrument::parameter::{Parameter, ParameterError, to_json};
use crate::instrument::tcp::{RetryOptions, TcpConnection};
use crate::resource_manager::{ResourceManager, ResourceManagerError};
use crate::session::Session;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentOptions {
    /// Seconds, `None` waits forever.
    pub timeout: Option<f64>,
    pub terminator: Option<String>,
    pub device_clear: bool,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        InstrumentOptions {
            timeout: Some(5.0),
            terminator: None,
            device_clear: true,
        }
    }
}

/// The parts of an `*IDN?` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Idn {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

impl Idn {
    pub fn parse(reply: &str) -> Idn {
        let mut parts = reply.trim().splitn(4, ',').map(|part| part.trim().to_string()).filter(|part| !part.is_empty());
        Idn {
            vendor: parts.next(),
            model: parts.next(),
            serial: parts.next(),
            firmware: parts.next(),
        }
    }
}

/// An instrument driven by text commands over a [`MessageResource`].
#[derive(Debug)]
pub struct VisaInstrument<R: MessageResource> {
    name: String,
    address: String,
    resource: R,
    parameters: BTreeMap<String, Parameter>,
}

impl VisaInstrument<Session> {
    /// Opens `address` on the simulator.
    #[instrument(skip(manager, options))]
    pub async fn connect(name: &str, manager: &ResourceManager, address: &str, options: InstrumentOptions) -> Result<Self, InstrumentError> {
        let session = manager.open_resource(address).await?;
        VisaInstrument::with_resource(name, address, session, options).await
    }
}

impl VisaInstrument<TcpConnection> {
    /// Connects to a `host:port` socket, e.g. a simulated socket resource served by this crate.
    #[instrument(skip(retry, options))]
    pub async fn connect_tcp(name: &str, address: &str, retry: RetryOptions, options: InstrumentOptions) -> Result<Self, InstrumentError> {
        let connection = TcpConnection::connect(address, retry).await?;
        VisaInstrument::with_resource(name, address, connection, options).await
    }
}

impl<R: MessageResource> VisaInstrument<R> {
    pub async fn with_resource(name: &str, address: &str, resource: R, options: InstrumentOptions) -> Result<Self, InstrumentError> {
        let mut instrument = VisaInstrument {
            name: name.to_string(),
            address: address.to_string(),
            resource,
            parameters: BTreeMap::new(),
        };

        instrument.set_timeout(options.timeout)?;
        if let Some(terminator) = &options.terminator {
            instrument.set_terminator(terminator);
        }
        if options.device_clear {
            instrument.device_clear().await?;
        }

        info!("🔌 Connected '{}' to {}", instrument.name, instrument.address);
        Ok(instrument)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// The timeout in seconds, `None` is infinite.
    pub fn timeout(&self) -> Option<f64> {
        self.resource.timeout().map(|timeout| timeout.as_secs_f64())
    }

    pub fn set_timeout(&mut self, seconds: Option<f64>) -> Result<(), InstrumentError> {
        let timeout = match seconds {
            None => None,
            Some(seconds) if seconds.is_infinite() && seconds > 0.0 => None,
            Some(seconds) if seconds >= 0.0 => Some(Duration::try_from_secs_f64(seconds).map_err(|_| InstrumentError::InvalidTimeout(seconds))?),
            Some(seconds) => return Err(InstrumentError::InvalidTimeout(seconds)),
        };
        self.resource.set_timeout(timeout);
        Ok(())
    }

    /// Sets the read and the write termination.
    pub fn set_terminator(&mut self, terminator: &str) {
        self.resource.set_terminator(terminator);
    }

    /// Clears the buffers of the device, the simulated backend does not support it.
    pub async fn device_clear(&mut self) -> Result<(), InstrumentError> {
        if self.resource.is_simulated() {
            debug!("Skipping device clear of '{}' on the simulated backend", self.name);
            return Ok(());
        }
        self.resource.clear().await?;
        Ok(())
    }

    pub async fn write(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        debug!("[{}] Writing: {}", self.name, cmd);
        self.resource.write(cmd).await?;
        Ok(())
    }

    pub async fn ask(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        debug!("[{}] Querying: {}", self.name, cmd);
        let response = self.resource.query(cmd).await?;
        debug!("[{}] Response: {}", self.name, response);
        Ok(response)
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), InstrumentError> {
        if self.parameters.contains_key(parameter.name()) {
            return Err(InstrumentError::DuplicateParameter(parameter.name().to_string()));
        }
        self.parameters.insert(parameter.name().to_string(), parameter);
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Reads a parameter from the instrument and caches it.
    pub async fn get(&mut self, name: &str) -> Result<Value, InstrumentError> {
        let parameter = self.parameters.get(name).ok_or_else(|| InstrumentError::UnknownParameter(name.to_string()))?;
        let command = parameter
            .get_command()
            .map_err(|source| InstrumentError::parameter(name, source))?
            .ok_or_else(|| InstrumentError::NotGettable(name.to_string()))?;

        let reply = self.ask(&command).await?;
        let parameter = self.parameters.get_mut(name).ok_or_else(|| InstrumentError::UnknownParameter(name.to_string()))?;
        let value = parameter.parse_reply(&reply).map_err(|source| InstrumentError::parameter(name, source))?;
        parameter.update_cache(value.clone());
        Ok(value)
    }

    /// Checks that `value` would be accepted by `set`, without sending anything.
    pub fn validate(&self, name: &str, value: Value) -> Result<(), InstrumentError> {
        let parameter = self.parameters.get(name).ok_or_else(|| InstrumentError::UnknownParameter(name.to_string()))?;
        parameter
            .set_command(value)
            .map_err(|source| InstrumentError::parameter(name, source))?
            .ok_or_else(|| InstrumentError::NotSettable(name.to_string()))?;
        Ok(())
    }

    /// Validates a value, sends it to the instrument and caches it.
    pub async fn set(&mut self, name: &str, value: Value) -> Result<(), InstrumentError> {
        let parameter = self.parameters.get(name).ok_or_else(|| InstrumentError::UnknownParameter(name.to_string()))?;
        let (command, value) = parameter
            .set_command(value)
            .map_err(|source| InstrumentError::parameter(name, source))?
            .ok_or_else(|| InstrumentError::NotSettable(name.to_string()))?;

        self.write(&command).await?;
        if let Some(parameter) = self.parameters.get_mut(name) {
            parameter.update_cache(value);
        }
        Ok(())
    }

    pub async fn get_idn(&mut self) -> Result<Idn, InstrumentError> {
        let reply = self.ask("*IDN?").await?;
        Ok(Idn::parse(&reply))
    }

    /// Describes the instrument and its parameters, reading every gettable parameter first when `update` is set.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn snapshot(&mut self, update: bool) -> Result<serde_json::Value, InstrumentError> {
        if update {
            let gettable = self.parameters.values().filter(|p| p.is_gettable()).map(|p| p.name().to_string()).collect::<Vec<_>>();
            for name in gettable {
                self.get(&name).await?;
            }
        }

        let read_terminator = self.resource.read_termination().to_string();
        let write_terminator = self.resource.write_termination().to_string();
        let terminator = (read_terminator == write_terminator).then(|| read_terminator.clone());
        let parameters = self
            .parameters
            .iter()
            .map(|(name, parameter)| (name.clone(), parameter.snapshot()))
            .collect::<serde_json::Map<_, _>>();

        Ok(json!({
            "name": self.name,
            "address": self.address,
            "terminator": terminator,
            "read_terminator": read_terminator,
            "write_terminator": write_terminator,
            "timeout": self.timeout(),
            "parameters": parameters,
        }))
    }

    /// The cached value of a parameter as JSON, `null` if it was never read or set.
    pub fn cached_json(&self, name: &str) -> serde_json::Value {
        self.parameters
            .get(name)
            .and_then(Parameter::cached)
            .map(|cached| to_json(&cached.value))
            .unwrap_or(serde_json::Value::Null)
    }

    pub async fn close(&mut self) -> Result<(), InstrumentError> {
        self.resource.close().await?;
        info!("🔌 Closed '{}'", self.name);
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error(transparent)]
    ResourceManager(#[from] ResourceManagerError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("timeout must be a non-negative number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("parameter '{0}' is already defined")]
    DuplicateParameter(String),
    #[error("parameter '{0}' has no get command")]
    NotGettable(String),
    #[error("parameter '{0}' has no set command")]
    NotSettable(String),
    #[error("parameter '{name}': {source}")]
    Parameter { name: String, source: ParameterError },
}

impl InstrumentError {
    fn parameter(name: &str, source: ParameterError) -> Self {
        InstrumentError::Parameter {
            name: name.to_string(),
            source,
        }
    }
}
