use crate::domain::property::OutOfRangePolicy;
use crate::server::ServerOptions;
use crate::store::StoreOptions;
use config::{Config, ConfigError};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    core: Core,
    simulation: Simulation,
    server: Server,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn server(&self) -> &Server {
        &self.server
    }
}

#[derive(Debug, Deserialize)]
pub struct Core {
    fixture_directory: String,
    #[serde(default = "default_fixture_extension")]
    fixture_extension: String,
    request_buffer_size: usize,
}

fn default_fixture_extension() -> String {
    "yaml".to_string()
}

impl Core {
    pub fn fixture_directory(&self) -> &str {
        &self.fixture_directory
    }

    pub fn fixture_extension(&self) -> &str {
        &self.fixture_extension
    }

    pub fn request_buffer_size(&self) -> usize {
        self.request_buffer_size
    }
}

#[derive(Debug, Deserialize)]
pub struct Simulation {
    #[serde(default)]
    out_of_range: OutOfRangePolicy,
    #[serde(default)]
    reset_on_last_close: bool,
}

impl Simulation {
    pub fn out_of_range(&self) -> OutOfRangePolicy {
        self.out_of_range
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            reset_on_last_close: self.reset_on_last_close,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Server {
    enabled: bool,
    host: String,
    #[serde(default, with = "humantime_serde")]
    read_timeout: Option<Duration>,
}

impl Server {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            host: self.host.clone(),
            read_timeout: self.read_timeout,
        }
    }
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                core: Core {
                    fixture_directory: "sims".to_string(),
                    fixture_extension: "yaml".to_string(),
                    request_buffer_size: 1,
                },
                simulation: Simulation {
                    out_of_range: OutOfRangePolicy::Reject,
                    reset_on_last_close: false,
                },
                server: Server {
                    enabled: false,
                    host: "127.0.0.1".to_string(),
                    read_timeout: None,
                },
            },
        }
    }

    pub fn out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.config.simulation.out_of_range = policy;
        self
    }

    pub fn reset_on_last_close(mut self, reset: bool) -> Self {
        self.config.simulation.reset_on_last_close = reset;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
