//! Simulated message-based instruments.
//!
//! Devices are described in YAML fixtures, bound to VISA resource names and served by a single store task.
//! [`resource_manager::ResourceManager`] opens sessions on them, [`server`] exposes socket resources over TCP and
//! [`instrument`] drives them the way a real instrument driver would.

pub mod app_config;
pub mod domain;
pub mod drivers;
mod extensions;
pub mod fixture_loader;
pub mod instrument;
pub mod resource_manager;
pub mod server;
pub mod session;
pub mod store;
pub mod store_listener;
