use crate::domain::device::Device;
use crate::domain::resource_name::ResourceName;
use std::collections::{BTreeMap, HashMap};

/// A set of device definitions and the resource names they are bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    devices: HashMap<String, Device>,
    resources: BTreeMap<ResourceName, String>,
}

impl Fixture {
    /// Every bound device name must be a key of `devices`, the factory guarantees this for fixtures read from files.
    pub fn new(devices: HashMap<String, Device>, resources: BTreeMap<ResourceName, String>) -> Self {
        Fixture { devices, resources }
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &ResourceName> {
        self.resources.keys()
    }

    /// Creates a fresh device state for every bound resource.
    pub fn instantiate(&self) -> impl Iterator<Item = (ResourceName, Device)> {
        self.resources
            .iter()
            .filter_map(|(name, device)| self.devices.get(device).map(|device| (name.clone(), device.clone())))
    }
}
