use crate::domain::ValueType;
use crate::domain::channel::{ChannelError, ChannelGroup, Selector};
use crate::domain::device::{DataFormatDirective, Device, DeviceError, Eom, ErrorQueue, ErrorResponses};
use crate::domain::fixture::Fixture;
use crate::domain::property::{Getter, OutOfRangePolicy, Property, PropertyError};
use crate::domain::resource_name::{ResourceName, ResourceNameError};
use crate::domain::{Value, ValueError};
use crate::fixture_loader::serialized_fixture::{
    SerializedChannelGroup, SerializedDataFormat, SerializedDevice, SerializedError, SerializedFixture, SerializedGetter, SerializedProperty,
    SerializedSelector,
};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub const SUPPORTED_SPEC_VERSIONS: [&str; 2] = ["1.0", "1.1"];

pub fn from_yaml(yaml: &str, policy: OutOfRangePolicy) -> Result<Fixture, FixtureFactoryError> {
    let fixture = serde_yaml::from_str::<SerializedFixture>(yaml)?;

    if !SUPPORTED_SPEC_VERSIONS.contains(&fixture.spec.0.as_str()) {
        return Err(FixtureFactoryError::UnsupportedSpecVersion(fixture.spec.0));
    }

    let devices = fixture
        .devices
        .into_iter()
        .map(|(name, device)| to_device(&name, device, policy).map(|device| (name, device)))
        .collect::<Result<HashMap<_, _>, _>>()?;

    let mut resources = BTreeMap::new();
    for (address, resource) in fixture.resources {
        let name = ResourceName::parse(&address)?;
        let device = devices.get(&resource.device).ok_or_else(|| FixtureFactoryError::UnknownDevice {
            resource: address.clone(),
            device: resource.device.clone(),
        })?;

        if device.eom(name.interface_type()).is_none() {
            return Err(FixtureFactoryError::MissingEom {
                device: resource.device,
                interface_type: name.interface_type().to_string(),
            });
        }

        if resources.insert(name.clone(), resource.device).is_some() {
            return Err(FixtureFactoryError::DuplicateResource(name.to_string()));
        }
    }

    Ok(Fixture::new(devices, resources))
}

fn to_device(name: &str, device: SerializedDevice, policy: OutOfRangePolicy) -> Result<Device, FixtureFactoryError> {
    let mut builder = Device::builder(name).out_of_range(policy);

    for (interface_type, eom) in device.eom {
        builder = builder.eom(interface_type, Eom { query: eom.q, response: eom.r });
    }

    let (error_responses, error_queue) = to_error_handling(name, device.error)?;
    builder = builder.error_responses(error_responses);
    if let Some(error_queue) = error_queue {
        builder = builder.error_queue(error_queue);
    }

    for dialogue in device.dialogues {
        builder = builder.dialogue(dialogue.q, dialogue.r);
    }

    for command in device.reset.into_vec() {
        builder = builder.reset_command(command);
    }

    for (property_name, property) in device.properties {
        builder = builder.property(to_property(name, &property_name, property)?);
    }

    for (group_name, group) in device.channels {
        builder = builder.channel_group(to_channel_group(name, &group_name, group)?);
    }

    if let Some(data_format) = device.data_format {
        builder = builder.data_format(to_data_format(data_format));
    }

    Ok(builder.build()?)
}

fn to_error_handling(device: &str, error: Option<SerializedError>) -> Result<(ErrorResponses, Option<ErrorQueue>), FixtureFactoryError> {
    match error {
        None => Ok((ErrorResponses::default(), None)),
        Some(SerializedError::Sentinel(sentinel)) => Ok((
            ErrorResponses {
                command_error: Some(sentinel.clone()),
                query_error: Some(sentinel),
            },
            None,
        )),
        Some(SerializedError::Detailed { response, mut error_queue }) => {
            if error_queue.len() > 1 {
                return Err(FixtureFactoryError::MultipleErrorQueues(device.to_string()));
            }
            let error_queue = error_queue
                .pop()
                .map(|queue| ErrorQueue::new(queue.q, queue.default, queue.command_error, queue.query_error));

            let error_responses = match (response, &error_queue) {
                (Some(response), _) => ErrorResponses {
                    command_error: response.command_error,
                    query_error: response.query_error,
                },
                (None, Some(_)) => ErrorResponses {
                    command_error: None,
                    query_error: None,
                },
                (None, None) => ErrorResponses::default(),
            };
            Ok((error_responses, error_queue))
        }
    }
}

fn to_property(device: &str, name: &str, property: SerializedProperty) -> Result<Property, FixtureFactoryError> {
    let value_type = property.specs.value_type.unwrap_or_else(|| infer_type(&property.default));
    let mut builder = Property::builder(name, value_type, property.default).valid(property.specs.valid);

    if let Some(min) = property.specs.min {
        builder = builder.min(min);
    }
    if let Some(max) = property.specs.max {
        builder = builder.max(max);
    }
    if let Some(getter) = property.getter {
        builder = builder.getter(getter.q, getter.r);
    }
    if let Some(setter) = property.setter {
        builder = builder.setter(setter.q, setter.r, setter.e);
    }

    builder.build().map_err(|source| FixtureFactoryError::Property {
        device: device.to_string(),
        property: name.to_string(),
        source,
    })
}

fn infer_type(value: &Value) -> ValueType {
    match value {
        Value::Int(_) => ValueType::Int,
        Value::Float(_) => ValueType::Float,
        Value::Bool(_) => ValueType::Bool,
        Value::Str(_) => ValueType::Str,
        Value::FloatArray(_) => ValueType::FloatArray,
    }
}

fn to_channel_group(device: &str, name: &str, group: SerializedChannelGroup) -> Result<ChannelGroup, FixtureFactoryError> {
    let properties = group
        .properties
        .into_iter()
        .map(|(property_name, property)| to_property(device, &property_name, property))
        .collect::<Result<Vec<_>, _>>()?;

    let ids = group.ids.into_iter().map(|id| id.0).collect();
    let default = group.default.map(|id| id.0);

    ChannelGroup::new(name, ids, group.can_select, default.as_deref(), group.selector.map(to_selector), properties).map_err(|source| {
        FixtureFactoryError::Channel {
            device: device.to_string(),
            source,
        }
    })
}

fn to_getter(getter: SerializedGetter) -> Getter {
    Getter {
        query: getter.q,
        response: getter.r,
    }
}

fn to_selector(selector: SerializedSelector) -> Selector {
    let (setter, setter_response) = match selector.setter {
        Some(setter) => (Some(setter.q), setter.r),
        None => (None, None),
    };
    Selector {
        setter,
        setter_response,
        getter: selector.getter.map(to_getter),
    }
}

fn to_data_format(data_format: SerializedDataFormat) -> DataFormatDirective {
    let (setter, setter_response) = match data_format.setter {
        Some(setter) => (Some(setter.q), setter.r),
        None => (None, None),
    };
    DataFormatDirective::new(
        data_format.getter.map(to_getter),
        setter,
        setter_response,
        data_format.default,
        data_format.byte_order,
    )
}

#[derive(Error, Debug)]
pub enum FixtureFactoryError {
    #[error("yaml deserialization error: {0}")]
    Deserialization(#[from] serde_yaml::Error),
    #[error("unsupported spec version '{0}', expected one of {supported}", supported = SUPPORTED_SPEC_VERSIONS.join(", "))]
    UnsupportedSpecVersion(String),
    #[error(transparent)]
    InvalidResourceName(#[from] ResourceNameError),
    #[error("resource '{resource}' is bound to unknown device '{device}'")]
    UnknownDevice { resource: String, device: String },
    #[error("resource '{0}' is bound more than once")]
    DuplicateResource(String),
    #[error("device '{device}' has no end-of-message terminators for '{interface_type}'")]
    MissingEom { device: String, interface_type: String },
    #[error("device '{0}' declares more than one error queue")]
    MultipleErrorQueues(String),
    #[error("property '{property}' of device '{device}': {source}")]
    Property {
        device: String,
        property: String,
        source: PropertyError,
    },
    #[error("device '{device}': {source}")]
    Channel { device: String, source: ChannelError },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl FixtureFactoryError {
    /// The value error behind an invalid property definition, if any.
    pub fn value_error(&self) -> Option<&ValueError> {
        match self {
            FixtureFactoryError::Property {
                source: PropertyError::InvalidValue(e),
                ..
            } => Some(e),
            FixtureFactoryError::Property {
                source: PropertyError::InvalidDefault(inner),
                ..
            } => match inner.as_ref() {
                PropertyError::InvalidValue(e) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }
}
