use crate::domain::Value;
use crate::domain::ValueType;
use crate::domain::data_format::{ByteOrder, DataFormat};
use crate::domain::resource_name::InterfaceType;
use crate::domain::template::Template;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedFixture {
    pub(crate) spec: Scalar,
    #[serde(default)]
    pub(crate) devices: BTreeMap<String, SerializedDevice>,
    #[serde(default)]
    pub(crate) resources: BTreeMap<String, SerializedResource>,
}

/// A string, number or boolean read as text, e.g. a spec version or a channel id.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar(pub String);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedDevice {
    #[serde(default)]
    pub(crate) eom: HashMap<InterfaceType, SerializedEom>,
    pub(crate) error: Option<SerializedError>,
    #[serde(default)]
    pub(crate) dialogues: Vec<SerializedDialogue>,
    #[serde(default)]
    pub(crate) reset: OneOrMany,
    #[serde(default)]
    pub(crate) properties: BTreeMap<String, SerializedProperty>,
    #[serde(default)]
    pub(crate) channels: BTreeMap<String, SerializedChannelGroup>,
    pub(crate) data_format: Option<SerializedDataFormat>,
}

#[derive(Debug, Deserialize)]
pub struct SerializedEom {
    pub(crate) q: String,
    pub(crate) r: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SerializedError {
    Sentinel(String),
    Detailed {
        response: Option<SerializedErrorResponse>,
        #[serde(default)]
        error_queue: Vec<SerializedErrorQueue>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedErrorResponse {
    pub(crate) command_error: Option<String>,
    pub(crate) query_error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedErrorQueue {
    pub(crate) q: String,
    pub(crate) default: String,
    pub(crate) command_error: String,
    pub(crate) query_error: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedDialogue {
    pub(crate) q: String,
    pub(crate) r: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => vec![],
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedProperty {
    pub(crate) default: Value,
    pub(crate) getter: Option<SerializedGetter>,
    pub(crate) setter: Option<SerializedSetter>,
    #[serde(default)]
    pub(crate) specs: SerializedSpecs,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedGetter {
    pub(crate) q: Template,
    pub(crate) r: Template,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedSetter {
    pub(crate) q: Template,
    pub(crate) r: Option<String>,
    pub(crate) e: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedSpecs {
    #[serde(rename = "type")]
    pub(crate) value_type: Option<ValueType>,
    pub(crate) min: Option<Value>,
    pub(crate) max: Option<Value>,
    #[serde(default)]
    pub(crate) valid: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedChannelGroup {
    pub(crate) ids: Vec<Scalar>,
    #[serde(default)]
    pub(crate) can_select: bool,
    pub(crate) default: Option<Scalar>,
    pub(crate) selector: Option<SerializedSelector>,
    #[serde(default)]
    pub(crate) properties: BTreeMap<String, SerializedProperty>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedSelector {
    pub(crate) getter: Option<SerializedGetter>,
    pub(crate) setter: Option<SerializedSelectorSetter>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedSelectorSetter {
    pub(crate) q: Template,
    pub(crate) r: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedDataFormat {
    pub(crate) getter: Option<SerializedGetter>,
    pub(crate) setter: Option<SerializedSelectorSetter>,
    #[serde(default)]
    pub(crate) default: DataFormat,
    #[serde(default)]
    pub(crate) byte_order: ByteOrder,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedResource {
    pub(crate) device: String,
}
