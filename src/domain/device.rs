use crate::domain::channel::ChannelGroup;
use crate::domain::data_format::{ByteOrder, DataFormat, encode_block};
use crate::domain::property::{Getter, OutOfRangePolicy, Property};
use crate::domain::resource_name::InterfaceType;
use crate::domain::template::Template;
use crate::domain::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ERROR_RESPONSE: &str = "ERROR";

/// A simulated message-based instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    name: String,
    eom: HashMap<InterfaceType, Eom>,
    error_responses: ErrorResponses,
    error_queue: Option<ErrorQueue>,
    dialogues: Vec<Dialogue>,
    reset_commands: Vec<String>,
    properties: Vec<Property>,
    channels: Vec<ChannelGroup>,
    data_format: Option<DataFormatDirective>,
    policy: OutOfRangePolicy,
    // Bumped whenever a setter, selector, data format change or reset is applied
    revision: u64,
}

/// End-of-message terminators: `query` ends incoming messages, `response` is appended to replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eom {
    pub query: String,
    pub response: String,
}

impl Default for Eom {
    fn default() -> Self {
        Eom {
            query: "\n".to_string(),
            response: "\n".to_string(),
        }
    }
}

/// Replies sent for failing messages. `None` leaves the error to the error queue, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponses {
    pub command_error: Option<String>,
    pub query_error: Option<String>,
}

impl Default for ErrorResponses {
    fn default() -> Self {
        ErrorResponses {
            command_error: Some(DEFAULT_ERROR_RESPONSE.to_string()),
            query_error: Some(DEFAULT_ERROR_RESPONSE.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorQueue {
    query: String,
    default: String,
    command_error: String,
    query_error: String,
    errors: VecDeque<String>,
}

impl ErrorQueue {
    pub fn new(query: impl Into<String>, default: impl Into<String>, command_error: impl Into<String>, query_error: impl Into<String>) -> Self {
        ErrorQueue {
            query: query.into(),
            default: default.into(),
            command_error: command_error.into(),
            query_error: query_error.into(),
            errors: VecDeque::new(),
        }
    }

    fn push(&mut self, kind: ErrorKind) {
        let entry = match kind {
            ErrorKind::Command => self.command_error.clone(),
            ErrorKind::Query => self.query_error.clone(),
        };
        self.errors.push_back(entry);
    }

    fn pop(&mut self) -> String {
        self.errors.pop_front().unwrap_or_else(|| self.default.clone())
    }
}

/// A fixed query and its fixed response, `None` for commands that are accepted silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialogue {
    pub query: String,
    pub response: Option<String>,
}

/// The commands that switch array responses between ASCII and binary blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFormatDirective {
    pub getter: Option<Getter>,
    pub setter: Option<Template>,
    pub setter_response: Option<String>,
    pub default: DataFormat,
    pub byte_order: ByteOrder,
    current: DataFormat,
}

impl DataFormatDirective {
    pub fn new(getter: Option<Getter>, setter: Option<Template>, setter_response: Option<String>, default: DataFormat, byte_order: ByteOrder) -> Self {
        DataFormatDirective {
            getter,
            setter,
            setter_response,
            default,
            byte_order,
            current: default,
        }
    }

    pub fn current(&self) -> DataFormat {
        self.current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Command,
    Query,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Command => write!(f, "command error"),
            ErrorKind::Query => write!(f, "query error"),
        }
    }
}

/// The result of handling one complete message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(Vec<u8>),
    Silent,
    Error { kind: ErrorKind, reason: String, reply: Option<Vec<u8>> },
}

impl Outcome {
    pub fn into_reply(self) -> Option<Vec<u8>> {
        match self {
            Outcome::Reply(reply) => Some(reply),
            Outcome::Error { reply, .. } => reply,
            Outcome::Silent => None,
        }
    }
}

// Result of matching a message, before errors are routed to a response or the error queue
enum Matched {
    Reply(Vec<u8>),
    Silent,
    CommandError { reason: String, response: Option<String> },
    QueryError(String),
}

impl Matched {
    fn from_response(response: Option<&String>) -> Matched {
        match response {
            Some(response) => Matched::Reply(response.as_bytes().to_vec()),
            None => Matched::Silent,
        }
    }
}

impl Device {
    pub fn builder(name: impl Into<String>) -> DeviceBuilder {
        DeviceBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eom(&self, interface_type: InterfaceType) -> Option<&Eom> {
        self.eom.get(&interface_type)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn channel_group(&self, name: &str) -> Option<&ChannelGroup> {
        self.channels.iter().find(|g| g.name() == name)
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format.as_ref().map(DataFormatDirective::current).unwrap_or_default()
    }

    pub fn error_queue(&self) -> Option<&ErrorQueue> {
        self.error_queue.as_ref()
    }

    /// Changes whenever a message or reset may have changed the values in [`Device::snapshot`].
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Processes one complete message, without its terminator.
    pub fn handle(&mut self, message: &str) -> Outcome {
        let message = message.trim();
        let matched = self.match_message(message);

        match matched {
            Matched::Reply(reply) => Outcome::Reply(reply),
            Matched::Silent => Outcome::Silent,
            Matched::CommandError { reason, response } => {
                debug!("⚠️ Command error for '{}' on device '{}': {}", message, self.name, reason);
                let reply = response.or_else(|| self.route_error(ErrorKind::Command));
                Outcome::Error {
                    kind: ErrorKind::Command,
                    reason,
                    reply: reply.map(String::into_bytes),
                }
            }
            Matched::QueryError(reason) => {
                debug!("⚠️ Query error for '{}' on device '{}': {}", message, self.name, reason);
                let reply = self.route_error(ErrorKind::Query);
                Outcome::Error {
                    kind: ErrorKind::Query,
                    reason,
                    reply: reply.map(String::into_bytes),
                }
            }
        }
    }

    fn route_error(&mut self, kind: ErrorKind) -> Option<String> {
        let response = match kind {
            ErrorKind::Command => &self.error_responses.command_error,
            ErrorKind::Query => &self.error_responses.query_error,
        };
        if let Some(response) = response {
            return Some(response.clone());
        }
        if let Some(queue) = self.error_queue.as_mut() {
            queue.push(kind);
            return None;
        }
        Some(DEFAULT_ERROR_RESPONSE.to_string())
    }

    fn match_message(&mut self, message: &str) -> Matched {
        if let Some(dialogue) = self.dialogues.iter().find(|d| d.query == message) {
            return Matched::from_response(dialogue.response.as_ref());
        }

        if self.reset_commands.iter().any(|c| c == message) {
            self.reset();
            return Matched::Silent;
        }

        if let Some(queue) = self.error_queue.as_mut() {
            if queue.query == message {
                return Matched::Reply(queue.pop().into_bytes());
            }
        }

        if let Some(matched) = self.match_data_format(message) {
            return matched;
        }

        if let Some(matched) = self.match_getters(message) {
            return matched;
        }

        if let Some(matched) = self.match_setters(message) {
            if !matches!(matched, Matched::CommandError { .. }) {
                self.revision += 1;
            }
            return matched;
        }

        Matched::QueryError(format!("no dialogue, getter or setter matches '{}'", message))
    }

    fn match_data_format(&mut self, message: &str) -> Option<Matched> {
        let directive = self.data_format.as_mut()?;

        if let Some(getter) = &directive.getter {
            if getter.query.capture(message, None).is_some() {
                let rendered = getter.response.render(Some(&Value::Str(directive.current.to_string())), None);
                return Some(match rendered {
                    Ok(text) => Matched::Reply(text.into_bytes()),
                    Err(e) => Matched::QueryError(e.to_string()),
                });
            }
        }

        let text = directive.setter.as_ref()?.capture(message, None)?;
        Some(match text.parse::<DataFormat>() {
            Ok(format) => {
                directive.current = format;
                self.revision += 1;
                Matched::from_response(directive.setter_response.as_ref())
            }
            Err(e) => Matched::CommandError {
                reason: e.to_string(),
                response: None,
            },
        })
    }

    fn match_getters(&self, message: &str) -> Option<Matched> {
        let data_format = self.data_format.as_ref().map(|d| (d.current, d.byte_order));

        for property in &self.properties {
            if let Some(getter) = property.getter() {
                if getter.query.capture(message, None).is_some() {
                    return Some(render_getter(getter, property.value(), None, data_format));
                }
            }
        }

        for group in &self.channels {
            if let Some(rendered) = group.match_selector_getter(message) {
                return Some(match rendered {
                    Ok(text) => Matched::Reply(text.into_bytes()),
                    Err(e) => Matched::QueryError(e.to_string()),
                });
            }
        }

        for group in &self.channels {
            for (ch_id, property) in group.getters() {
                if let Some(getter) = property.getter() {
                    if getter.query.capture(message, Some(ch_id)).is_some() {
                        return Some(render_getter(getter, property.value(), Some(ch_id), data_format));
                    }
                }
            }
        }

        None
    }

    fn match_setters(&mut self, message: &str) -> Option<Matched> {
        let policy = self.policy;

        for property in self.properties.iter_mut() {
            let Some(text) = property.setter().and_then(|s| s.query.capture(message, None)) else {
                continue;
            };
            return Some(apply_setter(property, &text, policy));
        }

        for group in self.channels.iter_mut() {
            if let Some(selected) = group.match_selector_setter(message) {
                return Some(match selected {
                    Ok(response) => Matched::from_response(response.as_ref()),
                    Err(e) => Matched::CommandError {
                        reason: e.to_string(),
                        response: None,
                    },
                });
            }
        }

        for group in self.channels.iter_mut() {
            for (ch_id, property) in group.setters_mut() {
                let Some(text) = property.setter().and_then(|s| s.query.capture(message, Some(ch_id))) else {
                    continue;
                };
                return Some(apply_setter(property, &text, policy));
            }
        }

        None
    }

    /// Returns every property, channel and the data format to its default and empties the error queue.
    pub fn reset(&mut self) {
        self.properties.iter_mut().for_each(Property::reset);
        self.channels.iter_mut().for_each(ChannelGroup::reset);
        if let Some(directive) = self.data_format.as_mut() {
            directive.current = directive.default;
        }
        if let Some(queue) = self.error_queue.as_mut() {
            queue.errors.clear();
        }
        self.revision += 1;
    }

    /// Current values, channel properties keyed by `<channel id>.<property name>`.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut values: BTreeMap<String, Value> = self.properties.iter().map(|p| (p.name().to_string(), p.value().clone())).collect();
        for group in &self.channels {
            values.extend(group.values().map(|(key, value)| (key, value.clone())));
        }
        values
    }
}

fn render_getter(getter: &Getter, value: &Value, ch_id: Option<&str>, data_format: Option<(DataFormat, ByteOrder)>) -> Matched {
    if let (Some(values), Some((format @ (DataFormat::Real32 | DataFormat::Real64), byte_order))) = (value.as_float_array(), data_format) {
        return match encode_block(values, format, byte_order) {
            Ok(block) => Matched::Reply(block),
            Err(e) => Matched::QueryError(e.to_string()),
        };
    }

    match getter.response.render(Some(value), ch_id) {
        Ok(text) => Matched::Reply(text.into_bytes()),
        Err(e) => Matched::QueryError(e.to_string()),
    }
}

fn apply_setter(property: &mut Property, text: &str, policy: OutOfRangePolicy) -> Matched {
    let (response, error) = match property.setter() {
        Some(setter) => (setter.response.clone(), setter.error.clone()),
        None => (None, None),
    };

    match property.update_from_text(text, policy) {
        Ok(_) => Matched::from_response(response.as_ref()),
        Err(e) => Matched::CommandError {
            reason: format!("cannot set '{}': {}", property.name(), e),
            response: error,
        },
    }
}

pub struct DeviceBuilder {
    name: String,
    eom: HashMap<InterfaceType, Eom>,
    error_responses: ErrorResponses,
    error_queue: Option<ErrorQueue>,
    dialogues: Vec<Dialogue>,
    reset_commands: Vec<String>,
    properties: Vec<Property>,
    channels: Vec<ChannelGroup>,
    data_format: Option<DataFormatDirective>,
    policy: OutOfRangePolicy,
}

impl DeviceBuilder {
    pub fn new(name: String) -> Self {
        DeviceBuilder {
            name,
            eom: HashMap::new(),
            error_responses: ErrorResponses::default(),
            error_queue: None,
            dialogues: vec![],
            reset_commands: vec![],
            properties: vec![],
            channels: vec![],
            data_format: None,
            policy: OutOfRangePolicy::default(),
        }
    }

    pub fn eom(mut self, interface_type: InterfaceType, eom: Eom) -> Self {
        self.eom.insert(interface_type, eom);
        self
    }

    pub fn error_responses(mut self, error_responses: ErrorResponses) -> Self {
        self.error_responses = error_responses;
        self
    }

    pub fn error_queue(mut self, error_queue: ErrorQueue) -> Self {
        self.error_queue = Some(error_queue);
        self
    }

    pub fn dialogue(mut self, query: impl Into<String>, response: Option<String>) -> Self {
        self.dialogues.push(Dialogue {
            query: query.into(),
            response,
        });
        self
    }

    pub fn reset_command(mut self, command: impl Into<String>) -> Self {
        self.reset_commands.push(command.into());
        self
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn channel_group(mut self, group: ChannelGroup) -> Self {
        self.channels.push(group);
        self
    }

    pub fn data_format(mut self, directive: DataFormatDirective) -> Self {
        self.data_format = Some(directive);
        self
    }

    pub fn out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Device, DeviceError> {
        let mut names = HashSet::new();
        if let Some(duplicate) = self.properties.iter().find(|p| !names.insert(p.name())) {
            return Err(DeviceError::DuplicateProperty {
                device: self.name,
                property: duplicate.name().to_string(),
            });
        }

        let mut groups = HashSet::new();
        if let Some(duplicate) = self.channels.iter().find(|g| !groups.insert(g.name())) {
            return Err(DeviceError::DuplicateChannelGroup {
                device: self.name,
                group: duplicate.name().to_string(),
            });
        }

        let mut queries = HashSet::new();
        if let Some(duplicate) = self.dialogues.iter().find(|d| !queries.insert(d.query.as_str())) {
            return Err(DeviceError::DuplicateDialogue {
                device: self.name,
                query: duplicate.query.clone(),
            });
        }

        Ok(Device {
            name: self.name,
            eom: self.eom,
            error_responses: self.error_responses,
            error_queue: self.error_queue,
            dialogues: self.dialogues,
            reset_commands: self.reset_commands,
            properties: self.properties,
            channels: self.channels,
            data_format: self.data_format,
            policy: self.policy,
            revision: 0,
        })
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum DeviceError {
    #[error("property '{property}' is defined more than once on device '{device}'")]
    DuplicateProperty { device: String, property: String },
    #[error("channel group '{group}' is defined more than once on device '{device}'")]
    DuplicateChannelGroup { device: String, group: String },
    #[error("dialogue '{query}' is defined more than once on device '{device}'")]
    DuplicateDialogue { device: String, query: String },
}
