use crate::domain::property::{Getter, Property};
use crate::domain::template::{Template, TemplateError};
use crate::domain::value::Value;
use std::collections::HashSet;
use thiserror::Error;

/// A group of channels sharing one set of property definitions, each channel holding its own state.
///
/// Templates containing `{ch_id}` address a channel explicitly. When the group can select, one channel is
/// selected at a time and templates without `{ch_id}` act on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGroup {
    name: String,
    can_select: bool,
    channels: Vec<Channel>,
    selected: usize,
    default_selected: usize,
    selector: Option<Selector>,
}

#[derive(Debug, Clone, PartialEq)]
struct Channel {
    id: String,
    properties: Vec<Property>,
}

/// Commands that change or report the selected channel, their value placeholder holds the channel id.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub setter: Option<Template>,
    pub setter_response: Option<String>,
    pub getter: Option<Getter>,
}

impl ChannelGroup {
    pub fn new(
        name: impl Into<String>,
        ids: Vec<String>,
        can_select: bool,
        default: Option<&str>,
        selector: Option<Selector>,
        properties: Vec<Property>,
    ) -> Result<ChannelGroup, ChannelError> {
        let name = name.into();
        if ids.is_empty() {
            return Err(ChannelError::NoChannels(name));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(ChannelError::DuplicateChannel {
                group: name,
                channel: duplicate.clone(),
            });
        }

        let default_selected = match default {
            Some(default) => ids.iter().position(|id| id == default).ok_or_else(|| ChannelError::UnknownChannel {
                group: name.clone(),
                channel: default.to_string(),
            })?,
            None => 0,
        };

        if !can_select {
            if selector.is_some() {
                return Err(ChannelError::SelectorWithoutSelection(name));
            }
            let unaddressed = properties.iter().find(|p| {
                p.getter().is_some_and(|g| !g.query.has_channel_placeholder()) || p.setter().is_some_and(|s| !s.query.has_channel_placeholder())
            });
            if let Some(property) = unaddressed {
                return Err(ChannelError::MissingChannelPlaceholder {
                    group: name,
                    property: property.name().to_string(),
                });
            }
        }

        let channels = ids
            .into_iter()
            .map(|id| Channel {
                id,
                properties: properties.clone(),
            })
            .collect();

        Ok(ChannelGroup {
            name,
            can_select,
            channels,
            selected: default_selected,
            default_selected,
            selector,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_select(&self) -> bool {
        self.can_select
    }

    pub fn selected(&self) -> Option<&str> {
        self.can_select.then(|| self.channels[self.selected].id.as_str())
    }

    pub fn property(&self, ch_id: &str, name: &str) -> Option<&Property> {
        self.channels
            .iter()
            .find(|c| c.id == ch_id)
            .and_then(|c| c.properties.iter().find(|p| p.name() == name))
    }

    /// Properties whose getter may answer a query, paired with the channel they belong to.
    pub fn getters(&self) -> impl Iterator<Item = (&str, &Property)> {
        let selected = self.selected().map(str::to_string);
        self.channels.iter().flat_map(move |channel| {
            let is_selected = selected.as_deref() == Some(channel.id.as_str());
            channel
                .properties
                .iter()
                .filter(move |p| p.getter().is_some_and(|g| g.query.has_channel_placeholder() || is_selected))
                .map(move |p| (channel.id.as_str(), p))
        })
    }

    /// Properties whose setter may accept a command, paired with the channel they belong to.
    pub fn setters_mut(&mut self) -> impl Iterator<Item = (&str, &mut Property)> {
        let selected = self.can_select.then_some(self.selected);
        self.channels.iter_mut().enumerate().flat_map(move |(index, channel)| {
            let is_selected = selected == Some(index);
            let Channel { id, properties } = channel;
            let id = id.as_str();
            properties
                .iter_mut()
                .filter(move |p| p.setter().is_some_and(|s| s.query.has_channel_placeholder() || is_selected))
                .map(move |p| (id, p))
        })
    }

    /// Answers the selector getter, `None` if the message is not the selector query.
    pub fn match_selector_getter(&self, message: &str) -> Option<Result<String, TemplateError>> {
        let getter = self.selector.as_ref()?.getter.as_ref()?;
        getter.query.capture(message, None)?;
        let selected = self.selected()?;
        Some(getter.response.render(Some(&Value::Str(selected.to_string())), Some(selected)))
    }

    /// Applies the selector setter. `None` if the message is not a selector command, otherwise the configured
    /// response or an error for an unknown channel.
    pub fn match_selector_setter(&mut self, message: &str) -> Option<Result<Option<String>, ChannelError>> {
        let selector = self.selector.as_ref()?;
        let ch_id = selector.setter.as_ref()?.capture(message, None)?;
        let response = selector.setter_response.clone();
        Some(self.select(&ch_id).map(|_| response))
    }

    /// Selects a channel, channel ids compare case-insensitively as SCPI mnemonics do.
    pub fn select(&mut self, ch_id: &str) -> Result<(), ChannelError> {
        if !self.can_select {
            return Err(ChannelError::SelectionNotSupported(self.name.clone()));
        }
        let index = self
            .channels
            .iter()
            .position(|c| c.id.eq_ignore_ascii_case(ch_id))
            .ok_or_else(|| ChannelError::UnknownChannel {
                group: self.name.clone(),
                channel: ch_id.to_string(),
            })?;
        self.selected = index;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.selected = self.default_selected;
        self.channels.iter_mut().flat_map(|c| c.properties.iter_mut()).for_each(Property::reset);
    }

    /// Current values keyed by `<channel id>.<property name>`.
    pub fn values(&self) -> impl Iterator<Item = (String, &Value)> {
        self.channels
            .iter()
            .flat_map(|c| c.properties.iter().map(move |p| (format!("{}.{}", c.id, p.name()), p.value())))
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ChannelError {
    #[error("channel group '{0}' has no channels")]
    NoChannels(String),
    #[error("channel '{channel}' appears more than once in group '{group}'")]
    DuplicateChannel { group: String, channel: String },
    #[error("unknown channel '{channel}' in group '{group}'")]
    UnknownChannel { group: String, channel: String },
    #[error("channel group '{0}' cannot select channels")]
    SelectionNotSupported(String),
    #[error("channel group '{0}' declares a selector but cannot select")]
    SelectorWithoutSelection(String),
    #[error("property '{property}' of channel group '{group}' must address its channel with {{ch_id}}")]
    MissingChannelPlaceholder { group: String, property: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::property::OutOfRangePolicy;
    use crate::domain::value::ValueType;
    use pretty_assertions::assert_eq;

    fn t(source: &str) -> Template {
        Template::parse(source).unwrap()
    }

    fn frequency_property(name: &str, query_prefix: &str) -> Property {
        Property::builder(name, ValueType::Float, Value::Float(10.0))
            .getter(t(&format!("{}?", query_prefix)), t("{}"))
            .setter(t(&format!("{} {{}}", query_prefix)), None, None)
            .build()
            .unwrap()
    }

    fn selectable_group() -> ChannelGroup {
        let selector = Selector {
            setter: Some(t("INST:SEL {}")),
            setter_response: None,
            getter: Some(Getter {
                query: t("INST:SEL?"),
                response: t("{}"),
            }),
        };
        ChannelGroup::new(
            "mode",
            vec!["sa".to_string(), "pn".to_string()],
            true,
            None,
            Some(selector),
            vec![frequency_property("start", "SENS:{ch_id}:FREQ:STAR"), frequency_property("stop", "FREQ:STOP")],
        )
        .unwrap()
    }

    fn setter_for<'a>(group: &'a mut ChannelGroup, message: &str) -> Option<(&'a str, &'a mut Property)> {
        group.setters_mut().find(|(ch_id, p)| p.setter().unwrap().query.capture(message, Some(*ch_id)).is_some())
    }

    #[test]
    fn selects_the_first_channel_by_default() {
        assert_eq!(selectable_group().selected(), Some("sa"));
    }

    #[test]
    fn selection_is_mutually_exclusive() {
        let mut group = selectable_group();

        group.select("PN").unwrap();

        assert_eq!(group.selected(), Some("pn"));
        let selected_getters = group.getters().filter(|(_, p)| !p.getter().unwrap().query.has_channel_placeholder()).collect::<Vec<_>>();
        assert_eq!(selected_getters.len(), 1);
        assert_eq!(selected_getters[0].0, "pn");
    }

    #[test]
    fn channel_properties_do_not_interfere() {
        let mut group = selectable_group();

        let (ch_id, property) = setter_for(&mut group, "SENS:pn:FREQ:STAR 5").unwrap();
        assert_eq!(ch_id, "pn");
        property.update_from_text("5", OutOfRangePolicy::Reject).unwrap();

        assert_eq!(group.property("pn", "start").unwrap().value(), &Value::Float(5.0));
        assert_eq!(group.property("sa", "start").unwrap().value(), &Value::Float(10.0));
    }

    #[test]
    fn unaddressed_templates_act_on_the_selected_channel() {
        let mut group = selectable_group();
        group.select("pn").unwrap();

        let (ch_id, property) = setter_for(&mut group, "FREQ:STOP 7").unwrap();

        assert_eq!(ch_id, "pn");
        assert_eq!(property.name(), "stop");
    }

    #[test]
    fn selector_commands_change_and_report_the_selection() {
        let mut group = selectable_group();

        assert_eq!(group.match_selector_setter("INST:SEL pn"), Some(Ok(None)));
        assert_eq!(group.match_selector_getter("INST:SEL?"), Some(Ok("pn".to_string())));
        assert!(matches!(group.match_selector_setter("INST:SEL vsa"), Some(Err(ChannelError::UnknownChannel { .. }))));
        assert_eq!(group.match_selector_setter("*IDN?"), None);
    }

    #[test]
    fn reset_restores_the_selection_and_the_values() {
        let mut group = selectable_group();
        group.select("pn").unwrap();
        let (_, property) = setter_for(&mut group, "FREQ:STOP 7").unwrap();
        property.update_from_text("7", OutOfRangePolicy::Reject).unwrap();

        group.reset();

        assert_eq!(group.selected(), Some("sa"));
        assert_eq!(group.property("pn", "stop").unwrap().value(), &Value::Float(10.0));
    }

    #[test]
    fn non_selectable_groups_require_channel_placeholders() {
        let result = ChannelGroup::new("outputs", vec!["1".to_string()], false, None, None, vec![frequency_property("start", "FREQ:STAR")]);

        assert_eq!(
            result,
            Err(ChannelError::MissingChannelPlaceholder {
                group: "outputs".to_string(),
                property: "start".to_string()
            })
        );
    }

    #[test]
    fn rejects_duplicate_and_empty_channel_lists() {
        let duplicate = ChannelGroup::new("g", vec!["a".to_string(), "a".to_string()], true, None, None, vec![]);
        let empty = ChannelGroup::new("g", vec![], true, None, None, vec![]);

        assert!(matches!(duplicate, Err(ChannelError::DuplicateChannel { .. })));
        assert_eq!(empty, Err(ChannelError::NoChannels("g".to_string())));
    }

    #[test]
    fn values_are_keyed_by_channel_and_property() {
        let group = selectable_group();

        let keys = group.values().map(|(key, _)| key).collect::<Vec<_>>();

        assert_eq!(keys, vec!["sa.start", "sa.stop", "pn.start", "pn.stop"]);
    }
}
