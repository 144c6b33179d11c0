use minidom::Element;
use tracing::debug;

use super::{child_text, text_child, Header, StanzaError};
use crate::parser::ns;
use crate::{Address, ComponentError, Result};

/// Presence type attribute. A presence without one is `Available`.
///
/// Values outside RFC 6121 are kept as `Other` rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PresenceType {
    #[default]
    Available,
    Error,
    Probe,
    Subscribe,
    Subscribed,
    Unavailable,
    Unsubscribe,
    Unsubscribed,
    Other(String),
}

impl PresenceType {
    /// Attribute value; `None` for `Available`.
    pub fn as_attr(&self) -> Option<&str> {
        match self {
            Self::Available => None,
            Self::Error => Some("error"),
            Self::Probe => Some("probe"),
            Self::Subscribe => Some("subscribe"),
            Self::Subscribed => Some("subscribed"),
            Self::Unavailable => Some("unavailable"),
            Self::Unsubscribe => Some("unsubscribe"),
            Self::Unsubscribed => Some("unsubscribed"),
            Self::Other(value) => Some(value),
        }
    }

    fn from_attr(value: Option<&str>) -> Self {
        match value {
            None => Self::Available,
            Some("error") => Self::Error,
            Some("probe") => Self::Probe,
            Some("subscribe") => Self::Subscribe,
            Some("subscribed") => Self::Subscribed,
            Some("unavailable") => Self::Unavailable,
            Some("unsubscribe") => Self::Unsubscribe,
            Some("unsubscribed") => Self::Unsubscribed,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// `<show/>` values. Unrecognised text is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceShow {
    Away,
    Chat,
    Dnd,
    Xa,
    Other(String),
}

impl PresenceShow {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Away => "away",
            Self::Chat => "chat",
            Self::Dnd => "dnd",
            Self::Xa => "xa",
            Self::Other(value) => value,
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim() {
            "away" => Self::Away,
            "chat" => Self::Chat,
            "dnd" => Self::Dnd,
            "xa" => Self::Xa,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A `<presence/>` stanza.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presence {
    pub header: Header,
    pub type_: PresenceType,
    pub show: Option<PresenceShow>,
    pub status: Option<String>,
    pub priority: Option<i8>,
    pub error: Option<StanzaError>,
    pub payloads: Vec<Element>,
}

impl Presence {
    /// Presence of the given type addressed to `to`.
    pub fn new(type_: PresenceType, to: Address) -> Self {
        Self {
            header: Header::to(to),
            type_,
            ..Self::default()
        }
    }

    /// Answer this presence, e.g. `Subscribed` for a `Subscribe` request.
    pub fn reply(&self, type_: PresenceType) -> Self {
        Self {
            header: self.header.reply(),
            type_,
            ..Self::default()
        }
    }
}

impl TryFrom<Element> for Presence {
    type Error = ComponentError;

    fn try_from(element: Element) -> Result<Self> {
        let show = child_text(&element, "show").map(|show| PresenceShow::parse(&show));
        // An out-of-range priority is dropped, not fatal.
        let priority = child_text(&element, "priority").and_then(|priority| {
            let parsed = priority.trim().parse::<i8>().ok();
            if parsed.is_none() {
                debug!(priority = %priority, "Ignoring invalid presence priority");
            }
            parsed
        });

        let stanza_ns = element.ns();
        let payloads = element
            .children()
            .filter(|child| {
                !(child.ns() == stanza_ns
                    && matches!(child.name(), "show" | "status" | "priority" | "error"))
            })
            .cloned()
            .collect();

        Ok(Self {
            header: Header::from_element(&element)?,
            type_: PresenceType::from_attr(element.attr("type")),
            show,
            status: child_text(&element, "status"),
            priority,
            error: StanzaError::find_in(&element),
            payloads,
        })
    }
}

impl From<Presence> for Element {
    fn from(presence: Presence) -> Self {
        let mut builder = presence
            .header
            .apply(Element::builder("presence", ns::COMPONENT_ACCEPT))
            .attr("type", presence.type_.as_attr().map(str::to_string));
        builder = text_child(
            builder,
            "show",
            presence.show.as_ref().map(|show| show.as_str().to_string()),
        );
        builder = text_child(builder, "status", presence.status);
        builder = text_child(builder, "priority", presence.priority.map(|p| p.to_string()));
        if let Some(error) = presence.error {
            builder = builder.append(Element::from(error));
        }

        builder.append_all(presence.payloads).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_presence() {
        let element: Element = "<presence xmlns='jabber:component:accept' \
            from='alice@example.com/phone' to='bot.example.com'>\
            <show>dnd</show><status>Busy</status><priority>-1</priority>\
            <c xmlns='http://jabber.org/protocol/caps' node='n' ver='v' hash='sha-1'/>\
            </presence>"
            .parse()
            .unwrap();

        let presence = Presence::try_from(element).unwrap();
        assert_eq!(presence.type_, PresenceType::Available);
        assert_eq!(presence.show, Some(PresenceShow::Dnd));
        assert_eq!(presence.status.as_deref(), Some("Busy"));
        assert_eq!(presence.priority, Some(-1));
        assert_eq!(presence.payloads.len(), 1);
    }

    #[test]
    fn test_invalid_priority_is_ignored() {
        let element: Element = "<presence xmlns='jabber:component:accept'>\
            <priority>high</priority><status>here</status></presence>"
            .parse()
            .unwrap();

        let presence = Presence::try_from(element).unwrap();
        assert_eq!(presence.priority, None);
        assert_eq!(presence.status.as_deref(), Some("here"));

        let element: Element = "<presence xmlns='jabber:component:accept'>\
            <priority>300</priority></presence>"
            .parse()
            .unwrap();
        assert_eq!(Presence::try_from(element).unwrap().priority, None);
    }

    #[test]
    fn test_unknown_show_and_type_are_kept() {
        let element: Element = "<presence xmlns='jabber:component:accept' type='invisible'>\
            <show>online</show></presence>"
            .parse()
            .unwrap();

        let presence = Presence::try_from(element).unwrap();
        assert_eq!(presence.show, Some(PresenceShow::Other("online".to_string())));
        assert_eq!(presence.type_, PresenceType::Other("invisible".to_string()));

        let element = Element::from(presence);
        assert_eq!(element.attr("type"), Some("invisible"));
        assert_eq!(
            element.get_child("show", ns::COMPONENT_ACCEPT).unwrap().text(),
            "online"
        );
    }

    #[test]
    fn test_subscription_reply() {
        let mut request = Presence::new(PresenceType::Subscribe, Address::domain("bot.example.com"));
        request.header.from = Some("alice@example.com".parse().unwrap());

        let reply = request.reply(PresenceType::Subscribed);
        let element = Element::from(reply);
        assert_eq!(element.attr("type"), Some("subscribed"));
        assert_eq!(element.attr("to"), Some("alice@example.com"));
        assert_eq!(element.attr("from"), Some("bot.example.com"));
    }

    #[test]
    fn test_available_has_no_type_attribute() {
        let mut presence = Presence::new(PresenceType::Available, "alice@example.com".parse().unwrap());
        presence.show = Some(PresenceShow::Chat);
        let element = Element::from(presence);

        assert_eq!(element.attr("type"), None);
        assert_eq!(
            element.get_child("show", ns::COMPONENT_ACCEPT).unwrap().text(),
            "chat"
        );
    }
}
