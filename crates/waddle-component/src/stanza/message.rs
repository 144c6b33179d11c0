use minidom::Element;

use super::{child_text, text_child, Header, StanzaError};
use crate::parser::ns;
use crate::{Address, ComponentError, Result};

/// Message type attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageType {
    Chat,
    Error,
    Groupchat,
    Headline,
    #[default]
    Normal,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Error => "error",
            Self::Groupchat => "groupchat",
            Self::Headline => "headline",
            Self::Normal => "normal",
        }
    }

    /// Unknown values are treated as `normal` (RFC 6121 Section 5.2.2).
    fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("chat") => Self::Chat,
            Some("error") => Self::Error,
            Some("groupchat") => Self::Groupchat,
            Some("headline") => Self::Headline,
            _ => Self::Normal,
        }
    }
}

/// A `<message/>` stanza.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub header: Header,
    pub type_: MessageType,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub thread: Option<String>,
    /// Error details when `type_` is [`MessageType::Error`]
    pub error: Option<StanzaError>,
    /// Extension elements, in document order
    pub payloads: Vec<Element>,
}

impl Message {
    /// A chat message with a body.
    pub fn chat(to: Address, body: impl Into<String>) -> Self {
        Self {
            header: Header::to(to),
            type_: MessageType::Chat,
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// An answer to this message in the same conversation.
    pub fn reply(&self, body: impl Into<String>) -> Self {
        let type_ = match self.type_ {
            MessageType::Error => MessageType::Normal,
            other => other,
        };

        Self {
            header: self.header.reply(),
            type_,
            body: Some(body.into()),
            thread: self.thread.clone(),
            ..Self::default()
        }
    }
}

impl TryFrom<Element> for Message {
    type Error = ComponentError;

    fn try_from(element: Element) -> Result<Self> {
        let stanza_ns = element.ns();
        let payloads = element
            .children()
            .filter(|child| {
                !(child.ns() == stanza_ns
                    && matches!(child.name(), "subject" | "body" | "thread" | "error"))
            })
            .cloned()
            .collect();

        Ok(Self {
            header: Header::from_element(&element)?,
            type_: MessageType::from_attr(element.attr("type")),
            subject: child_text(&element, "subject"),
            body: child_text(&element, "body"),
            thread: child_text(&element, "thread"),
            error: StanzaError::find_in(&element),
            payloads,
        })
    }
}

impl From<Message> for Element {
    fn from(message: Message) -> Self {
        let type_ = match message.type_ {
            MessageType::Normal => None,
            other => Some(other.as_str()),
        };

        let mut builder = message
            .header
            .apply(Element::builder("message", ns::COMPONENT_ACCEPT))
            .attr("type", type_);
        builder = text_child(builder, "subject", message.subject);
        builder = text_child(builder, "body", message.body);
        builder = text_child(builder, "thread", message.thread);
        if let Some(error) = message.error {
            builder = builder.append(Element::from(error));
        }

        builder.append_all(message.payloads).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StanzaErrorCondition;

    #[test]
    fn test_parse_message() {
        let element: Element = "<message xmlns='jabber:component:accept' \
            from='alice@example.com/phone' to='bot.example.com' id='m1' type='chat'>\
            <body>ping</body><thread>t1</thread>\
            <active xmlns='http://jabber.org/protocol/chatstates'/></message>"
            .parse()
            .unwrap();

        let message = Message::try_from(element).unwrap();
        assert_eq!(message.type_, MessageType::Chat);
        assert_eq!(message.body.as_deref(), Some("ping"));
        assert_eq!(message.thread.as_deref(), Some("t1"));
        assert_eq!(message.header.id.as_deref(), Some("m1"));
        assert_eq!(message.payloads.len(), 1);
        assert!(message.payloads[0].is("active", "http://jabber.org/protocol/chatstates"));
    }

    #[test]
    fn test_missing_type_is_normal() {
        let element: Element = "<message xmlns='jabber:component:accept'/>".parse().unwrap();
        assert_eq!(Message::try_from(element).unwrap().type_, MessageType::Normal);
    }

    #[test]
    fn test_unknown_type_is_normal() {
        let element: Element = "<message xmlns='jabber:component:accept' type='shout'/>"
            .parse()
            .unwrap();
        assert_eq!(Message::try_from(element).unwrap().type_, MessageType::Normal);
    }

    #[test]
    fn test_reply() {
        let mut message = Message::chat(Address::domain("bot.example.com"), "ping");
        message.header.from = Some("alice@example.com/phone".parse().unwrap());
        message.thread = Some("t1".to_string());

        let reply = message.reply("pong");
        assert_eq!(reply.header.to, message.header.from);
        assert_eq!(reply.header.from, message.header.to);
        assert_eq!(reply.type_, MessageType::Chat);
        assert_eq!(reply.body.as_deref(), Some("pong"));
        assert_eq!(reply.thread.as_deref(), Some("t1"));
    }

    #[test]
    fn test_to_element() {
        let mut message = Message::chat("alice@example.com".parse().unwrap(), "hi <there>");
        message.error = Some(StanzaError::new(StanzaErrorCondition::BadRequest));
        let element = Element::from(message);

        assert!(element.is("message", ns::COMPONENT_ACCEPT));
        assert_eq!(element.attr("to"), Some("alice@example.com"));
        assert_eq!(element.attr("from"), None);
        assert_eq!(element.attr("type"), Some("chat"));
        assert_eq!(
            element.get_child("body", ns::COMPONENT_ACCEPT).unwrap().text(),
            "hi <there>"
        );
        assert!(element.has_child("error", ns::COMPONENT_ACCEPT));

        let normal = Element::from(Message::default());
        assert_eq!(normal.attr("type"), None);
    }
}
