//! Stanzas exchanged over a component stream.
//!
//! Each typed stanza converts from a [`minidom::Element`] with `TryFrom`
//! and back into one with `From`, so the wire codec only ever deals with
//! element trees.

mod iq;
mod message;
mod presence;

pub use iq::{Iq, IqType};
pub use message::{Message, MessageType};
pub use presence::{Presence, PresenceShow, PresenceType};

use minidom::{Element, ElementBuilder};

use crate::error::{StanzaErrorCondition, StanzaErrorType};
use crate::parser::{ns, StartTag, StreamHeader};
use crate::{Address, ComponentError, Result};

/// Addressing attributes shared by every stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub id: Option<String>,
}

impl Header {
    /// Header for a stanza sent to `to`.
    pub fn to(to: Address) -> Self {
        Self {
            to: Some(to),
            ..Self::default()
        }
    }

    /// Header for an answer to this stanza: `from` and `to` swapped, same id.
    pub fn reply(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            id: self.id.clone(),
        }
    }

    pub(crate) fn from_element(element: &Element) -> Result<Self> {
        Ok(Self {
            from: address_attr(element, "from")?,
            to: address_attr(element, "to")?,
            id: element.attr("id").map(str::to_string),
        })
    }

    pub(crate) fn apply(&self, builder: ElementBuilder) -> ElementBuilder {
        builder
            .attr("from", self.from.as_ref().map(ToString::to_string))
            .attr("to", self.to.as_ref().map(ToString::to_string))
            .attr("id", self.id.clone())
    }
}

fn address_attr(element: &Element, name: &str) -> Result<Option<Address>> {
    element
        .attr(name)
        .map(|value| Address::parse(value).map_err(ComponentError::from))
        .transpose()
}

/// Text of the first child named `name` in the stanza's own namespace.
pub(crate) fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name, element.ns().as_str())
        .map(Element::text)
}

/// Append `<name>text</name>` in the component namespace when `text` is set.
pub(crate) fn text_child(builder: ElementBuilder, name: &str, text: Option<String>) -> ElementBuilder {
    match text {
        Some(text) => builder.append(Element::builder(name, ns::COMPONENT_ACCEPT).append(text).build()),
        None => builder,
    }
}

/// A stanza-level `<error/>` (RFC 6120 Section 8.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaError {
    pub type_: StanzaErrorType,
    pub condition: StanzaErrorCondition,
    pub text: Option<String>,
}

impl StanzaError {
    /// Error with the condition's recommended type and no text.
    pub fn new(condition: StanzaErrorCondition) -> Self {
        Self {
            type_: condition.default_type(),
            condition,
            text: None,
        }
    }

    /// Attach a human-readable description.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub(crate) fn from_element(element: &Element) -> Self {
        let condition = element
            .children()
            .find(|child| child.ns() == ns::STANZAS && child.name() != "text")
            .map_or(StanzaErrorCondition::UndefinedCondition, |child| {
                StanzaErrorCondition::from_name(child.name())
            });
        let type_ = element
            .attr("type")
            .and_then(StanzaErrorType::from_attr)
            .unwrap_or_else(|| condition.default_type());
        let text = element.get_child("text", ns::STANZAS).map(Element::text);

        Self {
            type_,
            condition,
            text,
        }
    }

    pub(crate) fn find_in(stanza: &Element) -> Option<Self> {
        stanza
            .get_child("error", stanza.ns().as_str())
            .map(Self::from_element)
    }
}

impl From<StanzaError> for Element {
    fn from(error: StanzaError) -> Self {
        let mut builder = Element::builder("error", ns::COMPONENT_ACCEPT)
            .attr("type", error.type_.as_str())
            .append(Element::builder(error.condition.as_str(), ns::STANZAS).build());

        if let Some(text) = error.text {
            builder = builder.append(Element::builder("text", ns::STANZAS).append(text).build());
        }

        builder.build()
    }
}

/// Any value read from or written to the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Stanza {
    /// `<stream:stream>` opening
    StreamOpen(StreamHeader),
    /// `<handshake/>`, carrying the hex digest when sent by the component
    Handshake { digest: String },
    Message(Message),
    Presence(Presence),
    Iq(Iq),
    /// A top-level element the runtime does not model; only its start tag
    /// is kept.
    Unknown(StartTag),
}

impl Stanza {
    /// Element name, for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::StreamOpen(_) => "stream:stream",
            Self::Handshake { .. } => "handshake",
            Self::Message(_) => "message",
            Self::Presence(_) => "presence",
            Self::Iq(_) => "iq",
            Self::Unknown(tag) => &tag.name,
        }
    }
}

impl TryFrom<Element> for Stanza {
    type Error = ComponentError;

    fn try_from(element: Element) -> Result<Self> {
        match element.name() {
            "message" => Message::try_from(element).map(Self::Message),
            "presence" => Presence::try_from(element).map(Self::Presence),
            "iq" => Iq::try_from(element).map(Self::Iq),
            "handshake" => Ok(Self::Handshake {
                digest: element.text(),
            }),
            other => Err(ComponentError::xml_parse(format!(
                "<{other}/> is not a stanza"
            ))),
        }
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Presence> for Stanza {
    fn from(presence: Presence) -> Self {
        Self::Presence(presence)
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Self::Iq(iq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Element {
        xml.parse().unwrap()
    }

    #[test]
    fn test_header_reply_swaps_addresses() {
        let header = Header {
            from: Some("alice@example.com/phone".parse().unwrap()),
            to: Some(Address::domain("bot.example.com")),
            id: Some("m1".to_string()),
        };

        let reply = header.reply();
        assert_eq!(reply.from, header.to);
        assert_eq!(reply.to, header.from);
        assert_eq!(reply.id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_invalid_address_is_a_decode_error() {
        let element = parse("<message xmlns='jabber:component:accept' from='@example.com'/>");
        assert!(matches!(
            Stanza::try_from(element),
            Err(ComponentError::Address(_))
        ));
    }

    #[test]
    fn test_non_stanza_element_is_rejected() {
        let element = parse("<foo xmlns='jabber:component:accept'/>");
        assert!(Stanza::try_from(element).is_err());
    }

    #[test]
    fn test_handshake_element() {
        let element = parse("<handshake xmlns='jabber:component:accept'>abc</handshake>");
        assert_eq!(
            Stanza::try_from(element).unwrap(),
            Stanza::Handshake {
                digest: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_stanza_error_element() {
        let error = StanzaError::new(StanzaErrorCondition::ItemNotFound).with_text("No such node");
        let element: Element = error.clone().into();

        assert_eq!(element.attr("type"), Some("cancel"));
        assert!(element.has_child("item-not-found", ns::STANZAS));
        assert_eq!(StanzaError::from_element(&element), error);
    }

    #[test]
    fn test_stanza_error_unknown_condition() {
        let element = parse(
            "<error xmlns='jabber:component:accept' type='wait'>\
             <resource-constraint xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error>",
        );
        let error = StanzaError::from_element(&element);
        assert_eq!(error.condition, StanzaErrorCondition::UndefinedCondition);
        assert_eq!(error.type_, StanzaErrorType::Wait);
        assert_eq!(error.text, None);
    }
}
