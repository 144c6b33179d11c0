use minidom::Element;

use super::{Header, StanzaError};
use crate::disco::{DiscoInfo, Feature, Identity, DISCO_INFO_NS};
use crate::parser::ns;
use crate::{Address, ComponentError, Result};

/// IQ type attribute.
///
/// A missing or unrecognised value is kept as `Other` (empty when the
/// attribute is absent) so the handler can answer it with `bad-request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
    Other(String),
}

impl IqType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
            Self::Other(value) => value,
        }
    }

    fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("get") => Self::Get,
            Some("set") => Self::Set,
            Some("result") => Self::Result,
            Some("error") => Self::Error,
            other => Self::Other(other.unwrap_or_default().to_string()),
        }
    }
}

/// An `<iq/>` stanza.
///
/// A disco#info query child is decoded into [`DiscoInfo`]; the first other
/// child element is kept as the raw `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    pub header: Header,
    pub type_: IqType,
    pub disco_info: Option<DiscoInfo>,
    pub payload: Option<Element>,
    pub error: Option<StanzaError>,
}

impl Iq {
    /// An empty iq of the given type.
    pub fn new(type_: IqType, header: Header) -> Self {
        Self {
            header,
            type_,
            disco_info: None,
            payload: None,
            error: None,
        }
    }

    /// A get request carrying `payload`.
    pub fn get(to: Address, id: impl Into<String>, payload: Element) -> Self {
        let mut iq = Self::new(
            IqType::Get,
            Header {
                to: Some(to),
                id: Some(id.into()),
                ..Header::default()
            },
        );
        iq.payload = Some(payload);
        iq
    }

    /// A set request carrying `payload`.
    pub fn set(to: Address, id: impl Into<String>, payload: Element) -> Self {
        let mut iq = Self::get(to, id, payload);
        iq.type_ = IqType::Set;
        iq
    }

    /// Whether this is a disco#info query.
    pub fn is_disco_info(&self) -> bool {
        self.type_ == IqType::Get && self.disco_info.is_some()
    }

    /// A result answering this request.
    pub fn result(&self, payload: Option<Element>) -> Self {
        let mut iq = Self::new(IqType::Result, self.header.reply());
        iq.payload = payload;
        iq
    }

    /// An error answering this request.
    pub fn error_reply(&self, error: StanzaError) -> Self {
        let mut iq = Self::new(IqType::Error, self.header.reply());
        iq.error = Some(error);
        iq
    }

    /// The disco#info result answering this query.
    ///
    /// The node of the query is echoed back, and the disco#info feature is
    /// always advertised.
    pub fn disco_info_result(&self, identities: Vec<Identity>, features: Vec<Feature>) -> Self {
        let node = self.disco_info.as_ref().and_then(|query| query.node.clone());
        let mut iq = Self::new(IqType::Result, self.header.reply());
        iq.disco_info = Some(DiscoInfo::result(node, identities, features));
        iq
    }
}

impl TryFrom<Element> for Iq {
    type Error = ComponentError;

    fn try_from(element: Element) -> Result<Self> {
        let mut iq = Self::new(
            IqType::from_attr(element.attr("type")),
            Header::from_element(&element)?,
        );
        iq.error = StanzaError::find_in(&element);

        let stanza_ns = element.ns();
        for child in element.children() {
            if child.is("query", DISCO_INFO_NS) && iq.disco_info.is_none() {
                iq.disco_info = Some(DiscoInfo::try_from(child)?);
            } else if child.is("error", stanza_ns.as_str()) {
                continue;
            } else if iq.payload.is_none() {
                iq.payload = Some(child.clone());
            }
        }

        Ok(iq)
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Self {
        let type_ = match &iq.type_ {
            IqType::Other(value) if value.is_empty() => None,
            other => Some(other.as_str().to_string()),
        };
        let mut builder = iq
            .header
            .apply(Element::builder("iq", ns::COMPONENT_ACCEPT))
            .attr("type", type_);

        if let Some(info) = iq.disco_info {
            builder = builder.append(Element::from(info));
        }
        if let Some(payload) = iq.payload {
            builder = builder.append(payload);
        }
        if let Some(error) = iq.error {
            builder = builder.append(Element::from(error));
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StanzaErrorCondition;

    fn disco_query() -> Iq {
        let element: Element = "<iq xmlns='jabber:component:accept' type='get' id='d1' \
            from='alice@example.com/phone' to='bot.example.com'>\
            <query xmlns='http://jabber.org/protocol/disco#info' node='n1'/></iq>"
            .parse()
            .unwrap();
        Iq::try_from(element).unwrap()
    }

    #[test]
    fn test_parse_disco_info_query() {
        let iq = disco_query();
        assert!(iq.is_disco_info());
        assert_eq!(iq.disco_info.as_ref().unwrap().node.as_deref(), Some("n1"));
        assert!(iq.payload.is_none());
    }

    #[test]
    fn test_disco_result_is_not_a_query() {
        let mut iq = disco_query();
        iq.type_ = IqType::Result;
        assert!(!iq.is_disco_info());
    }

    #[test]
    fn test_parse_other_payload() {
        let element: Element = "<iq xmlns='jabber:component:accept' type='get' id='p1'>\
            <ping xmlns='urn:xmpp:ping'/></iq>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(element).unwrap();

        assert!(!iq.is_disco_info());
        assert!(iq.payload.unwrap().is("ping", "urn:xmpp:ping"));
    }

    #[test]
    fn test_missing_or_unknown_type_is_kept() {
        let element: Element = "<iq xmlns='jabber:component:accept' id='x'/>".parse().unwrap();
        let iq = Iq::try_from(element).unwrap();
        assert_eq!(iq.type_, IqType::Other(String::new()));
        assert!(!iq.is_disco_info());
        assert_eq!(Element::from(iq).attr("type"), None);

        let element: Element = "<iq xmlns='jabber:component:accept' id='y' type='fetch'>\
            <query xmlns='http://jabber.org/protocol/disco#info'/></iq>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(element).unwrap();
        assert_eq!(iq.type_, IqType::Other("fetch".to_string()));
        assert!(!iq.is_disco_info());
    }

    #[test]
    fn test_disco_info_result() {
        let query = disco_query();
        let result = query.disco_info_result(vec![Identity::component(Some("Echo"))], vec![]);

        assert_eq!(result.type_, IqType::Result);
        assert_eq!(result.header.id.as_deref(), Some("d1"));
        assert_eq!(result.header.to, query.header.from);
        assert_eq!(result.header.from, query.header.to);

        let element = Element::from(result);
        let info = element.get_child("query", DISCO_INFO_NS).unwrap();
        assert_eq!(info.attr("node"), Some("n1"));
        assert_eq!(
            info.get_child("feature", DISCO_INFO_NS).unwrap().attr("var"),
            Some(DISCO_INFO_NS)
        );
    }

    #[test]
    fn test_error_reply() {
        let query = disco_query();
        let reply = query.error_reply(StanzaError::new(StanzaErrorCondition::ServiceUnavailable));
        let element = Element::from(reply);

        assert_eq!(element.attr("type"), Some("error"));
        assert_eq!(element.attr("id"), Some("d1"));
        let error = element.get_child("error", ns::COMPONENT_ACCEPT).unwrap();
        assert!(error.has_child("service-unavailable", ns::STANZAS));

        let parsed = Iq::try_from(element).unwrap();
        assert_eq!(
            parsed.error.unwrap().condition,
            StanzaErrorCondition::ServiceUnavailable
        );
        assert!(parsed.payload.is_none());
    }
}
