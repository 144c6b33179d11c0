//! Service Discovery (XEP-0030) disco#info payloads.
//!
//! The runtime answers disco#info queries addressed to the component on its
//! own; the identities and features come from
//! [`Handler::disco_info`](crate::Handler::disco_info).

use minidom::Element;

use crate::{ComponentError, Result};

/// Service Discovery info namespace (XEP-0030).
pub const DISCO_INFO_NS: &str = "http://jabber.org/protocol/disco#info";

/// Identity element of a disco#info result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Category (e.g., "gateway", "component")
    pub category: String,
    /// Type (e.g., "generic", "bot")
    pub type_: String,
    /// Optional human-readable name
    pub name: Option<String>,
}

impl Identity {
    /// Create a new identity.
    pub fn new(category: &str, type_: &str, name: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            type_: type_.to_string(),
            name: name.map(|s| s.to_string()),
        }
    }

    /// Generic component identity (category="component", type="generic").
    pub fn component(name: Option<&str>) -> Self {
        Self::new("component", "generic", name)
    }

    /// Automated client identity (category="client", type="bot").
    pub fn bot(name: Option<&str>) -> Self {
        Self::new("client", "bot", name)
    }

    /// Gateway identity for a legacy network, e.g. `gateway("irc", ..)`.
    pub fn gateway(network: &str, name: Option<&str>) -> Self {
        Self::new("gateway", network, name)
    }
}

/// Feature element of a disco#info result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature(pub String);

impl Feature {
    /// Create a new feature.
    pub fn new(var: &str) -> Self {
        Self(var.to_string())
    }

    /// disco#info feature
    pub fn disco_info() -> Self {
        Self::new(DISCO_INFO_NS)
    }

    /// XEP-0054 vcard-temp feature
    pub fn vcard() -> Self {
        Self::new("vcard-temp")
    }

    /// XEP-0199 XMPP Ping feature
    pub fn ping() -> Self {
        Self::new("urn:xmpp:ping")
    }

    /// XEP-0092 Software Version feature
    pub fn version() -> Self {
        Self::new("jabber:iq:version")
    }
}

/// A disco#info `<query/>` element, either a request (usually empty) or a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoInfo {
    /// Optional node being queried
    pub node: Option<String>,
    pub identities: Vec<Identity>,
    pub features: Vec<Feature>,
}

impl DiscoInfo {
    /// Build a result payload, appending the disco#info feature itself
    /// unless the caller already listed it.
    pub fn result(node: Option<String>, identities: Vec<Identity>, mut features: Vec<Feature>) -> Self {
        let disco_info = Feature::disco_info();
        if !features.contains(&disco_info) {
            features.push(disco_info);
        }

        Self {
            node,
            identities,
            features,
        }
    }
}

impl TryFrom<&Element> for DiscoInfo {
    type Error = ComponentError;

    fn try_from(query: &Element) -> Result<Self> {
        if !query.is("query", DISCO_INFO_NS) {
            return Err(ComponentError::xml_parse(format!(
                "Expected disco#info query, found <{}/>",
                query.name()
            )));
        }

        let mut info = DiscoInfo {
            node: query.attr("node").map(str::to_string),
            ..Default::default()
        };

        for child in query.children() {
            if child.is("identity", DISCO_INFO_NS) {
                let category = child
                    .attr("category")
                    .ok_or_else(|| ComponentError::xml_parse("Identity without category"))?;
                let type_ = child
                    .attr("type")
                    .ok_or_else(|| ComponentError::xml_parse("Identity without type"))?;
                info.identities
                    .push(Identity::new(category, type_, child.attr("name")));
            } else if child.is("feature", DISCO_INFO_NS) {
                let var = child
                    .attr("var")
                    .ok_or_else(|| ComponentError::xml_parse("Feature without var"))?;
                info.features.push(Feature::new(var));
            }
        }

        Ok(info)
    }
}

impl From<DiscoInfo> for Element {
    fn from(info: DiscoInfo) -> Self {
        let mut query = Element::builder("query", DISCO_INFO_NS);

        if let Some(node) = info.node {
            query = query.attr("node", node);
        }

        for identity in info.identities {
            query = query.append(
                Element::builder("identity", DISCO_INFO_NS)
                    .attr("category", identity.category)
                    .attr("type", identity.type_)
                    .attr("name", identity.name)
                    .build(),
            );
        }

        for feature in info.features {
            query = query.append(
                Element::builder("feature", DISCO_INFO_NS)
                    .attr("var", feature.0)
                    .build(),
            );
        }

        query.build()
    }
}
