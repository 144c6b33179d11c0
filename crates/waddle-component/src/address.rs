//! Three-part stanza addresses (`local@domain/resource`).
//!
//! Parsing is deliberately lenient: a missing `@` or `/` simply leaves the
//! corresponding part empty. Only a delimiter followed (or preceded) by
//! nothing is rejected, and both failures are reported together.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A stanza address.
///
/// The domain part is the only structurally required field; an address
/// with an empty domain can be built but is not [complete](Address::is_complete).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    pub local_part: String,
    pub domain_part: String,
    pub resource_part: String,
}

/// A single address validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Local part is empty")]
    EmptyLocalPart,

    #[error("Resource part is empty")]
    EmptyResourcePart,

    /// More than one failure, in the order they were detected.
    #[error("Multiple errors: [{}]", join_errors(.0))]
    Multiple(Vec<AddressError>),
}

fn join_errors(errors: &[AddressError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error returned by [`Address::parse`].
///
/// Carries the best-effort address assembled from the input so callers
/// can still inspect the parts that did parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct ParseAddressError {
    pub partial: Address,
    pub error: AddressError,
}

impl Address {
    /// Build an address from its parts.
    pub fn new(
        local_part: impl Into<String>,
        domain_part: impl Into<String>,
        resource_part: impl Into<String>,
    ) -> Self {
        Self {
            local_part: local_part.into(),
            domain_part: domain_part.into(),
            resource_part: resource_part.into(),
        }
    }

    /// Build a domain-only address.
    pub fn domain(domain_part: impl Into<String>) -> Self {
        Self {
            domain_part: domain_part.into(),
            ..Self::default()
        }
    }

    /// Parse `local@domain/resource`.
    ///
    /// Blank input yields the empty address. The text is split on the first
    /// `@` and then, in the remainder, on the first `/`.
    pub fn parse(text: &str) -> Result<Self, ParseAddressError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }

        let (local_part, rest, has_at) = match text.split_once('@') {
            Some((local, rest)) => (local, rest, true),
            None => ("", text, false),
        };
        let (domain_part, resource_part, has_slash) = match rest.split_once('/') {
            Some((domain, resource)) => (domain, resource, true),
            None => (rest, "", false),
        };

        let address = Self::new(local_part, domain_part, resource_part);

        let mut errors = Vec::with_capacity(2);
        if has_at && address.local_part.is_empty() {
            errors.push(AddressError::EmptyLocalPart);
        }
        if has_slash && address.resource_part.is_empty() {
            errors.push(AddressError::EmptyResourcePart);
        }

        let error = match errors.len() {
            0 => return Ok(address),
            1 => errors.remove(0),
            _ => AddressError::Multiple(errors),
        };

        Err(ParseAddressError {
            partial: address,
            error,
        })
    }

    /// Copy of this address without the resource part.
    pub fn bare(&self) -> Self {
        Self {
            local_part: self.local_part.clone(),
            domain_part: self.domain_part.clone(),
            resource_part: String::new(),
        }
    }

    /// Whether the address has a resource part.
    pub fn is_bare(&self) -> bool {
        self.resource_part.is_empty()
    }

    /// Whether the required domain part is present.
    pub fn is_complete(&self) -> bool {
        !self.domain_part.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.local_part.is_empty() {
            write!(f, "{}@", self.local_part)?;
        }
        f.write_str(&self.domain_part)?;
        if !self.resource_part.is_empty() {
            write!(f, "/{}", self.resource_part)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
