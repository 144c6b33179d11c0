//! # waddle-component
//!
//! XEP-0114 external component runtime for Waddle Social.
//!
//! A component connects to an XMPP server's component port, authenticates
//! with a shared secret and then exchanges stanzas for every address under
//! its own domain.
//!
//! ## Architecture
//!
//! - **Handshake**: pure state machine driven over the connection
//! - **Read loop**: decodes stanzas and forwards them on a bounded channel
//! - **Write loop**: owns the write half and drains the outbound channel and
//!   direct sends onto it
//! - **Dispatch**: [`Component::run`] feeds inbound stanzas to a [`Handler`]
//!   and answers disco#info queries itself
//!
//! ## Example
//!
//! ```no_run
//! use waddle_component::{async_trait, Component, ComponentConfig, ComponentHandle, Handler, Message, Result};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Handler for Echo {
//!     async fn message(&self, component: &ComponentHandle, message: Message) -> Result<()> {
//!         if let Some(body) = &message.body {
//!             component.send(message.reply(body.clone())).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let config = ComponentConfig::new("localhost:5347", "echo.example.com", "s3cr3t");
//! Component::connect(&config).await?.run(Echo).await
//! # }
//! ```

pub mod address;
pub mod component;
pub mod config;
pub mod disco;
pub mod handler;
pub mod handshake;
pub mod parser;
pub mod stanza;
pub mod stream;

mod error;

pub use address::{Address, AddressError, ParseAddressError};
pub use component::{Component, ComponentHandle, StanzaChannels};
pub use config::ComponentConfig;
pub use disco::{DiscoInfo, Feature, Identity};
pub use error::{ComponentError, Result, StanzaErrorCondition, StanzaErrorType};
pub use handler::{Handler, NoopHandler};
pub use parser::{ns, StartTag, StreamHeader};
pub use stanza::{
    Header, Iq, IqType, Message, MessageType, Presence, PresenceShow, PresenceType, Stanza,
    StanzaError,
};

pub use async_trait::async_trait;

/// Connect to the server described by `config` and perform the handshake.
pub async fn connect(config: &ComponentConfig) -> Result<Component> {
    Component::connect(config).await
}
