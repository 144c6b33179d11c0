//! Echo component: replies to every message with its own body.
//!
//! ```text
//! cargo run --example echo -- component.toml
//! ```
//!
//! Without a path the `WADDLE_COMPONENT_*` environment variables are used.

use tracing::info;
use tracing_subscriber::EnvFilter;
use waddle_component::{
    async_trait, Component, ComponentConfig, ComponentHandle, Feature, Handler, Identity, Iq,
    IqType, Message, Presence, PresenceType, Result,
};

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn message(&self, component: &ComponentHandle, message: Message) -> Result<()> {
        let Some(body) = message.body.as_deref() else {
            return Ok(());
        };
        info!(from = ?message.header.from.as_ref().map(ToString::to_string), "Echoing message");
        component.send(message.reply(body)).await
    }

    async fn presence(&self, component: &ComponentHandle, presence: Presence) -> Result<()> {
        if presence.type_ == PresenceType::Subscribe {
            component.send(presence.reply(PresenceType::Subscribed)).await?;
        }
        Ok(())
    }

    async fn iq(&self, component: &ComponentHandle, iq: Iq) -> Result<()> {
        let is_ping = iq
            .payload
            .as_ref()
            .is_some_and(|payload| payload.is("ping", "urn:xmpp:ping"));
        if iq.type_ == IqType::Get && is_ping {
            component.send(iq.result(None)).await?;
        }
        Ok(())
    }

    async fn disco_info(
        &self,
        _component: &ComponentHandle,
        _query: &Iq,
    ) -> Result<(Vec<Identity>, Vec<Feature>)> {
        Ok((vec![Identity::component(Some("Echo"))], vec![Feature::ping()]))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ComponentConfig::from_file(path)?,
        None => ComponentConfig::from_env()?,
    };

    let component = Component::connect(&config).await?;
    info!(name = %component.name(), "Echo component running");

    component.run(Echo).await?;
    Ok(())
}
