//! Callbacks invoked by [`Component::run`](crate::Component::run).

use async_trait::async_trait;

use crate::component::ComponentHandle;
use crate::disco::{Feature, Identity};
use crate::parser::StartTag;
use crate::stanza::{Iq, Message, Presence};
use crate::Result;

/// Receives inbound stanzas.
///
/// Every method has a no-op default, so implementors only override what
/// they care about. Handlers are awaited one at a time in arrival order;
/// returning an error stops the runtime.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn message(&self, component: &ComponentHandle, message: Message) -> Result<()> {
        let _ = (component, message);
        Ok(())
    }

    async fn presence(&self, component: &ComponentHandle, presence: Presence) -> Result<()> {
        let _ = (component, presence);
        Ok(())
    }

    /// Called for every iq except disco#info queries, which the runtime
    /// answers itself using [`disco_info`](Self::disco_info).
    async fn iq(&self, component: &ComponentHandle, iq: Iq) -> Result<()> {
        let _ = (component, iq);
        Ok(())
    }

    /// Identities and features to advertise in answer to `query`.
    ///
    /// The disco#info feature is added to the reply automatically.
    async fn disco_info(
        &self,
        component: &ComponentHandle,
        query: &Iq,
    ) -> Result<(Vec<Identity>, Vec<Feature>)> {
        let _ = (component, query);
        Ok((Vec::new(), Vec::new()))
    }

    /// Called with the start tag of top-level elements the runtime does not
    /// model. The element's content has already been discarded.
    async fn unknown(&self, component: &ComponentHandle, tag: StartTag) -> Result<()> {
        let _ = (component, tag);
        Ok(())
    }
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
