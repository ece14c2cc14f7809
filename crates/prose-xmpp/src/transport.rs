// prose-core-client/prose-xmpp
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The narrow interface this library consumes from the XMPP wire (§6 of the OMEMO
//! specification): send an IQ and await a correlated reply, send a message stanza, and
//! register a handler for inbound stanzas. Stream negotiation, TLS/SASL and stanza framing
//! live outside this crate — the caller supplies a `StanzaSender` that already has an
//! authenticated, live connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use jid::Jid;
use minidom::Element;
use tokio::sync::oneshot;
use xmpp_parsers::iq::Iq;

use crate::deps::IDProvider;
use crate::util::RequestError;

/// Standard response timeout for publish-subscribe queries (§4.3, §5).
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Shorter timeout for discovery-type fetches (§4.3).
pub const DISCOVERY_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends stanzas on an already-authenticated XMPP connection. Implemented by the host
/// application; this crate never opens a socket.
pub trait StanzaSender: Send + Sync {
    fn send_stanza(&self, stanza: Element) -> Result<()>;
}

/// Correlates outgoing IQs with their replies by stanza id, with per-request timeouts.
///
/// Generalizes the actor/oneshot-callback pattern the reference client uses for its Signal
/// service handle into a request/reply correlator for IQ stanzas.
pub struct PendingRequests {
    pending: DashMap<String, oneshot::Sender<Result<Element, RequestError>>>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the reply for `id` and returns a future that resolves once
    /// `resolve` is called for that id, or after `timeout` elapses.
    pub fn await_reply(
        &self,
        id: impl Into<String>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Element>, RequestError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.into(), tx);

        async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(Ok(element))) => Ok(Some(element)),
                Ok(Ok(Err(err))) => Err(err),
                Ok(Err(_)) => Err(RequestError::Generic {
                    msg: "Response channel dropped".to_string(),
                }),
                Err(_) => Err(RequestError::TimedOut),
            }
        }
    }

    /// Feeds an inbound IQ response to whichever caller is awaiting it. No-op if nobody is
    /// waiting on `id` (e.g. it already timed out).
    pub fn resolve(&self, id: &str, result: Result<Element, RequestError>) {
        if let Some((_, tx)) = self.pending.remove(id) {
            _ = tx.send(result);
        }
    }

    pub fn cancel_all(&self) {
        for (_, tx) in self.pending.clone().into_iter() {
            _ = tx.send(Err(RequestError::Generic {
                msg: "Shutting down".to_string(),
            }));
        }
    }
}

/// Generic glue between a `StanzaSender` and the `PendingRequests` correlator; the
/// publish-subscribe client (`prose_omemo_core::pubsub`) is built on top of this.
#[derive(Clone)]
pub struct XmppConnection {
    sender: Arc<dyn StanzaSender>,
    pending: Arc<PendingRequests>,
    id_provider: Arc<dyn IDProvider>,
}

impl XmppConnection {
    pub fn new(sender: Arc<dyn StanzaSender>, id_provider: Arc<dyn IDProvider>) -> Self {
        Self {
            sender,
            pending: Arc::new(PendingRequests::new()),
            id_provider,
        }
    }

    pub fn generate_id(&self) -> String {
        self.id_provider.new_id()
    }

    pub async fn send_iq(&self, iq: Iq, timeout: Duration) -> Result<Option<Element>, RequestError> {
        let id = iq.id.clone();
        let future = self.pending.await_reply(id, timeout);
        self.sender
            .send_stanza(iq.into())
            .map_err(|err| RequestError::Generic {
                msg: err.to_string(),
            })?;
        future.await
    }

    pub fn send_stanza(&self, stanza: impl Into<Element>) -> Result<()> {
        self.sender.send_stanza(stanza.into())
    }

    /// Called by the host application when an IQ response stanza arrives on the wire.
    pub fn handle_iq_response(&self, id: &str, result: Result<Element, RequestError>) {
        self.pending.resolve(id, result)
    }

    pub fn shutdown(&self) {
        self.pending.cancel_all();
    }
}

/// Minimal address helper: strips the resource off a JID, used throughout the OMEMO core
/// whenever a cache or store key must be a bare JID (§4.4, §4.8).
pub fn to_bare(jid: &Jid) -> jid::BareJid {
    jid.clone().into_bare()
}
