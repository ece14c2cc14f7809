// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! Generic XEP-0060 Publish-Subscribe client (§4.3). The Device-List and Bundle managers are
//! both thin wrappers around this: it owns request/id/timeout bookkeeping and wire-level
//! pubsub/IQ shape, while they own OMEMO-specific caching and parsing decisions.

use std::time::Duration;

use anyhow::anyhow;
use jid::BareJid;
use minidom::Element;
use xmpp_parsers::data_forms::DataForm;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::pubsub::owner::Configure;
use xmpp_parsers::pubsub::pubsub::{Item, Items, Publish, PublishOptions, Retract};
use xmpp_parsers::pubsub::{pubsub, Item as PubSubItem, ItemId, NodeName, PubSubEvent};

use prose_xmpp::util::{ElementExt, PublishOptionsExt, RequestError};
use prose_xmpp::{ns, XmppConnection, DEFAULT_QUERY_TIMEOUT, DISCOVERY_QUERY_TIMEOUT};

/// Whether a published item should be world-readable (device lists, bundles, §4.4/§4.5) or
/// restricted to the owning account (none of this crate's nodes need that, but the option is
/// kept symmetrical with [`PublishOptionsExt`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAccess {
    Open,
    Private,
}

pub struct PubSubClient {
    connection: XmppConnection,
}

impl PubSubClient {
    pub fn new(connection: XmppConnection) -> Self {
        Self { connection }
    }

    /// Publishes `payload` under `item_id` on `node`, owned by `to` (`None` publishes to the
    /// local account's own PEP node, §4.4/§4.5).
    pub async fn publish(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
        item_id: impl Into<String>,
        payload: Element,
        access: NodeAccess,
    ) -> Result<(), RequestError> {
        let options = match access {
            NodeAccess::Open => PublishOptions::for_public_data(None),
            NodeAccess::Private => PublishOptions::for_private_data(),
        };

        let mut iq = Iq::from_set(
            self.connection.generate_id(),
            pubsub::PubSub::Publish {
                publish: Publish {
                    node: NodeName(node.as_ref().to_string()),
                    items: vec![Item(PubSubItem {
                        id: Some(ItemId(item_id.into())),
                        publisher: None,
                        payload: Some(payload),
                    })],
                },
                publish_options: Some(options),
            },
        );
        if let Some(to) = to {
            iq.to = Some(to.clone().into());
        }

        self.connection
            .send_iq(iq, DEFAULT_QUERY_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Fetches every item on `node`, or just `item_id` when given (§4.4/§4.5). `from` is `None`
    /// when fetching our own account's node — the server resolves it implicitly. Returns an
    /// empty list rather than an error when the node or item doesn't exist yet.
    pub async fn fetch(
        &self,
        from: Option<&BareJid>,
        node: impl AsRef<str>,
        item_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<PubSubItem>, RequestError> {
        let items = Items {
            max_items: None,
            node: NodeName(node.as_ref().to_string()),
            subid: None,
            items: item_id
                .into_iter()
                .map(|id| {
                    Item(PubSubItem {
                        id: Some(ItemId(id.to_string())),
                        publisher: None,
                        payload: None,
                    })
                })
                .collect(),
        };

        let mut iq = Iq::from_get(self.connection.generate_id(), pubsub::PubSub::Items(items));
        if let Some(from) = from {
            iq.to = Some(from.clone().into());
        }

        let response = match self.connection.send_iq(iq, timeout).await {
            Ok(response) => response,
            Err(err) if err.is_item_not_found_err() => return Ok(vec![]),
            Err(err) => return Err(err),
        }
        .ok_or(RequestError::UnexpectedResponse)?;

        let pubsub::PubSub::Items(items) = pubsub::PubSub::try_from(response)
            .map_err(|err| RequestError::Generic { msg: err.to_string() })?
        else {
            return Err(RequestError::UnexpectedResponse);
        };

        Ok(items.items.into_iter().map(|item| item.0).collect())
    }

    /// Convenience wrapper around [`Self::fetch`] using the standard query timeout (§4.3).
    pub async fn fetch_standard(
        &self,
        from: Option<&BareJid>,
        node: impl AsRef<str>,
        item_id: Option<&str>,
    ) -> Result<Vec<PubSubItem>, RequestError> {
        self.fetch(from, node, item_id, DEFAULT_QUERY_TIMEOUT).await
    }

    /// Convenience wrapper around [`Self::fetch`] using the shorter discovery timeout (§4.3),
    /// for requests (e.g. a just-seen peer's bundle) where failing fast matters more than
    /// waiting out a slow server.
    pub async fn fetch_discovery(
        &self,
        from: Option<&BareJid>,
        node: impl AsRef<str>,
        item_id: Option<&str>,
    ) -> Result<Vec<PubSubItem>, RequestError> {
        self.fetch(from, node, item_id, DISCOVERY_QUERY_TIMEOUT).await
    }

    pub async fn subscribe(&self, to: &BareJid, node: impl AsRef<str>) -> Result<(), RequestError> {
        let mut iq = Iq::from_set(
            self.connection.generate_id(),
            pubsub::PubSub::Subscribe {
                subscribe: Some(pubsub::Subscribe {
                    jid: to.clone().into(),
                    node: Some(NodeName(node.as_ref().to_string())),
                }),
                options: None,
            },
        );
        iq.to = Some(to.clone().into());
        self.connection
            .send_iq(iq, DEFAULT_QUERY_TIMEOUT)
            .await?;
        Ok(())
    }

    pub async fn retract(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
        item_id: impl Into<String>,
    ) -> Result<(), RequestError> {
        let mut iq = Iq::from_set(
            self.connection.generate_id(),
            pubsub::PubSub::Retract(Retract {
                node: NodeName(node.as_ref().to_string()),
                notify: Default::default(),
                items: vec![Item(PubSubItem {
                    id: Some(ItemId(item_id.into())),
                    publisher: None,
                    payload: None,
                })],
            }),
        );
        if let Some(to) = to {
            iq.to = Some(to.clone().into());
        }
        self.connection
            .send_iq(iq, DEFAULT_QUERY_TIMEOUT)
            .await?;
        Ok(())
    }

    pub async fn delete_node(&self, node: impl AsRef<str>) -> Result<(), RequestError> {
        let iq = Iq {
            from: None,
            to: None,
            id: self.connection.generate_id(),
            payload: IqType::Set(
                Element::builder("pubsub", ns::PUBSUB_OWNER)
                    .append(
                        Element::builder("delete", ns::PUBSUB_OWNER).attr("node", node.as_ref()),
                    )
                    .build(),
            ),
        };
        self.connection
            .send_iq(iq, DEFAULT_QUERY_TIMEOUT)
            .await?;
        Ok(())
    }

    pub async fn get_node_config(
        &self,
        node: impl AsRef<str>,
    ) -> Result<Option<DataForm>, RequestError> {
        let iq = Iq {
            from: None,
            to: None,
            id: self.connection.generate_id(),
            payload: IqType::Get(
                Element::builder("pubsub", ns::PUBSUB_OWNER)
                    .append(
                        Element::builder("configure", ns::PUBSUB_OWNER).attr("node", node.as_ref()),
                    )
                    .build(),
            ),
        };

        let response = match self.connection.send_iq(iq, DEFAULT_QUERY_TIMEOUT).await {
            Ok(response) => response,
            Err(err) if err.is_item_not_found_err() => return Ok(None),
            Err(err) => return Err(err),
        }
        .ok_or(RequestError::UnexpectedResponse)?;

        response
            .expect_is("pubsub", ns::PUBSUB_OWNER)
            .map_err(|err| RequestError::Generic { msg: err.to_string() })?;

        let configure = response
            .get_child("configure", ns::PUBSUB_OWNER)
            .cloned()
            .map(Configure::try_from)
            .transpose()
            .map_err(|err| RequestError::Generic { msg: err.to_string() })?;

        Ok(configure.and_then(|configure| configure.form))
    }

    /// Extracts the `<event/>` payload(s) from an inbound pubsub notification message (§4.4's
    /// push path), if any.
    pub fn parse_event(message: &Element) -> anyhow::Result<Vec<PubSubEvent>> {
        message
            .children()
            .filter(|child| child.is("event", ns::PUBSUB_EVENT))
            .map(|child| PubSubEvent::try_from(child.clone()).map_err(|err| anyhow!(err)))
            .collect()
    }
}
