// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! A fake pub-sub backend plus the wiring to stand up a full [`OmemoService`] against it,
//! modeled on `prose-xmpp`'s own `test::connector` fixture: a `StanzaSender` answers requests
//! synchronously and feeds the reply back through `XmppConnection::handle_iq_response` on a
//! spawned task, so callers observe an ordinary async round trip without a socket.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::anyhow;
use jid::BareJid;
use minidom::Element;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::pubsub::pubsub::{Item, Items, Publish};
use xmpp_parsers::pubsub::{pubsub, Item as PubSubItem, ItemId, NodeName};

use prose_omemo_core::identity_store::FileSnapshotStore;
use prose_omemo_core::rng::{OsRngProvider, RngProvider};
use prose_omemo_core::{
    AccountConfig, AppContext, BundleManager, DeviceListManager, IdentityStore, MessageDecryptor,
    MessageEncryptor, OmemoService, OmemoServiceDependencies, PubSubClient, RoomOccupantTracker,
    SignalEngineHandle,
};
use prose_xmpp::util::RequestError;
use prose_xmpp::{IDProvider, StanzaSender, UUIDProvider, XmppConnection};

/// Every account in a test shares one of these: a node is keyed by its owner plus its name, the
/// same way a real pub-sub service would scope PEP nodes to the publishing account.
pub struct FakeServer {
    items: Mutex<HashMap<(BareJid, String), Element>>,
}

impl FakeServer {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(HashMap::new()),
        })
    }

    fn handle(&self, requester: &BareJid, iq: Iq) -> Result<Element, RequestError> {
        let owner = iq
            .to
            .clone()
            .map(|to| to.into_bare())
            .unwrap_or_else(|| requester.clone());

        match iq.payload {
            IqType::Set(element) => self.handle_set(owner, element),
            IqType::Get(element) => self.handle_get(owner, element),
            _ => Err(RequestError::Generic {
                msg: "fake pub-sub backend only answers get/set IQs".to_string(),
            }),
        }
    }

    fn handle_set(&self, owner: BareJid, element: Element) -> Result<Element, RequestError> {
        let request = pubsub::PubSub::try_from(element)
            .map_err(|err| RequestError::Generic { msg: err.to_string() })?;

        let pubsub::PubSub::Publish { publish, .. } = request else {
            return Err(RequestError::Generic {
                msg: "fake pub-sub backend only implements publish".to_string(),
            });
        };
        let Publish { node, items } = publish;

        if let Some(item) = items.into_iter().next() {
            if let Some(payload) = item.0.payload {
                self.items.lock().unwrap().insert((owner, node.0), payload);
            }
        }

        // The real reply would be an empty `<iq type="result"/>`; none of our callers inspect
        // the payload of a publish acknowledgement, so any element stands in for it.
        Ok(Element::builder("ack", "jabber:client").build())
    }

    fn handle_get(&self, owner: BareJid, element: Element) -> Result<Element, RequestError> {
        let request = pubsub::PubSub::try_from(element)
            .map_err(|err| RequestError::Generic { msg: err.to_string() })?;

        let pubsub::PubSub::Items(items) = request else {
            return Err(RequestError::Generic {
                msg: "fake pub-sub backend only implements item fetches".to_string(),
            });
        };

        let stored = self
            .items
            .lock()
            .unwrap()
            .get(&(owner, items.node.0.clone()))
            .cloned();

        let response_items = match stored {
            Some(payload) => vec![Item(PubSubItem {
                id: Some(ItemId("current".to_string())),
                publisher: None,
                payload: Some(payload),
            })],
            None => vec![],
        };

        Ok(pubsub::PubSub::Items(Items {
            max_items: None,
            node: NodeName(items.node.0),
            subid: None,
            items: response_items,
        })
        .into())
    }

    /// Test-only: the raw payload last published by `owner` to `node`, if any.
    pub fn item(&self, owner: &BareJid, node: &str) -> Option<Element> {
        self.items.lock().unwrap().get(&(owner.clone(), node.to_string())).cloned()
    }

    /// Test-only: every device id `owner` has published a bundle for so far. A device-list
    /// publish can wholesale-replace the device-list node, but bundle nodes are never retracted,
    /// so this stays a reliable way to recover a device id the test itself never got to see.
    pub fn bundle_device_ids(&self, owner: &BareJid) -> Vec<u32> {
        let prefix = format!("{}:", prose_xmpp::ns::LEGACY_OMEMO_BUNDLES);
        self.items
            .lock()
            .unwrap()
            .keys()
            .filter_map(|(node_owner, node)| {
                if node_owner != owner {
                    return None;
                }
                node.strip_prefix(&prefix).and_then(|suffix| suffix.parse::<u32>().ok())
            })
            .collect()
    }

    /// Test-only: simulates the server losing a node's last-published item, so a caller that
    /// bypasses the cache (force-refresh) observes the loss while one that trusts a fresh cache
    /// entry does not.
    pub fn clear(&self, owner: &BareJid, node: &str) {
        self.items.lock().unwrap().remove(&(owner.clone(), node.to_string()));
    }
}

/// Routes one account's outgoing stanzas into the shared [`FakeServer`], and its reply back into
/// that account's own [`XmppConnection`].
struct FakeStanzaRouter {
    server: Arc<FakeServer>,
    own_jid: BareJid,
    connection: OnceLock<XmppConnection>,
}

impl FakeStanzaRouter {
    fn new(server: Arc<FakeServer>, own_jid: BareJid) -> Arc<Self> {
        Arc::new(Self {
            server,
            own_jid,
            connection: OnceLock::new(),
        })
    }

    fn attach(&self, connection: XmppConnection) {
        self.connection
            .set(connection)
            .unwrap_or_else(|_| panic!("FakeStanzaRouter attached twice"));
    }
}

impl StanzaSender for FakeStanzaRouter {
    fn send_stanza(&self, stanza: Element) -> anyhow::Result<()> {
        let iq = Iq::try_from(stanza).map_err(|err| anyhow!(err))?;
        let id = iq.id.clone();
        let own_jid = self.own_jid.clone();
        let server = self.server.clone();
        let connection = self
            .connection
            .get()
            .cloned()
            .expect("XmppConnection attached before any stanza is sent");

        tokio::spawn(async move {
            let result = server.handle(&own_jid, iq);
            connection.handle_iq_response(&id, result);
        });

        Ok(())
    }
}

/// A fully wired account, ready to `initialize()`, `encrypt_direct()`/`encrypt_room()`, and
/// `decrypt()` against the fake backend it was built with.
pub struct Account {
    pub service: OmemoService,
}

impl Account {
    pub fn new(server: Arc<FakeServer>, jid: BareJid, storage_dir: &Path) -> Self {
        let router = FakeStanzaRouter::new(server, jid.clone());
        let id_provider: Arc<dyn IDProvider> = Arc::new(UUIDProvider::new());
        let connection = XmppConnection::new(router.clone(), id_provider.clone());
        router.attach(connection.clone());

        let rng: Arc<dyn RngProvider> = Arc::new(OsRngProvider);
        let snapshot_path = storage_dir.join(format!("{jid}.omemo.json"));
        let identity_store = Arc::new(IdentityStore::new(
            Arc::new(FileSnapshotStore::new(snapshot_path)),
            rng.clone(),
        ));
        let signal_engine = SignalEngineHandle::new(identity_store.clone(), rng.clone());
        let room_tracker = Arc::new(RoomOccupantTracker::new());

        let device_list = Arc::new(DeviceListManager::new(PubSubClient::new(connection.clone())));
        let bundle_manager = Arc::new(BundleManager::new(
            PubSubClient::new(connection.clone()),
            rng.clone(),
        ));

        let message_encryptor = Arc::new(MessageEncryptor::new(
            jid.clone(),
            device_list.clone(),
            bundle_manager.clone(),
            identity_store.clone(),
            signal_engine.clone(),
            room_tracker.clone(),
            rng.clone(),
            id_provider.clone(),
        ));
        let message_decryptor = Arc::new(MessageDecryptor::new(
            identity_store.clone(),
            signal_engine,
            room_tracker.clone(),
            bundle_manager.clone(),
        ));

        let ctx = Arc::new(AppContext::new(AccountConfig::new(
            jid,
            storage_dir.to_path_buf(),
        )));

        let service = OmemoService::from(OmemoServiceDependencies {
            ctx,
            identity_store,
            device_list,
            bundle_manager,
            room_tracker,
            message_encryptor,
            message_decryptor,
            device_label: "integration-test-device".to_string(),
        });

        Self { service }
    }
}
