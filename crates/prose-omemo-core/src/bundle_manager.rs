// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The Bundle Manager (§4.5): publishes our own device's key bundle and fetches peers' bundles on
//! demand. Bundles are never cached — each session build draws a fresh, currently-advertised
//! one-time pre-key (§4.5).

use std::sync::Arc;

use jid::BareJid;
use rand::Rng;

use prose_xmpp::stanza::omemo::{Bundle, PreKeyPublic};
use prose_xmpp::util::ItemIdExt;
use prose_xmpp::{ns, RequestError};
use xmpp_parsers::pubsub::ItemId;

use crate::error::OmemoError;
use crate::ids::DeviceId;
use crate::keys::{IdentityKey, PublicPreKey, PublicSignedPreKey};
use crate::pubsub::{NodeAccess, PubSubClient};
use crate::rng::RngProvider;
use crate::signal_engine::PeerPreKeyBundle;

fn bundle_node(device: DeviceId) -> String {
    format!("{}:{device}", ns::LEGACY_OMEMO_BUNDLES)
}

pub struct BundleManager {
    pubsub: PubSubClient,
    rng: Arc<dyn RngProvider>,
}

impl BundleManager {
    pub fn new(pubsub: PubSubClient, rng: Arc<dyn RngProvider>) -> Self {
        Self { pubsub, rng }
    }

    /// Publishes our bundle on our device-specific node (§4.5). Called once after initialization
    /// and again whenever the pre-key pool has just been replenished (§4.5.1).
    pub async fn publish_own_bundle(
        &self,
        device: DeviceId,
        identity_key: IdentityKey,
        signed_pre_key: PublicSignedPreKey,
        pre_keys: Vec<PublicPreKey>,
    ) -> Result<(), OmemoError> {
        let bundle = Bundle {
            signed_pre_key_id: signed_pre_key.id.into_inner(),
            signed_pre_key: signed_pre_key.key.into_inner(),
            signed_pre_key_signature: signed_pre_key.signature,
            identity_key: identity_key.into_inner(),
            pre_keys: pre_keys
                .into_iter()
                .map(|pre_key| PreKeyPublic {
                    id: pre_key.id.into_inner(),
                    data: pre_key.key.into_inner(),
                })
                .collect(),
        };

        self.pubsub
            .publish(
                None,
                bundle_node(device),
                ItemId::current().0,
                bundle.into(),
                NodeAccess::Open,
            )
            .await
            .map_err(|source| OmemoError::Other(source.into()))
    }

    /// Fetches and parses `peer`'s bundle for `device`, without consulting any cache (§4.5).
    pub async fn fetch_bundle(
        &self,
        peer: &BareJid,
        device: DeviceId,
    ) -> Result<Option<PeerPreKeyBundle>, OmemoError> {
        let items = self
            .pubsub
            .fetch_discovery(Some(peer), bundle_node(device), None)
            .await
            .map_err(|err| match err {
                RequestError::TimedOut => OmemoError::BundleUnavailable {
                    peer: peer.clone(),
                    device,
                },
                other => OmemoError::Other(other.into()),
            })?;

        let Some(payload) = items.into_iter().find_map(|item| item.payload) else {
            return Ok(None);
        };

        let bundle = Bundle::try_from(payload).map_err(OmemoError::Other)?;

        if bundle.pre_keys.is_empty() {
            return Ok(None);
        }
        // One one-time pre-key is drawn uniformly from the bundle's advertised pool (§4.2,
        // §4.5) — never cached, so the draw is fresh across repeated session builds.
        let index = self.rng.rng().gen_range(0..bundle.pre_keys.len());
        let pre_key = bundle.pre_keys.into_iter().nth(index).expect("index in bounds");

        Ok(Some(PeerPreKeyBundle {
            identity_key: IdentityKey::from(crate::keys::PublicKey::from(&bundle.identity_key[..])),
            signed_pre_key_id: bundle.signed_pre_key_id,
            signed_pre_key: crate::keys::PublicKey::from(&bundle.signed_pre_key[..]),
            signed_pre_key_signature: bundle.signed_pre_key_signature,
            pre_key_id: pre_key.id,
            pre_key: crate::keys::PublicKey::from(&pre_key.data[..]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_specific_bundle_node_matches_well_known_naming() {
        assert_eq!(
            bundle_node(DeviceId::from(42)),
            format!("{}:42", ns::LEGACY_OMEMO_BUNDLES)
        );
    }
}
