// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The Message Decryptor (§4.8): the inverse of [`crate::message_encryptor::MessageEncryptor`].
//! Grounded in the reference client's `EncryptionDomainService::_decrypt_message`, minus the
//! message-repository cache fallback that component also has (out of scope here).

use std::sync::Arc;

use jid::BareJid;

use prose_xmpp::stanza::message::Message;
use prose_xmpp::transport::to_bare;
use xmpp_parsers::message::MessageType;

use tracing::warn;

use crate::aes_cipher;
use crate::bundle_manager::BundleManager;
use crate::error::OmemoError;
use crate::ids::DeviceId;
use crate::identity_store::IdentityStore;
use crate::room_tracker::RoomOccupantTracker;
use crate::signal_engine::SignalEngineHandle;

/// The outcome of a successful decrypt (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptedMessage {
    Plaintext(String),
    /// No `payload` element was present: a key-transport message establishing or refreshing a
    /// session, carrying no user content (§4.8 step 6).
    KeyTransport,
}

pub struct MessageDecryptor {
    identity_store: Arc<IdentityStore>,
    signal_engine: SignalEngineHandle,
    room_tracker: Arc<RoomOccupantTracker>,
    bundle_manager: Arc<BundleManager>,
}

impl MessageDecryptor {
    pub fn new(
        identity_store: Arc<IdentityStore>,
        signal_engine: SignalEngineHandle,
        room_tracker: Arc<RoomOccupantTracker>,
        bundle_manager: Arc<BundleManager>,
    ) -> Self {
        Self {
            identity_store,
            signal_engine,
            room_tracker,
            bundle_manager,
        }
    }

    /// **decrypt(stanza)** (§4.8). `None` when `message` carries no `encrypted` child at all —
    /// not an error, simply not an OMEMO stanza.
    pub async fn decrypt(
        &self,
        message: &Message,
        local_device: DeviceId,
    ) -> Result<Option<DecryptedMessage>, OmemoError> {
        let Some(encrypted) = &message.encrypted else {
            return Ok(None);
        };

        let Some(key) = encrypted
            .header
            .keys
            .iter()
            .find(|key| key.rid == local_device.into_inner())
        else {
            return Err(OmemoError::NotForUs);
        };

        let sender = self.resolve_sender(message)?;
        let sender_device = DeviceId::from(encrypted.header.sid);

        let nonce = aes_cipher::nonce_from_slice(&encrypted.header.iv).map_err(OmemoError::Other)?;

        // A pre-key decrypt consumes the one-time pre-key as a side effect inside libsignal's own
        // `message_decrypt`, which calls back into `SignalStoreAdapter::remove_pre_key` — and
        // from there into `IdentityStore::remove_pre_key`'s pool-refill check (§4.1, §4.8) —
        // before this call returns. We only need to notice when that refill happened so the
        // replenished pool gets republished (§4.5.1).
        let pool_size_before_decrypt = self.identity_store.pre_key_pool_size()?;

        let decrypted = self
            .signal_engine
            .decrypt(
                sender.clone(),
                sender_device,
                key.data.clone(),
                key.prekey,
            )
            .await?;

        if key.prekey {
            self.republish_bundle_if_pool_was_refilled(pool_size_before_decrypt)
                .await;
        }

        let Some(payload) = &encrypted.payload else {
            return Ok(Some(DecryptedMessage::KeyTransport));
        };

        let (content_key, tag) =
            aes_cipher::unpack_key_material(&decrypted).map_err(OmemoError::Other)?;
        let plaintext = aes_cipher::decrypt(payload, &tag, &content_key, &nonce)?;

        Ok(Some(DecryptedMessage::Plaintext(
            String::from_utf8(plaintext).map_err(|err| OmemoError::Other(err.into()))?,
        )))
    }

    fn resolve_sender(&self, message: &Message) -> Result<BareJid, OmemoError> {
        let from = message.from.clone().ok_or(OmemoError::UnknownSender)?;

        match message.r#type {
            MessageType::Groupchat => {
                let jid::Jid::Full(full) = from else {
                    return Err(OmemoError::UnknownSender);
                };
                let room = full.to_bare();
                self.room_tracker
                    .occupant_real_jid_by_nick(&room, full.resource())
                    .ok_or(OmemoError::UnknownSender)
            }
            _ => Ok(to_bare(&from)),
        }
    }

    /// Republishes our bundle once the pre-key pool has grown back past where it stood before this
    /// decrypt, i.e. the refill in `IdentityStore::remove_pre_key` just ran (§4.5.1). A failed
    /// republish is logged and swallowed: the next consumed pre-key gets another chance, and the
    /// account is otherwise unaffected.
    async fn republish_bundle_if_pool_was_refilled(&self, pool_size_before_decrypt: usize) {
        let pool_size_after_decrypt = match self.identity_store.pre_key_pool_size() {
            Ok(size) => size,
            Err(err) => {
                warn!("Could not read pre-key pool size after decrypt: {err}");
                return;
            }
        };

        if pool_size_after_decrypt <= pool_size_before_decrypt {
            return;
        }

        let device = match self.identity_store.device_id() {
            Ok(device) => device,
            Err(err) => {
                warn!("Could not read local device id to republish bundle: {err}");
                return;
            }
        };
        let (identity_key, signed_pre_key, pre_keys) = match self.identity_store.public_bundle() {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!("Could not read public bundle material to republish: {err}");
                return;
            }
        };

        if let Err(err) = self
            .bundle_manager
            .publish_own_bundle(device, identity_key, signed_pre_key, pre_keys)
            .await
        {
            warn!("Failed to republish bundle after pre-key pool refill: {err}");
        }
    }
}
