// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! The Message Encryptor (§4.7): turns plaintext into an `encrypted` stanza extension addressed to
//! every device that should receive it, and wraps that extension into a ready-to-send message
//! stanza. Grounded in the reference client's `EncryptionDomainService::encrypt_message`, minus
//! the message-repository fallback that component also has (out of scope here).

use std::sync::Arc;

use jid::BareJid;
use tracing::warn;

use prose_xmpp::stanza::message::{EncryptionMethodHint, Message};
use prose_xmpp::stanza::omemo::{Encrypted, EncryptedHeader, EncryptedKey};
use prose_xmpp::{ns, IDProvider};
use xmpp_parsers::message::MessageType;

use crate::aes_cipher;
use crate::bundle_manager::BundleManager;
use crate::device_list::DeviceListManager;
use crate::error::OmemoError;
use crate::ids::DeviceId;
use crate::identity_store::IdentityStore;
use crate::room_tracker::RoomOccupantTracker;
use crate::rng::RngProvider;
use crate::signal_engine::SignalEngineHandle;

/// The fixed, localizable notice shown to clients that cannot decrypt (§4.7 `wrap-as-stanza`).
const PLAINTEXT_FALLBACK_NOTICE: &str =
    "This message is encrypted with OMEMO but your client doesn't support it.";

/// Emitted instead of the original plaintext when mandatory encryption cannot be satisfied even
/// after one retry (§4.7 "Mandatory-encryption invariant").
const SECURITY_WARNING_NOTICE: &str =
    "This message could not be delivered because it could not be encrypted for security reasons.";

pub struct MessageEncryptor {
    local_jid: BareJid,
    device_list: Arc<DeviceListManager>,
    bundle_manager: Arc<BundleManager>,
    identity_store: Arc<IdentityStore>,
    signal_engine: SignalEngineHandle,
    room_tracker: Arc<RoomOccupantTracker>,
    rng: Arc<dyn RngProvider>,
    id_provider: Arc<dyn IDProvider>,
}

impl MessageEncryptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_jid: BareJid,
        device_list: Arc<DeviceListManager>,
        bundle_manager: Arc<BundleManager>,
        identity_store: Arc<IdentityStore>,
        signal_engine: SignalEngineHandle,
        room_tracker: Arc<RoomOccupantTracker>,
        rng: Arc<dyn RngProvider>,
        id_provider: Arc<dyn IDProvider>,
    ) -> Self {
        Self {
            local_jid,
            device_list,
            bundle_manager,
            identity_store,
            signal_engine,
            room_tracker,
            rng,
            id_provider,
        }
    }

    /// **encrypt-direct(recipient, plaintext)** (§4.7).
    pub async fn encrypt_direct(
        &self,
        recipient: &BareJid,
        plaintext: &[u8],
        force_refresh: bool,
    ) -> Result<Encrypted, OmemoError> {
        let local_device = self.identity_store.device_id()?;

        let recipient_devices = self.device_list.get_device_list(recipient, force_refresh).await?;
        if recipient_devices.is_empty() {
            return Err(OmemoError::NoDevices { peer: recipient.clone() });
        }

        let own_devices = self
            .device_list
            .get_device_list(&self.local_jid, force_refresh)
            .await?;

        let mut targets: Vec<(BareJid, DeviceId)> = recipient_devices
            .iter()
            .map(|device| (recipient.clone(), DeviceId::from(device.id)))
            .collect();
        targets.extend(
            own_devices
                .iter()
                .map(|device| DeviceId::from(device.id))
                .filter(|device| *device != local_device)
                .map(|device| (self.local_jid.clone(), device)),
        );

        self.encrypt_for_targets(recipient.clone(), local_device, targets, plaintext)
            .await
    }

    /// **encrypt-room(room, plaintext)** (§4.7).
    pub async fn encrypt_room(
        &self,
        room: &BareJid,
        plaintext: &[u8],
        force_refresh: bool,
    ) -> Result<Encrypted, OmemoError> {
        let local_device = self.identity_store.device_id()?;

        let Some(occupants) = self.room_tracker.occupant_real_jids(room, true) else {
            return Err(OmemoError::RoomNotCapable { room: room.clone() });
        };

        let mut targets = Vec::new();
        for occupant in &occupants {
            let devices = self.device_list.get_device_list(occupant, force_refresh).await?;
            targets.extend(
                devices
                    .into_iter()
                    .map(|device| (occupant.clone(), DeviceId::from(device.id))),
            );
        }

        // Every own device, local included: the server reflects room messages back to their
        // sender (§4.7).
        let own_devices = self
            .device_list
            .get_device_list(&self.local_jid, force_refresh)
            .await?;
        targets.extend(
            own_devices
                .into_iter()
                .map(|device| (self.local_jid.clone(), DeviceId::from(device.id))),
        );

        self.encrypt_for_targets(room.clone(), local_device, targets, plaintext)
            .await
    }

    async fn encrypt_for_targets(
        &self,
        context: BareJid,
        local_device: DeviceId,
        targets: Vec<(BareJid, DeviceId)>,
        plaintext: &[u8],
    ) -> Result<Encrypted, OmemoError> {
        let material = aes_cipher::generate_content_key_material(self.rng.as_ref());
        let (ciphertext, tag) = aes_cipher::encrypt(plaintext, &material.key, &material.nonce)?;
        let key_material = aes_cipher::pack_key_material(&material.key, &tag);

        let mut keys = Vec::new();
        for (peer, device) in targets {
            match self
                .encrypt_for_device(&peer, device, key_material.clone())
                .await
            {
                Ok(key) => keys.push(key),
                Err(err) => warn!("Skipping device {device} of {peer}: {err}"),
            }
        }

        if keys.is_empty() {
            return Err(OmemoError::NoEncryptableDevices { peer: context });
        }

        Ok(Encrypted {
            header: EncryptedHeader {
                sid: local_device.into_inner(),
                iv: Box::from(&material.nonce[..]),
                keys,
            },
            payload: Some(ciphertext.into_boxed_slice()),
        })
    }

    async fn encrypt_for_device(
        &self,
        peer: &BareJid,
        device: DeviceId,
        key_material: Box<[u8]>,
    ) -> Result<EncryptedKey, OmemoError> {
        if self.identity_store.load_session(peer, device).await?.is_none() {
            let bundle = self
                .bundle_manager
                .fetch_bundle(peer, device)
                .await?
                .ok_or(OmemoError::BundleUnavailable {
                    peer: peer.clone(),
                    device,
                })?;
            self.signal_engine
                .build_session(peer.clone(), device, bundle)
                .await?;
        }

        let encrypted = self
            .signal_engine
            .encrypt(peer.clone(), device, key_material)
            .await?;

        Ok(EncryptedKey {
            rid: device.into_inner(),
            prekey: encrypted.is_pre_key,
            data: encrypted.data,
        })
    }

    /// **wrap-as-stanza(to, encrypted, chat-or-groupchat)** (§4.7): builds the outbound message
    /// stanza, never propagating failures — this is the component authorized to turn a crypto
    /// failure into a plaintext security warning (§4.7, §7).
    pub fn wrap_as_stanza(&self, to: BareJid, r#type: MessageType, encrypted: Encrypted) -> Message {
        let mut message = Message::new(r#type);
        message.to = Some(to.into());
        message.id = Some(self.id_provider.new_id().into());
        message.body = Some(PLAINTEXT_FALLBACK_NOTICE.to_string());
        message.encrypted = Some(encrypted);
        message.encryption_hint = Some(EncryptionMethodHint {
            namespace: ns::LEGACY_OMEMO.to_string(),
            name: Some("OMEMO".to_string()),
        });
        message.store_hint = Some(true);
        message
    }

    /// The fallback stanza sent when encryption could not be completed even after a retry
    /// (§4.7 "Mandatory-encryption invariant") — a short warning, never the original plaintext.
    pub fn security_warning_stanza(&self, to: BareJid, r#type: MessageType) -> Message {
        let mut message = Message::new(r#type);
        message.to = Some(to.into());
        message.id = Some(self.id_provider.new_id().into());
        message.body = Some(SECURITY_WARNING_NOTICE.to_string());
        message
    }
}
